//! Jump, thrust and gravity.
//!
//! Jumps and thrusts are instantaneous velocity changes; both open the jump
//! grace window so the contact that launched the body is not read back as
//! ground. Thrust charges are recovered over time while grounded.

use bevy::prelude::*;

use crate::config::{ControllerConfig, DerivedParams};
use crate::locomotion::YawBasis;
use crate::state::{ContactState, VerticalActionState};

/// Surface a jump was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum JumpKind {
    Ground,
    Wall,
    Air,
}

/// A jump that was performed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JumpResult {
    pub kind: JumpKind,
    /// Unit launch direction.
    pub direction: Vec3,
    /// Body velocity after the jump.
    pub velocity: Vec3,
}

/// Attempt a jump.
///
/// Returns `None` and leaves all state untouched when no jump is available.
pub fn try_jump(
    contact: &mut ContactState,
    actions: &mut VerticalActionState,
    config: &ControllerConfig,
    derived: &DerivedParams,
    velocity: Vec3,
) -> Option<JumpResult> {
    let normal_or_up = if config.jump_along_ground_normal {
        contact.ground_normal
    } else {
        Vec3::Y
    };

    let (kind, base) = if contact.is_grounded {
        (JumpKind::Ground, normal_or_up)
    } else if config.enable_wall_jump && contact.is_steeped {
        actions.jump_phase = 0;
        (JumpKind::Wall, contact.steep_normal)
    } else if config.max_air_jumps > 0 && actions.jump_phase <= config.max_air_jumps {
        // Walking off a ledge costs the first jump.
        if actions.jump_phase == 0 {
            actions.jump_phase = 1;
        }
        (JumpKind::Air, normal_or_up)
    } else {
        return None;
    };

    let direction = (base + Vec3::Y).try_normalize().unwrap_or(Vec3::Y);

    let mut velocity = velocity;
    if config.jump_cancels_vertical_velocity || velocity.y < 0.0 {
        velocity.y = 0.0;
    }
    velocity += direction * derived.jump_magnitude;

    actions.jump_phase += 1;
    actions.is_jumping_or_thrusting = true;
    actions.is_buffering_jump = false;
    contact.steps_since_last_jump_or_thrust = 0;

    Some(JumpResult {
        kind,
        direction,
        velocity,
    })
}

/// Remember or forget a jump request made in the air.
///
/// Ignored while grounded: a grounded request jumps immediately instead.
pub fn set_jump_buffer(contact: &ContactState, actions: &mut VerticalActionState, buffering: bool) {
    if contact.is_grounded {
        return;
    }
    actions.is_buffering_jump = buffering;
}

/// Whether a buffered jump should fire now.
#[inline]
pub fn buffered_jump_ready(contact: &ContactState, actions: &VerticalActionState) -> bool {
    actions.is_buffering_jump && contact.is_grounded
}

/// A thrust that was performed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrustResult {
    pub direction: Vec3,
    pub velocity: Vec3,
}

/// Attempt a thrust in the move-input direction (forward without input).
pub fn try_thrust(
    contact: &mut ContactState,
    actions: &mut VerticalActionState,
    config: &ControllerConfig,
    derived: &DerivedParams,
    basis: YawBasis,
    move_input: Vec2,
    velocity: Vec3,
) -> Option<ThrustResult> {
    if !config.enable_thrust
        || actions.thrust_phase >= config.max_thrusts
        || !(contact.is_grounded || config.thrust_airborne)
    {
        return None;
    }

    let mut direction = basis
        .direction(move_input)
        .try_normalize()
        .unwrap_or(basis.forward);
    if contact.is_grounded && config.thrust_along_ground {
        direction = direction
            .reject_from_normalized(contact.ground_normal)
            .try_normalize()
            .unwrap_or(direction);
    }
    let direction = (direction + Vec3::Y * config.thrust_vertical_bias)
        .try_normalize()
        .unwrap_or(direction);

    let base = if config.thrust_resets_velocity {
        Vec3::ZERO
    } else {
        velocity
    };
    let velocity = base + direction * derived.thrust_magnitude;

    actions.thrust_phase += 1;
    actions.thrust_charge_counter = config.thrust_recharge_time
        * (config.max_thrusts - actions.thrust_phase) as f32
        / config.max_thrusts as f32;
    actions.no_gravity_counter = config.thrust_no_gravity_time;
    actions.is_jumping_or_thrusting = true;
    contact.steps_since_last_jump_or_thrust = 0;

    Some(ThrustResult {
        direction,
        velocity,
    })
}

/// Advance the no-gravity window and recharge thrusts while grounded.
///
/// Returns true when the thrusts were fully recharged this tick.
pub fn update_thrust_charge(
    contact: &ContactState,
    actions: &mut VerticalActionState,
    config: &ControllerConfig,
    dt: f32,
) -> bool {
    actions.no_gravity_counter = (actions.no_gravity_counter - dt).max(0.0);

    if actions.thrust_phase == 0 || !contact.is_grounded {
        return false;
    }
    actions.thrust_charge_counter += dt;
    if actions.thrust_charge_counter >= config.thrust_recharge_time {
        actions.thrust_phase = 0;
        actions.thrust_charge_counter = config.thrust_recharge_time;
        return true;
    }
    false
}

/// Remove velocity bouncing away from touched surfaces during the no-gravity window.
///
/// Returns the corrected velocity, or `None` when nothing changes.
pub fn cancel_bounce(
    contact: &ContactState,
    actions: &VerticalActionState,
    config: &ControllerConfig,
    velocity: Vec3,
) -> Option<Vec3> {
    if !config.thrust_cancels_bounce || !actions.gravity_suspended() {
        return None;
    }
    let mut corrected = velocity;
    let surfaces = [
        (contact.is_grounded, contact.ground_normal),
        (contact.is_steeped, contact.steep_normal),
    ];
    for (touching, normal) in surfaces {
        if !touching {
            continue;
        }
        let away = corrected.dot(normal);
        if away > 0.0 {
            corrected -= normal * away;
        }
    }
    (corrected != velocity).then_some(corrected)
}

/// Gravity acceleration for this tick, pulling into the ground instead of down
/// so a body at rest on a slope does not slide.
pub fn gravity_acceleration(
    contact: &ContactState,
    actions: &VerticalActionState,
    config: &ControllerConfig,
) -> Option<Vec3> {
    (!actions.gravity_suspended()).then(|| -contact.ground_normal * config.gravity)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn grounded() -> ContactState {
        ContactState {
            is_grounded: true,
            steps_since_last_jump_or_thrust: 100,
            ..default()
        }
    }

    fn airborne() -> ContactState {
        ContactState {
            steps_since_last_jump_or_thrust: 100,
            ..default()
        }
    }

    #[test]
    fn ground_jump_launches_at_jump_magnitude() {
        let config = ControllerConfig::default();
        let derived = DerivedParams::from_config(&config);
        let mut contact = grounded();
        let mut actions = VerticalActionState::default();

        let jump = try_jump(&mut contact, &mut actions, &config, &derived, Vec3::new(1.0, -2.0, 0.0))
            .unwrap();

        assert_eq!(jump.kind, JumpKind::Ground);
        assert_eq!(jump.direction, Vec3::Y);
        assert!((jump.velocity.y - derived.jump_magnitude).abs() < 1e-5);
        assert_eq!(jump.velocity.x, 1.0);
        assert_eq!(actions.jump_phase, 1);
        assert!(actions.is_jumping_or_thrusting);
        assert_eq!(contact.steps_since_last_jump_or_thrust, 0);
    }

    #[test]
    fn sloped_jump_blends_normal_with_up() {
        let config = ControllerConfig::default();
        let derived = DerivedParams::from_config(&config);
        let normal = Vec3::new(0.0, 0.9, 0.3).normalize();
        let mut contact = ContactState {
            ground_normal: normal,
            ..grounded()
        };
        let mut actions = VerticalActionState::default();

        let jump = try_jump(&mut contact, &mut actions, &config, &derived, Vec3::ZERO).unwrap();

        let expected = (normal + Vec3::Y).normalize();
        assert!((jump.direction - expected).length() < 1e-5);
        assert!((jump.velocity - expected * derived.jump_magnitude).length() < 1e-4);
    }

    #[test]
    fn rising_velocity_kept_when_only_falling_is_cancelled() {
        let config = ControllerConfig {
            jump_cancels_vertical_velocity: false,
            ..default()
        };
        let derived = DerivedParams::from_config(&config);
        let mut contact = grounded();
        let mut actions = VerticalActionState::default();

        let jump = try_jump(&mut contact, &mut actions, &config, &derived, Vec3::Y).unwrap();
        assert!((jump.velocity.y - (1.0 + derived.jump_magnitude)).abs() < 1e-5);

        let mut actions = VerticalActionState::default();
        let jump = try_jump(&mut contact, &mut actions, &config, &derived, Vec3::NEG_Y).unwrap();
        assert!((jump.velocity.y - derived.jump_magnitude).abs() < 1e-5);
    }

    #[test]
    fn wall_jump_resets_phase() {
        let config = ControllerConfig::default();
        let derived = DerivedParams::from_config(&config);
        let mut contact = ContactState {
            is_steeped: true,
            steep_normal: Vec3::X,
            ..airborne()
        };
        let mut actions = VerticalActionState {
            jump_phase: 3,
            ..default()
        };

        let jump = try_jump(&mut contact, &mut actions, &config, &derived, Vec3::ZERO).unwrap();
        assert_eq!(jump.kind, JumpKind::Wall);
        assert_eq!(actions.jump_phase, 1);
        assert!((jump.direction - (Vec3::X + Vec3::Y).normalize()).length() < 1e-5);
    }

    #[test]
    fn third_jump_rejected_with_one_air_jump() {
        let config = ControllerConfig::default().with_air_jumps(1);
        let derived = DerivedParams::from_config(&config);
        let mut contact = grounded();
        let mut actions = VerticalActionState::default();

        assert!(try_jump(&mut contact, &mut actions, &config, &derived, Vec3::ZERO).is_some());
        contact.clear_surfaces();

        let air = try_jump(&mut contact, &mut actions, &config, &derived, Vec3::Y).unwrap();
        assert_eq!(air.kind, JumpKind::Air);
        assert_eq!(actions.jump_phase, 2);

        let before = (contact, actions);
        assert!(try_jump(&mut contact, &mut actions, &config, &derived, Vec3::Y).is_none());
        assert_eq!((contact, actions), before);
    }

    #[test]
    fn air_jump_after_walking_off_ledge_costs_first_jump() {
        let config = ControllerConfig::default().with_air_jumps(1);
        let derived = DerivedParams::from_config(&config);
        let mut contact = airborne();
        let mut actions = VerticalActionState::default();

        assert!(try_jump(&mut contact, &mut actions, &config, &derived, Vec3::ZERO).is_some());
        assert_eq!(actions.jump_phase, 2);
        assert!(try_jump(&mut contact, &mut actions, &config, &derived, Vec3::ZERO).is_none());
    }

    #[test]
    fn no_air_jumps_by_default() {
        let config = ControllerConfig::default();
        let derived = DerivedParams::from_config(&config);
        let mut contact = airborne();
        let mut actions = VerticalActionState::default();
        assert!(try_jump(&mut contact, &mut actions, &config, &derived, Vec3::ZERO).is_none());
    }

    #[test]
    fn jump_buffer_only_set_in_air() {
        let mut actions = VerticalActionState::default();
        set_jump_buffer(&grounded(), &mut actions, true);
        assert!(!actions.is_buffering_jump);

        set_jump_buffer(&airborne(), &mut actions, true);
        assert!(actions.is_buffering_jump);
        assert!(!buffered_jump_ready(&airborne(), &actions));
        assert!(buffered_jump_ready(&grounded(), &actions));

        set_jump_buffer(&airborne(), &mut actions, false);
        assert!(!actions.is_buffering_jump);
    }

    #[test]
    fn thrust_follows_input_with_vertical_bias() {
        let config = ControllerConfig::default();
        let derived = DerivedParams::from_config(&config);
        let mut contact = grounded();
        let mut actions = VerticalActionState::default();

        let thrust = try_thrust(
            &mut contact,
            &mut actions,
            &config,
            &derived,
            YawBasis::default(),
            Vec2::X,
            Vec3::ZERO,
        )
        .unwrap();

        let expected = (Vec3::X + Vec3::Y * config.thrust_vertical_bias).normalize();
        assert!((thrust.direction - expected).length() < 1e-5);
        assert!((thrust.velocity.length() - derived.thrust_magnitude).abs() < 1e-4);
        assert_eq!(actions.no_gravity_counter, config.thrust_no_gravity_time);
        assert_eq!(contact.steps_since_last_jump_or_thrust, 0);
    }

    #[test]
    fn thrust_adds_to_velocity_and_falls_back_to_forward() {
        let config = ControllerConfig {
            thrust_vertical_bias: 0.0,
            ..default()
        };
        let derived = DerivedParams::from_config(&config);
        let mut contact = airborne();
        let mut actions = VerticalActionState::default();

        let thrust = try_thrust(
            &mut contact,
            &mut actions,
            &config,
            &derived,
            YawBasis::default(),
            Vec2::ZERO,
            Vec3::new(0.0, 3.0, 0.0),
        )
        .unwrap();

        assert!((thrust.direction - Vec3::NEG_Z).length() < 1e-6);
        assert!((thrust.velocity - Vec3::new(0.0, 3.0, -derived.thrust_magnitude)).length() < 1e-4);
    }

    #[test]
    fn thrust_gated_by_airborne_flag() {
        let config = ControllerConfig {
            thrust_airborne: false,
            ..default()
        };
        let derived = DerivedParams::from_config(&config);
        let mut contact = airborne();
        let mut actions = VerticalActionState::default();
        assert!(try_thrust(
            &mut contact,
            &mut actions,
            &config,
            &derived,
            YawBasis::default(),
            Vec2::Y,
            Vec3::ZERO,
        )
        .is_none());
    }

    #[test]
    fn two_thrusts_then_recharge() {
        let config = ControllerConfig::default().with_thrusts(2, 1.0);
        let derived = DerivedParams::from_config(&config);
        let mut contact = grounded();
        let mut actions = VerticalActionState::default();
        let thrust = |contact: &mut ContactState, actions: &mut VerticalActionState| {
            try_thrust(
                contact,
                actions,
                &config,
                &derived,
                YawBasis::default(),
                Vec2::Y,
                Vec3::ZERO,
            )
        };

        assert!(thrust(&mut contact, &mut actions).is_some());
        assert_eq!(actions.thrust_charge_counter, 0.5);
        assert!(thrust(&mut contact, &mut actions).is_some());
        assert_eq!(actions.thrust_charge_counter, 0.0);
        assert!(thrust(&mut contact, &mut actions).is_none());

        // No recharge while airborne.
        let mut air = airborne();
        for _ in 0..120 {
            update_thrust_charge(&air, &mut actions, &config, DT);
        }
        assert_eq!(actions.thrust_phase, 2);
        assert!(thrust(&mut air, &mut actions).is_none());

        // Landing: recharged after one second on the ground.
        let mut recharged_at = None;
        for tick in 1..=120 {
            if update_thrust_charge(&contact, &mut actions, &config, DT) {
                recharged_at = Some(tick);
                break;
            }
        }
        let tick = recharged_at.expect("thrusts recharge on the ground");
        assert!((59..=61).contains(&tick));
        assert_eq!(actions.thrust_phase, 0);
        assert!(thrust(&mut contact, &mut actions).is_some());
    }

    #[test]
    fn no_gravity_window_suspends_gravity() {
        let config = ControllerConfig::default().with_thrust_no_gravity_time(0.05);
        let contact = airborne();
        let mut actions = VerticalActionState {
            no_gravity_counter: 0.05,
            ..default()
        };

        assert_eq!(gravity_acceleration(&contact, &actions, &config), None);
        for _ in 0..4 {
            update_thrust_charge(&contact, &mut actions, &config, DT);
        }
        assert_eq!(
            gravity_acceleration(&contact, &actions, &config),
            Some(Vec3::NEG_Y * config.gravity)
        );
    }

    #[test]
    fn gravity_pulls_into_slope() {
        let normal = Vec3::new(0.0, 0.8, 0.6);
        let contact = ContactState {
            ground_normal: normal,
            ..grounded()
        };
        let config = ControllerConfig::default();
        let gravity = gravity_acceleration(&contact, &VerticalActionState::default(), &config);
        assert_eq!(gravity, Some(-normal * config.gravity));
    }

    #[test]
    fn bounce_cancel_strips_rebound() {
        let config = ControllerConfig::default();
        let contact = ContactState {
            is_steeped: true,
            steep_normal: Vec3::X,
            ..airborne()
        };
        let actions = VerticalActionState {
            no_gravity_counter: 0.1,
            ..default()
        };

        let corrected = cancel_bounce(&contact, &actions, &config, Vec3::new(4.0, 1.0, -2.0));
        assert_eq!(corrected, Some(Vec3::new(0.0, 1.0, -2.0)));
        assert_eq!(
            cancel_bounce(&contact, &actions, &config, Vec3::new(-4.0, 1.0, 0.0)),
            None
        );

        let closed = VerticalActionState::default();
        assert_eq!(
            cancel_bounce(&contact, &closed, &config, Vec3::new(4.0, 1.0, -2.0)),
            None
        );
    }
}
