//! Ground recovery for ticks without a ground contact.
//!
//! Losing every ground contact for a single tick is common when running over
//! bumps or down a slope change. [`snap_to_ground`] probes below the body and
//! re-grounds it when a walkable surface is close; [`check_crevasse`] treats a
//! walkable combination of steep contacts (a V-shaped gap) as ground.

use bevy::prelude::*;

use crate::backend::SpatialQuery;
use crate::config::ControllerConfig;
use crate::state::ContactState;

/// Ticks without ground after which snapping is no longer attempted.
pub const GROUND_STEPS_THRESHOLD: u32 = 1;
/// Ticks after a jump or thrust during which contacts are ignored.
pub const JUMP_GRACE_STEPS: u32 = 5;
/// Small offset keeping edge probes clear of the surface they start on.
pub const NEAR_ZERO: f32 = 1e-4;

/// Body data the resolver reads.
#[derive(Debug, Clone, Copy)]
pub struct BodySnapshot {
    /// Bottom of the capsule.
    pub feet: Vec3,
    pub velocity: Vec3,
    pub radius: f32,
}

/// A successful snap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapResult {
    pub normal: Vec3,
    pub body: Option<Entity>,
    /// Replacement velocity when the old one pointed away from the ground.
    pub velocity: Option<Vec3>,
}

#[inline]
pub fn is_walkable(normal: Vec3, min_ground_dot: f32) -> bool {
    normal.y >= min_ground_dot
}

/// Probe below the body for ground to snap to.
///
/// Returns `None` without side effects when snapping is not allowed or no
/// suitable ground is found.
pub fn snap_to_ground(
    contact: &ContactState,
    config: &ControllerConfig,
    min_ground_dot: f32,
    body: BodySnapshot,
    query: &dyn SpatialQuery,
) -> Option<SnapResult> {
    if contact.steps_since_last_grounded > GROUND_STEPS_THRESHOLD
        || contact.steps_since_last_jump_or_thrust < JUMP_GRACE_STEPS
    {
        return None;
    }

    let speed = body.velocity.length();
    if speed >= config.max_snap_speed {
        trace!("snap refused: speed {speed:.2} >= {:.2}", config.max_snap_speed);
        return None;
    }

    let hit = query.cast_sphere(
        body.feet + Vec3::Y * body.radius,
        body.radius,
        Vec3::NEG_Y,
        config.sweep_distance,
    )?;
    if !is_walkable(hit.normal, min_ground_dot) {
        return None;
    }

    // The sphere may have clipped the rim of a platform we are leaving.
    let guard = (hit.point - body.feet).reject_from_normalized(Vec3::Y);
    if body.velocity.dot(guard) < 0.0 {
        let below = query.cast_ray(
            body.feet,
            Vec3::NEG_Y,
            body.feet.y - hit.point.y + NEAR_ZERO,
        );
        if below.is_none() {
            let rim_origin = Vec3::new(body.feet.x, hit.point.y - NEAR_ZERO, body.feet.z);
            let rim = guard
                .try_normalize()
                .and_then(|dir| query.cast_ray(rim_origin, dir, guard.length()));
            if !rim.is_some_and(|r| is_walkable(r.normal, min_ground_dot)) {
                trace!("snap refused: leaving a ledge");
                return None;
            }
        }
    }

    let dot = body.velocity.dot(hit.normal);
    let velocity = (dot > 0.0)
        .then(|| (body.velocity - hit.normal * dot).normalize_or_zero() * speed);

    Some(SnapResult {
        normal: hit.normal,
        body: hit.entity,
        velocity,
    })
}

/// Promote the steep normal to ground when the steep contacts add up to a
/// walkable surface.
pub fn check_crevasse(contact: &ContactState, min_ground_dot: f32) -> Option<Vec3> {
    (contact.is_steeped && is_walkable(contact.steep_normal, min_ground_dot))
        .then_some(contact.steep_normal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::CollisionData;
    use crate::config::DerivedParams;
    use crate::mock::{MockQuery, Plane};

    fn min_dot() -> f32 {
        DerivedParams::default().min_ground_dot
    }

    fn just_left_ground() -> ContactState {
        ContactState {
            steps_since_last_grounded: 1,
            steps_since_last_jump_or_thrust: 20,
            ..default()
        }
    }

    fn body(feet: Vec3, velocity: Vec3) -> BodySnapshot {
        BodySnapshot {
            feet,
            velocity,
            radius: 0.5,
        }
    }

    #[test]
    fn snaps_onto_floor_below() {
        let query = MockQuery::floor(0.0);
        let result = snap_to_ground(
            &just_left_ground(),
            &ControllerConfig::default(),
            min_dot(),
            body(Vec3::new(0.0, 0.2, 0.0), Vec3::new(3.0, 0.0, 0.0)),
            &query,
        )
        .expect("floor is within sweep distance");

        assert!((result.normal - Vec3::Y).length() < 1e-5);
        assert_eq!(result.velocity, None);
    }

    #[test]
    fn snap_redirects_upward_velocity_keeping_speed() {
        let query = MockQuery::floor(0.0);
        let velocity = Vec3::new(3.0, 1.0, 0.0);
        let result = snap_to_ground(
            &just_left_ground(),
            &ControllerConfig::default(),
            min_dot(),
            body(Vec3::new(0.0, 0.1, 0.0), velocity),
            &query,
        )
        .unwrap();

        let corrected = result.velocity.unwrap();
        assert!(corrected.y.abs() < 1e-5);
        assert!((corrected.length() - velocity.length()).abs() < 1e-4);
    }

    #[test]
    fn snap_refuses_at_max_snap_speed() {
        let query = MockQuery::floor(0.0);
        let config = ControllerConfig::default();
        let contact = just_left_ground();
        let before = contact;

        let result = snap_to_ground(
            &contact,
            &config,
            min_dot(),
            body(Vec3::new(0.0, 0.1, 0.0), Vec3::X * config.max_snap_speed),
            &query,
        );

        assert!(result.is_none());
        assert_eq!(contact, before);
    }

    #[test]
    fn snap_refuses_after_two_airborne_ticks() {
        let query = MockQuery::floor(0.0);
        let contact = ContactState {
            steps_since_last_grounded: 2,
            ..just_left_ground()
        };
        assert!(snap_to_ground(
            &contact,
            &ControllerConfig::default(),
            min_dot(),
            body(Vec3::new(0.0, 0.1, 0.0), Vec3::X),
            &query,
        )
        .is_none());
    }

    #[test]
    fn snap_refuses_inside_jump_grace() {
        let query = MockQuery::floor(0.0);
        let contact = ContactState {
            steps_since_last_jump_or_thrust: 2,
            ..just_left_ground()
        };
        assert!(snap_to_ground(
            &contact,
            &ControllerConfig::default(),
            min_dot(),
            body(Vec3::new(0.0, 0.1, 0.0), Vec3::X),
            &query,
        )
        .is_none());
    }

    #[test]
    fn snap_refuses_steep_surface() {
        let steep = Vec3::new(-1.0, 0.5, 0.0).normalize();
        let query = MockQuery::new().with(Plane::new(Vec3::ZERO, steep));
        assert!(snap_to_ground(
            &just_left_ground(),
            &ControllerConfig::default(),
            min_dot(),
            body(Vec3::new(0.0, 0.05, 0.0), Vec3::X),
            &query,
        )
        .is_none());
    }

    /// Replays fixed answers: first the sphere hit, then ray answers in order.
    struct ScriptedQuery {
        sphere: Option<CollisionData>,
        rays: std::cell::RefCell<Vec<Option<CollisionData>>>,
    }

    impl SpatialQuery for ScriptedQuery {
        fn cast_sphere(&self, _: Vec3, _: f32, _: Vec3, _: f32) -> Option<CollisionData> {
            self.sphere
        }

        fn cast_ray(&self, _: Vec3, _: Vec3, _: f32) -> Option<CollisionData> {
            self.rays.borrow_mut().remove(0)
        }

        fn overlaps_capsule(&self, _: Vec3, _: Vec3, _: f32) -> bool {
            false
        }
    }

    #[test]
    fn snap_refuses_rim_of_platform_being_left() {
        // The sphere clips the rim behind the body; nothing is below the feet
        // and the rim probe finds no walkable face.
        let query = ScriptedQuery {
            sphere: Some(CollisionData::new(0.05, Vec3::Y, Vec3::new(0.0, 0.0, 0.0), None)),
            rays: vec![None, None].into(),
        };
        let result = snap_to_ground(
            &just_left_ground(),
            &ControllerConfig::default(),
            min_dot(),
            body(Vec3::new(0.3, 0.05, 0.0), Vec3::new(3.0, 0.0, 0.0)),
            &query,
        );
        assert!(result.is_none());
    }

    #[test]
    fn snap_accepts_rim_with_walkable_face() {
        let query = ScriptedQuery {
            sphere: Some(CollisionData::new(0.05, Vec3::Y, Vec3::new(0.0, 0.0, 0.0), None)),
            rays: vec![None, Some(CollisionData::new(0.2, Vec3::Y, Vec3::ZERO, None))].into(),
        };
        let result = snap_to_ground(
            &just_left_ground(),
            &ControllerConfig::default(),
            min_dot(),
            body(Vec3::new(0.3, 0.05, 0.0), Vec3::new(3.0, 0.0, 0.0)),
            &query,
        );
        assert!(result.is_some());
    }

    #[test]
    fn ledge_onto_down_slope_keeps_speed() {
        let angle = 10f32.to_radians();
        let normal = Vec3::new(angle.sin(), angle.cos(), 0.0);
        let query = MockQuery::new().with(Plane::new(Vec3::ZERO, normal));
        let x = 0.1;
        let surface_y = -angle.tan() * x;
        let velocity = Vec3::new(3.0, 0.0, 0.0);

        let result = snap_to_ground(
            &just_left_ground(),
            &ControllerConfig::default(),
            min_dot(),
            body(Vec3::new(x, surface_y + 0.05, 0.0), velocity),
            &query,
        )
        .expect("down slope is walkable and close");

        let corrected = result.velocity.expect("velocity pointed off the slope");
        assert!((corrected.length() - 3.0).abs() < 1e-4);
        assert!(corrected.dot(normal).abs() < 1e-4);
    }

    #[test]
    fn snap_reports_platform_and_misses_past_its_edge() {
        let platform = Entity::from_raw(7);
        let query = MockQuery::new().with(
            Plane::new(Vec3::ZERO, Vec3::Y)
                .ending_at_x(0.0)
                .with_entity(platform),
        );

        let on_platform = snap_to_ground(
            &just_left_ground(),
            &ControllerConfig::default(),
            min_dot(),
            body(Vec3::new(-0.2, 0.1, 0.0), Vec3::new(3.0, 0.0, 0.0)),
            &query,
        )
        .expect("platform is right below");
        assert_eq!(on_platform.body, Some(platform));

        let past_edge = snap_to_ground(
            &just_left_ground(),
            &ControllerConfig::default(),
            min_dot(),
            body(Vec3::new(0.4, 0.1, 0.0), Vec3::new(3.0, 0.0, 0.0)),
            &query,
        );
        assert!(past_edge.is_none());
    }

    #[test]
    fn crevasse_promotes_walkable_steep_normal() {
        let contact = ContactState {
            is_steeped: true,
            steep_normal: Vec3::new(0.0, 0.9, 0.3).normalize(),
            ..default()
        };
        assert_eq!(check_crevasse(&contact, min_dot()), Some(contact.steep_normal));
    }

    #[test]
    fn crevasse_rejects_wall() {
        let contact = ContactState {
            is_steeped: true,
            steep_normal: Vec3::X,
            ..default()
        };
        assert_eq!(check_crevasse(&contact, min_dot()), None);

        let untouched = ContactState::default();
        assert_eq!(check_crevasse(&untouched, min_dot()), None);
    }
}
