//! Contact classification.
//!
//! Runs first in every fixed tick. Splits the tick's contact samples into
//! ground and steep sets, consolidates their normals, falls back to the
//! ground resolver and coyote time when nothing walkable was touched, and
//! reports landing transitions.

use bevy::prelude::*;

use crate::backend::SpatialQuery;
use crate::collision::ContactSample;
use crate::config::ControllerConfig;
use crate::ground::{check_crevasse, is_walkable, snap_to_ground, BodySnapshot, JUMP_GRACE_STEPS};
use crate::state::{ContactState, VerticalActionState};

/// Contacts with `normal.y` above this count as steep (walls included, ceilings not).
pub const MIN_STEEP_DOT: f32 = -0.01;

/// How the controller became grounded this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroundSource {
    Contact,
    Snap,
    Crevasse,
    Coyote,
}

/// Side effects of one classification pass for the caller to apply.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClassifyOutcome {
    pub source: Option<GroundSource>,
    /// Body stood on this tick.
    pub connected: Option<Entity>,
    /// Velocity the body must be given after snapping.
    pub velocity: Option<Vec3>,
    /// Impact ratio in 0..=1 when the controller went from airborne to grounded.
    pub landed: Option<f32>,
}

/// Classify this tick's contacts and update the contact state.
#[allow(clippy::too_many_arguments)]
pub fn classify_contacts(
    contact: &mut ContactState,
    actions: &mut VerticalActionState,
    config: &ControllerConfig,
    min_ground_dot: f32,
    samples: &[ContactSample],
    body: BodySnapshot,
    dt: f32,
    query: &dyn SpatialQuery,
) -> ClassifyOutcome {
    let mut outcome = ClassifyOutcome::default();

    contact.steps_since_last_grounded = contact.steps_since_last_grounded.saturating_add(1);
    contact.steps_since_last_jump_or_thrust =
        contact.steps_since_last_jump_or_thrust.saturating_add(1);
    contact.was_grounded = contact.is_grounded;
    contact.clear_surfaces();

    if contact.steps_since_last_jump_or_thrust < JUMP_GRACE_STEPS {
        return outcome;
    }

    let mut ground_sum = Vec3::ZERO;
    let mut steep_sum = Vec3::ZERO;
    let mut relative_sum = Vec3::ZERO;
    let mut ground_count = 0u32;

    for sample in samples {
        if is_walkable(sample.normal, min_ground_dot) {
            contact.is_grounded = true;
            ground_sum += sample.normal;
            relative_sum += sample.relative_velocity;
            ground_count += 1;
            if outcome.connected.is_none() {
                outcome.connected = sample.body;
            }
        }
        if sample.normal.y > MIN_STEEP_DOT {
            contact.is_steeped = true;
            steep_sum += sample.normal;
        }
    }

    if contact.is_steeped {
        contact.steep_normal = steep_sum.try_normalize().unwrap_or(Vec3::Y);
    }

    if contact.is_grounded {
        contact.ground_normal = ground_sum.try_normalize().unwrap_or(Vec3::Y);
        contact.ground_relative_velocity = relative_sum / ground_count as f32;
        touch_ground(contact, actions);
        outcome.source = Some(GroundSource::Contact);
    } else if let Some(snap) = snap_to_ground(contact, config, min_ground_dot, body, query) {
        trace!("snapped to ground, normal {:?}", snap.normal);
        contact.is_grounded = true;
        contact.ground_normal = snap.normal;
        contact.steps_since_last_grounded = 0;
        actions.jump_phase = 0;
        actions.is_jumping_or_thrusting = false;
        outcome.source = Some(GroundSource::Snap);
        outcome.connected = snap.body;
        outcome.velocity = snap.velocity;
    } else if let Some(normal) = check_crevasse(contact, min_ground_dot) {
        trace!("crevasse treated as ground");
        contact.is_grounded = true;
        contact.ground_normal = normal;
        contact.steps_since_last_grounded = 0;
        actions.jump_phase = 0;
        outcome.source = Some(GroundSource::Crevasse);
    }

    contact.coyote_time_counter += dt;
    if !contact.is_grounded
        && (!contact.is_steeped || is_walkable(contact.steep_normal, min_ground_dot))
        && contact.coyote_time_counter <= coyote_budget(config, body.velocity)
        && actions.jump_phase == 0
        && !actions.is_jumping_or_thrusting
    {
        contact.is_grounded = true;
        outcome.source = Some(GroundSource::Coyote);
    }

    if contact.is_grounded && !contact.was_grounded {
        let impact = (contact.ground_relative_velocity.y.abs()
            / config.landing_velocity_upper_limit)
            .clamp(0.0, 1.0);
        outcome.landed = Some(impact);
    }

    outcome
}

/// Reset on a real walkable contact. Snapping and crevasses leave the coyote
/// counter running from the last contact.
fn touch_ground(contact: &mut ContactState, actions: &mut VerticalActionState) {
    actions.jump_phase = 0;
    actions.is_jumping_or_thrusting = false;
    contact.coyote_time_counter = 0.0;
    contact.steps_since_last_grounded = 0;
}

/// Coyote window, shrunk proportionally above `max_speed` when speed scaling is on.
pub fn coyote_budget(config: &ControllerConfig, velocity: Vec3) -> f32 {
    if !config.coyote_speed_scaling {
        return config.coyote_time;
    }
    let horizontal = Vec3::new(velocity.x, 0.0, velocity.z).length();
    config.coyote_time * (config.max_speed / horizontal.max(config.max_speed))
}
