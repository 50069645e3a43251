//! Crouching and capsule height interpolation.

use bevy::prelude::*;

use crate::backend::SpatialQuery;
use crate::config::ControllerConfig;
use crate::state::CrouchState;

/// Probe capsules are shrunk by this factor so they do not touch the floor or
/// adjacent walls the controller is already resting against.
pub const PROBE_RADIUS_SCALE: f32 = 0.99;
/// Height difference below which the capsule snaps to its target.
pub const HEIGHT_SNAP_EPSILON: f32 = 1e-4;

/// Whether a capsule of `height` standing on `feet` would intersect something.
pub fn is_obstructed(query: &dyn SpatialQuery, feet: Vec3, radius: f32, height: f32) -> bool {
    let probe_radius = radius * PROBE_RADIUS_SCALE;
    let a = feet + Vec3::Y * radius;
    let b = feet + Vec3::Y * (height - probe_radius).max(radius);
    query.overlaps_capsule(a, b, probe_radius)
}

/// Request a crouch state.
///
/// Crouching always succeeds. Standing up fails, leaving everything untouched,
/// when the standing capsule would overlap something, unless
/// `ignore_obstructions` is set.
pub fn do_crouch(
    state: &mut CrouchState,
    config: &ControllerConfig,
    crouched: bool,
    ignore_obstructions: bool,
    query: &dyn SpatialQuery,
    feet: Vec3,
    radius: f32,
) -> bool {
    if crouched {
        state.target_height = state.standing_height * config.crouch_height;
    } else {
        if !ignore_obstructions && is_obstructed(query, feet, radius, state.standing_height) {
            return false;
        }
        state.target_height = state.standing_height;
    }
    state.is_crouching = crouched;
    true
}

/// Next capsule height for this frame, or `None` when it should stay as is.
///
/// Growing is refused for the frame when the grown capsule would overlap
/// something.
pub fn next_capsule_height(
    state: &CrouchState,
    config: &ControllerConfig,
    current: f32,
    dt: f32,
    query: &dyn SpatialQuery,
    feet: Vec3,
    radius: f32,
) -> Option<f32> {
    if current == state.target_height {
        return None;
    }
    let t = (config.crouch_transition_speed * dt).clamp(0.0, 1.0);
    let mut next = current + (state.target_height - current) * t;
    if (next - state.target_height).abs() < HEIGHT_SNAP_EPSILON {
        next = state.target_height;
    }
    if next > current && is_obstructed(query, feet, radius, next) {
        return None;
    }
    Some(next)
}
