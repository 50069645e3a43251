//! Slope-aware horizontal movement.
//!
//! Turns the move input into a target velocity and returns the acceleration
//! needed to approach it, clamped so the body never accelerates faster than the
//! configured limit. Grounded movement follows the ground plane and inherits
//! the velocity of the body stood on.

use bevy::prelude::*;

use crate::config::ControllerConfig;
use crate::state::ContactState;

/// Horizontal basis derived from the body yaw. Forward is -Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YawBasis {
    pub right: Vec3,
    pub forward: Vec3,
}

impl YawBasis {
    pub fn from_rotation(rotation: Quat) -> Self {
        let right = (rotation * Vec3::X).reject_from_normalized(Vec3::Y);
        let forward = (rotation * Vec3::NEG_Z).reject_from_normalized(Vec3::Y);
        Self {
            right: right.try_normalize().unwrap_or(Vec3::X),
            forward: forward.try_normalize().unwrap_or(Vec3::NEG_Z),
        }
    }

    /// World direction for a 2D input (x = strafe, y = forward).
    #[inline]
    pub fn direction(&self, input: Vec2) -> Vec3 {
        self.right * input.x + self.forward * input.y
    }
}

impl Default for YawBasis {
    fn default() -> Self {
        Self::from_rotation(Quat::IDENTITY)
    }
}

/// Everything the solver reads for one tick.
#[derive(Debug, Clone, Copy)]
pub struct LocomotionInput {
    pub move_input: Vec2,
    pub basis: YawBasis,
    pub velocity: Vec3,
    /// Velocity of the connected body, zero when there is none.
    pub connected_velocity: Vec3,
    pub crouching: bool,
    pub dt: f32,
}

/// Horizontal velocity (y dropped).
#[inline]
pub fn horizontal(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Horizontal speed as a fraction of `max_speed`.
pub fn relative_horizontal_speed(velocity: Vec3, max_speed: f32) -> f32 {
    if max_speed <= 0.0 {
        return 0.0;
    }
    horizontal(velocity).length() / max_speed
}

/// Project `v` onto the plane with unit `normal`, keeping its length.
#[inline]
fn along_plane(v: Vec3, normal: Vec3) -> Vec3 {
    v.reject_from_normalized(normal).normalize_or_zero() * v.length()
}

/// Acceleration to apply this tick, or `None` when airborne without input.
pub fn movement_acceleration(
    contact: &ContactState,
    config: &ControllerConfig,
    input: &LocomotionInput,
) -> Option<Vec3> {
    let grounded = contact.is_grounded;
    if !grounded && input.move_input == Vec2::ZERO {
        return None;
    }

    let target_magnitude = config.max_speed
        * if input.crouching && grounded {
            config.crouch_speed
        } else {
            1.0
        };
    let target_direction = input.basis.direction(input.move_input);
    let mut target = target_direction * target_magnitude;

    let mut current = horizontal(input.velocity);
    let current_speed = current.length();
    let dot = current.normalize_or_zero().dot(target_direction);

    let sharp_turn = if (grounded || config.airborne_sharp_turn) && dot < 0.0 {
        1.0 + (config.max_sharp_turn_multiplier - 1.0) * -dot
    } else {
        1.0
    };
    let max_acceleration =
        config.acceleration * if grounded { 1.0 } else { config.air_control } * sharp_turn;

    if grounded {
        target = along_plane(target, contact.ground_normal) + input.connected_velocity;
        current = along_plane(current, contact.ground_normal);
    } else if current_speed > config.max_speed {
        // Keep momentum above max speed, only steering with input.
        target = (current * dot.clamp(0.0, 1.0) + target).clamp_length_max(current_speed);
    }

    let mut acceleration = ((target - current) / input.dt).clamp_length_max(max_acceleration);

    if !grounded && contact.is_steeped && contact.steep_normal.dot(target_direction) < 0.0 {
        // Slide along steep walls instead of pushing into them.
        if let Some(along) = (-contact.steep_normal).cross(Vec3::Y).try_normalize() {
            acceleration = along * acceleration.dot(along);
        }
    }

    Some(acceleration)
}
