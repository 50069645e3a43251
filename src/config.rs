//! Controller configuration components.
//!
//! [`ControllerConfig`] holds every tunable of the controller. Values derived
//! from it (ground threshold, launch magnitudes) live in [`DerivedParams`] and
//! are recomputed whenever the config changes.

use bevy::prelude::*;
use thiserror::Error;

/// Relative bias subtracted from the cosine of the max ground angle so a surface
/// sitting exactly at the limit still classifies as ground despite float error.
pub const GROUND_DOT_BIAS: f32 = 1.414214e-6;

/// Configuration parameters for the first-person controller.
///
/// Angles are in radians, distances in world units, times in seconds.
#[derive(Component, Reflect, Debug, Clone, Copy, PartialEq)]
#[reflect(Component)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ControllerConfig {
    // === Movement ===
    /// Maximum horizontal movement speed.
    pub max_speed: f32,
    /// Maximum horizontal acceleration.
    pub acceleration: f32,
    /// Acceleration multiplier reached when reversing direction.
    pub max_sharp_turn_multiplier: f32,
    /// Acceleration multiplier while airborne (0.0-1.0).
    pub air_control: f32,
    /// Whether the sharp-turn multiplier also applies in the air.
    pub airborne_sharp_turn: bool,

    // === Ground ===
    /// Steepest surface that still counts as ground.
    pub max_ground_angle: f32,
    /// Time after leaving ground during which the body still counts as grounded.
    pub coyote_time: f32,
    /// Shrink the coyote window when moving faster than `max_speed`.
    pub coyote_speed_scaling: bool,
    /// Speed at or above which the body is never snapped back to ground.
    pub max_snap_speed: f32,
    /// Length of the downward snap probe.
    pub sweep_distance: f32,
    /// Gravity magnitude. Applied against the ground normal.
    pub gravity: f32,

    // === Jump ===
    /// Apex height of a jump from rest.
    pub jump_height: f32,
    /// Extra jumps allowed before touching ground again.
    pub max_air_jumps: u32,
    /// Allow jumping off steep surfaces.
    pub enable_wall_jump: bool,
    /// Zero all vertical velocity before a jump. When false only downward velocity is removed.
    pub jump_cancels_vertical_velocity: bool,
    /// Jump along the ground normal instead of straight up.
    pub jump_along_ground_normal: bool,

    // === Crouch ===
    /// Crouched capsule height as a fraction of standing height.
    pub crouch_height: f32,
    /// Speed multiplier while crouched and grounded.
    pub crouch_speed: f32,
    /// Rate at which the capsule height approaches its target.
    pub crouch_transition_speed: f32,

    // === Thrust ===
    pub enable_thrust: bool,
    /// Height the thrust impulse would reach if fired straight up.
    pub thrust_length: f32,
    /// How much world-up is blended into the thrust direction (0.0-1.0).
    pub thrust_vertical_bias: f32,
    /// Thrusts available before recharging.
    pub max_thrusts: u32,
    /// Grounded time needed to recharge all thrusts.
    pub thrust_recharge_time: f32,
    /// Allow thrusting while airborne.
    pub thrust_airborne: bool,
    /// Align grounded thrusts with the ground plane.
    pub thrust_along_ground: bool,
    /// Zero velocity before adding the thrust.
    pub thrust_resets_velocity: bool,
    /// Gravity-free window after a thrust.
    pub thrust_no_gravity_time: f32,
    /// Strip velocity bouncing away from surfaces during the gravity-free window.
    pub thrust_cancels_bounce: bool,

    // === Landing ===
    /// Vertical impact speed mapped to a landing impact of 1.0.
    pub landing_velocity_upper_limit: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            // Movement
            max_speed: 5.0,
            acceleration: 30.0,
            max_sharp_turn_multiplier: 2.0,
            air_control: 0.25,
            airborne_sharp_turn: false,
            // Ground
            max_ground_angle: std::f32::consts::FRAC_PI_4,
            coyote_time: 0.2,
            coyote_speed_scaling: false,
            max_snap_speed: 7.5,
            sweep_distance: 0.5,
            gravity: 9.81,
            // Jump
            jump_height: 2.0,
            max_air_jumps: 0,
            enable_wall_jump: true,
            jump_cancels_vertical_velocity: true,
            jump_along_ground_normal: true,
            // Crouch
            crouch_height: 0.75,
            crouch_speed: 0.5,
            crouch_transition_speed: 10.0,
            // Thrust
            enable_thrust: true,
            thrust_length: 6.0,
            thrust_vertical_bias: 0.25,
            max_thrusts: 1,
            thrust_recharge_time: 1.0,
            thrust_airborne: true,
            thrust_along_ground: true,
            thrust_resets_velocity: false,
            thrust_no_gravity_time: 0.15,
            thrust_cancels_bounce: true,
            // Landing
            landing_velocity_upper_limit: 5.0,
        }
    }
}

impl ControllerConfig {
    /// Config tuned for a regular player character.
    pub fn player() -> Self {
        Self::default()
    }

    /// Config for fast arena movement: double jump, two thrusts, air turning.
    pub fn arena() -> Self {
        Self {
            max_speed: 8.0,
            acceleration: 60.0,
            airborne_sharp_turn: true,
            coyote_speed_scaling: true,
            max_snap_speed: 12.0,
            max_air_jumps: 1,
            max_thrusts: 2,
            thrust_recharge_time: 1.5,
            ..default()
        }
    }

    /// Builder: set movement parameters.
    pub fn with_movement(mut self, max_speed: f32, acceleration: f32) -> Self {
        self.max_speed = max_speed;
        self.acceleration = acceleration;
        self
    }

    /// Builder: set the max walkable angle (radians).
    pub fn with_max_ground_angle(mut self, angle: f32) -> Self {
        self.max_ground_angle = angle;
        self
    }

    /// Builder: set coyote time.
    pub fn with_coyote_time(mut self, time: f32) -> Self {
        self.coyote_time = time;
        self
    }

    /// Builder: set ground snapping parameters.
    pub fn with_snap(mut self, max_snap_speed: f32, sweep_distance: f32) -> Self {
        self.max_snap_speed = max_snap_speed;
        self.sweep_distance = sweep_distance;
        self
    }

    /// Builder: set gravity magnitude.
    pub fn with_gravity(mut self, gravity: f32) -> Self {
        self.gravity = gravity;
        self
    }

    /// Builder: set jump height.
    pub fn with_jump_height(mut self, height: f32) -> Self {
        self.jump_height = height;
        self
    }

    /// Builder: set number of air jumps.
    pub fn with_air_jumps(mut self, count: u32) -> Self {
        self.max_air_jumps = count;
        self
    }

    /// Builder: set crouch parameters.
    pub fn with_crouch(mut self, height: f32, speed: f32) -> Self {
        self.crouch_height = height;
        self.crouch_speed = speed;
        self
    }

    /// Builder: set thrust count and recharge time.
    pub fn with_thrusts(mut self, max_thrusts: u32, recharge_time: f32) -> Self {
        self.max_thrusts = max_thrusts;
        self.thrust_recharge_time = recharge_time;
        self
    }

    /// Builder: set thrust length.
    pub fn with_thrust_length(mut self, length: f32) -> Self {
        self.thrust_length = length;
        self
    }

    /// Builder: set the gravity-free window after thrusting.
    pub fn with_thrust_no_gravity_time(mut self, time: f32) -> Self {
        self.thrust_no_gravity_time = time;
        self
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_speed", self.max_speed),
            ("gravity", self.gravity),
            ("landing_velocity_upper_limit", self.landing_velocity_upper_limit),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NotPositive { field, value });
            }
        }

        let non_negative = [
            ("acceleration", self.acceleration),
            ("coyote_time", self.coyote_time),
            ("max_snap_speed", self.max_snap_speed),
            ("sweep_distance", self.sweep_distance),
            ("jump_height", self.jump_height),
            ("crouch_transition_speed", self.crouch_transition_speed),
            ("thrust_length", self.thrust_length),
            ("thrust_recharge_time", self.thrust_recharge_time),
            ("thrust_no_gravity_time", self.thrust_no_gravity_time),
        ];
        for (field, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Negative { field, value });
            }
        }

        let unit = [
            ("air_control", self.air_control),
            ("crouch_speed", self.crouch_speed),
            ("thrust_vertical_bias", self.thrust_vertical_bias),
        ];
        for (field, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfUnitRange { field, value });
            }
        }

        if !(self.crouch_height > 0.0 && self.crouch_height <= 1.0) {
            return Err(ConfigError::CrouchHeight(self.crouch_height));
        }
        if self.max_sharp_turn_multiplier < 1.0 {
            return Err(ConfigError::SharpTurnMultiplier(self.max_sharp_turn_multiplier));
        }
        if !(0.0..std::f32::consts::FRAC_PI_2).contains(&self.max_ground_angle) {
            return Err(ConfigError::GroundAngle(self.max_ground_angle));
        }
        Ok(())
    }
}

/// Reasons a [`ControllerConfig`] is rejected by [`ControllerConfig::validate`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("`{field}` must be positive and finite, got {value}")]
    NotPositive { field: &'static str, value: f32 },
    #[error("`{field}` must be non-negative and finite, got {value}")]
    Negative { field: &'static str, value: f32 },
    #[error("`{field}` must be within 0.0..=1.0, got {value}")]
    OutOfUnitRange { field: &'static str, value: f32 },
    #[error("crouch height fraction must be within (0.0, 1.0], got {0}")]
    CrouchHeight(f32),
    #[error("sharp turn multiplier must be at least 1.0, got {0}")]
    SharpTurnMultiplier(f32),
    #[error("max ground angle must be within [0, pi/2) radians, got {0}")]
    GroundAngle(f32),
}

/// Values computed once from a [`ControllerConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct DerivedParams {
    /// Minimum `normal.y` of a ground contact.
    pub min_ground_dot: f32,
    /// Launch speed reaching `jump_height`.
    pub jump_magnitude: f32,
    /// Launch speed reaching `thrust_length`.
    pub thrust_magnitude: f32,
}

impl Default for DerivedParams {
    fn default() -> Self {
        Self::from_config(&ControllerConfig::default())
    }
}

impl DerivedParams {
    pub fn from_config(config: &ControllerConfig) -> Self {
        let cos = config.max_ground_angle.cos();
        Self {
            min_ground_dot: cos - GROUND_DOT_BIAS * cos,
            jump_magnitude: launch_speed(config.gravity, config.jump_height),
            thrust_magnitude: launch_speed(config.gravity, config.thrust_length),
        }
    }
}

/// Initial speed that reaches `height` under constant `gravity`.
#[inline]
pub fn launch_speed(gravity: f32, height: f32) -> f32 {
    (2.0 * gravity * height).max(0.0).sqrt()
}
