//! Controller state.
//!
//! [`FpsController`] is the central hub holding every piece of state the
//! pipeline carries across ticks. The marker components at the bottom mirror
//! its contact state for gameplay queries and are kept in sync automatically.

use bevy::prelude::*;

use crate::config::{ControllerConfig, DerivedParams};

/// Contact classification results, persisted across ticks.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct ContactState {
    pub is_grounded: bool,
    pub is_steeped: bool,
    /// Unit ground normal, `Vec3::Y` when there is no ground contact.
    pub ground_normal: Vec3,
    /// Unit steep normal, `Vec3::Y` when there is no steep contact.
    pub steep_normal: Vec3,
    pub steps_since_last_grounded: u32,
    pub steps_since_last_jump_or_thrust: u32,
    pub coyote_time_counter: f32,
    /// Average velocity relative to the ground contacts of this tick.
    pub ground_relative_velocity: Vec3,
    /// Grounded state of the previous tick.
    pub was_grounded: bool,
}

impl Default for ContactState {
    fn default() -> Self {
        Self {
            is_grounded: false,
            is_steeped: false,
            ground_normal: Vec3::Y,
            steep_normal: Vec3::Y,
            steps_since_last_grounded: 0,
            steps_since_last_jump_or_thrust: 0,
            coyote_time_counter: 0.0,
            ground_relative_velocity: Vec3::ZERO,
            was_grounded: false,
        }
    }
}

impl ContactState {
    /// Reset both normals and flags to the "touching nothing" state.
    pub fn clear_surfaces(&mut self) {
        self.is_grounded = false;
        self.is_steeped = false;
        self.ground_normal = Vec3::Y;
        self.steep_normal = Vec3::Y;
        self.ground_relative_velocity = Vec3::ZERO;
    }
}

/// Jump and thrust bookkeeping.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq)]
pub struct VerticalActionState {
    pub jump_phase: u32,
    pub thrust_phase: u32,
    pub is_jumping_or_thrusting: bool,
    pub thrust_charge_counter: f32,
    pub no_gravity_counter: f32,
    /// A jump was requested while airborne and fires on the next grounded frame.
    pub is_buffering_jump: bool,
}

impl VerticalActionState {
    /// Whether the post-thrust gravity-free window is open.
    #[inline]
    pub fn gravity_suspended(&self) -> bool {
        self.no_gravity_counter > 0.0
    }
}

/// Crouch flag and capsule height targets.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct CrouchState {
    pub is_crouching: bool,
    /// Capsule height captured when the controller is initialized.
    pub standing_height: f32,
    /// Height the capsule interpolates toward each frame.
    pub target_height: f32,
}

impl Default for CrouchState {
    fn default() -> Self {
        Self {
            is_crouching: false,
            standing_height: 2.0,
            target_height: 2.0,
        }
    }
}

/// Body the controller stood on during the current tick.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct ConnectedBody {
    pub entity: Entity,
    /// Linear velocity of the body, read during connection tracking.
    pub velocity: Vec3,
}

impl ConnectedBody {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            velocity: Vec3::ZERO,
        }
    }
}

/// Core first-person controller component.
///
/// This is the **central hub** for all controller state. Systems read it,
/// compute, and write results back. Forces are accumulated here during the
/// tick and handed to the physics engine once at the end.
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
pub struct FpsController {
    pub contact: ContactState,
    pub actions: VerticalActionState,
    pub crouch: CrouchState,
    /// Cleared at the end of every tick.
    pub connected: Option<ConnectedBody>,
    /// Thresholds derived from the config at initialization.
    pub derived: DerivedParams,
    /// Horizontal speed divided by `max_speed`, updated every tick.
    pub relative_horizontal_speed: f32,
    #[reflect(ignore)]
    pub(crate) applied_config: Option<ControllerConfig>,
    pub(crate) accumulated_force: Vec3,
    pub(crate) applied_force: Vec3,
}

impl FpsController {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_grounded(&self) -> bool {
        self.contact.is_grounded
    }

    #[inline]
    pub fn is_steeped(&self) -> bool {
        self.contact.is_steeped
    }

    #[inline]
    pub fn is_crouching(&self) -> bool {
        self.crouch.is_crouching
    }

    /// Ground normal, or `Vec3::Y` when airborne.
    #[inline]
    pub fn ground_normal(&self) -> Vec3 {
        self.contact.ground_normal
    }

    /// Thrusts still available before recharge.
    pub fn thrusts_remaining(&self, max_thrusts: u32) -> u32 {
        max_thrusts.saturating_sub(self.actions.thrust_phase)
    }

    /// Add a force to be applied at the end of this tick.
    pub fn add_force(&mut self, force: Vec3) {
        self.accumulated_force += force;
    }

    /// Force accumulated so far this tick.
    pub fn accumulated_force(&self) -> Vec3 {
        self.accumulated_force
    }

    /// Start a new tick. Returns the force handed to the physics engine last
    /// tick so the backend can take it back out.
    pub(crate) fn prepare_new_frame(&mut self) -> Vec3 {
        self.accumulated_force = Vec3::ZERO;
        std::mem::take(&mut self.applied_force)
    }

    /// Finish the tick. Returns the force to hand to the physics engine.
    pub(crate) fn finalize_frame(&mut self) -> Vec3 {
        self.applied_force = self.accumulated_force;
        self.accumulated_force
    }
}

/// Marker component indicating the controller is grounded.
///
/// Includes virtual (coyote time) grounding. Mutually exclusive with [`Airborne`].
///
/// # Example
///
/// ```rust
/// use bevy::prelude::*;
/// use fps_rigidbody_controller::prelude::*;
///
/// fn footsteps(players: Query<Entity, With<Grounded>>) {
///     for _player in &players {
///         // play footstep audio
///     }
/// }
/// ```
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Grounded;

/// Marker component indicating the controller is airborne.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Airborne;

/// Marker component indicating the controller touches a surface too steep to stand on.
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
pub struct TouchingSteep {
    /// Consolidated normal of the steep contacts.
    pub normal: Vec3,
}

impl Default for TouchingSteep {
    fn default() -> Self {
        Self { normal: Vec3::Y }
    }
}

impl TouchingSteep {
    pub fn new(normal: Vec3) -> Self {
        Self { normal }
    }

    /// Whether the surface could be stood on with the given threshold.
    pub fn is_walkable(&self, min_ground_dot: f32) -> bool {
        self.normal.y >= min_ground_dot
    }
}
