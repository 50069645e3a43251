//! Player command components.
//!
//! [`MovementIntent`] is written by whatever produces input (keyboard, gamepad,
//! AI, network) and read by the controller systems. [`LookAngles`] holds the
//! accumulated view angles that drive the body yaw and any camera rig.

use bevy::prelude::*;

/// Commands for a first-person controller.
///
/// # Example
///
/// ```rust
/// use bevy::prelude::*;
/// use fps_rigidbody_controller::prelude::*;
///
/// let mut intent = MovementIntent::new();
/// intent.set_move(Vec2::new(0.0, 1.0));
/// assert!(intent.is_moving());
///
/// intent.set_jump_pressed(true);
/// intent.request_thrust();
/// intent.toggle_crouch();
///
/// intent.clear();
/// assert!(!intent.is_moving());
/// ```
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
pub struct MovementIntent {
    /// Move input (x = strafe right, y = forward). Clamped to unit length.
    pub move_input: Vec2,
    /// Look delta in degrees (x = yaw, y = pitch) not yet applied.
    pub look_delta: Vec2,
    /// Whether the jump action is currently held.
    ///
    /// A press jumps immediately (or buffers the jump while airborne); a
    /// release drops a buffered jump. Edge detection is done by the controller.
    pub jump_pressed: bool,
    pub(crate) jump_pressed_prev: bool,
    /// Pending thrust trigger.
    pub thrust_requested: bool,
    /// Pending crouch change.
    pub crouch_request: Option<CrouchRequest>,
}

/// A crouch command.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrouchRequest {
    /// Crouch (`true`) or stand up (`false`), for hold-to-crouch input.
    Set(bool),
    /// Flip the current crouch state, for toggle input.
    Toggle,
}

/// Jump button transition since the last frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpEdge {
    Pressed,
    Released,
}

impl MovementIntent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the move input. Longer vectors are clamped to unit length.
    pub fn set_move(&mut self, input: Vec2) {
        self.move_input = input.clamp_length_max(1.0);
    }

    /// Accumulate a look delta (degrees) for the next frame.
    pub fn add_look(&mut self, delta: Vec2) {
        self.look_delta += delta;
    }

    pub fn set_jump_pressed(&mut self, pressed: bool) {
        self.jump_pressed = pressed;
    }

    pub fn is_jump_pressed(&self) -> bool {
        self.jump_pressed
    }

    pub fn request_thrust(&mut self) {
        self.thrust_requested = true;
    }

    /// Hold-style crouch command.
    pub fn request_crouch(&mut self, crouched: bool) {
        self.crouch_request = Some(CrouchRequest::Set(crouched));
    }

    /// Toggle-style crouch command.
    pub fn toggle_crouch(&mut self) {
        self.crouch_request = Some(CrouchRequest::Toggle);
    }

    pub fn is_moving(&self) -> bool {
        self.move_input != Vec2::ZERO
    }

    /// Clear movement and all pending requests.
    pub fn clear(&mut self) {
        self.move_input = Vec2::ZERO;
        self.look_delta = Vec2::ZERO;
        self.jump_pressed = false;
        self.thrust_requested = false;
        self.crouch_request = None;
    }

    /// Consume the jump button transition since the last call, if any.
    pub(crate) fn take_jump_edge(&mut self) -> Option<JumpEdge> {
        let edge = match (self.jump_pressed_prev, self.jump_pressed) {
            (false, true) => Some(JumpEdge::Pressed),
            (true, false) => Some(JumpEdge::Released),
            _ => None,
        };
        self.jump_pressed_prev = self.jump_pressed;
        edge
    }

    pub(crate) fn take_look_delta(&mut self) -> Vec2 {
        std::mem::take(&mut self.look_delta)
    }

    pub(crate) fn take_thrust_request(&mut self) -> bool {
        std::mem::take(&mut self.thrust_requested)
    }

    pub(crate) fn take_crouch_request(&mut self) -> Option<CrouchRequest> {
        self.crouch_request.take()
    }
}

/// Accumulated view angles in degrees.
///
/// Pitch is clamped to [-90, 90] (positive looks up), yaw wraps at 360
/// (positive turns right). The body only follows the yaw.
#[derive(Component, Reflect, Debug, Clone, Copy, Default, PartialEq)]
#[reflect(Component)]
pub struct LookAngles {
    pub pitch: f32,
    pub yaw: f32,
}

impl LookAngles {
    pub fn new(pitch: f32, yaw: f32) -> Self {
        let mut angles = Self::default();
        angles.apply_delta(Vec2::new(yaw, pitch));
        angles
    }

    /// Apply a look delta (x = yaw, y = pitch).
    pub fn apply_delta(&mut self, delta: Vec2) {
        self.pitch = (self.pitch + delta.y).clamp(-90.0, 90.0);
        self.yaw = (self.yaw + delta.x) % 360.0;
    }

    /// Rotation of the body about world up.
    pub fn body_rotation(&self) -> Quat {
        Quat::from_rotation_y(-self.yaw.to_radians())
    }

    /// Full view rotation, for a camera attached to the body.
    pub fn view_rotation(&self) -> Quat {
        self.body_rotation() * Quat::from_rotation_x(self.pitch.to_radians())
    }
}
