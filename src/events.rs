//! Observer notifications.
//!
//! Sent by the controller systems for animation, camera and audio consumers.
//! Nothing in the controller itself reads them back.

use bevy::prelude::*;

use crate::actions::JumpKind;

/// A jump was performed.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct Jumped {
    pub entity: Entity,
    pub kind: JumpKind,
    pub direction: Vec3,
}

/// The controller went from airborne to grounded.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct Landed {
    pub entity: Entity,
    /// Vertical impact speed relative to the ground, normalized to 0..=1.
    pub impact: f32,
}

/// A thrust was performed.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct Thrusted {
    pub entity: Entity,
    pub direction: Vec3,
}

/// Horizontal speed relative to `max_speed`, sent every fixed tick.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct HorizontalSpeed {
    pub entity: Entity,
    pub ratio: f32,
}

/// The crouch state changed.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct CrouchChanged {
    pub entity: Entity,
    pub crouching: bool,
}
