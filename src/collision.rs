//! Contact and query result structures.
//!
//! [`CollisionData`] is what a spatial query returns. [`ContactSample`] is one
//! solver contact reported by the physics engine for the current tick, and
//! [`ContactBuffer`] collects them until the classifier consumes them.

use bevy::prelude::*;

/// Information about a raycast/shapecast hit.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollisionData {
    /// Distance travelled along the cast before the hit.
    pub distance: f32,
    /// Unit normal of the hit surface, facing the caster.
    pub normal: Vec3,
    /// World position of the hit point.
    pub point: Vec3,
    /// Entity that was hit (if any).
    pub entity: Option<Entity>,
}

impl CollisionData {
    /// Create a collision result.
    pub fn new(distance: f32, normal: Vec3, point: Vec3, entity: Option<Entity>) -> Self {
        Self {
            distance,
            normal,
            point,
            entity,
        }
    }
}

/// A single contact point between the controller and another collider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactSample {
    /// Surface normal pointing away from the touched surface, toward the controller.
    pub normal: Vec3,
    /// World-space contact point.
    pub point: Vec3,
    /// Velocity of the controller relative to the touched body.
    pub relative_velocity: Vec3,
    /// Rigid body owning the touched collider, if it has one.
    pub body: Option<Entity>,
}

impl ContactSample {
    pub fn new(normal: Vec3, point: Vec3) -> Self {
        Self {
            normal,
            point,
            relative_velocity: Vec3::ZERO,
            body: None,
        }
    }

    /// Builder: set the relative velocity.
    pub fn with_relative_velocity(mut self, relative_velocity: Vec3) -> Self {
        self.relative_velocity = relative_velocity;
        self
    }

    /// Builder: set the touched body.
    pub fn with_body(mut self, body: Entity) -> Self {
        self.body = Some(body);
        self
    }
}

/// Contacts accumulated for the current fixed tick.
///
/// Filled by the physics backend before classification and cleared once the
/// tick's pipeline has finished.
#[derive(Component, Debug, Clone, Default)]
pub struct ContactBuffer {
    samples: Vec<ContactSample>,
}

impl ContactBuffer {
    pub fn push(&mut self, sample: ContactSample) {
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[ContactSample] {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Drop all samples while keeping the allocation.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
