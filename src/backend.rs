//! Physics backend abstraction.
//!
//! This module defines the trait that physics backends must implement
//! to work with the controller, plus the [`SpatialQuery`] seam the core
//! algorithms use for ray casts, sphere casts and capsule overlaps. The core
//! never talks to a physics engine directly, so backends can be swapped
//! (Rapier3D, XPBD, custom, etc.).

use bevy::ecs::system::{ReadOnlySystemParam, SystemParamItem};
use bevy::prelude::*;

use crate::collision::CollisionData;
use crate::state::FpsController;

/// Synchronous scene queries against the physics world.
///
/// Implementations exclude the controller's own body and all sensors, and
/// honor the controller's collision groups. Returned normals face the caster.
pub trait SpatialQuery {
    /// Sweep a sphere from `origin` along `direction`.
    fn cast_sphere(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
    ) -> Option<CollisionData>;

    /// Cast a ray from `origin` along `direction`.
    fn cast_ray(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<CollisionData>;

    /// Whether a capsule with segment `a`-`b` and `radius` overlaps any collider.
    fn overlaps_capsule(&self, a: Vec3, b: Vec3, radius: f32) -> bool;
}

/// A query that never hits anything.
///
/// Used when the physics world is unavailable; every caller then degrades to
/// the airborne / unobstructed path.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptySpatialQuery;

impl SpatialQuery for EmptySpatialQuery {
    fn cast_sphere(&self, _: Vec3, _: f32, _: Vec3, _: f32) -> Option<CollisionData> {
        None
    }

    fn cast_ray(&self, _: Vec3, _: Vec3, _: f32) -> Option<CollisionData> {
        None
    }

    fn overlaps_capsule(&self, _: Vec3, _: Vec3, _: f32) -> bool {
        false
    }
}

/// Vertical capsule dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct CapsuleShape {
    /// Total height, including both hemispheres.
    pub height: f32,
    pub radius: f32,
}

impl CapsuleShape {
    pub fn new(height: f32, radius: f32) -> Self {
        Self { height, radius }
    }

    #[inline]
    pub fn half_height(&self) -> f32 {
        self.height * 0.5
    }

    /// Bottom of the capsule for a body centered at `center`.
    #[inline]
    pub fn feet(&self, center: Vec3) -> Vec3 {
        center - Vec3::Y * self.half_height()
    }
}

/// Trait for physics backend implementations.
///
/// Implement this trait to integrate a physics engine with the controller.
/// Body accessors are static functions over the [`World`]; scene queries go
/// through the read-only [`Self::Queries`] system parameter so exclusive
/// systems can run them while holding no mutable borrows.
///
/// For an example implementation, see the `rapier` module's `Rapier3dBackend`.
pub trait FpsPhysicsBackend: 'static + Send + Sync {
    /// System parameter giving read access to the physics world.
    type Queries: ReadOnlySystemParam + 'static;

    /// Returns the plugin that sets up this backend.
    fn plugin() -> impl Plugin;

    /// Run `f` with a spatial query bound to one controller.
    ///
    /// # Arguments
    /// * `queries` - The fetched backend query parameter
    /// * `exclude` - Entity to exclude from all queries (the controller itself)
    /// * `collision_groups` - Optional (memberships, filters) for filtering
    /// * `f` - Closure receiving the query
    fn with_spatial_query<R>(
        queries: &SystemParamItem<'_, '_, Self::Queries>,
        exclude: Entity,
        collision_groups: Option<(u32, u32)>,
        f: impl FnOnce(&dyn SpatialQuery) -> R,
    ) -> R;

    /// Get the current linear velocity of an entity.
    fn get_velocity(world: &World, entity: Entity) -> Vec3;

    /// Set the linear velocity of an entity.
    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3);

    /// Apply an instantaneous, mass-independent velocity change.
    fn apply_velocity_change(world: &mut World, entity: Entity, delta: Vec3) {
        let velocity = Self::get_velocity(world, entity);
        Self::set_velocity(world, entity, velocity + delta);
    }

    /// Apply a force to an entity.
    ///
    /// Forces are accumulated into [`FpsController`] and handed to the physics
    /// engine once at the end of the tick.
    fn apply_force(world: &mut World, entity: Entity, force: Vec3) {
        if let Some(mut controller) = world.get_mut::<FpsController>(entity) {
            controller.add_force(force);
        }
    }

    /// Get the current position (body center) of an entity.
    fn get_position(world: &World, entity: Entity) -> Vec3;

    /// Get the current rotation of an entity.
    fn get_rotation(world: &World, entity: Entity) -> Quat;

    /// Set the body rotation. The controller only ever passes rotations about world up.
    fn set_rotation(world: &mut World, entity: Entity, rotation: Quat);

    /// Whether the body is asleep.
    fn is_sleeping(_world: &World, _entity: Entity) -> bool {
        false
    }

    /// Wake the body up.
    fn wake_up(_world: &mut World, _entity: Entity) {}

    /// Get the mass of an entity.
    ///
    /// Used to turn accelerations into forces so config values behave the same
    /// regardless of body mass.
    fn get_mass(_world: &World, _entity: Entity) -> f32 {
        1.0
    }

    /// Get the fixed timestep delta time.
    fn get_fixed_timestep(world: &World) -> f32 {
        world
            .get_resource::<Time<Fixed>>()
            .map(|t| t.delta_secs())
            .filter(|&d| d > 0.0)
            .unwrap_or(1.0 / 60.0)
    }

    /// Get the collision groups for an entity (memberships, filters).
    /// Returns None if the entity doesn't have collision groups.
    fn get_collision_groups(_world: &World, _entity: Entity) -> Option<(u32, u32)> {
        None
    }

    /// Get the controller capsule. None if the entity has no capsule collider.
    fn get_capsule(world: &World, entity: Entity) -> Option<CapsuleShape>;

    /// Resize the capsule to `height`, keeping its feet in place.
    fn set_capsule_height(world: &mut World, entity: Entity, height: f32);
}

/// Empty plugin for backends that don't need additional setup.
pub struct NoOpBackendPlugin;

impl Plugin for NoOpBackendPlugin {
    fn build(&self, _app: &mut App) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capsule_feet_below_center() {
        let capsule = CapsuleShape::new(2.0, 0.5);
        assert_eq!(capsule.half_height(), 1.0);
        assert_eq!(capsule.feet(Vec3::new(1.0, 3.0, -2.0)), Vec3::new(1.0, 2.0, -2.0));
    }

    #[test]
    fn empty_query_hits_nothing() {
        let query = EmptySpatialQuery;
        assert!(query.cast_ray(Vec3::ZERO, Vec3::NEG_Y, 10.0).is_none());
        assert!(query
            .cast_sphere(Vec3::ZERO, 0.5, Vec3::NEG_Y, 10.0)
            .is_none());
        assert!(!query.overlaps_capsule(Vec3::ZERO, Vec3::Y, 0.5));
    }
}
