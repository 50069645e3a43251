//! Rapier3D physics backend implementation.
//!
//! This module provides the physics backend for Bevy Rapier3D.
//! Enable with the `rapier3d` feature.

use bevy::ecs::system::SystemParamItem;
use bevy::prelude::*;
use bevy_rapier3d::geometry::Group;
use bevy_rapier3d::prelude::*;

use crate::backend::{CapsuleShape, EmptySpatialQuery, FpsPhysicsBackend, SpatialQuery};
use crate::collision::{CollisionData, ContactBuffer, ContactSample};
use crate::state::FpsController;

/// Rapier3D physics backend for the controller.
///
/// Body state goes through the Rapier components (`Velocity`, `Transform`,
/// `Collider`, ...). Scene queries go through [`ReadRapierContext`], and
/// contacts are collected from the narrow phase by [`collect_contacts`].
pub struct Rapier3dBackend;

impl FpsPhysicsBackend for Rapier3dBackend {
    type Queries = ReadRapierContext<'static, 'static>;

    fn plugin() -> impl Plugin {
        Rapier3dBackendPlugin
    }

    fn with_spatial_query<R>(
        queries: &SystemParamItem<'_, '_, Self::Queries>,
        exclude: Entity,
        collision_groups: Option<(u32, u32)>,
        f: impl FnOnce(&dyn SpatialQuery) -> R,
    ) -> R {
        let Ok(context) = queries.single() else {
            return f(&EmptySpatialQuery);
        };
        let query = RapierSpatialQuery {
            context: &context,
            filter: controller_filter(exclude, collision_groups),
        };
        f(&query)
    }

    fn get_velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Velocity>(entity)
            .map(|v| v.linvel)
            .unwrap_or(Vec3::ZERO)
    }

    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3) {
        if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            vel.linvel = velocity;
        }
    }

    fn get_position(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Transform>(entity)
            .map(|t| t.translation)
            .or_else(|| {
                world
                    .get::<GlobalTransform>(entity)
                    .map(|t| t.translation())
            })
            .unwrap_or(Vec3::ZERO)
    }

    fn get_rotation(world: &World, entity: Entity) -> Quat {
        world
            .get::<Transform>(entity)
            .map(|t| t.rotation)
            .or_else(|| {
                world.get::<GlobalTransform>(entity).map(|t| {
                    let (_, rotation, _) = t.to_scale_rotation_translation();
                    rotation
                })
            })
            .unwrap_or(Quat::IDENTITY)
    }

    fn set_rotation(world: &mut World, entity: Entity, rotation: Quat) {
        if let Some(mut transform) = world.get_mut::<Transform>(entity) {
            transform.rotation = rotation;
        }
    }

    fn is_sleeping(world: &World, entity: Entity) -> bool {
        world
            .get::<Sleeping>(entity)
            .is_some_and(|s| s.sleeping)
    }

    fn wake_up(world: &mut World, entity: Entity) {
        if let Some(mut sleeping) = world.get_mut::<Sleeping>(entity) {
            sleeping.sleeping = false;
        }
    }

    fn get_mass(world: &World, entity: Entity) -> f32 {
        // Rapier fills in the mass after the first physics step.
        world
            .get::<ReadMassProperties>(entity)
            .map(|props| props.mass)
            .filter(|mass| *mass > 0.0 && mass.is_finite())
            .unwrap_or(1.0)
    }

    fn get_collision_groups(world: &World, entity: Entity) -> Option<(u32, u32)> {
        world
            .get::<CollisionGroups>(entity)
            .map(|cg| (cg.memberships.bits(), cg.filters.bits()))
    }

    fn get_capsule(world: &World, entity: Entity) -> Option<CapsuleShape> {
        world.get::<Collider>(entity).and_then(capsule_shape)
    }

    fn set_capsule_height(world: &mut World, entity: Entity, height: f32) {
        let Some(current) = Self::get_capsule(world, entity) else {
            return;
        };
        let half_segment = ((height - 2.0 * current.radius) * 0.5).max(0.0);
        let applied = half_segment * 2.0 + 2.0 * current.radius;

        if let Some(mut collider) = world.get_mut::<Collider>(entity) {
            *collider = Collider::capsule_y(half_segment, current.radius);
        }
        if let Some(mut transform) = world.get_mut::<Transform>(entity) {
            transform.translation.y += (applied - current.height) * 0.5;
        }
        trace!("controller {entity} capsule height {applied:.3}");
    }
}

/// Dimensions of a vertical capsule collider.
pub fn capsule_shape(collider: &Collider) -> Option<CapsuleShape> {
    let capsule = collider.as_capsule()?;
    let segment = capsule.segment();
    let radius = capsule.radius();
    let segment_length = (segment.a().y - segment.b().y).abs();
    Some(CapsuleShape::new(segment_length + 2.0 * radius, radius))
}

/// Query filter excluding the controller's own body and all sensors.
fn controller_filter(exclude: Entity, collision_groups: Option<(u32, u32)>) -> QueryFilter<'static> {
    let mut filter = QueryFilter::default()
        .exclude_rigid_body(exclude)
        .exclude_sensors();

    if let Some((memberships, filters)) = collision_groups {
        filter = filter.groups(CollisionGroups::new(
            Group::from_bits_truncate(memberships),
            Group::from_bits_truncate(filters),
        ));
    }
    filter
}

/// [`SpatialQuery`] over a Rapier context, bound to one controller.
struct RapierSpatialQuery<'a, 'c> {
    context: &'a RapierContext<'c>,
    filter: QueryFilter<'static>,
}

impl RapierSpatialQuery<'_, '_> {
    /// Rigid body owning a hit collider, so child colliders report their body.
    fn owning_body(&self, collider: Entity) -> Entity {
        self
            .context
            .colliders
            .collider_parent(self.context.rigidbody_set, collider)
            .unwrap_or(collider)
    }
}

/// Make a hit normal face the caster.
fn facing(normal: Vec3, direction: Vec3) -> Vec3 {
    if normal.dot(direction) > 0.0 {
        -normal
    } else {
        normal
    }
}

impl SpatialQuery for RapierSpatialQuery<'_, '_> {
    fn cast_sphere(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
    ) -> Option<CollisionData> {
        let shape = Collider::ball(radius);
        self.context
            .cast_shape(
                origin,
                Quat::IDENTITY,
                direction,
                &shape,
                ShapeCastOptions {
                    max_time_of_impact: max_distance,
                    stop_at_penetration: false,
                    ..default()
                },
                self.filter,
            )
            .map(|(hit_entity, hit)| {
                let center = origin + direction * hit.time_of_impact;
                let (normal, point) = hit
                    .details
                    .map(|d| (facing(d.normal1, direction), d.witness1))
                    .unwrap_or((-direction, center + direction * radius));
                CollisionData::new(
                    hit.time_of_impact,
                    normal,
                    point,
                    Some(self.owning_body(hit_entity)),
                )
            })
    }

    fn cast_ray(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<CollisionData> {
        self.context
            .cast_ray_and_get_normal(origin, direction, max_distance, true, self.filter)
            .map(|(hit_entity, hit)| {
                CollisionData::new(
                    hit.time_of_impact,
                    facing(hit.normal, direction),
                    hit.point,
                    Some(self.owning_body(hit_entity)),
                )
            })
    }

    fn overlaps_capsule(&self, a: Vec3, b: Vec3, radius: f32) -> bool {
        let shape = Collider::capsule(a, b, radius);
        let mut overlaps = false;
        self.context.intersections_with_shape(
            Vec3::ZERO,
            Quat::IDENTITY,
            &shape,
            self.filter,
            |_| {
                overlaps = true;
                false
            },
        );
        overlaps
    }
}

/// Plugin that sets up Rapier3D-specific systems for the controller.
pub struct Rapier3dBackendPlugin;

impl Plugin for Rapier3dBackendPlugin {
    fn build(&self, app: &mut App) {
        use crate::FpsControllerSet;

        app.add_systems(
            FixedUpdate,
            clear_controller_forces.in_set(FpsControllerSet::Preparation),
        );
        app.add_systems(
            FixedUpdate,
            collect_contacts.in_set(FpsControllerSet::Contacts),
        );
        app.add_systems(
            FixedUpdate,
            apply_controller_forces.in_set(FpsControllerSet::Finalize),
        );
    }
}

/// Fill each controller's [`ContactBuffer`] from the narrow phase.
///
/// Normals point from the other collider toward the controller. The relative
/// velocity is the controller's velocity minus the other body's.
pub fn collect_contacts(
    rapier_context: ReadRapierContext,
    mut q_controllers: Query<(Entity, &mut ContactBuffer, Option<&Velocity>), With<FpsController>>,
    q_bodies: Query<&Velocity>,
) {
    let Ok(context) = rapier_context.single() else {
        return;
    };

    for (entity, mut buffer, velocity) in &mut q_controllers {
        buffer.clear();
        let own_velocity = velocity.map(|v| v.linvel).unwrap_or(Vec3::ZERO);

        for pair in context.contact_pairs_with(entity) {
            if !pair.has_any_active_contact() {
                continue;
            }
            let is_first = pair.collider1() == Some(entity);

            for manifold in pair.manifolds() {
                let count = manifold.num_solver_contacts();
                if count == 0 {
                    continue;
                }
                let point = manifold
                    .solver_contacts()
                    .map(|c| c.point())
                    .sum::<Vec3>()
                    / count as f32;
                let normal = if is_first {
                    -manifold.normal()
                } else {
                    manifold.normal()
                };
                let body = if is_first {
                    manifold.rigid_body2()
                } else {
                    manifold.rigid_body1()
                };
                let other_velocity = body
                    .and_then(|b| q_bodies.get(b).ok())
                    .map(|v| v.linvel)
                    .unwrap_or(Vec3::ZERO);

                let mut sample = ContactSample::new(normal, point)
                    .with_relative_velocity(own_velocity - other_velocity);
                if let Some(body) = body {
                    sample = sample.with_body(body);
                }
                buffer.push(sample);
            }
        }
    }
}

/// Clear controller forces at the start of each tick.
///
/// Subtracts the force applied last tick from `ExternalForce` so user forces
/// on the same body are preserved.
pub fn clear_controller_forces(mut q: Query<(&mut ExternalForce, &mut FpsController)>) {
    for (mut ext_force, mut controller) in &mut q {
        ext_force.force -= controller.prepare_new_frame();
    }
}

/// Hand the accumulated controller force to `ExternalForce` at the end of the tick.
pub fn apply_controller_forces(mut q: Query<(&mut ExternalForce, &mut FpsController)>) {
    for (mut ext_force, mut controller) in &mut q {
        ext_force.force += controller.finalize_frame();
    }
}

/// Bundle for creating a first-person controller with Rapier3D physics.
///
/// Provides the rigid body and the components the controller reads and
/// writes. The collider is left to the caller and must be a vertical capsule.
///
/// # Example
///
/// ```ignore
/// use bevy::prelude::*;
/// use bevy_rapier3d::prelude::*;
/// use fps_rigidbody_controller::prelude::*;
///
/// fn spawn_player(mut commands: Commands) {
///     commands.spawn((
///         Transform::from_xyz(0.0, 1.0, 0.0),
///         FpsController::new(),
///         ControllerConfig::player(),
///         MovementIntent::default(),
///         LookAngles::default(),
///         Rapier3dCharacterBundle::new(),
///         Collider::capsule_y(0.5, 0.5),
///     ));
/// }
/// ```
///
/// # Defaults
///
/// - `rigid_body`: [`RigidBody::Dynamic`]
/// - `locked_axes`: [`LockedAxes::ROTATION_LOCKED`], yaw is set directly
/// - `gravity_scale`: 0, the controller applies its own gravity
/// - `damping`: none, the controller handles acceleration and braking
/// - `friction`: 0 with the `Min` combine rule so walls don't grab the body
#[derive(Bundle)]
pub struct Rapier3dCharacterBundle {
    pub rigid_body: RigidBody,
    pub velocity: Velocity,
    /// Controller forces are added here each tick.
    pub external_force: ExternalForce,
    pub locked_axes: LockedAxes,
    pub gravity_scale: GravityScale,
    pub damping: Damping,
    pub friction: Friction,
    /// Rapier updates this from the collider.
    pub mass_properties: ReadMassProperties,
    pub sleeping: Sleeping,
    pub contacts: ContactBuffer,
}

impl Default for Rapier3dCharacterBundle {
    fn default() -> Self {
        Self::new()
    }
}

impl Rapier3dCharacterBundle {
    pub fn new() -> Self {
        Self {
            rigid_body: RigidBody::Dynamic,
            velocity: Velocity::default(),
            external_force: ExternalForce::default(),
            locked_axes: LockedAxes::ROTATION_LOCKED,
            gravity_scale: GravityScale(0.0),
            damping: Damping {
                linear_damping: 0.0,
                angular_damping: 0.0,
            },
            friction: Friction {
                coefficient: 0.0,
                combine_rule: CoefficientCombineRule::Min,
            },
            mass_properties: ReadMassProperties::default(),
            sleeping: Sleeping::default(),
            contacts: ContactBuffer::default(),
        }
    }

    /// Set the rigid body type.
    ///
    /// [`RigidBody::KinematicVelocityBased`] works for scripted sequences; the
    /// controller forces are then ignored by Rapier.
    pub fn with_body(mut self, body: RigidBody) -> Self {
        self.rigid_body = body;
        self
    }

    /// Set linear and angular damping.
    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.damping = Damping {
            linear_damping: linear,
            angular_damping: angular,
        };
        self
    }

    /// Set the friction coefficient and combine rule.
    pub fn with_friction(mut self, coefficient: f32, combine_rule: CoefficientCombineRule) -> Self {
        self.friction = Friction {
            coefficient,
            combine_rule,
        };
        self
    }

    pub fn with_locked_axes(mut self, axes: LockedAxes) -> Self {
        self.locked_axes = axes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.add_plugins(TransformPlugin);
        app.add_plugins(RapierPhysicsPlugin::<NoUserData>::default());
        app.insert_resource(Time::<Fixed>::from_hz(60.0));
        app
    }

    #[test]
    fn rapier_backend_get_position() {
        let mut app = create_test_app();

        let entity = app
            .world_mut()
            .spawn((Transform::from_xyz(1.0, 2.0, -3.0), RigidBody::Dynamic))
            .id();

        app.update();

        let pos = Rapier3dBackend::get_position(app.world(), entity);
        assert!((pos - Vec3::new(1.0, 2.0, -3.0)).length() < 0.01);
    }

    #[test]
    fn rapier_backend_velocity() {
        let mut app = create_test_app();

        let entity = app
            .world_mut()
            .spawn((
                Transform::default(),
                RigidBody::Dynamic,
                Velocity::linear(Vec3::new(5.0, 3.0, -1.0)),
            ))
            .id();

        let vel = Rapier3dBackend::get_velocity(app.world(), entity);
        assert_eq!(vel, Vec3::new(5.0, 3.0, -1.0));

        Rapier3dBackend::set_velocity(app.world_mut(), entity, Vec3::new(10.0, 0.0, 0.0));
        let vel = Rapier3dBackend::get_velocity(app.world(), entity);
        assert_eq!(vel, Vec3::new(10.0, 0.0, 0.0));

        Rapier3dBackend::apply_velocity_change(app.world_mut(), entity, Vec3::Y);
        let vel = Rapier3dBackend::get_velocity(app.world(), entity);
        assert_eq!(vel, Vec3::new(10.0, 1.0, 0.0));
    }

    #[test]
    fn capsule_shape_from_collider() {
        let capsule = capsule_shape(&Collider::capsule_y(0.5, 0.5)).unwrap();
        assert!((capsule.height - 2.0).abs() < 1e-5);
        assert!((capsule.radius - 0.5).abs() < 1e-5);

        assert!(capsule_shape(&Collider::ball(1.0)).is_none());
    }

    #[test]
    fn capsule_height_keeps_feet() {
        let mut app = create_test_app();

        let entity = app
            .world_mut()
            .spawn((
                Transform::from_xyz(0.0, 1.0, 0.0),
                Collider::capsule_y(0.5, 0.5),
            ))
            .id();

        Rapier3dBackend::set_capsule_height(app.world_mut(), entity, 1.5);

        let capsule = Rapier3dBackend::get_capsule(app.world(), entity).unwrap();
        assert!((capsule.height - 1.5).abs() < 1e-5);
        let feet = capsule.feet(Rapier3dBackend::get_position(app.world(), entity));
        assert!(feet.y.abs() < 1e-5, "feet moved to {}", feet.y);
    }

    #[test]
    fn capsule_height_never_below_sphere() {
        let mut app = create_test_app();

        let entity = app
            .world_mut()
            .spawn((Transform::default(), Collider::capsule_y(0.5, 0.5)))
            .id();

        Rapier3dBackend::set_capsule_height(app.world_mut(), entity, 0.2);
        let capsule = Rapier3dBackend::get_capsule(app.world(), entity).unwrap();
        assert!((capsule.height - 1.0).abs() < 1e-5);
    }

    #[test]
    fn yaw_rotation_round_trip() {
        let mut app = create_test_app();
        let entity = app.world_mut().spawn(Transform::default()).id();

        let rotation = Quat::from_rotation_y(1.2);
        Rapier3dBackend::set_rotation(app.world_mut(), entity, rotation);
        let read = Rapier3dBackend::get_rotation(app.world(), entity);
        assert!(read.angle_between(rotation) < 1e-5);
    }

    #[test]
    fn mass_falls_back_before_first_step() {
        let mut app = create_test_app();
        let entity = app
            .world_mut()
            .spawn((Transform::default(), ReadMassProperties::default()))
            .id();
        assert_eq!(Rapier3dBackend::get_mass(app.world(), entity), 1.0);
    }

    #[test]
    fn rapier_character_bundle_creates_valid_entity() {
        let mut app = create_test_app();

        let entity = app
            .world_mut()
            .spawn((
                Transform::default(),
                Rapier3dCharacterBundle::new(),
                Collider::capsule_y(0.5, 0.5),
            ))
            .id();

        app.update();

        let world = app.world();
        assert!(world.get::<RigidBody>(entity).is_some());
        assert!(world.get::<Velocity>(entity).is_some());
        assert!(world.get::<ExternalForce>(entity).is_some());
        assert_eq!(world.get::<GravityScale>(entity).map(|g| g.0), Some(0.0));
        assert!(world.get::<ContactBuffer>(entity).is_some());
    }
}
