//! Core controller systems.
//!
//! These systems run the controller pipeline. They are exclusive systems,
//! generic over the physics backend, and follow the same pattern: collect what
//! they need from the world, run the pure algorithms (with the backend's
//! spatial query where needed), then write the results back.

use bevy::ecs::system::SystemState;
use bevy::prelude::*;

use crate::actions::{
    buffered_jump_ready, cancel_bounce, gravity_acceleration, set_jump_buffer, try_jump,
    try_thrust, update_thrust_charge,
};
use crate::backend::{EmptySpatialQuery, FpsPhysicsBackend};
use crate::classify::classify_contacts;
use crate::collision::{ContactBuffer, ContactSample};
use crate::config::{ControllerConfig, DerivedParams};
use crate::crouch::{do_crouch, next_capsule_height};
use crate::events::{CrouchChanged, HorizontalSpeed, Jumped, Landed, Thrusted};
use crate::ground::{is_walkable, BodySnapshot};
use crate::intent::{CrouchRequest, JumpEdge, LookAngles, MovementIntent};
use crate::locomotion::{movement_acceleration, relative_horizontal_speed, LocomotionInput, YawBasis};
use crate::state::{
    Airborne, ConnectedBody, ContactState, CrouchState, FpsController, Grounded, TouchingSteep,
    VerticalActionState,
};

/// Body data for one controller, read through the backend.
fn snapshot<B: FpsPhysicsBackend>(world: &World, entity: Entity) -> Option<BodySnapshot> {
    let capsule = B::get_capsule(world, entity)?;
    Some(BodySnapshot {
        feet: capsule.feet(B::get_position(world, entity)),
        velocity: B::get_velocity(world, entity),
        radius: capsule.radius,
    })
}

fn controller_entities(world: &mut World) -> Vec<(Entity, ControllerConfig)> {
    world
        .query::<(Entity, &ControllerConfig, &FpsController)>()
        .iter(world)
        .map(|(e, config, _)| (e, *config))
        .collect()
}

/// Derive thresholds and capture the standing height for new controllers, and
/// re-derive when the config changes.
pub fn initialize_controllers<B: FpsPhysicsBackend>(world: &mut World) {
    let pending: Vec<(Entity, ControllerConfig, bool)> = world
        .query::<(Entity, &ControllerConfig, &FpsController)>()
        .iter(world)
        .filter(|(_, config, controller)| controller.applied_config != Some(**config))
        .map(|(e, config, controller)| (e, *config, controller.applied_config.is_none()))
        .collect();

    for (entity, config, first) in pending {
        if let Err(err) = config.validate() {
            warn!("controller {entity} has an invalid config: {err}");
        }
        let capsule = B::get_capsule(world, entity);
        if capsule.is_none() {
            warn!("controller {entity} has no capsule collider, keeping default heights");
        }

        let standing = {
            let Some(mut controller) = world.get_mut::<FpsController>(entity) else {
                continue;
            };
            let controller = &mut *controller;
            controller.derived = DerivedParams::from_config(&config);
            controller.applied_config = Some(config);

            if first {
                if let Some(capsule) = capsule {
                    controller.crouch.standing_height = capsule.height;
                }
                do_crouch(
                    &mut controller.crouch,
                    &config,
                    false,
                    true,
                    &EmptySpatialQuery,
                    Vec3::ZERO,
                    0.0,
                );
                Some(controller.crouch.standing_height)
            } else {
                if controller.crouch.is_crouching {
                    controller.crouch.target_height =
                        controller.crouch.standing_height * config.crouch_height;
                }
                None
            }
        };

        if let Some(height) = standing {
            debug!("controller {entity} initialized, standing height {height:.2}");
            if capsule.is_some() {
                B::set_capsule_height(world, entity, height);
            }
        }
    }
}

/// Wake sleeping controller bodies so contacts keep being reported.
pub fn wake_controllers<B: FpsPhysicsBackend>(world: &mut World) {
    for (entity, _) in controller_entities(world) {
        if B::is_sleeping(world, entity) {
            B::wake_up(world, entity);
        }
    }
}

struct ClassifyJob {
    entity: Entity,
    config: ControllerConfig,
    contact: ContactState,
    actions: VerticalActionState,
    min_ground_dot: f32,
    samples: Vec<ContactSample>,
    body: BodySnapshot,
    groups: Option<(u32, u32)>,
}

/// Classify this tick's contacts, resolving lost ground through the backend's
/// spatial queries.
pub fn classify_contacts_system<B: FpsPhysicsBackend>(
    world: &mut World,
    queries: &mut SystemState<B::Queries>,
) {
    let dt = B::get_fixed_timestep(world);

    let collected: Vec<_> = world
        .query::<(Entity, &ControllerConfig, &FpsController, Option<&ContactBuffer>)>()
        .iter(world)
        .map(|(e, config, controller, buffer)| {
            (
                e,
                *config,
                controller.contact,
                controller.actions,
                controller.derived.min_ground_dot,
                buffer.map(|b| b.samples().to_vec()).unwrap_or_default(),
            )
        })
        .collect();

    let jobs: Vec<ClassifyJob> = collected
        .into_iter()
        .filter_map(|(entity, config, contact, actions, min_ground_dot, samples)| {
            Some(ClassifyJob {
                entity,
                config,
                contact,
                actions,
                min_ground_dot,
                samples,
                body: snapshot::<B>(world, entity)?,
                groups: B::get_collision_groups(world, entity),
            })
        })
        .collect();

    let params = queries.get(world);
    let results: Vec<_> = jobs
        .into_iter()
        .map(|mut job| {
            let outcome = B::with_spatial_query(&params, job.entity, job.groups, |query| {
                classify_contacts(
                    &mut job.contact,
                    &mut job.actions,
                    &job.config,
                    job.min_ground_dot,
                    &job.samples,
                    job.body,
                    dt,
                    query,
                )
            });
            (job, outcome)
        })
        .collect();
    drop(params);

    for (job, outcome) in results {
        if let Some(velocity) = outcome.velocity {
            B::set_velocity(world, job.entity, velocity);
        }
        if let Some(mut controller) = world.get_mut::<FpsController>(job.entity) {
            controller.contact = job.contact;
            controller.actions = job.actions;
            controller.connected = outcome.connected.map(ConnectedBody::new);
        }
        if let Some(impact) = outcome.landed {
            debug!("controller {} landed, impact {impact:.2}", job.entity);
            world.send_event(Landed {
                entity: job.entity,
                impact,
            });
        }
    }
}

/// Advance the no-gravity window, recharge thrusts and cancel bounces.
pub fn update_thrust_state<B: FpsPhysicsBackend>(world: &mut World) {
    let dt = B::get_fixed_timestep(world);

    for (entity, config) in controller_entities(world) {
        let velocity = B::get_velocity(world, entity);
        let corrected = {
            let Some(mut controller) = world.get_mut::<FpsController>(entity) else {
                continue;
            };
            let controller = &mut *controller;
            if update_thrust_charge(&controller.contact, &mut controller.actions, &config, dt) {
                debug!("controller {entity} thrusts recharged");
            }
            cancel_bounce(&controller.contact, &controller.actions, &config, velocity)
        };
        if let Some(velocity) = corrected {
            B::set_velocity(world, entity, velocity);
        }
    }
}

/// Read the velocity of the body each controller stands on.
pub fn track_connected_bodies<B: FpsPhysicsBackend>(world: &mut World) {
    let connected: Vec<(Entity, Entity)> = world
        .query::<(Entity, &FpsController)>()
        .iter(world)
        .filter_map(|(e, controller)| controller.connected.map(|c| (e, c.entity)))
        .collect();

    for (entity, body) in connected {
        let velocity = B::get_velocity(world, body);
        if let Some(mut controller) = world.get_mut::<FpsController>(entity) {
            if let Some(connected) = controller.connected.as_mut() {
                connected.velocity = velocity;
            }
        }
    }
}

/// Pull controllers into the ground (or down when airborne).
pub fn apply_gravity<B: FpsPhysicsBackend>(world: &mut World) {
    let pending: Vec<(Entity, Option<Vec3>)> = world
        .query::<(Entity, &ControllerConfig, &FpsController)>()
        .iter(world)
        .map(|(e, config, controller)| {
            (
                e,
                gravity_acceleration(&controller.contact, &controller.actions, config),
            )
        })
        .collect();

    for (entity, acceleration) in pending {
        let Some(acceleration) = acceleration else {
            continue;
        };
        let mass = B::get_mass(world, entity);
        B::apply_force(world, entity, acceleration * mass);
    }
}

/// Apply horizontal movement from the move input.
pub fn apply_locomotion<B: FpsPhysicsBackend>(world: &mut World) {
    let dt = B::get_fixed_timestep(world);

    let pending: Vec<_> = world
        .query::<(Entity, &ControllerConfig, &FpsController, Option<&MovementIntent>)>()
        .iter(world)
        .map(|(e, config, controller, intent)| {
            (
                e,
                *config,
                controller.contact,
                controller.crouch.is_crouching,
                controller.connected.map(|c| c.velocity).unwrap_or(Vec3::ZERO),
                intent.map(|i| i.move_input).unwrap_or(Vec2::ZERO),
            )
        })
        .collect();

    for (entity, config, contact, crouching, connected_velocity, move_input) in pending {
        let velocity = B::get_velocity(world, entity);
        let input = LocomotionInput {
            move_input,
            basis: YawBasis::from_rotation(B::get_rotation(world, entity)),
            velocity,
            connected_velocity,
            crouching,
            dt,
        };

        let ratio = relative_horizontal_speed(velocity, config.max_speed);
        if let Some(mut controller) = world.get_mut::<FpsController>(entity) {
            controller.relative_horizontal_speed = ratio;
        }
        world.send_event(HorizontalSpeed { entity, ratio });

        if let Some(acceleration) = movement_acceleration(&contact, &config, &input) {
            let mass = B::get_mass(world, entity);
            B::apply_force(world, entity, acceleration * mass);
        }
    }
}

/// Drop per-tick data: contact samples and the connected body.
pub fn clear_tick_data(mut q: Query<(&mut FpsController, Option<&mut ContactBuffer>)>) {
    for (mut controller, buffer) in &mut q {
        controller.connected = None;
        if let Some(mut buffer) = buffer {
            buffer.clear();
        }
    }
}

/// Sync state marker components based on the controller's contact state.
pub fn sync_state_markers(
    mut commands: Commands,
    q_controllers: Query<(
        Entity,
        &FpsController,
        Has<Grounded>,
        Has<Airborne>,
        Option<&TouchingSteep>,
    )>,
) {
    for (entity, controller, has_grounded, has_airborne, steep) in &q_controllers {
        let grounded = controller.is_grounded();
        if grounded && !has_grounded {
            commands.entity(entity).insert(Grounded).remove::<Airborne>();
        } else if !grounded && !has_airborne {
            commands.entity(entity).insert(Airborne).remove::<Grounded>();
        }

        let normal = controller.contact.steep_normal;
        let too_steep =
            controller.is_steeped() && !is_walkable(normal, controller.derived.min_ground_dot);
        match (too_steep, steep) {
            (true, Some(marker)) if marker.normal == normal => {}
            (true, _) => {
                commands.entity(entity).insert(TouchingSteep::new(normal));
            }
            (false, Some(_)) => {
                commands.entity(entity).remove::<TouchingSteep>();
            }
            (false, None) => {}
        }
    }
}

/// Try to jump, applying the velocity change and notifying observers.
fn perform_jump<B: FpsPhysicsBackend>(world: &mut World, entity: Entity) -> bool {
    let Some(config) = world.get::<ControllerConfig>(entity).copied() else {
        return false;
    };
    let velocity = B::get_velocity(world, entity);
    let result = {
        let Some(mut controller) = world.get_mut::<FpsController>(entity) else {
            return false;
        };
        let controller = &mut *controller;
        let derived = controller.derived;
        try_jump(
            &mut controller.contact,
            &mut controller.actions,
            &config,
            &derived,
            velocity,
        )
    };

    let Some(jump) = result else {
        return false;
    };
    B::apply_velocity_change(world, entity, jump.velocity - velocity);
    debug!("controller {entity} {:?} jump", jump.kind);
    world.send_event(Jumped {
        entity,
        kind: jump.kind,
        direction: jump.direction,
    });
    true
}

/// Try to thrust, adding the thrust velocity and notifying observers.
fn perform_thrust<B: FpsPhysicsBackend>(world: &mut World, entity: Entity, move_input: Vec2) -> bool {
    let Some(config) = world.get::<ControllerConfig>(entity).copied() else {
        return false;
    };
    let velocity = B::get_velocity(world, entity);
    let basis = YawBasis::from_rotation(B::get_rotation(world, entity));
    let result = {
        let Some(mut controller) = world.get_mut::<FpsController>(entity) else {
            return false;
        };
        let controller = &mut *controller;
        let derived = controller.derived;
        try_thrust(
            &mut controller.contact,
            &mut controller.actions,
            &config,
            &derived,
            basis,
            move_input,
            velocity,
        )
    };

    let Some(thrust) = result else {
        return false;
    };
    B::apply_velocity_change(world, entity, thrust.velocity - velocity);
    debug!("controller {entity} thrust");
    world.send_event(Thrusted {
        entity,
        direction: thrust.direction,
    });
    true
}

struct PendingCommands {
    entity: Entity,
    look: Vec2,
    jump: Option<JumpEdge>,
    thrust: bool,
    crouch: Option<CrouchRequest>,
    move_input: Vec2,
}

struct CrouchJob {
    entity: Entity,
    crouched: bool,
    state: CrouchState,
    config: ControllerConfig,
    body: BodySnapshot,
    groups: Option<(u32, u32)>,
}

/// Apply look, jump, thrust and crouch commands from [`MovementIntent`].
pub fn process_commands<B: FpsPhysicsBackend>(
    world: &mut World,
    queries: &mut SystemState<B::Queries>,
) {
    let pending: Vec<PendingCommands> = world
        .query_filtered::<(Entity, &mut MovementIntent), With<FpsController>>()
        .iter_mut(world)
        .map(|(entity, mut intent)| PendingCommands {
            entity,
            look: intent.take_look_delta(),
            jump: intent.take_jump_edge(),
            thrust: intent.take_thrust_request(),
            crouch: intent.take_crouch_request(),
            move_input: intent.move_input,
        })
        .collect();

    let mut crouch_requests = Vec::new();
    for commands in pending {
        let entity = commands.entity;

        if commands.look != Vec2::ZERO {
            let rotation = world.get_mut::<LookAngles>(entity).map(|mut look| {
                look.apply_delta(commands.look);
                look.body_rotation()
            });
            if let Some(rotation) = rotation {
                B::set_rotation(world, entity, rotation);
            }
        }

        match commands.jump {
            Some(JumpEdge::Pressed) => {
                if let Some(mut controller) = world.get_mut::<FpsController>(entity) {
                    let controller = &mut *controller;
                    set_jump_buffer(&controller.contact, &mut controller.actions, true);
                }
                perform_jump::<B>(world, entity);
            }
            Some(JumpEdge::Released) => {
                if let Some(mut controller) = world.get_mut::<FpsController>(entity) {
                    let controller = &mut *controller;
                    set_jump_buffer(&controller.contact, &mut controller.actions, false);
                }
            }
            None => {}
        }

        if commands.thrust {
            perform_thrust::<B>(world, entity, commands.move_input);
        }

        if let Some(request) = commands.crouch {
            crouch_requests.push((entity, request));
        }
    }

    if crouch_requests.is_empty() {
        return;
    }

    let jobs: Vec<CrouchJob> = crouch_requests
        .into_iter()
        .filter_map(|(entity, request)| {
            let config = *world.get::<ControllerConfig>(entity)?;
            let state = world.get::<FpsController>(entity)?.crouch;
            let crouched = match request {
                CrouchRequest::Set(crouched) => crouched,
                CrouchRequest::Toggle => !state.is_crouching,
            };
            Some(CrouchJob {
                entity,
                crouched,
                state,
                config,
                body: snapshot::<B>(world, entity)?,
                groups: B::get_collision_groups(world, entity),
            })
        })
        .collect();

    let params = queries.get(world);
    let results: Vec<_> = jobs
        .into_iter()
        .map(|mut job| {
            let accepted = B::with_spatial_query(&params, job.entity, job.groups, |query| {
                do_crouch(
                    &mut job.state,
                    &job.config,
                    job.crouched,
                    false,
                    query,
                    job.body.feet,
                    job.body.radius,
                )
            });
            (job, accepted)
        })
        .collect();
    drop(params);

    for (job, accepted) in results {
        if !accepted {
            debug!("controller {} cannot stand up, obstructed", job.entity);
            continue;
        }
        let changed = {
            let Some(mut controller) = world.get_mut::<FpsController>(job.entity) else {
                continue;
            };
            let changed = controller.crouch.is_crouching != job.state.is_crouching;
            controller.crouch = job.state;
            changed
        };
        if changed {
            debug!("controller {} crouching: {}", job.entity, job.crouched);
            world.send_event(CrouchChanged {
                entity: job.entity,
                crouching: job.crouched,
            });
        }
    }
}

/// Move each capsule height toward its crouch target.
pub fn update_capsule_heights<B: FpsPhysicsBackend>(
    world: &mut World,
    queries: &mut SystemState<B::Queries>,
) {
    let dt = world
        .get_resource::<Time>()
        .map(|t| t.delta_secs())
        .unwrap_or(0.0);
    if dt <= 0.0 {
        return;
    }

    let jobs: Vec<_> = controller_entities(world)
        .into_iter()
        .filter_map(|(entity, config)| {
            let state = world.get::<FpsController>(entity)?.crouch;
            let capsule = B::get_capsule(world, entity)?;
            (capsule.height != state.target_height).then(|| {
                (
                    entity,
                    config,
                    state,
                    capsule,
                    capsule.feet(B::get_position(world, entity)),
                    B::get_collision_groups(world, entity),
                )
            })
        })
        .collect();
    if jobs.is_empty() {
        return;
    }

    let params = queries.get(world);
    let heights: Vec<(Entity, f32)> = jobs
        .into_iter()
        .filter_map(|(entity, config, state, capsule, feet, groups)| {
            let next = B::with_spatial_query(&params, entity, groups, |query| {
                next_capsule_height(
                    &state,
                    &config,
                    capsule.height,
                    dt,
                    query,
                    feet,
                    capsule.radius,
                )
            })?;
            Some((entity, next))
        })
        .collect();
    drop(params);

    for (entity, height) in heights {
        B::set_capsule_height(world, entity, height);
    }
}

/// Fire jumps that were requested in the air once the controller is grounded.
pub fn dispatch_buffered_jumps<B: FpsPhysicsBackend>(world: &mut World) {
    let ready: Vec<Entity> = world
        .query::<(Entity, &FpsController)>()
        .iter(world)
        .filter(|(_, controller)| buffered_jump_ready(&controller.contact, &controller.actions))
        .map(|(e, _)| e)
        .collect();

    for entity in ready {
        perform_jump::<B>(world, entity);
    }
}
