//! # `fps_rigidbody_controller`
//!
//! A first-person rigidbody character controller with physics backend abstraction.
//!
//! This crate provides a responsive, tuneable player controller that:
//! - Classifies contacts into ground and steep surfaces every physics tick
//! - Recovers lost ground by snapping, crevasse checks and coyote time
//! - Accelerates along the ground plane with slope and wall handling
//! - Supports jumps, wall jumps, air jumps, thrusts and crouching
//! - Inherits the velocity of moving platforms it stands on
//! - Abstracts the physics backend for easy swapping (Rapier3D included)
//!
//! ## Architecture
//!
//! The controller drives a dynamic, rotation-locked rigid body:
//! 1. The physics engine reports contacts, which are sorted into ground and steep sets
//! 2. When ground is lost, sphere and ray casts try to snap the body back down
//! 3. Gravity pulls into the ground normal, so the body rests on slopes
//! 4. Movement is an acceleration force toward a slope-projected target velocity
//! 5. Jumps and thrusts are instantaneous velocity changes
//!
//! ## Usage
//!
//! ```rust
//! use bevy::prelude::*;
//! use fps_rigidbody_controller::prelude::*;
//!
//! // Create controller components for a player
//! let controller = FpsController::new();
//! let config = ControllerConfig::player();
//! let intent = MovementIntent::default();
//! let look = LookAngles::default();
//!
//! // These can be spawned together with the backend's physics bundle
//! ```

use bevy::prelude::*;

pub mod actions;
pub mod backend;
pub mod classify;
pub mod collision;
pub mod config;
pub mod crouch;
pub mod events;
pub mod ground;
pub mod intent;
pub mod locomotion;
pub mod state;
pub mod systems;

#[cfg(feature = "rapier3d")]
pub mod rapier;

#[cfg(test)]
mod mock;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::actions::JumpKind;
    pub use crate::backend::{CapsuleShape, FpsPhysicsBackend, SpatialQuery};
    pub use crate::collision::{CollisionData, ContactBuffer, ContactSample};
    pub use crate::config::{ConfigError, ControllerConfig, DerivedParams};
    pub use crate::events::{CrouchChanged, HorizontalSpeed, Jumped, Landed, Thrusted};
    pub use crate::intent::{CrouchRequest, LookAngles, MovementIntent};
    pub use crate::state::{Airborne, FpsController, Grounded, TouchingSteep};
    pub use crate::{FpsControllerPlugin, FpsControllerSet, FpsFrameSet};

    #[cfg(feature = "rapier3d")]
    pub use crate::rapier::{Rapier3dBackend, Rapier3dCharacterBundle};
}

/// Fixed-tick phases, run in this order in [`FixedUpdate`].
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FpsControllerSet {
    /// Initialization, waking bodies, clearing last tick's forces.
    Preparation,
    /// The backend fills each [`collision::ContactBuffer`].
    Contacts,
    /// Contact classification and ground recovery.
    Classification,
    /// Thrust recharge, no-gravity window and bounce canceling.
    Actions,
    /// Velocity of the body stood on.
    Connection,
    Gravity,
    Locomotion,
    /// Forces handed to the physics engine, markers synced, tick data cleared.
    Finalize,
}

/// Per-frame phases, run in this order in [`Update`].
///
/// Input systems writing [`intent::MovementIntent`] should run before
/// [`FpsFrameSet::Commands`].
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FpsFrameSet {
    Commands,
    CapsuleHeight,
    BufferedJump,
}

/// Main plugin for the controller.
///
/// This plugin is generic over a physics backend `B` which provides the actual
/// physics operations (scene queries, velocities, forces, colliders).
///
/// # Type Parameters
/// - `B`: The physics backend implementation (e.g., `Rapier3dBackend`)
///
/// # Examples
///
/// With Rapier3D backend:
/// ```rust,no_run
/// use bevy::prelude::*;
/// use bevy_rapier3d::prelude::*;
/// use fps_rigidbody_controller::prelude::*;
///
/// App::new()
///     .add_plugins(MinimalPlugins)
///     .add_plugins(RapierPhysicsPlugin::<NoUserData>::default())
///     .add_plugins(FpsControllerPlugin::<Rapier3dBackend>::default())
///     .run();
/// ```
pub struct FpsControllerPlugin<B: backend::FpsPhysicsBackend> {
    _marker: std::marker::PhantomData<B>,
}

impl<B: backend::FpsPhysicsBackend> Default for FpsControllerPlugin<B> {
    fn default() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<B: backend::FpsPhysicsBackend> Plugin for FpsControllerPlugin<B> {
    fn build(&self, app: &mut App) {
        app.register_type::<state::FpsController>();
        app.register_type::<config::ControllerConfig>();
        app.register_type::<intent::MovementIntent>();
        app.register_type::<intent::LookAngles>();
        app.register_type::<state::Grounded>();
        app.register_type::<state::Airborne>();
        app.register_type::<state::TouchingSteep>();

        app.add_event::<events::Jumped>();
        app.add_event::<events::Landed>();
        app.add_event::<events::Thrusted>();
        app.add_event::<events::HorizontalSpeed>();
        app.add_event::<events::CrouchChanged>();

        app.add_plugins(B::plugin());

        app.configure_sets(
            FixedUpdate,
            (
                FpsControllerSet::Preparation,
                FpsControllerSet::Contacts,
                FpsControllerSet::Classification,
                FpsControllerSet::Actions,
                FpsControllerSet::Connection,
                FpsControllerSet::Gravity,
                FpsControllerSet::Locomotion,
                FpsControllerSet::Finalize,
            )
                .chain(),
        );

        app.add_systems(
            FixedUpdate,
            (
                (
                    systems::initialize_controllers::<B>,
                    systems::wake_controllers::<B>,
                )
                    .chain()
                    .in_set(FpsControllerSet::Preparation),
                systems::classify_contacts_system::<B>.in_set(FpsControllerSet::Classification),
                systems::update_thrust_state::<B>.in_set(FpsControllerSet::Actions),
                systems::track_connected_bodies::<B>.in_set(FpsControllerSet::Connection),
                systems::apply_gravity::<B>.in_set(FpsControllerSet::Gravity),
                systems::apply_locomotion::<B>.in_set(FpsControllerSet::Locomotion),
                (systems::sync_state_markers, systems::clear_tick_data)
                    .chain()
                    .in_set(FpsControllerSet::Finalize),
            ),
        );

        app.configure_sets(
            Update,
            (
                FpsFrameSet::Commands,
                FpsFrameSet::CapsuleHeight,
                FpsFrameSet::BufferedJump,
            )
                .chain(),
        );

        app.add_systems(
            Update,
            (
                (
                    systems::initialize_controllers::<B>,
                    systems::process_commands::<B>,
                )
                    .chain()
                    .in_set(FpsFrameSet::Commands),
                systems::update_capsule_heights::<B>.in_set(FpsFrameSet::CapsuleHeight),
                systems::dispatch_buffered_jumps::<B>.in_set(FpsFrameSet::BufferedJump),
            ),
        );
    }
}
