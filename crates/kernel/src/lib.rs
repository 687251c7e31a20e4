//! World kernel: deferred entity lifecycle, physics sub-stepping, collision
//! routing and room transitions.
//!
//! # Invariants
//! - The live entity set changes only at the per-frame flush point (and
//!   atomically inside a room transition). Everything else buffers requests.
//! - An entity's shapes leave the physics space before its body, and both
//!   leave before the entity is dropped.
//! - At most one room is active. The player survives every transition.
//! - Contact handlers only ever see pairs whose layer masks admit each other,
//!   in the order the physics space reported them.

pub mod camera;
pub mod commands;
pub mod config;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod policy;
pub mod registry;
pub mod room;
pub mod router;
pub mod stepper;
pub mod transition;
pub mod world;

pub use camera::Camera;
pub use commands::Commands;
pub use config::{ConfigError, WorldConfig};
pub use entity::{
    ActorContext, BodySlot, Controller, DeathCause, Entity, Health, Portal, RenderHandle,
};
pub use error::WorldError;
pub use handlers::install_default_handlers;
pub use policy::CollisionPolicy;
pub use registry::{EntityRegistry, FlushReport, LifecycleRequests};
pub use room::{ActorFactory, Room, RoomCatalog};
pub use router::{BeginFn, CollisionHandler, CollisionRouter, Contact, SeparateFn};
pub use stepper::PhysicsStepper;
pub use transition::{RoomTransitionFsm, TransitionReport, TransitionRequest, TransitionState};
pub use world::{FrameReport, World, WorldEvent};

pub fn crate_info() -> &'static str {
    "roomworld-kernel v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("kernel"));
    }
}
