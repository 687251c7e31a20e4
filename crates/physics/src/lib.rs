//! Physics space for the roomworld kernel, built on rapier2d.
//!
//! Bodies own shapes; shapes carry a collision group and a layer mask that
//! become rapier interaction groups. A step runs the rapier pipeline, turns
//! its collision events into begin/separate calls on a [`ContactHandler`],
//! and lets the solver respond only to contacts the handler did not veto.
//!
//! # Invariants
//! - A shape never outlives its body inside a space.
//! - Only pairs whose layer masks admit each other generate events.
//! - A pair is reported in the orientation the narrow phase produced it.

pub mod body;
pub mod shape;
pub mod space;

pub use body::{BodyHandle, BodyKind, RigidBody};
pub use shape::{Geometry, Shape, ShapeDesc, ShapeHandle, interaction_groups};
pub use space::{
    ContactHandler, ContactPair, PhysicsError, Space, SpaceSettings, StepParams, StepReport,
};

pub fn crate_info() -> &'static str {
    "roomworld-physics v0.1.0"
}
