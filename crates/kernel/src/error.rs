use roomworld_common::EntityId;
use roomworld_physics::{PhysicsError, ShapeHandle};

use crate::config::ConfigError;

/// Errors surfaced by the world kernel.
///
/// Lifecycle misuse (double add, double remove, removing something that was
/// never added) is deliberately absent: those requests are no-ops.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("no room named {0:?}")]
    UnknownRoom(String),
    #[error("a room named {0:?} is already registered")]
    DuplicateRoom(String),
    #[error("shape {shape:?} reported a contact but has no owning entity")]
    UnownedShape { shape: ShapeHandle },
    #[error("entity {0} is not live")]
    NotLive(EntityId),
    #[error("physics invariant violated: {0}")]
    Physics(#[from] PhysicsError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
