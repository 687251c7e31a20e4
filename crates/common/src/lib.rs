//! Shared types for the roomworld workspace.
//!
//! Content authors and the kernel agree on these: entity and world identity,
//! facing, and the fixed collision group / layer mask enumerations.

pub mod collision;
pub mod types;

pub use collision::{layers_interact, CollisionGroup, LayerMask};
pub use types::{EntityId, Facing, WorldId};

pub fn crate_info() -> &'static str {
    "roomworld-common v0.1.0"
}
