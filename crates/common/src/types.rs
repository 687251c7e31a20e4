use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an entity in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, enough to tell entities apart in logs.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

/// Identity of a world. Entities keep one as a lookup-only back-reference
/// while they are admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldId(pub Uuid);

impl WorldId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorldId {
    fn default() -> Self {
        Self::new()
    }
}

/// Horizontal facing of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Facing {
    Left,
    #[default]
    Right,
}

impl Facing {
    /// Unit x direction: -1 for left, +1 for right.
    pub fn sign(self) -> f32 {
        match self {
            Facing::Left => -1.0,
            Facing::Right => 1.0,
        }
    }

    /// Facing implied by a horizontal velocity; `None` when standing still.
    pub fn from_velocity_x(vx: f32) -> Option<Self> {
        if vx > 0.0 {
            Some(Facing::Right)
        } else if vx < 0.0 {
            Some(Facing::Left)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_uniqueness() {
        let a = EntityId::new();
        let b = EntityId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn entity_id_short_form() {
        let id = EntityId::new();
        assert_eq!(id.short().len(), 8);
        assert_eq!(format!("{id}"), id.short());
    }

    #[test]
    fn facing_from_velocity() {
        assert_eq!(Facing::from_velocity_x(3.0), Some(Facing::Right));
        assert_eq!(Facing::from_velocity_x(-0.5), Some(Facing::Left));
        assert_eq!(Facing::from_velocity_x(0.0), None);
        assert_eq!(Facing::Left.sign(), -1.0);
    }
}
