//! Collision groups and layer masks.
//!
//! A shape belongs to exactly one [`CollisionGroup`]; the group selects the
//! game-logic handler. Its [`LayerMask`] lists the groups it may physically
//! touch. Two shapes interact iff each mask contains the other's group.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

/// Exclusive category of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionGroup {
    Player,
    Collectable,
    Enemy,
    PlayerBullet,
    EnemyBullet,
    Terrain,
    Door,
}

impl CollisionGroup {
    pub const ALL: [CollisionGroup; 7] = [
        CollisionGroup::Player,
        CollisionGroup::Collectable,
        CollisionGroup::Enemy,
        CollisionGroup::PlayerBullet,
        CollisionGroup::EnemyBullet,
        CollisionGroup::Terrain,
        CollisionGroup::Door,
    ];

    /// The single layer bit this group occupies.
    pub const fn layer(self) -> LayerMask {
        LayerMask(1 << self as u32)
    }

    /// Canonical mask for shapes of this group.
    pub const fn canonical_layers(self) -> LayerMask {
        use CollisionGroup::*;
        match self {
            Terrain => LayerMask::ALL,
            Player => LayerMask::of(&[Terrain, Collectable, Enemy, EnemyBullet, Door]),
            Collectable => LayerMask::of(&[Terrain, Player, Collectable, Door]),
            Enemy => LayerMask::of(&[Terrain, Player, Enemy, PlayerBullet]),
            PlayerBullet => LayerMask::of(&[Terrain, Enemy]),
            EnemyBullet => LayerMask::of(&[Terrain, Player]),
            Door => LayerMask::of(&[Terrain, Player, Collectable]),
        }
    }

    pub fn is_bullet(self) -> bool {
        matches!(self, CollisionGroup::PlayerBullet | CollisionGroup::EnemyBullet)
    }
}

impl fmt::Display for CollisionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollisionGroup::Player => "player",
            CollisionGroup::Collectable => "collectable",
            CollisionGroup::Enemy => "enemy",
            CollisionGroup::PlayerBullet => "player_bullet",
            CollisionGroup::EnemyBullet => "enemy_bullet",
            CollisionGroup::Terrain => "terrain",
            CollisionGroup::Door => "door",
        };
        f.write_str(name)
    }
}

/// Bitmask of collision group layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const NONE: LayerMask = LayerMask(0);
    pub const ALL: LayerMask = LayerMask((1 << CollisionGroup::ALL.len()) - 1);

    /// Mask containing exactly the given groups.
    pub const fn of(groups: &[CollisionGroup]) -> LayerMask {
        let mut bits = 0;
        let mut i = 0;
        while i < groups.len() {
            bits |= groups[i].layer().0;
            i += 1;
        }
        LayerMask(bits)
    }

    pub const fn contains(self, group: CollisionGroup) -> bool {
        self.0 & group.layer().0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn with(self, group: CollisionGroup) -> LayerMask {
        self | group.layer()
    }

    pub fn without(self, group: CollisionGroup) -> LayerMask {
        self & !group.layer()
    }

    /// Groups present in this mask, in declaration order.
    pub fn groups(self) -> impl Iterator<Item = CollisionGroup> {
        CollisionGroup::ALL.into_iter().filter(move |g| self.contains(*g))
    }
}

impl BitOr for LayerMask {
    type Output = LayerMask;
    fn bitor(self, rhs: LayerMask) -> LayerMask {
        LayerMask(self.0 | rhs.0)
    }
}

impl BitAnd for LayerMask {
    type Output = LayerMask;
    fn bitand(self, rhs: LayerMask) -> LayerMask {
        LayerMask(self.0 & rhs.0)
    }
}

impl Not for LayerMask {
    type Output = LayerMask;
    fn not(self) -> LayerMask {
        LayerMask(!self.0 & LayerMask::ALL.0)
    }
}

/// Symmetric layer rule: both masks must admit the other group.
pub fn layers_interact(
    group_a: CollisionGroup,
    layers_a: LayerMask,
    group_b: CollisionGroup,
    layers_b: LayerMask,
) -> bool {
    layers_a.contains(group_b) && layers_b.contains(group_a)
}
