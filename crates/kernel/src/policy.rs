use std::collections::BTreeMap;

use roomworld_common::{CollisionGroup, LayerMask, layers_interact};

/// Group → layer mask table applied to shapes that do not set their own mask.
///
/// Starts from the canonical table. Content may override a group's mask at
/// setup time; overrides only affect shapes admitted afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollisionPolicy {
    layers: BTreeMap<CollisionGroup, LayerMask>,
}

impl Default for CollisionPolicy {
    fn default() -> Self {
        Self::canonical()
    }
}

impl CollisionPolicy {
    pub fn canonical() -> Self {
        Self {
            layers: CollisionGroup::ALL
                .iter()
                .map(|g| (*g, g.canonical_layers()))
                .collect(),
        }
    }

    pub fn layers_for(&self, group: CollisionGroup) -> LayerMask {
        self.layers
            .get(&group)
            .copied()
            .unwrap_or_else(|| group.canonical_layers())
    }

    pub fn set_layers(&mut self, group: CollisionGroup, layers: LayerMask) {
        self.layers.insert(group, layers);
    }

    /// Whether shapes of these groups, using this table's masks, can touch.
    pub fn interacts(&self, a: CollisionGroup, b: CollisionGroup) -> bool {
        layers_interact(a, self.layers_for(a), b, self.layers_for(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CollisionGroup::*;

    #[test]
    fn canonical_table_matches_groups() {
        let policy = CollisionPolicy::canonical();
        for group in CollisionGroup::ALL {
            assert_eq!(policy.layers_for(group), group.canonical_layers());
        }
    }

    #[test]
    fn canonical_interactions() {
        let policy = CollisionPolicy::default();
        assert!(policy.interacts(Player, Enemy));
        assert!(policy.interacts(PlayerBullet, Enemy));
        assert!(policy.interacts(Collectable, Collectable));
        assert!(policy.interacts(Door, Player));
        assert!(!policy.interacts(PlayerBullet, Player));
        assert!(!policy.interacts(EnemyBullet, Enemy));
        assert!(!policy.interacts(Collectable, Enemy));
        assert!(!policy.interacts(Collectable, PlayerBullet));
        for group in CollisionGroup::ALL {
            assert!(policy.interacts(Terrain, group), "terrain vs {group}");
        }
    }

    #[test]
    fn override_is_symmetric() {
        let mut policy = CollisionPolicy::canonical();
        policy.set_layers(Player, Player.canonical_layers().without(Enemy));
        assert!(!policy.interacts(Player, Enemy));
        assert!(!policy.interacts(Enemy, Player));
        assert!(policy.interacts(Player, Terrain));
    }
}
