use glam::Vec2;
use roomworld_common::{CollisionGroup, EntityId, Facing};
use roomworld_kernel::{TransitionState, World};
use serde::Serialize;

/// World inspector for developer tooling.
///
/// Read-only queries for debugging and the CLI's reports.
pub struct WorldInspector;

impl WorldInspector {
    /// Produce a summary of the world state.
    pub fn summary(world: &World) -> WorldSummary {
        let requests = world.registry().requests();
        WorldSummary {
            tick: world.tick(),
            time: world.time(),
            room: world.current_room().map(str::to_owned),
            transitioning: world.transition_state() == TransitionState::Transitioning,
            entity_count: world.entity_count(),
            pending_adds: requests.pending_adds(),
            pending_removes: requests.pending_removes(),
            bodies: world.space().body_count(),
            contacts: world.space().contact_count(),
            pending_events: world.events().len(),
        }
    }

    /// Details of one live entity.
    pub fn inspect_entity(world: &World, id: EntityId) -> Option<EntityInfo> {
        let entity = world.entity(id)?;
        let body = entity.physics.body(world.space())?;
        Some(EntityInfo {
            id,
            kind: entity.kind().to_owned(),
            alive: entity.is_alive(),
            facing: entity.facing(),
            position: body.position,
            velocity: body.velocity,
            groups: entity
                .physics
                .shape_layers(world.space())
                .into_iter()
                .map(|(group, _)| group)
                .collect(),
            health: entity.health.map(|h| h.current),
            points: entity.points,
            is_player: world.player() == Some(id),
        })
    }

    /// All live entity ids, in iteration order.
    pub fn list_entities(world: &World) -> Vec<EntityId> {
        world.live_ids()
    }

    /// Live entity count per kind, sorted by kind.
    pub fn census(world: &World) -> Vec<(String, usize)> {
        let mut counts = std::collections::BTreeMap::<&str, usize>::new();
        for entity in world.registry().iter() {
            *counts.entry(entity.kind()).or_default() += 1;
        }
        counts
            .into_iter()
            .map(|(kind, n)| (kind.to_owned(), n))
            .collect()
    }
}

/// Summary of world state for the inspector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorldSummary {
    pub tick: u64,
    pub time: f64,
    pub room: Option<String>,
    pub transitioning: bool,
    pub entity_count: usize,
    pub pending_adds: usize,
    pub pending_removes: usize,
    pub bodies: usize,
    pub contacts: usize,
    pub pending_events: usize,
}

impl std::fmt::Display for WorldSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "World: tick={} time={:.2}s room={} entities={} bodies={} contacts={} events={}",
            self.tick,
            self.time,
            self.room.as_deref().unwrap_or("-"),
            self.entity_count,
            self.bodies,
            self.contacts,
            self.pending_events
        )
    }
}

/// Detailed info about a single entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityInfo {
    pub id: EntityId,
    pub kind: String,
    pub alive: bool,
    pub facing: Facing,
    pub position: Vec2,
    pub velocity: Vec2,
    pub groups: Vec<CollisionGroup>,
    pub health: Option<f32>,
    pub points: u32,
    pub is_player: bool,
}

impl std::fmt::Display for EntityInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Entity [{}] {} pos=({:.2}, {:.2}) vel=({:.2}, {:.2})",
            self.id.short(),
            self.kind,
            self.position.x,
            self.position.y,
            self.velocity.x,
            self.velocity.y,
        )?;
        if let Some(health) = self.health {
            write!(f, " hp={health:.1}")?;
        }
        if !self.alive {
            write!(f, " (dead)")?;
        }
        Ok(())
    }
}
