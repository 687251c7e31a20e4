use std::collections::BTreeMap;
use std::fmt;

use crate::entity::Entity;
use crate::error::WorldError;

/// Builds one fresh entity each time it is called.
pub type ActorFactory = Box<dyn Fn() -> Entity>;

/// A named, reinstantiable playable area.
///
/// The player is never part of a room's actors; it is carried in by the
/// transition state machine.
pub struct Room {
    name: String,
    factories: Vec<ActorFactory>,
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("name", &self.name)
            .field("actors", &self.factories.len())
            .finish()
    }
}

impl Room {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            factories: Vec::new(),
        }
    }

    pub fn with_actor(mut self, factory: impl Fn() -> Entity + 'static) -> Self {
        self.add_actor(factory);
        self
    }

    pub fn add_actor(&mut self, factory: impl Fn() -> Entity + 'static) {
        self.factories.push(Box::new(factory));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn actor_count(&self) -> usize {
        self.factories.len()
    }

    /// Freshly constructed actors, in factory order. Calls share no state.
    pub fn get_actors(&self) -> Vec<Entity> {
        self.factories.iter().map(|factory| factory()).collect()
    }
}

/// All rooms known to a world, optionally grouped into zones.
#[derive(Debug, Default)]
pub struct RoomCatalog {
    rooms: BTreeMap<String, Room>,
    zones: BTreeMap<String, Vec<String>>,
}

impl RoomCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_room(&mut self, room: Room) -> Result<(), WorldError> {
        if self.rooms.contains_key(room.name()) {
            return Err(WorldError::DuplicateRoom(room.name.clone()));
        }
        tracing::debug!(room = room.name(), actors = room.actor_count(), "room registered");
        self.rooms.insert(room.name.clone(), room);
        Ok(())
    }

    /// Register a zone and all of its rooms. Nothing is registered if any
    /// room name collides.
    pub fn add_zone(
        &mut self,
        zone: impl Into<String>,
        rooms: Vec<Room>,
    ) -> Result<(), WorldError> {
        let zone = zone.into();
        let mut names: Vec<String> = Vec::with_capacity(rooms.len());
        for room in &rooms {
            if self.rooms.contains_key(room.name()) || names.iter().any(|n| n == room.name()) {
                return Err(WorldError::DuplicateRoom(room.name.clone()));
            }
            names.push(room.name.clone());
        }
        for room in rooms {
            self.add_room(room)?;
        }
        self.zones.entry(zone).or_default().extend(names);
        Ok(())
    }

    pub fn room(&self, name: &str) -> Option<&Room> {
        self.rooms.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rooms.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn room_names(&self) -> impl Iterator<Item = &str> {
        self.rooms.keys().map(String::as_str)
    }

    pub fn zone_names(&self) -> impl Iterator<Item = &str> {
        self.zones.keys().map(String::as_str)
    }

    /// Rooms in a zone, in registration order.
    pub fn zone(&self, zone: &str) -> Option<&[String]> {
        self.zones.get(zone).map(Vec::as_slice)
    }

    pub fn zone_of(&self, room: &str) -> Option<&str> {
        self.zones
            .iter()
            .find(|(_, rooms)| rooms.iter().any(|r| r == room))
            .map(|(zone, _)| zone.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use roomworld_physics::RigidBody;

    fn rock() -> Entity {
        Entity::new("rock", RigidBody::fixed(Vec2::ZERO))
    }

    #[test]
    fn get_actors_builds_fresh_entities() {
        let room = Room::new("cave").with_actor(rock).with_actor(rock);
        let first = room.get_actors();
        let second = room.get_actors();
        assert_eq!(first.len(), 2);
        assert_ne!(first[0].id(), second[0].id());
        assert_ne!(first[0].id(), first[1].id());
    }

    #[test]
    fn duplicate_room_rejected() {
        let mut catalog = RoomCatalog::new();
        catalog.add_room(Room::new("hall")).unwrap();
        let err = catalog.add_room(Room::new("hall")).unwrap_err();
        assert!(matches!(err, WorldError::DuplicateRoom(name) if name == "hall"));
    }

    #[test]
    fn zone_is_all_or_nothing() {
        let mut catalog = RoomCatalog::new();
        catalog.add_room(Room::new("b")).unwrap();
        let err = catalog
            .add_zone("forest", vec![Room::new("a"), Room::new("b")])
            .unwrap_err();
        assert!(matches!(err, WorldError::DuplicateRoom(_)));
        assert!(!catalog.contains("a"));
        assert!(catalog.zone("forest").is_none());

        catalog
            .add_zone("forest", vec![Room::new("a"), Room::new("c")])
            .unwrap();
        assert_eq!(catalog.zone_of("c"), Some("forest"));
        assert_eq!(catalog.zone_of("b"), None);
        assert_eq!(catalog.room_names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }
}
