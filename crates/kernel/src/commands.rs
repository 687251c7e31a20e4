use glam::Vec2;
use roomworld_common::EntityId;

use crate::entity::Entity;
use crate::registry::LifecycleRequests;
use crate::transition::RoomTransitionFsm;

/// Deferred requests issued by game logic while the live set is being
/// iterated: from update hooks, death hooks and collision handlers.
///
/// Nothing requested here takes effect before the next flush point.
pub struct Commands<'a> {
    lifecycle: &'a mut LifecycleRequests,
    transitions: &'a mut RoomTransitionFsm,
}

impl<'a> Commands<'a> {
    pub(crate) fn new(
        lifecycle: &'a mut LifecycleRequests,
        transitions: &'a mut RoomTransitionFsm,
    ) -> Self {
        Self {
            lifecycle,
            transitions,
        }
    }

    /// Queue an entity for admission. Returns its id.
    pub fn spawn(&mut self, entity: Entity) -> EntityId {
        self.lifecycle.request_add(entity)
    }

    /// Queue an entity for eviction. Repeated requests are harmless.
    pub fn despawn(&mut self, id: EntityId) {
        self.lifecycle.request_remove(id);
    }

    /// Ask for a room change at the end of this frame. A later request in
    /// the same frame replaces this one.
    pub fn request_transition(&mut self, room: impl Into<String>, entry: Vec2) {
        self.transitions.request_transition(room, entry);
    }
}
