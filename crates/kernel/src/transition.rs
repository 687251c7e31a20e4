use glam::Vec2;
use roomworld_common::EntityId;
use roomworld_physics::Space;
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::entity::{DeathCause, Entity};
use crate::error::WorldError;
use crate::registry::{EntityRegistry, FlushReport};
use crate::room::RoomCatalog;
use crate::router::CollisionRouter;

/// A requested room change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub room: String,
    pub entry: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionState {
    /// The current room's entities are live.
    Active,
    /// A request is waiting for the next flush point.
    Transitioning,
}

/// Outcome of an enacted transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionReport {
    pub from: Option<String>,
    pub room: String,
    pub entry: Vec2,
    pub evicted: Vec<(EntityId, DeathCause)>,
    pub admitted: Vec<EntityId>,
    /// Whether the player was carried into the new room.
    pub carried_player: bool,
}

/// Tracks the active room and at most one pending room change.
#[derive(Debug, Clone, Default)]
pub struct RoomTransitionFsm {
    current: Option<String>,
    pending: Option<TransitionRequest>,
}

impl RoomTransitionFsm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TransitionState {
        if self.pending.is_some() {
            TransitionState::Transitioning
        } else {
            TransitionState::Active
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn pending(&self) -> Option<&TransitionRequest> {
        self.pending.as_ref()
    }

    /// Replace any pending request.
    pub fn request_transition(&mut self, room: impl Into<String>, entry: Vec2) {
        let request = TransitionRequest {
            room: room.into(),
            entry,
        };
        if let Some(previous) = self.pending.replace(request) {
            tracing::debug!(room = %previous.room, "pending transition overwritten");
        }
    }

    /// Carry out the pending request, if any.
    ///
    /// Every live entity except the player is evicted with
    /// [`DeathCause::RoomExit`] and anything their death hooks request is
    /// discarded. The new room's actors and the player are then admitted in
    /// one flush, so no caller ever sees both rooms at once.
    ///
    /// An unknown room, or a room whose actors cannot be attached, drops the
    /// request and leaves the old room untouched. If the swap itself fails
    /// part way, the player is put back into the live set before the error
    /// is returned.
    pub fn enact(
        &mut self,
        registry: &mut EntityRegistry,
        space: &mut Space,
        router: &mut CollisionRouter,
        catalog: &RoomCatalog,
        player: Option<EntityId>,
        camera: &mut Camera,
    ) -> Result<Option<TransitionReport>, WorldError> {
        let Some(request) = self.pending.take() else {
            return Ok(None);
        };
        let Some(room) = catalog.room(&request.room) else {
            tracing::warn!(room = %request.room, "transition to unknown room dropped");
            return Err(WorldError::UnknownRoom(request.room));
        };
        let actors = room.get_actors();
        if let Some(err) = actors.iter().find_map(|a| a.physics.validate().err()) {
            tracing::warn!(room = %request.room, %err, "transition to broken room dropped");
            return Err(err.into());
        }

        // Hooks run during teardown must not queue transitions on `self`.
        let mut sink = RoomTransitionFsm::new();

        let mut carried = match player {
            Some(id) => registry.detach(id, space, router, &mut sink)?,
            None => None,
        };
        let carried_player = carried.is_some();

        let swapped = Self::swap_rooms(
            registry,
            space,
            router,
            &mut sink,
            actors,
            &mut carried,
            request.entry,
        );
        let (exit, enter) = match swapped {
            Ok(reports) => reports,
            Err(err) => {
                tracing::error!(room = %request.room, %err, "room swap failed");
                if let Some(entity) = carried.take() {
                    registry.readmit(entity, space)?;
                } else if let Some(id) = player.filter(|_| carried_player) {
                    registry.rescue(id, space)?;
                }
                return Err(err);
            }
        };
        // A death hook of a freshly admitted actor may ask to move on.
        if let Some(next) = sink.pending.take() {
            self.pending = Some(next);
        }

        camera.snap(request.entry);
        let from = self.current.replace(request.room.clone());
        tracing::info!(
            room = %request.room,
            from = from.as_deref().unwrap_or("-"),
            evicted = exit.evicted.len(),
            admitted = enter.admitted.len(),
            "entered room"
        );

        let mut evicted = exit.evicted;
        evicted.extend(enter.evicted);
        Ok(Some(TransitionReport {
            from,
            room: request.room,
            entry: request.entry,
            evicted,
            admitted: enter.admitted,
            carried_player,
        }))
    }

    /// Tear the old room down and admit the new one. The player stays in
    /// `carried` until the teardown has succeeded.
    fn swap_rooms(
        registry: &mut EntityRegistry,
        space: &mut Space,
        router: &mut CollisionRouter,
        sink: &mut RoomTransitionFsm,
        actors: Vec<Entity>,
        carried: &mut Option<Entity>,
        entry: Vec2,
    ) -> Result<(FlushReport, FlushReport), WorldError> {
        // Leftovers belong to the room being left.
        registry.discard_requests();
        for id in registry.live_ids() {
            registry.request_remove(id);
        }
        let exit = registry.flush_room_exit(space, router, sink)?;
        registry.discard_requests();

        for actor in actors {
            registry.request_add(actor);
        }
        if let Some(mut player) = carried.take() {
            player.set_detached_position(entry);
            registry.request_add(player);
        }
        *sink = RoomTransitionFsm::new();
        let enter = registry.flush(space, router, sink)?;
        Ok((exit, enter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ActorContext, Controller, Entity};
    use crate::room::Room;
    use roomworld_common::{CollisionGroup, WorldId};
    use roomworld_physics::{Geometry, PhysicsError, RigidBody, ShapeDesc};

    fn wall() -> Entity {
        Entity::new("wall", RigidBody::fixed(Vec2::ZERO))
            .with_shape(ShapeDesc::new(Geometry::rect(4.0, 1.0), CollisionGroup::Terrain))
    }

    struct Haunt;

    impl Controller for Haunt {
        fn update(&mut self, _ctx: &mut ActorContext<'_>, _dt: f32) {}

        fn on_death(&mut self, ctx: &mut ActorContext<'_>, _cause: DeathCause) {
            ctx.spawn(wall());
            ctx.request_transition("nowhere", Vec2::ZERO);
        }
    }

    struct Setup {
        registry: EntityRegistry,
        space: Space,
        router: CollisionRouter,
        catalog: RoomCatalog,
        camera: Camera,
    }

    impl Setup {
        fn new() -> Self {
            let mut catalog = RoomCatalog::new();
            catalog
                .add_room(
                    Room::new("a").with_actor(wall).with_actor(|| wall().with_controller(Haunt)),
                )
                .unwrap();
            catalog.add_room(Room::new("b").with_actor(wall)).unwrap();
            catalog
                .add_room(Room::new("broken").with_actor(wall).with_actor(|| {
                    Entity::new("shard", RigidBody::fixed(Vec2::ZERO))
                        .with_shape(ShapeDesc::new(Geometry::circle(0.0), CollisionGroup::Terrain))
                }))
                .unwrap();
            Self {
                registry: EntityRegistry::new(WorldId::new()),
                space: Space::default(),
                router: CollisionRouter::new(),
                catalog,
                camera: Camera::default(),
            }
        }

        fn spawn_player(&mut self, fsm: &mut RoomTransitionFsm) -> EntityId {
            let hero = Entity::new("hero", RigidBody::dynamic(Vec2::ZERO, 1.0))
                .with_shape(ShapeDesc::new(Geometry::circle(0.5), CollisionGroup::Player));
            let id = self.registry.request_add(hero);
            self.registry
                .flush(&mut self.space, &mut self.router, fsm)
                .unwrap();
            id
        }

        fn enact(
            &mut self,
            fsm: &mut RoomTransitionFsm,
            player: Option<EntityId>,
        ) -> Result<Option<TransitionReport>, WorldError> {
            fsm.enact(
                &mut self.registry,
                &mut self.space,
                &mut self.router,
                &self.catalog,
                player,
                &mut self.camera,
            )
        }
    }

    #[test]
    fn state_follows_pending_request() {
        let mut fsm = RoomTransitionFsm::new();
        assert_eq!(fsm.state(), TransitionState::Active);
        fsm.request_transition("a", Vec2::ZERO);
        fsm.request_transition("b", Vec2::ONE);
        assert_eq!(fsm.state(), TransitionState::Transitioning);
        assert_eq!(fsm.pending().unwrap().room, "b");
    }

    #[test]
    fn enact_swaps_rooms_and_carries_player() {
        let mut s = Setup::new();
        let mut fsm = RoomTransitionFsm::new();
        let player = s.spawn_player(&mut fsm);

        fsm.request_transition("a", Vec2::new(10.0, 5.0));
        let report = s.enact(&mut fsm, Some(player)).unwrap().unwrap();
        assert!(report.carried_player);
        assert_eq!(report.from, None);
        assert_eq!(s.registry.len(), 3);
        assert_eq!(fsm.current(), Some("a"));
        assert_eq!(s.camera.position(), Vec2::new(10.0, 5.0));

        let old: Vec<EntityId> = s
            .registry
            .live_ids()
            .into_iter()
            .filter(|id| *id != player)
            .collect();
        fsm.request_transition("b", Vec2::new(-3.0, 0.0));
        let report = s.enact(&mut fsm, Some(player)).unwrap().unwrap();

        assert_eq!(report.evicted.len(), 2);
        assert!(report.evicted.iter().all(|(_, c)| *c == DeathCause::RoomExit));
        assert!(old.iter().all(|id| !s.registry.contains(*id)));
        assert_eq!(s.registry.len(), 2);
        assert!(s.registry.contains(player));
        // The haunt's spawn and transition were discarded with room "a".
        assert!(s.registry.requests().is_empty());
        assert!(fsm.pending().is_none());
        assert_eq!(s.space.body_count(), 2);
        let pos = s.registry.get(player).unwrap().physics.position(&s.space).unwrap();
        assert_eq!(pos, Vec2::new(-3.0, 0.0));
    }

    #[test]
    fn unknown_room_leaves_old_room_untouched() {
        let mut s = Setup::new();
        let mut fsm = RoomTransitionFsm::new();
        fsm.request_transition("a", Vec2::ZERO);
        s.enact(&mut fsm, None).unwrap();
        let before = s.registry.live_ids();

        fsm.request_transition("attic", Vec2::ZERO);
        let err = s.enact(&mut fsm, None).unwrap_err();
        assert!(matches!(err, WorldError::UnknownRoom(room) if room == "attic"));
        assert_eq!(s.registry.live_ids(), before);
        assert_eq!(fsm.current(), Some("a"));
        assert_eq!(fsm.state(), TransitionState::Active);
    }

    #[test]
    fn broken_room_keeps_old_room_and_player() {
        let mut s = Setup::new();
        let mut fsm = RoomTransitionFsm::new();
        let player = s.spawn_player(&mut fsm);
        fsm.request_transition("b", Vec2::new(2.0, 2.0));
        s.enact(&mut fsm, Some(player)).unwrap();
        let before = s.registry.live_ids();
        let bodies = s.space.body_count();

        fsm.request_transition("broken", Vec2::ZERO);
        let err = s.enact(&mut fsm, Some(player)).unwrap_err();
        assert!(matches!(err, WorldError::Physics(_)));
        assert_eq!(s.registry.live_ids(), before);
        assert!(s.registry.contains(player));
        assert_eq!(s.space.body_count(), bodies);
        assert_eq!(fsm.current(), Some("b"));
        assert!(fsm.pending().is_none());
    }

    #[test]
    fn failed_swap_puts_the_player_back() {
        let mut s = Setup::new();
        let mut fsm = RoomTransitionFsm::new();
        let player = s.spawn_player(&mut fsm);
        fsm.request_transition("b", Vec2::ZERO);
        s.enact(&mut fsm, Some(player)).unwrap();

        // Pull the wall's body out from under the registry so its eviction fails.
        let wall = s
            .registry
            .iter()
            .find(|e| e.kind() == "wall")
            .and_then(|e| e.physics.body_handle())
            .unwrap();
        s.space.remove_body(wall).unwrap();

        fsm.request_transition("a", Vec2::ZERO);
        let err = s.enact(&mut fsm, Some(player)).unwrap_err();
        assert!(matches!(err, WorldError::Physics(PhysicsError::UnknownBody(_))));
        assert!(s.registry.contains(player));
        assert!(s.registry.get(player).unwrap().physics.is_attached());
        assert_eq!(fsm.current(), Some("b"));
    }

    #[test]
    fn nothing_pending_is_a_noop() {
        let mut s = Setup::new();
        let mut fsm = RoomTransitionFsm::new();
        let report = s.enact(&mut fsm, None).unwrap();
        assert!(report.is_none());
    }
}
