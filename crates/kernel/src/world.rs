use glam::Vec2;
use roomworld_common::{CollisionGroup, EntityId, LayerMask, WorldId};
use roomworld_physics::{PhysicsError, Space, SpaceSettings, StepReport};
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::commands::Commands;
use crate::config::WorldConfig;
use crate::entity::{BodySlot, DeathCause, Entity};
use crate::error::WorldError;
use crate::handlers;
use crate::registry::{EntityRegistry, FlushReport};
use crate::room::{Room, RoomCatalog};
use crate::router::{CollisionHandler, CollisionRouter, ContactDispatch};
use crate::stepper::PhysicsStepper;
use crate::transition::{RoomTransitionFsm, TransitionReport, TransitionState};

/// A record of every lifecycle change the world made.
///
/// Callers that care drain it each frame; nothing in the kernel reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorldEvent {
    /// Entity admitted to the live set.
    Spawned { id: EntityId },
    /// Entity evicted from the live set.
    Despawned { id: EntityId, cause: DeathCause },
    /// A transition completed.
    RoomEntered { room: String, entry: Vec2 },
    /// A transition named a room that does not exist.
    TransitionFailed { room: String },
    /// One frame completed; `tick` is the new clock value.
    Stepped { tick: u64 },
}

/// Summary of one [`World::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    /// Clock value the frame started at.
    pub tick: u64,
    pub physics: StepReport,
    /// Controllers whose update hook ran.
    pub updated: usize,
    pub admitted: usize,
    pub evicted: usize,
    /// Room entered at the end of this frame, if any.
    pub entered: Option<String>,
}

/// The simulation orchestrator.
///
/// Each frame runs a fixed sequence: physics sub-steps (contact handlers
/// fire inside them), every live entity's update hook, the lifecycle flush,
/// any pending room transition, then the camera and clock. Game logic never
/// changes the live set directly; it buffers requests that the flush applies.
#[derive(Debug)]
pub struct World {
    id: WorldId,
    config: WorldConfig,
    space: Space,
    registry: EntityRegistry,
    router: CollisionRouter,
    stepper: PhysicsStepper,
    catalog: RoomCatalog,
    transitions: RoomTransitionFsm,
    camera: Camera,
    player: Option<EntityId>,
    tick: u64,
    time: f64,
    event_log: Vec<WorldEvent>,
}

impl Default for World {
    fn default() -> Self {
        Self::build(WorldConfig::default())
    }
}

impl World {
    /// An empty world with the default configuration and no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: WorldConfig) -> Result<Self, WorldError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: WorldConfig) -> Self {
        let id = WorldId::new();
        Self {
            id,
            space: Space::new(SpaceSettings {
                length_unit: config.length_unit,
                collision_slop: config.collision_slop,
            }),
            registry: EntityRegistry::new(id),
            router: CollisionRouter::new(),
            stepper: PhysicsStepper::from_config(&config),
            catalog: RoomCatalog::new(),
            transitions: RoomTransitionFsm::new(),
            camera: Camera::new(config.camera_smoothing),
            player: None,
            tick: 0,
            time: 0.0,
            event_log: Vec::new(),
            config,
        }
    }

    pub fn id(&self) -> WorldId {
        self.id
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Frames completed.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Simulated seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn space(&self) -> &Space {
        &self.space
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn router(&self) -> &CollisionRouter {
        &self.router
    }

    pub fn rooms(&self) -> &RoomCatalog {
        &self.catalog
    }

    // --- Lifecycle ---

    pub fn request_spawn(&mut self, entity: Entity) -> EntityId {
        self.registry.request_add(entity)
    }

    pub fn request_despawn(&mut self, id: EntityId) {
        self.registry.request_remove(id);
    }

    /// Spawn the entity that is carried across rooms.
    pub fn set_player(&mut self, entity: Entity) -> EntityId {
        let id = self.registry.request_add(entity);
        if let Some(previous) = self.player.replace(id) {
            tracing::debug!(%previous, player = %id, "player replaced");
        }
        id
    }

    pub fn player(&self) -> Option<EntityId> {
        self.player
    }

    // --- Rooms ---

    pub fn add_room(&mut self, room: Room) -> Result<(), WorldError> {
        self.catalog.add_room(room)
    }

    pub fn add_zone(
        &mut self,
        zone: impl Into<String>,
        rooms: Vec<Room>,
    ) -> Result<(), WorldError> {
        self.catalog.add_zone(zone, rooms)
    }

    /// Ask to move to `room` at the end of the next frame. Unknown rooms are
    /// rejected here; a later request before that frame replaces this one.
    pub fn request_transition(
        &mut self,
        room: impl Into<String>,
        entry: Vec2,
    ) -> Result<(), WorldError> {
        let room = room.into();
        if !self.catalog.contains(&room) {
            return Err(WorldError::UnknownRoom(room));
        }
        self.transitions.request_transition(room, entry);
        Ok(())
    }

    pub fn current_room(&self) -> Option<&str> {
        self.transitions.current()
    }

    pub fn transition_state(&self) -> TransitionState {
        self.transitions.state()
    }

    // --- Collision setup ---

    /// Install a handler for an unordered group pair. Meant for setup time.
    pub fn register_collision_handler(
        &mut self,
        first: CollisionGroup,
        second: CollisionGroup,
        handler: CollisionHandler,
    ) {
        if !self.registry.policy().interacts(first, second) {
            tracing::warn!(
                %first,
                %second,
                "handler registered for a pair whose layers never interact"
            );
        }
        self.router.register_handler(first, second, handler);
    }

    pub fn install_default_handlers(&mut self) {
        handlers::install_default_handlers(&mut self.router);
    }

    /// Override the layer mask given to `group` shapes admitted from now on.
    pub fn set_collision_layers(&mut self, group: CollisionGroup, layers: LayerMask) {
        self.registry.policy_mut().set_layers(group, layers);
    }

    // --- Entity access ---

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.registry.get(id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.registry.get_mut(id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.registry.contains(id)
    }

    pub fn live_ids(&self) -> Vec<EntityId> {
        self.registry.live_ids()
    }

    pub fn entity_count(&self) -> usize {
        self.registry.len()
    }

    pub fn position(&self, id: EntityId) -> Option<Vec2> {
        self.registry.get(id)?.physics.position(&self.space)
    }

    pub fn velocity(&self, id: EntityId) -> Option<Vec2> {
        self.registry.get(id)?.physics.velocity(&self.space)
    }

    pub fn set_position(&mut self, id: EntityId, position: Vec2) -> Result<(), WorldError> {
        self.with_body(id, |slot, space| slot.set_position(space, position))
    }

    pub fn set_velocity(&mut self, id: EntityId, velocity: Vec2) -> Result<(), WorldError> {
        self.with_body(id, |slot, space| slot.set_velocity(space, velocity))
    }

    pub fn apply_impulse(&mut self, id: EntityId, impulse: Vec2) -> Result<(), WorldError> {
        self.with_body(id, |slot, space| slot.apply_impulse(space, impulse))
    }

    /// Force applied over the next sub-step.
    pub fn apply_force(&mut self, id: EntityId, force: Vec2) -> Result<(), WorldError> {
        self.with_body(id, |slot, space| slot.apply_force(space, force))
    }

    fn with_body(
        &mut self,
        id: EntityId,
        f: impl FnOnce(&mut BodySlot, &mut Space) -> Result<(), PhysicsError>,
    ) -> Result<(), WorldError> {
        let entity = self.registry.get_mut(id).ok_or(WorldError::NotLive(id))?;
        f(&mut entity.physics, &mut self.space)?;
        Ok(())
    }

    // --- Events ---

    pub fn events(&self) -> &[WorldEvent] {
        &self.event_log
    }

    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.event_log)
    }

    // --- Frame ---

    /// Advance the world by one frame of `dt` seconds.
    ///
    /// A transition to an unknown room is dropped: the old room stays, the
    /// clock still advances, and the error is returned after the frame
    /// completes. Any other error aborts the frame.
    pub fn update(&mut self, dt: f32) -> Result<FrameReport, WorldError> {
        let _span = tracing::info_span!("world_update", tick = self.tick).entered();
        let mut report = FrameReport {
            tick: self.tick,
            ..FrameReport::default()
        };

        {
            let (live, owners, requests) = self.registry.parts_mut();
            let mut dispatch = ContactDispatch::new(
                live,
                owners,
                requests,
                &mut self.transitions,
                &mut self.router,
            );
            report.physics = self.stepper.step(&mut self.space, dt, &mut dispatch)?;
            if let Some(fault) = dispatch.take_fault() {
                return Err(fault);
            }
        }

        report.updated = self.run_update_hooks(dt);

        let flush = self
            .registry
            .flush(&mut self.space, &mut self.router, &mut self.transitions)?;
        report.admitted = flush.admitted.len();
        report.evicted = flush.evicted.len();
        self.record_flush(&flush);

        let enacted = self.transitions.enact(
            &mut self.registry,
            &mut self.space,
            &mut self.router,
            &self.catalog,
            self.player,
            &mut self.camera,
        );
        let failed = match enacted {
            Ok(Some(transition)) => {
                report.admitted += transition.admitted.len();
                report.evicted += transition.evicted.len();
                report.entered = Some(transition.room.clone());
                self.record_transition(transition);
                None
            }
            Ok(None) => None,
            Err(WorldError::UnknownRoom(room)) => {
                self.event_log
                    .push(WorldEvent::TransitionFailed { room: room.clone() });
                Some(WorldError::UnknownRoom(room))
            }
            Err(err) => return Err(err),
        };

        if let Some(target) = self.player.and_then(|id| self.position(id)) {
            self.camera.track(target);
        }
        self.camera.advance(dt);

        self.tick += 1;
        if dt.is_finite() && dt > 0.0 {
            self.time += f64::from(dt);
        }
        self.event_log.push(WorldEvent::Stepped { tick: self.tick });
        tracing::trace!(?report, "frame complete");

        match failed {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Every live entity is visited exactly once, dead-flagged ones included.
    /// Returns how many had a controller to run.
    fn run_update_hooks(&mut self, dt: f32) -> usize {
        let (live, _, requests) = self.registry.parts_mut();
        let mut ran = 0;
        for entity in live.values_mut() {
            let commands = Commands::new(requests, &mut self.transitions);
            if entity.run_update(&mut self.space, commands, dt) {
                ran += 1;
            }
        }
        ran
    }

    fn record_flush(&mut self, flush: &FlushReport) {
        self.event_log
            .extend(flush.admitted.iter().map(|id| WorldEvent::Spawned { id: *id }));
        self.event_log.extend(
            flush
                .evicted
                .iter()
                .map(|(id, cause)| WorldEvent::Despawned { id: *id, cause: *cause }),
        );
    }

    fn record_transition(&mut self, transition: TransitionReport) {
        let player = self.player;
        self.event_log.extend(
            transition
                .evicted
                .iter()
                .map(|(id, cause)| WorldEvent::Despawned { id: *id, cause: *cause }),
        );
        self.event_log.extend(
            transition
                .admitted
                .iter()
                .filter(|id| Some(**id) != player)
                .map(|id| WorldEvent::Spawned { id: *id }),
        );
        self.event_log.push(WorldEvent::RoomEntered {
            room: transition.room,
            entry: transition.entry,
        });
    }
}
