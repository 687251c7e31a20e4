//! Entities and the capability records they are composed of.
//!
//! An entity is not a class hierarchy: it is an id plus independently owned
//! records (physics, render handle, health, portal, controller). The kernel
//! only touches an entity through this narrow surface.

use std::fmt;

use glam::Vec2;
use roomworld_common::{CollisionGroup, EntityId, Facing, LayerMask, WorldId};
use roomworld_physics::{
    BodyHandle, PhysicsError, RigidBody, Shape, ShapeDesc, ShapeHandle, Space,
};
use serde::{Deserialize, Serialize};

use crate::commands::Commands;
use crate::policy::CollisionPolicy;

/// Where an entity's body lives.
///
/// Detached before admission and after eviction, holding the body state by
/// value. Attached while live, holding handles into the physics space.
#[derive(Debug, Clone)]
pub enum BodySlot {
    Detached {
        body: RigidBody,
        shapes: Vec<ShapeDesc>,
    },
    Attached {
        body: BodyHandle,
        shapes: Vec<ShapeHandle>,
    },
}

impl BodySlot {
    pub fn is_attached(&self) -> bool {
        matches!(self, BodySlot::Attached { .. })
    }

    /// Handle into the space while attached.
    pub fn body_handle(&self) -> Option<BodyHandle> {
        match self {
            BodySlot::Detached { .. } => None,
            BodySlot::Attached { body, .. } => Some(*body),
        }
    }

    /// Current body state by value, read from the space while attached.
    pub fn body(&self, space: &Space) -> Option<RigidBody> {
        match self {
            BodySlot::Detached { body, .. } => Some(body.clone()),
            BodySlot::Attached { body, .. } => space.body(*body),
        }
    }

    pub fn position(&self, space: &Space) -> Option<Vec2> {
        match self {
            BodySlot::Detached { body, .. } => Some(body.position),
            BodySlot::Attached { body, .. } => space.position(*body),
        }
    }

    pub fn velocity(&self, space: &Space) -> Option<Vec2> {
        match self {
            BodySlot::Detached { body, .. } => Some(body.velocity),
            BodySlot::Attached { body, .. } => space.velocity(*body),
        }
    }

    pub fn set_position(&mut self, space: &mut Space, position: Vec2) -> Result<(), PhysicsError> {
        match self {
            BodySlot::Detached { body, .. } => {
                body.position = position;
                Ok(())
            }
            BodySlot::Attached { body, .. } => space.set_position(*body, position),
        }
    }

    pub fn set_velocity(&mut self, space: &mut Space, velocity: Vec2) -> Result<(), PhysicsError> {
        match self {
            BodySlot::Detached { body, .. } => {
                body.velocity = velocity;
                Ok(())
            }
            BodySlot::Attached { body, .. } => space.set_velocity(*body, velocity),
        }
    }

    pub fn apply_impulse(&mut self, space: &mut Space, impulse: Vec2) -> Result<(), PhysicsError> {
        match self {
            BodySlot::Detached { body, .. } => {
                body.apply_impulse(impulse);
                Ok(())
            }
            BodySlot::Attached { body, .. } => space.apply_impulse(*body, impulse),
        }
    }

    pub fn apply_force(&mut self, space: &mut Space, force: Vec2) -> Result<(), PhysicsError> {
        match self {
            BodySlot::Detached { body, .. } => {
                body.apply_force(force);
                Ok(())
            }
            BodySlot::Attached { body, .. } => space.apply_force(*body, force),
        }
    }

    /// Check that a detached body could be attached: finite state and
    /// well-formed geometry on every shape.
    pub fn validate(&self) -> Result<(), PhysicsError> {
        let BodySlot::Detached { body, shapes } = self else {
            return Ok(());
        };
        if !body.is_valid() {
            return Err(PhysicsError::InvalidBody(body.clone()));
        }
        match shapes.iter().find(|s| !s.geometry.is_valid()) {
            Some(bad) => Err(PhysicsError::InvalidGeometry(bad.geometry)),
            None => Ok(()),
        }
    }

    /// Handles of the attached shapes; empty while detached.
    pub fn shape_handles(&self) -> &[ShapeHandle] {
        match self {
            BodySlot::Detached { .. } => &[],
            BodySlot::Attached { shapes, .. } => shapes,
        }
    }

    /// Group and layer mask of every shape, in order.
    pub fn shape_layers(&self, space: &Space) -> Vec<(CollisionGroup, LayerMask)> {
        match self {
            BodySlot::Detached { shapes, .. } => shapes
                .iter()
                .map(|s| (s.group, s.layers.unwrap_or_else(|| s.group.canonical_layers())))
                .collect(),
            BodySlot::Attached { shapes, .. } => shapes
                .iter()
                .filter_map(|h| space.shape(*h))
                .map(|s| (s.group, s.layers))
                .collect(),
        }
    }

    /// Register body then shapes. On failure the space is left as it was.
    pub(crate) fn attach(
        &mut self,
        space: &mut Space,
        policy: &CollisionPolicy,
    ) -> Result<(), PhysicsError> {
        let BodySlot::Detached { body, shapes } = self else {
            return Ok(());
        };
        let handle = space.insert_body(body.clone())?;
        let mut attached = Vec::with_capacity(shapes.len());
        for desc in shapes.iter() {
            let desc = ShapeDesc {
                layers: Some(desc.layers.unwrap_or_else(|| policy.layers_for(desc.group))),
                ..desc.clone()
            };
            match space.attach_shape(handle, desc) {
                Ok(shape) => attached.push(shape),
                Err(err) => {
                    space.remove_body(handle)?;
                    return Err(err);
                }
            }
        }
        *self = BodySlot::Attached {
            body: handle,
            shapes: attached,
        };
        Ok(())
    }

    /// Unregister shapes and body, keeping their last state by value.
    pub(crate) fn detach(&mut self, space: &mut Space) -> Result<(), PhysicsError> {
        let BodySlot::Attached { body, .. } = self else {
            return Ok(());
        };
        let (body, shapes) = space.remove_body(*body)?;
        *self = BodySlot::Detached {
            body,
            shapes: shapes.into_iter().map(Shape::into_desc).collect(),
        };
        Ok(())
    }
}

/// Hit points plus a running total of damage received.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub current: f32,
    pub max: f32,
    pub damage_taken: f32,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self {
            current: max,
            max,
            damage_taken: 0.0,
        }
    }

    pub fn is_depleted(&self) -> bool {
        self.current <= 0.0
    }
}

/// Link from a door to a room and the point the player appears at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portal {
    pub room: String,
    pub entry: Vec2,
}

/// Opaque handle owned by the render layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderHandle(pub u64);

/// Why an entity left the live set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeathCause {
    /// Its liveness flag was cleared.
    Killed,
    /// Explicitly despawned while still alive.
    Despawned,
    /// Discarded with the rest of its room during a transition.
    RoomExit,
}

/// Per-entity behaviour.
pub trait Controller {
    /// Runs once per frame while the entity is live.
    fn update(&mut self, ctx: &mut ActorContext<'_>, dt: f32);

    /// Runs once, after the entity has been removed from the physics space.
    fn on_death(&mut self, _ctx: &mut ActorContext<'_>, _cause: DeathCause) {}
}

/// A simulated thing.
pub struct Entity {
    id: EntityId,
    kind: &'static str,
    alive: bool,
    facing: Facing,
    world: Option<WorldId>,
    pub physics: BodySlot,
    pub render: Option<RenderHandle>,
    pub health: Option<Health>,
    /// Damage dealt on contact.
    pub damage: f32,
    /// Points awarded when collected, or accumulated by a collector.
    pub points: u32,
    pub portal: Option<Portal>,
    pub(crate) controller: Option<Box<dyn Controller>>,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("alive", &self.alive)
            .field("facing", &self.facing)
            .field("world", &self.world)
            .field("physics", &self.physics)
            .field("health", &self.health)
            .field("has_controller", &self.controller.is_some())
            .finish()
    }
}

impl Entity {
    pub fn new(kind: &'static str, body: RigidBody) -> Self {
        Self {
            id: EntityId::new(),
            kind,
            alive: true,
            facing: Facing::default(),
            world: None,
            physics: BodySlot::Detached {
                body,
                shapes: Vec::new(),
            },
            render: None,
            health: None,
            damage: 0.0,
            points: 0,
            portal: None,
            controller: None,
        }
    }

    /// Add a shape. Only meaningful before admission.
    pub fn with_shape(mut self, shape: ShapeDesc) -> Self {
        if let BodySlot::Detached { shapes, .. } = &mut self.physics {
            shapes.push(shape);
        }
        self
    }

    pub fn with_health(mut self, max: f32) -> Self {
        self.health = Some(Health::new(max));
        self
    }

    pub fn with_damage(mut self, damage: f32) -> Self {
        self.damage = damage;
        self
    }

    pub fn with_points(mut self, points: u32) -> Self {
        self.points = points;
        self
    }

    pub fn with_portal(mut self, room: impl Into<String>, entry: Vec2) -> Self {
        self.portal = Some(Portal {
            room: room.into(),
            entry,
        });
        self
    }

    pub fn with_render(mut self, handle: RenderHandle) -> Self {
        self.render = Some(handle);
        self
    }

    pub fn with_facing(mut self, facing: Facing) -> Self {
        self.facing = facing;
        self
    }

    pub fn with_controller(mut self, controller: impl Controller + 'static) -> Self {
        self.controller = Some(Box::new(controller));
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    #[cfg(test)]
    pub(crate) fn with_id(mut self, id: EntityId) -> Self {
        self.id = id;
        self
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn set_alive(&mut self, alive: bool) {
        self.alive = alive;
    }

    /// Clear the liveness flag; the entity is evicted at the next flush.
    pub fn kill(&mut self) {
        self.alive = false;
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn set_facing(&mut self, facing: Facing) {
        self.facing = facing;
    }

    /// The world this entity is admitted to, if any.
    pub fn world(&self) -> Option<WorldId> {
        self.world
    }

    pub(crate) fn set_world(&mut self, world: Option<WorldId>) {
        self.world = world;
    }

    pub fn has_controller(&self) -> bool {
        self.controller.is_some()
    }

    /// Apply damage; clears the liveness flag once health is used up.
    /// Entities without health ignore damage.
    pub fn take_damage(&mut self, amount: f32) {
        let Some(health) = self.health.as_mut() else {
            return;
        };
        health.current -= amount;
        health.damage_taken += amount;
        if health.is_depleted() {
            self.alive = false;
        }
    }

    /// Position while detached. Live entities read theirs through the space.
    pub fn detached_position(&self) -> Option<Vec2> {
        match &self.physics {
            BodySlot::Detached { body, .. } => Some(body.position),
            BodySlot::Attached { .. } => None,
        }
    }

    /// Move a detached entity. No effect once attached.
    pub fn set_detached_position(&mut self, position: Vec2) {
        if let BodySlot::Detached { body, .. } = &mut self.physics {
            body.position = position;
        }
    }

    /// Run `on_death` once; the controller is consumed.
    pub(crate) fn run_death_hook(
        &mut self,
        space: &mut Space,
        commands: Commands<'_>,
        cause: DeathCause,
    ) {
        if let Some(mut controller) = self.controller.take() {
            let mut ctx = ActorContext::new(self, space, commands);
            controller.on_death(&mut ctx, cause);
        }
    }

    /// Run the per-frame `update` hook. Returns whether a controller ran.
    pub(crate) fn run_update(
        &mut self,
        space: &mut Space,
        commands: Commands<'_>,
        dt: f32,
    ) -> bool {
        let Some(mut controller) = self.controller.take() else {
            return false;
        };
        let mut ctx = ActorContext::new(self, space, commands);
        controller.update(&mut ctx, dt);
        self.controller = Some(controller);
        true
    }
}

/// What a controller sees of its own entity and the world during a hook.
pub struct ActorContext<'a> {
    entity: &'a mut Entity,
    space: &'a mut Space,
    commands: Commands<'a>,
}

impl<'a> ActorContext<'a> {
    pub(crate) fn new(
        entity: &'a mut Entity,
        space: &'a mut Space,
        commands: Commands<'a>,
    ) -> Self {
        Self {
            entity,
            space,
            commands,
        }
    }

    pub fn id(&self) -> EntityId {
        self.entity.id
    }

    pub fn entity(&self) -> &Entity {
        self.entity
    }

    pub fn entity_mut(&mut self) -> &mut Entity {
        self.entity
    }

    pub fn commands(&mut self) -> &mut Commands<'a> {
        &mut self.commands
    }

    pub fn position(&self) -> Vec2 {
        self.entity.physics.position(self.space).unwrap_or_default()
    }

    pub fn set_position(&mut self, position: Vec2) {
        let result = self.entity.physics.set_position(self.space, position);
        self.report(result);
    }

    pub fn velocity(&self) -> Vec2 {
        self.entity.physics.velocity(self.space).unwrap_or_default()
    }

    pub fn set_velocity(&mut self, velocity: Vec2) {
        let result = self.entity.physics.set_velocity(self.space, velocity);
        self.report(result);
    }

    pub fn apply_impulse(&mut self, impulse: Vec2) {
        let result = self.entity.physics.apply_impulse(self.space, impulse);
        self.report(result);
    }

    pub fn apply_force(&mut self, force: Vec2) {
        let result = self.entity.physics.apply_force(self.space, force);
        self.report(result);
    }

    /// Hooks cannot fail; a body missing from the space is logged.
    fn report(&self, result: Result<(), PhysicsError>) {
        if let Err(err) = result {
            tracing::warn!(entity = %self.entity.id, %err, "body update dropped");
        }
    }

    pub fn is_alive(&self) -> bool {
        self.entity.alive
    }

    pub fn kill(&mut self) {
        self.entity.kill();
    }

    pub fn facing(&self) -> Facing {
        self.entity.facing
    }

    pub fn set_facing(&mut self, facing: Facing) {
        self.entity.facing = facing;
    }

    pub fn spawn(&mut self, entity: Entity) -> EntityId {
        self.commands.spawn(entity)
    }

    pub fn despawn(&mut self, id: EntityId) {
        self.commands.despawn(id);
    }

    pub fn request_transition(&mut self, room: impl Into<String>, entry: Vec2) {
        self.commands.request_transition(room, entry);
    }
}
