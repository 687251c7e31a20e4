use std::collections::BTreeMap;
use std::fmt;

use glam::Vec2;
use rapier2d::crossbeam;
use rapier2d::prelude::*;
use roomworld_common::CollisionGroup;

use crate::body::{BodyHandle, RigidBody, to_vec2, to_vector};
use crate::shape::{Geometry, Shape, ShapeDesc, ShapeHandle, shape_of};

/// Errors from space operations. All of them indicate a bug in how bodies
/// and shapes were constructed, not a runtime condition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PhysicsError {
    #[error("body {0:?} is not registered in this space")]
    UnknownBody(BodyHandle),
    #[error("shape {shape:?} refers to body {body:?} which is not registered")]
    OrphanShape { shape: ShapeHandle, body: BodyHandle },
    #[error("invalid shape geometry: {0:?}")]
    InvalidGeometry(Geometry),
    #[error("body state is not finite: {0:?}")]
    InvalidBody(RigidBody),
}

/// Parameters for a single integration step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepParams {
    pub dt: f32,
    pub gravity: Vec2,
    /// Fraction of velocity kept after one second.
    pub damping: f32,
}

/// Solver tolerances fixed for the life of a space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceSettings {
    /// Typical object size in world units. Rapier scales its internal
    /// tolerances by this.
    pub length_unit: f32,
    /// Penetration left in place by positional correction so resting
    /// contacts stay in contact between sub-steps.
    pub collision_slop: f32,
}

impl Default for SpaceSettings {
    fn default() -> Self {
        Self {
            length_unit: 1.0,
            collision_slop: 0.1,
        }
    }
}

/// A contact between two shapes as reported to a [`ContactHandler`].
///
/// `shape_a` and `shape_b` keep the orientation the narrow phase reported the
/// pair in; the same pair keeps that orientation until it separates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPair {
    pub shape_a: ShapeHandle,
    pub shape_b: ShapeHandle,
    pub group_a: CollisionGroup,
    pub group_b: CollisionGroup,
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
}

impl ContactPair {
    pub fn involves(&self, body: BodyHandle) -> bool {
        self.body_a == body || self.body_b == body
    }
}

/// Receives contact events synchronously from inside [`Space::step`].
///
/// Only pairs whose layer masks admit each other are ever reported.
pub trait ContactHandler {
    /// Contact started. Return `false` to suppress the physical response for
    /// as long as this contact lasts.
    fn begin(&mut self, pair: &ContactPair) -> bool;

    /// Contact ended.
    fn separate(&mut self, pair: &ContactPair);
}

/// Handler that lets every contact respond and ignores separation.
impl ContactHandler for () {
    fn begin(&mut self, _pair: &ContactPair) -> bool {
        true
    }

    fn separate(&mut self, _pair: &ContactPair) {}
}

/// Per-step counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    pub began: usize,
    pub separated: usize,
    /// Contacts the solver was allowed to respond to during the step.
    pub resolved: usize,
}

#[derive(Debug, Clone, Copy)]
struct ActiveContact {
    pair: ContactPair,
    respond: bool,
    sensor: bool,
}

struct BodyEntry {
    handle: RigidBodyHandle,
    /// Mass the body was inserted with; rapier only keeps the effective one.
    mass: Option<f32>,
    shapes: Vec<ShapeHandle>,
}

struct ShapeEntry {
    shape: Shape,
    collider: ColliderHandle,
}

/// Contact filter consulted by the narrow phase on every sub-step.
///
/// A pair the handler has not yet seen gets no solver response: `begin`
/// runs after the step that reported it, and only its verdict enables the
/// response from the next sub-step on.
struct ResponseFilter<'a> {
    contacts: &'a BTreeMap<(ShapeHandle, ShapeHandle), ActiveContact>,
}

impl PhysicsHooks for ResponseFilter<'_> {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        let shape = |h: ColliderHandle| context.colliders.get(h).map(shape_of);
        let respond = match (shape(context.collider1), shape(context.collider2)) {
            (Some(a), Some(b)) => self
                .contacts
                .get(&ordered(a, b))
                .is_some_and(|contact| contact.respond),
            _ => false,
        };
        if respond {
            Some(SolverFlags::COMPUTE_IMPULSES)
        } else {
            Some(SolverFlags::empty())
        }
    }
}

/// The physics space: a rapier pipeline plus the shape bookkeeping that
/// turns its collision events into begin/separate callbacks.
///
/// Handles are plain counters kept in BTreeMaps, so lookups and the
/// contact table iterate in a deterministic order.
pub struct Space {
    pipeline: PhysicsPipeline,
    integration: IntegrationParameters,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    bodies: BTreeMap<BodyHandle, BodyEntry>,
    shapes: BTreeMap<ShapeHandle, ShapeEntry>,
    contacts: BTreeMap<(ShapeHandle, ShapeHandle), ActiveContact>,
    next_body: u64,
    next_shape: u64,
}

impl Default for Space {
    fn default() -> Self {
        Self::new(SpaceSettings::default())
    }
}

impl fmt::Debug for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Space")
            .field("bodies", &self.bodies.len())
            .field("shapes", &self.shapes.len())
            .field("contacts", &self.contacts.len())
            .finish_non_exhaustive()
    }
}

impl Space {
    pub fn new(settings: SpaceSettings) -> Self {
        let length_unit = if settings.length_unit > 0.0 {
            settings.length_unit
        } else {
            1.0
        };
        let integration = IntegrationParameters {
            length_unit,
            normalized_allowed_linear_error: settings.collision_slop.max(0.0) / length_unit,
            ..IntegrationParameters::default()
        };
        Self {
            pipeline: PhysicsPipeline::new(),
            integration,
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            bodies: BTreeMap::new(),
            shapes: BTreeMap::new(),
            contacts: BTreeMap::new(),
            next_body: 0,
            next_shape: 0,
        }
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Snapshot of a body's current state.
    pub fn body(&self, handle: BodyHandle) -> Option<RigidBody> {
        let entry = self.bodies.get(&handle)?;
        let rb = self.rigid_bodies.get(entry.handle)?;
        Some(RigidBody::from_rapier(rb, entry.mass))
    }

    pub fn position(&self, handle: BodyHandle) -> Option<Vec2> {
        self.rigid(handle).map(|rb| to_vec2(rb.translation()))
    }

    pub fn velocity(&self, handle: BodyHandle) -> Option<Vec2> {
        self.rigid(handle).map(|rb| to_vec2(rb.linvel()))
    }

    pub fn set_position(&mut self, handle: BodyHandle, position: Vec2) -> Result<(), PhysicsError> {
        let rb = self.rigid_mut(handle)?;
        rb.set_translation(to_vector(position), true);
        Ok(())
    }

    pub fn set_velocity(&mut self, handle: BodyHandle, velocity: Vec2) -> Result<(), PhysicsError> {
        let rb = self.rigid_mut(handle)?;
        rb.set_linvel(to_vector(velocity), true);
        Ok(())
    }

    /// Instantaneous velocity change scaled by the body's inverse mass.
    /// Ignored by non-dynamic bodies.
    pub fn apply_impulse(&mut self, handle: BodyHandle, impulse: Vec2) -> Result<(), PhysicsError> {
        let mut snapshot = self.body(handle).ok_or(PhysicsError::UnknownBody(handle))?;
        snapshot.apply_impulse(impulse);
        self.set_velocity(handle, snapshot.velocity)
    }

    /// Force applied during the next sub-step only. Ignored by non-dynamic
    /// bodies.
    pub fn apply_force(&mut self, handle: BodyHandle, force: Vec2) -> Result<(), PhysicsError> {
        let rb = self.rigid_mut(handle)?;
        rb.add_force(to_vector(force), true);
        Ok(())
    }

    pub fn shape(&self, handle: ShapeHandle) -> Option<&Shape> {
        self.shapes.get(&handle).map(|entry| &entry.shape)
    }

    pub fn contains_body(&self, handle: BodyHandle) -> bool {
        self.bodies.contains_key(&handle)
    }

    /// Shapes attached to a body, in attachment order.
    pub fn shapes_of(&self, body: BodyHandle) -> Vec<ShapeHandle> {
        self.bodies
            .get(&body)
            .map(|entry| entry.shapes.clone())
            .unwrap_or_default()
    }

    /// Whether two shapes currently have an active contact.
    pub fn in_contact(&self, a: ShapeHandle, b: ShapeHandle) -> bool {
        self.contacts.contains_key(&ordered(a, b))
    }

    pub fn insert_body(&mut self, body: RigidBody) -> Result<BodyHandle, PhysicsError> {
        if !body.is_valid() {
            return Err(PhysicsError::InvalidBody(body));
        }
        let handle = BodyHandle(self.next_body);
        self.next_body += 1;
        let rigid = self.rigid_bodies.insert(body.to_rapier());
        self.bodies.insert(handle, BodyEntry {
            handle: rigid,
            mass: body.mass,
            shapes: Vec::new(),
        });
        Ok(handle)
    }

    /// Attach a shape to a registered body. A description without a layer
    /// mask gets its group's canonical mask.
    pub fn attach_shape(
        &mut self,
        body: BodyHandle,
        desc: ShapeDesc,
    ) -> Result<ShapeHandle, PhysicsError> {
        let Some(entry) = self.bodies.get_mut(&body) else {
            return Err(PhysicsError::UnknownBody(body));
        };
        if !desc.geometry.is_valid() {
            return Err(PhysicsError::InvalidGeometry(desc.geometry));
        }
        let handle = ShapeHandle(self.next_shape);
        self.next_shape += 1;
        let shape = Shape {
            body,
            geometry: desc.geometry,
            group: desc.group,
            layers: desc.layers.unwrap_or_else(|| desc.group.canonical_layers()),
            sensor: desc.sensor,
            elasticity: desc.elasticity,
        };
        let collider = self.colliders.insert_with_parent(
            shape.to_collider(handle),
            entry.handle,
            &mut self.rigid_bodies,
        );
        entry.shapes.push(handle);
        self.shapes.insert(handle, ShapeEntry { shape, collider });
        Ok(handle)
    }

    /// End every active contact involving `body`, reporting each to
    /// `handler` as a separation. Returns how many ended.
    ///
    /// Owners call this before [`Space::remove_body`] while both sides of
    /// each contact still resolve.
    pub fn end_contacts(&mut self, body: BodyHandle, handler: &mut dyn ContactHandler) -> usize {
        let ended: Vec<(ShapeHandle, ShapeHandle)> = self
            .contacts
            .iter()
            .filter(|(_, contact)| contact.pair.involves(body))
            .map(|(key, _)| *key)
            .collect();
        for key in &ended {
            if let Some(contact) = self.contacts.remove(key) {
                handler.separate(&contact.pair);
            }
        }
        ended.len()
    }

    /// Remove a body and every shape attached to it.
    ///
    /// Contacts still involving the body are dropped without a separate
    /// event; use [`Space::end_contacts`] first to report them.
    pub fn remove_body(
        &mut self,
        handle: BodyHandle,
    ) -> Result<(RigidBody, Vec<Shape>), PhysicsError> {
        let entry = self
            .bodies
            .remove(&handle)
            .ok_or(PhysicsError::UnknownBody(handle))?;
        let before = self.contacts.len();
        self.contacts.retain(|_, contact| !contact.pair.involves(handle));
        let shapes: Vec<Shape> = entry
            .shapes
            .iter()
            .filter_map(|h| self.shapes.remove(h))
            .map(|e| e.shape)
            .collect();
        let rigid = self
            .rigid_bodies
            .remove(
                entry.handle,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            )
            .ok_or(PhysicsError::UnknownBody(handle))?;
        tracing::trace!(
            body = handle.0,
            shapes = shapes.len(),
            contacts = before - self.contacts.len(),
            "body removed"
        );
        Ok((RigidBody::from_rapier(&rigid, entry.mass), shapes))
    }

    /// Verify that every shape's body exists, and that every body and shape
    /// is backed by a rapier body and collider.
    pub fn check_invariants(&self) -> Result<(), PhysicsError> {
        for (handle, entry) in &self.bodies {
            if !self.rigid_bodies.contains(entry.handle) {
                return Err(PhysicsError::UnknownBody(*handle));
            }
        }
        for (handle, entry) in &self.shapes {
            let body = entry.shape.body;
            if !self.bodies.contains_key(&body) || !self.colliders.contains(entry.collider) {
                return Err(PhysicsError::OrphanShape {
                    shape: *handle,
                    body,
                });
            }
        }
        Ok(())
    }

    /// Advance the space by one step: run the rapier pipeline, then report
    /// separations and new contacts to `handler`.
    pub fn step(
        &mut self,
        params: &StepParams,
        handler: &mut dyn ContactHandler,
    ) -> Result<StepReport, PhysicsError> {
        self.check_invariants()?;
        self.integration.dt = params.dt;
        let keep = params.damping.clamp(0.0, 1.0).powf(params.dt);
        if keep < 1.0 {
            for (_, rb) in self.rigid_bodies.iter_mut() {
                if rb.is_dynamic() {
                    let damped = *rb.linvel() * keep;
                    rb.set_linvel(damped, false);
                }
            }
        }

        let (collision_send, collision_recv) = crossbeam::channel::unbounded();
        let (force_send, _force_recv) = crossbeam::channel::unbounded();
        let events = ChannelEventCollector::new(collision_send, force_send);
        let hooks = ResponseFilter {
            contacts: &self.contacts,
        };
        let resolved = self
            .contacts
            .values()
            .filter(|contact| contact.respond && !contact.sensor)
            .count();

        self.pipeline.step(
            &to_vector(params.gravity),
            &self.integration,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            None,
            &hooks,
            &events,
        );

        let mut started = Vec::new();
        let mut stopped = Vec::new();
        for event in collision_recv.try_iter() {
            match event {
                CollisionEvent::Started(h1, h2, _) => started.push((h1, h2)),
                CollisionEvent::Stopped(h1, h2, _) => stopped.push((h1, h2)),
            }
        }

        let mut report = StepReport {
            resolved,
            ..StepReport::default()
        };
        // Separations first so a handler sees a consistent contact set.
        for (h1, h2) in stopped {
            let Some(pair) = self.pair(h1, h2) else {
                continue;
            };
            if let Some(contact) = self.contacts.remove(&ordered(pair.shape_a, pair.shape_b)) {
                handler.separate(&contact.pair);
                report.separated += 1;
            }
        }
        for (h1, h2) in started {
            let Some(pair) = self.pair(h1, h2) else {
                continue;
            };
            let key = ordered(pair.shape_a, pair.shape_b);
            if self.contacts.contains_key(&key) {
                continue;
            }
            let respond = handler.begin(&pair);
            report.began += 1;
            let sensor = self.is_sensor(pair.shape_a) || self.is_sensor(pair.shape_b);
            self.contacts.insert(key, ActiveContact {
                pair,
                respond,
                sensor,
            });
        }

        for (_, rb) in self.rigid_bodies.iter_mut() {
            rb.reset_forces(false);
        }
        Ok(report)
    }

    /// Contact pair for two colliders in the order given. `None` when either
    /// collider no longer belongs to a registered shape.
    fn pair(&self, h1: ColliderHandle, h2: ColliderHandle) -> Option<ContactPair> {
        let a = shape_of(self.colliders.get(h1)?);
        let b = shape_of(self.colliders.get(h2)?);
        let (sa, sb) = (&self.shapes.get(&a)?.shape, &self.shapes.get(&b)?.shape);
        Some(ContactPair {
            shape_a: a,
            shape_b: b,
            group_a: sa.group,
            group_b: sb.group,
            body_a: sa.body,
            body_b: sb.body,
        })
    }

    fn is_sensor(&self, shape: ShapeHandle) -> bool {
        self.shape(shape).is_some_and(|s| s.sensor)
    }

    fn rigid(&self, handle: BodyHandle) -> Option<&rapier2d::dynamics::RigidBody> {
        let entry = self.bodies.get(&handle)?;
        self.rigid_bodies.get(entry.handle)
    }

    fn rigid_mut(
        &mut self,
        handle: BodyHandle,
    ) -> Result<&mut rapier2d::dynamics::RigidBody, PhysicsError> {
        let entry = self
            .bodies
            .get(&handle)
            .ok_or(PhysicsError::UnknownBody(handle))?;
        self.rigid_bodies
            .get_mut(entry.handle)
            .ok_or(PhysicsError::UnknownBody(handle))
    }
}

fn ordered(a: ShapeHandle, b: ShapeHandle) -> (ShapeHandle, ShapeHandle) {
    if a <= b { (a, b) } else { (b, a) }
}
