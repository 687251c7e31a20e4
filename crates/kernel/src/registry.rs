use std::collections::{BTreeMap, BTreeSet, HashMap};

use roomworld_common::{EntityId, WorldId};
use roomworld_physics::{ShapeHandle, Space};

use crate::commands::Commands;
use crate::entity::{DeathCause, Entity};
use crate::error::WorldError;
use crate::policy::CollisionPolicy;
use crate::router::{CollisionRouter, ContactDispatch};
use crate::transition::RoomTransitionFsm;

/// Buffered lifecycle requests, applied at the next flush.
#[derive(Debug, Default)]
pub struct LifecycleRequests {
    to_add: Vec<Entity>,
    to_remove: BTreeSet<EntityId>,
}

impl LifecycleRequests {
    /// Buffer an entity for admission. A second request for the same id
    /// before the flush is dropped.
    pub fn request_add(&mut self, entity: Entity) -> EntityId {
        let id = entity.id();
        if self.to_add.iter().any(|e| e.id() == id) {
            tracing::debug!(entity = %id, "duplicate add request ignored");
        } else {
            self.to_add.push(entity);
        }
        id
    }

    pub fn request_remove(&mut self, id: EntityId) {
        if !self.to_remove.insert(id) {
            tracing::debug!(entity = %id, "duplicate remove request ignored");
        }
    }

    pub fn pending_adds(&self) -> usize {
        self.to_add.len()
    }

    pub fn pending_removes(&self) -> usize {
        self.to_remove.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    pub fn clear(&mut self) {
        self.to_add.clear();
        self.to_remove.clear();
    }

    /// Take a buffered add back out.
    pub(crate) fn take_add(&mut self, id: EntityId) -> Option<Entity> {
        let index = self.to_add.iter().position(|e| e.id() == id)?;
        Some(self.to_add.remove(index))
    }

    /// Put requests a failed flush did not get to back in front of anything
    /// buffered since.
    fn restore(&mut self, adds: Vec<Entity>, removes: impl IntoIterator<Item = EntityId>) {
        let later = std::mem::replace(&mut self.to_add, adds);
        for entity in later {
            self.request_add(entity);
        }
        self.to_remove.extend(removes);
    }
}

/// What one flush changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub admitted: Vec<EntityId>,
    pub evicted: Vec<(EntityId, DeathCause)>,
}

/// The live entity set plus the buffers that feed it.
///
/// The live set only changes inside [`EntityRegistry::flush`] and
/// [`EntityRegistry::detach`]. Iteration is in id order, which does not
/// depend on admission order.
#[derive(Debug)]
pub struct EntityRegistry {
    world: WorldId,
    live: BTreeMap<EntityId, Entity>,
    requests: LifecycleRequests,
    owners: HashMap<ShapeHandle, EntityId>,
    policy: CollisionPolicy,
}

impl EntityRegistry {
    pub fn new(world: WorldId) -> Self {
        Self {
            world,
            live: BTreeMap::new(),
            requests: LifecycleRequests::default(),
            owners: HashMap::new(),
            policy: CollisionPolicy::canonical(),
        }
    }

    pub fn world_id(&self) -> WorldId {
        self.world
    }

    pub fn request_add(&mut self, entity: Entity) -> EntityId {
        self.requests.request_add(entity)
    }

    pub fn request_remove(&mut self, id: EntityId) {
        self.requests.request_remove(id);
    }

    pub fn requests(&self) -> &LifecycleRequests {
        &self.requests
    }

    /// Drop every buffered request.
    pub fn discard_requests(&mut self) {
        if !self.requests.is_empty() {
            tracing::debug!(
                adds = self.requests.pending_adds(),
                removes = self.requests.pending_removes(),
                "discarding buffered lifecycle requests"
            );
        }
        self.requests.clear();
    }

    pub fn policy(&self) -> &CollisionPolicy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut CollisionPolicy {
        &mut self.policy
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.live.contains_key(&id)
    }

    pub fn live_ids(&self) -> Vec<EntityId> {
        self.live.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.live.values()
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.live.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.live.get_mut(&id)
    }

    /// Entity owning an attached shape.
    pub fn owner_of(&self, shape: ShapeHandle) -> Option<EntityId> {
        self.owners.get(&shape).copied()
    }

    /// Split borrow for code that walks the live set while buffering
    /// lifecycle requests.
    pub(crate) fn parts_mut(
        &mut self,
    ) -> (
        &mut BTreeMap<EntityId, Entity>,
        &HashMap<ShapeHandle, EntityId>,
        &mut LifecycleRequests,
    ) {
        (&mut self.live, &self.owners, &mut self.requests)
    }

    /// Apply every buffered request.
    ///
    /// Admits `to_add`, then marks every live entity whose liveness flag is
    /// cleared for removal, then evicts. Contacts of an evicted entity end
    /// with a separate event while both sides are still live. `on_death`
    /// runs after the entity has left the physics space; anything it
    /// requests waits for the next flush.
    ///
    /// Buffered adds whose body could never be attached are dropped and
    /// reported as an error before anything else happens; the remaining
    /// requests stay buffered for the next flush. A failure part way through
    /// puts the requests not yet applied back in the buffers.
    pub fn flush(
        &mut self,
        space: &mut Space,
        router: &mut CollisionRouter,
        transitions: &mut RoomTransitionFsm,
    ) -> Result<FlushReport, WorldError> {
        self.flush_with_cause(space, router, transitions, DeathCause::Despawned)
    }

    /// Flush where explicit removals are reported as leaving with the room.
    pub(crate) fn flush_room_exit(
        &mut self,
        space: &mut Space,
        router: &mut CollisionRouter,
        transitions: &mut RoomTransitionFsm,
    ) -> Result<FlushReport, WorldError> {
        self.flush_with_cause(space, router, transitions, DeathCause::RoomExit)
    }

    fn flush_with_cause(
        &mut self,
        space: &mut Space,
        router: &mut CollisionRouter,
        transitions: &mut RoomTransitionFsm,
        removal_cause: DeathCause,
    ) -> Result<FlushReport, WorldError> {
        self.reject_invalid_adds()?;
        let LifecycleRequests { to_add, to_remove } = std::mem::take(&mut self.requests);
        let mut report = FlushReport::default();

        let mut adds = to_add.into_iter();
        while let Some(entity) = adds.next() {
            let id = entity.id();
            if self.live.contains_key(&id) {
                tracing::debug!(entity = %id, "add of live entity ignored");
                continue;
            }
            if let Err(err) = self.admit(entity, space) {
                tracing::error!(entity = %id, %err, "admission failed");
                self.requests.restore(adds.collect(), to_remove);
                return Err(err);
            }
            report.admitted.push(id);
        }

        let killed: BTreeSet<EntityId> = self
            .live
            .values()
            .filter(|e| !e.is_alive())
            .map(Entity::id)
            .collect();

        let doomed: Vec<EntityId> = to_remove.union(&killed).copied().collect();
        for (i, id) in doomed.iter().enumerate() {
            let cause = if killed.contains(id) {
                DeathCause::Killed
            } else {
                removal_cause
            };
            match self.evict(*id, space, router, transitions, cause) {
                Ok(true) => report.evicted.push((*id, cause)),
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(entity = %id, %err, "eviction failed");
                    // Killed entities are swept again by the next flush.
                    let rest = doomed[i..].iter().copied().filter(|id| to_remove.contains(id));
                    self.requests.restore(Vec::new(), rest);
                    return Err(err);
                }
            }
        }

        Ok(report)
    }

    /// Drop buffered adds that fail validation. Returns the first failure.
    fn reject_invalid_adds(&mut self) -> Result<(), WorldError> {
        let mut first = None;
        self.requests.to_add.retain(|entity| match entity.physics.validate() {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(entity = %entity.id(), kind = entity.kind(), %err, "add rejected");
                first.get_or_insert(err);
                false
            }
        });
        match first {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn admit(&mut self, mut entity: Entity, space: &mut Space) -> Result<(), WorldError> {
        let id = entity.id();
        entity.physics.attach(space, &self.policy)?;
        for shape in entity.physics.shape_handles() {
            self.owners.insert(*shape, id);
        }
        entity.set_world(Some(self.world));
        tracing::debug!(entity = %id, kind = entity.kind(), "admitted");
        self.live.insert(id, entity);
        Ok(())
    }

    /// Put an entity straight into the live set, bypassing the buffers.
    pub(crate) fn readmit(&mut self, entity: Entity, space: &mut Space) -> Result<(), WorldError> {
        let id = entity.id();
        if self.live.contains_key(&id) {
            return Ok(());
        }
        self.admit(entity, space)?;
        tracing::debug!(entity = %id, "readmitted");
        Ok(())
    }

    /// Make sure `id` is live again after an interrupted flush, pulling it
    /// out of the add buffer if that is where it was left.
    pub(crate) fn rescue(&mut self, id: EntityId, space: &mut Space) -> Result<bool, WorldError> {
        if self.live.contains_key(&id) {
            return Ok(true);
        }
        match self.requests.take_add(id) {
            Some(entity) => self.readmit(entity, space).map(|()| true),
            None => Ok(false),
        }
    }

    /// Returns false when `id` was not live.
    fn evict(
        &mut self,
        id: EntityId,
        space: &mut Space,
        router: &mut CollisionRouter,
        transitions: &mut RoomTransitionFsm,
        cause: DeathCause,
    ) -> Result<bool, WorldError> {
        self.end_contacts(id, space, router, transitions);
        let Some(mut entity) = self.take_live(id, space)? else {
            tracing::debug!(entity = %id, "remove of non-live entity ignored");
            return Ok(false);
        };
        tracing::debug!(entity = %id, kind = entity.kind(), ?cause, "evicted");
        let commands = Commands::new(&mut self.requests, transitions);
        entity.run_death_hook(space, commands, cause);
        Ok(true)
    }

    /// Remove a live entity without running `on_death`. Its contacts end
    /// with separate events first. The returned entity is detached and can
    /// be admitted again later.
    pub fn detach(
        &mut self,
        id: EntityId,
        space: &mut Space,
        router: &mut CollisionRouter,
        transitions: &mut RoomTransitionFsm,
    ) -> Result<Option<Entity>, WorldError> {
        self.end_contacts(id, space, router, transitions);
        let entity = self.take_live(id, space)?;
        if entity.is_some() {
            tracing::debug!(entity = %id, "detached");
        }
        Ok(entity)
    }

    /// Report every active contact of a live entity as separated. Handler
    /// faults are logged; the entity leaves regardless.
    fn end_contacts(
        &mut self,
        id: EntityId,
        space: &mut Space,
        router: &mut CollisionRouter,
        transitions: &mut RoomTransitionFsm,
    ) {
        let Some(body) = self.live.get(&id).and_then(|e| e.physics.body_handle()) else {
            return;
        };
        let mut dispatch = ContactDispatch::new(
            &mut self.live,
            &self.owners,
            &mut self.requests,
            transitions,
            router,
        );
        let ended = space.end_contacts(body, &mut dispatch);
        if let Some(err) = dispatch.take_fault() {
            tracing::warn!(entity = %id, %err, "separation during removal not delivered");
        }
        if ended > 0 {
            tracing::trace!(entity = %id, ended, "contacts ended on removal");
        }
    }

    /// The physics detach happens first, so a failure leaves the entity
    /// live and attached.
    fn take_live(&mut self, id: EntityId, space: &mut Space) -> Result<Option<Entity>, WorldError> {
        let Some(entity) = self.live.get_mut(&id) else {
            return Ok(None);
        };
        let shapes = entity.physics.shape_handles().to_vec();
        entity.physics.detach(space)?;
        for shape in &shapes {
            self.owners.remove(shape);
        }
        let Some(mut entity) = self.live.remove(&id) else {
            return Ok(None);
        };
        entity.set_world(None);
        Ok(Some(entity))
    }
}
