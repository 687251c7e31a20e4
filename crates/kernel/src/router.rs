//! Pairwise dispatch of contact events to game-logic handlers.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use roomworld_common::{CollisionGroup, EntityId};
use roomworld_physics::{ContactHandler, ContactPair, ShapeHandle};

use crate::commands::Commands;
use crate::entity::Entity;
use crate::error::WorldError;
use crate::registry::LifecycleRequests;
use crate::transition::RoomTransitionFsm;

/// The two entities of a contact with their groups, in the order the
/// physics space reported the pair.
pub struct Contact<'e> {
    pub group_a: CollisionGroup,
    pub a: &'e mut Entity,
    pub group_b: CollisionGroup,
    pub b: &'e mut Entity,
}

impl<'e> Contact<'e> {
    /// Both entities, the one in `group` first. Pairs where neither or both
    /// sides are in `group` keep the reported order.
    pub fn lead_by(self, group: CollisionGroup) -> (&'e mut Entity, &'e mut Entity) {
        if self.group_b == group && self.group_a != group {
            (self.b, self.a)
        } else {
            (self.a, self.b)
        }
    }

    /// Group of the side that is not `group`.
    pub fn other(&self, group: CollisionGroup) -> CollisionGroup {
        if self.group_a == group { self.group_b } else { self.group_a }
    }
}

/// Contact-begin callback. Returns whether the physical response proceeds.
pub type BeginFn = Box<dyn FnMut(Contact<'_>, &mut Commands<'_>) -> bool>;

/// Contact-end callback.
pub type SeparateFn = Box<dyn FnMut(Contact<'_>, &mut Commands<'_>)>;

/// Begin handler plus an optional separate handler for one group pair.
pub struct CollisionHandler {
    begin: BeginFn,
    separate: Option<SeparateFn>,
}

impl CollisionHandler {
    pub fn new(
        begin: impl FnMut(Contact<'_>, &mut Commands<'_>) -> bool + 'static,
    ) -> Self {
        Self {
            begin: Box::new(begin),
            separate: None,
        }
    }

    pub fn on_separate(
        mut self,
        separate: impl FnMut(Contact<'_>, &mut Commands<'_>) + 'static,
    ) -> Self {
        self.separate = Some(Box::new(separate));
        self
    }
}

impl fmt::Debug for CollisionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollisionHandler")
            .field("separate", &self.separate.is_some())
            .finish_non_exhaustive()
    }
}

/// Sparse `(group, group) → handler` table.
///
/// Keyed by the unordered pair; lookup depends only on the groups involved,
/// never on registration order. Handlers receive the entities in the order
/// the contact was reported and tell them apart by group.
#[derive(Debug, Default)]
pub struct CollisionRouter {
    handlers: BTreeMap<(CollisionGroup, CollisionGroup), CollisionHandler>,
}

fn pair_key(a: CollisionGroup, b: CollisionGroup) -> (CollisionGroup, CollisionGroup) {
    if a <= b { (a, b) } else { (b, a) }
}

impl CollisionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a handler; a later registration for the same pair replaces
    /// it. Returns true when a handler was replaced.
    pub fn register_handler(
        &mut self,
        first: CollisionGroup,
        second: CollisionGroup,
        handler: CollisionHandler,
    ) -> bool {
        let replaced = self
            .handlers
            .insert(pair_key(first, second), handler)
            .is_some();
        if replaced {
            tracing::debug!(%first, %second, "collision handler replaced");
        }
        replaced
    }

    pub fn has_handler(&self, a: CollisionGroup, b: CollisionGroup) -> bool {
        self.handlers.contains_key(&pair_key(a, b))
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Registered pairs in key order.
    pub fn pairs(&self) -> impl Iterator<Item = (CollisionGroup, CollisionGroup)> + '_ {
        self.handlers.keys().copied()
    }

    /// Dispatch a contact start. Without a handler the contact responds
    /// physically.
    pub fn on_contact_begin(
        &mut self,
        group_a: CollisionGroup,
        a: &mut Entity,
        group_b: CollisionGroup,
        b: &mut Entity,
        commands: &mut Commands<'_>,
    ) -> bool {
        let Some(handler) = self.handlers.get_mut(&pair_key(group_a, group_b)) else {
            return true;
        };
        let contact = Contact {
            group_a,
            a,
            group_b,
            b,
        };
        (handler.begin)(contact, commands)
    }

    pub fn on_contact_separate(
        &mut self,
        group_a: CollisionGroup,
        a: &mut Entity,
        group_b: CollisionGroup,
        b: &mut Entity,
        commands: &mut Commands<'_>,
    ) {
        let Some(separate) = self
            .handlers
            .get_mut(&pair_key(group_a, group_b))
            .and_then(|handler| handler.separate.as_mut())
        else {
            return;
        };
        let contact = Contact {
            group_a,
            a,
            group_b,
            b,
        };
        separate(contact, commands);
    }
}

/// Bridges physics contact events to the router, translating shapes to
/// their owning entities.
///
/// The first shape without an owner is kept in `fault` and reported after
/// the step; the contact itself responds physically.
pub(crate) struct ContactDispatch<'a> {
    live: &'a mut BTreeMap<EntityId, Entity>,
    owners: &'a HashMap<ShapeHandle, EntityId>,
    requests: &'a mut LifecycleRequests,
    transitions: &'a mut RoomTransitionFsm,
    router: &'a mut CollisionRouter,
    fault: Option<WorldError>,
}

enum Event {
    Begin,
    Separate,
}

impl<'a> ContactDispatch<'a> {
    pub(crate) fn new(
        live: &'a mut BTreeMap<EntityId, Entity>,
        owners: &'a HashMap<ShapeHandle, EntityId>,
        requests: &'a mut LifecycleRequests,
        transitions: &'a mut RoomTransitionFsm,
        router: &'a mut CollisionRouter,
    ) -> Self {
        Self {
            live,
            owners,
            requests,
            transitions,
            router,
            fault: None,
        }
    }

    pub(crate) fn take_fault(&mut self) -> Option<WorldError> {
        self.fault.take()
    }

    fn record(&mut self, error: WorldError) {
        if self.fault.is_none() {
            tracing::error!(%error, "contact dispatch failed");
            self.fault = Some(error);
        }
    }

    fn owner(&mut self, shape: ShapeHandle) -> Option<EntityId> {
        let owner = self.owners.get(&shape).copied();
        if owner.is_none() {
            self.record(WorldError::UnownedShape { shape });
        }
        owner
    }

    fn dispatch(&mut self, pair: &ContactPair, event: Event) -> bool {
        if !self.router.has_handler(pair.group_a, pair.group_b) {
            return true;
        }
        let (Some(id_a), Some(id_b)) = (self.owner(pair.shape_a), self.owner(pair.shape_b)) else {
            return true;
        };
        // Take one entity out so both can be borrowed mutably.
        let Some(mut a) = self.live.remove(&id_a) else {
            self.record(WorldError::NotLive(id_a));
            return true;
        };
        let result = match self.live.get_mut(&id_b) {
            Some(b) => {
                let mut commands = Commands::new(self.requests, self.transitions);
                match event {
                    Event::Begin => {
                        self.router
                            .on_contact_begin(pair.group_a, &mut a, pair.group_b, b, &mut commands)
                    }
                    Event::Separate => {
                        self.router.on_contact_separate(
                            pair.group_a,
                            &mut a,
                            pair.group_b,
                            b,
                            &mut commands,
                        );
                        true
                    }
                }
            }
            None => {
                self.record(WorldError::NotLive(id_b));
                true
            }
        };
        self.live.insert(id_a, a);
        result
    }
}

impl ContactHandler for ContactDispatch<'_> {
    fn begin(&mut self, pair: &ContactPair) -> bool {
        let respond = self.dispatch(pair, Event::Begin);
        tracing::trace!(a = %pair.group_a, b = %pair.group_b, respond, "contact begin");
        respond
    }

    fn separate(&mut self, pair: &ContactPair) {
        self.dispatch(pair, Event::Separate);
        tracing::trace!(a = %pair.group_a, b = %pair.group_b, "contact separate");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use glam::Vec2;
    use roomworld_common::{CollisionGroup::*, LayerMask, WorldId};
    use roomworld_physics::{Geometry, RigidBody, ShapeDesc, Space, StepParams};

    use super::*;
    use crate::registry::EntityRegistry;

    fn ball(kind: &'static str, group: CollisionGroup, x: f32) -> Entity {
        Entity::new(kind, RigidBody::dynamic(Vec2::new(x, 0.0), 1.0))
            .with_shape(ShapeDesc::new(Geometry::circle(1.0), group))
    }

    struct Harness {
        registry: EntityRegistry,
        space: Space,
        fsm: RoomTransitionFsm,
        router: CollisionRouter,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                registry: EntityRegistry::new(WorldId::new()),
                space: Space::default(),
                fsm: RoomTransitionFsm::default(),
                router: CollisionRouter::new(),
            }
        }

        fn add(&mut self, e: Entity) -> EntityId {
            let id = self.registry.request_add(e);
            self.registry
                .flush(&mut self.space, &mut self.router, &mut self.fsm)
                .unwrap();
            id
        }

        fn step(&mut self) -> Option<WorldError> {
            let params = StepParams {
                dt: 1.0 / 240.0,
                gravity: Vec2::ZERO,
                damping: 1.0,
            };
            let (live, owners, requests) = self.registry.parts_mut();
            let mut dispatch =
                ContactDispatch::new(live, owners, requests, &mut self.fsm, &mut self.router);
            self.space.step(&params, &mut dispatch).unwrap();
            dispatch.take_fault()
        }
    }

    #[test]
    fn registration_is_unordered_and_last_write_wins() {
        let mut router = CollisionRouter::new();
        assert!(!router.register_handler(Player, Enemy, CollisionHandler::new(|_, _| true)));
        assert!(router.register_handler(Enemy, Player, CollisionHandler::new(|_, _| false)));
        assert_eq!(router.handler_count(), 1);
        assert!(router.has_handler(Player, Enemy));
    }

    #[test]
    fn handler_receives_entities_in_reported_order() {
        let mut router = CollisionRouter::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        router.register_handler(
            Enemy,
            Player,
            CollisionHandler::new(move |contact, _| {
                log.borrow_mut().push((
                    contact.group_a,
                    contact.a.kind(),
                    contact.group_b,
                    contact.b.kind(),
                ));
                true
            }),
        );
        let mut hero = ball("hero", Player, 0.0);
        let mut slime = ball("slime", Enemy, 1.5);
        let mut requests = LifecycleRequests::default();
        let mut fsm = RoomTransitionFsm::new();
        let mut commands = Commands::new(&mut requests, &mut fsm);
        router.on_contact_begin(Player, &mut hero, Enemy, &mut slime, &mut commands);
        router.on_contact_begin(Enemy, &mut slime, Player, &mut hero, &mut commands);
        assert_eq!(
            *seen.borrow(),
            vec![
                (Player, "hero", Enemy, "slime"),
                (Enemy, "slime", Player, "hero")
            ]
        );
    }

    #[test]
    fn space_orientation_reaches_the_handler() {
        let mut h = Harness::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        h.router.register_handler(
            Enemy,
            Player,
            CollisionHandler::new(move |contact, _| {
                let reported = (contact.group_a, contact.group_b);
                log.borrow_mut().push((reported, contact.a.kind()));
                true
            }),
        );
        h.add(ball("hero", Player, 0.0));
        h.add(ball("slime", Enemy, 1.5));
        assert!(h.step().is_none());
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        let ((group_a, _), first) = seen[0];
        let expected = if group_a == Player { "hero" } else { "slime" };
        assert_eq!(first, expected);
    }

    #[test]
    fn lead_by_puts_the_named_group_first() {
        let mut hero = ball("hero", Player, 0.0);
        let mut coin = ball("coin", Collectable, 0.0);
        let contact = Contact {
            group_a: Collectable,
            a: &mut coin,
            group_b: Player,
            b: &mut hero,
        };
        assert_eq!(contact.other(Player), Collectable);
        let (first, second) = contact.lead_by(Player);
        assert_eq!((first.kind(), second.kind()), ("hero", "coin"));
    }

    #[test]
    fn veto_and_separate_reach_entities() {
        let mut h = Harness::new();
        let separated = Rc::new(RefCell::new(0));
        let count = separated.clone();
        h.router.register_handler(
            Player,
            Collectable,
            CollisionHandler::new(|contact, commands| {
                let (player, coin) = contact.lead_by(Player);
                player.points += coin.points;
                coin.kill();
                commands.despawn(coin.id());
                false
            })
            .on_separate(move |_, _| *count.borrow_mut() += 1),
        );
        let player = h.add(ball("hero", Player, 0.0));
        let coin = h.add(ball("coin", Collectable, 1.5).with_points(5));
        h.step();

        assert_eq!(h.registry.get(player).unwrap().points, 5);
        assert!(!h.registry.get(coin).unwrap().is_alive());
        assert_eq!(h.registry.requests().pending_removes(), 1);
        // Vetoed: the coin was not pushed away.
        let coin_pos = h.registry.get(coin).unwrap().physics.position(&h.space).unwrap();
        assert_eq!(coin_pos, Vec2::new(1.5, 0.0));

        h.registry.get_mut(coin).unwrap().set_alive(true);
        let coin_entity = h.registry.get_mut(coin).unwrap();
        coin_entity.physics.set_position(&mut h.space, Vec2::new(50.0, 0.0)).unwrap();
        h.step();
        assert_eq!(*separated.borrow(), 1);
    }

    #[test]
    fn excluded_pair_handler_never_fires() {
        let mut h = Harness::new();
        let fired = Rc::new(RefCell::new(false));
        let flag = fired.clone();
        h.router.register_handler(
            PlayerBullet,
            Player,
            CollisionHandler::new(move |_, _| {
                *flag.borrow_mut() = true;
                false
            }),
        );
        h.add(ball("hero", Player, 0.0));
        h.add(ball("shot", PlayerBullet, 0.5));
        for _ in 0..5 {
            h.step();
        }
        assert!(!*fired.borrow());
        assert_eq!(h.space.contact_count(), 0);
    }

    #[test]
    fn explicit_layers_override_policy() {
        let mut h = Harness::new();
        let fired = Rc::new(RefCell::new(0));
        let count = fired.clone();
        h.router.register_handler(
            Enemy,
            Enemy,
            CollisionHandler::new(move |_, _| {
                *count.borrow_mut() += 1;
                true
            }),
        );
        h.add(ball("a", Enemy, 0.0));
        h.add(
            Entity::new("b", RigidBody::dynamic(Vec2::new(1.5, 0.0), 1.0)).with_shape(
                ShapeDesc::new(Geometry::circle(1.0), Enemy).with_layers(LayerMask::of(&[Terrain])),
            ),
        );
        h.step();
        assert_eq!(*fired.borrow(), 0);
    }

    #[test]
    fn transition_requested_from_handler_is_buffered() {
        let mut h = Harness::new();
        h.router.register_handler(
            Player,
            Door,
            CollisionHandler::new(|contact, commands| {
                let (_, door) = contact.lead_by(Player);
                if let Some(portal) = door.portal.clone() {
                    commands.request_transition(portal.room, portal.entry);
                }
                false
            }),
        );
        h.add(ball("hero", Player, 0.0));
        h.add(ball("door", Door, 1.0).with_portal("cellar", Vec2::new(4.0, 2.0)));
        h.step();
        let pending = h.fsm.pending().unwrap();
        assert_eq!(pending.room, "cellar");
        assert_eq!(pending.entry, Vec2::new(4.0, 2.0));
    }
}
