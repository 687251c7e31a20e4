//! Built-in demo content: two rooms joined by doors, a player that runs and
//! shoots, patrolling enemies that drop coins.

use glam::Vec2;
use roomworld_common::{CollisionGroup, Facing};
use roomworld_kernel::{ActorContext, Controller, DeathCause, Entity, Room, World, WorldError};
use roomworld_physics::{Geometry, RigidBody, ShapeDesc};

pub const ZONE: &str = "lowlands";
pub const START_ROOM: &str = "meadow";
pub const SPAWN: Vec2 = Vec2::new(-300.0, 40.0);

const HALF_WIDTH: f32 = 400.0;
const PLAYER_SPEED: f32 = 120.0;
const BULLET_SPEED: f32 = 420.0;
const FIRE_INTERVAL: f32 = 0.4;
const BULLET_LIFETIME: f32 = 1.5;
const PATROL_SPEED: f32 = 40.0;
const PATROL_TURN: f32 = 2.0;

/// Register the demo zone.
pub fn populate(world: &mut World) -> Result<(), WorldError> {
    world.add_zone(
        ZONE,
        vec![
            Room::new("meadow")
                .with_actor(floor)
                .with_actor(|| wall(-HALF_WIDTH))
                .with_actor(|| wall(HALF_WIDTH))
                .with_actor(|| door(HALF_WIDTH - 30.0, "cave", SPAWN))
                .with_actor(|| slime(-60.0))
                .with_actor(|| slime(120.0))
                .with_actor(|| coin(-200.0, 30.0))
                .with_actor(|| coin(0.0, 30.0)),
            Room::new("cave")
                .with_actor(floor)
                .with_actor(|| wall(-HALF_WIDTH))
                .with_actor(|| wall(HALF_WIDTH))
                .with_actor(|| door(HALF_WIDTH - 30.0, "meadow", SPAWN))
                .with_actor(|| slime(-150.0))
                .with_actor(|| slime(0.0))
                .with_actor(|| slime(150.0))
                .with_actor(|| coin(60.0, 60.0)),
        ],
    )
}

pub fn player() -> Entity {
    Entity::new("player", RigidBody::dynamic(SPAWN, 1.0))
        .with_health(20.0)
        .with_facing(Facing::Right)
        .with_shape(ShapeDesc::new(Geometry::circle(8.0), CollisionGroup::Player))
        .with_controller(Runner { cooldown: 0.0 })
}

fn floor() -> Entity {
    Entity::new("floor", RigidBody::fixed(Vec2::new(0.0, -10.0)))
        .with_shape(ShapeDesc::new(Geometry::rect(HALF_WIDTH * 2.0, 20.0), CollisionGroup::Terrain))
}

fn wall(x: f32) -> Entity {
    Entity::new("wall", RigidBody::fixed(Vec2::new(x, 100.0)))
        .with_shape(ShapeDesc::new(Geometry::rect(20.0, 200.0), CollisionGroup::Terrain))
}

fn door(x: f32, room: &str, entry: Vec2) -> Entity {
    Entity::new("door", RigidBody::fixed(Vec2::new(x, 20.0)))
        .with_portal(room, entry)
        .with_shape(ShapeDesc::new(Geometry::rect(16.0, 40.0), CollisionGroup::Door).sensor())
}

fn slime(x: f32) -> Entity {
    Entity::new("slime", RigidBody::dynamic(Vec2::new(x, 10.0), 2.0))
        .with_health(3.0)
        .with_damage(1.0)
        .with_shape(ShapeDesc::new(Geometry::circle(10.0), CollisionGroup::Enemy))
        .with_controller(Patrol { timer: 0.0 })
}

fn coin(x: f32, y: f32) -> Entity {
    Entity::new("coin", RigidBody::fixed(Vec2::new(x, y)))
        .with_points(10)
        .with_shape(ShapeDesc::new(Geometry::circle(5.0), CollisionGroup::Collectable).sensor())
}

fn bullet(position: Vec2, facing: Facing) -> Entity {
    let velocity = Vec2::new(facing.sign() * BULLET_SPEED, 60.0);
    Entity::new("bullet", RigidBody::dynamic(position, 0.1).with_velocity(velocity))
        .with_damage(1.0)
        .with_facing(facing)
        .with_shape(ShapeDesc::new(Geometry::circle(3.0), CollisionGroup::PlayerBullet))
        .with_controller(Fuse {
            remaining: BULLET_LIFETIME,
        })
}

/// Runs in its facing direction and fires on a fixed cadence.
struct Runner {
    cooldown: f32,
}

impl Controller for Runner {
    fn update(&mut self, ctx: &mut ActorContext<'_>, dt: f32) {
        let facing = ctx.facing();
        let velocity = ctx.velocity();
        ctx.set_velocity(Vec2::new(facing.sign() * PLAYER_SPEED, velocity.y));

        self.cooldown -= dt;
        if self.cooldown <= 0.0 {
            self.cooldown = FIRE_INTERVAL;
            let muzzle = ctx.position() + Vec2::new(facing.sign() * 14.0, 4.0);
            ctx.spawn(bullet(muzzle, facing));
        }
    }

    fn on_death(&mut self, ctx: &mut ActorContext<'_>, cause: DeathCause) {
        tracing::info!(player = %ctx.id(), ?cause, points = ctx.entity().points, "player down");
    }
}

/// Walks back and forth, turning on a timer.
struct Patrol {
    timer: f32,
}

impl Controller for Patrol {
    fn update(&mut self, ctx: &mut ActorContext<'_>, dt: f32) {
        self.timer += dt;
        if self.timer >= PATROL_TURN {
            self.timer = 0.0;
            let turned = match ctx.facing() {
                Facing::Left => Facing::Right,
                Facing::Right => Facing::Left,
            };
            ctx.set_facing(turned);
        }
        let velocity = ctx.velocity();
        ctx.set_velocity(Vec2::new(ctx.facing().sign() * PATROL_SPEED, velocity.y));
    }

    fn on_death(&mut self, ctx: &mut ActorContext<'_>, cause: DeathCause) {
        if cause == DeathCause::Killed {
            let at = ctx.position() + Vec2::new(0.0, 20.0);
            ctx.spawn(coin(at.x, at.y));
        }
    }
}

/// Kills its entity after a fixed time.
struct Fuse {
    remaining: f32,
}

impl Controller for Fuse {
    fn update(&mut self, ctx: &mut ActorContext<'_>, dt: f32) {
        self.remaining -= dt;
        if self.remaining <= 0.0 {
            ctx.kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_world() -> World {
        let mut world = World::new();
        world.install_default_handlers();
        populate(&mut world).unwrap();
        world.set_player(player());
        world.request_transition(START_ROOM, SPAWN).unwrap();
        world
    }

    #[test]
    fn demo_rooms_register() {
        let world = demo_world();
        assert_eq!(world.rooms().zone(ZONE).map(<[String]>::len), Some(2));
        assert!(world.rooms().contains("cave"));
    }

    #[test]
    fn player_enters_start_room_and_fires() {
        let mut world = demo_world();
        let player = world.player().unwrap();
        let report = world.update(1.0 / 60.0).unwrap();
        assert_eq!(report.entered.as_deref(), Some(START_ROOM));
        assert_eq!(world.position(player), Some(SPAWN));

        for _ in 0..5 {
            world.update(1.0 / 60.0).unwrap();
        }
        assert!(world.registry().iter().any(|e| e.kind() == "bullet"));
        assert!(world.velocity(player).unwrap().x > 0.0);
    }

    #[test]
    fn door_leads_to_the_cave() {
        let mut world = demo_world();
        let player = world.player().unwrap();
        world.update(1.0 / 60.0).unwrap();
        world
            .set_position(player, Vec2::new(HALF_WIDTH - 30.0, 20.0))
            .unwrap();

        let report = world.update(1.0 / 60.0).unwrap();
        assert_eq!(report.entered.as_deref(), Some("cave"));
        assert_eq!(world.current_room(), Some("cave"));
        assert_eq!(world.position(player), Some(SPAWN));
        let slimes = world.registry().iter().filter(|e| e.kind() == "slime").count();
        assert_eq!(slimes, 3);
    }
}
