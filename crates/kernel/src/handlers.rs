//! Stock gameplay reactions for the canonical groups.

use roomworld_common::CollisionGroup;

use crate::commands::Commands;
use crate::entity::Entity;
use crate::router::{CollisionHandler, CollisionRouter, Contact};

/// Install the standard handlers. Content may replace any of them by
/// registering the same pair afterwards.
///
/// Contacts arrive in reported order, so every handler picks its sides by
/// group.
pub fn install_default_handlers(router: &mut CollisionRouter) {
    use CollisionGroup::*;

    for (bullet, target) in [(PlayerBullet, Enemy), (EnemyBullet, Player)] {
        router.register_handler(bullet, target, CollisionHandler::new(hit));
        router.register_handler(
            bullet,
            Terrain,
            CollisionHandler::new(|contact, _| expire(bullet_first(contact).0)),
        );
    }

    router.register_handler(
        Enemy,
        Player,
        CollisionHandler::new(|contact, _| {
            let (enemy, player) = contact.lead_by(Enemy);
            if enemy.is_alive() {
                player.take_damage(enemy.damage);
            }
            true
        }),
    );

    router.register_handler(
        Player,
        Collectable,
        CollisionHandler::new(|contact, _| {
            let (player, item) = contact.lead_by(Player);
            if item.is_alive() {
                player.points += item.points;
                item.kill();
            }
            false
        }),
    );

    router.register_handler(
        Player,
        Door,
        CollisionHandler::new(|contact, commands| {
            let (_, door) = contact.lead_by(Player);
            if let Some(portal) = &door.portal {
                commands.request_transition(portal.room.clone(), portal.entry);
            }
            false
        }),
    );
}

/// The bullet side of a contact first.
fn bullet_first<'e>(contact: Contact<'e>) -> (&'e mut Entity, &'e mut Entity) {
    let bullet = if contact.group_a.is_bullet() {
        contact.group_a
    } else {
        contact.group_b
    };
    contact.lead_by(bullet)
}

/// A bullet lands once: it damages the first target it touches and dies.
fn hit(contact: Contact<'_>, _: &mut Commands<'_>) -> bool {
    let (bullet, target) = bullet_first(contact);
    if bullet.is_alive() {
        target.take_damage(bullet.damage);
        bullet.kill();
    }
    false
}

fn expire(bullet: &mut Entity) -> bool {
    bullet.kill();
    false
}
