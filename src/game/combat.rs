//! Combat system - shooting, turret AI, bullet flight and hit resolution, pickups, buff decay

use std::f32::consts::{FRAC_PI_2, TAU};

use crate::util::geometry::{distance, Rect};

use super::constants::*;
use super::entities::{
    Bullet, BulletId, BulletType, BurnEffect, Item, ItemKind, Owner, Player, PlayerId, Shot,
    Turret, TurretId,
};
use super::spatial::WallIndex;

/// Something noteworthy that happened during a tick
#[derive(Debug, Clone, PartialEq)]
pub enum CombatEvent {
    Shot { owner: Owner, bullet_id: BulletId },
    PlayerHit { target: PlayerId, owner: Owner, damage: f32 },
    /// Bullet consumed by spawn protection or stealth
    Absorbed { target: PlayerId },
    TurretHit { turret: TurretId, destroyed: bool },
    ClusterBurst { x: f32, y: f32 },
    ItemPicked { player: PlayerId, kind: ItemKind },
}

/// Room-scoped monotonic bullet id source
#[derive(Debug, Clone, Default)]
pub struct BulletSeq(BulletId);

impl BulletSeq {
    pub fn next(&mut self) -> BulletId {
        let id = self.0;
        self.0 = self.0.wrapping_add(1);
        id
    }
}

/// Combat system for weapons, damage and status effects
pub struct CombatSystem;

impl CombatSystem {
    /// Muzzle point: tank centre pushed out along the facing direction
    pub fn muzzle_position(player: &Player) -> (f32, f32) {
        let (cx, cy) = player.center();
        let angle = player.facing_angle() - FRAC_PI_2;
        (
            cx + angle.cos() * BULLET_BARREL_LENGTH,
            cy + angle.sin() * BULLET_BARREL_LENGTH,
        )
    }

    /// Fire if the trigger is held, the latch is open and the cooldown elapsed
    pub fn try_player_fire(
        player: &mut Player,
        now_ms: u64,
        seq: &mut BulletSeq,
    ) -> Option<Bullet> {
        if !player.is_alive() || !player.keys.shoot || !player.can_shoot {
            return None;
        }
        if now_ms.saturating_sub(player.last_shoot_ms) < player.shoot_cooldown_ms {
            return None;
        }

        // Firing gives away the position
        if player.is_invisible {
            player.cancel_stealth();
        }

        let (x, y) = Self::muzzle_position(player);
        let bullet = Bullet::fire(
            seq.next(),
            (x, y),
            (player.last_dx, player.last_dy),
            Shot {
                owner: Owner::Player(player.id),
                damage: player.damage,
                kind: player.bullet_type,
            },
        )?;

        player.can_shoot = false;
        player.last_shoot_ms = now_ms;
        Some(bullet)
    }

    /// Nearest alive, visible player within range of the turret, by centre distance
    pub fn turret_target<'a>(turret: &Turret, players: &'a [Player]) -> Option<&'a Player> {
        let (tx, ty) = turret.center();
        players
            .iter()
            .filter(|p| p.is_alive() && !p.is_invisible)
            .map(|p| {
                let (px, py) = p.center();
                (p, distance(tx, ty, px, py))
            })
            .filter(|(_, d)| d.is_finite() && *d > 0.0 && *d <= turret.range)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(p, _)| p)
    }

    /// Run every alive turret: pick a target and fire when off cooldown
    pub fn update_turrets(
        turrets: &mut [Turret],
        players: &[Player],
        now_ms: u64,
        seq: &mut BulletSeq,
        events: &mut Vec<CombatEvent>,
    ) -> Vec<Bullet> {
        let mut fired = Vec::new();

        for turret in turrets.iter_mut().filter(|t| t.is_alive()) {
            let Some(target) = Self::turret_target(turret, players) else {
                continue;
            };
            if now_ms.saturating_sub(turret.last_shoot_ms) < turret.shoot_cooldown_ms {
                continue;
            }

            let (tx, ty) = turret.center();
            let (px, py) = target.center();
            let owner = Owner::Turret(turret.id);
            let shot = Shot {
                owner,
                damage: turret.damage,
                kind: BulletType::Normal,
            };
            if let Some(bullet) = Bullet::fire(seq.next(), (tx, ty), (px - tx, py - ty), shot) {
                events.push(CombatEvent::Shot {
                    owner,
                    bullet_id: bullet.id,
                });
                turret.last_shoot_ms = now_ms;
                fired.push(bullet);
            }
        }

        fired
    }

    /// Move bullets one step; expire fragments and anything leaving the arena
    pub fn advance_bullets(bullets: &mut [Bullet], bounds: &Rect) {
        for bullet in bullets.iter_mut() {
            bullet.x += bullet.dx * bullet.speed;
            bullet.y += bullet.dy * bullet.speed;

            if let Some(life) = bullet.lifespan.as_mut() {
                *life = life.saturating_sub(1);
                if *life == 0 {
                    bullet.spent = true;
                }
            }

            if !bounds.contains_point(bullet.x, bullet.y) {
                bullet.spent = true;
            }
        }
    }

    /// `count` fragments at `(x, y)` radiating at equal angular steps, first one along +x
    pub fn spawn_fragments(
        x: f32,
        y: f32,
        owner: Owner,
        count: u32,
        seq: &mut BulletSeq,
    ) -> Vec<Bullet> {
        if count == 0 {
            return Vec::new();
        }
        let step = TAU / count as f32;
        (0..count)
            .map(|i| Bullet::fragment(seq.next(), x, y, step * i as f32, owner))
            .collect()
    }

    /// Resolve bullet collisions against walls, then players, then turrets.
    ///
    /// The first match consumes the bullet; bullets already spent this tick
    /// are skipped. Fragments produced here are returned rather than pushed so
    /// they only start resolving on the next tick.
    pub fn resolve_bullets(
        bullets: &mut [Bullet],
        players: &mut [Player],
        turrets: &mut [Turret],
        walls: &WallIndex,
        seq: &mut BulletSeq,
        events: &mut Vec<CombatEvent>,
    ) -> Vec<Bullet> {
        let mut fragments = Vec::new();

        for bullet in bullets.iter_mut().filter(|b| !b.spent) {
            let rect = bullet.rect();

            // Walls
            if bullet.kind != BulletType::Piercing && walls.collides(&rect, WALL_QUERY_PAD) {
                Self::burst_if_cluster(bullet, seq, &mut fragments, events);
                bullet.spent = true;
                continue;
            }

            // Players
            let target = players.iter_mut().find(|p| {
                Owner::Player(p.id) != bullet.owner && p.rect().overlaps(&rect)
            });
            if let Some(player) = target {
                bullet.spent = true;

                if player.is_damage_immune() {
                    events.push(CombatEvent::Absorbed { target: player.id });
                    continue;
                }

                let damage = (bullet.damage - player.shield).max(0.0);
                player.take_damage(damage);
                events.push(CombatEvent::PlayerHit {
                    target: player.id,
                    owner: bullet.owner,
                    damage,
                });

                if bullet.kind == BulletType::Fire {
                    player.burn = Some(BurnEffect::default());
                }
                Self::burst_if_cluster(bullet, seq, &mut fragments, events);
                continue;
            }

            // Turrets never damage each other
            if bullet.owner.is_turret() {
                continue;
            }
            if let Some(turret) = turrets
                .iter_mut()
                .find(|t| t.is_alive() && t.rect().overlaps(&rect))
            {
                turret.take_damage(bullet.damage);
                events.push(CombatEvent::TurretHit {
                    turret: turret.id,
                    destroyed: !turret.is_alive(),
                });
                Self::burst_if_cluster(bullet, seq, &mut fragments, events);
                bullet.spent = true;
            }
        }

        fragments
    }

    fn burst_if_cluster(
        bullet: &Bullet,
        seq: &mut BulletSeq,
        fragments: &mut Vec<Bullet>,
        events: &mut Vec<CombatEvent>,
    ) {
        if bullet.kind != BulletType::Cluster {
            return;
        }
        fragments.extend(Self::spawn_fragments(
            bullet.x,
            bullet.y,
            bullet.owner,
            CLUSTER_FRAGMENT_COUNT,
            seq,
        ));
        events.push(CombatEvent::ClusterBurst {
            x: bullet.x,
            y: bullet.y,
        });
    }

    /// Apply one pickup's effect to a player
    pub fn apply_item(player: &mut Player, kind: ItemKind) {
        match kind {
            ItemKind::Heal => player.heal(HEAL_AMOUNT),
            ItemKind::Speed => {
                player.buffs.speed = player.buffs.speed.max(SPEED_BUFF_TICKS);
                player.speed = player.default_speed + SPEED_BOOST;
            }
            ItemKind::Shield => {
                player.shield = SHIELD_VALUE;
                player.buffs.shield = SHIELD_BUFF_TICKS;
            }
            ItemKind::FireAmmo => {
                player.bullet_type = BulletType::Fire;
                player.buffs.fire_ammo = FIRE_AMMO_TICKS;
                player.buffs.cluster_ammo = 0;
            }
            ItemKind::ClusterAmmo => {
                player.bullet_type = BulletType::Cluster;
                player.buffs.cluster_ammo = CLUSTER_AMMO_TICKS;
                player.buffs.fire_ammo = 0;
            }
            ItemKind::Stealth => {
                player.is_invisible = true;
                player.buffs.stealth = STEALTH_TICKS;
            }
        }
    }

    /// Hand every overlapped item to the player touching it
    pub fn collect_items(
        players: &mut [Player],
        items: &mut Vec<Item>,
        events: &mut Vec<CombatEvent>,
    ) {
        for player in players.iter_mut() {
            let body = player.rect();
            items.retain(|item| {
                if !body.overlaps(&item.rect()) {
                    return true;
                }
                Self::apply_item(player, item.kind);
                events.push(CombatEvent::ItemPicked {
                    player: player.id,
                    kind: item.kind,
                });
                false
            });
        }
    }

    /// Count down buffs, spawn protection and burn for one tick
    pub fn decay_status(player: &mut Player) {
        let buffs = &mut player.buffs;

        if buffs.speed > 0 {
            player.speed = player.default_speed + SPEED_BOOST;
            buffs.speed -= 1;
            if buffs.speed == 0 {
                player.speed = player.default_speed;
            }
        }

        if buffs.shield > 0 {
            buffs.shield -= 1;
            if buffs.shield == 0 {
                player.shield = player.default_shield;
            }
        }

        if buffs.fire_ammo > 0 {
            buffs.fire_ammo -= 1;
            if buffs.fire_ammo == 0 {
                player.bullet_type = player.default_bullet_type;
            }
        }

        if buffs.cluster_ammo > 0 {
            buffs.cluster_ammo -= 1;
            if buffs.cluster_ammo == 0 {
                player.bullet_type = player.default_bullet_type;
            }
        }

        if buffs.stealth > 0 {
            buffs.stealth -= 1;
            if buffs.stealth == 0 {
                player.is_invisible = false;
            }
        }

        if player.spawn_protection > 0 {
            player.spawn_protection -= 1;
        }

        let immune = player.is_damage_immune();
        if let Some(mut burn) = player.burn.take() {
            if !immune {
                player.take_damage(burn.damage_per_tick);
            }
            burn.ticks_remaining = burn.ticks_remaining.saturating_sub(1);
            if burn.ticks_remaining > 0 {
                player.burn = Some(burn);
            }
        }
    }

    /// Winner once a tank is destroyed. The first seat is checked first, so a
    /// simultaneous double knockout goes to the second seat.
    pub fn check_winner(players: &[Player]) -> Option<PlayerId> {
        match players {
            [first, second] if !first.is_alive() => Some(second.id),
            [first, second] if !second.is_alive() => Some(first.id),
            _ => None,
        }
    }
}
