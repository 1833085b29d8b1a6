//! Interest-managed snapshot building

use crate::util::geometry::Rect;
use crate::ws::protocol::{
    BulletView, ItemView, MapSize, MapView, PlayerView, ServerMsg, SnapshotView, TurretView,
};

use super::constants::{ITEM_SIZE, VIEW_PADDING_X, VIEW_PADDING_Y};
use super::entities::{Bullet, Item, Player, PlayerId, Turret};
use super::map::ArenaMap;
use super::room::Room;

/// Builds per-player views of a room
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Fixed-size window around a player's top-left corner, clamped at the
    /// arena origin
    pub fn view_window(viewer: &Player) -> Rect {
        Rect::new(
            (viewer.x - VIEW_PADDING_X).max(0.0),
            (viewer.y - VIEW_PADDING_Y).max(0.0),
            VIEW_PADDING_X * 2.0,
            VIEW_PADDING_Y * 2.0,
        )
    }

    /// Snapshot for one viewer
    pub fn build_for(room: &Room, viewer: &Player) -> SnapshotView {
        let window = Self::view_window(viewer);

        let bullets = room
            .bullets
            .iter()
            .filter(|b| window.contains_point(b.x, b.y))
            .map(Self::bullet_view)
            .collect();

        // Any part of the item touching the window counts
        let items = room
            .items
            .iter()
            .filter(|i| {
                i.x + ITEM_SIZE >= window.x
                    && i.x <= window.x + window.width
                    && i.y + ITEM_SIZE >= window.y
                    && i.y <= window.y + window.height
            })
            .map(Self::item_view)
            .collect();

        SnapshotView {
            tick: room.tick,
            players: room.players.iter().map(Self::player_view).collect(),
            bullets,
            items,
            turrets: room.turrets.iter().map(Self::turret_view).collect(),
            map: MapSize {
                width: room.map.width,
                height: room.map.height,
            },
            is_game_over: room.is_game_over,
            winner: room.winner,
        }
    }

    /// One snapshot message per seated player, built from the same state
    pub fn build_all(room: &Room) -> Vec<(PlayerId, ServerMsg)> {
        room.players
            .iter()
            .map(|viewer| (viewer.id, ServerMsg::Snapshot(Self::build_for(room, viewer))))
            .collect()
    }

    pub fn map_view(map: &ArenaMap) -> MapView {
        MapView {
            width: map.width,
            height: map.height,
            tile_size: map.tile_size,
            walls: map.walls.walls().to_vec(),
        }
    }

    pub fn player_view(p: &Player) -> PlayerView {
        PlayerView {
            id: p.id,
            slot: p.slot,
            x: p.x,
            y: p.y,
            width: p.width,
            height: p.height,
            last_dx: p.last_dx,
            last_dy: p.last_dy,
            speed: p.speed,
            health: p.health,
            max_health: p.max_health,
            shield: p.shield,
            bullet_type: p.bullet_type,
            buffs: p.buffs,
            spawn_protection: p.spawn_protection,
            is_invisible: p.is_invisible,
            burning: p.burn.is_some(),
            last_processed_input_seq: p.last_processed_input_seq,
        }
    }

    fn bullet_view(b: &Bullet) -> BulletView {
        BulletView {
            id: b.id,
            x: b.x,
            y: b.y,
            dx: b.dx,
            dy: b.dy,
            speed: b.speed,
            kind: b.kind,
            width: b.width,
            height: b.height,
            owner: b.owner,
            is_fragment: b.is_fragment(),
        }
    }

    fn item_view(i: &Item) -> ItemView {
        ItemView {
            x: i.x,
            y: i.y,
            kind: i.kind,
        }
    }

    fn turret_view(t: &Turret) -> TurretView {
        TurretView {
            id: t.id,
            x: t.x,
            y: t.y,
            size: t.size,
            health: t.health,
            max_health: t.max_health,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::{BulletType, ItemKind, Owner, Shot};
    use uuid::Uuid;

    fn room_with_two() -> Room {
        let host = Uuid::new_v4();
        let mut room = Room::new("snap".into(), host, 5);
        room.add_player(Uuid::new_v4()).unwrap();
        room.start(host).unwrap();
        room
    }

    #[test]
    fn window_clamps_at_origin() {
        let room = room_with_two();
        let w = SnapshotBuilder::view_window(&room.players[0]);
        assert_eq!((w.x, w.y, w.width, w.height), (0.0, 0.0, 1600.0, 1200.0));

        let w = SnapshotBuilder::view_window(&room.players[1]);
        assert_eq!((w.x, w.y), (175.0, 375.0));
    }

    #[test]
    fn bullets_and_items_filtered_per_viewer() {
        let mut room = room_with_two();
        let shot = Shot {
            owner: Owner::Turret(0),
            damage: 8.0,
            kind: BulletType::Normal,
        };
        room.bullets.push(Bullet::fire(1, (100.0, 100.0), (1.0, 0.0), shot).unwrap());
        room.items.push(Item { x: 150.0, y: 300.0, kind: ItemKind::Heal });
        // Right edge touches the second viewer's window at x = 175
        room.items.push(Item { x: 145.0, y: 900.0, kind: ItemKind::Speed });

        let first = SnapshotBuilder::build_for(&room, &room.players[0]);
        let second = SnapshotBuilder::build_for(&room, &room.players[1]);

        assert_eq!(first.players.len(), 2);
        assert_eq!(second.players.len(), 2);
        assert_eq!(first.bullets.len(), 1);
        assert!(second.bullets.is_empty());
        assert_eq!(first.items.len(), 2);
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].kind, ItemKind::Speed);
        assert_eq!(first.turrets.len(), room.turrets.len());
        assert_eq!(second.turrets.len(), room.turrets.len());
    }

    #[test]
    fn build_all_addresses_each_player() {
        let room = room_with_two();
        let msgs = SnapshotBuilder::build_all(&room);
        let ids: Vec<_> = msgs.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, room.player_ids());
        assert!(msgs.iter().all(|(_, m)| matches!(m, ServerMsg::Snapshot(_))));
    }
}
