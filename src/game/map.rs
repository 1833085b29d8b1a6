//! Procedural arena generation: tile walls and turret placement

use rand::Rng;

use crate::util::geometry::Rect;

use super::constants::*;
use super::entities::{Slot, Turret, TurretId};
use super::spatial::WallIndex;

/// Arena bounds plus indexed static geometry
#[derive(Debug, Clone)]
pub struct ArenaMap {
    pub width: f32,
    pub height: f32,
    pub tile_size: f32,
    pub walls: WallIndex,
}

impl ArenaMap {
    /// Build from an explicit wall list (client copy, tests)
    pub fn from_walls(width: f32, height: f32, walls: Vec<Rect>) -> Self {
        Self {
            width,
            height,
            tile_size: TILE_SIZE,
            walls: WallIndex::build(walls, CHUNK_SIZE),
        }
    }

    /// Random map: a solid border ring plus scattered obstacles that never
    /// land inside either corner spawn zone
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let cols = (MAP_WIDTH / TILE_SIZE) as u32;
        let rows = (MAP_HEIGHT / TILE_SIZE) as u32;
        let safe = MAP_SAFE_ZONE_TILES;
        let mut walls = Vec::new();

        for row in 0..rows {
            for col in 0..cols {
                let is_border = row == 0 || row == rows - 1 || col == 0 || col == cols - 1;
                let is_obstacle = rng.gen_bool(MAP_OBSTACLE_DENSITY);
                let in_p1_zone = col < safe && row < safe;
                let in_p2_zone = col + safe + 1 > cols && row + safe + 1 > rows;

                if is_border || (is_obstacle && !in_p1_zone && !in_p2_zone) {
                    walls.push(Rect::new(
                        col as f32 * TILE_SIZE,
                        row as f32 * TILE_SIZE,
                        TILE_SIZE,
                        TILE_SIZE,
                    ));
                }
            }
        }

        Self::from_walls(MAP_WIDTH, MAP_HEIGHT, walls)
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }

    /// Top-left spawn position for a seat
    pub fn spawn_point(&self, slot: Slot) -> (f32, f32) {
        match slot {
            Slot::P1 => P1_SPAWN,
            Slot::P2 => (self.width - P2_SPAWN_OFFSET.0, self.height - P2_SPAWN_OFFSET.1),
        }
    }

    /// Corner areas reserved for spawning, widened by the turret margin
    fn spawn_exclusion_zones(&self) -> [Rect; 2] {
        let extent = MAP_SAFE_ZONE_TILES as f32 * self.tile_size + TURRET_SAFE_MARGIN;
        [
            Rect::new(0.0, 0.0, extent, extent),
            Rect::new(self.width - extent, self.height - extent, extent, extent),
        ]
    }

    /// Two turrets per quadrant at random wall-free spots outside the spawn zones.
    /// A turret whose placement exhausts its retries is skipped.
    pub fn generate_turrets<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Turret> {
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        let quadrants = [
            Rect::new(0.0, 0.0, half_w, half_h),
            Rect::new(half_w, 0.0, half_w, half_h),
            Rect::new(0.0, half_h, half_w, half_h),
            Rect::new(half_w, half_h, half_w, half_h),
        ];
        let exclusions = self.spawn_exclusion_zones();

        let mut turrets = Vec::new();
        let mut next_id: TurretId = 0;

        for zone in &quadrants {
            for _ in 0..TURRETS_PER_QUADRANT {
                let spot = (0..TURRET_PLACEMENT_ATTEMPTS).find_map(|_| {
                    let x = zone.x + rng.gen::<f32>() * zone.width;
                    let y = zone.y + rng.gen::<f32>() * zone.height;
                    let footprint = Rect::new(x, y, TURRET_SIZE, TURRET_SIZE);
                    let blocked = exclusions.iter().any(|z| z.overlaps(&footprint))
                        || self.walls.collides(&footprint, 0.0);
                    (!blocked).then_some((x, y))
                });

                if let Some((x, y)) = spot {
                    turrets.push(Turret::new(next_id, x, y));
                    next_id += 1;
                }
            }
        }

        turrets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn border_is_solid_and_spawns_are_clear() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let map = ArenaMap::generate(&mut rng);

        let corner = Rect::new(0.0, 0.0, TILE_SIZE, TILE_SIZE);
        assert!(map.walls.walls().contains(&corner));

        for slot in [Slot::P1, Slot::P2] {
            let (x, y) = map.spawn_point(slot);
            let hitbox = Rect::new(x, y, TANK_WIDTH, TANK_HEIGHT).shrink(TANK_HITBOX_PADDING);
            assert!(!map.walls.collides(&hitbox, WALL_QUERY_PAD), "{:?} spawn blocked", slot);
        }
    }

    #[test]
    fn generation_is_deterministic_per_seed() {
        let a = ArenaMap::generate(&mut ChaCha8Rng::seed_from_u64(42));
        let b = ArenaMap::generate(&mut ChaCha8Rng::seed_from_u64(42));
        assert_eq!(a.walls.walls(), b.walls.walls());
    }

    #[test]
    fn turrets_avoid_walls_and_spawn_zones() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let map = ArenaMap::generate(&mut rng);
        let turrets = map.generate_turrets(&mut rng);

        assert!(turrets.len() <= 8);
        assert!(!turrets.is_empty());
        let zones = map.spawn_exclusion_zones();
        for t in &turrets {
            assert!(!map.walls.collides(&t.rect(), 0.0));
            assert!(zones.iter().all(|z| !z.overlaps(&t.rect())));
        }
    }
}
