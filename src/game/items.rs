//! Periodic pickup respawn

use rand::Rng;

use crate::util::geometry::Rect;

use super::constants::{
    ITEM_PLACEMENT_ATTEMPTS, ITEM_SIZE, ITEM_SPAWNS_PER_PASS, ITEM_SPAWN_INTERVAL_TICKS,
    ITEM_TARGETS,
};
use super::entities::{Item, ItemKind};
use super::map::ArenaMap;

/// Per-room respawn clock
#[derive(Debug, Clone, Default)]
pub struct ItemSpawner {
    ticks: u32,
}

impl ItemSpawner {
    pub fn reset(&mut self) {
        self.ticks = 0;
    }

    /// Advance one tick; every spawn interval, top up the item pool
    pub fn tick<R: Rng + ?Sized>(
        &mut self,
        items: &mut Vec<Item>,
        map: &ArenaMap,
        rng: &mut R,
    ) -> usize {
        self.ticks += 1;
        if self.ticks < ITEM_SPAWN_INTERVAL_TICKS {
            return 0;
        }
        self.ticks = 0;
        Self::replenish(items, map, rng)
    }

    /// Kinds to spawn this pass: repeatedly the one furthest below its target
    pub fn plan(items: &[Item]) -> Vec<ItemKind> {
        let mut counts = [0u32; ItemKind::ALL.len()];
        for item in items {
            counts[item.kind.index()] += 1;
        }

        let mut picks = Vec::new();
        for _ in 0..ITEM_SPAWNS_PER_PASS {
            let mut best: Option<(usize, u32)> = None;
            for (i, target) in ITEM_TARGETS.iter().enumerate() {
                let missing = target.saturating_sub(counts[i]);
                if missing > best.map_or(0, |(_, m)| m) {
                    best = Some((i, missing));
                }
            }
            let Some((i, _)) = best else { break };
            counts[i] += 1;
            picks.push(ItemKind::ALL[i]);
        }
        picks
    }

    /// Spawn planned kinds at random wall-free spots.
    /// A kind whose placement runs out of attempts is skipped this pass.
    pub fn replenish<R: Rng + ?Sized>(items: &mut Vec<Item>, map: &ArenaMap, rng: &mut R) -> usize {
        let max_x = (map.width - ITEM_SIZE).max(0.0);
        let max_y = (map.height - ITEM_SIZE).max(0.0);
        let mut spawned = 0;

        for kind in Self::plan(items) {
            let spot = (0..ITEM_PLACEMENT_ATTEMPTS).find_map(|_| {
                let x = rng.gen::<f32>() * max_x;
                let y = rng.gen::<f32>() * max_y;
                let footprint = Rect::new(x, y, ITEM_SIZE, ITEM_SIZE);
                (!map.walls.collides(&footprint, 0.0)).then_some((x, y))
            });

            if let Some((x, y)) = spot {
                items.push(Item { x, y, kind });
                spawned += 1;
            }
        }
        spawned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn plan_prefers_largest_deficit() {
        assert_eq!(
            ItemSpawner::plan(&[]),
            vec![ItemKind::Heal, ItemKind::Speed, ItemKind::Shield]
        );

        let items: Vec<Item> = (0..4)
            .map(|_| Item { x: 0.0, y: 0.0, kind: ItemKind::Heal })
            .collect();
        assert_eq!(
            ItemSpawner::plan(&items),
            vec![ItemKind::Speed, ItemKind::Shield, ItemKind::FireAmmo]
        );
    }

    #[test]
    fn full_pool_plans_nothing() {
        let items: Vec<Item> = ItemKind::ALL
            .iter()
            .flat_map(|k| {
                (0..ITEM_TARGETS[k.index()]).map(move |_| Item {
                    x: 0.0,
                    y: 0.0,
                    kind: *k,
                })
            })
            .collect();
        assert!(ItemSpawner::plan(&items).is_empty());
    }

    #[test]
    fn spawns_only_on_interval_and_off_walls() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let map = ArenaMap::generate(&mut rng);
        let mut spawner = ItemSpawner::default();
        let mut items = Vec::new();

        for _ in 0..ITEM_SPAWN_INTERVAL_TICKS - 1 {
            assert_eq!(spawner.tick(&mut items, &map, &mut rng), 0);
        }
        spawner.tick(&mut items, &map, &mut rng);

        assert!(!items.is_empty() && items.len() <= ITEM_SPAWNS_PER_PASS as usize);
        for item in &items {
            assert!(!map.walls.collides(&item.rect(), 0.0));
        }
    }
}
