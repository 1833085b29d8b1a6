//! Tank movement shared by the authoritative tick and client prediction.
//!
//! Both sides must resolve intent and collide identically or prediction
//! will never converge, so everything here is a pure function of its inputs.

use crate::util::geometry::Rect;

use super::constants::{TANK_HEIGHT, TANK_HITBOX_PADDING, TANK_WIDTH, WALL_QUERY_PAD};
use super::entities::{KeyState, MoveKey};
use super::map::ArenaMap;

/// Per-axis movement direction, each component in {-1, 0, 1}
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Intent {
    pub dx: f32,
    pub dy: f32,
}

impl Intent {
    pub fn is_idle(&self) -> bool {
        self.dx == 0.0 && self.dy == 0.0
    }
}

/// Resolve held keys into a direction.
///
/// The priority stack is scanned newest first; the first vertical key fixes
/// the vertical axis and the first horizontal key fixes the horizontal axis,
/// so of two opposite keys the most recently pressed one wins. Without
/// priority data each held key sets its axis directly.
pub fn resolve_intent(keys: &KeyState) -> Intent {
    let mut intent = Intent::default();

    if keys.priority.is_empty() {
        if keys.up {
            intent.dy = -1.0;
        }
        if keys.down {
            intent.dy = 1.0;
        }
        if keys.left {
            intent.dx = -1.0;
        }
        if keys.right {
            intent.dx = 1.0;
        }
        return intent;
    }

    let mut vertical_set = false;
    let mut horizontal_set = false;

    for key in keys.priority.iter().rev() {
        match key {
            MoveKey::Up if !vertical_set => {
                intent.dy = -1.0;
                vertical_set = true;
            }
            MoveKey::Down if !vertical_set => {
                intent.dy = 1.0;
                vertical_set = true;
            }
            MoveKey::Left if !horizontal_set => {
                intent.dx = -1.0;
                horizontal_set = true;
            }
            MoveKey::Right if !horizontal_set => {
                intent.dx = 1.0;
                horizontal_set = true;
            }
            _ => {}
        }
        if vertical_set && horizontal_set {
            break;
        }
    }

    intent
}

/// Collision hitbox for a tank whose top-left corner is at `(x, y)`
pub fn tank_hitbox(x: f32, y: f32) -> Rect {
    Rect::new(x, y, TANK_WIDTH, TANK_HEIGHT).shrink(TANK_HITBOX_PADDING)
}

/// Apply one movement step.
///
/// The tentative position is clamped to the arena, then the padded hitbox is
/// tested against nearby walls. Any overlap reverts to the starting position;
/// there is no sliding along walls. Non-finite speed is ignored.
pub fn step(x: f32, y: f32, intent: Intent, speed: f32, map: &ArenaMap) -> (f32, f32) {
    if intent.is_idle() || !speed.is_finite() {
        return (x, y);
    }

    let nx = (x + intent.dx * speed).clamp(0.0, (map.width - TANK_WIDTH).max(0.0));
    let ny = (y + intent.dy * speed).clamp(0.0, (map.height - TANK_HEIGHT).max(0.0));

    if map.walls.collides(&tank_hitbox(nx, ny), WALL_QUERY_PAD) {
        (x, y)
    } else {
        (nx, ny)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys_with(priority: &[MoveKey]) -> KeyState {
        let mut keys = KeyState::default();
        for k in priority {
            keys.press(*k);
        }
        keys
    }

    fn open_map() -> ArenaMap {
        ArenaMap::from_walls(1200.0, 1200.0, Vec::new())
    }

    #[test]
    fn latest_horizontal_key_wins() {
        let intent = resolve_intent(&keys_with(&[MoveKey::Right, MoveKey::Left]));
        assert_eq!(intent, Intent { dx: -1.0, dy: 0.0 });
    }

    #[test]
    fn axes_resolve_independently() {
        let intent = resolve_intent(&keys_with(&[MoveKey::Up, MoveKey::Left, MoveKey::Down]));
        assert_eq!(intent, Intent { dx: -1.0, dy: 1.0 });
    }

    #[test]
    fn legacy_flags_without_priority() {
        let keys = KeyState {
            up: true,
            right: true,
            ..KeyState::default()
        };
        assert_eq!(resolve_intent(&keys), Intent { dx: 1.0, dy: -1.0 });
    }

    #[test]
    fn move_is_clamped_to_arena() {
        let map = open_map();
        assert_eq!(step(1.0, 1.0, Intent { dx: -1.0, dy: -1.0 }, 2.5, &map), (0.0, 0.0));
        assert_eq!(
            step(1153.0, 600.0, Intent { dx: 1.0, dy: 0.0 }, 2.5, &map),
            (1200.0 - TANK_WIDTH, 600.0)
        );
    }

    #[test]
    fn blocked_move_fully_reverts() {
        // Hitbox right edge sits at 100 + 46 - 8 = 138; wall starts at 140
        let map = ArenaMap::from_walls(1200.0, 1200.0, vec![Rect::new(140.0, 0.0, 50.0, 1200.0)]);
        let start = (100.0, 300.0);
        let moved = step(start.0, start.1, Intent { dx: 1.0, dy: 0.0 }, 2.5, &map);
        assert_eq!(moved, start);

        // Moving away from the wall is unobstructed
        let moved = step(start.0, start.1, Intent { dx: -1.0, dy: 0.0 }, 2.5, &map);
        assert_eq!(moved, (97.5, 300.0));
    }

    #[test]
    fn non_finite_speed_is_ignored() {
        let map = open_map();
        assert_eq!(step(50.0, 50.0, Intent { dx: 1.0, dy: 0.0 }, f32::NAN, &map), (50.0, 50.0));
    }
}
