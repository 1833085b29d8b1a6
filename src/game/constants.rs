//! Gameplay tuning shared by the authoritative server and client prediction.
//!
//! Durations measured in ticks assume the 60 Hz simulation rate; cooldowns
//! measured in milliseconds are compared against wall-clock time.

// ---------------------------------------------------------------------------
// Map
// ---------------------------------------------------------------------------

pub const MAP_WIDTH: f32 = 1200.0;
pub const MAP_HEIGHT: f32 = 1200.0;
pub const TILE_SIZE: f32 = 50.0;
/// Edge length of one wall-index bucket
pub const CHUNK_SIZE: f32 = 200.0;
/// Padding added around a query rectangle when looking up nearby walls
pub const WALL_QUERY_PAD: f32 = 10.0;
pub const MAP_OBSTACLE_DENSITY: f64 = 0.10;
/// Obstacle-free square (in tiles) at both spawn corners
pub const MAP_SAFE_ZONE_TILES: u32 = 7;

// ---------------------------------------------------------------------------
// Tank
// ---------------------------------------------------------------------------

pub const TANK_WIDTH: f32 = 46.0;
pub const TANK_HEIGHT: f32 = 46.0;
pub const TANK_BASE_SPEED: f32 = 2.5;
/// Collision hitbox is shrunk by this much on each side so tanks fit through one-tile gaps
pub const TANK_HITBOX_PADDING: f32 = 8.0;

pub const PLAYER_MAX_HEALTH: f32 = 100.0;
pub const PLAYER_BASE_DAMAGE: f32 = 10.0;
pub const PLAYER_BASE_SHIELD: f32 = 0.0;
pub const PLAYER_SHOOT_COOLDOWN_MS: u64 = 200;
pub const SPAWN_PROTECTION_TICKS: u32 = 180;

pub const P1_SPAWN: (f32, f32) = (175.0, 175.0);
/// P2 spawns this far from the bottom-right corner
pub const P2_SPAWN_OFFSET: (f32, f32) = (225.0, 225.0);

pub const MAX_PLAYERS_PER_ROOM: usize = 2;

// ---------------------------------------------------------------------------
// Bullets
// ---------------------------------------------------------------------------

pub const BULLET_WIDTH: f32 = 10.0;
pub const BULLET_HEIGHT: f32 = 10.0;
pub const BULLET_SPEED: f32 = 12.5;
/// Distance from tank centre to muzzle
pub const BULLET_BARREL_LENGTH: f32 = 35.0;
pub const MAX_BULLETS_PER_ROOM: usize = 30;

pub const CLUSTER_FRAGMENT_COUNT: u32 = 6;
pub const CLUSTER_FRAGMENT_DAMAGE: f32 = 10.0;
pub const CLUSTER_FRAGMENT_SPEED_FACTOR: f32 = 0.7;
pub const CLUSTER_FRAGMENT_SIZE_FACTOR: f32 = 0.7;
pub const CLUSTER_FRAGMENT_LIFESPAN: u32 = 30;

pub const BURN_DAMAGE_PER_TICK: f32 = 0.25;
pub const BURN_DURATION_TICKS: u32 = 180;

// ---------------------------------------------------------------------------
// Items and buffs
// ---------------------------------------------------------------------------

pub const ITEM_SIZE: f32 = 30.0;
pub const ITEM_SPAWN_INTERVAL_TICKS: u32 = 120;
pub const ITEM_SPAWNS_PER_PASS: u32 = 3;
pub const ITEM_PLACEMENT_ATTEMPTS: u32 = 20;
/// Target count per item type, indexed like `ItemKind::ALL`
pub const ITEM_TARGETS: [u32; 6] = [4, 4, 4, 3, 3, 2];

pub const HEAL_AMOUNT: f32 = 30.0;
pub const SPEED_BOOST: f32 = 1.5;
pub const SHIELD_VALUE: f32 = 10.0;

pub const SPEED_BUFF_TICKS: u32 = 600;
pub const SHIELD_BUFF_TICKS: u32 = 900;
pub const FIRE_AMMO_TICKS: u32 = 720;
pub const CLUSTER_AMMO_TICKS: u32 = 720;
pub const STEALTH_TICKS: u32 = 600;

// ---------------------------------------------------------------------------
// Turrets
// ---------------------------------------------------------------------------

pub const TURRETS_PER_QUADRANT: u32 = 2;
pub const TURRET_SIZE: f32 = 40.0;
pub const TURRET_MAX_HEALTH: f32 = 100.0;
pub const TURRET_DAMAGE: f32 = 8.0;
pub const TURRET_RANGE: f32 = 350.0;
pub const TURRET_SHOOT_COOLDOWN_MS: u64 = 1200;
pub const TURRET_PLACEMENT_ATTEMPTS: u32 = 50;
/// Extra clearance around spawn safe zones when placing turrets
pub const TURRET_SAFE_MARGIN: f32 = 50.0;

// ---------------------------------------------------------------------------
// Network and presentation
// ---------------------------------------------------------------------------

/// Half-extent of the interest window around a player
pub const VIEW_PADDING_X: f32 = 800.0;
pub const VIEW_PADDING_Y: f32 = 600.0;

pub const INPUT_THROTTLE_MS: u64 = 33;
pub const LERP_FACTOR: f32 = 0.5;
/// Positional error beyond which the rendered tank snaps instead of lerping
pub const SNAP_THRESHOLD: f32 = 50.0;
/// Residual error below which interpolation settles exactly on the target
pub const SETTLE_EPSILON: f32 = 0.5;

pub const BULLET_SNAP_DISTANCE: f32 = 60.0;
pub const BULLET_CORRECTION_DISTANCE: f32 = 5.0;
pub const BULLET_CORRECTION_FACTOR: f32 = 0.85;
