//! Authoritative entity records: tanks, bullets, items, turrets

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::geometry::Rect;

use super::constants::*;

/// Connection-scoped player identifier
pub type PlayerId = Uuid;
/// Room code chosen by the creating client
pub type RoomId = String;
pub type TurretId = u32;
pub type BulletId = u64;

/// Seat in a two-player room; decides the spawn corner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    P1,
    P2,
}

/// Movement keys tracked in the priority stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveKey {
    Up,
    Down,
    Left,
    Right,
}

impl MoveKey {
    pub const ALL: [MoveKey; 4] = [MoveKey::Up, MoveKey::Down, MoveKey::Left, MoveKey::Right];

    pub fn as_str(self) -> &'static str {
        match self {
            MoveKey::Up => "up",
            MoveKey::Down => "down",
            MoveKey::Left => "left",
            MoveKey::Right => "right",
        }
    }

    /// Parse a wire key name; unknown names yield `None`
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "up" => Some(MoveKey::Up),
            "down" => Some(MoveKey::Down),
            "left" => Some(MoveKey::Left),
            "right" => Some(MoveKey::Right),
            _ => None,
        }
    }
}

/// Raw pressed-key state plus the ordered movement priority stack
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub shoot: bool,
    /// Held movement keys, oldest first
    pub priority: Vec<MoveKey>,
}

impl KeyState {
    pub fn is_held(&self, key: MoveKey) -> bool {
        match key {
            MoveKey::Up => self.up,
            MoveKey::Down => self.down,
            MoveKey::Left => self.left,
            MoveKey::Right => self.right,
        }
    }

    fn set_held(&mut self, key: MoveKey, held: bool) {
        match key {
            MoveKey::Up => self.up = held,
            MoveKey::Down => self.down = held,
            MoveKey::Left => self.left = held,
            MoveKey::Right => self.right = held,
        }
    }

    /// Press a movement key: it moves to the top of the priority stack
    pub fn press(&mut self, key: MoveKey) {
        self.set_held(key, true);
        self.priority.retain(|k| *k != key);
        self.priority.push(key);
    }

    pub fn release(&mut self, key: MoveKey) {
        self.set_held(key, false);
        self.priority.retain(|k| *k != key);
    }

    pub fn any_movement_held(&self) -> bool {
        self.up || self.down || self.left || self.right
    }

    /// Build key state from untrusted wire data.
    ///
    /// Unknown key names are dropped and a repeated key keeps only its most
    /// recent position, so the stack never exceeds four entries.
    pub fn from_wire(
        priority: &[String],
        up: bool,
        down: bool,
        left: bool,
        right: bool,
        shoot: bool,
    ) -> Self {
        let mut stack: Vec<MoveKey> = Vec::with_capacity(MoveKey::ALL.len());
        for key in priority.iter().filter_map(|name| MoveKey::from_name(name)) {
            stack.retain(|k| *k != key);
            stack.push(key);
        }
        Self {
            up,
            down,
            left,
            right,
            shoot,
            priority: stack,
        }
    }

    pub fn priority_names(&self) -> Vec<String> {
        self.priority.iter().map(|k| k.as_str().to_string()).collect()
    }
}

/// Projectile behaviour; wire value is the numeric code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum BulletType {
    Normal = 1,
    /// Passes through walls
    Piercing = 2,
    /// Retained for wire compatibility; behaves like `Normal`
    Legacy = 3,
    /// Sets the target on fire
    Fire = 4,
    /// Bursts into fragments on impact
    Cluster = 5,
}

impl From<BulletType> for u8 {
    fn from(kind: BulletType) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for BulletType {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(BulletType::Normal),
            2 => Ok(BulletType::Piercing),
            3 => Ok(BulletType::Legacy),
            4 => Ok(BulletType::Fire),
            5 => Ok(BulletType::Cluster),
            other => Err(format!("unknown bullet type {}", other)),
        }
    }
}

/// Pickup kinds; wire value is the numeric code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ItemKind {
    Heal = 1,
    Speed = 2,
    Shield = 3,
    FireAmmo = 4,
    ClusterAmmo = 5,
    Stealth = 6,
}

impl ItemKind {
    pub const ALL: [ItemKind; 6] = [
        ItemKind::Heal,
        ItemKind::Speed,
        ItemKind::Shield,
        ItemKind::FireAmmo,
        ItemKind::ClusterAmmo,
        ItemKind::Stealth,
    ];

    pub fn index(self) -> usize {
        self as usize - 1
    }
}

impl From<ItemKind> for u8 {
    fn from(kind: ItemKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for ItemKind {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        ItemKind::ALL
            .iter()
            .copied()
            .find(|k| *k as u8 == code)
            .ok_or_else(|| format!("unknown item type {}", code))
    }
}

/// Who fired a bullet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Owner {
    Player(PlayerId),
    Turret(TurretId),
}

impl Owner {
    pub fn is_turret(&self) -> bool {
        matches!(self, Owner::Turret(_))
    }
}

/// Remaining ticks per timed buff; zero means inactive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuffTimers {
    pub speed: u32,
    pub shield: u32,
    pub fire_ammo: u32,
    pub cluster_ammo: u32,
    pub stealth: u32,
}

/// Damage over time attached by fire bullets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurnEffect {
    pub damage_per_tick: f32,
    pub ticks_remaining: u32,
}

impl Default for BurnEffect {
    fn default() -> Self {
        Self {
            damage_per_tick: BURN_DAMAGE_PER_TICK,
            ticks_remaining: BURN_DURATION_TICKS,
        }
    }
}

/// Authoritative tank state
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub slot: Slot,

    // Position (top-left corner) and facing
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub last_dx: f32,
    pub last_dy: f32,

    // Current stats
    pub speed: f32,
    pub health: f32,
    pub max_health: f32,
    pub shield: f32,
    pub damage: f32,
    pub bullet_type: BulletType,

    // Values buffs revert to
    pub default_speed: f32,
    pub default_shield: f32,
    pub default_damage: f32,
    pub default_bullet_type: BulletType,

    // Weapon
    pub can_shoot: bool,
    pub last_shoot_ms: u64,
    pub shoot_cooldown_ms: u64,

    // Status
    pub buffs: BuffTimers,
    pub spawn_protection: u32,
    pub is_invisible: bool,
    pub burn: Option<BurnEffect>,

    // Input
    pub keys: KeyState,
    pub last_processed_input_seq: u32,
}

impl Player {
    pub fn new(id: PlayerId, slot: Slot, x: f32, y: f32) -> Self {
        Self {
            id,
            slot,
            x,
            y,
            width: TANK_WIDTH,
            height: TANK_HEIGHT,
            last_dx: 0.0,
            last_dy: -1.0,
            speed: TANK_BASE_SPEED,
            health: PLAYER_MAX_HEALTH,
            max_health: PLAYER_MAX_HEALTH,
            shield: PLAYER_BASE_SHIELD,
            damage: PLAYER_BASE_DAMAGE,
            bullet_type: BulletType::Normal,
            default_speed: TANK_BASE_SPEED,
            default_shield: PLAYER_BASE_SHIELD,
            default_damage: PLAYER_BASE_DAMAGE,
            default_bullet_type: BulletType::Normal,
            can_shoot: true,
            last_shoot_ms: 0,
            shoot_cooldown_ms: PLAYER_SHOOT_COOLDOWN_MS,
            buffs: BuffTimers::default(),
            spawn_protection: 0,
            is_invisible: false,
            burn: None,
            keys: KeyState::default(),
            last_processed_input_seq: 0,
        }
    }

    /// Full body rectangle (bullets, items)
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn center(&self) -> (f32, f32) {
        self.rect().center()
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    /// Spawn protection or stealth suppresses all incoming damage
    pub fn is_damage_immune(&self) -> bool {
        self.spawn_protection > 0 || self.is_invisible
    }

    /// Subtract damage, keeping health within [0, max]
    pub fn take_damage(&mut self, amount: f32) {
        if !amount.is_finite() || amount <= 0.0 {
            return;
        }
        self.health = (self.health - amount).clamp(0.0, self.max_health);
    }

    pub fn heal(&mut self, amount: f32) {
        self.health = (self.health + amount).min(self.max_health);
    }

    /// Body rotation used for the muzzle: facing angle plus a quarter turn
    pub fn facing_angle(&self) -> f32 {
        self.last_dy.atan2(self.last_dx) + std::f32::consts::FRAC_PI_2
    }

    pub fn cancel_stealth(&mut self) {
        self.is_invisible = false;
        self.buffs.stealth = 0;
    }

    /// Put the tank back at a spawn point with default stats for a new round
    pub fn reset_for_round(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
        self.health = self.max_health;
        self.shield = self.default_shield;
        self.damage = self.default_damage;
        self.bullet_type = self.default_bullet_type;
        self.speed = self.default_speed;
        self.is_invisible = false;
        self.burn = None;
        self.buffs = BuffTimers::default();
        self.spawn_protection = SPAWN_PROTECTION_TICKS;
        self.keys = KeyState::default();
        self.can_shoot = true;
        self.last_shoot_ms = 0;
        self.last_dx = 0.0;
        self.last_dy = -1.0;
    }
}

/// Live projectile
#[derive(Debug, Clone)]
pub struct Bullet {
    pub id: BulletId,
    pub x: f32,
    pub y: f32,
    /// Unit direction
    pub dx: f32,
    pub dy: f32,
    pub speed: f32,
    pub owner: Owner,
    pub damage: f32,
    pub kind: BulletType,
    pub width: f32,
    pub height: f32,
    /// Ticks left for cluster fragments; `None` for regular bullets
    pub lifespan: Option<u32>,
    /// Set once the bullet hit its terminal event this tick
    pub spent: bool,
}

/// Who fired a bullet and what it carries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shot {
    pub owner: Owner,
    pub damage: f32,
    pub kind: BulletType,
}

impl Bullet {
    /// Regular full-size bullet leaving `(x, y)` along `(dx, dy)`, normalised
    /// here. Returns `None` when the direction has no usable length.
    pub fn fire(
        id: BulletId,
        (x, y): (f32, f32),
        (dx, dy): (f32, f32),
        shot: Shot,
    ) -> Option<Self> {
        let Shot {
            owner,
            damage,
            kind,
        } = shot;
        let len = (dx * dx + dy * dy).sqrt();
        if !len.is_finite() || len <= f32::EPSILON {
            return None;
        }
        Some(Self {
            id,
            x,
            y,
            dx: dx / len,
            dy: dy / len,
            speed: BULLET_SPEED,
            owner,
            damage,
            kind,
            width: BULLET_WIDTH,
            height: BULLET_HEIGHT,
            lifespan: None,
            spent: false,
        })
    }

    /// Short-lived cluster shard heading along `angle`
    pub fn fragment(id: BulletId, x: f32, y: f32, angle: f32, owner: Owner) -> Self {
        Self {
            id,
            x,
            y,
            dx: angle.cos(),
            dy: angle.sin(),
            speed: BULLET_SPEED * CLUSTER_FRAGMENT_SPEED_FACTOR,
            owner,
            damage: CLUSTER_FRAGMENT_DAMAGE,
            kind: BulletType::Normal,
            width: BULLET_WIDTH * CLUSTER_FRAGMENT_SIZE_FACTOR,
            height: BULLET_HEIGHT * CLUSTER_FRAGMENT_SIZE_FACTOR,
            lifespan: Some(CLUSTER_FRAGMENT_LIFESPAN),
            spent: false,
        }
    }

    pub fn is_fragment(&self) -> bool {
        self.lifespan.is_some()
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// Pickup lying on the map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Item {
    pub x: f32,
    pub y: f32,
    pub kind: ItemKind,
}

impl Item {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, ITEM_SIZE, ITEM_SIZE)
    }
}

/// Static AI gun emplacement
#[derive(Debug, Clone)]
pub struct Turret {
    pub id: TurretId,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub health: f32,
    pub max_health: f32,
    pub damage: f32,
    pub range: f32,
    pub shoot_cooldown_ms: u64,
    pub last_shoot_ms: u64,
}

impl Turret {
    pub fn new(id: TurretId, x: f32, y: f32) -> Self {
        Self {
            id,
            x,
            y,
            size: TURRET_SIZE,
            health: TURRET_MAX_HEALTH,
            max_health: TURRET_MAX_HEALTH,
            damage: TURRET_DAMAGE,
            range: TURRET_RANGE,
            shoot_cooldown_ms: TURRET_SHOOT_COOLDOWN_MS,
            last_shoot_ms: 0,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.size, self.size)
    }

    pub fn center(&self) -> (f32, f32) {
        self.rect().center()
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    pub fn take_damage(&mut self, amount: f32) {
        self.health = (self.health - amount.max(0.0)).max(0.0);
    }
}
