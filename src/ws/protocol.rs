//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::entities::{BuffTimers, BulletType, ItemKind, KeyState, Owner, Slot};
use crate::util::geometry::Rect;

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Open a new room under a client-chosen code
    CreateRoom { room_id: String },

    /// Join an existing room
    JoinRoom { room_id: String },

    /// Host asks to begin a round
    StartGame,

    /// Leave the current room
    LeaveRoom,

    /// Latest held keys
    Input {
        /// Strictly increasing per client; echoed back for reconciliation
        seq: u32,
        #[serde(default)]
        up: bool,
        #[serde(default)]
        down: bool,
        #[serde(default)]
        left: bool,
        #[serde(default)]
        right: bool,
        #[serde(default)]
        shoot: bool,
        /// Held movement keys, oldest first
        #[serde(default)]
        priority: Vec<String>,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

impl ClientMsg {
    /// Build an input message from local key state
    pub fn input(seq: u32, keys: &KeyState) -> Self {
        ClientMsg::Input {
            seq,
            up: keys.up,
            down: keys.down,
            left: keys.left,
            right: keys.right,
            shoot: keys.shoot,
            priority: keys.priority_names(),
        }
    }

    /// Shoot flag carried by input messages
    pub fn shoot_flag(&self) -> Option<bool> {
        match self {
            ClientMsg::Input { shoot, .. } => Some(*shoot),
            _ => None,
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome { player_id: Uuid, server_time: u64 },

    RoomCreated {
        room_id: String,
        player_id: Uuid,
        slot: Slot,
    },

    JoinedRoom {
        room_id: String,
        player_id: Uuid,
        slot: Slot,
        player_count: usize,
    },

    /// Roster grew
    PlayerJoined { player_id: Uuid, player_count: usize },

    /// Roster shrank
    PlayerLeft { player_id: Uuid, player_count: usize },

    RoomNotFound { room_id: String },

    RoomFull { room_id: String },

    HostChanged { host_id: Uuid },

    /// Host left; the room is gone and everyone returns to the lobby
    HostLeft,

    /// Round began; carries the static geometry the client collides against
    GameStarted { map: MapView },

    GameOver { winner: Option<Uuid> },

    /// Per-player trimmed state (sent at regular intervals)
    Snapshot(SnapshotView),

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
        server_time: u64,
    },
}

/// Full static map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    pub width: f32,
    pub height: f32,
    pub tile_size: f32,
    pub walls: Vec<Rect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapSize {
    pub width: f32,
    pub height: f32,
}

/// Tank state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: Uuid,
    pub slot: Slot,
    /// Top-left corner
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Facing direction
    pub last_dx: f32,
    pub last_dy: f32,
    pub speed: f32,
    pub health: f32,
    pub max_health: f32,
    pub shield: f32,
    pub bullet_type: BulletType,
    pub buffs: BuffTimers,
    pub spawn_protection: u32,
    pub is_invisible: bool,
    pub burning: bool,
    /// Last input sequence folded into this state
    pub last_processed_input_seq: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulletView {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    pub dy: f32,
    pub speed: f32,
    pub kind: BulletType,
    pub width: f32,
    pub height: f32,
    pub owner: Owner,
    pub is_fragment: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemView {
    pub x: f32,
    pub y: f32,
    pub kind: ItemKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurretView {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub health: f32,
    pub max_health: f32,
}

/// Everything one player needs to render a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotView {
    /// Server tick number
    pub tick: u64,
    /// Both tanks, always
    pub players: Vec<PlayerView>,
    /// Only those inside the viewer's window
    pub bullets: Vec<BulletView>,
    pub items: Vec<ItemView>,
    /// Unfiltered, for the minimap
    pub turrets: Vec<TurretView>,
    pub map: MapSize,
    pub is_game_over: bool,
    pub winner: Option<Uuid>,
}
