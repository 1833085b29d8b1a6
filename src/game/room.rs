//! Room aggregate and the authoritative tick

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use super::combat::{BulletSeq, CombatEvent, CombatSystem};
use super::constants::{MAX_BULLETS_PER_ROOM, MAX_PLAYERS_PER_ROOM};
use super::entities::{Bullet, Item, KeyState, Player, PlayerId, RoomId, Slot, Turret};
use super::items::ItemSpawner;
use super::map::ArenaMap;
use super::movement::{resolve_intent, step};

/// Lifecycle failures surfaced to the requesting client
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("room {0} not found")]
    NotFound(RoomId),
    #[error("room {0} already exists")]
    AlreadyExists(RoomId),
    #[error("room {0} is full")]
    Full(RoomId),
    #[error("already in room {0}")]
    AlreadyJoined(RoomId),
    #[error("not in a room")]
    NotInRoom,
    #[error("only the host can start the game")]
    NotHost,
    #[error("need {needed} players to start, have {have}")]
    NotEnoughPlayers { needed: usize, have: usize },
    #[error("room limit of {0} reached")]
    LimitReached(usize),
    #[error("invalid room id")]
    InvalidId,
}

impl RoomError {
    /// Stable machine-readable code for the wire
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::NotFound(_) => "room_not_found",
            RoomError::AlreadyExists(_) => "room_exists",
            RoomError::Full(_) => "room_full",
            RoomError::AlreadyJoined(_) => "already_joined",
            RoomError::NotInRoom => "not_in_room",
            RoomError::NotHost => "not_host",
            RoomError::NotEnoughPlayers { .. } => "not_enough_players",
            RoomError::LimitReached(_) => "room_limit",
            RoomError::InvalidId => "invalid_room_id",
        }
    }
}

/// Faults detected while stepping a room
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TickError {
    #[error("player {player} reached a non-finite position and was respawned")]
    NonFinitePosition { player: PlayerId },
}

/// What a tick produced
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub events: Vec<CombatEvent>,
    /// Set on the tick the match ended
    pub finished: Option<PlayerId>,
}

/// Result of a player leaving
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Nobody left; tear the room down
    Empty,
    /// The host walked out; everyone is sent back and the room torn down
    HostLeft { remaining: Vec<PlayerId> },
    /// Left mid-match; the remaining player is declared winner
    Forfeit { winner: PlayerId },
    /// Left a room that was not in a running match
    Left { remaining: Vec<PlayerId> },
}

impl LeaveOutcome {
    pub fn destroys_room(&self) -> bool {
        matches!(self, LeaveOutcome::Empty | LeaveOutcome::HostLeft { .. })
    }
}

/// A two-player arena.
///
/// Mutated by the simulation tick and by lobby events, read by the broadcast
/// pass; callers serialise access through the per-room lock.
pub struct Room {
    pub id: RoomId,
    pub host_id: PlayerId,
    pub map: ArenaMap,
    /// Join order; win checks walk this order
    pub players: Vec<Player>,
    pub bullets: Vec<Bullet>,
    pub items: Vec<Item>,
    pub turrets: Vec<Turret>,
    pub is_playing: bool,
    pub is_game_over: bool,
    pub winner: Option<PlayerId>,
    pub tick: u64,
    /// Set once the room is torn down; nobody may be seated afterwards
    closed: bool,
    bullet_seq: BulletSeq,
    item_spawner: ItemSpawner,
    rng: ChaCha8Rng,
}

impl Room {
    /// New lobby-state room with the host seated as P1
    pub fn new(id: RoomId, host_id: PlayerId, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let map = ArenaMap::generate(&mut rng);
        let turrets = map.generate_turrets(&mut rng);
        let (x, y) = map.spawn_point(Slot::P1);

        Self {
            id,
            host_id,
            players: vec![Player::new(host_id, Slot::P1, x, y)],
            map,
            bullets: Vec::new(),
            items: Vec::new(),
            turrets,
            is_playing: false,
            is_game_over: false,
            winner: None,
            tick: 0,
            closed: false,
            bullet_seq: BulletSeq::default(),
            item_spawner: ItemSpawner::default(),
            rng,
        }
    }

    /// True while the simulation should step this room
    pub fn is_running(&self) -> bool {
        self.is_playing && !self.is_game_over
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS_PER_ROOM
    }

    /// Seat a new player in the first free slot
    pub fn add_player(&mut self, id: PlayerId) -> Result<Slot, RoomError> {
        if self.closed {
            return Err(RoomError::NotFound(self.id.clone()));
        }
        if self.player(id).is_some() {
            return Err(RoomError::AlreadyJoined(self.id.clone()));
        }
        if self.is_full() {
            return Err(RoomError::Full(self.id.clone()));
        }

        let slot = if self.players.iter().any(|p| p.slot == Slot::P1) {
            Slot::P2
        } else {
            Slot::P1
        };
        let (x, y) = self.map.spawn_point(slot);
        self.players.push(Player::new(id, slot, x, y));
        Ok(slot)
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Option<LeaveOutcome> {
        let index = self.players.iter().position(|p| p.id == id)?;
        self.players.remove(index);

        let remaining = self.player_ids();
        let outcome = if remaining.is_empty() {
            LeaveOutcome::Empty
        } else if id == self.host_id {
            LeaveOutcome::HostLeft { remaining }
        } else if self.is_running() {
            self.is_game_over = true;
            self.winner = Some(remaining[0]);
            LeaveOutcome::Forfeit { winner: remaining[0] }
        } else {
            LeaveOutcome::Left { remaining }
        };
        if outcome.destroys_room() {
            self.closed = true;
        }

        Some(outcome)
    }

    /// Hand the host role to the first seated player if the host is gone.
    /// Returns the new host when it changed.
    pub fn ensure_host(&mut self) -> Option<PlayerId> {
        if self.player(self.host_id).is_some() {
            return None;
        }
        let first = self.players.first()?.id;
        self.host_id = first;
        Some(first)
    }

    /// Begin a round: fresh map and turrets, every tank reset at its spawn
    pub fn start(&mut self, requester: PlayerId) -> Result<(), RoomError> {
        if requester != self.host_id {
            return Err(RoomError::NotHost);
        }
        if self.players.len() < MAX_PLAYERS_PER_ROOM {
            return Err(RoomError::NotEnoughPlayers {
                needed: MAX_PLAYERS_PER_ROOM,
                have: self.players.len(),
            });
        }

        self.map = ArenaMap::generate(&mut self.rng);
        self.turrets = self.map.generate_turrets(&mut self.rng);
        for player in self.players.iter_mut() {
            let (x, y) = self.map.spawn_point(player.slot);
            player.reset_for_round(x, y);
        }

        self.bullets.clear();
        self.items.clear();
        self.bullet_seq = BulletSeq::default();
        self.item_spawner.reset();
        self.is_game_over = false;
        self.winner = None;
        self.is_playing = true;
        self.tick = 0;

        info!(
            room_id = %self.id,
            walls = self.map.walls.len(),
            chunks = self.map.walls.chunk_count(),
            turrets = self.turrets.len(),
            "Round started"
        );
        Ok(())
    }

    /// Store the latest key state for a player; consumed on the next tick.
    /// Out-of-order or replayed sequence numbers are dropped.
    pub fn apply_input(&mut self, id: PlayerId, seq: u32, keys: KeyState) -> bool {
        let Some(player) = self.player_mut(id) else {
            return false;
        };
        if seq <= player.last_processed_input_seq {
            debug!(
                player_id = %id,
                seq,
                last = player.last_processed_input_seq,
                "Stale input dropped"
            );
            return false;
        }

        player.last_processed_input_seq = seq;
        if !keys.shoot {
            player.can_shoot = true;
        }
        player.keys = keys;
        true
    }

    /// One authoritative simulation step
    pub fn tick(&mut self, now_ms: u64) -> Result<TickOutcome, TickError> {
        if !self.is_running() {
            return Ok(TickOutcome::default());
        }
        self.tick += 1;
        let mut events = Vec::new();

        // Movement, then that tank's trigger
        for player in self.players.iter_mut() {
            let intent = resolve_intent(&player.keys);
            if !intent.is_idle() {
                player.last_dx = intent.dx;
                player.last_dy = intent.dy;
            }
            (player.x, player.y) = step(player.x, player.y, intent, player.speed, &self.map);

            let fired = CombatSystem::try_player_fire(player, now_ms, &mut self.bullet_seq);
            if let Some(bullet) = fired {
                events.push(CombatEvent::Shot {
                    owner: bullet.owner,
                    bullet_id: bullet.id,
                });
                self.bullets.push(bullet);
            }
        }

        let fired = CombatSystem::update_turrets(
            &mut self.turrets,
            &self.players,
            now_ms,
            &mut self.bullet_seq,
            &mut events,
        );
        self.bullets.extend(fired);

        CombatSystem::advance_bullets(&mut self.bullets, &self.map.bounds());
        let fragments = CombatSystem::resolve_bullets(
            &mut self.bullets,
            &mut self.players,
            &mut self.turrets,
            &self.map.walls,
            &mut self.bullet_seq,
            &mut events,
        );

        CombatSystem::collect_items(&mut self.players, &mut self.items, &mut events);
        for player in self.players.iter_mut() {
            CombatSystem::decay_status(player);
        }

        self.bullets.retain(|b| !b.spent);
        self.bullets.extend(fragments);
        if self.bullets.len() > MAX_BULLETS_PER_ROOM {
            let excess = self.bullets.len() - MAX_BULLETS_PER_ROOM;
            self.bullets.drain(..excess);
        }

        let mut finished = None;
        if let Some(winner) = CombatSystem::check_winner(&self.players) {
            self.is_game_over = true;
            self.winner = Some(winner);
            finished = Some(winner);
        }

        self.item_spawner.tick(&mut self.items, &self.map, &mut self.rng);

        self.validate()?;
        Ok(TickOutcome { events, finished })
    }

    /// Respawn any tank whose position stopped being finite
    fn validate(&mut self) -> Result<(), TickError> {
        let mut fault = None;
        for player in self.players.iter_mut() {
            if player.x.is_finite() && player.y.is_finite() {
                continue;
            }
            let (x, y) = self.map.spawn_point(player.slot);
            warn!(room_id = %self.id, player_id = %player.id, "Non-finite position, respawning");
            player.x = x;
            player.y = y;
            fault.get_or_insert(TickError::NonFinitePosition { player: player.id });
        }
        fault.map_or(Ok(()), Err)
    }
}
