//! Local tank prediction.
//!
//! The predictor applies the player's own input immediately, using the same
//! intent resolution and move/collide step as the server tick, and remembers
//! every predicted move until a snapshot acknowledges it.

use std::collections::VecDeque;

use tracing::debug;

use crate::game::constants::{INPUT_THROTTLE_MS, TANK_BASE_SPEED};
use crate::game::entities::{KeyState, MoveKey};
use crate::game::map::ArenaMap;
use crate::game::movement::{self, Intent};
use crate::ws::protocol::ClientMsg;

/// Predicted moves kept while waiting for acknowledgement (4 s at 60 fps)
pub const MAX_PENDING_INPUTS: usize = 240;

/// A key the local player can press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKey {
    Move(MoveKey),
    Shoot,
}

/// One predicted move awaiting server acknowledgement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingInput {
    /// Sequence of the input message that was in effect for this move
    pub seq: u32,
    pub intent: Intent,
    pub speed: f32,
}

/// Predicted state of the locally controlled tank
#[derive(Debug, Clone)]
pub struct ClientPredictor {
    map: ArenaMap,
    keys: KeyState,
    x: f32,
    y: f32,
    facing: Intent,
    speed: f32,
    pending: VecDeque<PendingInput>,
    /// Last sequence number put on the wire
    seq: u32,
    last_sent_priority: Vec<MoveKey>,
    last_send_ms: Option<u64>,
    /// Unacknowledged moves dropped because the queue was full
    evicted: u64,
}

impl ClientPredictor {
    /// `last_seq` is the highest sequence already used on this connection;
    /// the next outbound input carries `last_seq + 1`.
    pub fn new(map: ArenaMap, x: f32, y: f32, last_seq: u32) -> Self {
        Self {
            map,
            keys: KeyState::default(),
            x,
            y,
            facing: Intent { dx: 0.0, dy: -1.0 },
            speed: TANK_BASE_SPEED,
            pending: VecDeque::new(),
            seq: last_seq,
            last_sent_priority: Vec::new(),
            last_send_ms: None,
            evicted: 0,
        }
    }

    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    pub fn facing(&self) -> Intent {
        self.facing
    }

    pub fn keys(&self) -> &KeyState {
        &self.keys
    }

    pub fn last_seq(&self) -> u32 {
        self.seq
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingInput> {
        self.pending.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Moves dropped unacknowledged; each one surfaces as correction error
    /// on the next snapshot
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn map(&self) -> &ArenaMap {
        &self.map
    }

    /// Adopt the server's speed so buffs predict correctly
    pub fn set_speed(&mut self, speed: f32) {
        if speed.is_finite() && speed > 0.0 {
            self.speed = speed;
        }
    }

    pub fn key_down(&mut self, key: ControlKey, now_ms: u64) -> Option<ClientMsg> {
        let shoot_edge = match key {
            ControlKey::Move(k) if self.keys.is_held(k) => return None,
            ControlKey::Move(k) => {
                self.keys.press(k);
                false
            }
            ControlKey::Shoot if self.keys.shoot => return None,
            ControlKey::Shoot => {
                self.keys.shoot = true;
                true
            }
        };
        self.on_keys_changed(shoot_edge, now_ms)
    }

    pub fn key_up(&mut self, key: ControlKey, now_ms: u64) -> Option<ClientMsg> {
        let shoot_edge = match key {
            ControlKey::Move(k) if !self.keys.is_held(k) => return None,
            ControlKey::Move(k) => {
                self.keys.release(k);
                false
            }
            ControlKey::Shoot if !self.keys.shoot => return None,
            ControlKey::Shoot => {
                self.keys.shoot = false;
                true
            }
        };
        self.on_keys_changed(shoot_edge, now_ms)
    }

    /// Release everything, e.g. when the window loses focus
    pub fn release_all(&mut self, now_ms: u64) -> Option<ClientMsg> {
        if self.keys == KeyState::default() {
            return None;
        }
        let shoot_edge = self.keys.shoot;
        self.keys = KeyState::default();
        self.on_keys_changed(shoot_edge, now_ms)
    }

    fn on_keys_changed(&mut self, shoot_edge: bool, now_ms: u64) -> Option<ClientMsg> {
        let intent = movement::resolve_intent(&self.keys);
        if !intent.is_idle() {
            self.facing = intent;
        }

        let priority_changed = self.keys.priority != self.last_sent_priority;
        if shoot_edge || priority_changed || self.throttle_elapsed(now_ms) {
            Some(self.send(now_ms))
        } else {
            None
        }
    }

    fn throttle_elapsed(&self, now_ms: u64) -> bool {
        self.last_send_ms
            .map_or(true, |last| now_ms.saturating_sub(last) >= INPUT_THROTTLE_MS)
    }

    fn send(&mut self, now_ms: u64) -> ClientMsg {
        self.seq = self.seq.wrapping_add(1);
        self.last_send_ms = Some(now_ms);
        self.last_sent_priority = self.keys.priority.clone();
        ClientMsg::input(self.seq, &self.keys)
    }

    /// Advance one rendered frame.
    ///
    /// While a movement key is held the current input is refreshed at the
    /// throttle rate under a new sequence number, then one predicted step is
    /// applied and queued under the sequence now in effect.
    pub fn frame(&mut self, now_ms: u64) -> Option<ClientMsg> {
        if !self.keys.any_movement_held() {
            return None;
        }

        let refresh = self.throttle_elapsed(now_ms).then(|| self.send(now_ms));

        let intent = movement::resolve_intent(&self.keys);
        if !intent.is_idle() {
            let (x, y) = movement::step(self.x, self.y, intent, self.speed, &self.map);
            self.x = x;
            self.y = y;
            self.facing = intent;
            self.push_pending(PendingInput {
                seq: self.seq,
                intent,
                speed: self.speed,
            });
        }

        refresh
    }

    fn push_pending(&mut self, input: PendingInput) {
        if self.pending.len() == MAX_PENDING_INPUTS {
            if let Some(oldest) = self.pending.pop_front() {
                self.evicted += 1;
                debug!(
                    seq = oldest.seq,
                    evicted = self.evicted,
                    "Pending input queue full, dropping oldest unacknowledged move"
                );
            }
        }
        self.pending.push_back(input);
    }

    /// Forget moves the server has folded in; returns how many were dropped
    pub fn discard_acknowledged(&mut self, ack: u32) -> usize {
        let before = self.pending.len();
        self.pending.retain(|p| p.seq > ack);
        before - self.pending.len()
    }

    /// Re-run every pending move from `(x, y)` without touching state
    pub fn replay_from(&self, x: f32, y: f32) -> (f32, f32) {
        self.pending
            .iter()
            .fold((x, y), |(x, y), p| movement::step(x, y, p.intent, p.speed, &self.map))
    }

    pub fn set_position(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
    }
}
