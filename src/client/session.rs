//! Client-side session state shared between the frame and network callbacks

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::game::entities::{PlayerId, Slot};
use crate::game::map::ArenaMap;
use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::predictor::{ClientPredictor, ControlKey};
use super::reconcile::{Correction, Reconciliator};

/// Prediction state for one round
struct Round {
    predictor: ClientPredictor,
    reconciliator: Reconciliator,
}

#[derive(Default)]
struct SessionState {
    player_id: Option<PlayerId>,
    slot: Option<Slot>,
    /// Highest input sequence used so far on this connection
    last_seq: u32,
    round: Option<Round>,
    winner: Option<Option<PlayerId>>,
}

/// Cloneable handle to the local player's prediction state.
///
/// Key and frame callbacks run the predictor; the network callback runs the
/// reconciliator. Both mutate the same pending-input queue, so every call
/// takes the session lock for its whole update.
#[derive(Clone, Default)]
pub struct ClientSession {
    inner: Arc<Mutex<SessionState>>,
}

impl ClientSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Network callback
    pub fn on_server_msg(&self, msg: &ServerMsg) -> Option<Correction> {
        let mut state = self.inner.lock();
        match msg {
            ServerMsg::Welcome { player_id, .. } => {
                state.player_id = Some(*player_id);
            }
            ServerMsg::RoomCreated { slot, .. } | ServerMsg::JoinedRoom { slot, .. } => {
                state.slot = Some(*slot);
            }
            ServerMsg::GameStarted { map } => {
                let (Some(player_id), Some(slot)) = (state.player_id, state.slot) else {
                    debug!("Game started before seat was known");
                    return None;
                };
                if let Some(old) = state.round.take() {
                    state.last_seq = old.predictor.last_seq();
                }
                let arena = ArenaMap::from_walls(map.width, map.height, map.walls.clone());
                let (x, y) = arena.spawn_point(slot);
                info!(player_id = %player_id, ?slot, walls = map.walls.len(), "Round started");
                state.round = Some(Round {
                    predictor: ClientPredictor::new(arena, x, y, state.last_seq),
                    reconciliator: Reconciliator::new(player_id, x, y),
                });
                state.winner = None;
            }
            ServerMsg::Snapshot(snapshot) => {
                let round = state.round.as_mut()?;
                return round
                    .reconciliator
                    .apply_snapshot(&mut round.predictor, snapshot);
            }
            ServerMsg::GameOver { winner } => {
                state.winner = Some(*winner);
            }
            ServerMsg::HostLeft => {
                if let Some(old) = state.round.take() {
                    state.last_seq = old.predictor.last_seq();
                }
                state.slot = None;
            }
            _ => {}
        }
        None
    }

    pub fn key_down(&self, key: ControlKey, now_ms: u64) -> Option<ClientMsg> {
        let mut state = self.inner.lock();
        state.round.as_mut()?.predictor.key_down(key, now_ms)
    }

    pub fn key_up(&self, key: ControlKey, now_ms: u64) -> Option<ClientMsg> {
        let mut state = self.inner.lock();
        state.round.as_mut()?.predictor.key_up(key, now_ms)
    }

    pub fn release_all(&self, now_ms: u64) -> Option<ClientMsg> {
        let mut state = self.inner.lock();
        state.round.as_mut()?.predictor.release_all(now_ms)
    }

    /// Frame callback: predict one step, then ease the rendered tanks
    pub fn frame(&self, now_ms: u64) -> Option<ClientMsg> {
        let mut state = self.inner.lock();
        let round = state.round.as_mut()?;
        let msg = round.predictor.frame(now_ms);
        round.reconciliator.frame(&round.predictor);
        msg
    }

    /// Where to draw the local tank this frame
    pub fn render_position(&self) -> Option<(f32, f32)> {
        let state = self.inner.lock();
        state.round.as_ref().map(|r| r.reconciliator.render_position())
    }

    /// Current prediction, before smoothing
    pub fn predicted_position(&self) -> Option<(f32, f32)> {
        let state = self.inner.lock();
        state.round.as_ref().map(|r| r.predictor.position())
    }

    /// `Some(winner)` once the round has ended
    pub fn winner(&self) -> Option<Option<PlayerId>> {
        self.inner.lock().winner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::{KeyState, MoveKey};
    use crate::game::room::Room;
    use crate::game::snapshot::SnapshotBuilder;
    use uuid::Uuid;

    #[test]
    fn keys_ignored_until_round_starts() {
        let session = ClientSession::new();
        assert!(session.key_down(ControlKey::Shoot, 0).is_none());
        assert!(session.frame(0).is_none());
        assert!(session.render_position().is_none());
    }

    #[test]
    fn converges_with_server_room() {
        let host = Uuid::new_v4();
        let mut room = Room::new("c".into(), host, 3);
        room.add_player(Uuid::new_v4()).unwrap();
        room.start(host).unwrap();

        let session = ClientSession::new();
        session.on_server_msg(&ServerMsg::Welcome { player_id: host, server_time: 0 });
        session.on_server_msg(&ServerMsg::RoomCreated {
            room_id: "c".into(),
            player_id: host,
            slot: Slot::P1,
        });
        session.on_server_msg(&ServerMsg::GameStarted {
            map: SnapshotBuilder::map_view(&room.map),
        });
        assert_eq!(session.predicted_position(), Some((175.0, 175.0)));

        // One frame per tick, input delivered before the tick that uses it
        let mut now = 0;
        let forward = |msg: Option<ClientMsg>, room: &mut Room| {
            if let Some(ClientMsg::Input { seq, up, down, left, right, shoot, priority }) = msg {
                let keys = KeyState::from_wire(&priority, up, down, left, right, shoot);
                room.apply_input(host, seq, keys);
            }
        };
        forward(session.key_down(ControlKey::Move(MoveKey::Down), now), &mut room);
        for _ in 0..20 {
            forward(session.frame(now), &mut room);
            room.tick(now).unwrap();
            now += 16;
        }

        let snapshot = SnapshotBuilder::build_for(&room, &room.players[0]);
        let correction = session.on_server_msg(&ServerMsg::Snapshot(snapshot)).unwrap();
        assert_eq!(correction.replayed, 0);
        assert_eq!(correction.error, 0.0);
        let server = (room.players[0].x, room.players[0].y);
        assert_eq!(session.predicted_position(), Some(server));
    }

    #[test]
    fn sequence_continues_across_rounds() {
        let host = Uuid::new_v4();
        let session = ClientSession::new();
        session.on_server_msg(&ServerMsg::Welcome { player_id: host, server_time: 0 });
        session.on_server_msg(&ServerMsg::JoinedRoom {
            room_id: "r".into(),
            player_id: host,
            slot: Slot::P2,
            player_count: 2,
        });
        let map = SnapshotBuilder::map_view(&ArenaMap::from_walls(1200.0, 1200.0, Vec::new()));
        session.on_server_msg(&ServerMsg::GameStarted { map: map.clone() });
        assert_eq!(session.predicted_position(), Some((975.0, 975.0)));
        session.key_down(ControlKey::Shoot, 0);
        session.key_up(ControlKey::Shoot, 1);

        session.on_server_msg(&ServerMsg::GameOver { winner: Some(host) });
        assert_eq!(session.winner(), Some(Some(host)));

        session.on_server_msg(&ServerMsg::GameStarted { map });
        assert_eq!(session.winner(), None);
        match session.key_down(ControlKey::Shoot, 2) {
            Some(ClientMsg::Input { seq, .. }) => assert_eq!(seq, 3),
            other => panic!("unexpected {:?}", other),
        }
    }
}
