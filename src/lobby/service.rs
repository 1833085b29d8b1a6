//! Lobby service - connection routing and room lifecycle

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::game::entities::{KeyState, PlayerId, RoomId, Slot};
use crate::game::snapshot::SnapshotBuilder;
use crate::game::{LeaveOutcome, MessageSink, RoomError, RoomHandle, RoomRegistry};
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Outbound queue depth per connection; snapshots beyond this are dropped
pub const OUTBOUND_QUEUE: usize = 128;

/// Live connection handle for routing messages
#[derive(Clone)]
pub struct PlayerConnection {
    pub player_id: PlayerId,
    /// Channel drained by the connection's writer task
    pub tx: mpsc::Sender<ServerMsg>,
    /// Room the player currently sits in
    pub room: Option<RoomId>,
}

/// Routes client messages into rooms and server messages out to sockets
pub struct LobbyService {
    registry: Arc<RoomRegistry>,
    connections: DashMap<PlayerId, PlayerConnection>,
}

impl LobbyService {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self {
            registry,
            connections: DashMap::new(),
        }
    }

    /// Register a connection; returns the receiver its writer task drains
    pub fn register(&self, player_id: PlayerId) -> mpsc::Receiver<ServerMsg> {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        self.connections.insert(
            player_id,
            PlayerConnection {
                player_id,
                tx,
                room: None,
            },
        );
        debug!(player_id = %player_id, "Connection registered");
        rx
    }

    /// Drop a connection, leaving its room first
    pub fn unregister(&self, player_id: PlayerId) {
        self.leave_room(player_id);
        self.connections.remove(&player_id);
        info!(player_id = %player_id, "Connection unregistered");
    }

    pub fn connected_players(&self) -> usize {
        self.connections.len()
    }

    pub fn room_of(&self, player_id: PlayerId) -> Option<RoomId> {
        self.connections.get(&player_id).and_then(|c| c.room.clone())
    }

    fn set_room(&self, player_id: PlayerId, room: Option<RoomId>) {
        if let Some(mut conn) = self.connections.get_mut(&player_id) {
            conn.room = room;
        }
    }

    fn send_error(&self, player_id: PlayerId, err: &RoomError) {
        self.send_to(
            player_id,
            ServerMsg::Error {
                code: err.code().to_string(),
                message: err.to_string(),
            },
        );
    }

    fn send_all(&self, players: &[PlayerId], msg: &ServerMsg) {
        for player in players {
            self.send_to(*player, msg.clone());
        }
    }

    /// Dispatch one inbound message
    pub fn handle(&self, player_id: PlayerId, msg: ClientMsg) {
        match msg {
            ClientMsg::CreateRoom { room_id } => self.create_room(player_id, &room_id),
            ClientMsg::JoinRoom { room_id } => self.join_room(player_id, &room_id),
            ClientMsg::StartGame => self.start_game(player_id),
            ClientMsg::LeaveRoom => self.leave_room(player_id),
            ClientMsg::Input {
                seq,
                up,
                down,
                left,
                right,
                shoot,
                priority,
            } => {
                let keys = KeyState::from_wire(&priority, up, down, left, right, shoot);
                self.apply_input(player_id, seq, keys);
            }
            ClientMsg::Ping { t } => self.send_to(
                player_id,
                ServerMsg::Pong {
                    t,
                    server_time: unix_millis(),
                },
            ),
        }
    }

    fn create_room(&self, player_id: PlayerId, room_id: &str) {
        if let Some(current) = self.room_of(player_id) {
            self.send_error(player_id, &RoomError::AlreadyJoined(current));
            return;
        }

        match self.registry.create(room_id, player_id) {
            Ok(_) => {
                self.set_room(player_id, Some(room_id.to_string()));
                self.send_to(
                    player_id,
                    ServerMsg::RoomCreated {
                        room_id: room_id.to_string(),
                        player_id,
                        slot: Slot::P1,
                    },
                );
            }
            Err(e) => {
                warn!(player_id = %player_id, room_id, error = %e, "Room creation refused");
                self.send_error(player_id, &e);
            }
        }
    }

    fn join_room(&self, player_id: PlayerId, room_id: &str) {
        if let Some(current) = self.room_of(player_id) {
            self.send_error(player_id, &RoomError::AlreadyJoined(current));
            return;
        }

        match self.registry.get(room_id) {
            Some(handle) => self.seat(player_id, room_id, &handle),
            None => self.send_to(
                player_id,
                ServerMsg::RoomNotFound {
                    room_id: room_id.to_string(),
                },
            ),
        }
    }

    /// Seat a player through a handle that may have been torn down since it
    /// was looked up; a closed room answers like a missing one
    fn seat(&self, player_id: PlayerId, room_id: &str, handle: &RoomHandle) {
        let joined = {
            let mut room = handle.lock();
            room.add_player(player_id).map(|slot| (slot, room.player_ids()))
        };

        match joined {
            Ok((slot, roster)) => {
                self.set_room(player_id, Some(room_id.to_string()));
                self.send_to(
                    player_id,
                    ServerMsg::JoinedRoom {
                        room_id: room_id.to_string(),
                        player_id,
                        slot,
                        player_count: roster.len(),
                    },
                );
                self.send_all(
                    &roster,
                    &ServerMsg::PlayerJoined {
                        player_id,
                        player_count: roster.len(),
                    },
                );
                info!(
                    player_id = %player_id,
                    room_id,
                    players = roster.len(),
                    "Player joined room"
                );
            }
            Err(RoomError::Full(_)) => self.send_to(
                player_id,
                ServerMsg::RoomFull {
                    room_id: room_id.to_string(),
                },
            ),
            Err(RoomError::NotFound(_)) => self.send_to(
                player_id,
                ServerMsg::RoomNotFound {
                    room_id: room_id.to_string(),
                },
            ),
            Err(e) => self.send_error(player_id, &e),
        }
    }

    fn start_game(&self, player_id: PlayerId) {
        let Some(handle) = self.room_of(player_id).and_then(|id| self.registry.get(&id)) else {
            self.send_error(player_id, &RoomError::NotInRoom);
            return;
        };

        let (host_changed, started, roster) = {
            let mut room = handle.lock();
            let host_changed = room.ensure_host();
            let started = room
                .start(player_id)
                .map(|()| SnapshotBuilder::map_view(&room.map));
            (host_changed, started, room.player_ids())
        };

        if let Some(host_id) = host_changed {
            self.send_all(&roster, &ServerMsg::HostChanged { host_id });
        }
        match started {
            Ok(map) => self.send_all(&roster, &ServerMsg::GameStarted { map }),
            Err(e) => {
                debug!(player_id = %player_id, error = %e, "Start refused");
                self.send_error(player_id, &e);
            }
        }
    }

    fn leave_room(&self, player_id: PlayerId) {
        let Some(room_id) = self.room_of(player_id) else {
            return;
        };
        self.set_room(player_id, None);

        let Some(handle) = self.registry.get(&room_id) else {
            return;
        };
        let Some(outcome) = handle.lock().remove_player(player_id) else {
            return;
        };
        if outcome.destroys_room() {
            self.registry.destroy(&room_id);
        }

        match outcome {
            LeaveOutcome::Empty => {}
            LeaveOutcome::HostLeft { remaining } => {
                self.send_all(&remaining, &ServerMsg::HostLeft);
                for other in &remaining {
                    self.set_room(*other, None);
                }
                info!(room_id = %room_id, host_id = %player_id, "Host left, room closed");
            }
            LeaveOutcome::Forfeit { winner } => {
                self.send_to(
                    winner,
                    ServerMsg::PlayerLeft {
                        player_id,
                        player_count: 1,
                    },
                );
                self.send_to(winner, ServerMsg::GameOver { winner: Some(winner) });
                info!(room_id = %room_id, winner = %winner, "Player left mid-match");
            }
            LeaveOutcome::Left { remaining } => {
                self.send_all(
                    &remaining,
                    &ServerMsg::PlayerLeft {
                        player_id,
                        player_count: remaining.len(),
                    },
                );
            }
        }
    }

    fn apply_input(&self, player_id: PlayerId, seq: u32, keys: KeyState) {
        let Some(handle) = self.room_of(player_id).and_then(|id| self.registry.get(&id)) else {
            return;
        };
        handle.lock().apply_input(player_id, seq, keys);
    }
}

impl MessageSink for LobbyService {
    fn send_to(&self, player: PlayerId, msg: ServerMsg) {
        let Some(tx) = self.connections.get(&player).map(|c| c.tx.clone()) else {
            return;
        };
        if let Err(e) = tx.try_send(msg) {
            debug!(player_id = %player, error = %e, "Outbound message dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn drain(rx: &mut mpsc::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn lobby() -> LobbyService {
        LobbyService::new(Arc::new(RoomRegistry::new(8)))
    }

    fn create(room_id: &str) -> ClientMsg {
        ClientMsg::CreateRoom {
            room_id: room_id.to_string(),
        }
    }

    fn join(room_id: &str) -> ClientMsg {
        ClientMsg::JoinRoom {
            room_id: room_id.to_string(),
        }
    }

    #[test]
    fn create_join_start_flow() {
        let lobby = lobby();
        let (host, guest) = (Uuid::new_v4(), Uuid::new_v4());
        let mut host_rx = lobby.register(host);
        let mut guest_rx = lobby.register(guest);

        lobby.handle(host, create("r1"));
        assert_eq!(
            drain(&mut host_rx),
            vec![ServerMsg::RoomCreated {
                room_id: "r1".into(),
                player_id: host,
                slot: Slot::P1
            }]
        );

        lobby.handle(guest, join("r1"));
        let guest_msgs = drain(&mut guest_rx);
        assert!(matches!(
            guest_msgs[0],
            ServerMsg::JoinedRoom { slot: Slot::P2, player_count: 2, .. }
        ));
        assert!(matches!(guest_msgs[1], ServerMsg::PlayerJoined { player_count: 2, .. }));
        assert_eq!(drain(&mut host_rx).len(), 1);

        // Guest cannot start
        lobby.handle(guest, ClientMsg::StartGame);
        assert!(matches!(
            &drain(&mut guest_rx)[0],
            ServerMsg::Error { code, .. } if code == "not_host"
        ));

        lobby.handle(host, ClientMsg::StartGame);
        for rx in [&mut host_rx, &mut guest_rx] {
            match &drain(rx)[..] {
                [ServerMsg::GameStarted { map }] => assert!(!map.walls.is_empty()),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn missing_and_full_rooms() {
        let lobby = lobby();
        let ids: Vec<_> = (0..3).map(|_| Uuid::new_v4()).collect();
        let mut rxs: Vec<_> = ids.iter().map(|id| lobby.register(*id)).collect();

        lobby.handle(ids[0], join("nope"));
        assert_eq!(drain(&mut rxs[0]), vec![ServerMsg::RoomNotFound { room_id: "nope".into() }]);

        lobby.handle(ids[0], create("r"));
        lobby.handle(ids[1], join("r"));
        lobby.handle(ids[2], join("r"));
        assert_eq!(drain(&mut rxs[2]), vec![ServerMsg::RoomFull { room_id: "r".into() }]);
    }

    #[test]
    fn host_leaving_closes_room() {
        let lobby = lobby();
        let (host, guest) = (Uuid::new_v4(), Uuid::new_v4());
        let _host_rx = lobby.register(host);
        let mut guest_rx = lobby.register(guest);
        lobby.handle(host, create("r"));
        lobby.handle(guest, join("r"));
        drain(&mut guest_rx);

        lobby.unregister(host);
        assert_eq!(drain(&mut guest_rx), vec![ServerMsg::HostLeft]);
        assert!(lobby.registry.get("r").is_none());
        assert_eq!(lobby.room_of(guest), None);
        assert_eq!(lobby.connected_players(), 1);
    }

    #[test]
    fn join_through_stale_handle_is_refused() {
        let lobby = lobby();
        let (host, guest, late) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let _host_rx = lobby.register(host);
        let mut guest_rx = lobby.register(guest);
        let mut late_rx = lobby.register(late);
        lobby.handle(host, create("r"));
        lobby.handle(guest, join("r"));
        drain(&mut guest_rx);

        // Looked up before the host left, used after
        let stale = lobby.registry.get("r").unwrap();
        lobby.handle(host, ClientMsg::LeaveRoom);
        lobby.seat(late, "r", &stale);

        assert_eq!(drain(&mut late_rx), vec![ServerMsg::RoomNotFound { room_id: "r".into() }]);
        assert_eq!(lobby.room_of(late), None);
        assert!(stale.lock().player(late).is_none());
        assert_eq!(drain(&mut guest_rx), vec![ServerMsg::HostLeft]);

        // The late player is free to host the code again
        lobby.handle(late, create("r"));
        assert!(matches!(
            &drain(&mut late_rx)[..],
            [ServerMsg::RoomCreated { slot: Slot::P1, .. }]
        ));
    }

    #[test]
    fn guest_leaving_mid_match_hands_win_to_host() {
        let lobby = lobby();
        let (host, guest) = (Uuid::new_v4(), Uuid::new_v4());
        let mut host_rx = lobby.register(host);
        let _guest_rx = lobby.register(guest);
        lobby.handle(host, create("r"));
        lobby.handle(guest, join("r"));
        lobby.handle(host, ClientMsg::StartGame);
        drain(&mut host_rx);

        lobby.handle(guest, ClientMsg::LeaveRoom);
        let msgs = drain(&mut host_rx);
        assert_eq!(msgs.last(), Some(&ServerMsg::GameOver { winner: Some(host) }));
        let handle = lobby.registry.get("r").unwrap();
        assert!(handle.lock().is_game_over);
    }

    #[test]
    fn last_player_leaving_destroys_room() {
        let lobby = lobby();
        let host = Uuid::new_v4();
        let _rx = lobby.register(host);
        lobby.handle(host, create("solo"));
        lobby.handle(host, ClientMsg::LeaveRoom);
        assert!(lobby.registry.get("solo").is_none());
    }

    #[test]
    fn input_reaches_room_and_ping_is_answered() {
        let lobby = lobby();
        let host = Uuid::new_v4();
        let mut rx = lobby.register(host);
        lobby.handle(host, create("r"));
        drain(&mut rx);

        lobby.handle(
            host,
            ClientMsg::Input {
                seq: 4,
                up: false,
                down: false,
                left: true,
                right: false,
                shoot: false,
                priority: vec!["left".into(), "bogus".into()],
            },
        );
        let handle = lobby.registry.get("r").unwrap();
        {
            let room = handle.lock();
            let p = room.player(host).unwrap();
            assert_eq!(p.last_processed_input_seq, 4);
            assert!(p.keys.left);
            assert_eq!(p.keys.priority.len(), 1);
        }

        lobby.handle(host, ClientMsg::Ping { t: 42 });
        let pong = tokio_test::block_on(rx.recv());
        assert!(matches!(pong, Some(ServerMsg::Pong { t: 42, .. })));
    }
}
