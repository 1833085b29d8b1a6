//! Fixed-rate simulation and broadcast loops over every room

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::util::time::{interval_for, unix_millis, Timer};
use crate::ws::protocol::ServerMsg;

use super::entities::PlayerId;
use super::registry::RoomRegistry;
use super::snapshot::SnapshotBuilder;

/// Outbound delivery seam between the schedulers and connections
pub trait MessageSink: Send + Sync {
    /// Queue a message for one player; never blocks
    fn send_to(&self, player: PlayerId, msg: ServerMsg);
}

/// Counters for one pass over the registry
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassStats {
    pub rooms: usize,
    pub faults: usize,
    pub panics: usize,
}

/// Run one room's work, containing any panic to that room
fn isolate<T>(room_id: &str, work: impl FnOnce() -> T) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(value) => Some(value),
        Err(_) => {
            error!(room_id, "Room step panicked; continuing with other rooms");
            None
        }
    }
}

/// Steps every running room at the simulation rate
pub struct SimulationScheduler {
    registry: Arc<RoomRegistry>,
    sink: Arc<dyn MessageSink>,
    tick_hz: u32,
}

impl SimulationScheduler {
    pub fn new(registry: Arc<RoomRegistry>, sink: Arc<dyn MessageSink>, tick_hz: u32) -> Self {
        Self {
            registry,
            sink,
            tick_hz,
        }
    }

    /// One tick for every room, each under its own lock and fault boundary
    pub fn run_pass(&self, now_ms: u64) -> PassStats {
        let mut stats = PassStats::default();

        for (room_id, handle) in self.registry.handles() {
            let result = isolate(&room_id, || {
                let mut room = handle.lock();
                if !room.is_running() {
                    return None;
                }
                let outcome = room.tick(now_ms);
                Some((outcome, room.player_ids(), room.tick))
            });

            match result {
                None => stats.panics += 1,
                Some(None) => {}
                Some(Some((Ok(outcome), players, tick))) => {
                    stats.rooms += 1;
                    if !outcome.events.is_empty() {
                        debug!(
                            room_id = %room_id,
                            tick,
                            events = outcome.events.len(),
                            "Tick events"
                        );
                    }
                    if let Some(winner) = outcome.finished {
                        info!(room_id = %room_id, tick, winner = %winner, "Match over");
                        for player in players {
                            self.sink.send_to(player, ServerMsg::GameOver { winner: Some(winner) });
                        }
                    }
                }
                Some(Some((Err(e), _, tick))) => {
                    stats.rooms += 1;
                    stats.faults += 1;
                    warn!(room_id = %room_id, tick, error = %e, "Tick fault");
                }
            }
        }

        stats
    }

    /// Run forever at the configured rate. A slow pass delays the next one
    /// rather than triggering a burst of catch-up ticks.
    pub async fn run(self) {
        let period = interval_for(self.tick_hz);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(tick_hz = self.tick_hz, "Simulation scheduler started");

        loop {
            ticker.tick().await;
            let timer = Timer::new();
            let stats = self.run_pass(unix_millis());

            let elapsed = timer.elapsed_micros();
            if elapsed > period.as_micros() as u64 {
                warn!(
                    elapsed_us = elapsed,
                    budget_us = period.as_micros() as u64,
                    rooms = stats.rooms,
                    "Simulation pass overran its tick"
                );
            }
        }
    }
}

/// Sends every seated player a trimmed view of their room
pub struct BroadcastScheduler {
    registry: Arc<RoomRegistry>,
    sink: Arc<dyn MessageSink>,
    broadcast_hz: u32,
}

impl BroadcastScheduler {
    pub fn new(registry: Arc<RoomRegistry>, sink: Arc<dyn MessageSink>, broadcast_hz: u32) -> Self {
        Self {
            registry,
            sink,
            broadcast_hz,
        }
    }

    /// Snapshot every playing room. Views are built under the room lock so
    /// all players see the same post-tick state; delivery happens after the
    /// lock is released.
    pub fn run_pass(&self) -> PassStats {
        let mut stats = PassStats::default();

        for (room_id, handle) in self.registry.handles() {
            let built = isolate(&room_id, || {
                let room = handle.lock();
                room.is_playing.then(|| SnapshotBuilder::build_all(&room))
            });

            match built {
                None => stats.panics += 1,
                Some(None) => {}
                Some(Some(messages)) => {
                    stats.rooms += 1;
                    for (player, msg) in messages {
                        self.sink.send_to(player, msg);
                    }
                }
            }
        }

        stats
    }

    pub async fn run(self) {
        let mut ticker = interval(interval_for(self.broadcast_hz));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(broadcast_hz = self.broadcast_hz, "Broadcast scheduler started");

        loop {
            ticker.tick().await;
            self.run_pass();
        }
    }
}
