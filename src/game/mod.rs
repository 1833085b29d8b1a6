//! Game simulation modules

pub mod combat;
pub mod constants;
pub mod entities;
pub mod items;
pub mod map;
pub mod movement;
pub mod registry;
pub mod room;
pub mod scheduler;
pub mod snapshot;
pub mod spatial;

pub use registry::{RoomHandle, RoomRegistry};
pub use room::{LeaveOutcome, Room, RoomError, TickError};
pub use scheduler::{BroadcastScheduler, MessageSink, SimulationScheduler};
