//! Room lobby: connection routing and room lifecycle

mod service;

pub use service::{LobbyService, PlayerConnection, OUTBOUND_QUEUE};
