//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::RoomRegistry;
use crate::lobby::LobbyService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<RoomRegistry>,
    pub lobby: Arc<LobbyService>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // One registry shared by the lobby and both schedulers
        let registry = Arc::new(RoomRegistry::new(config.max_rooms));
        let lobby = Arc::new(LobbyService::new(registry.clone()));

        Self {
            config,
            registry,
            lobby,
        }
    }
}
