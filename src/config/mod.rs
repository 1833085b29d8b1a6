//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::util::rate_limit::INPUT_RATE_LIMIT;
use crate::util::time::{SIMULATION_TPS, SNAPSHOT_TPS};

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub log_json: bool,
    /// Allowed client origins for CORS, comma-separated; `*` allows any
    pub client_origin: String,

    /// Simulation ticks per second
    pub sim_tick_hz: u32,
    /// Snapshot broadcasts per second
    pub broadcast_hz: u32,
    /// Upper bound on concurrently open rooms
    pub max_rooms: usize,
    /// Inbound messages per second per connection
    pub input_rate_limit: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress(server_addr.clone()))?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json: lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            client_origin: lookup("CLIENT_ORIGIN").unwrap_or_else(|| "*".to_string()),

            sim_tick_hz: parse_or(&lookup, "SIM_TICK_HZ", SIMULATION_TPS)?,
            broadcast_hz: parse_or(&lookup, "BROADCAST_HZ", SNAPSHOT_TPS)?,
            max_rooms: parse_or(&lookup, "MAX_ROOMS", 100)?,
            input_rate_limit: parse_or(&lookup, "INPUT_RATE_LIMIT", INPUT_RATE_LIMIT)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (var, value) in [
            ("SIM_TICK_HZ", self.sim_tick_hz as usize),
            ("BROADCAST_HZ", self.broadcast_hz as usize),
            ("MAX_ROOMS", self.max_rooms),
            ("INPUT_RATE_LIMIT", self.input_rate_limit as usize),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    var,
                    value: value.to_string(),
                });
            }
        }
        if self.broadcast_hz > self.sim_tick_hz {
            return Err(ConfigError::BroadcastFasterThanSimulation {
                broadcast_hz: self.broadcast_hz,
                sim_tick_hz: self.sim_tick_hz,
            });
        }
        Ok(())
    }

    /// True when CORS should accept any origin
    pub fn allows_any_origin(&self) -> bool {
        self.client_origin.trim() == "*"
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("BROADCAST_HZ ({broadcast_hz}) must not exceed SIM_TICK_HZ ({sim_tick_hz})")]
    BroadcastFasterThanSimulation { broadcast_hz: u32, sim_tick_hz: u32 },
}
