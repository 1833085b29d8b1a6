//! Tank Arena - authoritative two-player arena server and client netcode
//!
//! The server half owns every room: a fixed-rate simulation tick resolves
//! movement, combat, items and win detection, while a slower broadcast pass
//! sends each player an interest-filtered snapshot. The client half predicts
//! the local tank with the same movement code and reconciles against those
//! snapshots.

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod lobby;
pub mod util;
pub mod ws;
