//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::config::Config;
use crate::game::RoomHandle;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Plain HTTP requests are short; the WebSocket upgrade answers immediately
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(health_handler))
        .route("/rooms", get(list_rooms_handler))
        .route("/rooms/:room_id", get(room_handler))
        .route("/ws", get(ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(CompressionLayer::new())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_state(state)
}

/// CORS: `*` allows any origin, otherwise a comma-separated allow list
fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if config.allows_any_origin() {
        return cors.allow_origin(Any);
    }

    let allowed_origins: Vec<header::HeaderValue> = config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();
    cors.allow_origin(allowed_origins)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_rooms: usize,
    active_players: usize,
    connected_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_rooms: state.registry.active_rooms(),
        active_players: state.registry.total_players(),
        connected_players: state.lobby.connected_players(),
    })
}

// ============================================================================
// Room endpoints
// ============================================================================

#[derive(Debug, Serialize, PartialEq)]
struct RoomSummary {
    room_id: String,
    host_id: Uuid,
    player_count: usize,
    is_playing: bool,
    is_game_over: bool,
    tick: u64,
}

impl RoomSummary {
    /// `None` once the room has been torn down
    fn of(handle: &RoomHandle) -> Option<Self> {
        let room = handle.lock();
        if room.is_closed() {
            return None;
        }
        Some(Self {
            room_id: room.id.clone(),
            host_id: room.host_id,
            player_count: room.players.len(),
            is_playing: room.is_playing,
            is_game_over: room.is_game_over,
            tick: room.tick,
        })
    }
}

#[derive(Debug, Serialize)]
struct RoomsResponse {
    rooms: Vec<RoomSummary>,
}

async fn list_rooms_handler(State(state): State<AppState>) -> Json<RoomsResponse> {
    let mut rooms: Vec<RoomSummary> = state
        .registry
        .handles()
        .iter()
        .filter_map(|(_, handle)| RoomSummary::of(handle))
        .collect();
    rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));

    Json(RoomsResponse { rooms })
}

async fn room_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomSummary>, AppError> {
    state
        .registry
        .get(&room_id)
        .and_then(|handle| RoomSummary::of(&handle))
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("room {}", room_id)))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
