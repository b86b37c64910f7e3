//! Health and status endpoints

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use super::ApiState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Whether the capture thread is running
    pub capture_alive: bool,
}

/// Node status summary
#[derive(Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub node_id: String,
    pub hub_url: String,
    pub wake_word: String,
    pub capture_alive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timer_remaining_secs: Option<u64>,
}

/// Liveness probe - lets an external supervisor detect a dead capture
/// thread and trigger a restart
async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        capture_alive: state.node.is_alive(),
    })
}

/// Node status including configuration identity
async fn status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    let (node_id, hub_url, wake_word) = state.node.config().map_or_else(
        |_| (String::new(), String::new(), String::new()),
        |c| (c.node_id, c.hub_url, c.wake_word),
    );

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        node_id,
        hub_url,
        wake_word,
        capture_alive: state.node.is_alive(),
        timer_remaining_secs: state.node.timer_remaining().map(|d| d.as_secs()),
    })
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .with_state(state)
}
