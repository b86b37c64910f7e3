//! Configuration, lifecycle, and command endpoints

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::audio::devices;
use crate::config::NodeConfig;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn bad_request(error: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

fn internal_error(error: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

/// Get the active configuration
async fn get_config(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<NodeConfig>, (StatusCode, Json<ErrorResponse>)> {
    state
        .node
        .config()
        .map(Json)
        .map_err(|e| internal_error(e.to_string()))
}

/// Replace the configuration, persist it, and restart the capture loop
async fn put_config(
    State(state): State<Arc<ApiState>>,
    Json(config): Json<NodeConfig>,
) -> Result<Json<NodeConfig>, (StatusCode, Json<ErrorResponse>)> {
    config
        .validate()
        .map_err(|e| bad_request(e.to_string()))?;

    state
        .node
        .update_config(config.clone())
        .map_err(|e| internal_error(e.to_string()))?;

    if let Some(path) = &state.config_path {
        if let Err(e) = config.save(path) {
            tracing::warn!(error = %e, "failed to persist config");
        }
    }

    let node = state.node.clone();
    tokio::task::spawn_blocking(move || node.restart())
        .await
        .map_err(|e| internal_error(e.to_string()))?
        .map_err(|e| internal_error(e.to_string()))?;

    Ok(Json(config))
}

/// Restart the capture loop with the current configuration
async fn restart(
    State(state): State<Arc<ApiState>>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let node = state.node.clone();
    tokio::task::spawn_blocking(move || node.restart())
        .await
        .map_err(|e| internal_error(e.to_string()))?
        .map_err(|e| internal_error(e.to_string()))?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct DevicesResponse {
    inputs: Vec<devices::DeviceInfo>,
    outputs: Vec<devices::DeviceInfo>,
}

/// Enumerate audio devices for mic/speaker selection
async fn list_devices() -> Result<Json<DevicesResponse>, (StatusCode, Json<ErrorResponse>)> {
    let inputs = devices::list_input_devices().map_err(|e| internal_error(e.to_string()))?;
    let outputs = devices::list_output_devices().map_err(|e| internal_error(e.to_string()))?;
    Ok(Json(DevicesResponse { inputs, outputs }))
}

#[derive(Deserialize)]
struct TimerRequest {
    secs: u64,
}

#[derive(Serialize)]
struct TimerResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining_secs: Option<u64>,
}

async fn set_timer(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<TimerRequest>,
) -> Result<Json<TimerResponse>, (StatusCode, Json<ErrorResponse>)> {
    if request.secs == 0 {
        return Err(bad_request("timer duration must be positive"));
    }

    state.node.set_timer(Duration::from_secs(request.secs));
    Ok(Json(TimerResponse {
        remaining_secs: Some(request.secs),
    }))
}

async fn get_timer(State(state): State<Arc<ApiState>>) -> Json<TimerResponse> {
    Json(TimerResponse {
        remaining_secs: state.node.timer_remaining().map(|d| d.as_secs()),
    })
}

async fn delete_timer(State(state): State<Arc<ApiState>>) -> StatusCode {
    state.node.stop_timer();
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
struct VolumeRequest {
    percent: u8,
}

async fn set_volume(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<VolumeRequest>,
) -> StatusCode {
    state.node.set_volume(request.percent);
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
struct PlayRequest {
    path: PathBuf,
    #[serde(default)]
    asynchronous: bool,
    #[serde(default)]
    looping: bool,
}

/// Play an audio file through the node's player
async fn play(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<PlayRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let PlayRequest {
        path,
        asynchronous,
        looping,
    } = request;

    if !path.exists() {
        return Err(bad_request(format!("no such file: {}", path.display())));
    }

    if asynchronous {
        state.node.play_audio_file(path, true, looping);
        return Ok(StatusCode::ACCEPTED);
    }

    // Synchronous plays block for the clip's duration, off the runtime
    let node = state.node.clone();
    tokio::task::spawn_blocking(move || node.play_audio_file(path, false, looping))
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn interrupt(State(state): State<Arc<ApiState>>) -> StatusCode {
    state.node.interrupt_playback();
    StatusCode::NO_CONTENT
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/config", get(get_config).put(put_config))
        .route("/api/restart", post(restart))
        .route("/api/devices", get(list_devices))
        .route("/api/timer", post(set_timer).get(get_timer).delete(delete_timer))
        .route("/api/volume", post(set_volume))
        .route("/api/play", post(play))
        .route("/api/playback/interrupt", post(interrupt))
        .with_state(state)
}
