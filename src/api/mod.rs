//! HTTP control plane
//!
//! A thin axum surface over the node's thread-safe operations. Handlers that
//! stop or restart the capture thread run under `spawn_blocking` because
//! joining the capture thread can take as long as its current state-machine
//! step.

mod control;
mod health;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::node::Node;

/// Shared state for control plane handlers
pub struct ApiState {
    pub node: Arc<Node>,
    /// Where `PUT /api/config` persists the configuration
    pub config_path: Option<PathBuf>,
}

/// Build the control plane router
#[must_use]
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health::router(state.clone()))
        .merge(control::router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serve the control plane until the task is aborted
///
/// # Errors
///
/// Returns error if the server fails to bind or run.
pub async fn serve(state: Arc<ApiState>, port: u16) -> Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| crate::Error::Config(format!("failed to bind control plane: {e}")))?;

    tracing::info!(port, "control plane listening");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| crate::Error::Config(format!("control plane error: {e}")))?;

    Ok(())
}
