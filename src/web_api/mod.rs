//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - HTTP API routes (sessions, alerts, health)
//! - MJPEG live view of the annotated stream
//! - Response formatting

mod routes;
mod stream;

pub use routes::create_router;
pub use stream::{mjpeg_part, MJPEG_CONTENT_TYPE};

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let detector_ok = state.detector.health_check().await.unwrap_or(false);

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.started_at.elapsed().as_secs(),
        detector_connected: detector_ok,
        db_backed: state.db_backed,
        active_sessions: state.sessions.list().await.len(),
    };

    Json(response)
}
