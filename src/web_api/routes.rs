//! API Routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use super::stream::mjpeg_response;
use crate::alert_store::{AlertQuery, AlertRecord, AlertResolution, AlertStatistics};
use crate::camera_session::SessionConfig;
use crate::error::{Error, Result};
use crate::models::{ApiResponse, StartCameraRequest};
use crate::monitor_session::SessionStatus;
use crate::state::AppState;

/// Default alert window (hours)
const DEFAULT_WINDOW_HOURS: i64 = 24;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Camera sessions
        .route("/api/cameras", get(list_sessions))
        .route("/api/cameras/:id/start", post(start_camera))
        .route("/api/cameras/:id/stop", post(stop_camera))
        .route("/api/cameras/:id/status", get(camera_status))
        .route("/api/cameras/:id/video_feed", get(video_feed))
        .route("/api/cameras/:id/latest.jpg", get(latest_frame))
        // Default camera on/off
        .route("/api/toggle_camera", post(toggle_camera))
        // Alerts
        .route("/api/alerts", get(list_alerts))
        .route("/api/alerts/statistics", get(alert_statistics))
        .route("/api/alerts/:id", get(get_alert))
        .route("/api/alerts/:id/resolve", post(resolve_alert))
        .with_state(state)
}

// ========================================
// Camera session handlers
// ========================================

async fn list_sessions(State(state): State<AppState>) -> Json<ApiResponse<Vec<SessionStatus>>> {
    Json(ApiResponse::success(state.sessions.list().await))
}

/// Build the session config of a start request
fn session_config(state: &AppState, camera_id: &str, req: StartCameraRequest) -> SessionConfig {
    let mut config = req.config.unwrap_or_else(|| {
        SessionConfig::for_camera(camera_id, &state.config.camera_address, state.config.camera_port)
    });
    config.camera.camera_id = camera_id.to_string();
    if let Some(ip) = req.ip {
        config.camera.address = ip;
    }
    if let Some(port) = req.port {
        config.camera.port = port;
    }
    config
}

async fn start_camera(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
    body: Option<Json<StartCameraRequest>>,
) -> Result<Json<ApiResponse<SessionStatus>>> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let config = session_config(&state, &camera_id, req);

    let status = start_session(&state, config).await?;
    Ok(Json(ApiResponse::success(status)))
}

/// Start a session; request-supplied settings faults are client errors
async fn start_session(state: &AppState, config: SessionConfig) -> Result<SessionStatus> {
    state.sessions.start(config).await.map_err(|e| match e {
        Error::Config(msg) => Error::Validation(msg),
        other => other,
    })
}

async fn stop_camera(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> Json<ApiResponse<serde_json::Value>> {
    let was_running = state.sessions.stop(&camera_id).await;
    Json(ApiResponse::success(json!({
        "camera_id": camera_id,
        "was_running": was_running
    })))
}

async fn camera_status(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> Result<Json<ApiResponse<SessionStatus>>> {
    let status = state
        .sessions
        .status(&camera_id)
        .await
        .ok_or_else(|| Error::NotFound(format!("session {}", camera_id)))?;
    Ok(Json(ApiResponse::success(status)))
}

/// Live MJPEG view of the annotated stream
async fn video_feed(State(state): State<AppState>, Path(camera_id): Path<String>) -> Response {
    match state.sessions.subscribe_frames(&camera_id).await {
        Some(frames) => mjpeg_response(frames),
        None => Error::NotFound(format!("session {}", camera_id)).into_response(),
    }
}

async fn latest_frame(State(state): State<AppState>, Path(camera_id): Path<String>) -> Response {
    if !state.sessions.is_running(&camera_id).await {
        return Error::NotFound(format!("session {}", camera_id)).into_response();
    }

    match state.sessions.latest_frame(&camera_id).await {
        Some(jpeg) => (
            StatusCode::OK,
            [
                ("content-type", "image/jpeg"),
                ("cache-control", "no-cache, no-store, must-revalidate"),
            ],
            jpeg,
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error_code": "FRAME_UNAVAILABLE",
                "message": "No frame available yet",
                "camera_id": camera_id
            })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ToggleRequest {
    action: String,
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    port: Option<u16>,
}

/// Start or stop the default camera
async fn toggle_camera(
    State(state): State<AppState>,
    Json(req): Json<ToggleRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>> {
    let camera_id = crate::camera_session::DEFAULT_CAMERA_ID;

    match req.action.as_str() {
        "start" => {
            let config = session_config(
                &state,
                camera_id,
                StartCameraRequest {
                    ip: req.ip,
                    port: req.port,
                    config: None,
                },
            );
            let status = start_session(&state, config).await?;
            Ok(Json(ApiResponse::success(json!({
                "status": "started",
                "session": status
            }))))
        }
        "stop" => {
            state.sessions.stop(camera_id).await;
            Ok(Json(ApiResponse::success(json!({ "status": "stopped" }))))
        }
        other => Err(Error::Validation(format!("unknown action: {}", other))),
    }
}

// ========================================
// Alert handlers
// ========================================

/// Query parameters for alert listing
#[derive(Debug, Deserialize)]
struct AlertListQuery {
    /// Window size; defaults to the last 24 hours
    hours: Option<i64>,
    /// Defaults to true (open alerts only)
    unresolved_only: Option<bool>,
    camera_id: Option<String>,
    limit: Option<usize>,
}

async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertListQuery>,
) -> Result<Json<ApiResponse<Vec<AlertRecord>>>> {
    let hours = query.hours.unwrap_or(DEFAULT_WINDOW_HOURS);
    if hours <= 0 {
        return Err(Error::Validation("hours must be positive".to_string()));
    }

    let alerts = state
        .alerts
        .list_alerts(&AlertQuery {
            since: Some(Utc::now() - Duration::hours(hours)),
            unresolved_only: query.unresolved_only.unwrap_or(true),
            camera_id: query.camera_id,
            limit: Some(query.limit.unwrap_or(100)),
        })
        .await?;

    Ok(Json(ApiResponse::success(alerts)))
}

async fn get_alert(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ApiResponse<AlertRecord>>> {
    let alert = state
        .alerts
        .get_alert(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("alert {}", id)))?;
    Ok(Json(ApiResponse::success(alert)))
}

async fn resolve_alert(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(resolution): Json<AlertResolution>,
) -> Result<Json<ApiResponse<AlertRecord>>> {
    let alert = state.alerts.resolve_alert(id, &resolution).await?;
    tracing::info!(
        alert_id = id,
        status = %alert.resolution_status.as_str(),
        resolved_by = %resolution.resolved_by,
        "Alert resolved"
    );
    Ok(Json(ApiResponse::success(alert)))
}

#[derive(Debug, Deserialize)]
struct StatisticsQuery {
    hours: Option<i64>,
}

async fn alert_statistics(
    State(state): State<AppState>,
    Query(query): Query<StatisticsQuery>,
) -> Result<Json<ApiResponse<AlertStatistics>>> {
    let hours = query.hours.unwrap_or(DEFAULT_WINDOW_HOURS).max(1);
    let stats = state
        .alerts
        .statistics(Utc::now() - Duration::hours(hours))
        .await?;
    Ok(Json(ApiResponse::success(stats)))
}
