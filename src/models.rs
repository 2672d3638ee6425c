//! Shared API models
//!
//! Types shared across the API handlers.

use serde::{Deserialize, Serialize};

/// Standard API response wrapper
///
/// Failures are rendered by `Error`'s `IntoResponse` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub detector_connected: bool,
    /// Alerts persisted in MySQL (false: in-memory store)
    pub db_backed: bool,
    pub active_sessions: usize,
}

/// Camera start request (toggle on)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartCameraRequest {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Full session overrides; `ip`/`port` win over its camera endpoint
    #[serde(default)]
    pub config: Option<crate::camera_session::SessionConfig>,
}
