//! Application state
//!
//! Holds all shared components and state

use crate::alert_store::AlertRepository;
use crate::camera_session::SessionConfig;
use crate::detector::HttpDetectionModel;
use crate::session_manager::SessionManager;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Database URL (in-memory alert store when unset)
    pub database_url: Option<String>,
    /// Detection inference server URL
    pub detector_url: String,
    /// Model name sent to the inference server
    pub model_name: String,
    /// Local weights file that must exist before startup
    pub model_path: Option<PathBuf>,
    /// Media directory (alert captures)
    pub media_dir: PathBuf,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Default camera address
    pub camera_address: String,
    /// Default camera port
    pub camera_port: u16,
    /// Start monitoring the default camera at boot
    pub autostart_camera: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").ok().filter(|u| !u.is_empty()),
            detector_url: std::env::var("DETECTOR_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9000".to_string()),
            model_name: std::env::var("MODEL_NAME").unwrap_or_else(|_| "ppe".to_string()),
            model_path: std::env::var("MODEL_PATH").ok().map(PathBuf::from),
            media_dir: std::env::var("MEDIA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("media")),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            camera_address: std::env::var("CAMERA_ADDRESS")
                .unwrap_or_else(|_| "192.168.1.100".to_string()),
            camera_port: std::env::var("CAMERA_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(4747),
            autostart_camera: std::env::var("AUTOSTART_CAMERA")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }
}

impl AppConfig {
    /// Session settings for the default camera
    pub fn default_session(&self) -> SessionConfig {
        SessionConfig::for_camera(
            crate::camera_session::DEFAULT_CAMERA_ID,
            &self.camera_address,
            self.camera_port,
        )
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Running camera sessions
    pub sessions: Arc<SessionManager>,
    /// Alert persistence
    pub alerts: Arc<dyn AlertRepository>,
    /// Inference server client (health reporting)
    pub detector: Arc<HttpDetectionModel>,
    /// Whether alerts are persisted in MySQL
    pub db_backed: bool,
    pub started_at: Instant,
}
