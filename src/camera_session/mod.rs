//! CameraSession - Camera identity and per-session settings
//!
//! ## Responsibilities
//!
//! - Camera endpoint (address, port, protocol, stream path)
//! - Per-session tunables with fixed defaults
//! - Configuration validation (faults here are fatal)

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Camera id of the default session
pub const DEFAULT_CAMERA_ID: &str = "droidcam";
/// Default DroidCam address
pub const DEFAULT_CAMERA_ADDRESS: &str = "192.168.1.100";
/// Default DroidCam port
pub const DEFAULT_CAMERA_PORT: u16 = 4747;
/// Default MJPEG stream path
pub const DEFAULT_STREAM_PATH: &str = "/video";

pub const MAX_CAMERA_ID_LEN: usize = 64;

/// Stream protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamProtocol {
    Http,
    Https,
}

impl Default for StreamProtocol {
    fn default() -> Self {
        Self::Http
    }
}

impl StreamProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamProtocol::Http => "http",
            StreamProtocol::Https => "https",
        }
    }
}

/// One logical camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSession {
    pub camera_id: String,
    pub address: String,
    pub port: u16,
    pub protocol: StreamProtocol,
    pub path: String,
}

impl Default for CameraSession {
    fn default() -> Self {
        Self {
            camera_id: DEFAULT_CAMERA_ID.to_string(),
            address: DEFAULT_CAMERA_ADDRESS.to_string(),
            port: DEFAULT_CAMERA_PORT,
            protocol: StreamProtocol::Http,
            path: DEFAULT_STREAM_PATH.to_string(),
        }
    }
}

impl CameraSession {
    /// Stream URL, e.g. `http://192.168.1.100:4747/video`
    pub fn stream_url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!(
            "{}://{}:{}{}",
            self.protocol.as_str(),
            self.address,
            self.port,
            path
        )
    }
}

/// Session tunables
///
/// Every field is overridable; omitted fields keep the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub camera: CameraSession,
    /// Pipeline cadence and target capture rate
    pub capture_interval_ms: u64,
    /// Sustained violation required before an alert
    pub alert_delay_ms: u64,
    /// Minimum time between saved alert images
    pub capture_cooldown_ms: u64,
    /// Minimum time between created alert records
    pub alert_cooldown_ms: u64,
    /// Consecutive failed reads before a reconnect
    pub failure_threshold: u32,
    /// Wait after opening the stream, before the probe read
    pub settle_ms: u64,
    /// Wait between stop and start during a reconnect
    pub reconnect_delay_ms: u64,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub inference_timeout_ms: u64,
    pub persist_timeout_ms: u64,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            camera: CameraSession::default(),
            capture_interval_ms: 1000 / 15,
            alert_delay_ms: 3_000,
            capture_cooldown_ms: 2_000,
            alert_cooldown_ms: 5_000,
            failure_threshold: 5,
            settle_ms: 2_000,
            reconnect_delay_ms: 2_000,
            connect_timeout_ms: 5_000,
            read_timeout_ms: 5_000,
            inference_timeout_ms: 10_000,
            persist_timeout_ms: 5_000,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
        }
    }
}

impl SessionConfig {
    /// Default settings for a given camera endpoint
    pub fn for_camera(camera_id: &str, address: &str, port: u16) -> Self {
        Self {
            camera: CameraSession {
                camera_id: camera_id.to_string(),
                address: address.to_string(),
                port,
                ..CameraSession::default()
            },
            ..Self::default()
        }
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    pub fn alert_delay(&self) -> chrono::Duration {
        millis(self.alert_delay_ms)
    }

    pub fn capture_cooldown(&self) -> chrono::Duration {
        millis(self.capture_cooldown_ms)
    }

    pub fn alert_cooldown(&self) -> chrono::Duration {
        millis(self.alert_cooldown_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }

    /// Reject settings a session cannot run with
    pub fn validate(&self) -> Result<()> {
        if !is_valid_camera_id(&self.camera.camera_id) {
            return Err(Error::Config(format!(
                "camera_id must be 1-{} characters of [A-Za-z0-9_-]: {:?}",
                MAX_CAMERA_ID_LEN, self.camera.camera_id
            )));
        }
        if self.camera.address.trim().is_empty() {
            return Err(Error::Config("camera address must not be empty".to_string()));
        }
        if self.camera.port == 0 {
            return Err(Error::Config("camera port must be non-zero".to_string()));
        }
        if self.capture_interval_ms == 0 {
            return Err(Error::Config("capture_interval_ms must be non-zero".to_string()));
        }
        if self.failure_threshold == 0 {
            return Err(Error::Config("failure_threshold must be at least 1".to_string()));
        }
        if self.read_timeout_ms == 0 || self.inference_timeout_ms == 0 || self.persist_timeout_ms == 0 {
            return Err(Error::Config("timeouts must be non-zero".to_string()));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::Config(format!(
                "confidence_threshold out of range: {}",
                self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(Error::Config(format!(
                "iou_threshold out of range: {}",
                self.iou_threshold
            )));
        }
        Ok(())
    }
}

/// Camera ids become path segments and a VARCHAR(64) column
pub fn is_valid_camera_id(camera_id: &str) -> bool {
    !camera_id.is_empty()
        && camera_id.len() <= MAX_CAMERA_ID_LEN
        && camera_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn millis(ms: u64) -> chrono::Duration {
    chrono::Duration::milliseconds(ms as i64)
}
