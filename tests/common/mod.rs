//! Shared fakes for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use image::{Rgb, RgbImage};
use ppe_monitor::camera_session::{CameraSession, SessionConfig};
use ppe_monitor::detector::{BoundingBox, Detection, DetectionModel};
use ppe_monitor::error::{Error, Result};
use ppe_monitor::frame::Frame;
use ppe_monitor::frame_source::FrameSource;
use std::sync::{Arc, Mutex};

/// Camera that yields a grey frame on every read
#[derive(Default)]
pub struct FakeCamera {
    open: bool,
    refuse: bool,
}

impl FakeCamera {
    /// Camera whose connection is refused when `refuse` is set
    pub fn refusing(refuse: bool) -> Self {
        Self { open: false, refuse }
    }
}

#[async_trait]
impl FrameSource for FakeCamera {
    async fn open(&mut self, _camera: &CameraSession) -> Result<()> {
        if self.refuse {
            return Err(Error::Connection("connection refused".to_string()));
        }
        self.open = true;
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Frame>> {
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        Ok(Some(Frame::new(
            RgbImage::from_pixel(64, 48, Rgb([120, 120, 120])),
            Utc::now(),
        )))
    }

    fn release(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Model reporting whatever labels are currently set
#[derive(Clone, Default)]
pub struct SceneModel {
    labels: Arc<Mutex<Vec<&'static str>>>,
    failing: Arc<Mutex<bool>>,
}

impl SceneModel {
    pub fn set(&self, labels: &[&'static str]) {
        *self.labels.lock().unwrap() = labels.to_vec();
    }

    pub fn fail(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl DetectionModel for SceneModel {
    fn name(&self) -> &str {
        "scene"
    }

    async fn predict(&self, _frame: &Frame, _conf: f32, _iou: f32) -> Result<Vec<Detection>> {
        if *self.failing.lock().unwrap() {
            return Err(Error::Detection("model crashed".to_string()));
        }
        let bbox = BoundingBox { x1: 8.0, y1: 20.0, x2: 40.0, y2: 46.0 };
        Ok(self
            .labels
            .lock()
            .unwrap()
            .iter()
            .map(|l| Detection::new(*l, 0.8, bbox))
            .collect())
    }
}

/// Session settings with no settle or reconnect waits
pub fn fast_config(camera_id: &str) -> SessionConfig {
    let mut config = SessionConfig::for_camera(camera_id, "127.0.0.1", 4747);
    config.settle_ms = 0;
    config.reconnect_delay_ms = 0;
    config.capture_interval_ms = 10;
    config.read_timeout_ms = 200;
    config
}

pub fn test_frame() -> Frame {
    Frame::new(RgbImage::from_pixel(64, 48, Rgb([120, 120, 120])), Utc::now())
}
