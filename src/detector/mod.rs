//! Detector - Object detection adapter
//!
//! ## Responsibilities
//!
//! - `DetectionModel` seam for the external detection model
//! - Fixed confidence / IoU thresholds per session
//! - Label normalization
//! - Fault isolation: a failing or slow model yields an empty result plus a
//!   typed `DetectionFault`, never an error that aborts the cycle

mod http_model;

pub use http_model::HttpDetectionModel;

use crate::error::Result;
use crate::frame::Frame;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default confidence threshold
pub const DEFAULT_CONFIDENCE: f32 = 0.25;
/// Default IoU (NMS) threshold
pub const DEFAULT_IOU: f32 = 0.45;

/// Bounding box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// One detected object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// Detections for one frame, in model order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.detections.iter().any(|d| d.label == label)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.detections.iter().map(|d| d.label.as_str()).collect()
    }
}

/// External detection model
#[async_trait]
pub trait DetectionModel: Send + Sync {
    /// Model identifier for logs
    fn name(&self) -> &str;

    async fn predict(
        &self,
        frame: &Frame,
        confidence_threshold: f32,
        iou_threshold: f32,
    ) -> Result<Vec<Detection>>;
}

/// Per-frame detection failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectionFault {
    #[error("model error: {0}")]
    Model(String),

    #[error("inference exceeded {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// Adapter output: always a usable result, plus the fault if one occurred
#[derive(Debug, Clone)]
pub struct DetectorOutput {
    pub result: DetectionResult,
    pub fault: Option<DetectionFault>,
}

impl DetectorOutput {
    fn ok(result: DetectionResult) -> Self {
        Self { result, fault: None }
    }

    fn faulted(fault: DetectionFault) -> Self {
        Self {
            result: DetectionResult::empty(),
            fault: Some(fault),
        }
    }

    pub fn is_fault(&self) -> bool {
        self.fault.is_some()
    }
}

/// DetectorAdapter instance
pub struct DetectorAdapter {
    model: Arc<dyn DetectionModel>,
    confidence_threshold: f32,
    iou_threshold: f32,
    timeout: Duration,
}

impl DetectorAdapter {
    pub fn new(
        model: Arc<dyn DetectionModel>,
        confidence_threshold: f32,
        iou_threshold: f32,
        timeout: Duration,
    ) -> Self {
        Self {
            model,
            confidence_threshold,
            iou_threshold,
            timeout,
        }
    }

    /// Run the model on one frame
    pub async fn detect(&self, frame: &Frame) -> DetectorOutput {
        let call = self
            .model
            .predict(frame, self.confidence_threshold, self.iou_threshold);

        let fault = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(raw)) => return DetectorOutput::ok(self.normalize(raw)),
            Ok(Err(e)) => DetectionFault::Model(e.to_string()),
            Err(_) => DetectionFault::Timeout(self.timeout),
        };

        tracing::error!(model = %self.model.name(), fault = %fault, "Detection failed");
        DetectorOutput::faulted(fault)
    }

    /// Lowercase/trim labels and drop anything under the confidence threshold
    fn normalize(&self, raw: Vec<Detection>) -> DetectionResult {
        let detections = raw
            .into_iter()
            .filter(|d| d.confidence >= self.confidence_threshold)
            .map(|mut d| {
                d.label = d.label.trim().to_lowercase();
                d
            })
            .collect();
        DetectionResult::new(detections)
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn iou_threshold(&self) -> f32 {
        self.iou_threshold
    }
}
