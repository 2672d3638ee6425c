//! HttpDetectionModel - Inference server adapter
//!
//! Posts the frame as a JPEG multipart upload and parses the detection list:
//!
//! ```text
//! POST {base_url}/predict
//!   image=<frame.jpg> conf=<f32> iou=<f32> model=<name>
//!
//! {"detections": [{"label": "human", "confidence": 0.91, "bbox": [x1, y1, x2, y2]}]}
//! ```

use super::{BoundingBox, Detection, DetectionModel};
use crate::error::{Error, Result};
use crate::frame::Frame;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    detections: Vec<RawDetection>,
}

#[derive(Debug, Deserialize)]
struct RawDetection {
    label: String,
    confidence: f32,
    bbox: [f32; 4],
}

impl From<RawDetection> for Detection {
    fn from(raw: RawDetection) -> Self {
        let [x1, y1, x2, y2] = raw.bbox;
        Detection::new(raw.label, raw.confidence, BoundingBox { x1, y1, x2, y2 })
    }
}

/// HttpDetectionModel instance
pub struct HttpDetectionModel {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpDetectionModel {
    /// Create the model client
    ///
    /// # Arguments
    /// * `base_url` - Inference server URL (e.g., http://localhost:9000)
    /// * `model` - Model name sent with every request
    /// * `model_path` - Weights file that must exist locally, if configured
    /// * `timeout` - HTTP request timeout
    ///
    /// Any problem here is a configuration fault.
    pub fn new(
        base_url: &str,
        model: &str,
        model_path: Option<&Path>,
        timeout: Duration,
    ) -> Result<Self> {
        reqwest::Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid detector URL {}: {}", base_url, e)))?;

        if model.trim().is_empty() {
            return Err(Error::Config("model name must not be empty".to_string()));
        }

        if let Some(path) = model_path {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "model file not found: {}",
                    path.display()
                )));
            }
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client build failed: {}", e)))?;

        tracing::info!(base_url = %base_url, model = %model, "Detection model configured");

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    /// Check inference server health
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/healthz", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

#[async_trait]
impl DetectionModel for HttpDetectionModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn predict(
        &self,
        frame: &Frame,
        confidence_threshold: f32,
        iou_threshold: f32,
    ) -> Result<Vec<Detection>> {
        let url = format!("{}/predict", self.base_url);
        let jpeg = frame.to_jpeg()?;

        let form = Form::new()
            .part(
                "image",
                Part::bytes(jpeg)
                    .file_name("frame.jpg")
                    .mime_str("image/jpeg")?,
            )
            .text("conf", confidence_threshold.to_string())
            .text("iou", iou_threshold.to_string())
            .text("model", self.model.clone());

        let resp = self.client.post(&url).multipart(form).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Detection(format!(
                "inference failed: {} - {}",
                status, body
            )));
        }

        let parsed: PredictResponse = resp.json().await?;
        Ok(parsed.detections.into_iter().map(Detection::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_is_config_error() {
        let result = HttpDetectionModel::new("not a url", "ppe", None, Duration::from_secs(1));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_model_file_is_config_error() {
        let result = HttpDetectionModel::new(
            "http://localhost:9000",
            "ppe",
            Some(Path::new("/nonexistent/best.pt")),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("best.pt")));
    }

    #[test]
    fn test_existing_model_file_accepted() {
        let weights = tempfile::NamedTempFile::new().unwrap();
        let model = HttpDetectionModel::new(
            "http://localhost:9000/",
            "ppe",
            Some(weights.path()),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(model.name(), "ppe");
        assert_eq!(model.base_url, "http://localhost:9000");
    }

    #[test]
    fn test_parse_predict_response() {
        let json = r#"{"detections":[{"label":"human","confidence":0.91,"bbox":[10,20,110,220]}]}"#;
        let parsed: PredictResponse = serde_json::from_str(json).unwrap();
        let detections: Vec<Detection> = parsed.detections.into_iter().map(Detection::from).collect();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "human");
        assert_eq!(detections[0].bbox.y2, 220.0);
    }

    #[test]
    fn test_missing_detections_field_is_empty() {
        let parsed: PredictResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.detections.is_empty());
    }
}
