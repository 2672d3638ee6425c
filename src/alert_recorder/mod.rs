//! AlertRecorder - Persists matured violations
//!
//! ## Responsibilities
//!
//! - Capture cooldown: at most one saved image per interval
//! - Database cooldown: at most one alert record per interval
//! - Image naming and alert message formatting
//! - Typed persistence faults (never propagated into the frame loop)
//!
//! The two cooldowns are independent and only advance on success.

use crate::alert_store::{AlertLevel, AlertRecord, AlertRepository, NewAlert};
use crate::camera_session::SessionConfig;
use crate::compliance::{join_display_names, RequiredItem};
use crate::frame::Frame;
use crate::image_store::ImageStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::time::timeout;

/// Base directory of alert captures inside the media directory
pub const ALERT_IMAGE_DIR: &str = "alertas";

/// Persistence failure for one alert
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PersistenceFault {
    #[error("image write failed: {0}")]
    Image(String),

    #[error("alert record failed: {0}")]
    Record(String),

    #[error("{target} write exceeded {}ms", .after.as_millis())]
    Timeout {
        target: &'static str,
        after: std::time::Duration,
    },
}

/// Result of one record attempt
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    /// Image saved and alert record created
    Recorded(AlertRecord),
    /// Image saved, record skipped by the database cooldown
    ImageOnly { image_ref: String },
    /// Capture cooldown active, nothing written
    Suppressed,
    Failed(PersistenceFault),
}

impl RecordOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordOutcome::Recorded(_) => "recorded",
            RecordOutcome::ImageOnly { .. } => "image_only",
            RecordOutcome::Suppressed => "suppressed",
            RecordOutcome::Failed(_) => "failed",
        }
    }
}

/// Alert message listing the missing items
pub fn alert_message(missing: &[RequiredItem]) -> String {
    format!("Persona sin {}", join_display_names(missing))
}

/// Relative image path for an alert capture
pub fn alert_image_path(camera_id: &str, missing: &[RequiredItem], now: DateTime<Utc>) -> String {
    let primary = missing
        .first()
        .map(|i| i.display_name().to_lowercase())
        .unwrap_or_else(|| "epp".to_string());
    format!(
        "{}/{}/alerta_{}_{}.jpg",
        ALERT_IMAGE_DIR,
        camera_id,
        now.format("%Y%m%d_%H%M%S"),
        primary
    )
}

/// AlertRecorder instance (one per session)
pub struct AlertRecorder {
    camera_id: String,
    images: Arc<dyn ImageStore>,
    repository: Arc<dyn AlertRepository>,
    capture_cooldown: Duration,
    alert_cooldown: Duration,
    persist_timeout: std::time::Duration,
    last_capture_at: Option<DateTime<Utc>>,
    last_alert_at: Option<DateTime<Utc>>,
}

impl AlertRecorder {
    pub fn new(
        config: &SessionConfig,
        images: Arc<dyn ImageStore>,
        repository: Arc<dyn AlertRepository>,
    ) -> Self {
        Self {
            camera_id: config.camera.camera_id.clone(),
            images,
            repository,
            capture_cooldown: config.capture_cooldown(),
            alert_cooldown: config.alert_cooldown(),
            persist_timeout: config.persist_timeout(),
            last_capture_at: None,
            last_alert_at: None,
        }
    }

    /// Persist one matured violation subject to both cooldowns
    pub async fn record(
        &mut self,
        frame: &Frame,
        message: &str,
        missing: &[RequiredItem],
        now: DateTime<Utc>,
    ) -> RecordOutcome {
        if !elapsed(self.last_capture_at, now, self.capture_cooldown) {
            tracing::debug!(camera_id = %self.camera_id, "Capture cooldown active, alert suppressed");
            return RecordOutcome::Suppressed;
        }

        let image_ref = match self.save_image(frame, missing, now).await {
            Ok(image_ref) => image_ref,
            Err(fault) => return self.fail(fault),
        };
        self.last_capture_at = Some(now);

        if !elapsed(self.last_alert_at, now, self.alert_cooldown) {
            tracing::debug!(
                camera_id = %self.camera_id,
                image_ref = %image_ref,
                "Database cooldown active, image saved without record"
            );
            return RecordOutcome::ImageOnly { image_ref };
        }

        let alert = NewAlert {
            camera_id: self.camera_id.clone(),
            message: message.to_string(),
            missing: missing
                .iter()
                .map(|i| i.display_name())
                .collect::<Vec<_>>()
                .join(","),
            level: AlertLevel::High,
            image_ref: Some(image_ref),
            created_at: now,
        };

        let id = match timeout(self.persist_timeout, self.repository.create_alert(&alert)).await {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => return self.fail(PersistenceFault::Record(e.to_string())),
            Err(_) => {
                return self.fail(PersistenceFault::Timeout {
                    target: "record",
                    after: self.persist_timeout,
                })
            }
        };
        self.last_alert_at = Some(now);

        tracing::warn!(
            camera_id = %self.camera_id,
            alert_id = id,
            message = %alert.message,
            "PPE alert recorded"
        );
        RecordOutcome::Recorded(alert.into_record(id))
    }

    async fn save_image(
        &self,
        frame: &Frame,
        missing: &[RequiredItem],
        now: DateTime<Utc>,
    ) -> std::result::Result<String, PersistenceFault> {
        let data = frame
            .to_jpeg()
            .map_err(|e| PersistenceFault::Image(e.to_string()))?;
        let relative = alert_image_path(&self.camera_id, missing, now);

        match timeout(self.persist_timeout, self.images.save(&relative, &data)).await {
            Ok(Ok(image_ref)) => Ok(image_ref),
            Ok(Err(e)) => Err(PersistenceFault::Image(e.to_string())),
            Err(_) => Err(PersistenceFault::Timeout {
                target: "image",
                after: self.persist_timeout,
            }),
        }
    }

    fn fail(&self, fault: PersistenceFault) -> RecordOutcome {
        tracing::error!(camera_id = %self.camera_id, error = %fault, "Failed to persist alert");
        RecordOutcome::Failed(fault)
    }

    pub fn last_capture_at(&self) -> Option<DateTime<Utc>> {
        self.last_capture_at
    }

    pub fn last_alert_at(&self) -> Option<DateTime<Utc>> {
        self.last_alert_at
    }
}

fn elapsed(last: Option<DateTime<Utc>>, now: DateTime<Utc>, cooldown: Duration) -> bool {
    match last {
        Some(last) => now - last >= cooldown,
        None => true,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::alert_store::{
        AlertQuery, AlertResolution, AlertStatistics, MemoryAlertRepository,
    };
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use image::RgbImage;
    use std::sync::Mutex;

    /// Image store keeping writes in memory
    #[derive(Default)]
    pub struct MemoryImageStore {
        pub saved: Mutex<Vec<String>>,
        pub fail: bool,
    }

    #[async_trait]
    impl ImageStore for MemoryImageStore {
        async fn save(&self, relative: &str, _data: &[u8]) -> Result<String> {
            if self.fail {
                return Err(Error::Io(std::io::Error::other("disk full")));
            }
            self.saved.lock().unwrap().push(relative.to_string());
            Ok(relative.to_string())
        }
    }

    struct FailingRepository;

    #[async_trait]
    impl AlertRepository for FailingRepository {
        async fn create_alert(&self, _alert: &NewAlert) -> Result<u64> {
            Err(Error::Sqlx(sqlx::Error::PoolTimedOut))
        }
        async fn get_alert(&self, _id: u64) -> Result<Option<AlertRecord>> {
            Ok(None)
        }
        async fn list_alerts(&self, _query: &AlertQuery) -> Result<Vec<AlertRecord>> {
            Ok(Vec::new())
        }
        async fn resolve_alert(&self, id: u64, _r: &AlertResolution) -> Result<AlertRecord> {
            Err(Error::NotFound(id.to_string()))
        }
        async fn statistics(&self, _since: DateTime<Utc>) -> Result<AlertStatistics> {
            Ok(AlertStatistics::default())
        }
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn frame() -> Frame {
        Frame::new(RgbImage::from_pixel(8, 8, image::Rgb([0, 0, 0])), at(0))
    }

    fn recorder(
        images: Arc<dyn ImageStore>,
        repository: Arc<dyn AlertRepository>,
    ) -> AlertRecorder {
        AlertRecorder::new(&SessionConfig::for_camera("cam1", "10.0.0.2", 4747), images, repository)
    }

    const BOOTS: [RequiredItem; 1] = [RequiredItem::Boots];

    #[test]
    fn test_message_and_path() {
        let missing = [RequiredItem::Helmet, RequiredItem::Boots];
        assert_eq!(alert_message(&missing), "Persona sin Casco, Botas");
        assert_eq!(
            alert_image_path("cam1", &missing, at(0)),
            "alertas/cam1/alerta_20240301_080000_casco.jpg"
        );
    }

    #[tokio::test]
    async fn test_first_alert_is_recorded() {
        let images = Arc::new(MemoryImageStore::default());
        let repo = Arc::new(MemoryAlertRepository::default());
        let mut recorder = recorder(images.clone(), repo.clone());

        let outcome = recorder.record(&frame(), &alert_message(&BOOTS), &BOOTS, at(3_100)).await;
        let RecordOutcome::Recorded(record) = outcome else {
            panic!("expected record, got {:?}", outcome);
        };
        assert_eq!(record.message, "Persona sin Botas");
        assert_eq!(record.missing, "Botas");
        assert_eq!(record.level, AlertLevel::High);
        assert_eq!(
            record.image_ref.as_deref(),
            Some("alertas/cam1/alerta_20240301_080003_botas.jpg")
        );
        assert_eq!(repo.count().await, 1);
        assert_eq!(images.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_capture_cooldown_suppresses() {
        let images = Arc::new(MemoryImageStore::default());
        let repo = Arc::new(MemoryAlertRepository::default());
        let mut recorder = recorder(images.clone(), repo.clone());
        let message = alert_message(&BOOTS);

        recorder.record(&frame(), &message, &BOOTS, at(0)).await;
        let outcome = recorder.record(&frame(), &message, &BOOTS, at(1_500)).await;
        assert!(matches!(outcome, RecordOutcome::Suppressed));
        assert_eq!(images.saved.lock().unwrap().len(), 1);
        assert_eq!(repo.count().await, 1);
    }

    #[tokio::test]
    async fn test_cooldowns_are_independent() {
        let images = Arc::new(MemoryImageStore::default());
        let repo = Arc::new(MemoryAlertRepository::default());
        let mut recorder = recorder(images.clone(), repo.clone());
        let message = alert_message(&BOOTS);

        // Alerts matured at t=3.1s and t=6.3s
        assert!(matches!(
            recorder.record(&frame(), &message, &BOOTS, at(3_100)).await,
            RecordOutcome::Recorded(_)
        ));
        let second = recorder.record(&frame(), &message, &BOOTS, at(6_300)).await;
        assert!(matches!(second, RecordOutcome::ImageOnly { .. }));

        // 1.9s after the last image: capture cooldown still active
        assert!(matches!(
            recorder.record(&frame(), &message, &BOOTS, at(8_200)).await,
            RecordOutcome::Suppressed
        ));
        assert_eq!(images.saved.lock().unwrap().len(), 2);

        // Both cooldowns elapsed
        assert!(matches!(
            recorder.record(&frame(), &message, &BOOTS, at(8_300)).await,
            RecordOutcome::Recorded(_)
        ));

        assert_eq!(images.saved.lock().unwrap().len(), 3);
        assert_eq!(repo.count().await, 2);
    }

    #[tokio::test]
    async fn test_image_failure_writes_nothing() {
        let images = Arc::new(MemoryImageStore {
            fail: true,
            ..MemoryImageStore::default()
        });
        let repo = Arc::new(MemoryAlertRepository::default());
        let mut recorder = recorder(images, repo.clone());

        let outcome = recorder.record(&frame(), "Persona sin Botas", &BOOTS, at(0)).await;
        assert!(matches!(outcome, RecordOutcome::Failed(PersistenceFault::Image(_))));
        assert_eq!(repo.count().await, 0);
        assert!(recorder.last_capture_at().is_none());
    }

    #[tokio::test]
    async fn test_record_failure_keeps_alert_cooldown_open() {
        let images = Arc::new(MemoryImageStore::default());
        let mut recorder = recorder(images.clone(), Arc::new(FailingRepository));

        let outcome = recorder.record(&frame(), "Persona sin Botas", &BOOTS, at(0)).await;
        assert!(matches!(outcome, RecordOutcome::Failed(PersistenceFault::Record(_))));
        assert_eq!(recorder.last_capture_at(), Some(at(0)));
        assert!(recorder.last_alert_at().is_none());
    }
}
