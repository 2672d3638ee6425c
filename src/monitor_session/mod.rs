//! MonitorSession - Per-camera compliance pipeline
//!
//! ## Responsibilities
//!
//! - Owns all mutable state of one camera session (connection, failure
//!   counter, pending violation, cooldown timestamps)
//! - One sequential cycle per frame: detect, evaluate, debounce, record,
//!   annotate, encode, publish
//! - Latest encoded frame for streaming consumers (watch channel)
//! - Stop releases the connection and drops pending state
//!
//! ## Cycle
//!
//! ```text
//! read_frame ──> detect ──fault──> publish raw frame
//!                  │
//!                  └──> evaluate ──> debounce ──alert──> record
//!                                       │
//!                                       └──> annotate ──> publish
//! ```

mod annotate;

use crate::alert_recorder::{alert_message, AlertRecorder, RecordOutcome};
use crate::alert_store::AlertRepository;
use crate::camera_session::SessionConfig;
use crate::compliance::{evaluate, ComplianceStatus};
use crate::connection_supervisor::{
    ConnectionEvent, ConnectionStatus, ConnectionSupervisor, SupervisorConfig,
};
use crate::debounce::{AlertDebouncer, DebouncePhase, Transition};
use crate::detector::{DetectionFault, DetectionModel, DetectionResult, DetectorAdapter};
use crate::error::{Error, Result};
use crate::frame::{encode_jpeg, Frame};
use crate::frame_source::{FrameSource, MjpegFrameSource};
use crate::image_store::ImageStore;
use axum::body::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Externally visible session state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub camera_id: String,
    pub stream_url: String,
    pub running: bool,
    pub connection: ConnectionStatus,
    pub phase: DebouncePhase,
    /// Time left before a pending violation matures
    pub remaining_ms: Option<i64>,
    pub frames_processed: u64,
    pub alerts_recorded: u64,
    pub consecutive_failures: u32,
    pub reconnects: u64,
    pub connection_losses: u64,
    pub last_connection_event: Option<ConnectionEvent>,
    pub last_alert_at: Option<DateTime<Utc>>,
    pub last_fault: Option<String>,
}

/// What happened in one cycle
#[derive(Debug)]
pub struct CycleReport {
    pub detections: DetectionResult,
    /// `None` when detection failed
    pub compliance: Option<ComplianceStatus>,
    pub transition: Option<Transition>,
    pub outcome: Option<RecordOutcome>,
    pub fault: Option<DetectionFault>,
}

/// MonitorSession instance
pub struct MonitorSession {
    config: SessionConfig,
    supervisor: ConnectionSupervisor,
    detector: DetectorAdapter,
    debouncer: AlertDebouncer,
    recorder: AlertRecorder,
    latest: watch::Sender<Option<Bytes>>,
    status: watch::Sender<SessionStatus>,
    frames_processed: u64,
    alerts_recorded: u64,
    last_fault: Option<String>,
}

impl MonitorSession {
    /// Build a session reading the camera's MJPEG stream
    pub fn new(
        config: SessionConfig,
        model: Arc<dyn DetectionModel>,
        repository: Arc<dyn AlertRepository>,
        images: Arc<dyn ImageStore>,
    ) -> Result<Self> {
        config.validate()?;
        let source = MjpegFrameSource::new(config.connect_timeout(), config.capture_interval())?;
        Self::with_source(config, Box::new(source), model, repository, images)
    }

    /// Build a session on an explicit frame source
    pub fn with_source(
        config: SessionConfig,
        source: Box<dyn FrameSource>,
        model: Arc<dyn DetectionModel>,
        repository: Arc<dyn AlertRepository>,
        images: Arc<dyn ImageStore>,
    ) -> Result<Self> {
        config.validate()?;

        let supervisor = ConnectionSupervisor::new(
            config.camera.clone(),
            source,
            SupervisorConfig::from(&config),
        );
        let detector = DetectorAdapter::new(
            model,
            config.confidence_threshold,
            config.iou_threshold,
            config.inference_timeout(),
        );
        let debouncer = AlertDebouncer::new(config.alert_delay());
        let recorder = AlertRecorder::new(&config, images, repository);

        let (latest, _) = watch::channel(None);
        let (status, _) = watch::channel(SessionStatus {
            camera_id: config.camera.camera_id.clone(),
            stream_url: config.camera.stream_url(),
            running: false,
            connection: ConnectionStatus::Unknown,
            phase: DebouncePhase::Idle,
            remaining_ms: None,
            frames_processed: 0,
            alerts_recorded: 0,
            consecutive_failures: 0,
            reconnects: 0,
            connection_losses: 0,
            last_connection_event: None,
            last_alert_at: None,
            last_fault: None,
        });

        Ok(Self {
            config,
            supervisor,
            detector,
            debouncer,
            recorder,
            latest,
            status,
            frames_processed: 0,
            alerts_recorded: 0,
            last_fault: None,
        })
    }

    pub fn camera_id(&self) -> &str {
        &self.config.camera.camera_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open the camera connection
    pub async fn start(&mut self) -> Result<()> {
        let result = self.supervisor.start().await;
        self.publish_status(Utc::now(), true);
        result
    }

    /// Release the connection and forget pending state
    pub fn stop(&mut self) {
        self.supervisor.stop();
        self.debouncer.reset();
        self.latest.send_replace(None);
        self.publish_status(Utc::now(), false);
    }

    /// Latest encoded (annotated) JPEG; `None` means temporarily unavailable
    pub fn latest_encoded_frame(&self) -> Option<Bytes> {
        self.latest.borrow().clone()
    }

    pub fn subscribe_frames(&self) -> watch::Receiver<Option<Bytes>> {
        self.latest.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Run one pipeline cycle on a frame
    pub async fn process_frame(&mut self, frame: Frame, now: DateTime<Utc>) -> CycleReport {
        self.frames_processed += 1;
        let output = self.detector.detect(&frame).await;

        if let Some(fault) = output.fault {
            self.last_fault = Some(fault.to_string());
            let encoded = encode_frame(self.camera_id(), frame, None).await;
            self.publish_frame(encoded);
            self.publish_status(now, true);
            return CycleReport {
                detections: output.result,
                compliance: None,
                transition: None,
                outcome: None,
                fault: Some(fault),
            };
        }

        let compliance = evaluate(&output.result);
        let transition = self.debouncer.step(&compliance, &frame, now);

        let outcome = match &transition {
            Transition::Alerted(pending) => {
                let message = alert_message(&pending.missing);
                let outcome = self
                    .recorder
                    .record(&pending.frame, &message, &pending.missing, now)
                    .await;
                if matches!(outcome, RecordOutcome::Recorded(_)) {
                    self.alerts_recorded += 1;
                }
                if let RecordOutcome::Failed(fault) = &outcome {
                    self.last_fault = Some(fault.to_string());
                }
                Some(outcome)
            }
            _ => None,
        };

        let progress = self.debouncer.remaining(now).map(|left| {
            let delay = self.debouncer.delay().num_milliseconds().max(1) as f32;
            1.0 - left.num_milliseconds() as f32 / delay
        });
        let annotation = (output.result.clone(), compliance.clone(), progress);
        let encoded = encode_frame(self.camera_id(), frame, Some(annotation)).await;
        self.publish_frame(encoded);
        self.publish_status(now, true);

        CycleReport {
            detections: output.result,
            compliance: Some(compliance),
            transition: Some(transition),
            outcome,
            fault: None,
        }
    }

    /// Capture loop until `shutdown` turns true (or its sender is dropped)
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.capture_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(camera_id = %self.camera_id(), "Monitor loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            let frame = tokio::select! {
                _ = shutdown.changed() => break,
                frame = self.supervisor.read_frame() => frame,
            };

            match frame {
                Some(frame) => {
                    self.process_frame(frame, Utc::now()).await;
                }
                None => {
                    self.latest.send_replace(None);
                    self.publish_status(Utc::now(), true);
                }
            }
        }

        self.stop();
        tracing::info!(camera_id = %self.camera_id(), "Monitor loop stopped");
    }

    fn publish_frame(&self, encoded: Option<Bytes>) {
        if let Some(jpeg) = encoded {
            self.latest.send_replace(Some(jpeg));
        }
    }

    fn publish_status(&self, now: DateTime<Utc>, running: bool) {
        let status = SessionStatus {
            camera_id: self.config.camera.camera_id.clone(),
            stream_url: self.config.camera.stream_url(),
            running,
            connection: self.supervisor.status(),
            phase: self.debouncer.phase(),
            remaining_ms: self.debouncer.remaining(now).map(|d| d.num_milliseconds()),
            frames_processed: self.frames_processed,
            alerts_recorded: self.alerts_recorded,
            consecutive_failures: self.supervisor.consecutive_failures(),
            reconnects: self.supervisor.reconnects(),
            connection_losses: self.supervisor.connection_losses(),
            last_connection_event: self.supervisor.last_event(),
            last_alert_at: self.recorder.last_alert_at(),
            last_fault: self.last_fault.clone(),
        };
        self.status.send_replace(status);
    }
}

/// Encode a frame off the async runtime (annotated when detections are given)
async fn encode_frame(
    camera_id: &str,
    frame: Frame,
    annotation: Option<(DetectionResult, ComplianceStatus, Option<f32>)>,
) -> Option<Bytes> {
    let encoded = tokio::task::spawn_blocking(move || match annotation {
        Some((detections, compliance, progress)) => {
            let image = annotate::render(frame.image(), &detections, &compliance, progress);
            encode_jpeg(&image)
        }
        None => frame.to_jpeg(),
    })
    .await
    .map_err(|e| Error::Internal(e.to_string()))
    .and_then(|r| r);

    match encoded {
        Ok(jpeg) => Some(Bytes::from(jpeg)),
        Err(e) => {
            tracing::error!(camera_id = %camera_id, error = %e, "Failed to encode frame");
            None
        }
    }
}
