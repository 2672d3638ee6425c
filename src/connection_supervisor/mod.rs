//! ConnectionSupervisor - Keeps one camera stream alive
//!
//! ## Responsibilities
//!
//! - start / stop / health of the single live connection of a session
//! - Probe read after a settle interval on every start
//! - Consecutive read failure counting (invalid frames included)
//! - Automatic stop/settle/start reconnect at the failure threshold
//! - Lost/Recovered transition logging
//!
//! Failures never escape as errors from `read_frame`: an unavailable camera
//! is reported as `None`.

use crate::camera_session::{CameraSession, SessionConfig};
use crate::error::{Error, Result};
use crate::frame::{is_valid_frame, Frame};
use crate::frame_source::FrameSource;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;

/// Camera connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Never connected
    Unknown,
    Online,
    Offline,
}

/// Connection status transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// Went from Online (or Unknown) to Offline
    Lost,
    /// Went from Offline to Online
    Recovered,
}

/// Timing and threshold settings
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub failure_threshold: u32,
    pub settle: Duration,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl From<&SessionConfig> for SupervisorConfig {
    fn from(config: &SessionConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            settle: config.settle(),
            reconnect_delay: config.reconnect_delay(),
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
        }
    }
}

/// ConnectionSupervisor instance
pub struct ConnectionSupervisor {
    camera: CameraSession,
    source: Box<dyn FrameSource>,
    config: SupervisorConfig,
    running: bool,
    consecutive_failures: u32,
    reconnects: u64,
    status: ConnectionStatus,
    last_event: Option<ConnectionEvent>,
    losses: u64,
}

impl ConnectionSupervisor {
    pub fn new(camera: CameraSession, source: Box<dyn FrameSource>, config: SupervisorConfig) -> Self {
        Self {
            camera,
            source,
            config,
            running: false,
            consecutive_failures: 0,
            reconnects: 0,
            status: ConnectionStatus::Unknown,
            last_event: None,
            losses: 0,
        }
    }

    /// Open the stream, settle, and verify it with one probe read
    pub async fn start(&mut self) -> Result<()> {
        self.running = false;
        self.source.release();

        let opened = timeout(self.config.connect_timeout, self.source.open(&self.camera)).await;
        match opened {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(self.fail_start(e)),
            Err(_) => {
                let e = Error::Timeout(format!(
                    "connect to {} exceeded {}ms",
                    self.camera.stream_url(),
                    self.config.connect_timeout.as_millis()
                ));
                return Err(self.fail_start(e));
            }
        }

        tokio::time::sleep(self.config.settle).await;

        match self.bounded_read().await {
            Ok(Some(frame)) if is_valid_frame(Some(&frame)) => {
                self.running = true;
                self.consecutive_failures = 0;
                self.update_status(ConnectionStatus::Online);
                tracing::info!(
                    camera_id = %self.camera.camera_id,
                    width = frame.width(),
                    height = frame.height(),
                    "Camera stream initialized"
                );
                Ok(())
            }
            Ok(_) => Err(self.fail_start(Error::InvalidFrame(
                "probe read returned no usable frame".to_string(),
            ))),
            Err(e) => Err(self.fail_start(e)),
        }
    }

    /// Release the connection (idempotent)
    pub fn stop(&mut self) {
        let was_running = self.running;
        self.running = false;
        self.consecutive_failures = 0;
        self.source.release();
        if was_running {
            tracing::info!(camera_id = %self.camera.camera_id, "Camera stream stopped");
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.running && self.source.is_open()
    }

    /// Read one validated frame
    ///
    /// Reconnects first when no connection is open, and after the failure
    /// threshold is reached.
    pub async fn read_frame(&mut self) -> Option<Frame> {
        if !self.is_healthy() {
            tracing::warn!(camera_id = %self.camera.camera_id, "Camera unavailable, attempting to connect");
            if let Err(e) = self.start().await {
                tracing::warn!(camera_id = %self.camera.camera_id, error = %e, "Camera connect failed");
                return None;
            }
        }

        let outcome = self.bounded_read().await;
        match outcome {
            Ok(Some(frame)) if is_valid_frame(Some(&frame)) => {
                self.consecutive_failures = 0;
                self.update_status(ConnectionStatus::Online);
                Some(frame)
            }
            other => {
                self.consecutive_failures += 1;
                let reason = match other {
                    Err(e) => e.to_string(),
                    _ => "invalid frame".to_string(),
                };
                tracing::warn!(
                    camera_id = %self.camera.camera_id,
                    failures = self.consecutive_failures,
                    reason = %reason,
                    "Frame read failed"
                );

                if self.consecutive_failures >= self.config.failure_threshold {
                    tracing::error!(
                        camera_id = %self.camera.camera_id,
                        threshold = self.config.failure_threshold,
                        "Max consecutive read failures reached, reconnecting"
                    );
                    self.reconnect().await;
                }
                None
            }
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Number of threshold-triggered reconnect cycles
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Most recent Lost/Recovered transition
    pub fn last_event(&self) -> Option<ConnectionEvent> {
        self.last_event
    }

    /// Number of Lost transitions
    pub fn connection_losses(&self) -> u64 {
        self.losses
    }

    pub fn camera(&self) -> &CameraSession {
        &self.camera
    }

    async fn reconnect(&mut self) {
        self.reconnects += 1;
        self.stop();
        tokio::time::sleep(self.config.reconnect_delay).await;

        match self.start().await {
            Ok(()) => {
                tracing::info!(
                    camera_id = %self.camera.camera_id,
                    reconnects = self.reconnects,
                    "Camera reconnected"
                );
            }
            Err(e) => {
                tracing::error!(camera_id = %self.camera.camera_id, error = %e, "Camera reconnect failed");
            }
        }
    }

    async fn bounded_read(&mut self) -> Result<Option<Frame>> {
        match timeout(self.config.read_timeout, self.source.read()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "no frame within {}ms",
                self.config.read_timeout.as_millis()
            ))),
        }
    }

    /// Release a partially opened handle and report the failure
    fn fail_start(&mut self, error: Error) -> Error {
        self.running = false;
        self.source.release();
        self.update_status(ConnectionStatus::Offline);
        tracing::error!(camera_id = %self.camera.camera_id, error = %error, "Camera start failed");
        error
    }

    fn update_status(&mut self, new_status: ConnectionStatus) {
        let prev = self.status;
        self.status = new_status;

        match (prev, new_status) {
            (ConnectionStatus::Online, ConnectionStatus::Offline)
            | (ConnectionStatus::Unknown, ConnectionStatus::Offline) => {
                tracing::warn!(camera_id = %self.camera.camera_id, "Camera connection lost");
                self.losses += 1;
                self.last_event = Some(ConnectionEvent::Lost);
            }
            (ConnectionStatus::Offline, ConnectionStatus::Online) => {
                tracing::info!(camera_id = %self.camera.camera_id, "Camera connection recovered");
                self.last_event = Some(ConnectionEvent::Recovered);
            }
            _ => {}
        }
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.source.release();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use image::RgbImage;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted read result
    pub(crate) enum Step {
        Frame,
        Empty,
        ZeroSized,
        Fail,
        Hang,
    }

    #[derive(Default)]
    pub(crate) struct SourceLog {
        pub opens: u32,
        pub releases: u32,
        pub reads: u32,
    }

    /// FrameSource driven by scripted steps; out of steps means a good frame
    pub(crate) struct ScriptedSource {
        pub steps: Arc<Mutex<VecDeque<Step>>>,
        pub open_failures: Arc<Mutex<u32>>,
        pub log: Arc<Mutex<SourceLog>>,
        open: bool,
    }

    impl ScriptedSource {
        pub fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Arc::new(Mutex::new(steps.into())),
                open_failures: Arc::new(Mutex::new(0)),
                log: Arc::new(Mutex::new(SourceLog::default())),
                open: false,
            }
        }
    }

    pub(crate) fn test_frame() -> Frame {
        Frame::new(RgbImage::new(8, 6), Utc::now())
    }

    #[async_trait]
    impl FrameSource for ScriptedSource {
        async fn open(&mut self, _camera: &CameraSession) -> Result<()> {
            self.log.lock().unwrap().opens += 1;
            let mut failures = self.open_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(Error::Connection("refused".to_string()));
            }
            self.open = true;
            Ok(())
        }

        async fn read(&mut self) -> Result<Option<Frame>> {
            self.log.lock().unwrap().reads += 1;
            let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Frame);
            match step {
                Step::Frame => Ok(Some(test_frame())),
                Step::Empty => Ok(None),
                Step::ZeroSized => Ok(Some(Frame::new(RgbImage::new(0, 0), Utc::now()))),
                Step::Fail => Err(Error::Connection("read error".to_string())),
                Step::Hang => futures::future::pending().await,
            }
        }

        fn release(&mut self) {
            self.log.lock().unwrap().releases += 1;
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    pub(crate) fn fast_config() -> SupervisorConfig {
        SupervisorConfig {
            failure_threshold: 5,
            settle: Duration::ZERO,
            reconnect_delay: Duration::ZERO,
            connect_timeout: Duration::from_millis(200),
            read_timeout: Duration::from_millis(50),
        }
    }

    fn supervisor(source: ScriptedSource) -> ConnectionSupervisor {
        ConnectionSupervisor::new(CameraSession::default(), Box::new(source), fast_config())
    }

    #[tokio::test]
    async fn test_start_success() {
        let source = ScriptedSource::new(vec![]);
        let log = source.log.clone();
        let mut sup = supervisor(source);

        sup.start().await.unwrap();
        assert!(sup.is_healthy());
        assert_eq!(sup.status(), ConnectionStatus::Online);
        assert_eq!(log.lock().unwrap().opens, 1);
        // probe read
        assert_eq!(log.lock().unwrap().reads, 1);
    }

    #[tokio::test]
    async fn test_start_fails_on_invalid_probe() {
        let source = ScriptedSource::new(vec![Step::ZeroSized]);
        let log = source.log.clone();
        let mut sup = supervisor(source);

        let result = sup.start().await;
        assert!(matches!(result, Err(Error::InvalidFrame(_))));
        assert!(!sup.is_healthy());
        assert_eq!(sup.status(), ConnectionStatus::Offline);
        // released before open and again after the failed probe
        assert!(log.lock().unwrap().releases >= 2);
    }

    #[tokio::test]
    async fn test_start_fails_on_empty_probe() {
        let mut sup = supervisor(ScriptedSource::new(vec![Step::Empty]));
        assert!(sup.start().await.is_err());
        assert!(!sup.is_healthy());
    }

    #[tokio::test]
    async fn test_start_fails_when_open_refused() {
        let source = ScriptedSource::new(vec![]);
        *source.open_failures.lock().unwrap() = 1;
        let mut sup = supervisor(source);

        assert!(matches!(sup.start().await, Err(Error::Connection(_))));
        assert!(!sup.is_healthy());
    }

    #[tokio::test]
    async fn test_success_resets_failure_counter() {
        let steps = vec![Step::Frame, Step::Fail, Step::Fail, Step::Fail, Step::Fail, Step::Frame];
        let mut sup = supervisor(ScriptedSource::new(steps));
        sup.start().await.unwrap();

        for _ in 0..4 {
            assert!(sup.read_frame().await.is_none());
        }
        assert_eq!(sup.consecutive_failures(), 4);

        assert!(sup.read_frame().await.is_some());
        assert_eq!(sup.consecutive_failures(), 0);
        assert_eq!(sup.reconnects(), 0);
    }

    #[tokio::test]
    async fn test_reconnect_after_five_failures() {
        // probe ok, five failures (mixed kinds), then the reconnect probe
        let steps = vec![
            Step::Frame,
            Step::Fail,
            Step::Empty,
            Step::ZeroSized,
            Step::Fail,
            Step::Fail,
        ];
        let source = ScriptedSource::new(steps);
        let log = source.log.clone();
        let mut sup = supervisor(source);
        sup.start().await.unwrap();

        for _ in 0..4 {
            assert!(sup.read_frame().await.is_none());
            assert_eq!(sup.reconnects(), 0);
        }
        assert_eq!(log.lock().unwrap().opens, 1);

        // fifth failure triggers exactly one reconnect cycle
        assert!(sup.read_frame().await.is_none());
        assert_eq!(sup.reconnects(), 1);
        assert_eq!(log.lock().unwrap().opens, 2);
        assert_eq!(sup.consecutive_failures(), 0);
        assert!(sup.is_healthy());

        // next read goes to the fresh connection
        assert!(sup.read_frame().await.is_some());
        assert_eq!(log.lock().unwrap().opens, 2);
    }

    #[tokio::test]
    async fn test_failed_reconnect_surfaces_as_unavailable() {
        let steps = vec![Step::Frame, Step::Fail, Step::Fail, Step::Fail, Step::Fail, Step::Fail];
        let source = ScriptedSource::new(steps);
        let open_failures = source.open_failures.clone();
        let log = source.log.clone();
        let mut sup = supervisor(source);
        sup.start().await.unwrap();

        for _ in 0..4 {
            sup.read_frame().await;
        }
        *open_failures.lock().unwrap() = 2;

        assert!(sup.read_frame().await.is_none());
        assert_eq!(sup.reconnects(), 1);
        assert!(!sup.is_healthy());
        assert_eq!(sup.status(), ConnectionStatus::Offline);
        assert_eq!(sup.last_event(), Some(ConnectionEvent::Lost));
        assert_eq!(sup.connection_losses(), 1);

        // next read attempts a start, which fails once more
        assert!(sup.read_frame().await.is_none());
        assert_eq!(log.lock().unwrap().opens, 3);
        assert_eq!(sup.connection_losses(), 1);

        // camera back: read reconnects and returns a frame
        assert!(sup.read_frame().await.is_some());
        assert_eq!(sup.status(), ConnectionStatus::Online);
        assert_eq!(sup.last_event(), Some(ConnectionEvent::Recovered));
        assert_eq!(sup.connection_losses(), 1);
    }

    #[tokio::test]
    async fn test_hanging_read_counts_as_failure() {
        let mut sup = supervisor(ScriptedSource::new(vec![Step::Frame, Step::Hang]));
        sup.start().await.unwrap();

        assert!(sup.read_frame().await.is_none());
        assert_eq!(sup.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let source = ScriptedSource::new(vec![]);
        let log = source.log.clone();
        let mut sup = supervisor(source);

        sup.stop();
        sup.start().await.unwrap();
        sup.stop();
        sup.stop();
        assert!(!sup.is_healthy());
        assert!(log.lock().unwrap().releases >= 3);
    }
}
