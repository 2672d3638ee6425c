//! SessionManager - Running camera sessions
//!
//! ## Responsibilities
//!
//! - start / stop sessions by camera id (one live session per id)
//! - start and stop of the same id never interleave
//! - Spawn each session's pipeline in its own task
//! - Latest frame and status lookups for the API
//! - Bounded shutdown of every session
//!
//! Sessions share only stateless collaborators (model, repository, image
//! store). All mutable state stays inside each session's task.

use crate::alert_store::AlertRepository;
use crate::camera_session::SessionConfig;
use crate::detector::DetectionModel;
use crate::error::Result;
use crate::frame_source::{FrameSource, MjpegFrameSource};
use crate::image_store::ImageStore;
use crate::monitor_session::{MonitorSession, SessionStatus};
use axum::body::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Default wait for a session task to release its connection
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds the frame source of a new session
pub type SourceFactory = Arc<dyn Fn(&SessionConfig) -> Result<Box<dyn FrameSource>> + Send + Sync>;

struct SessionHandle {
    shutdown: watch::Sender<bool>,
    frames: watch::Receiver<Option<Bytes>>,
    status: watch::Receiver<SessionStatus>,
    task: JoinHandle<()>,
}

/// SessionManager instance
pub struct SessionManager {
    model: Arc<dyn DetectionModel>,
    repository: Arc<dyn AlertRepository>,
    images: Arc<dyn ImageStore>,
    source_factory: SourceFactory,
    sessions: RwLock<HashMap<String, SessionHandle>>,
    /// Serialises start/stop per camera id
    transitions: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    stop_timeout: Duration,
}

impl SessionManager {
    /// Manager whose sessions read MJPEG camera streams
    pub fn new(
        model: Arc<dyn DetectionModel>,
        repository: Arc<dyn AlertRepository>,
        images: Arc<dyn ImageStore>,
    ) -> Self {
        let factory: SourceFactory = Arc::new(|config: &SessionConfig| {
            let source = MjpegFrameSource::new(config.connect_timeout(), config.capture_interval())?;
            Ok(Box::new(source) as Box<dyn FrameSource>)
        });
        Self::with_source_factory(model, repository, images, factory)
    }

    pub fn with_source_factory(
        model: Arc<dyn DetectionModel>,
        repository: Arc<dyn AlertRepository>,
        images: Arc<dyn ImageStore>,
        source_factory: SourceFactory,
    ) -> Self {
        Self {
            model,
            repository,
            images,
            source_factory,
            sessions: RwLock::new(HashMap::new()),
            transitions: Mutex::new(HashMap::new()),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    /// Start (or restart) the session for `config.camera.camera_id`
    ///
    /// Fails without spawning anything when the configuration is invalid or
    /// the camera cannot be opened. A `stop` for the same id issued while the
    /// camera is still opening waits and then stops the new session.
    pub async fn start(&self, config: SessionConfig) -> Result<SessionStatus> {
        config.validate()?;
        let camera_id = config.camera.camera_id.clone();

        let lock = self.transition_lock(&camera_id).await;
        let _guard = lock.lock().await;

        self.stop_registered(&camera_id).await;

        let source = (self.source_factory)(&config)?;
        let mut session = MonitorSession::with_source(
            config,
            source,
            self.model.clone(),
            self.repository.clone(),
            self.images.clone(),
        )?;
        session.start().await?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let frames = session.subscribe_frames();
        let status = session.subscribe_status();
        let current = session.status();

        let task = tokio::spawn(async move {
            session.run(shutdown_rx).await;
        });

        let previous = self.sessions.write().await.insert(
            camera_id.clone(),
            SessionHandle {
                shutdown,
                frames,
                status,
                task,
            },
        );
        if let Some(previous) = previous {
            self.shutdown_handle(&camera_id, previous).await;
        }

        tracing::info!(camera_id = %camera_id, "Monitoring session started");
        Ok(current)
    }

    /// Stop a session (idempotent); returns whether one was running
    pub async fn stop(&self, camera_id: &str) -> bool {
        let lock = self.transition_lock(camera_id).await;
        let _guard = lock.lock().await;
        self.stop_registered(camera_id).await
    }

    async fn stop_registered(&self, camera_id: &str) -> bool {
        let handle = self.sessions.write().await.remove(camera_id);
        match handle {
            Some(handle) => {
                self.shutdown_handle(camera_id, handle).await;
                tracing::info!(camera_id = %camera_id, "Monitoring session stopped");
                true
            }
            None => false,
        }
    }

    pub async fn stop_all(&self) {
        let mut camera_ids: Vec<String> = self.transitions.lock().await.keys().cloned().collect();
        camera_ids.extend(self.sessions.read().await.keys().cloned());
        camera_ids.sort();
        camera_ids.dedup();

        for camera_id in camera_ids {
            self.stop(&camera_id).await;
        }
        tracing::info!("All monitoring sessions stopped");
    }

    pub async fn is_running(&self, camera_id: &str) -> bool {
        self.sessions.read().await.contains_key(camera_id)
    }

    /// Latest encoded frame of a session
    pub async fn latest_frame(&self, camera_id: &str) -> Option<Bytes> {
        let sessions = self.sessions.read().await;
        let handle = sessions.get(camera_id)?;
        let frame = handle.frames.borrow().clone();
        frame
    }

    /// Frame updates of a session, for streaming
    pub async fn subscribe_frames(&self, camera_id: &str) -> Option<watch::Receiver<Option<Bytes>>> {
        self.sessions
            .read()
            .await
            .get(camera_id)
            .map(|h| h.frames.clone())
    }

    pub async fn status(&self, camera_id: &str) -> Option<SessionStatus> {
        self.sessions
            .read()
            .await
            .get(camera_id)
            .map(|h| h.status.borrow().clone())
    }

    /// Status of every running session, ordered by camera id
    pub async fn list(&self) -> Vec<SessionStatus> {
        let mut statuses: Vec<SessionStatus> = self
            .sessions
            .read()
            .await
            .values()
            .map(|h| h.status.borrow().clone())
            .collect();
        statuses.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        statuses
    }

    async fn transition_lock(&self, camera_id: &str) -> Arc<Mutex<()>> {
        self.transitions
            .lock()
            .await
            .entry(camera_id.to_string())
            .or_default()
            .clone()
    }

    async fn shutdown_handle(&self, camera_id: &str, handle: SessionHandle) {
        let _ = handle.shutdown.send(true);
        let mut task = handle.task;

        match tokio::time::timeout(self.stop_timeout, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(camera_id = %camera_id, error = %e, "Session task failed");
            }
            Err(_) => {
                tracing::warn!(
                    camera_id = %camera_id,
                    timeout_ms = self.stop_timeout.as_millis() as u64,
                    "Session did not stop in time, aborting"
                );
                task.abort();
            }
        }
    }
}
