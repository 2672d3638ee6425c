//! FrameSource - Network camera connection
//!
//! ## Responsibilities
//!
//! - Own the network connection to one camera
//! - Yield the freshest decoded frame (buffer depth 1)
//! - Throttle decoding to the target capture rate
//! - Release the connection on request or drop

mod mjpeg;

pub use mjpeg::{MjpegParser, DEFAULT_MAX_FRAME_BYTES};

use crate::camera_session::CameraSession;
use crate::error::{Error, Result};
use crate::frame::Frame;
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Camera stream handle
///
/// Callers bound every call with their own timeout.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Open a new stream handle, releasing any previous one first
    async fn open(&mut self, camera: &CameraSession) -> Result<()>;

    /// Wait for the next frame; `Ok(None)` means the read produced nothing
    async fn read(&mut self) -> Result<Option<Frame>>;

    /// Release the handle (idempotent)
    fn release(&mut self);

    fn is_open(&self) -> bool;
}

/// Background reader feeding the depth-1 slot
struct StreamReader {
    rx: watch::Receiver<Option<Frame>>,
    task: JoinHandle<()>,
}

/// MJPEG-over-HTTP source (DroidCam style `http://ip:port/video`)
pub struct MjpegFrameSource {
    client: reqwest::Client,
    /// Minimum spacing between decoded frames
    target_interval: Duration,
    reader: Option<StreamReader>,
}

impl MjpegFrameSource {
    /// Create a source
    ///
    /// # Arguments
    /// * `connect_timeout` - Upper bound for establishing the HTTP connection
    /// * `target_interval` - Target capture cadence (frames in between are skipped)
    pub fn new(connect_timeout: Duration, target_interval: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            client,
            target_interval,
            reader: None,
        })
    }
}

#[async_trait]
impl FrameSource for MjpegFrameSource {
    async fn open(&mut self, camera: &CameraSession) -> Result<()> {
        self.release();

        let url = camera.stream_url();
        tracing::info!(camera_id = %camera.camera_id, url = %url, "Connecting to camera stream");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Connection(format!("{}: {}", url, e)))?;

        if !resp.status().is_success() {
            return Err(Error::Connection(format!(
                "{} returned {}",
                url,
                resp.status()
            )));
        }

        let (tx, rx) = watch::channel(None);
        let camera_id = camera.camera_id.clone();
        let target_interval = self.target_interval;

        let task = tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            let mut parser = MjpegParser::new();
            let mut last_decoded: Option<Instant> = None;

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!(camera_id = %camera_id, error = %e, "Camera stream read error");
                        break;
                    }
                };

                for jpeg in parser.push(&chunk) {
                    if let Some(last) = last_decoded {
                        if last.elapsed() < target_interval {
                            continue;
                        }
                    }

                    match Frame::from_jpeg(&jpeg, Utc::now()) {
                        Ok(frame) => {
                            last_decoded = Some(Instant::now());
                            tx.send_replace(Some(frame));
                        }
                        Err(e) => {
                            tracing::debug!(camera_id = %camera_id, error = %e, "Skipping undecodable frame");
                        }
                    }
                }

                if tx.is_closed() {
                    break;
                }
            }

            tracing::debug!(camera_id = %camera_id, "Camera stream reader finished");
        });

        self.reader = Some(StreamReader { rx, task });
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Frame>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| Error::Connection("stream not open".to_string()))?;

        if reader.rx.changed().await.is_err() {
            return Err(Error::Connection("camera stream closed".to_string()));
        }

        let frame = reader.rx.borrow_and_update().clone();
        Ok(frame)
    }

    fn release(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.task.abort();
        }
    }

    fn is_open(&self) -> bool {
        self.reader
            .as_ref()
            .map(|r| !r.task.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for MjpegFrameSource {
    fn drop(&mut self) {
        self.release();
    }
}
