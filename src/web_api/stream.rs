//! MJPEG live stream

use axum::body::{Body, Bytes};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use std::convert::Infallible;
use tokio::sync::watch;

/// Content type of the live stream
pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// One multipart chunk carrying a JPEG
pub fn mjpeg_part(jpeg: &[u8]) -> Bytes {
    let mut part = Vec::with_capacity(jpeg.len() + 48);
    part.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

/// Stream every published frame until the session ends
///
/// `None` values (camera temporarily unavailable) are skipped.
pub(crate) fn mjpeg_response(mut frames: watch::Receiver<Option<Bytes>>) -> Response {
    frames.mark_changed();

    let stream = futures::stream::unfold(frames, |mut frames| async move {
        loop {
            if frames.changed().await.is_err() {
                return None;
            }
            let frame = frames.borrow_and_update().clone();
            if let Some(jpeg) = frame {
                return Some((Ok::<_, Infallible>(mjpeg_part(&jpeg)), frames));
            }
        }
    });

    (
        [
            (header::CONTENT_TYPE, MJPEG_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}
