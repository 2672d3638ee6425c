//! MJPEG stream splitter
//!
//! Splits a `multipart/x-mixed-replace` byte stream into individual JPEG
//! images by scanning for SOI (FFD8) / EOI (FFD9) markers. Part headers and
//! boundaries between images are discarded.

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Default cap on buffered bytes for a single image (8 MiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Incremental MJPEG splitter
pub struct MjpegParser {
    buf: Vec<u8>,
    /// Offset where the next EOI search resumes
    scan_from: usize,
    max_frame_bytes: usize,
}

impl MjpegParser {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn with_limit(max_frame_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            scan_from: 0,
            max_frame_bytes,
        }
    }

    /// Feed a chunk, returning every complete JPEG it finished
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();

        loop {
            // Align the buffer on a start-of-image marker
            match find_marker(&self.buf, SOI, 0) {
                Some(0) => {}
                Some(start) => {
                    self.buf.drain(..start);
                    self.scan_from = 0;
                }
                None => {
                    // Keep a trailing 0xFF, it may be the first half of SOI
                    let keep = usize::from(self.buf.last() == Some(&0xFF));
                    let cut = self.buf.len() - keep;
                    self.buf.drain(..cut);
                    self.scan_from = 0;
                    break;
                }
            }

            let from = self.scan_from.max(SOI.len());
            match find_marker(&self.buf, EOI, from) {
                Some(end) => {
                    let frame: Vec<u8> = self.buf.drain(..end + EOI.len()).collect();
                    self.scan_from = 0;
                    frames.push(frame);
                }
                None => {
                    if self.buf.len() > self.max_frame_bytes {
                        tracing::warn!(
                            buffered = self.buf.len(),
                            limit = self.max_frame_bytes,
                            "MJPEG frame exceeds limit, discarding buffer"
                        );
                        self.buf.clear();
                        self.scan_from = 0;
                    } else {
                        self.scan_from = self.buf.len().saturating_sub(1);
                    }
                    break;
                }
            }
        }

        frames
    }

    /// Bytes currently held for an incomplete image
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

impl Default for MjpegParser {
    fn default() -> Self {
        Self::new()
    }
}

fn find_marker(haystack: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(2)
        .position(|w| w == marker)
        .map(|pos| pos + from)
}
