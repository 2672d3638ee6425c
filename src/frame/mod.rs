//! Frame - Captured camera image + validation
//!
//! ## Responsibilities
//!
//! - Immutable RGB buffer shared cheaply between pipeline stages
//! - Capture timestamp
//! - Frame validation (reject empty/zero-sized frames)
//! - JPEG encode/decode helpers

use crate::error::Result;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};
use std::sync::Arc;

/// JPEG quality used for the stream and alert captures
pub const JPEG_QUALITY: u8 = 80;

/// One captured camera frame
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbImage>,
    captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage, captured_at: DateTime<Utc>) -> Self {
        Self {
            image: Arc::new(image),
            captured_at,
        }
    }

    /// Decode a JPEG (or any supported format) byte buffer
    pub fn from_jpeg(data: &[u8], captured_at: DateTime<Utc>) -> Result<Self> {
        let image = image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.to_rgb8();
        Ok(Self::new(image, captured_at))
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// True when both frames share the same underlying buffer
    pub fn same_buffer(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }

    /// Encode as JPEG
    pub fn to_jpeg(&self) -> Result<Vec<u8>> {
        encode_jpeg(&self.image)
    }
}

/// Encode an RGB image as JPEG
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    encoder.encode_image(image)?;
    Ok(buf)
}

/// Frame validator
///
/// A frame is usable iff it exists and both dimensions are non-zero.
pub fn is_valid_frame(frame: Option<&Frame>) -> bool {
    match frame {
        Some(f) => f.width() > 0 && f.height() > 0,
        None => false,
    }
}
