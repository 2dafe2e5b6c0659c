//! Motion-JPEG multipart framing.
//!
//! Each call to [`MjpegEncoder::encode`] yields one self-delimited part; the
//! parts concatenate into a `multipart/x-mixed-replace` body.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};
use thiserror::Error;

pub const BOUNDARY: &str = "frame";
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const PART_TRAILER: &[u8] = b"\r\n";

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("JPEG encode failed: {0}")]
    Jpeg(#[from] image::ImageError),
    #[error("empty frame")]
    EmptyFrame,
}

#[derive(Debug, Clone, Copy)]
pub struct MjpegEncoder {
    quality: u8,
}

impl Default for MjpegEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl MjpegEncoder {
    /// `quality` is clamped to 1..=100.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode one frame as a complete multipart part.
    pub fn encode(&self, frame: &RgbImage) -> Result<Vec<u8>, StreamError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(StreamError::EmptyFrame);
        }

        let mut part = Vec::with_capacity(PART_HEADER.len() + frame.as_raw().len() / 8);
        part.extend_from_slice(PART_HEADER);
        JpegEncoder::new_with_quality(&mut part, self.quality).encode(
            frame.as_raw(),
            frame.width(),
            frame.height(),
            ExtendedColorType::Rgb8,
        )?;
        part.extend_from_slice(PART_TRAILER);
        Ok(part)
    }
}
