//! Detect-then-embed stage of the frame pipeline.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::DetectedFace;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::borrow::Cow;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("invalid detect scale {0}: must be in (0, 1]")]
    InvalidScale(f32),
}

/// Finds faces in a frame and computes one embedding per face.
///
/// Returned faces are unmatched, with boxes in original frame coordinates,
/// ordered by detector confidence (highest first). An empty result is not an
/// error.
pub trait FaceEncoder {
    fn detect_and_encode(&mut self, frame: &RgbImage) -> Result<Vec<DetectedFace>, EncoderError>;
}

/// SCRFD + ArcFace encoder with optional downsampling before detection.
pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    detect_scale: f32,
}

impl OnnxFaceEncoder {
    pub fn load(scrfd_path: &str, arcface_path: &str, detect_scale: f32) -> Result<Self, EncoderError> {
        if !(detect_scale > 0.0 && detect_scale <= 1.0) {
            return Err(EncoderError::InvalidScale(detect_scale));
        }
        let detector = FaceDetector::load(scrfd_path)?;
        let recognizer = FaceRecognizer::load(arcface_path)?;
        Ok(Self {
            detector,
            recognizer,
            detect_scale,
        })
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn detect_and_encode(&mut self, frame: &RgbImage) -> Result<Vec<DetectedFace>, EncoderError> {
        let (small, (fx, fy)) = downsample(frame, self.detect_scale);
        let boxes = self.detector.detect(&small)?;

        let mut faces = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let bbox = bbox.scaled(fx, fy);
            // embed from the full-resolution frame for better crops
            let embedding = self.recognizer.extract(frame, &bbox)?;
            faces.push(DetectedFace::unmatched(bbox, embedding));
        }

        tracing::trace!(faces = faces.len(), "frame encoded");
        Ok(faces)
    }
}

/// Shrink `frame` by `scale`, returning the working image and the per-axis
/// factors `(fx, fy)` that map its coordinates back to the original frame.
pub fn downsample(frame: &RgbImage, scale: f32) -> (Cow<'_, RgbImage>, (f32, f32)) {
    if scale >= 1.0 || frame.width() == 0 || frame.height() == 0 {
        return (Cow::Borrowed(frame), (1.0, 1.0));
    }

    let w = ((frame.width() as f32 * scale).round() as u32).max(1);
    let h = ((frame.height() as f32 * scale).round() as u32).max(1);
    let small = imageops::resize(frame, w, h, FilterType::Triangle);
    let factors = (frame.width() as f32 / w as f32, frame.height() as f32 / h as f32);
    (Cow::Owned(small), factors)
}
