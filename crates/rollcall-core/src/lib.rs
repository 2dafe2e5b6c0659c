//! rollcall-core: Face identification pipeline for attendance tracking.
//!
//! SCRFD face detection and ArcFace embeddings via ONNX Runtime, nearest
//! neighbour matching against a gallery of registered faces, detect/reuse
//! cadence, frame annotation and MJPEG part encoding.

pub mod alignment;
pub mod annotate;
pub mod cadence;
pub mod detector;
pub mod encoder;
pub mod font;
pub mod gallery;
pub mod matcher;
pub mod mjpeg;
pub mod recognizer;
pub mod types;

pub use cadence::{Cadence, Phase};
pub use encoder::{EncoderError, FaceEncoder, OnnxFaceEncoder};
pub use gallery::{Gallery, GalleryError, GalleryStore};
pub use matcher::{EuclideanMatcher, MatchResult, Matcher};
pub use mjpeg::{MjpegEncoder, StreamError};
pub use types::{BoundingBox, DetectedFace, Embedding, GalleryEntry};

use std::path::PathBuf;

/// SCRFD detection model file name.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

/// Model directory used when none is configured: `$XDG_DATA_HOME/rollcall/models`.
pub fn default_model_dir() -> PathBuf {
    data_home().join("rollcall").join("models")
}

/// `$XDG_DATA_HOME`, falling back to `~/.local/share`.
pub fn data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
}
