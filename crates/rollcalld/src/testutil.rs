//! Stand-ins for the camera and the ONNX encoder.

use crate::pipeline::Pipeline;
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use rollcall_core::encoder::EncoderError;
use rollcall_core::types::{BoundingBox, DetectedFace, Embedding, GalleryEntry};
use rollcall_core::{EuclideanMatcher, FaceEncoder, Gallery, GalleryStore, MjpegEncoder};
use rollcall_hw::{CameraError, Frame, FrameSource, FrameSourceOpener};
use rollcall_ledger::{AttendanceLedger, LedgerBackend};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub fn frame() -> RgbImage {
    RgbImage::from_pixel(64, 48, Rgb([90, 90, 90]))
}

pub fn png_bytes() -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(frame())
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn face_with(embedding: Vec<f32>) -> DetectedFace {
    let bbox = BoundingBox {
        x: 8.0,
        y: 6.0,
        width: 20.0,
        height: 24.0,
        confidence: 0.95,
        landmarks: None,
    };
    DetectedFace::unmatched(bbox, Embedding::new(embedding))
}

/// Matches the `alice` gallery entry exactly.
pub fn alice_face() -> DetectedFace {
    face_with(vec![1.0, 0.0])
}

/// Orthogonal to every gallery entry (distance √2).
pub fn stranger_face() -> DetectedFace {
    face_with(vec![0.0, 1.0])
}

/// Returns the same faces for every frame and counts calls.
pub struct FakeEncoder {
    pub faces: Vec<DetectedFace>,
    pub fail: bool,
    pub calls: Arc<AtomicUsize>,
}

impl FaceEncoder for FakeEncoder {
    fn detect_and_encode(&mut self, _frame: &RgbImage) -> Result<Vec<DetectedFace>, EncoderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EncoderError::InvalidScale(0.0));
        }
        Ok(self.faces.clone())
    }
}

pub struct TestEnv {
    dir: TempDir,
    pub detect_calls: Arc<AtomicUsize>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            detect_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn faces_dir(&self) -> PathBuf {
        self.dir.path().join("faces")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.dir.path().join("attendance.json")
    }

    fn build(&self, faces: Vec<DetectedFace>, fail: bool) -> Pipeline {
        let encoder = FakeEncoder {
            faces,
            fail,
            calls: Arc::clone(&self.detect_calls),
        };
        let gallery = Gallery::from_entries([GalleryEntry {
            name: "alice".into(),
            embedding: Embedding::new(vec![1.0, 0.0]),
        }]);
        Pipeline {
            encoder: Mutex::new(Box::new(encoder)),
            gallery: GalleryStore::new(gallery),
            matcher: EuclideanMatcher::default(),
            ledger: AttendanceLedger::open(LedgerBackend::Json, &self.ledger_path()).unwrap(),
            mjpeg: MjpegEncoder::new(60),
            faces_dir: self.faces_dir(),
        }
    }

    pub fn pipeline(&self, faces: Vec<DetectedFace>) -> Pipeline {
        self.build(faces, false)
    }

    pub fn failing_pipeline(&self) -> Pipeline {
        self.build(Vec::new(), true)
    }
}

/// Shared view of what happened to the sources an opener produced.
#[derive(Default)]
pub struct SourceLog {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub frames_served: AtomicUsize,
}

/// Yields `frames` frames, then fails as if the camera were unplugged.
/// `frames = None` streams forever (paced by `delay`).
pub struct ScriptedSource {
    remaining: Option<usize>,
    delay: std::time::Duration,
    closed: bool,
    log: Arc<SourceLog>,
    sequence: u32,
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        if self.closed {
            return Err(CameraError::Closed);
        }
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Err(CameraError::CaptureFailed("device unplugged".into()));
            }
            *remaining -= 1;
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.sequence += 1;
        self.log.frames_served.fetch_add(1, Ordering::SeqCst);
        Ok(Frame::new(frame(), self.sequence))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.log.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub struct ScriptedOpener {
    pub frames: Option<usize>,
    pub delay: std::time::Duration,
    pub log: Arc<SourceLog>,
    /// Errors returned by the next `open` calls, in order.
    pub open_errors: Mutex<VecDeque<CameraError>>,
}

impl ScriptedOpener {
    pub fn failing_after(frames: usize) -> Self {
        Self {
            frames: Some(frames),
            delay: std::time::Duration::ZERO,
            log: Arc::default(),
            open_errors: Mutex::new(VecDeque::new()),
        }
    }

    pub fn endless(delay: std::time::Duration) -> Self {
        Self {
            frames: None,
            delay,
            log: Arc::default(),
            open_errors: Mutex::new(VecDeque::new()),
        }
    }
}

impl FrameSourceOpener for ScriptedOpener {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        if let Some(err) = self.open_errors.lock().pop_front() {
            return Err(err);
        }
        self.log.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource {
            remaining: self.frames,
            delay: self.delay,
            closed: false,
            log: Arc::clone(&self.log),
            sequence: 0,
        }))
    }

    fn describe(&self) -> String {
        "scripted".into()
    }
}
