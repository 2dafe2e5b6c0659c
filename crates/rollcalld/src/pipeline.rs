//! Process-wide state shared by the stream, the gallery engine and D-Bus.

use parking_lot::Mutex;
use rollcall_core::gallery::{self, GalleryError};
use rollcall_core::{
    DetectedFace, EuclideanMatcher, FaceEncoder, Gallery, GalleryStore, Matcher, MjpegEncoder,
};
use rollcall_ledger::AttendanceLedger;
use image::RgbImage;
use std::path::PathBuf;

/// Outcome of registering a reference image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// Image saved and the identity is now in the gallery.
    Registered,
    /// Image saved but no face found; the identity was removed from the gallery.
    NoFace,
    /// Image saved but could not be decoded or encoded; the identity was removed.
    Unusable(String),
}

pub struct Pipeline {
    /// One encoder for the whole process; ONNX sessions need `&mut`.
    pub encoder: Mutex<Box<dyn FaceEncoder + Send>>,
    pub gallery: GalleryStore,
    pub matcher: EuclideanMatcher,
    pub ledger: AttendanceLedger,
    pub mjpeg: MjpegEncoder,
    pub faces_dir: PathBuf,
}

impl Pipeline {
    /// Detect, encode and label the faces in one frame, then record attendance
    /// for every known identity. Encoder failure yields no faces.
    pub fn identify(&self, frame: &RgbImage) -> Vec<DetectedFace> {
        // Fixed for the whole detect cycle; later swaps apply to the next one.
        let gallery = self.gallery.snapshot();
        let mut faces = match self.encoder.lock().detect_and_encode(frame) {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!(error = %e, "face encoding failed; frame treated as empty");
                return Vec::new();
            }
        };

        self.matcher.label_faces(&mut faces, &gallery);

        for name in faces.iter().filter_map(|f| f.identity.as_deref()) {
            match self.ledger.record(name) {
                Ok(true) => tracing::info!(identity = name, "first sighting today"),
                Ok(false) => {}
                Err(e) => tracing::error!(identity = name, error = %e, "attendance record failed"),
            }
        }
        faces
    }

    /// Rebuild the gallery from the reference directory and swap it in.
    pub fn rebuild_gallery(&self) -> Result<usize, GalleryError> {
        let rebuilt: Gallery = {
            let mut encoder = self.encoder.lock();
            gallery::rebuild(&self.faces_dir, &mut **encoder)?
        };
        let count = rebuilt.len();
        self.gallery.replace(rebuilt);
        Ok(count)
    }

    /// Persist the image for `name`, then update only that gallery entry.
    ///
    /// A failed write leaves the gallery untouched. A saved image without a
    /// usable face removes `name` from the gallery.
    pub fn register_face(&self, name: &str, image: &[u8]) -> Result<Registration, GalleryError> {
        let path = gallery::save_reference(&self.faces_dir, name, image)?;

        let encoded = {
            let mut encoder = self.encoder.lock();
            gallery::encode_reference(&path, &mut **encoder)
        };

        match encoded {
            Ok(Some(embedding)) => {
                self.gallery.upsert(name, Some(embedding));
                tracing::info!(identity = name, "face registered");
                Ok(Registration::Registered)
            }
            Ok(None) => {
                self.gallery.upsert(name, None);
                tracing::warn!(identity = name, "no face in registered image");
                Ok(Registration::NoFace)
            }
            Err(e) => {
                self.gallery.upsert(name, None);
                tracing::warn!(identity = name, error = %e, "registered image unusable");
                Ok(Registration::Unusable(e.to_string()))
            }
        }
    }
}
