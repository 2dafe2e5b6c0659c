/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Multiply horizontal coordinates by `fx` and vertical ones by `fy`
    /// (box and landmarks).
    ///
    /// Used to map detections made on a downsampled frame back to the
    /// original resolution.
    pub fn scaled(&self, fx: f32, fy: f32) -> BoundingBox {
        BoundingBox {
            x: self.x * fx,
            y: self.y * fy,
            width: self.width * fx,
            height: self.height * fy,
            confidence: self.confidence,
            landmarks: self
                .landmarks
                .map(|lms| lms.map(|(lx, ly)| (lx * fx, ly * fy))),
        }
    }
}

/// Face embedding vector (512-dimensional, L2-normalised, for ArcFace w600k_r50).
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One known identity in the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryEntry {
    pub name: String,
    pub embedding: Embedding,
}

/// A face found in one frame, before or after matching.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    /// Box in original frame coordinates.
    pub bbox: BoundingBox,
    pub embedding: Embedding,
    /// Matched identity, `None` for unknown (or not yet matched).
    pub identity: Option<String>,
    /// Distance to the nearest gallery entry; infinite when unmatched.
    pub distance: f32,
}

impl DetectedFace {
    pub fn unmatched(bbox: BoundingBox, embedding: Embedding) -> Self {
        Self {
            bbox,
            embedding,
            identity: None,
            distance: f32::INFINITY,
        }
    }

    pub fn is_known(&self) -> bool {
        self.identity.is_some()
    }

    /// Text drawn under the face box.
    pub fn label(&self) -> String {
        match &self.identity {
            Some(name) => format!("{name} {:.2}", self.distance),
            None => "unknown".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_bbox_scaled_maps_landmarks() {
        let bbox = BoundingBox {
            x: 10.0, y: 20.0, width: 30.0, height: 40.0,
            confidence: 0.9,
            landmarks: Some([(1.0, 2.0); 5]),
        };
        let big = bbox.scaled(2.0, 3.0);
        assert_eq!((big.x, big.y, big.width, big.height), (20.0, 60.0, 60.0, 120.0));
        assert_eq!(big.landmarks.unwrap()[0], (2.0, 6.0));
        assert_eq!(big.confidence, 0.9);
    }

    #[test]
    fn test_label_known_and_unknown() {
        let bbox = BoundingBox {
            x: 0.0, y: 0.0, width: 1.0, height: 1.0, confidence: 1.0, landmarks: None,
        };
        let mut face = DetectedFace::unmatched(bbox, Embedding::new(vec![1.0]));
        assert_eq!(face.label(), "unknown");
        face.identity = Some("alice".into());
        face.distance = 0.4213;
        assert_eq!(face.label(), "alice 0.42");
    }
}
