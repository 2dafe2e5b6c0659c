//! Nearest-neighbour identity matching against a gallery snapshot.

use crate::gallery::Gallery;
use crate::types::{DetectedFace, Embedding};

/// Default acceptance threshold on L2-normalised embeddings.
///
/// Euclidean 1.10 corresponds to cosine similarity ≈ 0.40.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 1.10;

/// Distances closer than this are treated as equal.
const TIE_TOLERANCE: f32 = 1e-6;

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Accepted identity, `None` when nothing is within the threshold.
    pub identity: Option<String>,
    /// Distance to the nearest entry (accepted or not); infinite for an empty gallery.
    pub distance: f32,
}

/// Strategy for comparing a probe embedding against a gallery of known faces.
pub trait Matcher {
    fn find(&self, probe: &Embedding, gallery: &Gallery) -> MatchResult;

    /// Match every face in place.
    fn label_faces(&self, faces: &mut [DetectedFace], gallery: &Gallery) {
        for face in faces {
            let result = self.find(&face.embedding, gallery);
            face.identity = result.identity;
            face.distance = result.distance;
        }
    }
}

/// Euclidean nearest-neighbour matcher.
///
/// The gallery iterates in name order and only a strictly smaller distance
/// replaces the current best, so equidistant entries resolve to the
/// lexicographically smallest name.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub threshold: f32,
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl Matcher for EuclideanMatcher {
    fn find(&self, probe: &Embedding, gallery: &Gallery) -> MatchResult {
        let mut best: Option<(&str, f32)> = None;

        for entry in gallery.entries() {
            let distance = probe.euclidean_distance(&entry.embedding);
            let closer = match best {
                None => true,
                Some((_, best_distance)) => distance < best_distance - TIE_TOLERANCE,
            };
            if closer {
                best = Some((entry.name.as_str(), distance));
            }
        }

        match best {
            Some((name, distance)) if distance <= self.threshold => MatchResult {
                identity: Some(name.to_string()),
                distance,
            },
            Some((_, distance)) => MatchResult {
                identity: None,
                distance,
            },
            None => MatchResult {
                identity: None,
                distance: f32::INFINITY,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, GalleryEntry};

    fn entry(name: &str, values: Vec<f32>) -> GalleryEntry {
        GalleryEntry {
            name: name.into(),
            embedding: Embedding::new(values),
        }
    }

    #[test]
    fn test_nearest_entry_wins() {
        let gallery = Gallery::from_entries(vec![
            entry("decoy", vec![0.0, 1.0, 0.0]),
            entry("alice", vec![1.0, 0.0, 0.0]),
            entry("bob", vec![0.0, 0.0, 1.0]),
        ]);
        let probe = Embedding::new(vec![0.9, 0.1, 0.0]);

        let result = EuclideanMatcher { threshold: 0.5 }.find(&probe, &gallery);
        assert_eq!(result.identity.as_deref(), Some("alice"));
        assert!(result.distance < 0.2);
    }

    #[test]
    fn test_beyond_threshold_is_unknown() {
        let gallery = Gallery::from_entries(vec![entry("alice", vec![1.0, 0.0])]);
        let probe = Embedding::new(vec![0.0, 1.0]);

        let result = EuclideanMatcher { threshold: 0.5 }.find(&probe, &gallery);
        assert_eq!(result.identity, None);
        assert!((result.distance - 2f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let gallery = Gallery::from_entries(vec![entry("alice", vec![0.0, 0.0])]);
        let probe = Embedding::new(vec![0.5, 0.0]);
        let result = EuclideanMatcher { threshold: 0.5 }.find(&probe, &gallery);
        assert_eq!(result.identity.as_deref(), Some("alice"));
    }

    #[test]
    fn test_empty_gallery() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let result = EuclideanMatcher::default().find(&probe, &Gallery::default());
        assert_eq!(result.identity, None);
        assert!(result.distance.is_infinite());
    }

    #[test]
    fn test_tie_resolves_to_smallest_name() {
        // Inserted out of order; both are exactly 1.0 away.
        let gallery = Gallery::from_entries(vec![
            entry("zoe", vec![0.0, 1.0]),
            entry("amy", vec![0.0, -1.0]),
        ]);
        let probe = Embedding::new(vec![0.0, 0.0]);
        let matcher = EuclideanMatcher { threshold: 2.0 };

        for _ in 0..5 {
            let result = matcher.find(&probe, &gallery);
            assert_eq!(result.identity.as_deref(), Some("amy"));
            assert_eq!(result.distance, 1.0);
        }
    }

    #[test]
    fn test_label_faces_sets_identity() {
        let gallery = Gallery::from_entries(vec![entry("alice", vec![1.0, 0.0])]);
        let bbox = BoundingBox {
            x: 0.0, y: 0.0, width: 10.0, height: 10.0, confidence: 0.9, landmarks: None,
        };
        let mut faces = vec![
            DetectedFace::unmatched(bbox.clone(), Embedding::new(vec![1.0, 0.0])),
            DetectedFace::unmatched(bbox, Embedding::new(vec![-1.0, 0.0])),
        ];

        EuclideanMatcher { threshold: 0.5 }.label_faces(&mut faces, &gallery);
        assert_eq!(faces[0].identity.as_deref(), Some("alice"));
        assert_eq!(faces[0].distance, 0.0);
        assert!(!faces[1].is_known());
        assert!((faces[1].distance - 2.0).abs() < 1e-6);
    }
}
