//! Known-identity gallery and its reference-image directory.
//!
//! The directory holds one image per identity; the file stem is the name.
//! A [`Gallery`] is an immutable snapshot. [`GalleryStore`] publishes the
//! current snapshot and swaps it atomically, so a match that grabbed a
//! snapshot never observes a half-built gallery.

use crate::encoder::FaceEncoder;
use crate::types::{Embedding, GalleryEntry};
use image::ImageFormat;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Extensions accepted as reference images (lowercase).
pub const REFERENCE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

const MAX_NAME_LEN: usize = 64;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("invalid identity name {0:?}")]
    InvalidName(String),
    #[error("unsupported reference image format")]
    UnsupportedFormat,
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("face encoding failed: {0}")]
    Encoder(#[from] crate::encoder::EncoderError),
    #[error("reference directory I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Immutable set of known identities, sorted by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    /// Build from arbitrary entries; a later entry with the same name wins.
    pub fn from_entries(entries: impl IntoIterator<Item = GalleryEntry>) -> Self {
        let by_name: BTreeMap<String, GalleryEntry> =
            entries.into_iter().map(|e| (e.name.clone(), e)).collect();
        Self {
            entries: by_name.into_values().collect(),
        }
    }

    /// Entries in name order.
    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&GalleryEntry> {
        self.position(name).ok().map(|i| &self.entries[i])
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// New snapshot with `name` inserted, overwritten, or removed (`None`).
    pub fn with_entry(&self, name: &str, embedding: Option<Embedding>) -> Gallery {
        let mut entries = self.entries.clone();
        match (self.position(name), embedding) {
            (Ok(i), Some(embedding)) => entries[i].embedding = embedding,
            (Ok(i), None) => {
                entries.remove(i);
            }
            (Err(i), Some(embedding)) => entries.insert(
                i,
                GalleryEntry {
                    name: name.to_string(),
                    embedding,
                },
            ),
            (Err(_), None) => {}
        }
        Gallery { entries }
    }

    fn position(&self, name: &str) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| e.name.as_str().cmp(name))
    }
}

/// Process-wide holder of the current gallery snapshot.
#[derive(Debug, Default)]
pub struct GalleryStore {
    current: RwLock<Arc<Gallery>>,
}

impl GalleryStore {
    pub fn new(gallery: Gallery) -> Self {
        Self {
            current: RwLock::new(Arc::new(gallery)),
        }
    }

    /// The snapshot to use for one detect cycle.
    pub fn snapshot(&self) -> Arc<Gallery> {
        self.current.read().clone()
    }

    pub fn replace(&self, gallery: Gallery) {
        *self.current.write() = Arc::new(gallery);
    }

    /// Swap in a snapshot with one entry changed; see [`Gallery::with_entry`].
    pub fn upsert(&self, name: &str, embedding: Option<Embedding>) {
        let mut current = self.current.write();
        *current = Arc::new(current.with_entry(name, embedding));
    }
}

/// Full rebuild from the reference directory.
///
/// Images that fail to decode, fail to encode, or contain no face are
/// skipped with a warning. Only a failure to read the directory itself is an
/// error.
pub fn rebuild(dir: &Path, encoder: &mut dyn FaceEncoder) -> Result<Gallery, GalleryError> {
    let mut entries = Vec::new();
    let mut skipped = 0usize;

    for (name, path) in reference_files(dir)? {
        match encode_reference(&path, encoder) {
            Ok(Some(embedding)) => entries.push(GalleryEntry { name, embedding }),
            Ok(None) => {
                skipped += 1;
                tracing::warn!(identity = %name, path = %path.display(), "no face in reference image; skipping");
            }
            Err(err) => {
                skipped += 1;
                tracing::warn!(identity = %name, path = %path.display(), error = %err, "reference image unusable; skipping");
            }
        }
    }

    let gallery = Gallery::from_entries(entries);
    tracing::info!(dir = %dir.display(), identities = gallery.len(), skipped, "gallery rebuilt");
    Ok(gallery)
}

/// Embed the face in one reference image.
///
/// Returns `None` when no face is found. With several faces, the
/// highest-confidence detection is used.
pub fn encode_reference(path: &Path, encoder: &mut dyn FaceEncoder) -> Result<Option<Embedding>, GalleryError> {
    let frame = image::open(path)?.to_rgb8();
    let faces = encoder.detect_and_encode(&frame)?;

    if faces.len() > 1 {
        tracing::debug!(
            path = %path.display(),
            faces = faces.len(),
            "several faces in reference image; using the most confident"
        );
    }
    Ok(faces.into_iter().next().map(|face| face.embedding))
}

/// Reference images in `dir` as `(identity, path)`, sorted by identity.
///
/// A missing directory is empty. When one identity has several files, the
/// first path in sort order is used.
pub fn reference_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, GalleryError> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut paths: Vec<PathBuf> = read_dir
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_reference_extension(p))
        .collect();
    paths.sort();

    let mut by_name: BTreeMap<String, PathBuf> = BTreeMap::new();
    for path in paths {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };
        if validate_name(&name).is_err() {
            continue;
        }
        if let Some(existing) = by_name.get(&name) {
            tracing::warn!(identity = %name, used = %existing.display(), ignored = %path.display(), "duplicate reference image");
            continue;
        }
        by_name.insert(name, path);
    }

    Ok(by_name.into_iter().collect())
}

/// Registered identity names, derived from the reference directory.
pub fn list_identities(dir: &Path) -> Result<Vec<String>, GalleryError> {
    Ok(reference_files(dir)?.into_iter().map(|(name, _)| name).collect())
}

/// Persist a reference image for `name`, replacing any previous one.
///
/// The write goes to a temp file in `dir` and is renamed into place.
pub fn save_reference(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, GalleryError> {
    validate_name(name)?;
    let format = image::guess_format(bytes).map_err(|_| GalleryError::UnsupportedFormat)?;
    let ext = match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Png => "png",
        ImageFormat::Bmp => "bmp",
        ImageFormat::WebP => "webp",
        _ => return Err(GalleryError::UnsupportedFormat),
    };

    std::fs::create_dir_all(dir)?;
    let target = dir.join(format!("{name}.{ext}"));

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(&target).map_err(|e| e.error)?;

    // Any other reference for this identity, whatever the extension case.
    for entry in std::fs::read_dir(dir)? {
        let stale = entry?.path();
        if stale == target || !stale.is_file() || !has_reference_extension(&stale) {
            continue;
        }
        if stale.file_stem().and_then(|s| s.to_str()) == Some(name) {
            std::fs::remove_file(&stale)?;
            tracing::debug!(path = %stale.display(), "removed stale reference image");
        }
    }

    tracing::info!(identity = name, path = %target.display(), "reference image saved");
    Ok(target)
}

/// Names become file names: no separators, no leading dot, bounded length.
pub fn validate_name(name: &str) -> Result<(), GalleryError> {
    let trimmed = name.trim();
    let ok = !trimmed.is_empty()
        && trimmed == name
        && name.chars().count() <= MAX_NAME_LEN
        && !name.starts_with('.')
        && !name.chars().any(|c| matches!(c, '/' | '\\' | '\0') || c.is_control());
    if ok {
        Ok(())
    } else {
        Err(GalleryError::InvalidName(name.to_string()))
    }
}

fn has_reference_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| REFERENCE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
