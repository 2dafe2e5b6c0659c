use crate::engine::{EngineError, EngineHandle};
use crate::pipeline::{Pipeline, Registration};
use crate::stream::CameraGate;
use rollcall_core::gallery::{self, GalleryError};
use chrono::NaiveDate;
use rollcall_ledger::LedgerError;
use std::net::SocketAddr;
use std::sync::Arc;
use zbus::interface;

pub const BUS_NAME: &str = "io.rollcall.Attendance1";
pub const OBJECT_PATH: &str = "/io/rollcall/Attendance1";

/// D-Bus interface for the attendance daemon.
///
/// Bus name: io.rollcall.Attendance1
/// Object path: /io/rollcall/Attendance1
pub struct AttendanceService {
    pub pipeline: Arc<Pipeline>,
    pub engine: EngineHandle,
    pub gate: CameraGate,
    pub stream_addr: SocketAddr,
}

fn engine_error(e: EngineError) -> zbus::fdo::Error {
    match e {
        EngineError::Gallery(GalleryError::InvalidName(name)) => {
            zbus::fdo::Error::InvalidArgs(format!("invalid name: {name:?}"))
        }
        EngineError::Gallery(GalleryError::UnsupportedFormat) => zbus::fdo::Error::InvalidArgs(
            "image must be JPEG, PNG, BMP or WebP".into(),
        ),
        EngineError::Gallery(GalleryError::Io(e)) => zbus::fdo::Error::IOError(e.to_string()),
        other => zbus::fdo::Error::Failed(other.to_string()),
    }
}

fn ledger_error(e: LedgerError) -> zbus::fdo::Error {
    match e {
        LedgerError::InvalidName(name) => {
            zbus::fdo::Error::InvalidArgs(format!("invalid name: {name:?}"))
        }
        other => zbus::fdo::Error::Failed(format!("attendance ledger: {other}")),
    }
}

fn join_error(e: tokio::task::JoinError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(format!("worker task failed: {e}"))
}

#[interface(name = "io.rollcall.Attendance1")]
impl AttendanceService {
    /// Save a reference image for `name` and update the gallery.
    ///
    /// `success` is false when the image was saved but holds no usable face;
    /// the identity is then removed from the gallery until a new image is
    /// registered.
    async fn register_face(&self, name: &str, image: Vec<u8>) -> zbus::fdo::Result<(bool, String)> {
        tracing::info!(name, bytes = image.len(), "register_face requested");
        match self.engine.register(name.to_string(), image).await {
            Ok(Registration::Registered) => Ok((true, format!("registered {name}"))),
            Ok(Registration::NoFace) => Ok((
                false,
                format!("no face found in image; {name} removed from gallery"),
            )),
            Ok(Registration::Unusable(reason)) => Ok((
                false,
                format!("image unusable ({reason}); {name} removed from gallery"),
            )),
            Err(e) => {
                tracing::warn!(name, error = %e, "register_face failed");
                Err(engine_error(e))
            }
        }
    }

    /// Record `name` as present today. `success` is false if already recorded.
    async fn mark_attendance(&self, name: &str) -> zbus::fdo::Result<(bool, String)> {
        tracing::info!(name, "mark_attendance requested");
        let pipeline = Arc::clone(&self.pipeline);
        let owned = name.to_string();
        let first = tokio::task::spawn_blocking(move || pipeline.ledger.record(&owned))
            .await
            .map_err(join_error)?
            .map_err(ledger_error)?;

        if first {
            Ok((true, format!("attendance recorded for {name}")))
        } else {
            Ok((false, format!("{name} already recorded today")))
        }
    }

    /// All records in insertion order, as `{"records": [...]}`.
    async fn attendance_records(&self) -> zbus::fdo::Result<String> {
        let pipeline = Arc::clone(&self.pipeline);
        let records = tokio::task::spawn_blocking(move || pipeline.ledger.load_all())
            .await
            .map_err(join_error)?
            .map_err(ledger_error)?;

        Ok(serde_json::json!({ "records": records }).to_string())
    }

    /// Records for one calendar day (`YYYY-MM-DD`), same shape as `AttendanceRecords`.
    async fn attendance_records_on(&self, date: &str) -> zbus::fdo::Result<String> {
        let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("invalid date {date:?}: {e}")))?;
        let pipeline = Arc::clone(&self.pipeline);
        let records = tokio::task::spawn_blocking(move || pipeline.ledger.records_on(day))
            .await
            .map_err(join_error)?
            .map_err(ledger_error)?;

        Ok(serde_json::json!({ "records": records }).to_string())
    }

    /// Identities with a reference image on disk.
    async fn registered_faces(&self) -> zbus::fdo::Result<Vec<String>> {
        let dir = self.pipeline.faces_dir.clone();
        tokio::task::spawn_blocking(move || gallery::list_identities(&dir))
            .await
            .map_err(join_error)?
            .map_err(|e| zbus::fdo::Error::IOError(e.to_string()))
    }

    /// Full gallery rebuild; returns the number of identities loaded.
    async fn rebuild_gallery(&self) -> zbus::fdo::Result<u32> {
        tracing::info!("rebuild_gallery requested");
        let count = self.engine.rebuild().await.map_err(engine_error)?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "gallery_size": self.pipeline.gallery.snapshot().len(),
            "match_threshold": self.pipeline.matcher.threshold,
            "ledger_backend": self.pipeline.ledger.backend(),
            "stream_addr": self.stream_addr.to_string(),
            "session_active": self.gate.is_busy(),
        })
        .to_string())
    }
}
