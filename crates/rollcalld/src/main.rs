use anyhow::{Context, Result};
use parking_lot::Mutex;
use rollcall_core::{EuclideanMatcher, GalleryStore, MjpegEncoder, OnnxFaceEncoder};
use rollcall_ledger::AttendanceLedger;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod pipeline;
mod session;
mod stream;
#[cfg(test)]
mod testutil;

use config::Config;
use dbus_interface::{AttendanceService, BUS_NAME, OBJECT_PATH};
use pipeline::Pipeline;
use stream::{CameraGate, StreamServer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");
    let config = Config::from_env();

    let scrfd = config.scrfd_model_path();
    let arcface = config.arcface_model_path();
    let encoder = OnnxFaceEncoder::load(&scrfd, &arcface, config.detect_scale)
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;
    tracing::info!(scrfd, arcface, detect_scale = config.detect_scale, "models loaded");

    let ledger = AttendanceLedger::open(config.ledger_backend, &config.ledger_path)
        .with_context(|| format!("opening ledger {}", config.ledger_path.display()))?;

    let pipeline = Arc::new(Pipeline {
        encoder: Mutex::new(Box::new(encoder)),
        gallery: GalleryStore::default(),
        matcher: EuclideanMatcher {
            threshold: config.match_threshold,
        },
        ledger,
        mjpeg: MjpegEncoder::new(config.jpeg_quality),
        faces_dir: config.faces_dir.clone(),
    });

    // Initial full build before anything can read the gallery.
    let count = {
        let pipeline = Arc::clone(&pipeline);
        tokio::task::spawn_blocking(move || pipeline.rebuild_gallery()).await??
    };
    tracing::info!(identities = count, dir = %config.faces_dir.display(), "gallery ready");

    let engine = engine::spawn_engine(Arc::clone(&pipeline))?;
    let gate = CameraGate::default();

    let listener = TcpListener::bind(config.stream_addr)
        .await
        .with_context(|| format!("binding stream listener on {}", config.stream_addr))?;
    let server = Arc::new(StreamServer {
        opener: Arc::new(config.camera()),
        pipeline: Arc::clone(&pipeline),
        gate: gate.clone(),
    });

    let service = AttendanceService {
        pipeline: Arc::clone(&pipeline),
        engine,
        gate,
        stream_addr: config.stream_addr,
    };
    let _connection = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("registering D-Bus service")?;

    tracing::info!(
        bus_name = BUS_NAME,
        stream = %config.stream_addr,
        camera = %config.camera_device,
        "rollcalld ready"
    );

    tokio::select! {
        res = server.serve(listener) => res.context("stream listener failed")?,
        res = tokio::signal::ctrl_c() => {
            res?;
            tracing::info!("rollcalld shutting down");
        }
    }

    Ok(())
}
