use crate::pipeline::{Pipeline, Registration};
use rollcall_core::GalleryError;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Gallery(#[from] GalleryError),
    #[error("failed to spawn gallery engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Register {
        name: String,
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Registration, GalleryError>>,
    },
    Rebuild {
        reply: oneshot::Sender<Result<usize, GalleryError>>,
    },
}

/// Clone-safe handle to the gallery engine thread.
///
/// All gallery writes (registration and full rebuilds) run on that one
/// thread, in arrival order, so an incremental update can never be lost to
/// a concurrent rebuild.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Save the reference image and update the gallery entry for `name`.
    pub async fn register(&self, name: String, image: Vec<u8>) -> Result<Registration, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Register {
                name,
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    /// Rebuild the whole gallery from the reference directory.
    pub async fn rebuild(&self) -> Result<usize, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Rebuild { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }
}

/// Spawn the gallery engine on a dedicated OS thread.
pub fn spawn_engine(pipeline: Arc<Pipeline>) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Register { name, image, reply } => {
                        let result = pipeline.register_face(&name, &image);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Rebuild { reply } => {
                        let _ = reply.send(pipeline.rebuild_gallery());
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{self, TestEnv};

    #[tokio::test]
    async fn test_register_and_rebuild_through_engine() {
        let env = TestEnv::new();
        let pipeline = Arc::new(env.pipeline(vec![testutil::alice_face()]));
        let engine = spawn_engine(Arc::clone(&pipeline)).unwrap();

        let outcome = engine.register("carol".into(), testutil::png_bytes()).await.unwrap();
        assert_eq!(outcome, Registration::Registered);
        assert_eq!(pipeline.gallery.snapshot().names(), vec!["alice", "carol"]);

        // Only carol has a reference image on disk.
        assert_eq!(engine.rebuild().await.unwrap(), 1);
        assert_eq!(pipeline.gallery.snapshot().names(), vec!["carol"]);
    }

    #[tokio::test]
    async fn test_invalid_name_is_gallery_error() {
        let env = TestEnv::new();
        let engine = spawn_engine(Arc::new(env.pipeline(Vec::new()))).unwrap();

        let err = engine.register("../evil".into(), testutil::png_bytes()).await.unwrap_err();
        assert!(matches!(err, EngineError::Gallery(GalleryError::InvalidName(_))));
    }
}
