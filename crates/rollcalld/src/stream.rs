//! MJPEG-over-HTTP stream listener.
//!
//! Every accepted connection gets the live stream regardless of request
//! path. Only one session may hold the camera at a time.

use crate::pipeline::Pipeline;
use crate::session::{self, SessionEnd};
use rollcall_core::mjpeg::CONTENT_TYPE;
use rollcall_hw::FrameSourceOpener;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};

/// Parts buffered between the session thread and the socket writer.
const PART_QUEUE: usize = 2;
const MAX_REQUEST_HEAD: usize = 8 * 1024;
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(2);

const BUSY_BODY: &str = "camera busy: another stream client is connected\n";

/// Single-permit gate: holding the permit means owning the camera.
#[derive(Clone)]
pub struct CameraGate {
    permits: Arc<Semaphore>,
}

impl Default for CameraGate {
    fn default() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
        }
    }
}

impl CameraGate {
    pub fn is_busy(&self) -> bool {
        self.permits.available_permits() == 0
    }
}

pub struct StreamServer {
    pub opener: Arc<dyn FrameSourceOpener>,
    pub pipeline: Arc<Pipeline>,
    pub gate: CameraGate,
}

impl StreamServer {
    /// Accept connections forever.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "stream listening");
        }
        loop {
            let (socket, peer) = listener.accept().await?;
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = server.handle_client(socket, peer).await {
                    tracing::debug!(%peer, error = %e, "stream connection error");
                }
            });
        }
    }

    async fn handle_client(&self, mut socket: TcpStream, peer: SocketAddr) -> std::io::Result<()> {
        drain_request_head(&mut socket).await;

        let permit = match Arc::clone(&self.gate.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::info!(%peer, "rejecting stream client: camera busy");
                let head = format!(
                    "HTTP/1.0 503 Service Unavailable\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    BUSY_BODY.len()
                );
                socket.write_all(head.as_bytes()).await?;
                socket.write_all(BUSY_BODY.as_bytes()).await?;
                return socket.shutdown().await;
            }
        };

        tracing::info!(%peer, "stream client connected");
        let head = format!(
            "HTTP/1.0 200 OK\r\nContent-Type: {CONTENT_TYPE}\r\nCache-Control: no-cache, no-store\r\nPragma: no-cache\r\nConnection: close\r\n\r\n"
        );
        socket.write_all(head.as_bytes()).await?;

        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(PART_QUEUE);
        let opener = Arc::clone(&self.opener);
        let pipeline = Arc::clone(&self.pipeline);
        let producer = tokio::task::spawn_blocking(move || {
            let summary = session::run_session(opener.as_ref(), pipeline, tx);
            // The source is closed by now; release the camera.
            drop(permit);
            summary
        });

        let mut write_error = None;
        while let Some(part) = rx.recv().await {
            if let Err(e) = socket.write_all(&part).await {
                write_error = Some(e);
                break;
            }
        }
        // Unblocks a producer waiting in `blocking_send`.
        drop(rx);

        match producer.await {
            Ok(Ok(summary)) => {
                let reason = match &summary.end {
                    SessionEnd::SourceFailed(_) => "camera failure",
                    SessionEnd::ClientGone => "client gone",
                };
                tracing::info!(%peer, frames = summary.frames, parts = summary.parts_sent, reason, "stream session ended");
            }
            Ok(Err(e)) => tracing::error!(%peer, error = %e, "could not open camera"),
            Err(e) => tracing::error!(%peer, error = %e, "stream session panicked"),
        }

        if let Some(e) = write_error {
            tracing::debug!(%peer, error = %e, "client write failed");
            return Ok(());
        }
        let _ = socket.shutdown().await;
        Ok(())
    }
}

/// Read and discard the request head, best effort. The response never
/// depends on it.
async fn drain_request_head(socket: &mut TcpStream) {
    let mut head = Vec::with_capacity(512);
    let mut buf = [0u8; 512];
    let read = async {
        while head.len() < MAX_REQUEST_HEAD {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    head.extend_from_slice(&buf[..n]);
                    if head.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
            }
        }
    };
    let _ = tokio::time::timeout(REQUEST_READ_TIMEOUT, read).await;
    if let Some(line) = head.split(|&b| b == b'\r').next() {
        tracing::debug!(request = %String::from_utf8_lossy(line), "stream request");
    }
}
