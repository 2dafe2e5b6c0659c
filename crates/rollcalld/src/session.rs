//! One live-stream session: camera frames in, MJPEG parts out.

use crate::pipeline::Pipeline;
use image::RgbImage;
use rollcall_core::annotate::annotate_in_place;
use rollcall_core::{Cadence, StreamError};
use rollcall_hw::{CameraError, FrameSourceOpener};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Why a session stopped producing parts.
#[derive(Debug)]
pub enum SessionEnd {
    SourceFailed(CameraError),
    ClientGone,
}

#[derive(Debug)]
pub struct SessionSummary {
    pub end: SessionEnd,
    pub frames: u64,
    pub parts_sent: u64,
}

/// Per-session frame processing. Each session starts in the detect phase
/// with no cached faces.
pub struct StreamSession {
    pipeline: Arc<Pipeline>,
    cadence: Cadence,
    frames: u64,
}

impl StreamSession {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            cadence: Cadence::new(),
            frames: 0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Identify (on detect frames), annotate and encode one frame.
    pub fn process_frame(&mut self, mut frame: RgbImage) -> Result<Vec<u8>, StreamError> {
        self.frames += 1;
        let pipeline = &self.pipeline;
        let faces = self.cadence.advance(|| pipeline.identify(&frame));
        annotate_in_place(&mut frame, faces);
        pipeline.mjpeg.encode(&frame)
    }
}

/// Run a session to completion on the current (blocking) thread.
///
/// Parts go to `parts`; a closed channel means the client left. The frame
/// source is closed before this returns. Failure to open the source is the
/// only error.
pub fn run_session(
    opener: &dyn FrameSourceOpener,
    pipeline: Arc<Pipeline>,
    parts: mpsc::Sender<Vec<u8>>,
) -> Result<SessionSummary, CameraError> {
    let mut source = opener.open()?;
    tracing::info!(source = %opener.describe(), "stream session started");

    let mut session = StreamSession::new(pipeline);
    let mut parts_sent = 0u64;

    let end = loop {
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(e) => break SessionEnd::SourceFailed(e),
        };

        match session.process_frame(frame.image) {
            Ok(part) => {
                if parts.blocking_send(part).is_err() {
                    break SessionEnd::ClientGone;
                }
                parts_sent += 1;
            }
            Err(e) => tracing::warn!(seq = frame.sequence, error = %e, "dropping frame"),
        }
    };

    source.close();

    match &end {
        SessionEnd::SourceFailed(e) => tracing::warn!(error = %e, "frame source failed; ending stream"),
        SessionEnd::ClientGone => tracing::info!("stream client disconnected"),
    }

    Ok(SessionSummary {
        end,
        frames: session.frames(),
        parts_sent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{self, ScriptedOpener, TestEnv};
    use std::sync::atomic::Ordering;

    #[test]
    fn test_process_frame_alternates_detect_and_reuse() {
        let env = TestEnv::new();
        let pipeline = Arc::new(env.pipeline(vec![testutil::alice_face()]));
        let mut session = StreamSession::new(pipeline);

        for _ in 0..6 {
            let part = session.process_frame(testutil::frame()).unwrap();
            assert!(part.starts_with(b"--frame\r\n"));
        }
        assert_eq!(env.detect_calls.load(Ordering::SeqCst), 3);
        assert_eq!(session.frames(), 6);
    }

    #[test]
    fn test_reuse_frames_are_annotated() {
        let env = TestEnv::new();
        let pipeline = Arc::new(env.pipeline(vec![testutil::alice_face()]));
        let mut session = StreamSession::new(pipeline);

        let detect = session.process_frame(testutil::frame()).unwrap();
        let reuse = session.process_frame(testutil::frame()).unwrap();
        let plain = Arc::new(env.pipeline(Vec::new()))
            .mjpeg
            .encode(&testutil::frame())
            .unwrap();
        assert_eq!(detect, reuse);
        assert_ne!(reuse, plain);
    }

    #[test]
    fn test_camera_failure_ends_session_cleanly() {
        let env = TestEnv::new();
        let pipeline = Arc::new(env.pipeline(vec![testutil::alice_face()]));
        let opener = ScriptedOpener::failing_after(5);
        let (tx, mut rx) = mpsc::channel(16);

        let summary = run_session(&opener, pipeline.clone(), tx).unwrap();

        assert!(matches!(summary.end, SessionEnd::SourceFailed(CameraError::CaptureFailed(_))));
        assert_eq!(summary.frames, 5);
        assert_eq!(summary.parts_sent, 5);
        assert_eq!(env.detect_calls.load(Ordering::SeqCst), 3);
        assert_eq!(opener.log.closed.load(Ordering::SeqCst), 1);

        let mut parts = 0;
        while let Ok(part) = rx.try_recv() {
            assert!(part.ends_with(b"\r\n"));
            parts += 1;
        }
        assert_eq!(parts, 5);

        let records = pipeline.ledger.load_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "alice");
    }

    #[test]
    fn test_client_gone_ends_session_and_closes_source() {
        let env = TestEnv::new();
        let pipeline = Arc::new(env.pipeline(Vec::new()));
        let opener = ScriptedOpener::endless(std::time::Duration::ZERO);
        let (tx, rx) = mpsc::channel(2);
        drop(rx);

        let summary = run_session(&opener, pipeline, tx).unwrap();
        assert!(matches!(summary.end, SessionEnd::ClientGone));
        assert_eq!(summary.parts_sent, 0);
        assert_eq!(opener.log.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_open_failure_is_error() {
        let env = TestEnv::new();
        let pipeline = Arc::new(env.pipeline(Vec::new()));
        let opener = ScriptedOpener::failing_after(1);
        opener.open_errors.lock().push_back(CameraError::DeviceBusy);
        let (tx, _rx) = mpsc::channel(2);

        assert!(matches!(
            run_session(&opener, pipeline, tx),
            Err(CameraError::DeviceBusy)
        ));
        assert_eq!(opener.log.opened.load(Ordering::SeqCst), 0);
    }
}
