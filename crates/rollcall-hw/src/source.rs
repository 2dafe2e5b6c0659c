//! Frame source abstraction.
//!
//! The stream session owns exactly one source between `open` and `close`.
//! Tests substitute scripted sources so the pipeline runs without a camera.

use crate::camera::CameraError;
use crate::frame::Frame;

/// A producer of colour frames.
pub trait FrameSource: Send {
    /// Block until the next frame is available.
    fn next_frame(&mut self) -> Result<Frame, CameraError>;

    /// Release the underlying device. Calling it more than once is a no-op;
    /// `next_frame` after `close` returns [`CameraError::Closed`].
    fn close(&mut self);
}

/// Opens a fresh [`FrameSource`] for each stream session.
pub trait FrameSourceOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}
