//! rollcall-hw: Hardware abstraction for camera capture.
//!
//! Provides a V4L2 camera (MJPG or YUYV, converted to RGB) behind the
//! [`FrameSource`] trait so the stream pipeline can run against any source.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraConfig, CameraError, DeviceInfo, PixelFormat};
pub use frame::Frame;
pub use source::{FrameSource, FrameSourceOpener};
