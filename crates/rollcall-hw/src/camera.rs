//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame};
use crate::source::{FrameSource, FrameSourceOpener};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Consecutive undecodable MJPG buffers tolerated before the read fails.
const MAX_CORRUPT_FRAMES: usize = 5;
const MMAP_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("frame source closed")]
    Closed,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Motion-JPEG, one complete JPEG per buffer.
    Mjpg,
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
}

impl PixelFormat {
    fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::Mjpg => FourCC::new(b"MJPG"),
            PixelFormat::Yuyv => FourCC::new(b"YUYV"),
        }
    }

    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(b"MJPG") {
            Some(PixelFormat::Mjpg)
        } else if fourcc == FourCC::new(b"YUYV") {
            Some(PixelFormat::Yuyv)
        } else {
            None
        }
    }
}

/// Where and how to open the camera.
#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub device_path: String,
    pub width: u32,
    pub height: u32,
    /// Frames read and discarded after open while auto-exposure settles.
    pub warmup_frames: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_path: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            warmup_frames: 0,
        }
    }
}

impl FrameSourceOpener for CameraConfig {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        let mut camera = Camera::open(self)?;
        for _ in 0..self.warmup_frames {
            camera.next_frame()?;
        }
        Ok(Box::new(camera))
    }

    fn describe(&self) -> String {
        format!("{} ({}x{})", self.device_path, self.width, self.height)
    }
}

/// V4L2 camera device handle with a persistent capture stream.
pub struct Camera {
    // Field order matters: the stream must stop before the device closes.
    stream: Option<MmapStream<'static>>,
    device: Option<Device>,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera and start streaming. MJPG is requested first;
    /// YUYV is the fallback.
    pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        let device_path = config.device_path.as_str();
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let (negotiated, pixel_format) = negotiate(&device, config)?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "negotiated format"
        );

        let stream = MmapStream::with_buffers(&device, BufType::VideoCapture, MMAP_BUFFERS)
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("busy") || msg.contains("EBUSY") {
                    CameraError::DeviceBusy
                } else {
                    CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
                }
            })?;

        Ok(Self {
            stream: Some(stream),
            device: Some(device),
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc: negotiated.fourcc,
            pixel_format,
        })
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

fn negotiate(
    device: &Device,
    config: &CameraConfig,
) -> Result<(v4l::Format, PixelFormat), CameraError> {
    let mut last = None;
    for wanted in [PixelFormat::Mjpg, PixelFormat::Yuyv] {
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = wanted.fourcc();
        fmt.width = config.width;
        fmt.height = config.height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        if let Some(pixel_format) = PixelFormat::from_fourcc(negotiated.fourcc) {
            return Ok((negotiated, pixel_format));
        }
        tracing::debug!(requested = ?wanted, got = ?negotiated.fourcc, "format not accepted");
        last = Some(negotiated.fourcc);
    }

    Err(CameraError::FormatNegotiationFailed(format!(
        "unsupported pixel format: {last:?} (need MJPG or YUYV)"
    )))
}

impl FrameSource for Camera {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let mut corrupt = 0usize;
        loop {
            let stream = self.stream.as_mut().ok_or(CameraError::Closed)?;
            let (buf, meta) = stream.next().map_err(|e| {
                CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}"))
            })?;
            let sequence = meta.sequence;
            let used = (meta.bytesused as usize).min(buf.len());
            let data = if used > 0 { &buf[..used] } else { buf };

            // `data` borrows the stream; convert before touching `self` again.
            let converted = match self.pixel_format {
                PixelFormat::Mjpg => frame::decode_mjpg(data),
                PixelFormat::Yuyv => frame::yuyv_to_rgb(data, self.width, self.height),
            };

            match converted {
                Ok(image) => return Ok(Frame::new(image, sequence)),
                Err(e) => {
                    corrupt += 1;
                    tracing::debug!(seq = sequence, error = %e, "dropping undecodable frame");
                    if corrupt >= MAX_CORRUPT_FRAMES {
                        return Err(CameraError::CaptureFailed(format!(
                            "{corrupt} consecutive undecodable frames: {e}"
                        )));
                    }
                }
            }
        }
    }

    fn close(&mut self) {
        if self.stream.is_none() && self.device.is_none() {
            return;
        }
        self.stream = None;
        self.device = None;
        tracing::info!(device = %self.device_path, "camera closed");
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_fourcc_roundtrip() {
        for fmt in [PixelFormat::Mjpg, PixelFormat::Yuyv] {
            assert_eq!(PixelFormat::from_fourcc(fmt.fourcc()), Some(fmt));
        }
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"GREY")), None);
    }

    #[test]
    fn test_open_missing_device() {
        let config = CameraConfig {
            device_path: "/dev/does-not-exist-video99".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.open(),
            Err(CameraError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_default_config() {
        let config = CameraConfig::default();
        assert_eq!(config.device_path, "/dev/video0");
        assert_eq!((config.width, config.height), (640, 480));
        assert!(config.describe().contains("640x480"));
    }
}
