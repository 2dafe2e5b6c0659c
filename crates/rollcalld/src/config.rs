use rollcall_core::matcher::DEFAULT_MATCH_THRESHOLD;
use rollcall_core::mjpeg::DEFAULT_JPEG_QUALITY;
use rollcall_hw::CameraConfig;
use rollcall_ledger::LedgerBackend;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Requested capture size; the driver may pick the nearest it supports.
    pub width: u32,
    pub height: u32,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Directory of reference images, one `<name>.<ext>` per identity.
    pub faces_dir: PathBuf,
    /// Attendance ledger file (JSON array or SQLite database).
    pub ledger_path: PathBuf,
    pub ledger_backend: LedgerBackend,
    /// Maximum Euclidean distance accepted as a match.
    pub match_threshold: f32,
    /// Downscale factor applied before detection, in (0, 1].
    pub detect_scale: f32,
    pub jpeg_quality: u8,
    /// Address the MJPEG stream listens on.
    pub stream_addr: SocketAddr,
    /// Frames discarded after opening the camera (AGC/AE stabilization).
    pub warmup_frames: usize,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| rollcall_core::default_model_dir());

        let data_dir = rollcall_core::data_home().join("rollcall");

        let faces_dir = std::env::var("ROLLCALL_FACES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("faces"));

        let ledger_backend = std::env::var("ROLLCALL_LEDGER_BACKEND")
            .ok()
            .and_then(|v| match v.parse() {
                Ok(b) => Some(b),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring ROLLCALL_LEDGER_BACKEND; using json");
                    None
                }
            })
            .unwrap_or(LedgerBackend::Json);

        let default_ledger = match ledger_backend {
            LedgerBackend::Json => "attendance.json",
            LedgerBackend::Sqlite => "attendance.db",
        };
        let ledger_path = std::env::var("ROLLCALL_LEDGER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join(default_ledger));

        let mut detect_scale = env_f32("ROLLCALL_DETECT_SCALE", 0.5);
        if !(detect_scale > 0.0 && detect_scale <= 1.0) {
            tracing::warn!(detect_scale, "ROLLCALL_DETECT_SCALE out of range (0, 1]; using 0.5");
            detect_scale = 0.5;
        }

        let stream_addr = std::env::var("ROLLCALL_STREAM_ADDR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_stream_addr);

        Self {
            camera_device: std::env::var("ROLLCALL_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            width: env_u32("ROLLCALL_WIDTH", 640),
            height: env_u32("ROLLCALL_HEIGHT", 480),
            model_dir,
            faces_dir,
            ledger_path,
            ledger_backend,
            match_threshold: env_f32("ROLLCALL_MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD),
            detect_scale,
            jpeg_quality: env_u8("ROLLCALL_JPEG_QUALITY", DEFAULT_JPEG_QUALITY),
            stream_addr,
            warmup_frames: env_usize("ROLLCALL_WARMUP_FRAMES", 4),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join(rollcall_core::SCRFD_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join(rollcall_core::ARCFACE_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    pub fn camera(&self) -> CameraConfig {
        CameraConfig {
            device_path: self.camera_device.clone(),
            width: self.width,
            height: self.height,
            warmup_frames: self.warmup_frames,
        }
    }
}

fn default_stream_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u8(key: &str, default: u8) -> u8 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
