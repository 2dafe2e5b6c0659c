use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_hw::{Camera, CameraConfig, FrameSource};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall face attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register (or replace) a reference face image
    Register {
        /// Identity name; becomes the reference file name
        #[arg(short, long)]
        name: String,
        /// JPEG, PNG, BMP or WebP image containing one face
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Mark attendance for a person manually
    Mark {
        name: String,
    },
    /// List attendance records
    Records {
        /// Only show records for this day (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<String>,
    },
    /// List registered identities
    Faces,
    /// Rebuild the gallery from the reference directory
    Rebuild,
    /// Show daemon status
    Status,
    /// Run camera diagnostics (bypasses the daemon)
    Test {
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        /// Frames to capture
        #[arg(short, long, default_value_t = 30)]
        frames: usize,
        /// Save the last frame as an image
        #[arg(short, long)]
        save: Option<PathBuf>,
    },
}

#[zbus::proxy(
    interface = "io.rollcall.Attendance1",
    default_service = "io.rollcall.Attendance1",
    default_path = "/io/rollcall/Attendance1"
)]
trait Attendance {
    async fn register_face(&self, name: &str, image: Vec<u8>) -> zbus::Result<(bool, String)>;
    async fn mark_attendance(&self, name: &str) -> zbus::Result<(bool, String)>;
    async fn attendance_records(&self) -> zbus::Result<String>;
    async fn attendance_records_on(&self, date: &str) -> zbus::Result<String>;
    async fn registered_faces(&self) -> zbus::Result<Vec<String>>;
    async fn rebuild_gallery(&self) -> zbus::Result<u32>;
    async fn status(&self) -> zbus::Result<String>;
}

async fn connect() -> Result<AttendanceProxy<'static>> {
    let conn = zbus::connection::Builder::session()?
        .method_timeout(Duration::from_secs(60))
        .build()
        .await
        .context("connecting to the session bus")?;
    AttendanceProxy::new(&conn)
        .await
        .context("rollcalld is not reachable on the session bus")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Register { name, image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let (ok, message) = connect().await?.register_face(&name, bytes).await?;
            println!("{message}");
            if !ok {
                std::process::exit(1);
            }
        }
        Commands::Mark { name } => {
            let (ok, message) = connect().await?.mark_attendance(&name).await?;
            println!("{message}");
            if !ok {
                std::process::exit(1);
            }
        }
        Commands::Records { date } => {
            let proxy = connect().await?;
            let raw = match date {
                Some(day) => proxy.attendance_records_on(&day).await?,
                None => proxy.attendance_records().await?,
            };
            print_records(&raw)?;
        }
        Commands::Faces => {
            let names = connect().await?.registered_faces().await?;
            if names.is_empty() {
                println!("No faces registered");
            }
            for name in names {
                println!("{name}");
            }
        }
        Commands::Rebuild => {
            let count = connect().await?.rebuild_gallery().await?;
            println!("Gallery rebuilt: {count} identities");
        }
        Commands::Status => {
            let raw = connect().await?.status().await?;
            let status: serde_json::Value = serde_json::from_str(&raw)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Test {
            device,
            frames,
            save,
        } => {
            // Camera access is blocking; keep it off the async workers.
            tokio::task::spawn_blocking(move || camera_test(&device, frames, save)).await??;
        }
    }

    Ok(())
}

fn print_records(raw: &str) -> Result<()> {
    let json: serde_json::Value = serde_json::from_str(raw)?;
    let Some(records) = json["records"].as_array() else {
        bail!("unexpected AttendanceRecords reply: {raw}");
    };

    for rec in records {
        println!(
            "{:<24} {:<12} {}",
            rec["name"].as_str().unwrap_or("?"),
            rec["date"].as_str().unwrap_or("?"),
            rec["timestamp"].as_str().unwrap_or("?")
        );
    }
    if records.is_empty() {
        println!("No attendance records");
    }
    Ok(())
}

fn camera_test(device: &str, frames: usize, save: Option<PathBuf>) -> Result<()> {
    println!("Video capture devices:");
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("  (none found)");
    }
    for d in &devices {
        println!("  {}  {} [{}] {}", d.path, d.name, d.driver, d.bus);
    }

    let config = CameraConfig {
        device_path: device.to_string(),
        ..Default::default()
    };
    let mut camera = Camera::open(&config).with_context(|| format!("opening {device}"))?;
    println!(
        "Opened {device}: {}x{} {:?}",
        camera.width,
        camera.height,
        camera.pixel_format()
    );

    let start = Instant::now();
    let mut last = None;
    for i in 0..frames {
        let frame = camera.next_frame().with_context(|| format!("frame {i}"))?;
        println!(
            "  frame {:>3}  seq {:>6}  {}x{}  brightness {:>6.1}",
            i,
            frame.sequence,
            frame.width(),
            frame.height(),
            frame.avg_brightness()
        );
        last = Some(frame);
    }
    let elapsed = start.elapsed().as_secs_f32();
    camera.close();

    if frames > 0 && elapsed > 0.0 {
        println!("{frames} frames in {elapsed:.2}s ({:.1} fps)", frames as f32 / elapsed);
    }

    if let (Some(path), Some(frame)) = (save, last) {
        frame
            .image
            .save(&path)
            .with_context(|| format!("saving {}", path.display()))?;
        println!("Saved last frame to {}", path.display());
    }
    Ok(())
}
