//! orientd - capture orientation daemon
//!
//! This daemon:
//! 1. Loads the capture configuration (file + env overrides)
//! 2. Loads the landmark detector in the background
//! 3. Opens a synthetic capture device and waits for the first usable frame
//! 4. Normalizes every frame's orientation, runs detection and publishes it
//! 5. Reopens the device whenever the (simulated) display orientation changes

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use capture_orient::{
    CaptureConfig, CaptureEngine, CaptureError, CountingSink, DisplayOrientation,
    OrientationUpdated, RotationAngle, SharedOrientation, StubLoader, SyntheticCapture,
    SyntheticDevice,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Capture orientation daemon (synthetic devices)")]
struct Args {
    /// Configuration file (.toml or .json).
    #[arg(long, env = "CAPTURE_ORIENT_CONFIG")]
    config: Option<PathBuf>,

    /// Stop after this many ticks (0 runs until Ctrl-C).
    #[arg(long, default_value_t = 0)]
    ticks: u64,

    /// Tick rate.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Rotate the simulated display every N ticks (0 keeps it fixed).
    #[arg(long, default_value_t = 0)]
    rotate_every: u64,

    /// Number of faces the stub detector reports per frame.
    #[arg(long, default_value_t = 1)]
    faces: u32,

    /// Clockwise sensor rotation reported by the synthetic devices.
    #[arg(long, default_value_t = 0)]
    sensor_rotation: u32,

    /// Polls the synthetic device spends reporting a degenerate frame after opening.
    #[arg(long, default_value_t = 3)]
    warmup: u32,

    /// Initial display orientation is portrait instead of landscape.
    #[arg(long)]
    portrait: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }

    let config = match args.config.as_deref() {
        Some(path) => CaptureConfig::load_from(path)?,
        None => CaptureConfig::load()?,
    };
    log::info!(
        "requested device={:?} facing={:?} {}x{} @ {} fps",
        config.device.name,
        config.device.facing,
        config.device.width,
        config.device.height,
        config.device.fps
    );

    let rotation = RotationAngle::try_from(args.sensor_rotation)?;
    let backend = SyntheticCapture::new(vec![
        SyntheticDevice::new("stub://rear", false)
            .with_rotation(rotation)
            .with_warmup(args.warmup),
        SyntheticDevice::new("stub://front", true)
            .with_rotation(rotation)
            .with_warmup(args.warmup),
    ]);
    let loader = StubLoader::new(stub_faces(args.faces));

    let initial = if args.portrait {
        DisplayOrientation::Portrait
    } else {
        DisplayOrientation::LandscapeLeft
    };
    let display = SharedOrientation::new(initial);

    let mut engine = CaptureEngine::new(
        config,
        Arc::new(backend),
        Arc::new(loader),
        Box::new(CountingSink::default()),
    )
    .with_display_source(Box::new(display.clone()));

    engine.subscribe(|event: &OrientationUpdated| match serde_json::to_string(event) {
        Ok(json) => log::debug!("orientation updated: {}", json),
        Err(err) => log::warn!("failed to encode event: {}", err),
    });

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))
        .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    engine.start()?;
    log::info!("orientd running ({} fps tick)", args.fps);

    let tick_interval = Duration::from_millis(1000 / u64::from(args.fps)).max(Duration::from_millis(1));
    let mut last_health_log = Instant::now();
    let mut tick: u64 = 0;

    while running.load(Ordering::SeqCst) && (args.ticks == 0 || tick < args.ticks) {
        tick += 1;

        if args.rotate_every > 0 && tick % args.rotate_every == 0 {
            let next = display.get().next();
            log::info!("simulated display rotation -> {:?}", next);
            display.set(next);
        }

        match engine.tick() {
            Ok(Some(report)) => log::trace!(
                "frame {} faces={} event={}",
                report.geometry,
                report.faces,
                report.event_emitted
            ),
            Ok(None) => {}
            Err(
                err @ (CaptureError::NoDeviceAvailable
                | CaptureError::DeviceOpenFailed { .. }
                | CaptureError::DetectorLoadFailed(_)),
            ) => {
                engine.shutdown();
                return Err(err.into());
            }
            Err(err) => log::warn!("tick failed: {:#}", anyhow::Error::from(err)),
        }

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            let stats = engine.stats();
            log::info!(
                "state={:?} output={:?} frames={} events={} opens={} orientation_changes={}",
                engine.state(),
                engine.output_geometry(),
                stats.frames_processed,
                stats.events_emitted,
                stats.device_opens,
                stats.orientation_changes
            );
            last_health_log = Instant::now();
        }

        std::thread::sleep(tick_interval);
    }

    log::info!("shutting down");
    let stats = engine.stats();
    engine.shutdown();
    log::info!(
        "processed {} frames, {} events, {} device opens",
        stats.frames_processed,
        stats.events_emitted,
        stats.device_opens
    );
    Ok(())
}

/// Faces laid out left to right across the frame.
fn stub_faces(count: u32) -> Vec<[f32; 4]> {
    if count == 0 {
        return Vec::new();
    }
    let slot = 1.0 / count as f32;
    (0..count)
        .map(|i| [i as f32 * slot + slot * 0.1, 0.25, slot * 0.8, 0.5])
        .collect()
}
