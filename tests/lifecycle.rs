//! Capture lifecycle tests.
//!
//! Drives `CaptureEngine` tick by tick against the synthetic capture backend
//! and the stub detector, covering startup sequencing, reopen on display
//! rotation, error paths and teardown.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use capture_orient::{
    CaptureBackend, CaptureConfig, CaptureEngine, CaptureError, CaptureFrame, CaptureStream,
    CountingSink, DetectorLoader, DeviceInfo, DisplayOrientation, DisplaySink, FaceRect,
    FixedOrientation, Geometry, LandmarkDetector, LandmarkPoint, LifecycleState, OpenRequest,
    OrientationUpdated, Rgba, RotationAngle, SharedOrientation, StubLoader, SyntheticCapture,
    SyntheticDevice,
};

const MAX_TICKS: usize = 2_000;
const TICK: Duration = Duration::from_millis(2);

fn test_config() -> CaptureConfig {
    let mut cfg = CaptureConfig::default();
    cfg.device.width = 64;
    cfg.device.height = 48;
    cfg
}

fn rear_device() -> SyntheticDevice {
    SyntheticDevice::new("stub://rear", false).with_warmup(2)
}

fn build(
    cfg: CaptureConfig,
    backend: &SyntheticCapture,
    loader: &StubLoader,
) -> CaptureEngine {
    CaptureEngine::new(
        cfg,
        Arc::new(backend.clone()),
        Arc::new(loader.clone()),
        Box::new(CountingSink::default()),
    )
}

fn pump_until(engine: &mut CaptureEngine, target: LifecycleState) -> Result<(), CaptureError> {
    for _ in 0..MAX_TICKS {
        if engine.state() == target {
            return Ok(());
        }
        engine.tick()?;
        std::thread::sleep(TICK);
    }
    panic!(
        "engine never reached {:?} (stuck in {:?})",
        target,
        engine.state()
    );
}

fn pump_until_error(engine: &mut CaptureEngine) -> CaptureError {
    for _ in 0..MAX_TICKS {
        if let Err(err) = engine.tick() {
            return err;
        }
        std::thread::sleep(TICK);
    }
    panic!("engine never reported an error (state {:?})", engine.state());
}

#[test]
fn reaches_streaming_after_load_open_and_first_frame() -> Result<(), CaptureError> {
    let backend = SyntheticCapture::new(vec![rear_device()]);
    let loader = StubLoader::new(vec![[0.25, 0.25, 0.5, 0.5]]);
    let mut engine = build(test_config(), &backend, &loader)
        .with_display_source(Box::new(FixedOrientation(DisplayOrientation::LandscapeLeft)));

    engine.start()?;
    assert_eq!(engine.state(), LifecycleState::DetectorLoading);
    pump_until(&mut engine, LifecycleState::Streaming)?;

    assert_eq!(loader.load_count(), 1);
    assert_eq!(backend.open_count(), 1);
    assert_eq!(engine.output_geometry(), Some(Geometry::new(64, 48)));
    assert_eq!(engine.epoch(), Some(DisplayOrientation::LandscapeLeft));
    assert!(!engine.is_opening());

    let report = engine.tick()?.expect("streaming tick publishes a frame");
    assert_eq!(report.geometry, Geometry::new(64, 48));
    assert_eq!(report.faces, 1);
    assert_eq!(engine.stats().frames_processed, 1);
    Ok(())
}

#[test]
fn empty_device_list_never_streams() -> Result<(), CaptureError> {
    let backend = SyntheticCapture::new(vec![]);
    let loader = StubLoader::new(vec![]);
    let mut engine = build(test_config(), &backend, &loader);

    engine.start()?;
    let err = pump_until_error(&mut engine);
    assert!(matches!(err, CaptureError::NoDeviceAvailable), "{err:?}");
    assert_eq!(engine.state(), LifecycleState::DeviceOpening);
    assert!(!engine.is_opening());

    for _ in 0..20 {
        assert_eq!(engine.tick()?, None);
        assert_eq!(engine.state(), LifecycleState::DeviceOpening);
    }
    assert_eq!(engine.stats().device_opens, 0);
    Ok(())
}

#[test]
fn failed_open_can_be_retried_externally() -> Result<(), CaptureError> {
    let backend = SyntheticCapture::new(vec![]);
    let loader = StubLoader::new(vec![]);
    let mut engine = build(test_config(), &backend, &loader);

    engine.start()?;
    let _ = pump_until_error(&mut engine);
    assert!(engine.request_reopen()?);
    let err = pump_until_error(&mut engine);
    assert!(matches!(err, CaptureError::NoDeviceAvailable));
    assert_eq!(loader.load_count(), 1);
    Ok(())
}

#[test]
fn display_rotation_reopens_once_without_reloading_detector() -> Result<(), CaptureError> {
    let backend = SyntheticCapture::new(vec![rear_device()]);
    let loader = StubLoader::new(vec![]);
    let display = SharedOrientation::new(DisplayOrientation::LandscapeLeft);
    let mut engine =
        build(test_config(), &backend, &loader).with_display_source(Box::new(display.clone()));

    engine.start()?;
    pump_until(&mut engine, LifecycleState::Streaming)?;
    assert_eq!(engine.output_geometry(), Some(Geometry::new(64, 48)));

    display.set(DisplayOrientation::Portrait);
    assert_eq!(engine.tick()?, None);
    assert_eq!(engine.state(), LifecycleState::DeviceOpening);
    assert_eq!(engine.stats().orientation_changes, 1);

    pump_until(&mut engine, LifecycleState::Streaming)?;
    assert_eq!(engine.output_geometry(), Some(Geometry::new(48, 64)));
    assert_eq!(engine.epoch(), Some(DisplayOrientation::Portrait));
    assert!(engine.current_plan().is_some_and(|plan| plan.rotate90));

    // Stable orientation: keep streaming, no further reopen.
    for _ in 0..5 {
        engine.tick()?;
    }
    assert_eq!(engine.state(), LifecycleState::Streaming);
    assert_eq!(engine.stats().orientation_changes, 1);
    assert_eq!(backend.open_count(), 2);
    assert_eq!(engine.stats().device_opens, 2);
    assert_eq!(loader.load_count(), 1);
    assert_eq!(engine.stats().detector_loads, 1);
    Ok(())
}

#[test]
fn reopen_while_opening_is_dropped() -> Result<(), CaptureError> {
    let backend =
        SyntheticCapture::new(vec![rear_device()]).with_open_delay(Duration::from_millis(150));
    let loader = StubLoader::new(vec![]);
    let mut engine = build(test_config(), &backend, &loader);

    engine.start()?;
    pump_until(&mut engine, LifecycleState::DeviceOpening)?;
    assert!(engine.is_opening());
    assert!(!engine.request_reopen()?);
    assert!(!engine.request_reopen()?);

    pump_until(&mut engine, LifecycleState::Streaming)?;
    assert_eq!(backend.open_count(), 1);
    Ok(())
}

#[test]
fn one_event_per_tick_carries_first_face() -> Result<(), CaptureError> {
    let backend = SyntheticCapture::new(vec![rear_device()]);
    let loader = StubLoader::new(vec![
        [0.0, 0.0, 0.25, 0.25],
        [0.5, 0.0, 0.25, 0.25],
        [0.0, 0.5, 0.25, 0.25],
    ]);
    let mut engine = build(test_config(), &backend, &loader);
    let seen: Arc<Mutex<Vec<OrientationUpdated>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    engine.subscribe(move |event: &OrientationUpdated| {
        recorder.lock().unwrap().push(event.clone());
    });

    engine.start()?;
    pump_until(&mut engine, LifecycleState::Streaming)?;
    let report = engine.tick()?.expect("frame processed");

    assert_eq!(report.faces, 3);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].rect, FaceRect::new(0, 0, 16, 12));
    assert_eq!(seen[0].landmarks.len(), 5);
    assert_eq!(engine.stats().events_emitted, 1);
    Ok(())
}

#[test]
fn forced_rotation_applies_without_display_source() -> Result<(), CaptureError> {
    let backend = SyntheticCapture::new(vec![rear_device()]);
    let loader = StubLoader::new(vec![]);
    let mut cfg = test_config();
    cfg.orientation.rotate90 = true;
    let mut engine = build(cfg, &backend, &loader);

    engine.start()?;
    pump_until(&mut engine, LifecycleState::Streaming)?;
    assert_eq!(engine.epoch(), None);
    assert_eq!(engine.output_geometry(), Some(Geometry::new(48, 64)));
    let report = engine.tick()?.expect("frame processed");
    assert_eq!(report.geometry, Geometry::new(48, 64));
    Ok(())
}

#[test]
fn disabled_rotation_detection_ignores_display() -> Result<(), CaptureError> {
    let backend = SyntheticCapture::new(vec![rear_device()]);
    let loader = StubLoader::new(vec![]);
    let mut cfg = test_config();
    cfg.orientation.detect_display_rotation = false;
    let display = SharedOrientation::new(DisplayOrientation::Portrait);
    let mut engine = build(cfg, &backend, &loader).with_display_source(Box::new(display.clone()));

    engine.start()?;
    pump_until(&mut engine, LifecycleState::Streaming)?;
    assert_eq!(engine.output_geometry(), Some(Geometry::new(64, 48)));

    display.set(DisplayOrientation::LandscapeRight);
    engine.tick()?;
    assert_eq!(engine.state(), LifecycleState::Streaming);
    assert_eq!(backend.open_count(), 1);
    Ok(())
}

#[test]
fn front_camera_upside_down_flips_vertically() -> Result<(), CaptureError> {
    let backend = SyntheticCapture::new(vec![
        SyntheticDevice::new("stub://rear", false),
        SyntheticDevice::new("stub://front", true).with_rotation(RotationAngle::Deg180),
    ]);
    let loader = StubLoader::new(vec![]);
    let mut cfg = test_config();
    cfg.device.facing = capture_orient::Facing::Front;
    let mut engine = build(cfg, &backend, &loader);

    engine.start()?;
    pump_until(&mut engine, LifecycleState::Streaming)?;
    let plan = engine.current_plan().expect("plan computed");
    assert!(!plan.rotate90);
    assert!(plan.flip_vertical);
    assert!(!plan.flip_horizontal);
    Ok(())
}

#[test]
fn detector_load_failure_is_fatal_to_startup() {
    let backend = SyntheticCapture::new(vec![rear_device()]);
    let loader = StubLoader::new(vec![]);
    let mut cfg = test_config();
    cfg.detector_model_path = "/nonexistent/sp_human_face_68.dat".into();
    let mut engine = build(cfg, &backend, &loader);

    engine.start().expect("start");
    let err = pump_until_error(&mut engine);
    assert!(matches!(err, CaptureError::DetectorLoadFailed(_)), "{err:?}");
    assert_eq!(engine.state(), LifecycleState::DetectorLoading);
    assert_eq!(backend.open_count(), 0);
}

#[test]
fn shutdown_releases_and_allows_restart() -> Result<(), CaptureError> {
    let backend = SyntheticCapture::new(vec![rear_device()]);
    let loader = StubLoader::new(vec![]);
    let mut engine = build(test_config(), &backend, &loader);

    engine.start()?;
    pump_until(&mut engine, LifecycleState::Streaming)?;
    engine.shutdown();
    assert_eq!(engine.state(), LifecycleState::Idle);
    assert_eq!(engine.output_geometry(), None);
    assert_eq!(engine.tick()?, None);

    engine.start()?;
    pump_until(&mut engine, LifecycleState::Streaming)?;
    assert_eq!(loader.load_count(), 2);
    assert_eq!(backend.open_count(), 2);
    Ok(())
}

/// Capture backend whose stream replays queued frames, then repeats a valid one.
#[derive(Clone, Default)]
struct ScriptedCapture {
    script: Arc<Mutex<VecDeque<CaptureFrame>>>,
    open_delay: Duration,
    opened: Arc<AtomicU64>,
    closed: Arc<AtomicU64>,
}

impl ScriptedCapture {
    fn with_open_delay(delay: Duration) -> Self {
        Self {
            open_delay: delay,
            ..Self::default()
        }
    }

    fn push(&self, frame: CaptureFrame) {
        self.script.lock().unwrap().push_back(frame);
    }

    fn opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    fn closed(&self) -> u64 {
        self.closed.load(Ordering::SeqCst)
    }
}

impl CaptureBackend for ScriptedCapture {
    fn list_devices(&self) -> Vec<DeviceInfo> {
        vec![DeviceInfo::new("scripted://rear", false)]
    }

    fn open(
        &self,
        device: &DeviceInfo,
        _request: &OpenRequest,
    ) -> anyhow::Result<Box<dyn CaptureStream>> {
        std::thread::sleep(self.open_delay);
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedStream {
            device: device.clone(),
            script: self.script.clone(),
            closed: self.closed.clone(),
            is_closed: false,
        }))
    }
}

struct ScriptedStream {
    device: DeviceInfo,
    script: Arc<Mutex<VecDeque<CaptureFrame>>>,
    closed: Arc<AtomicU64>,
    is_closed: bool,
}

impl CaptureStream for ScriptedStream {
    fn device(&self) -> &DeviceInfo {
        &self.device
    }

    fn poll(&mut self) -> anyhow::Result<Option<CaptureFrame>> {
        let next = self.script.lock().unwrap().pop_front();
        Ok(Some(next.unwrap_or_else(|| frame(64, 48, true))))
    }

    fn close(&mut self) {
        if !self.is_closed {
            self.is_closed = true;
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn frame(width: u32, height: u32, has_new_data: bool) -> CaptureFrame {
    CaptureFrame {
        width,
        height,
        rotation_angle: RotationAngle::Deg0,
        is_front_facing: false,
        has_new_data,
        pixels: vec![[0, 0, 0, 255]; (width * height) as usize],
    }
}

/// Sink whose publish count is visible from outside the engine.
#[derive(Clone, Default)]
struct RecordingSink {
    published: Arc<AtomicU64>,
}

impl DisplaySink for RecordingSink {
    fn publish(&mut self, _pixels: &[Rgba], _geometry: Geometry) -> anyhow::Result<()> {
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Loader whose detectors record `dispose()`.
#[derive(Clone, Default)]
struct RecordingLoader {
    delay: Duration,
    loaded: Arc<AtomicU64>,
    disposed: Arc<AtomicU64>,
}

struct RecordingDetector {
    disposed: Arc<AtomicU64>,
}

impl LandmarkDetector for RecordingDetector {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn detect_faces(&mut self, _pixels: &[Rgba], _geometry: Geometry) -> anyhow::Result<Vec<FaceRect>> {
        Ok(Vec::new())
    }

    fn detect_landmarks(&mut self, _rect: &FaceRect) -> anyhow::Result<Vec<LandmarkPoint>> {
        Ok(Vec::new())
    }

    fn dispose(&mut self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

impl DetectorLoader for RecordingLoader {
    fn load(&self, _model_path: &Path) -> anyhow::Result<Box<dyn LandmarkDetector>> {
        std::thread::sleep(self.delay);
        self.loaded.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingDetector {
            disposed: self.disposed.clone(),
        }))
    }
}

fn scripted_engine(backend: &ScriptedCapture, sink: &RecordingSink) -> CaptureEngine {
    CaptureEngine::new(
        CaptureConfig::default(),
        Arc::new(backend.clone()),
        Arc::new(StubLoader::new(vec![])),
        Box::new(sink.clone()),
    )
}

const LATE_OPEN: Duration = Duration::from_millis(200);
const SETTLE: Duration = Duration::from_millis(500);

#[test]
fn dropping_engine_mid_open_closes_late_stream() -> Result<(), CaptureError> {
    let backend = ScriptedCapture::with_open_delay(LATE_OPEN);
    let mut engine = scripted_engine(&backend, &RecordingSink::default());

    engine.start()?;
    pump_until(&mut engine, LifecycleState::DeviceOpening)?;
    drop(engine);
    std::thread::sleep(SETTLE);

    assert_eq!(backend.opened(), 1);
    assert_eq!(backend.closed(), 1);
    Ok(())
}

#[test]
fn shutdown_mid_open_closes_late_stream_without_further_ticks() -> Result<(), CaptureError> {
    let backend = ScriptedCapture::with_open_delay(LATE_OPEN);
    let mut engine = scripted_engine(&backend, &RecordingSink::default());

    engine.start()?;
    pump_until(&mut engine, LifecycleState::DeviceOpening)?;
    engine.shutdown();
    std::thread::sleep(SETTLE);

    assert_eq!(backend.opened(), 1);
    assert_eq!(backend.closed(), 1);
    assert_eq!(engine.state(), LifecycleState::Idle);
    Ok(())
}

#[test]
fn dropping_engine_mid_load_disposes_late_detector() -> Result<(), CaptureError> {
    let backend = ScriptedCapture::default();
    let loader = RecordingLoader {
        delay: LATE_OPEN,
        ..RecordingLoader::default()
    };
    let mut engine = CaptureEngine::new(
        CaptureConfig::default(),
        Arc::new(backend.clone()),
        Arc::new(loader.clone()),
        Box::new(RecordingSink::default()),
    );

    engine.start()?;
    assert_eq!(engine.state(), LifecycleState::DetectorLoading);
    drop(engine);
    std::thread::sleep(SETTLE);

    assert_eq!(loader.loaded.load(Ordering::SeqCst), 1);
    assert_eq!(loader.disposed.load(Ordering::SeqCst), 1);
    assert_eq!(backend.opened(), 0);
    Ok(())
}

#[test]
fn open_from_before_shutdown_is_discarded_after_restart() -> Result<(), CaptureError> {
    let backend = ScriptedCapture::with_open_delay(LATE_OPEN);
    let mut engine = scripted_engine(&backend, &RecordingSink::default());

    engine.start()?;
    pump_until(&mut engine, LifecycleState::DeviceOpening)?;
    engine.shutdown();
    engine.start()?;
    pump_until(&mut engine, LifecycleState::Streaming)?;

    assert_eq!(backend.opened(), 2);
    assert_eq!(backend.closed(), 1);
    assert_eq!(engine.stats().device_opens, 1);
    assert_eq!(engine.stats().detector_loads, 2);
    Ok(())
}

#[test]
fn tick_without_new_data_publishes_nothing() -> Result<(), CaptureError> {
    let backend = ScriptedCapture::default();
    let sink = RecordingSink::default();
    backend.push(frame(64, 48, true));
    backend.push(frame(64, 48, false));
    let mut engine = scripted_engine(&backend, &sink);

    engine.start()?;
    pump_until(&mut engine, LifecycleState::Streaming)?;

    assert_eq!(engine.tick()?, None);
    assert_eq!(engine.state(), LifecycleState::Streaming);
    assert_eq!(engine.stats().frames_processed, 0);
    assert_eq!(sink.published.load(Ordering::SeqCst), 0);

    assert!(engine.tick()?.is_some());
    assert_eq!(engine.stats().frames_processed, 1);
    assert_eq!(sink.published.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn invalid_frames_while_streaming_are_skipped() -> Result<(), CaptureError> {
    let backend = ScriptedCapture::default();
    let sink = RecordingSink::default();
    backend.push(frame(64, 48, true));
    backend.push(frame(16, 16, true));
    let mut short = frame(64, 48, true);
    short.pixels.truncate(100);
    backend.push(short);
    let mut engine = scripted_engine(&backend, &sink);

    engine.start()?;
    pump_until(&mut engine, LifecycleState::Streaming)?;

    for _ in 0..2 {
        assert_eq!(engine.tick()?, None);
        assert_eq!(engine.state(), LifecycleState::Streaming);
    }
    assert_eq!(engine.output_geometry(), Some(Geometry::new(64, 48)));
    assert_eq!(engine.stats().frames_processed, 0);
    assert_eq!(sink.published.load(Ordering::SeqCst), 0);

    let report = engine.tick()?.expect("valid frame processed");
    assert_eq!(report.geometry, Geometry::new(64, 48));
    assert_eq!(sink.published.load(Ordering::SeqCst), 1);
    Ok(())
}
