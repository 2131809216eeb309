//! Capture lifecycle.
//!
//! `CaptureEngine` owns the single `LifecycleState` and advances it only on
//! confirmed success:
//!
//! ```text
//! Idle -> DetectorLoading -> DeviceOpening -> AwaitingFirstFrame -> Streaming
//!                                  ^                                   |
//!                                  +---- display orientation changed --+
//! ```
//!
//! The detector load and the device open run on background threads. Their
//! results come back over one channel that is drained at the start of every
//! `tick()`, so all state changes happen on the thread that calls `tick()`.
//! Nothing is cancellable; a reopen request while an open is in flight is
//! dropped. A stream or detector that finishes after teardown is released by
//! the worker (or by whoever drops the undelivered result), never leaked.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;

use crate::config::CaptureConfig;
use crate::detect::{DetectorLoader, LandmarkDetector};
use crate::display::{DisplayOrientationSource, DisplaySink};
use crate::error::{CaptureError, Result};
use crate::events::{EventBus, OrientationUpdated};
use crate::frame::{CaptureFrame, Geometry};
use crate::ingest::{select_device, CaptureBackend, CaptureStream, OpenRequest};
use crate::orientation::{DisplayOrientation, Facing, OrientationInputs, OrientationPlan, PlanCache};
use crate::processing::{process_frame, FrameReport};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    Idle,
    DetectorLoading,
    DeviceOpening,
    AwaitingFirstFrame,
    Streaming,
}

/// Counters for health logging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub detector_loads: u64,
    pub device_opens: u64,
    pub orientation_changes: u64,
    pub frames_processed: u64,
    pub events_emitted: u64,
}

enum StageResult {
    DetectorLoaded {
        generation: u64,
        result: anyhow::Result<LoadedDetector>,
    },
    DeviceOpened {
        generation: u64,
        result: Result<OpenedStream>,
    },
}

/// Detector handed back by the load worker. Disposed on drop unless claimed.
struct LoadedDetector(Option<Box<dyn LandmarkDetector>>);

impl LoadedDetector {
    fn claim(mut self) -> Option<Box<dyn LandmarkDetector>> {
        self.0.take()
    }
}

impl Drop for LoadedDetector {
    fn drop(&mut self) {
        if let Some(mut detector) = self.0.take() {
            log::debug!("releasing unclaimed {} detector", detector.name());
            detector.dispose();
        }
    }
}

/// Stream handed back by the open worker. Closed on drop unless claimed.
struct OpenedStream(Option<Box<dyn CaptureStream>>);

impl OpenedStream {
    fn claim(mut self) -> Option<Box<dyn CaptureStream>> {
        self.0.take()
    }
}

impl Drop for OpenedStream {
    fn drop(&mut self) {
        if let Some(mut stream) = self.0.take() {
            log::debug!("closing unclaimed stream {}", stream.device().name);
            stream.close();
        }
    }
}

pub struct CaptureEngine {
    config: CaptureConfig,
    state: LifecycleState,
    backend: Arc<dyn CaptureBackend>,
    loader: Arc<dyn DetectorLoader>,
    display: Option<Box<dyn DisplayOrientationSource>>,
    sink: Box<dyn DisplaySink>,
    events: EventBus,
    detector: Option<Box<dyn LandmarkDetector>>,
    stream: Option<Box<dyn CaptureStream>>,
    /// An open attempt (device open + first-frame wait) is in flight.
    opening: bool,
    /// Display orientation recorded when geometry was last computed.
    epoch: Option<DisplayOrientation>,
    output_geometry: Option<Geometry>,
    plans: PlanCache,
    /// Bumped on shutdown so results from earlier runs are discarded.
    /// Shared with the workers so a late result is released where it lands.
    generation: Arc<AtomicU64>,
    tx: Sender<StageResult>,
    rx: Receiver<StageResult>,
    stats: EngineStats,
}

impl CaptureEngine {
    pub fn new(
        config: CaptureConfig,
        backend: Arc<dyn CaptureBackend>,
        loader: Arc<dyn DetectorLoader>,
        sink: Box<dyn DisplaySink>,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            config,
            state: LifecycleState::Idle,
            backend,
            loader,
            display: None,
            sink,
            events: EventBus::new(),
            detector: None,
            stream: None,
            opening: false,
            epoch: None,
            output_geometry: None,
            plans: PlanCache::new(),
            generation: Arc::new(AtomicU64::new(0)),
            tx,
            rx,
            stats: EngineStats::default(),
        }
    }

    /// Attach a display orientation source. Without one, only the configured
    /// forced rotation applies and orientation changes never trigger a reopen.
    pub fn with_display_source(mut self, display: Box<dyn DisplayOrientationSource>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&OrientationUpdated) + Send + 'static,
    {
        self.events.subscribe(listener);
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Geometry frames are published with, once streaming.
    pub fn output_geometry(&self) -> Option<Geometry> {
        self.output_geometry
    }

    pub fn current_plan(&self) -> Option<OrientationPlan> {
        self.plans.current()
    }

    pub fn epoch(&self) -> Option<DisplayOrientation> {
        self.epoch
    }

    pub fn is_opening(&self) -> bool {
        self.opening
    }

    /// Idle -> DetectorLoading. Kicks off the detector load in the background.
    pub fn start(&mut self) -> Result<()> {
        if self.state != LifecycleState::Idle {
            log::debug!("start ignored in state {:?}", self.state);
            return Ok(());
        }

        let loader = self.loader.clone();
        let model_path = self.config.detector_model_path.clone();
        let tx = self.tx.clone();
        let current = self.generation.clone();
        let generation = self.current_generation();
        std::thread::Builder::new()
            .name("detector-load".to_string())
            .spawn(move || {
                let result = loader.load(&model_path).map(|d| LoadedDetector(Some(d)));
                if current.load(Ordering::SeqCst) != generation {
                    log::debug!("detector load finished after teardown; released");
                    return;
                }
                if tx.send(StageResult::DetectorLoaded { generation, result }).is_err() {
                    log::debug!("engine gone before detector load finished; released");
                }
            })
            .map_err(|e| CaptureError::DetectorLoadFailed(e.into()))?;

        log::info!(
            "loading landmark detector from {}",
            self.config.detector_model_path.display()
        );
        self.transition(LifecycleState::DetectorLoading);
        Ok(())
    }

    /// Ask for the device to be reopened.
    ///
    /// Returns `false` when the request was dropped: an open is already in
    /// flight, or the detector is not loaded yet.
    pub fn request_reopen(&mut self) -> Result<bool> {
        match self.state {
            LifecycleState::Idle | LifecycleState::DetectorLoading => {
                log::debug!("reopen ignored in state {:?}", self.state);
                Ok(false)
            }
            _ => self.begin_open(),
        }
    }

    /// Advance the engine by one display tick.
    ///
    /// Returns a report when a frame was processed and published.
    pub fn tick(&mut self) -> Result<Option<FrameReport>> {
        self.drain_stage_results()?;
        match self.state {
            LifecycleState::AwaitingFirstFrame => {
                self.await_first_frame()?;
                Ok(None)
            }
            LifecycleState::Streaming => self.stream_tick(),
            _ => Ok(None),
        }
    }

    /// Stop the device and release the detector. Safe from any state.
    pub fn shutdown(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        // Anything already delivered is stale now; dropping releases it.
        while self.rx.try_recv().is_ok() {}
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
        if let Some(mut detector) = self.detector.take() {
            detector.dispose();
            log::info!("landmark detector released");
        }
        self.opening = false;
        self.epoch = None;
        self.output_geometry = None;
        self.plans.invalidate();
        if self.state != LifecycleState::Idle {
            self.transition(LifecycleState::Idle);
        }
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn transition(&mut self, next: LifecycleState) {
        log::info!("lifecycle: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn drain_stage_results(&mut self) -> Result<()> {
        loop {
            match self.rx.try_recv() {
                Ok(StageResult::DetectorLoaded { generation, result }) => {
                    self.on_detector_loaded(generation, result)?
                }
                Ok(StageResult::DeviceOpened { generation, result }) => {
                    self.on_device_opened(generation, result)?
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }
    }

    fn on_detector_loaded(
        &mut self,
        generation: u64,
        result: anyhow::Result<LoadedDetector>,
    ) -> Result<()> {
        if generation != self.current_generation()
            || self.state != LifecycleState::DetectorLoading
        {
            return Ok(());
        }
        match result {
            Ok(loaded) => {
                let Some(detector) = loaded.claim() else {
                    return Ok(());
                };
                log::info!("landmark detector ready ({})", detector.name());
                self.detector = Some(detector);
                self.stats.detector_loads += 1;
                self.begin_open()?;
                Ok(())
            }
            Err(err) => {
                log::error!("landmark detector failed to load: {:#}", err);
                Err(CaptureError::DetectorLoadFailed(err))
            }
        }
    }

    fn begin_open(&mut self) -> Result<bool> {
        if self.opening {
            log::debug!("device open already in flight; request dropped");
            return Ok(false);
        }
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
        self.epoch = None;
        self.output_geometry = None;
        self.plans.invalidate();

        let backend = self.backend.clone();
        let tx = self.tx.clone();
        let current = self.generation.clone();
        let generation = self.current_generation();
        let requested_name = self.config.device.name.clone();
        let requested_facing = self.config.device.facing;
        let request = OpenRequest {
            width: self.config.device.width,
            height: self.config.device.height,
            fps: self.config.device.fps,
        };
        std::thread::Builder::new()
            .name("device-open".to_string())
            .spawn(move || {
                let result = open_device(
                    backend.as_ref(),
                    requested_name.as_deref(),
                    requested_facing,
                    &request,
                )
                .map(|stream| OpenedStream(Some(stream)));
                if current.load(Ordering::SeqCst) != generation {
                    log::debug!("device open finished after teardown; closed");
                    return;
                }
                if tx.send(StageResult::DeviceOpened { generation, result }).is_err() {
                    log::debug!("engine gone before device open finished; closed");
                }
            })
            .map_err(|e| CaptureError::Capture(e.into()))?;

        self.opening = true;
        if self.state != LifecycleState::DeviceOpening {
            self.transition(LifecycleState::DeviceOpening);
        }
        Ok(true)
    }

    fn on_device_opened(
        &mut self,
        generation: u64,
        result: Result<OpenedStream>,
    ) -> Result<()> {
        if generation != self.current_generation() || self.state != LifecycleState::DeviceOpening
        {
            return Ok(());
        }
        match result {
            Ok(opened) => {
                let Some(stream) = opened.claim() else {
                    return Ok(());
                };
                log::info!("capture device {} opened", stream.device().name);
                self.stream = Some(stream);
                self.stats.device_opens += 1;
                self.transition(LifecycleState::AwaitingFirstFrame);
                Ok(())
            }
            Err(err) => {
                self.opening = false;
                log::error!("capture device open failed: {}", err);
                Err(err)
            }
        }
    }

    fn await_first_frame(&mut self) -> Result<()> {
        let Some(frame) = self.poll_frame()? else {
            return Ok(());
        };
        if let Err(err) = frame.validate() {
            log::debug!("waiting for first usable frame: {}", err);
            return Ok(());
        }

        let orientation = self.display_orientation();
        let inputs = self.inputs_for(&frame, orientation);
        let plan = self.plans.plan_for(&inputs);
        let geometry = plan.output_geometry(frame.geometry());

        log::info!(
            "first frame {} rotation={} front_facing={} display={:?} plan={:?} output={}",
            frame.geometry(),
            frame.rotation_angle.degrees(),
            frame.is_front_facing,
            orientation,
            plan,
            geometry
        );

        self.output_geometry = Some(geometry);
        self.epoch = orientation;
        self.opening = false;
        self.transition(LifecycleState::Streaming);
        Ok(())
    }

    fn stream_tick(&mut self) -> Result<Option<FrameReport>> {
        let orientation = self.display_orientation();
        if orientation != self.epoch {
            log::info!(
                "display orientation changed {:?} -> {:?}; reopening device",
                self.epoch,
                orientation
            );
            self.stats.orientation_changes += 1;
            self.begin_open()?;
            return Ok(None);
        }

        let Some(frame) = self.poll_frame()? else {
            return Ok(None);
        };
        if let Err(err) = frame.validate() {
            log::warn!("skipping frame: {}", err);
            return Ok(None);
        }

        let inputs = self.inputs_for(&frame, orientation);
        let plan = self.plans.plan_for(&inputs);
        let Some(detector) = self.detector.as_mut() else {
            return Ok(None);
        };
        let report = process_frame(
            frame,
            &plan,
            detector.as_mut(),
            &mut self.events,
            self.sink.as_mut(),
        )?;

        if self.output_geometry != Some(report.geometry) {
            log::info!("output geometry now {}", report.geometry);
            self.output_geometry = Some(report.geometry);
        }
        self.stats.frames_processed += 1;
        if report.event_emitted {
            self.stats.events_emitted += 1;
        }
        Ok(Some(report))
    }

    /// Next frame with new data, if any.
    fn poll_frame(&mut self) -> Result<Option<CaptureFrame>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        let frame = stream.poll().map_err(CaptureError::Capture)?;
        Ok(frame.filter(|f| f.has_new_data))
    }

    fn display_orientation(&self) -> Option<DisplayOrientation> {
        if !self.config.orientation.detect_display_rotation {
            return None;
        }
        self.display.as_ref().map(|d| d.current_orientation())
    }

    fn inputs_for(
        &self,
        frame: &CaptureFrame,
        orientation: Option<DisplayOrientation>,
    ) -> OrientationInputs {
        OrientationInputs {
            facing: Facing::from_front_facing(frame.is_front_facing),
            rotation_angle: frame.rotation_angle,
            display_requires_pre_rotation: orientation
                .is_some_and(DisplayOrientation::requires_pre_rotation),
            user_flip_vertical: self.config.orientation.flip_vertical,
            user_flip_horizontal: self.config.orientation.flip_horizontal,
            user_force_rotate90: self.config.orientation.rotate90,
        }
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn open_device(
    backend: &dyn CaptureBackend,
    requested_name: Option<&str>,
    requested_facing: Facing,
    request: &OpenRequest,
) -> Result<Box<dyn CaptureStream>> {
    let devices = backend.list_devices();
    let device = select_device(&devices, requested_name, requested_facing)?;
    log::info!(
        "selected capture device {} (front_facing={})",
        device.name,
        device.is_front_facing
    );
    backend
        .open(&device, request)
        .map_err(|source| CaptureError::DeviceOpenFailed {
            device: device.name.clone(),
            source,
        })
}
