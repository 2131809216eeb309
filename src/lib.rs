//! Capture orientation kernel
//!
//! This crate normalizes the orientation of live camera frames before they
//! reach a face-landmark detector and a display sink.
//!
//! # Architecture
//!
//! - `transform`: pure pixel buffer passes (rotate 90, flip vertical/horizontal)
//! - `orientation`: derives the rotate/flip plan from device metadata, display
//!   orientation and user preferences; caches it between changes
//! - `lifecycle`: the capture state machine (detector load, device open,
//!   first-frame wait, streaming, reopen on display rotation)
//! - `processing`: per-frame normalize, detect, notify, draw, publish
//!
//! Collaborators sit behind traits:
//!
//! - `ingest`: capture backends and streams (synthetic `stub://` backend included)
//! - `detect`: landmark detectors and their loaders (stub detector included)
//! - `display`: display orientation sources and frame sinks
//! - `events`: `OrientationUpdated` listeners

pub mod config;
pub mod detect;
pub mod display;
pub mod error;
pub mod events;
pub mod frame;
pub mod ingest;
pub mod lifecycle;
pub mod orientation;
pub mod processing;
pub mod transform;

pub use config::CaptureConfig;
pub use detect::{DetectorLoader, FaceRect, LandmarkDetector, LandmarkPoint, StubDetector, StubLoader};
pub use display::{
    CountingSink, DisplayOrientationSource, DisplaySink, FixedOrientation, SharedOrientation,
};
pub use error::CaptureError;
pub use events::{EventBus, OrientationUpdated};
pub use frame::{CaptureFrame, Geometry, Rgba, BYTES_PER_PIXEL, MIN_VALID_DIMENSION};
pub use ingest::{
    select_device, CaptureBackend, CaptureStream, DeviceInfo, OpenRequest, SyntheticCapture,
    SyntheticDevice,
};
pub use lifecycle::{CaptureEngine, EngineStats, LifecycleState};
pub use orientation::{
    base_flips, DisplayOrientation, Facing, FlipState, OrientationInputs, OrientationPlan,
    PlanCache, RotationAngle,
};
pub use processing::{process_frame, FrameReport};
