//! Per-frame work once the engine is streaming.
//!
//! 1. Normalize the raw buffer with the current orientation plan
//! 2. Detect faces, then landmarks per face
//! 3. Publish the first face's landmarks (at most one event per frame)
//! 4. Let the detector draw its overlays into the same buffer
//! 5. Hand the buffer to the display sink

use serde::Serialize;

use crate::detect::LandmarkDetector;
use crate::display::DisplaySink;
use crate::error::{CaptureError, Result};
use crate::events::{EventBus, OrientationUpdated};
use crate::frame::{CaptureFrame, Geometry};
use crate::orientation::OrientationPlan;

/// What happened to one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FrameReport {
    /// Geometry published to the sink (after rotation).
    pub geometry: Geometry,
    pub faces: usize,
    pub event_emitted: bool,
}

pub fn process_frame(
    frame: CaptureFrame,
    plan: &OrientationPlan,
    detector: &mut dyn LandmarkDetector,
    events: &mut EventBus,
    sink: &mut dyn DisplaySink,
) -> Result<FrameReport> {
    let raw_geometry = frame.geometry();
    let (mut pixels, geometry) = plan.apply_owned(frame.pixels, raw_geometry)?;

    let faces = detector
        .detect_faces(&pixels, geometry)
        .map_err(CaptureError::Detector)?;

    let mut event_emitted = false;
    for rect in &faces {
        let landmarks = detector
            .detect_landmarks(rect)
            .map_err(CaptureError::Detector)?;
        if !event_emitted {
            events.emit(&OrientationUpdated {
                rect: *rect,
                landmarks: landmarks.clone(),
            });
            event_emitted = true;
        }
        detector.draw_landmarks(&mut pixels, geometry, &landmarks);
    }
    detector.draw_face_rects(&mut pixels, geometry, &faces);

    sink.publish(&pixels, geometry).map_err(CaptureError::Sink)?;

    Ok(FrameReport {
        geometry,
        faces: faces.len(),
        event_emitted,
    })
}
