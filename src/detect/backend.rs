use anyhow::Result;
use std::path::Path;

use crate::frame::{Geometry, Rgba};

use super::overlay;
use super::result::{FaceRect, LandmarkPoint};

/// Face + landmark detector.
///
/// Receives frames that are already orientation-normalized; all coordinates
/// it returns are in that normalized space. Runs on the tick thread only.
pub trait LandmarkDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn detect_faces(&mut self, pixels: &[Rgba], geometry: Geometry) -> Result<Vec<FaceRect>>;

    /// Landmarks for a face found by the last `detect_faces` call.
    fn detect_landmarks(&mut self, rect: &FaceRect) -> Result<Vec<LandmarkPoint>>;

    fn draw_landmarks(&self, pixels: &mut [Rgba], geometry: Geometry, landmarks: &[LandmarkPoint]) {
        overlay::draw_points(pixels, geometry, landmarks, overlay::LANDMARK_COLOR);
    }

    fn draw_face_rects(&self, pixels: &mut [Rgba], geometry: Geometry, rects: &[FaceRect]) {
        for rect in rects {
            overlay::draw_rect(
                pixels,
                geometry,
                rect,
                overlay::FACE_RECT_COLOR,
                overlay::FACE_RECT_THICKNESS,
            );
        }
    }

    /// Release model resources. Called once on engine teardown.
    fn dispose(&mut self) {}
}

/// Loads a detector from a model file. Loading may be slow; it runs off the tick thread.
pub trait DetectorLoader: Send + Sync {
    fn load(&self, model_path: &Path) -> Result<Box<dyn LandmarkDetector>>;
}
