use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::detect::backend::{DetectorLoader, LandmarkDetector};
use crate::detect::result::{FaceRect, LandmarkPoint};
use crate::frame::{Geometry, Rgba};

/// Stub detector for testing. Reports a fixed set of faces on every frame.
///
/// Faces are given relative to the frame (0..1) so they stay inside the image
/// whatever orientation the frame ends up in.
pub struct StubDetector {
    faces: Vec<[f32; 4]>,
    disposed: bool,
}

impl StubDetector {
    pub fn new(faces: Vec<[f32; 4]>) -> Self {
        Self {
            faces,
            disposed: false,
        }
    }

    /// One face roughly in the middle of the frame.
    pub fn centered() -> Self {
        Self::new(vec![[0.3, 0.25, 0.4, 0.5]])
    }
}

impl LandmarkDetector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect_faces(&mut self, pixels: &[Rgba], geometry: Geometry) -> Result<Vec<FaceRect>> {
        if self.disposed {
            return Err(anyhow!("stub detector used after dispose"));
        }
        geometry.check_len(pixels.len())?;
        let (w, h) = (geometry.width as f32, geometry.height as f32);
        Ok(self
            .faces
            .iter()
            .map(|[x, y, fw, fh]| {
                FaceRect::new((x * w) as i32, (y * h) as i32, (fw * w) as u32, (fh * h) as u32)
            })
            .collect())
    }

    /// Five points: both eyes, nose tip, both mouth corners.
    fn detect_landmarks(&mut self, rect: &FaceRect) -> Result<Vec<LandmarkPoint>> {
        let (x, y) = (rect.x as f32, rect.y as f32);
        let (w, h) = (rect.width as f32, rect.height as f32);
        Ok(vec![
            LandmarkPoint::new(x + w * 0.3, y + h * 0.35),
            LandmarkPoint::new(x + w * 0.7, y + h * 0.35),
            LandmarkPoint::new(x + w * 0.5, y + h * 0.55),
            LandmarkPoint::new(x + w * 0.35, y + h * 0.75),
            LandmarkPoint::new(x + w * 0.65, y + h * 0.75),
        ])
    }

    fn dispose(&mut self) {
        self.disposed = true;
    }
}

/// Loader for `stub://` model paths (or any existing file).
#[derive(Clone, Debug, Default)]
pub struct StubLoader {
    faces: Vec<[f32; 4]>,
    delay: Duration,
    loads: Arc<AtomicU64>,
}

impl StubLoader {
    pub fn new(faces: Vec<[f32; 4]>) -> Self {
        Self {
            faces,
            delay: Duration::ZERO,
            loads: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Simulate a slow model load.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }
}

impl DetectorLoader for StubLoader {
    fn load(&self, model_path: &Path) -> Result<Box<dyn LandmarkDetector>> {
        let is_stub = model_path.to_string_lossy().starts_with("stub://");
        if !is_stub && !model_path.is_file() {
            return Err(anyhow!("model file {} not found", model_path.display()));
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        log::info!("StubLoader: loaded {}", model_path.display());
        Ok(Box::new(StubDetector::new(self.faces.clone())))
    }
}
