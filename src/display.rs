//! Display-side collaborators: where orientation comes from and where frames go.

use anyhow::Result;
use std::sync::{Arc, Mutex};

use crate::frame::{Geometry, Rgba};
use crate::orientation::DisplayOrientation;

/// Reports the current display orientation.
pub trait DisplayOrientationSource {
    fn current_orientation(&self) -> DisplayOrientation;
}

/// Orientation that never changes.
#[derive(Clone, Copy, Debug)]
pub struct FixedOrientation(pub DisplayOrientation);

impl DisplayOrientationSource for FixedOrientation {
    fn current_orientation(&self) -> DisplayOrientation {
        self.0
    }
}

/// Orientation a host can update from another place (UI callback, sensor thread).
#[derive(Clone, Debug)]
pub struct SharedOrientation {
    inner: Arc<Mutex<DisplayOrientation>>,
}

impl SharedOrientation {
    pub fn new(initial: DisplayOrientation) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn set(&self, orientation: DisplayOrientation) {
        match self.inner.lock() {
            Ok(mut guard) => *guard = orientation,
            Err(poisoned) => *poisoned.into_inner() = orientation,
        }
    }

    pub fn get(&self) -> DisplayOrientation {
        match self.inner.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl DisplayOrientationSource for SharedOrientation {
    fn current_orientation(&self) -> DisplayOrientation {
        self.get()
    }
}

/// Receives finished frames.
pub trait DisplaySink {
    fn publish(&mut self, pixels: &[Rgba], geometry: Geometry) -> Result<()>;
}

/// Sink that only counts frames and remembers the last geometry.
#[derive(Debug, Default)]
pub struct CountingSink {
    pub frames: u64,
    pub last_geometry: Option<Geometry>,
}

impl DisplaySink for CountingSink {
    fn publish(&mut self, pixels: &[Rgba], geometry: Geometry) -> Result<()> {
        geometry.check_len(pixels.len())?;
        self.frames += 1;
        self.last_geometry = Some(geometry);
        Ok(())
    }
}
