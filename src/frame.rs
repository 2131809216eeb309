//! Captured frames and their geometry.
//!
//! - `Geometry`: width/height pair with checked pixel arithmetic.
//! - `CaptureFrame`: one poll result from a capture stream, owned by the caller.
//!
//! Frames are never mutated in place by the engine; every orientation pass
//! derives a new buffer (see `transform`).

use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, Result};
use crate::orientation::RotationAngle;

/// One RGBA pixel.
pub type Rgba = [u8; 4];

pub const BYTES_PER_PIXEL: usize = 4;

/// Frames at or below this size on either axis are treated as "not ready yet".
///
/// Some mobile cameras report 16x16 until the first real frame arrives.
pub const MIN_VALID_DIMENSION: u32 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels, or `None` if it does not fit in `usize`.
    pub fn pixel_count(&self) -> Option<usize> {
        (self.width as usize).checked_mul(self.height as usize)
    }

    /// Geometry after a 90 degree rotation.
    pub fn rotated(&self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.width <= MIN_VALID_DIMENSION || self.height <= MIN_VALID_DIMENSION
    }

    /// Ensure `len` pixels match this geometry.
    pub fn check_len(&self, len: usize) -> Result<usize> {
        let expected = self.pixel_count().ok_or(CaptureError::InvalidFrameGeometry {
            width: self.width,
            height: self.height,
        })?;
        if expected != len {
            return Err(CaptureError::BufferLengthMismatch {
                expected,
                actual: len,
            });
        }
        Ok(expected)
    }
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A frame as reported by a capture stream.
#[derive(Clone, Debug)]
pub struct CaptureFrame {
    pub width: u32,
    pub height: u32,
    /// Clockwise rotation the sensor reports relative to the device's natural orientation.
    pub rotation_angle: RotationAngle,
    pub is_front_facing: bool,
    /// False when the device has nothing new since the last poll.
    pub has_new_data: bool,
    pub pixels: Vec<Rgba>,
}

impl CaptureFrame {
    pub fn geometry(&self) -> Geometry {
        Geometry::new(self.width, self.height)
    }

    /// Check the frame is usable: non-degenerate and `pixels.len() == width * height`.
    pub fn validate(&self) -> Result<()> {
        let geometry = self.geometry();
        if geometry.is_degenerate() {
            return Err(CaptureError::InvalidFrameGeometry {
                width: self.width,
                height: self.height,
            });
        }
        geometry.check_len(self.pixels.len())?;
        Ok(())
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len() * BYTES_PER_PIXEL
    }
}
