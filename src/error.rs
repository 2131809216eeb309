use thiserror::Error;

/// Errors raised at the capture engine boundary.
///
/// Collaborators (capture backends, detectors, sinks) report failures as
/// `anyhow::Error`; the engine wraps them into one of these variants so callers
/// can tell a missing camera apart from a detector crash.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no capture device available")]
    NoDeviceAvailable,
    #[error("failed to open capture device {device:?}")]
    DeviceOpenFailed {
        device: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("landmark detector failed to load")]
    DetectorLoadFailed(#[source] anyhow::Error),
    #[error("degenerate frame geometry {width}x{height}")]
    InvalidFrameGeometry { width: u32, height: u32 },
    #[error("pixel buffer length mismatch: expected {expected}, got {actual}")]
    BufferLengthMismatch { expected: usize, actual: usize },
    #[error("unsupported rotation angle {0} (expected 0, 90, 180 or 270)")]
    UnsupportedRotation(u32),
    #[error("capture stream error")]
    Capture(#[source] anyhow::Error),
    #[error("landmark detector error")]
    Detector(#[source] anyhow::Error),
    #[error("display sink error")]
    Sink(#[source] anyhow::Error),
}

pub type Result<T, E = CaptureError> = std::result::Result<T, E>;
