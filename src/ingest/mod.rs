//! Capture device contracts.
//!
//! The engine does not talk to camera drivers. It sees:
//! - `CaptureBackend`: enumerates devices and opens one (may block; runs off the tick thread)
//! - `CaptureStream`: an opened device, polled once per tick on the main thread
//!
//! Backends in this crate:
//! - `SyntheticCapture` (`stub://` devices for tests and the demo daemon)

use anyhow::Result;
use serde::Serialize;

use crate::error::CaptureError;
use crate::frame::CaptureFrame;
use crate::orientation::Facing;

pub mod synthetic;

pub use synthetic::{SyntheticCapture, SyntheticDevice};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub is_front_facing: bool,
}

impl DeviceInfo {
    pub fn new(name: impl Into<String>, is_front_facing: bool) -> Self {
        Self {
            name: name.into(),
            is_front_facing,
        }
    }

    pub fn facing(&self) -> Facing {
        Facing::from_front_facing(self.is_front_facing)
    }
}

/// Requested capture format. Devices may coerce any of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenRequest {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Device enumeration and opening.
///
/// Shared between the tick thread and the background open task, hence `Send + Sync`.
pub trait CaptureBackend: Send + Sync {
    fn list_devices(&self) -> Vec<DeviceInfo>;

    /// Open and start a device. May block.
    fn open(&self, device: &DeviceInfo, request: &OpenRequest) -> Result<Box<dyn CaptureStream>>;
}

/// An opened, playing capture device.
pub trait CaptureStream: Send {
    fn device(&self) -> &DeviceInfo;

    /// Latest frame, or `None` when the device has nothing this tick.
    fn poll(&mut self) -> Result<Option<CaptureFrame>>;

    /// Stop the device. Must be safe to call more than once.
    fn close(&mut self);
}

/// Pick the device to open.
///
/// Order: the explicitly requested name (if present in the list), then the
/// first device with the requested facing, then the first device at all.
pub fn select_device(
    devices: &[DeviceInfo],
    requested_name: Option<&str>,
    requested_facing: Facing,
) -> Result<DeviceInfo, CaptureError> {
    if let Some(name) = requested_name {
        if let Some(device) = devices.iter().find(|d| d.name == name) {
            return Ok(device.clone());
        }
        log::warn!(
            "requested capture device {:?} not found; falling back to facing={:?}",
            name,
            requested_facing
        );
    }
    devices
        .iter()
        .find(|d| d.facing() == requested_facing)
        .or_else(|| devices.first())
        .cloned()
        .ok_or(CaptureError::NoDeviceAvailable)
}
