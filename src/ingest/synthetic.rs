//! Synthetic capture backend.
//!
//! Devices are named `stub://...` and produce gradient RGBA frames without
//! touching hardware. Used by `orientd` and by tests.
//!
//! Each device can be configured with:
//! - a native resolution (the requested size is coerced to it, like real cameras do)
//! - a sensor rotation angle
//! - a number of warm-up polls that report a degenerate 16x16 frame

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{CaptureBackend, CaptureStream, DeviceInfo, OpenRequest};
use crate::frame::{CaptureFrame, Rgba, MIN_VALID_DIMENSION};
use crate::orientation::RotationAngle;

#[derive(Clone, Debug)]
pub struct SyntheticDevice {
    pub info: DeviceInfo,
    /// Resolution the device actually delivers. `None` accepts the request as-is.
    pub native_size: Option<(u32, u32)>,
    pub rotation_angle: RotationAngle,
    /// Polls that return a degenerate frame before real frames start.
    pub warmup_polls: u32,
}

impl SyntheticDevice {
    pub fn new(name: impl Into<String>, is_front_facing: bool) -> Self {
        Self {
            info: DeviceInfo::new(name, is_front_facing),
            native_size: None,
            rotation_angle: RotationAngle::Deg0,
            warmup_polls: 0,
        }
    }

    pub fn with_native_size(mut self, width: u32, height: u32) -> Self {
        self.native_size = Some((width, height));
        self
    }

    pub fn with_rotation(mut self, rotation_angle: RotationAngle) -> Self {
        self.rotation_angle = rotation_angle;
        self
    }

    pub fn with_warmup(mut self, warmup_polls: u32) -> Self {
        self.warmup_polls = warmup_polls;
        self
    }
}

/// Backend over a fixed list of synthetic devices.
#[derive(Clone, Debug, Default)]
pub struct SyntheticCapture {
    devices: Vec<SyntheticDevice>,
    open_delay: Duration,
    opens: Arc<AtomicU64>,
}

impl SyntheticCapture {
    pub fn new(devices: Vec<SyntheticDevice>) -> Self {
        Self {
            devices,
            open_delay: Duration::ZERO,
            opens: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Simulate slow device start-up.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Number of successful `open` calls so far.
    pub fn open_count(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }
}

impl CaptureBackend for SyntheticCapture {
    fn list_devices(&self) -> Vec<DeviceInfo> {
        self.devices.iter().map(|d| d.info.clone()).collect()
    }

    fn open(&self, device: &DeviceInfo, request: &OpenRequest) -> Result<Box<dyn CaptureStream>> {
        if !device.name.starts_with("stub://") {
            return Err(anyhow!(
                "synthetic capture only serves stub:// devices (got {})",
                device.name
            ));
        }
        let config = self
            .devices
            .iter()
            .find(|d| d.info == *device)
            .cloned()
            .ok_or_else(|| anyhow!("unknown synthetic device {}", device.name))?;

        if !self.open_delay.is_zero() {
            std::thread::sleep(self.open_delay);
        }

        let (width, height) = config.native_size.unwrap_or((request.width, request.height));
        if width == 0 || height == 0 {
            return Err(anyhow!("cannot open {} at {}x{}", device.name, width, height));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        log::info!(
            "SyntheticCapture: opened {} at {}x{} (requested {}x{} @ {} fps)",
            device.name,
            width,
            height,
            request.width,
            request.height,
            request.fps
        );

        Ok(Box::new(SyntheticStream {
            config,
            width,
            height,
            frame_count: 0,
            closed: false,
        }))
    }
}

struct SyntheticStream {
    config: SyntheticDevice,
    width: u32,
    height: u32,
    frame_count: u64,
    closed: bool,
}

impl SyntheticStream {
    fn generate_pixels(&self, width: u32, height: u32) -> Vec<Rgba> {
        let shift = self.frame_count as u32;
        let mut pixels = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push([
                    ((x + shift) % 256) as u8,
                    (y % 256) as u8,
                    ((x ^ y) % 256) as u8,
                    255,
                ]);
            }
        }
        pixels
    }
}

impl CaptureStream for SyntheticStream {
    fn device(&self) -> &DeviceInfo {
        &self.config.info
    }

    fn poll(&mut self) -> Result<Option<CaptureFrame>> {
        if self.closed {
            return Err(anyhow!("{} is closed", self.config.info.name));
        }
        self.frame_count += 1;

        let (width, height) = if self.frame_count <= u64::from(self.config.warmup_polls) {
            (MIN_VALID_DIMENSION, MIN_VALID_DIMENSION)
        } else {
            (self.width, self.height)
        };

        Ok(Some(CaptureFrame {
            width,
            height,
            rotation_angle: self.config.rotation_angle,
            is_front_facing: self.config.info.is_front_facing,
            has_new_data: true,
            pixels: self.generate_pixels(width, height),
        }))
    }

    fn close(&mut self) {
        if !self.closed {
            log::info!("SyntheticCapture: closed {}", self.config.info.name);
            self.closed = true;
        }
    }
}
