use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::orientation::Facing;

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 30;
const DEFAULT_MODEL_PATH: &str = "stub://sp_human_face_68";

pub const CONFIG_ENV: &str = "CAPTURE_ORIENT_CONFIG";

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    device: Option<DeviceConfigFile>,
    orientation: Option<OrientationConfigFile>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DeviceConfigFile {
    name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    facing: Option<Facing>,
}

#[derive(Debug, Deserialize, Default)]
struct OrientationConfigFile {
    rotate90: Option<bool>,
    flip_vertical: Option<bool>,
    flip_horizontal: Option<bool>,
    detect_display_rotation: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    model_path: Option<PathBuf>,
}

/// User configuration. Read-only once the engine is running.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    pub device: DeviceSettings,
    pub orientation: OrientationSettings,
    pub detector_model_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSettings {
    /// Explicit device to open. Falls back to facing-based selection when absent or missing.
    pub name: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub facing: Facing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrientationSettings {
    /// Always rotate 90 degrees, regardless of display orientation.
    pub rotate90: bool,
    pub flip_vertical: bool,
    pub flip_horizontal: bool,
    /// When false the display orientation is ignored and only `rotate90` applies.
    pub detect_display_rotation: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: DeviceSettings {
                name: None,
                width: DEFAULT_WIDTH,
                height: DEFAULT_HEIGHT,
                fps: DEFAULT_FPS,
                facing: Facing::Back,
            },
            orientation: OrientationSettings {
                rotate90: false,
                flip_vertical: false,
                flip_horizontal: false,
                detect_display_rotation: true,
            },
            detector_model_path: PathBuf::from(DEFAULT_MODEL_PATH),
        }
    }
}

impl CaptureConfig {
    /// Load from the file named by `CAPTURE_ORIENT_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok();
        Self::load_with(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file, then apply env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_with(Some(path))
    }

    fn load_with(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CaptureConfigFile) -> Self {
        let defaults = Self::default();
        let device = file.device.unwrap_or_default();
        let orientation = file.orientation.unwrap_or_default();
        Self {
            device: DeviceSettings {
                name: device.name,
                width: device.width.unwrap_or(defaults.device.width),
                height: device.height.unwrap_or(defaults.device.height),
                fps: device.fps.unwrap_or(defaults.device.fps),
                facing: device.facing.unwrap_or(defaults.device.facing),
            },
            orientation: OrientationSettings {
                rotate90: orientation
                    .rotate90
                    .unwrap_or(defaults.orientation.rotate90),
                flip_vertical: orientation
                    .flip_vertical
                    .unwrap_or(defaults.orientation.flip_vertical),
                flip_horizontal: orientation
                    .flip_horizontal
                    .unwrap_or(defaults.orientation.flip_horizontal),
                detect_display_rotation: orientation
                    .detect_display_rotation
                    .unwrap_or(defaults.orientation.detect_display_rotation),
            },
            detector_model_path: file
                .detector
                .and_then(|detector| detector.model_path)
                .unwrap_or(defaults.detector_model_path),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(name) = std::env::var("ORIENT_DEVICE_NAME") {
            self.device.name = Some(name);
        }
        if let Ok(facing) = std::env::var("ORIENT_FACING") {
            self.device.facing = facing.parse()?;
        }
        if let Some(width) = env_u32("ORIENT_WIDTH")? {
            self.device.width = width;
        }
        if let Some(height) = env_u32("ORIENT_HEIGHT")? {
            self.device.height = height;
        }
        if let Some(fps) = env_u32("ORIENT_FPS")? {
            self.device.fps = fps;
        }
        if let Some(rotate90) = env_bool("ORIENT_ROTATE90")? {
            self.orientation.rotate90 = rotate90;
        }
        if let Some(flip) = env_bool("ORIENT_FLIP_VERTICAL")? {
            self.orientation.flip_vertical = flip;
        }
        if let Some(flip) = env_bool("ORIENT_FLIP_HORIZONTAL")? {
            self.orientation.flip_horizontal = flip;
        }
        if let Ok(path) = std::env::var("ORIENT_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector_model_path = PathBuf::from(path);
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self
            .device
            .name
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            self.device.name = None;
        }
        if self.device.width == 0 || self.device.height == 0 {
            return Err(anyhow!(
                "requested resolution must be non-zero (got {}x{})",
                self.device.width,
                self.device.height
            ));
        }
        if self.device.fps == 0 {
            return Err(anyhow!("requested fps must be >= 1"));
        }
        if self.detector_model_path.as_os_str().is_empty() {
            return Err(anyhow!("detector model path must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<CaptureConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_u32(key: &str) -> Result<Option<u32>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a non-negative integer", key)),
        _ => Ok(None),
    }
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(Some(true)),
                "0" | "false" | "no" | "off" => Ok(Some(false)),
                _ => Err(anyhow!("{} must be a boolean (true/false)", key)),
            }
        }
        _ => Ok(None),
    }
}
