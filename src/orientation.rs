//! Orientation decision engine.
//!
//! Derives the rotate/flip plan for a frame from:
//! - the capture device's facing and reported rotation angle,
//! - whether the current display orientation needs a 90 degree pre-rotation,
//! - the user's flip and forced-rotation preferences.
//!
//! The two flip bits form the four-element group {none, V, H, both}. They are
//! kept as independent booleans and user preferences are XOR-ed onto the
//! device-derived base bits.

use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, Result};
use crate::frame::{Geometry, Rgba};
use crate::transform;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    Front,
    #[default]
    Back,
}

impl Facing {
    pub fn from_front_facing(is_front_facing: bool) -> Self {
        if is_front_facing {
            Facing::Front
        } else {
            Facing::Back
        }
    }
}

impl std::str::FromStr for Facing {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" => Ok(Facing::Front),
            "back" => Ok(Facing::Back),
            other => Err(anyhow::anyhow!(
                "invalid facing '{}': expected 'front' or 'back'",
                other
            )),
        }
    }
}

/// Clockwise sensor rotation in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RotationAngle {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl RotationAngle {
    pub fn degrees(self) -> u32 {
        match self {
            RotationAngle::Deg0 => 0,
            RotationAngle::Deg90 => 90,
            RotationAngle::Deg180 => 180,
            RotationAngle::Deg270 => 270,
        }
    }
}

impl TryFrom<u32> for RotationAngle {
    type Error = CaptureError;

    fn try_from(degrees: u32) -> Result<Self> {
        match degrees {
            0 => Ok(RotationAngle::Deg0),
            90 => Ok(RotationAngle::Deg90),
            180 => Ok(RotationAngle::Deg180),
            270 => Ok(RotationAngle::Deg270),
            other => Err(CaptureError::UnsupportedRotation(other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplayOrientation {
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

impl DisplayOrientation {
    /// Capture frames arrive landscape-native, so portrait displays need a 90 degree pre-rotation.
    pub fn requires_pre_rotation(self) -> bool {
        matches!(
            self,
            DisplayOrientation::Portrait | DisplayOrientation::PortraitUpsideDown
        )
    }

    /// Next orientation in a clockwise cycle. Used by hosts that simulate device rotation.
    pub fn next(self) -> Self {
        match self {
            DisplayOrientation::Portrait => DisplayOrientation::LandscapeRight,
            DisplayOrientation::LandscapeRight => DisplayOrientation::PortraitUpsideDown,
            DisplayOrientation::PortraitUpsideDown => DisplayOrientation::LandscapeLeft,
            DisplayOrientation::LandscapeLeft => DisplayOrientation::Portrait,
        }
    }
}

/// The two mirror bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FlipState {
    pub vertical: bool,
    pub horizontal: bool,
}

impl FlipState {
    pub const NONE: FlipState = FlipState {
        vertical: false,
        horizontal: false,
    };

    pub fn toggle_vertical(self) -> Self {
        Self {
            vertical: !self.vertical,
            ..self
        }
    }

    pub fn toggle_horizontal(self) -> Self {
        Self {
            horizontal: !self.horizontal,
            ..self
        }
    }

    /// Compose with another flip state (group operation).
    pub fn compose(self, other: FlipState) -> Self {
        Self {
            vertical: self.vertical ^ other.vertical,
            horizontal: self.horizontal ^ other.horizontal,
        }
    }

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// Mirror bits implied by the device alone, before user preferences.
pub fn base_flips(facing: Facing, angle: RotationAngle) -> FlipState {
    use RotationAngle::*;
    match (facing, angle) {
        (Facing::Front, Deg0 | Deg90) => FlipState {
            vertical: false,
            horizontal: true,
        },
        (Facing::Front, Deg180 | Deg270) => FlipState {
            vertical: true,
            horizontal: false,
        },
        (Facing::Back, Deg180 | Deg270) => FlipState {
            vertical: true,
            horizontal: true,
        },
        (Facing::Back, Deg0 | Deg90) => FlipState::NONE,
    }
}

/// Everything the plan depends on. A change in any field invalidates a cached plan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct OrientationInputs {
    pub facing: Facing,
    pub rotation_angle: RotationAngle,
    pub display_requires_pre_rotation: bool,
    pub user_flip_vertical: bool,
    pub user_flip_horizontal: bool,
    pub user_force_rotate90: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct OrientationPlan {
    pub rotate90: bool,
    pub flip_vertical: bool,
    pub flip_horizontal: bool,
}

impl OrientationPlan {
    pub fn derive(inputs: &OrientationInputs) -> Self {
        let rotate90 = inputs.display_requires_pre_rotation || inputs.user_force_rotate90;

        let mut flips = base_flips(inputs.facing, inputs.rotation_angle);
        if inputs.user_flip_vertical {
            flips = flips.toggle_vertical();
        }
        if inputs.user_flip_horizontal {
            flips = flips.toggle_horizontal();
        }

        Self {
            rotate90,
            flip_vertical: flips.vertical,
            flip_horizontal: flips.horizontal,
        }
    }

    pub fn flips(&self) -> FlipState {
        FlipState {
            vertical: self.flip_vertical,
            horizontal: self.flip_horizontal,
        }
    }

    /// Geometry downstream consumers see after this plan runs.
    pub fn output_geometry(&self, input: Geometry) -> Geometry {
        if self.rotate90 {
            input.rotated()
        } else {
            input
        }
    }

    /// Apply the plan: rotate first, then flip against the current geometry.
    pub fn apply<P: Copy>(&self, input: &[P], geometry: Geometry) -> Result<(Vec<P>, Geometry)> {
        let (mut buf, geometry) = if self.rotate90 {
            transform::rotate_clockwise_90(input, geometry)?
        } else {
            geometry.check_len(input.len())?;
            (input.to_vec(), geometry)
        };

        if self.flip_vertical {
            buf = transform::flip_vertical(&buf, geometry)?;
        }
        if self.flip_horizontal {
            buf = transform::flip_horizontal(&buf, geometry)?;
        }
        Ok((buf, geometry))
    }

    /// Same as [`apply`](Self::apply) but consumes the buffer so the identity plan does not copy.
    pub fn apply_owned(&self, input: Vec<Rgba>, geometry: Geometry) -> Result<(Vec<Rgba>, Geometry)> {
        if !self.rotate90 && self.flips().is_none() {
            geometry.check_len(input.len())?;
            return Ok((input, geometry));
        }
        self.apply(&input, geometry)
    }
}

/// Plan cached for one set of inputs.
#[derive(Debug, Default)]
pub struct PlanCache {
    cached: Option<(OrientationInputs, OrientationPlan)>,
    recomputations: u64,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached plan, recomputing only when `inputs` changed.
    pub fn plan_for(&mut self, inputs: &OrientationInputs) -> OrientationPlan {
        if let Some((cached_inputs, plan)) = &self.cached {
            if cached_inputs == inputs {
                return *plan;
            }
        }
        let plan = OrientationPlan::derive(inputs);
        log::debug!("orientation plan recomputed: {:?} -> {:?}", inputs, plan);
        self.cached = Some((*inputs, plan));
        self.recomputations += 1;
        plan
    }

    pub fn current(&self) -> Option<OrientationPlan> {
        self.cached.map(|(_, plan)| plan)
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }
}
