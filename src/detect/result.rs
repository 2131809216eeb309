use serde::Serialize;

/// Face bounding box in pixel coordinates of the normalized frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FaceRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl FaceRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// One landmark in pixel coordinates of the normalized frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
}

impl LandmarkPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}
