//! Overlay drawing into RGBA buffers.
//!
//! All drawing is clipped to the buffer; shapes partially outside the frame
//! are drawn where they overlap it.

use crate::frame::{Geometry, Rgba};

use super::result::{FaceRect, LandmarkPoint};

pub const LANDMARK_COLOR: Rgba = [0, 255, 0, 255];
pub const FACE_RECT_COLOR: Rgba = [255, 0, 0, 255];
pub const FACE_RECT_THICKNESS: u32 = 2;

fn put(buf: &mut [Rgba], geometry: Geometry, x: i64, y: i64, color: Rgba) {
    if x < 0 || y < 0 || x >= i64::from(geometry.width) || y >= i64::from(geometry.height) {
        return;
    }
    let idx = y as usize * geometry.width as usize + x as usize;
    if let Some(px) = buf.get_mut(idx) {
        *px = color;
    }
}

/// Mark each point with a single pixel.
pub fn draw_points(buf: &mut [Rgba], geometry: Geometry, points: &[LandmarkPoint], color: Rgba) {
    for p in points {
        put(buf, geometry, p.x.round() as i64, p.y.round() as i64, color);
    }
}

/// Draw a rectangle outline `thickness` pixels wide, growing inwards.
pub fn draw_rect(buf: &mut [Rgba], geometry: Geometry, rect: &FaceRect, color: Rgba, thickness: u32) {
    if rect.width == 0 || rect.height == 0 {
        return;
    }
    let left = i64::from(rect.x);
    let top = i64::from(rect.y);
    let right = left + i64::from(rect.width) - 1;
    let bottom = top + i64::from(rect.height) - 1;

    for t in 0..i64::from(thickness) {
        if left + t > right - t || top + t > bottom - t {
            break;
        }
        for x in (left + t)..=(right - t) {
            put(buf, geometry, x, top + t, color);
            put(buf, geometry, x, bottom - t, color);
        }
        for y in (top + t)..=(bottom - t) {
            put(buf, geometry, left + t, y, color);
            put(buf, geometry, right - t, y, color);
        }
    }
}
