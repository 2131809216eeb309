//! Pixel buffer transforms.
//!
//! Every function here is pure: it reads a row-major buffer and returns a new
//! buffer of the same length. There are no in-place variants; an orientation
//! plan is applied as a short chain of these passes.
//!
//! The functions are generic over the pixel type so the same code serves RGBA
//! frames and the plain integer buffers used in tests.

use crate::error::Result;
use crate::frame::Geometry;

/// Rotate 90 degrees clockwise.
///
/// For output row `r` and column `c`: `out[r][c] = in[row = c][col = W - 1 - r]`.
/// Returns the new buffer and the swapped geometry.
pub fn rotate_clockwise_90<P: Copy>(input: &[P], geometry: Geometry) -> Result<(Vec<P>, Geometry)> {
    let len = geometry.check_len(input.len())?;
    let w = geometry.width as usize;
    let h = geometry.height as usize;

    let mut output = Vec::with_capacity(len);
    for x in (0..w).rev() {
        for y in 0..h {
            output.push(input[x + y * w]);
        }
    }
    Ok((output, geometry.rotated()))
}

/// Rotate 90 degrees counter-clockwise. Inverse of [`rotate_clockwise_90`].
pub fn rotate_counter_clockwise_90<P: Copy>(
    input: &[P],
    geometry: Geometry,
) -> Result<(Vec<P>, Geometry)> {
    let len = geometry.check_len(input.len())?;
    let w = geometry.width as usize;
    let h = geometry.height as usize;

    let mut output = Vec::with_capacity(len);
    for x in 0..w {
        for y in (0..h).rev() {
            output.push(input[x + y * w]);
        }
    }
    Ok((output, geometry.rotated()))
}

/// Reverse row order, keep column order.
pub fn flip_vertical<P: Copy>(input: &[P], geometry: Geometry) -> Result<Vec<P>> {
    let len = geometry.check_len(input.len())?;
    if len == 0 {
        return Ok(Vec::new());
    }
    let mut output = Vec::with_capacity(len);
    for row in input.chunks_exact(geometry.width as usize).rev() {
        output.extend_from_slice(row);
    }
    Ok(output)
}

/// Reverse column order, keep row order.
pub fn flip_horizontal<P: Copy>(input: &[P], geometry: Geometry) -> Result<Vec<P>> {
    let len = geometry.check_len(input.len())?;
    if len == 0 {
        return Ok(Vec::new());
    }
    let mut output = Vec::with_capacity(len);
    for row in input.chunks_exact(geometry.width as usize) {
        output.extend(row.iter().rev().copied());
    }
    Ok(output)
}
