//! Synthetic frames shared by unit tests.

use crate::frame::Frame;
use opencv::core::{Mat, Scalar, CV_8UC1};
use opencv::prelude::*;

/// Side of the constant blocks making up the texture.
const BLOCK: usize = 6;

fn hash(mut v: u64) -> u64 {
    v ^= v >> 33;
    v = v.wrapping_mul(0xff51_afd7_ed55_8ccd);
    v ^= v >> 33;
    v = v.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    v ^ (v >> 33)
}

/// Intensity of an infinite blocky random texture.
pub fn texture(x: usize, y: usize) -> u8 {
    let (bx, by) = ((x / BLOCK) as u64, (y / BLOCK) as u64);
    (hash(bx << 32 | by) % 256) as u8
}

/// A window into the texture, starting at `(ox, oy)`.
///
/// Shifting the window by `(dx, dy)` moves the content by `(-dx, -dy)` within the frame.
pub fn textured_frame(width: usize, height: usize, ox: usize, oy: usize) -> Frame {
    from_fn(width, height, |x, y| texture(x + ox, y + oy))
}

pub fn flat_frame(width: usize, height: usize, value: u8) -> Frame {
    Frame::gray(width, height, vec![value; width * height]).unwrap()
}

pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> u8) -> Frame {
    let data = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| f(x, y))
        .collect();
    Frame::gray(width, height, data).unwrap()
}

/// Intensity matrix of a frame.
pub fn gray(frame: &Frame) -> Mat {
    frame.to_gray().unwrap()
}

/// Descriptor matrix with one row per descriptor.
pub fn descriptors(rows: &[[u8; 32]]) -> Mat {
    if rows.is_empty() {
        return Mat::default();
    }

    let mut mat =
        Mat::new_rows_cols_with_default(rows.len() as _, 32, CV_8UC1, Scalar::all(0.0)).unwrap();

    mat.data_bytes_mut()
        .unwrap()
        .copy_from_slice(&rows.concat());

    mat
}
