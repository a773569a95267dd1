//! Binary mask primitives and float-field smoothing.
//!
//! Masks are `GrayImage`s holding 0 or 255 (blink masks also use 127).

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::filter::median_filter;
use imageproc::morphology;
use imageproc::region_labelling::{connected_components, Connectivity};
use ndarray::Array2;

pub const FG: u8 = u8::MAX;

/// 3x3 closing.
pub fn close3x3(mask: &GrayImage) -> GrayImage {
    morphology::close(mask, Norm::LInf, 1)
}

/// Erosion by a (2r+1) square.
pub fn erode(mask: &GrayImage, radius: u8) -> GrayImage {
    morphology::erode(mask, Norm::LInf, radius)
}

/// Dilation by a (2r+1) square.
pub fn dilate(mask: &GrayImage, radius: u8) -> GrayImage {
    morphology::dilate(mask, Norm::LInf, radius)
}

/// Median over a (2r+1) square, replicating the border.
pub fn median(mask: &GrayImage, radius: u32) -> GrayImage {
    median_filter(mask, radius, radius)
}

/// Background pixels not 4-connected to the background at (0, 0).
///
/// When the corner itself is foreground there is no reference region and no
/// pixel is reported.
pub fn enclosed_holes(mask: &GrayImage) -> GrayImage {
    let background = not(mask);
    let labels = connected_components(&background, Connectivity::Four, Luma([0u8]));
    let outside = labels.get_pixel(0, 0)[0];
    let mut holes = GrayImage::new(mask.width(), mask.height());
    if outside == 0 {
        return holes;
    }
    for (hole, label) in holes.pixels_mut().zip(labels.pixels()) {
        if label[0] != 0 && label[0] != outside {
            hole[0] = FG;
        }
    }
    holes
}

fn zip_with(a: &GrayImage, b: &GrayImage, op: impl Fn(u8, u8) -> u8) -> GrayImage {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let mut out = a.clone();
    for (o, p) in out.pixels_mut().zip(b.pixels()) {
        o[0] = op(o[0], p[0]);
    }
    out
}

pub fn or(a: &GrayImage, b: &GrayImage) -> GrayImage {
    zip_with(a, b, |a, b| a | b)
}

pub fn and(a: &GrayImage, b: &GrayImage) -> GrayImage {
    zip_with(a, b, |a, b| a & b)
}

pub fn xor(a: &GrayImage, b: &GrayImage) -> GrayImage {
    zip_with(a, b, |a, b| a ^ b)
}

pub fn not(a: &GrayImage) -> GrayImage {
    let mut out = a.clone();
    for p in out.pixels_mut() {
        p[0] = !p[0];
    }
    out
}

/// Keeps only the bits of `mask` set in `value`.
pub fn and_scalar(a: &GrayImage, value: u8) -> GrayImage {
    let mut out = a.clone();
    for p in out.pixels_mut() {
        p[0] &= value;
    }
    out
}

pub fn count_nonzero(mask: &GrayImage) -> usize {
    mask.as_raw().iter().filter(|&&v| v != 0).count()
}

/// Mean over a `size` x `size` window, replicating edge values.
pub fn box_blur_replicate(field: &Array2<f32>, size: usize) -> Array2<f32> {
    let radius = (size / 2) as isize;
    let (rows, cols) = field.dim();
    if rows == 0 || cols == 0 {
        return field.clone();
    }
    let clamp = |v: isize, len: usize| v.clamp(0, len as isize - 1) as usize;
    let norm = (2 * radius + 1) as f32;

    let mut horizontal = Array2::<f32>::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            let sum: f32 = (-radius..=radius)
                .map(|d| field[[r, clamp(c as isize + d, cols)]])
                .sum();
            horizontal[[r, c]] = sum / norm;
        }
    }

    let mut out = Array2::<f32>::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            let sum: f32 = (-radius..=radius)
                .map(|d| horizontal[[clamp(r as isize + d, rows), c]])
                .sum();
            out[[r, c]] = sum / norm;
        }
    }
    out
}
