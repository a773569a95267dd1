//! Random spatial sampling around a pixel.

use rand::Rng;

use super::descriptor::PATCH_RADIUS;

/// 7x7 integer Gaussian used to pick refresh samples; entries sum to 512.
const SAMPLE_KERNEL: [[u32; 7]; 7] = [
    [2, 4, 6, 7, 6, 4, 2],
    [4, 8, 12, 14, 12, 8, 4],
    [6, 12, 21, 25, 21, 12, 6],
    [7, 14, 25, 28, 25, 14, 7],
    [6, 12, 21, 25, 21, 12, 6],
    [4, 8, 12, 14, 12, 8, 4],
    [2, 4, 6, 7, 6, 4, 2],
];
const SAMPLE_KERNEL_TOTAL: u32 = 512;

/// Positions drawn per pixel during a model refresh
pub const REFRESH_SAMPLES: usize = SAMPLE_KERNEL.len() * SAMPLE_KERNEL[0].len() * 2;

fn clamp_inside(v: isize, len: usize) -> usize {
    let lo = PATCH_RADIUS as isize;
    let hi = len as isize - 1 - PATCH_RADIUS as isize;
    v.clamp(lo, hi.max(lo)) as usize
}

/// Draws a position around (`x`, `y`) from the 7x7 Gaussian kernel, clamped
/// away from the border.
pub fn gaussian_sample<R: Rng>(
    rng: &mut R,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
) -> (usize, usize) {
    let target = rng.random_range(0..SAMPLE_KERNEL_TOTAL);
    let mut acc = 0;
    let half = (SAMPLE_KERNEL.len() / 2) as isize;
    for (r, row) in SAMPLE_KERNEL.iter().enumerate() {
        for (c, &w) in row.iter().enumerate() {
            acc += w;
            if target < acc {
                let sx = x as isize + c as isize - half;
                let sy = y as isize + r as isize - half;
                return (clamp_inside(sx, width), clamp_inside(sy, height));
            }
        }
    }
    (x, y)
}

/// Draws one of the 24 neighbors in the 5x5 window around (`x`, `y`),
/// clamped away from the border.
pub fn neighbor_5x5<R: Rng>(
    rng: &mut R,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
) -> (usize, usize) {
    let mut pick = rng.random_range(0..24i32);
    if pick >= 12 {
        pick += 1;
    }
    let dx = (pick % 5 - 2) as isize;
    let dy = (pick / 5 - 2) as isize;
    (
        clamp_inside(x as isize + dx, width),
        clamp_inside(y as isize + dy, height),
    )
}
