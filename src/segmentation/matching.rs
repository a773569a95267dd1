//! Thresholds and match predicates shared by the matcher, the refresh
//! routine and neighbor diffusion.

use crate::config::ModelFlags;

use super::distance::{color_distortion, hamming, hamming_total, l1, popcount};
use super::params::SINGLE_CHANNEL_THRESHOLD_FACTOR;
use super::word::{GlobalWord, LocalWord};

/// Largest color distance over one channel
pub const COLOR_RANGE_1CH: usize = u8::MAX as usize;
/// Largest descriptor distance over one channel
pub const DESC_RANGE_1CH: usize = 16;
/// Codes denser than this (in set bits per channel) switch descriptor
/// distances to the bit-count blend when the bit trick is on
pub const DESC_DENSITY_CUTOFF_1CH: usize = DESC_RANGE_1CH / 2;

pub const fn color_range(channels: usize) -> usize {
    COLOR_RANGE_1CH * channels
}

pub const fn desc_range(channels: usize) -> usize {
    DESC_RANGE_1CH * channels
}

/// The current observation at a pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation<const C: usize> {
    pub color: [u8; C],
    pub desc: [u16; C],
    pub desc_bits: [u8; C],
    pub total_bits: usize,
}

impl<const C: usize> Observation<C> {
    pub fn new(color: [u8; C], desc: [u16; C]) -> Self {
        let mut desc_bits = [0u8; C];
        for (bits, &code) in desc_bits.iter_mut().zip(desc.iter()) {
            *bits = popcount(code) as u8;
        }
        Self {
            color,
            desc,
            desc_bits,
            total_bits: desc_bits.iter().map(|&b| b as usize).sum(),
        }
    }

    pub fn to_word(&self, occurrences: usize, frame: usize) -> LocalWord<C> {
        LocalWord::new(self.color, self.desc, occurrences, frame)
    }
}

/// Distance thresholds of one pixel, scaled by its threshold factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Total color threshold over all channels
    pub color: usize,
    /// Total descriptor threshold over all channels
    pub desc: usize,
    /// Per-channel color threshold used by single-channel validation
    pub sc_color: usize,
    /// Per-channel descriptor threshold used by single-channel validation
    pub sc_desc: usize,
}

impl Thresholds {
    pub fn new<const C: usize>(factor: f32, base_color: usize, base_desc: usize) -> Self {
        if C == 1 {
            let color = (factor * base_color as f32 * SINGLE_CHANNEL_THRESHOLD_FACTOR) as usize;
            let desc = (factor * base_desc as f32) as usize;
            Self {
                color,
                desc,
                sc_color: color,
                sc_desc: desc,
            }
        } else {
            let color = (factor * base_color as f32 * C as f32) as usize;
            let desc = (factor * base_desc as f32 * C as f32) as usize;
            Self {
                color,
                desc,
                sc_color: color / 2,
                sc_desc: desc / 2,
            }
        }
    }
}

/// Hamming distance, optionally blended with the bit-count difference when
/// either code set is dense.
pub fn desc_distance<const C: usize>(
    a: &[u16; C],
    a_bits: usize,
    b: &[u16; C],
    b_bits: usize,
    bit_trick: bool,
) -> usize {
    let dist = hamming_total(a, b);
    let cutoff = DESC_DENSITY_CUTOFF_1CH * C;
    if !bit_trick || (a_bits < cutoff && b_bits < cutoff) {
        dist
    } else {
        (a_bits.abs_diff(b_bits) + dist) / 2
    }
}

/// Per-channel descriptor distance with the same optional blend.
pub fn channel_desc_distance(
    a: u16,
    a_bits: usize,
    b: u16,
    b_bits: usize,
    dense: bool,
) -> usize {
    let dist = hamming(a, b);
    if dense {
        (a_bits.abs_diff(b_bits) + dist) / 2
    } else {
        dist
    }
}

/// Total color distance between an observation and a local word.
pub fn local_color_distance<const C: usize>(a: &[u8; C], b: &[u8; C], flags: &ModelFlags) -> usize {
    if C > 1 && flags.local_color_distortion {
        (l1(a, b) + color_distortion(a, b) * C) / 2
    } else {
        l1(a, b)
    }
}

/// Total color distance between a color and a global word.
pub fn global_color_distance<const C: usize>(a: &[u8; C], b: &[u8; C], flags: &ModelFlags) -> usize {
    if C > 1 && flags.global_color_distortion {
        (l1(a, b) + color_distortion(a, b) * C) / 2
    } else {
        l1(a, b)
    }
}

/// Color and intra-descriptor test used outside the main matcher (model
/// refresh and neighbor diffusion). Returns the intra-descriptor distance.
pub fn coarse_match<const C: usize>(
    word: &LocalWord<C>,
    obs: &Observation<C>,
    thresholds: &Thresholds,
    flags: &ModelFlags,
) -> Option<usize> {
    if local_color_distance(&obs.color, &word.color, flags) > thresholds.color {
        return None;
    }
    let desc = desc_distance(
        &obs.desc,
        obs.total_bits,
        &word.desc,
        word.total_bits,
        flags.bit_trick,
    );
    (desc <= thresholds.desc).then_some(desc)
}

/// Whether a global word covers a (color, set-bit count) signature.
pub fn global_match<const C: usize>(
    word: &GlobalWord<C>,
    color: &[u8; C],
    total_bits: usize,
    thresholds: &Thresholds,
    flags: &ModelFlags,
) -> bool {
    global_color_distance(color, &word.color, flags) <= thresholds.color
        && total_bits.abs_diff(word.total_bits) <= thresholds.desc
}
