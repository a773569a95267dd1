//! Tuning constants and the per-pixel adaptive parameter field.
//!
//! Every monitored pixel carries a distance threshold factor `r`, its
//! variation factor `r2`, a learning rate `t` and four running means. They are
//! read at the start of a pixel's visit, updated by the feedback rules at the
//! end of it, and never reset after initialization.

use ndarray::Array2;

/// Slots added to every local dictionary on top of the per-channel count
pub const LOCAL_WORD_BASE_COUNT: usize = 3;
/// Slots added to the global dictionary on top of the per-channel count
pub const GLOBAL_WORD_BASE_COUNT: usize = 0;
/// Global words are sampled and decimated once every this many frames
pub const GLOBAL_UPDATE_PERIOD: usize = 4;
/// Global words lighter than this are wiped at decimation time
pub const GLOBAL_WEIGHT_FLOOR: f32 = 1.0;
pub const GLOBAL_DECIMATION_FACTOR: f32 = 0.9;
/// Side of the box kernel used to spread global occupancy maps
pub const GLOBAL_BLUR_SIZE: usize = 7;

/// Keeps freshly created words from outranking long-lived ones
pub const WORD_WEIGHT_OFFSET: usize = 1500;
/// Weight of a word seen once, on the frame it was created
pub const WORD_INIT_WEIGHT: f32 = 1.0 / WORD_WEIGHT_OFFSET as f32;
/// Occurrences credited per match while the model is young
pub const FAST_LEARNING_FRAMES: usize = 100;
pub const FAST_LEARNING_OCC_INCR: usize = (WORD_WEIGHT_OFFSET * 2) / FAST_LEARNING_FRAMES;
pub const GHOST_MIN_OCC_INCR: usize = 8;
/// Occurrences given to a word planted by neighbor diffusion
pub const NEIGHBOR_WORD_OCCURRENCES: usize = WORD_WEIGHT_OFFSET / 8;

/// Frame index at which the model is re-seeded once
pub const WARMUP_REFRESH_FRAME: usize = 50;
pub const INIT_REFRESH: RefreshParams = RefreshParams {
    base_occurrences: WORD_WEIGHT_OFFSET / 4,
    overall_match_increment: WORD_WEIGHT_OFFSET / 2,
    universal_decrement: 0,
};
pub const WARMUP_REFRESH: RefreshParams = RefreshParams {
    base_occurrences: 1,
    overall_match_increment: WORD_WEIGHT_OFFSET,
    universal_decrement: WORD_WEIGHT_OFFSET / 2,
};

/// Window of the running means
pub const SAMPLES_FOR_MEAN: usize = 25;
/// Gray frames use a tighter color threshold and LBSP threshold
pub const SINGLE_CHANNEL_THRESHOLD_FACTOR: f32 = 0.9;

pub const R_LOWER: f32 = 1.0;
pub const R_UPPER: f32 = 3.0;
pub const R_SCALE: f32 = 2.0;
pub const R_INCR: f32 = 0.01;
pub const R_DECR: f32 = 0.001;
pub const R2_OFFSET: f32 = 0.075;
pub const R2_UPPER: f32 = 10.0;
pub const R2_INCR: f32 = 1.0;
pub const R2_DECR: f32 = 0.1;
pub const T_LOWER: f32 = 2.0;
pub const T_UPPER: f32 = 256.0;
pub const T_INCR: f32 = 0.5;
pub const T_DECR: f32 = 0.25;

pub const GHOST_RAW_MEAN_MIN: f32 = 0.95;
pub const GHOST_FINAL_MEAN_MIN: f32 = 0.95;
pub const GHOST_LAST_DIST_MAX: f32 = 0.005;
/// (raw/final segmentation mean floor, last-distance mean floor) pairs
pub const HIGH_VAR_BANDS: [(f32, f32); 3] = [(0.90, 0.15), (0.60, 0.25), (0.30, 0.40)];
pub const UNSTABLE_RAW_MEAN_MIN: f32 = 0.10;
pub const UNSTABLE_FINAL_MEAN_OFFSET: f32 = 0.05;
pub const UNSTABLE_RATIO_MIN: f32 = 3.0;

/// Lower bound applied to the mean minimum distance when it divides a step
const MIN_DIST_FLOOR: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshParams {
    pub base_occurrences: usize,
    pub overall_match_increment: usize,
    pub universal_decrement: usize,
}

/// Region classification derived from the running means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionFlags {
    pub ghost: bool,
    pub high_variance: bool,
    pub unstable: bool,
}

/// Snapshot of one pixel's adaptive parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelParams {
    pub dist_threshold: f32,
    pub dist_threshold_variation: f32,
    pub learning_rate: f32,
    pub mean_min_dist: f32,
    pub mean_last_dist: f32,
    pub mean_raw_segm: f32,
    pub mean_final_segm: f32,
}

impl PixelParams {
    /// Weight sum the matched local words must reach to vouch for background.
    pub fn weight_threshold(&self) -> f32 {
        1.0 / self.dist_threshold.sqrt()
    }

    /// Share of the descriptor distance folded into the blended sum distance.
    pub fn gradient_proportion(&self) -> f32 {
        let span = (self.dist_threshold - R_LOWER) / (R_UPPER - R_LOWER);
        (1.0 - span * span) * 0.5
    }

    /// Update period for stored colors; an override replaces the adaptive rate.
    pub fn update_period(&self, override_rate: Option<f32>) -> usize {
        let rate = match override_rate {
            Some(rate) if rate > 0.0 => rate,
            _ => self.learning_rate,
        };
        (rate.ceil() as usize).max(1)
    }

    pub fn region_flags(&self) -> RegionFlags {
        let raw = self.mean_raw_segm;
        let fin = self.mean_final_segm;
        let last = self.mean_last_dist;
        let ghost = (raw > GHOST_RAW_MEAN_MIN || fin > GHOST_FINAL_MEAN_MIN)
            && last < GHOST_LAST_DIST_MAX
            && self.learning_rate >= T_UPPER;
        let high_variance = HIGH_VAR_BANDS
            .iter()
            .any(|&(segm_min, dist_min)| (raw > segm_min || fin > segm_min) && last > dist_min);
        let unstable = raw > UNSTABLE_RAW_MEAN_MIN
            && raw > (fin + UNSTABLE_FINAL_MEAN_OFFSET) * UNSTABLE_RATIO_MIN;
        RegionFlags {
            ghost,
            high_variance,
            unstable,
        }
    }

    /// Feedback on `t`, `r2` and `r` after the pixel has been classified.
    ///
    /// `was_foreground` is the pixel's state in the last published mask and
    /// `blink` its blink tag (0, half or full).
    pub fn apply_feedback(&mut self, was_foreground: bool, blink: u8, flags: RegionFlags) {
        let min_dist = self.mean_min_dist.max(MIN_DIST_FLOOR);
        if was_foreground && self.learning_rate < T_UPPER {
            self.learning_rate = (self.learning_rate + T_INCR / min_dist).min(T_UPPER);
        } else if self.learning_rate > T_LOWER {
            self.learning_rate = (self.learning_rate - T_DECR / min_dist).max(T_LOWER);
        }

        let dist_factor = (self.mean_min_dist + self.mean_last_dist) / 2.0;
        if (dist_factor > R2_OFFSET && blink != 0) || flags.high_variance {
            if self.dist_threshold_variation < R2_UPPER {
                self.dist_threshold_variation += if blink == BLINK_HALF {
                    R2_INCR / 2.0
                } else {
                    R2_INCR
                };
            }
        } else if self.dist_threshold_variation > 0.0 {
            let step = if was_foreground { R2_DECR / 8.0 } else { R2_DECR };
            self.dist_threshold_variation = (self.dist_threshold_variation - step).max(0.0);
        }

        if self.dist_threshold < R_LOWER + dist_factor * R_SCALE || flags.high_variance {
            if self.dist_threshold < R_UPPER {
                self.dist_threshold = (self.dist_threshold
                    + R_INCR * self.dist_threshold_variation)
                    .min(R_UPPER);
            }
        } else if self.dist_threshold > R_LOWER {
            let decr = if flags.unstable { R_DECR / 2.0 } else { R_DECR };
            let variation = self.dist_threshold_variation.max(R2_DECR);
            self.dist_threshold = (self.dist_threshold - decr / variation).max(R_LOWER);
        }
    }
}

/// Blink tag for a pixel that toggled this frame or the last one
pub const BLINK_FULL: u8 = u8::MAX;
/// Blink tag for a raw foreground pixel left outside the published mask
pub const BLINK_HALF: u8 = u8::MAX / 2;

/// Adds `sample` to a running mean over `n` samples.
pub fn running_mean(mean: f32, sample: f32, n: usize) -> f32 {
    let n = n.max(1) as f32;
    (mean * (n - 1.0) + sample) / n
}

/// Frame-sized scalar fields, one value per pixel.
pub struct ParameterField {
    dist_threshold: Array2<f32>,
    dist_threshold_variation: Array2<f32>,
    learning_rate: Array2<f32>,
    mean_min_dist: Array2<f32>,
    mean_last_dist: Array2<f32>,
    mean_raw_segm: Array2<f32>,
    mean_final_segm: Array2<f32>,
}

impl ParameterField {
    pub fn new(width: usize, height: usize) -> Self {
        let shape = (height, width);
        Self {
            dist_threshold: Array2::from_elem(shape, 1.0),
            dist_threshold_variation: Array2::from_elem(shape, 1.0),
            learning_rate: Array2::from_elem(shape, T_LOWER),
            mean_min_dist: Array2::zeros(shape),
            mean_last_dist: Array2::zeros(shape),
            mean_raw_segm: Array2::zeros(shape),
            mean_final_segm: Array2::zeros(shape),
        }
    }

    pub fn load(&self, x: usize, y: usize) -> PixelParams {
        PixelParams {
            dist_threshold: self.dist_threshold[[y, x]],
            dist_threshold_variation: self.dist_threshold_variation[[y, x]],
            learning_rate: self.learning_rate[[y, x]],
            mean_min_dist: self.mean_min_dist[[y, x]],
            mean_last_dist: self.mean_last_dist[[y, x]],
            mean_raw_segm: self.mean_raw_segm[[y, x]],
            mean_final_segm: self.mean_final_segm[[y, x]],
        }
    }

    pub fn store(&mut self, x: usize, y: usize, params: &PixelParams) {
        self.dist_threshold[[y, x]] = params.dist_threshold;
        self.dist_threshold_variation[[y, x]] = params.dist_threshold_variation;
        self.learning_rate[[y, x]] = params.learning_rate;
        self.mean_min_dist[[y, x]] = params.mean_min_dist;
        self.mean_last_dist[[y, x]] = params.mean_last_dist;
        self.mean_raw_segm[[y, x]] = params.mean_raw_segm;
        self.mean_final_segm[[y, x]] = params.mean_final_segm;
    }

    pub fn dist_threshold(&self, x: usize, y: usize) -> f32 {
        self.dist_threshold[[y, x]]
    }

    /// Folds the published mask into the final segmentation mean.
    pub fn accumulate_final_mask(&mut self, mask: &[u8], samples: usize) {
        let width = self.mean_final_segm.ncols();
        for ((y, x), mean) in self.mean_final_segm.indexed_iter_mut() {
            let value = if mask[y * width + x] != 0 { 1.0 } else { 0.0 };
            *mean = running_mean(*mean, value, samples);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> PixelParams {
        ParameterField::new(4, 4).load(1, 1)
    }

    #[test]
    fn fresh_field_matches_initial_values() {
        let p = params();
        assert_eq!(p.dist_threshold, 1.0);
        assert_eq!(p.dist_threshold_variation, 1.0);
        assert_eq!(p.learning_rate, T_LOWER);
        assert_eq!(p.weight_threshold(), 1.0);
        assert!(!p.region_flags().ghost);
    }

    #[test]
    fn learning_rate_rises_after_foreground_and_stays_bounded() {
        let mut p = params();
        p.mean_min_dist = 0.5;
        for _ in 0..10_000 {
            p.apply_feedback(true, 0, RegionFlags::default());
        }
        assert_eq!(p.learning_rate, T_UPPER);
        for _ in 0..10_000 {
            p.apply_feedback(false, 0, RegionFlags::default());
        }
        assert_eq!(p.learning_rate, T_LOWER);
    }

    #[test]
    fn high_variance_widens_threshold_up_to_upper_bound() {
        let mut p = params();
        let flags = RegionFlags {
            high_variance: true,
            ..Default::default()
        };
        for _ in 0..1_000 {
            p.apply_feedback(false, 0, flags);
        }
        assert_eq!(p.dist_threshold, R_UPPER);
        assert_eq!(p.dist_threshold_variation, R2_UPPER);
        assert!(p.weight_threshold() < 1.0);
    }

    #[test]
    fn quiet_pixel_decays_back_to_lower_bounds() {
        let mut p = params();
        p.dist_threshold = 2.0;
        for _ in 0..100_000 {
            p.apply_feedback(false, 0, RegionFlags::default());
        }
        assert_eq!(p.dist_threshold, R_LOWER);
        assert_eq!(p.dist_threshold_variation, 0.0);
    }

    #[test]
    fn half_blink_grows_variation_slower() {
        let mut full = params();
        let mut half = params();
        full.mean_last_dist = 0.5;
        half.mean_last_dist = 0.5;
        full.apply_feedback(false, BLINK_FULL, RegionFlags::default());
        half.apply_feedback(false, BLINK_HALF, RegionFlags::default());
        assert!(full.dist_threshold_variation > half.dist_threshold_variation);
    }

    #[test]
    fn region_flags_follow_running_means() {
        let mut p = params();
        p.mean_raw_segm = 0.99;
        p.learning_rate = T_UPPER;
        assert!(p.region_flags().ghost);
        assert!(p.region_flags().unstable);

        p.mean_last_dist = 0.5;
        let flags = p.region_flags();
        assert!(!flags.ghost);
        assert!(flags.high_variance);
    }

    #[test]
    fn override_rate_wins_over_adaptive_rate() {
        let mut p = params();
        p.learning_rate = 16.0;
        assert_eq!(p.update_period(None), 16);
        assert_eq!(p.update_period(Some(2.5)), 3);
        assert_eq!(p.update_period(Some(-1.0)), 16);
    }

    #[test]
    fn running_mean_converges() {
        let mut mean = 0.0;
        for _ in 0..500 {
            mean = running_mean(mean, 1.0, SAMPLES_FOR_MEAN);
        }
        assert!((mean - 1.0).abs() < 1e-3);
    }
}
