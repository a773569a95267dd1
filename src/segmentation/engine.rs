//! Per-frame matching and update pass over every monitored pixel.
//!
//! Pixels are visited in the order of the monitored set. Neighbor diffusion
//! writes into dictionaries of pixels visited later in the same pass, so the
//! visiting order is part of the model's behavior.

use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SubtractorConfig;

use super::descriptor::{FrameView, Lbsp};
use super::distance::{absdiff, color_distortion, hamming_total, l1, popcount};
use super::global_dict::GlobalDictionary;
use super::imgproc::{count_nonzero, FG};
use super::local_dict::LocalDictionaries;
use super::matching::{
    channel_desc_distance, coarse_match, color_range, desc_distance, desc_range,
    local_color_distance, Observation, Thresholds, COLOR_RANGE_1CH, DESC_DENSITY_CUTOFF_1CH,
    DESC_RANGE_1CH,
};
use super::params::{
    running_mean, ParameterField, FAST_LEARNING_FRAMES, FAST_LEARNING_OCC_INCR,
    GHOST_MIN_OCC_INCR, GLOBAL_UPDATE_PERIOD, INIT_REFRESH, NEIGHBOR_WORD_OCCURRENCES,
    SAMPLES_FOR_MEAN, WARMUP_REFRESH, WARMUP_REFRESH_FRAME, WORD_INIT_WEIGHT,
};
use super::postprocess::PostProcessor;
use super::sampling::neighbor_5x5;
use super::types::PixelPos;
use super::word::LocalWord;

/// Distances of a successful fine match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FineMatch {
    intra_desc: usize,
    sum: usize,
}

/// Complete background model for frames with `C` interleaved channels.
pub struct CodebookModel<const C: usize> {
    pub(super) config: SubtractorConfig,
    pub(super) width: usize,
    pub(super) height: usize,
    pub(super) pixels: Vec<PixelPos>,
    pub(super) lbsp: Lbsp,
    pub(super) local: LocalDictionaries<C>,
    pub(super) global: GlobalDictionary<C>,
    pub(super) params: ParameterField,
    pub(super) last_color: Vec<[u8; C]>,
    pub(super) last_desc: Vec<[u16; C]>,
    pub(super) post: PostProcessor,
    pub(super) frame_index: usize,
    pub(super) rng: StdRng,
}

impl<const C: usize> CodebookModel<C> {
    /// Allocates every store for `frame`, records it as the last observation
    /// of each monitored pixel and seeds the dictionaries from it.
    pub fn new(frame: &FrameView<'_, C>, pixels: Vec<PixelPos>, config: &SubtractorConfig) -> Self {
        let width = frame.width();
        let height = frame.height();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let lbsp = Lbsp::new(config.lbsp_rel_threshold, config.lbsp_offset_threshold, C);

        let mut last_color = vec![[0u8; C]; width * height];
        let mut last_desc = vec![[0u16; C]; width * height];
        for px in &pixels {
            let (x, y) = (px.x as usize, px.y as usize);
            let color = frame.color(x, y);
            last_color[y * width + x] = color;
            last_desc[y * width + x] = lbsp.describe_all(frame, x, y, &color);
        }

        let local = LocalDictionaries::new(width, height, &pixels, config.local_words(C));
        let global = GlobalDictionary::new(width, height, config.global_words(C));
        tracing::debug!(
            pixels = pixels.len(),
            local_words = local.words_per_pixel(),
            global_words = global.capacity(),
            "Allocating codebook model"
        );

        let mut model = Self {
            config: config.clone(),
            width,
            height,
            pixels,
            lbsp,
            local,
            global,
            params: ParameterField::new(width, height),
            last_color,
            last_desc,
            post: PostProcessor::new(width as u32, height as u32),
            frame_index: 0,
            rng,
        };
        model.refresh(INIT_REFRESH);
        model
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn pixels(&self) -> &[PixelPos] {
        &self.pixels
    }

    pub fn local_dictionaries(&self) -> &LocalDictionaries<C> {
        &self.local
    }

    pub fn global_dictionary(&self) -> &GlobalDictionary<C> {
        &self.global
    }

    pub fn post_processor(&self) -> &PostProcessor {
        &self.post
    }

    /// Classifies `frame` and returns the published foreground mask.
    pub fn apply(&mut self, frame: &FrameView<'_, C>, learning_rate_override: Option<f32>) -> GrayImage {
        let _span = tracing::debug_span!("apply", frame = self.frame_index + 1).entered();

        let base_increment = if self.frame_index < FAST_LEARNING_FRAMES {
            FAST_LEARNING_OCC_INCR
        } else {
            1
        };
        self.frame_index += 1;
        let samples = self.frame_index.min(SAMPLES_FOR_MEAN);
        if self.frame_index == WARMUP_REFRESH_FRAME {
            tracing::info!(frame = self.frame_index, "Warm-up model refresh");
            self.refresh(WARMUP_REFRESH);
        }

        let mut raw = GrayImage::new(self.width as u32, self.height as u32);
        {
            let _span = tracing::debug_span!("match_pixels").entered();
            for d in 0..self.pixels.len() {
                let px = self.pixels[d];
                self.visit_pixel(d, px, frame, base_increment, learning_rate_override, samples, &mut raw);
            }
        }

        if self.config.flags.global_words {
            self.global.sort_pass();
            if self.frame_index % GLOBAL_UPDATE_PERIOD == 0 {
                self.global.decimate();
            }
        }

        let published = self.post.process(&raw);
        self.params.accumulate_final_mask(published.as_raw(), samples);
        tracing::debug!(
            frame = self.frame_index,
            raw_fg = count_nonzero(&raw),
            published_fg = count_nonzero(&published),
            "Frame classified"
        );
        published
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_pixel(
        &mut self,
        d: usize,
        px: PixelPos,
        frame: &FrameView<'_, C>,
        base_increment: usize,
        learning_rate_override: Option<f32>,
        samples: usize,
        raw: &mut GrayImage,
    ) {
        let (x, y) = (px.x as usize, px.y as usize);
        let idx = y * self.width + x;
        let flags = self.config.flags;
        let mut p = self.params.load(x, y);
        let weight_threshold = p.weight_threshold();
        let thresholds = Thresholds::new::<C>(
            p.dist_threshold,
            self.config.color_dist_threshold,
            self.config.desc_dist_threshold,
        );
        let update_period = p.update_period(learning_rate_override);
        let gradient = p.gradient_proportion();

        let color = frame.color(x, y);
        let obs = Observation::new(color, self.lbsp.describe_all(frame, x, y, &color));
        let region = p.region_flags();
        let increment = if region.ghost {
            base_increment.max(GHOST_MIN_OCC_INCR)
        } else {
            base_increment
        };
        let was_foreground = self.post.was_foreground(px.x, px.y);
        let words = self.local.words_per_pixel();

        let mut rank = 0;
        let mut weight_sum = 0.0f32;
        let mut min_sum = color_range(C);
        while rank < words && weight_sum < weight_threshold {
            let matched = self
                .local
                .word(d, rank)
                .and_then(|word| self.fine_match(word, &obs, frame, x, y, &thresholds, gradient));
            if let Some(m) = matched {
                if let Some(word) = self.local.word_mut(d, rank) {
                    word.hit(self.frame_index, increment);
                    weight_sum += word.weight(self.frame_index);
                    if !was_foreground
                        && m.intra_desc <= thresholds.desc / 2
                        && self.rng.random_range(0..update_period) == 0
                    {
                        word.color = color;
                    }
                }
                min_sum = min_sum.min(m.sum);
            }
            self.local.promote(d, rank, self.frame_index);
            rank += 1;
        }

        let last_dist = (l1(&self.last_color[idx], &color) as f32 / color_range(C) as f32
            + hamming_total(&self.last_desc[idx], &obs.desc) as f32 / desc_range(C) as f32)
            / 2.0;
        p.mean_last_dist = running_mean(p.mean_last_dist, last_dist, samples);

        if weight_sum >= weight_threshold {
            p.mean_min_dist = running_mean(
                p.mean_min_dist,
                min_sum as f32 / color_range(C) as f32,
                samples,
            );
            p.mean_raw_segm = running_mean(p.mean_raw_segm, 0.0, samples);
            self.diffuse_to_neighbor(
                x,
                y,
                &obs,
                &thresholds,
                increment,
                update_period,
                weight_threshold,
                region.unstable,
            );
            if flags.global_words && self.rng.random_range(0..GLOBAL_UPDATE_PERIOD) == 0 {
                let id = match self
                    .global
                    .cached_match(x, y, &color, obs.total_bits, &thresholds, &flags)
                {
                    Some(id) => id,
                    None => {
                        let (_, id) =
                            self.global
                                .lookup_or_assign(&color, obs.total_bits, &thresholds, &flags);
                        self.global.set_lookup(x, y, Some(id));
                        id
                    }
                };
                self.global.contribute(id, x, y, weight_sum);
            }
        } else {
            let sample = (min_sum as f32 / color_range(C) as f32
                + (weight_threshold - weight_sum) / 4.0)
                .max(1.0);
            p.mean_min_dist = running_mean(p.mean_min_dist, sample, samples);
            p.mean_raw_segm = running_mean(p.mean_raw_segm, 1.0, samples);

            let covered = flags.global_words && {
                let id = match self
                    .global
                    .cached_match(x, y, &color, obs.total_bits, &thresholds, &flags)
                {
                    Some(id) => Some(id),
                    None => {
                        let found = self
                            .global
                            .find(&color, obs.total_bits, &thresholds, &flags)
                            .map(|(_, id)| id);
                        self.global.set_lookup(x, y, found);
                        found
                    }
                };
                id.is_some_and(|id| {
                    self.global.word(id).occupancy_at(x, y) / 2.0 + weight_sum >= weight_threshold
                })
            };
            if !covered {
                raw.put_pixel(px.x, px.y, Luma([FG]));
                if weight_sum <= WORD_INIT_WEIGHT {
                    self.local
                        .replace_last(d, obs.to_word(increment, self.frame_index));
                }
            }
        }

        self.local.restore_order(d, self.frame_index);

        p.apply_feedback(was_foreground, self.post.blink_at(px.x, px.y), region);
        self.params.store(x, y, &p);
        self.last_color[idx] = color;
        self.last_desc[idx] = obs.desc;
    }

    /// Full color, intra/inter descriptor and blended distance test.
    #[allow(clippy::too_many_arguments)]
    fn fine_match(
        &self,
        word: &LocalWord<C>,
        obs: &Observation<C>,
        frame: &FrameView<'_, C>,
        x: usize,
        y: usize,
        thresholds: &Thresholds,
        gradient: f32,
    ) -> Option<FineMatch> {
        let flags = &self.config.flags;
        let blend = |desc: usize, color: usize, cap: usize| {
            ((gradient * desc as f32) as usize * (COLOR_RANGE_1CH / DESC_RANGE_1CH) + color).min(cap)
        };

        if C == 1 || !flags.single_channel_validation {
            let color = local_color_distance(&obs.color, &word.color, flags);
            if color > thresholds.color {
                return None;
            }
            let intra = desc_distance(
                &obs.desc,
                obs.total_bits,
                &word.desc,
                word.total_bits,
                flags.bit_trick,
            );
            let inter_codes = self.lbsp.describe_all(frame, x, y, &word.color);
            let inter_bits = inter_codes.iter().map(|&c| popcount(c)).sum();
            let inter = desc_distance(
                &inter_codes,
                inter_bits,
                &word.desc,
                word.total_bits,
                flags.bit_trick,
            );
            let desc = (intra + inter) / 2;
            if desc > thresholds.desc {
                return None;
            }
            let sum = blend(desc, color, color_range(C));
            let within = if C == 1 {
                sum <= thresholds.color
            } else {
                sum < thresholds.color
            };
            return within.then_some(FineMatch {
                intra_desc: intra,
                sum,
            });
        }

        let distortion = if flags.local_color_distortion {
            Some(color_distortion(&obs.color, &word.color))
        } else {
            None
        };
        let cutoff = DESC_DENSITY_CUTOFF_1CH * C;
        let dense = flags.bit_trick && (word.total_bits >= cutoff || obs.total_bits >= cutoff);
        let (mut tot_intra, mut tot_desc, mut tot_sum) = (0, 0, 0);
        for c in 0..C {
            let raw_color = absdiff(obs.color[c], word.color[c]);
            let color = distortion.map_or(raw_color, |cd| (raw_color + cd) / 2);
            if color > thresholds.sc_color {
                return None;
            }
            let intra = channel_desc_distance(
                obs.desc[c],
                obs.desc_bits[c] as usize,
                word.desc[c],
                word.desc_bits[c] as usize,
                dense,
            );
            let inter_code = self.lbsp.describe(frame, x, y, c, word.color[c]);
            let inter = channel_desc_distance(
                inter_code,
                popcount(inter_code),
                word.desc[c],
                word.desc_bits[c] as usize,
                dense,
            );
            let desc = (intra + inter) / 2;
            if desc > thresholds.sc_desc {
                return None;
            }
            let sum = blend(desc, color, COLOR_RANGE_1CH);
            if sum > thresholds.sc_color {
                return None;
            }
            tot_intra += intra;
            tot_desc += desc;
            tot_sum += sum;
        }
        (tot_desc <= thresholds.desc && tot_sum < thresholds.color).then_some(FineMatch {
            intra_desc: tot_intra,
            sum: tot_sum,
        })
    }

    /// Spreads a background observation into a random neighbor's dictionary.
    #[allow(clippy::too_many_arguments)]
    fn diffuse_to_neighbor(
        &mut self,
        x: usize,
        y: usize,
        obs: &Observation<C>,
        thresholds: &Thresholds,
        increment: usize,
        update_period: usize,
        weight_threshold: f32,
        unstable: bool,
    ) {
        let (nx, ny) = neighbor_5x5(&mut self.rng, x, y, self.width, self.height);
        let Some(nd) = self.local.dict_at(nx, ny) else {
            return;
        };
        if !(self.rng.random_range(0..update_period) == 0 || unstable) {
            return;
        }
        let flags = self.config.flags;
        let base_color = self.config.color_dist_threshold;
        let words = self.local.words_per_pixel();
        let frame_index = self.frame_index;

        let mut weight_sum = 0.0f32;
        let mut rank = 0;
        while rank < words && weight_sum < weight_threshold {
            if let Some(word) = self.local.word_mut(nd, rank) {
                if let Some(intra) = coarse_match(word, obs, thresholds, &flags) {
                    word.hit(frame_index, increment);
                    weight_sum += word.weight(frame_index);
                    let close_hue = C == 1 || color_distortion(&obs.color, &word.color) <= base_color;
                    if close_hue
                        && intra <= thresholds.desc / 2
                        && self.rng.random_range(0..update_period) == 0
                    {
                        word.color = obs.color;
                    }
                }
            }
            rank += 1;
        }
        if weight_sum <= WORD_INIT_WEIGHT {
            self.local
                .replace_last(nd, obs.to_word(NEIGHBOR_WORD_OCCURRENCES, frame_index));
        }
        self.local.restore_order(nd, frame_index);
    }

    /// Weighted average of every local word color, per monitored pixel.
    /// Unmonitored pixels stay black.
    pub fn background_image(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.width * self.height * C];
        for (d, px) in self.pixels.iter().enumerate() {
            let mut acc = [0f32; C];
            let mut total = 0f32;
            for word in self.local.dict(d).iter().flatten() {
                let weight = word.weight(self.frame_index);
                for (a, &v) in acc.iter_mut().zip(word.color.iter()) {
                    *a += v as f32 * weight;
                }
                total += weight;
            }
            if total <= 0.0 {
                continue;
            }
            let base = (px.y as usize * self.width + px.x as usize) * C;
            for (c, a) in acc.iter().enumerate() {
                out[base + c] = (a / total).round().clamp(0.0, 255.0) as u8;
            }
        }
        out
    }
}
