//! Bulk re-seeding of the local and global dictionaries from the last
//! observed colors and descriptors.

use rand::Rng;

use super::engine::CodebookModel;
use super::matching::{Observation, Thresholds};
use super::params::RefreshParams;
use super::sampling::{gaussian_sample, REFRESH_SAMPLES};
use super::types::PixelPos;
use super::word::LocalWord;

impl<const C: usize> CodebookModel<C> {
    /// Re-seeds every monitored pixel outside the last dilated foreground,
    /// then rebuilds the global dictionary from the seeded words.
    pub fn refresh(&mut self, params: RefreshParams) {
        let _span = tracing::debug_span!(
            "refresh_model",
            base = params.base_occurrences,
            increment = params.overall_match_increment,
            decrement = params.universal_decrement
        )
        .entered();

        self.refresh_local(params);
        if self.config.flags.global_words {
            self.refresh_global();
        }
    }

    fn in_dilated_foreground(&self, x: usize, y: usize) -> bool {
        self.post.was_dilated_foreground(x as u32, y as u32)
    }

    fn pixel_thresholds(&self, x: usize, y: usize) -> Thresholds {
        Thresholds::new::<C>(
            self.params.dist_threshold(x, y),
            self.config.color_dist_threshold,
            self.config.desc_dist_threshold,
        )
    }

    fn last_observation(&self, x: usize, y: usize) -> Observation<C> {
        let idx = y * self.width + x;
        Observation::new(self.last_color[idx], self.last_desc[idx])
    }

    fn refresh_local(&mut self, params: RefreshParams) {
        let flags = self.config.flags;
        let increment = (params.overall_match_increment / REFRESH_SAMPLES).max(1);

        for d in 0..self.pixels.len() {
            let PixelPos { x, y } = self.pixels[d];
            let (x, y) = (x as usize, y as usize);
            if self.in_dilated_foreground(x, y) {
                continue;
            }
            let thresholds = self.pixel_thresholds(x, y);
            self.local.decay(d, params.universal_decrement);

            for _ in 0..REFRESH_SAMPLES {
                let (sx, sy) = gaussian_sample(&mut self.rng, x, y, self.width, self.height);
                if self.in_dilated_foreground(sx, sy) {
                    continue;
                }
                let obs = self.last_observation(sx, sy);
                self.local.match_or_insert(
                    d,
                    &obs,
                    self.frame_index,
                    &thresholds,
                    &flags,
                    increment,
                    params.base_occurrences,
                );
            }
            debug_assert!(self.local.word(d, 0).is_some());
            self.backfill(d, &thresholds);
            self.local.restore_order(d, self.frame_index);
        }
    }

    /// Color offset range for backfilled words. Gray words spread by the
    /// pixel's own threshold, color words by the base threshold.
    fn backfill_spread(&self, thresholds: &Thresholds) -> usize {
        if C == 1 {
            thresholds.color
        } else {
            self.config.color_dist_threshold
        }
    }

    /// Fills empty slots with perturbed copies of higher-ranked words, each
    /// lighter than the rank before it.
    fn backfill(&mut self, d: usize, thresholds: &Thresholds) {
        let words = self.local.words_per_pixel();
        let spread = self.backfill_spread(thresholds);
        for rank in 1..words {
            if self.local.word(d, rank).is_some() {
                continue;
            }
            let source = self.rng.random_range(0..rank);
            let Some(reference) = self.local.word(d, source).cloned() else {
                continue;
            };
            let offset = self.rng.random_range(0..=spread) as i32 - (spread / 2) as i32;
            let mut color = reference.color;
            for c in color.iter_mut() {
                *c = (*c as i32 + offset).clamp(0, u8::MAX as i32) as u8;
            }
            let occurrences = (reference.occurrences * (words - rank) / words).max(1);
            let word = LocalWord::new(color, reference.desc, occurrences, self.frame_index);
            self.local.dict_mut(d)[rank] = Some(word);
        }
    }

    fn refresh_global(&mut self) {
        let flags = self.config.flags;
        let pixel_count = self.pixels.len();
        let stride = (pixel_count / self.global.capacity()).max(1);
        let mut present = vec![false; pixel_count];

        // equally spaced pixels contribute their best word
        for d in (0..pixel_count).step_by(stride) {
            let PixelPos { x, y } = self.pixels[d];
            let (x, y) = (x as usize, y as usize);
            if self.in_dilated_foreground(x, y) {
                continue;
            }
            let Some(best) = self.local.word(d, 0).cloned() else {
                continue;
            };
            let thresholds = self.pixel_thresholds(x, y);
            self.seed_global_word(x, y, &best, &thresholds, &flags);
            present[d] = true;
        }

        let base = Thresholds::new::<C>(
            1.0,
            self.config.color_dist_threshold,
            self.config.desc_dist_threshold,
        );
        let words = self.local.words_per_pixel();
        let mut rank = 0;
        let mut step = (stride / 2).max(1);
        while !self.global.is_full() {
            if rank >= words {
                self.global.fill_random(&mut self.rng);
                break;
            }
            let mut d = 0;
            while d < pixel_count && !self.global.is_full() {
                let PixelPos { x, y } = self.pixels[d];
                let (x, y) = (x as usize, y as usize);
                if !present[d] && !self.in_dilated_foreground(x, y) {
                    if let Some(word) = self.local.word(d, rank).cloned() {
                        self.seed_global_word(x, y, &word, &base, &flags);
                        present[d] = true;
                    }
                }
                d += step;
            }
            step = (step / 2).max(1);
            rank += 1;
        }
        debug_assert!(self.global.is_full());
        tracing::debug!(weights = ?self.global.weights(), "Global dictionary refreshed");
    }

    fn seed_global_word(
        &mut self,
        x: usize,
        y: usize,
        word: &LocalWord<C>,
        thresholds: &Thresholds,
        flags: &crate::config::ModelFlags,
    ) {
        let (rank, id) = self
            .global
            .lookup_or_assign(&word.color, word.total_bits, thresholds, flags);
        self.global.set_lookup(x, y, Some(id));
        self.global.contribute(id, x, y, word.reference_weight());
        self.global.bubble_up(rank);
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SubtractorConfig;
    use crate::segmentation::descriptor::FrameView;
    use crate::segmentation::engine::CodebookModel;
    use crate::segmentation::matching::Thresholds;
    use crate::segmentation::params::WARMUP_REFRESH;
    use crate::segmentation::types::PixelPos;

    fn textured(width: usize, height: usize) -> Vec<u8> {
        (0..width * height)
            .map(|i| if (i / width + i % width) % 4 < 2 { 40 } else { 190 })
            .collect()
    }

    fn model(data: &[u8], width: usize, height: usize, pixels: Vec<PixelPos>) -> CodebookModel<1> {
        let frame = FrameView::<1>::new(data, width, height);
        CodebookModel::new(&frame, pixels, &SubtractorConfig::default().with_seed(9))
    }

    #[test]
    fn textured_scene_keeps_dictionaries_full_and_sorted() {
        let data = textured(16, 16);
        let pixels: Vec<_> = (2..14)
            .flat_map(|y| (2..14).map(move |x| PixelPos::new(x, y)))
            .collect();
        let mut model = model(&data, 16, 16, pixels);
        model.refresh(WARMUP_REFRESH);
        let dicts = model.local_dictionaries();
        for d in 0..dicts.len() {
            assert!(dicts.dict(d).iter().all(Option::is_some));
            assert!(dicts.is_sorted(d, model.frame_index()));
        }
    }

    #[test]
    fn sparse_monitoring_still_fills_global_dictionary() {
        let data = vec![90u8; 12 * 12];
        let model = model(&data, 12, 12, vec![PixelPos::new(5, 5)]);
        let global = model.global_dictionary();
        assert!(global.is_full());
        assert_eq!(global.lookup_at(0, 0), None);
        assert!(global.lookup_at(5, 5).is_some());
    }

    #[test]
    fn backfill_spread_ignores_threshold_factor_for_color() {
        let data = vec![90u8; 12 * 12 * 3];
        let frame = FrameView::<3>::new(&data, 12, 12);
        let config = SubtractorConfig::default().with_seed(9);
        let rgb = CodebookModel::<3>::new(&frame, vec![PixelPos::new(6, 6)], &config);
        let wide = Thresholds::new::<3>(4.0, 30, 3);
        assert_eq!(rgb.backfill_spread(&wide), config.color_dist_threshold);

        let gray_data = vec![90u8; 12 * 12];
        let gray = model(&gray_data, 12, 12, vec![PixelPos::new(6, 6)]);
        let wide = Thresholds::new::<1>(4.0, 30, 3);
        assert_eq!(gray.backfill_spread(&wide), wide.color);
    }

    #[test]
    fn warmup_refresh_floors_occurrences() {
        let data = vec![90u8; 12 * 12];
        let mut model = model(&data, 12, 12, vec![PixelPos::new(6, 6)]);
        model.refresh(WARMUP_REFRESH);
        let dicts = model.local_dictionaries();
        assert!(dicts.dict(0).iter().flatten().all(|w| w.occurrences >= 1));
    }
}
