//! Per-pixel ranked dictionaries stored in one index-addressed arena.
//!
//! Dictionary `d` occupies slots `d * words_per_pixel .. (d + 1) * words_per_pixel`
//! and every monitored pixel owns exactly one dictionary. Slots stay sorted by
//! decreasing weight through local bubble steps rather than full sorts.

use crate::config::ModelFlags;

use super::matching::{coarse_match, Observation, Thresholds};
use super::types::PixelPos;
use super::word::{slot_weight, LocalWord};

pub struct LocalDictionaries<const C: usize> {
    words_per_pixel: usize,
    width: usize,
    slots: Vec<Option<LocalWord<C>>>,
    /// Image pixel index to dictionary index
    owners: Vec<Option<usize>>,
}

impl<const C: usize> LocalDictionaries<C> {
    /// Allocates one empty dictionary per entry of `pixels`, in order.
    pub fn new(width: usize, height: usize, pixels: &[PixelPos], words_per_pixel: usize) -> Self {
        let mut owners = vec![None; width * height];
        for (d, px) in pixels.iter().enumerate() {
            owners[px.y as usize * width + px.x as usize] = Some(d);
        }
        Self {
            words_per_pixel,
            width,
            slots: vec![None; pixels.len() * words_per_pixel],
            owners,
        }
    }

    pub fn words_per_pixel(&self) -> usize {
        self.words_per_pixel
    }

    pub fn len(&self) -> usize {
        self.slots.len() / self.words_per_pixel
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Dictionary owned by the pixel at (`x`, `y`), if it is monitored.
    pub fn dict_at(&self, x: usize, y: usize) -> Option<usize> {
        self.owners.get(y * self.width + x).copied().flatten()
    }

    pub fn dict(&self, d: usize) -> &[Option<LocalWord<C>>] {
        let start = d * self.words_per_pixel;
        &self.slots[start..start + self.words_per_pixel]
    }

    pub fn dict_mut(&mut self, d: usize) -> &mut [Option<LocalWord<C>>] {
        let start = d * self.words_per_pixel;
        &mut self.slots[start..start + self.words_per_pixel]
    }

    pub fn word(&self, d: usize, rank: usize) -> Option<&LocalWord<C>> {
        self.dict(d).get(rank).and_then(Option::as_ref)
    }

    pub fn word_mut(&mut self, d: usize, rank: usize) -> Option<&mut LocalWord<C>> {
        self.dict_mut(d).get_mut(rank).and_then(Option::as_mut)
    }

    /// Swaps the slot at `rank` with its left neighbor if it now outweighs it.
    pub fn promote(&mut self, d: usize, rank: usize, frame: usize) -> bool {
        if rank == 0 {
            return false;
        }
        let dict = self.dict_mut(d);
        if slot_weight(&dict[rank], frame) > slot_weight(&dict[rank - 1], frame) {
            dict.swap(rank, rank - 1);
            true
        } else {
            false
        }
    }

    /// Moves the slot at `rank` left until its neighbor is occupied and at
    /// least as heavy; returns its final rank.
    pub fn bubble_up(&mut self, d: usize, mut rank: usize, frame: usize) -> usize {
        let dict = self.dict_mut(d);
        while rank > 0
            && (dict[rank - 1].is_none()
                || slot_weight(&dict[rank], frame) > slot_weight(&dict[rank - 1], frame))
        {
            dict.swap(rank, rank - 1);
            rank -= 1;
        }
        rank
    }

    /// Overwrites the lowest-ranked slot.
    pub fn replace_last(&mut self, d: usize, word: LocalWord<C>) {
        let last = self.words_per_pixel - 1;
        self.dict_mut(d)[last] = Some(word);
    }

    /// Credits the first word matching `obs` with `increment` occurrences, or
    /// overwrites the lowest-ranked slot with a word built from `obs`. The
    /// touched slot is then bubbled into place.
    ///
    /// Returns the final rank of the touched word and its weight.
    #[allow(clippy::too_many_arguments)]
    pub fn match_or_insert(
        &mut self,
        d: usize,
        obs: &Observation<C>,
        frame: usize,
        thresholds: &Thresholds,
        flags: &ModelFlags,
        increment: usize,
        base_occurrences: usize,
    ) -> (usize, f32) {
        let matched = self.dict(d).iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|word| coarse_match(word, obs, thresholds, flags).is_some())
        });
        let rank = match matched {
            Some(rank) => {
                if let Some(word) = self.word_mut(d, rank) {
                    word.hit(frame, increment);
                }
                rank
            }
            None => {
                self.replace_last(d, obs.to_word(base_occurrences, frame));
                self.words_per_pixel - 1
            }
        };
        let rank = self.bubble_up(d, rank, frame);
        (rank, slot_weight(&self.dict(d)[rank], frame))
    }

    /// Lowers every occurrence count by `amount`, keeping counts at 1 or more.
    pub fn decay(&mut self, d: usize, amount: usize) {
        for word in self.dict_mut(d).iter_mut().flatten() {
            word.occurrences = word.occurrences.saturating_sub(amount).max(1);
        }
    }

    /// Orders the dictionary by non-increasing weight with empty slots last.
    /// Stable, so equally weighted words keep their ranks.
    pub fn sort(&mut self, d: usize, frame: usize) {
        self.dict_mut(d)
            .sort_by(|a, b| slot_weight(b, frame).total_cmp(&slot_weight(a, frame)));
    }

    /// Sorts only when the bubble steps left an inversion behind. Returns
    /// whether a sort ran.
    pub fn restore_order(&mut self, d: usize, frame: usize) -> bool {
        if self.is_sorted(d, frame) {
            return false;
        }
        self.sort(d, frame);
        true
    }

    /// Whether the dictionary is fully ordered by non-increasing weight with
    /// empty slots last.
    pub fn is_sorted(&self, d: usize, frame: usize) -> bool {
        self.dict(d)
            .windows(2)
            .all(|pair| slot_weight(&pair[0], frame) >= slot_weight(&pair[1], frame))
    }
}
