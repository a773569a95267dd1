//! Frame-wide dictionary shared by every monitored pixel.
//!
//! Words live in an arena and are addressed by [`GlobalWordId`]. The ranking
//! holds ids in decreasing latest-weight order and the per-pixel lookup
//! cache holds the id each pixel matched last; neither owns the words.

use rand::Rng;

use crate::config::ModelFlags;

use super::imgproc::box_blur_replicate;
use super::matching::{global_match, Thresholds};
use super::params::{GLOBAL_BLUR_SIZE, GLOBAL_DECIMATION_FACTOR, GLOBAL_WEIGHT_FLOOR};
use super::word::GlobalWord;

pub type GlobalWordId = usize;

pub struct GlobalDictionary<const C: usize> {
    width: usize,
    height: usize,
    words: Vec<GlobalWord<C>>,
    ranking: Vec<Option<GlobalWordId>>,
    lookup: Vec<Option<GlobalWordId>>,
}

impl<const C: usize> GlobalDictionary<C> {
    pub fn new(width: usize, height: usize, capacity: usize) -> Self {
        Self {
            width,
            height,
            words: Vec::with_capacity(capacity),
            ranking: vec![None; capacity],
            lookup: vec![None; width * height],
        }
    }

    pub fn capacity(&self) -> usize {
        self.ranking.len()
    }

    /// Number of words allocated so far.
    pub fn allocated(&self) -> usize {
        self.words.len()
    }

    pub fn is_full(&self) -> bool {
        self.words.len() == self.capacity()
    }

    pub fn word(&self, id: GlobalWordId) -> &GlobalWord<C> {
        &self.words[id]
    }

    /// Ids in rank order, skipping empty ranks.
    pub fn ranked(&self) -> impl Iterator<Item = GlobalWordId> + '_ {
        self.ranking.iter().flatten().copied()
    }

    pub fn lookup_at(&self, x: usize, y: usize) -> Option<GlobalWordId> {
        self.lookup[y * self.width + x]
    }

    pub fn set_lookup(&mut self, x: usize, y: usize, id: Option<GlobalWordId>) {
        self.lookup[y * self.width + x] = id;
    }

    /// Occupancy of the word cached for (`x`, `y`), if that word still covers
    /// the given signature.
    pub fn cached_match(
        &self,
        x: usize,
        y: usize,
        color: &[u8; C],
        total_bits: usize,
        thresholds: &Thresholds,
        flags: &ModelFlags,
    ) -> Option<GlobalWordId> {
        self.lookup_at(x, y)
            .filter(|&id| global_match(&self.words[id], color, total_bits, thresholds, flags))
    }

    /// First ranked word covering the signature.
    pub fn find(
        &self,
        color: &[u8; C],
        total_bits: usize,
        thresholds: &Thresholds,
        flags: &ModelFlags,
    ) -> Option<(usize, GlobalWordId)> {
        self.ranking.iter().enumerate().find_map(|(rank, id)| {
            id.filter(|&id| global_match(&self.words[id], color, total_bits, thresholds, flags))
                .map(|id| (rank, id))
        })
    }

    /// Finds a word covering the signature, or evicts the lowest-ranked word
    /// (allocating it if that rank is still empty) and resets it to the
    /// signature. Returns the word's rank and id.
    pub fn lookup_or_assign(
        &mut self,
        color: &[u8; C],
        total_bits: usize,
        thresholds: &Thresholds,
        flags: &ModelFlags,
    ) -> (usize, GlobalWordId) {
        if let Some(found) = self.find(color, total_bits, thresholds, flags) {
            return found;
        }
        let last = self.capacity() - 1;
        let id = match self.ranking[last] {
            Some(id) => {
                self.words[id].reset(*color, total_bits);
                id
            }
            None => self.allocate(*color, total_bits),
        };
        self.ranking[last] = Some(id);
        (last, id)
    }

    fn allocate(&mut self, color: [u8; C], total_bits: usize) -> GlobalWordId {
        self.words
            .push(GlobalWord::new(color, total_bits, self.width, self.height));
        self.words.len() - 1
    }

    /// Raises the word's occupancy at (`x`, `y`) to at least `weight`.
    pub fn contribute(&mut self, id: GlobalWordId, x: usize, y: usize, weight: f32) {
        self.words[id].contribute(x, y, weight);
    }

    fn rank_weight(&self, rank: usize) -> Option<f32> {
        self.ranking[rank].map(|id| self.words[id].latest_weight)
    }

    /// Moves the word at `rank` left until its neighbor is occupied and at
    /// least as heavy; returns its final rank.
    pub fn bubble_up(&mut self, mut rank: usize) -> usize {
        while rank > 0 {
            let heavier = match (self.rank_weight(rank), self.rank_weight(rank - 1)) {
                (_, None) => true,
                (Some(curr), Some(prev)) => curr > prev,
                (None, Some(_)) => false,
            };
            if !heavier {
                break;
            }
            self.ranking.swap(rank, rank - 1);
            rank -= 1;
        }
        rank
    }

    /// One left-to-right bubble pass over the whole ranking.
    pub fn sort_pass(&mut self) {
        for rank in 1..self.capacity() {
            if let (Some(curr), Some(prev)) = (self.rank_weight(rank), self.rank_weight(rank - 1)) {
                if curr > prev {
                    self.ranking.swap(rank, rank - 1);
                }
            }
        }
    }

    /// Fades every word: light words are wiped, the others are scaled down
    /// and their occupancy maps spread spatially.
    pub fn decimate(&mut self) {
        for word in self.words.iter_mut() {
            if word.latest_weight == 0.0 {
                continue;
            }
            if word.latest_weight < GLOBAL_WEIGHT_FLOOR {
                word.latest_weight = 0.0;
                word.occupancy.fill(0.0);
            } else {
                word.latest_weight *= GLOBAL_DECIMATION_FACTOR;
                word.occupancy.mapv_inplace(|v| v * GLOBAL_DECIMATION_FACTOR);
                word.occupancy = box_blur_replicate(&word.occupancy, GLOBAL_BLUR_SIZE);
            }
        }
    }

    /// Allocates every remaining word with a random color and no descriptor
    /// bits, in rank order.
    pub fn fill_random<R: Rng>(&mut self, rng: &mut R) {
        for rank in 0..self.capacity() {
            if self.ranking[rank].is_none() {
                let mut color = [0u8; C];
                for c in color.iter_mut() {
                    *c = rng.random();
                }
                let id = self.allocate(color, 0);
                self.ranking[rank] = Some(id);
            }
        }
    }

    /// Latest weights in rank order.
    pub fn weights(&self) -> Vec<f32> {
        self.ranked()
            .map(|id| self.words[id].latest_weight)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn thresholds() -> Thresholds {
        Thresholds::new::<1>(1.0, 30, 3)
    }

    #[test]
    fn miss_allocates_last_rank_then_bubbles() {
        let mut dict = GlobalDictionary::<1>::new(4, 4, 3);
        let flags = ModelFlags::default();
        let (rank, id) = dict.lookup_or_assign(&[100], 0, &thresholds(), &flags);
        assert_eq!(rank, 2);
        dict.contribute(id, 1, 1, 0.5);
        assert_eq!(dict.bubble_up(rank), 0);
        assert_eq!(dict.allocated(), 1);

        let (rank, again) = dict.lookup_or_assign(&[105], 1, &thresholds(), &flags);
        assert_eq!((rank, again), (0, id));
    }

    #[test]
    fn eviction_resets_the_lowest_word() {
        let mut dict = GlobalDictionary::<1>::new(4, 4, 2);
        let flags = ModelFlags::default();
        let mut rng = StdRng::seed_from_u64(7);
        dict.fill_random(&mut rng);
        assert!(dict.is_full());
        for id in dict.ranked().collect::<Vec<_>>() {
            dict.contribute(id, 0, 0, 2.0);
        }
        let victim = dict.ranked().last();
        let (rank, id) = dict.lookup_or_assign(&[255], 9, &thresholds(), &flags);
        assert_eq!(rank, 1);
        assert_eq!(Some(id), victim);
        assert_eq!(dict.word(id).latest_weight, 0.0);
        assert_eq!(dict.word(id).total_bits, 9);
    }

    #[test]
    fn sort_pass_moves_heavier_words_forward() {
        let mut dict = GlobalDictionary::<1>::new(2, 2, 3);
        dict.fill_random(&mut StdRng::seed_from_u64(1));
        let ids: Vec<_> = dict.ranked().collect();
        dict.contribute(ids[2], 0, 0, 1.0);
        dict.sort_pass();
        assert_eq!(dict.ranked().nth(1), Some(ids[2]));
        dict.sort_pass();
        assert_eq!(dict.ranked().next(), Some(ids[2]));
    }

    #[test]
    fn decimation_wipes_light_words_and_fades_heavy_ones() {
        let mut dict = GlobalDictionary::<1>::new(8, 8, 2);
        dict.fill_random(&mut StdRng::seed_from_u64(3));
        let ids: Vec<_> = dict.ranked().collect();
        dict.contribute(ids[0], 4, 4, 0.5);
        for x in 0..8 {
            dict.contribute(ids[1], x, 0, 1.0);
        }
        dict.decimate();
        assert_eq!(dict.word(ids[0]).latest_weight, 0.0);
        assert_eq!(dict.word(ids[0]).occupancy.sum(), 0.0);
        let heavy = dict.word(ids[1]);
        assert!((heavy.latest_weight - 7.2).abs() < 1e-4);
        assert!(heavy.occupancy_at(3, 3) > 0.0);
    }

    #[test]
    fn lookup_cache_is_revalidated() {
        let mut dict = GlobalDictionary::<1>::new(4, 4, 2);
        let flags = ModelFlags::default();
        let (_, id) = dict.lookup_or_assign(&[50], 2, &thresholds(), &flags);
        dict.set_lookup(2, 3, Some(id));
        assert_eq!(dict.cached_match(2, 3, &[60], 2, &thresholds(), &flags), Some(id));
        assert_eq!(dict.cached_match(2, 3, &[150], 2, &thresholds(), &flags), None);
        assert_eq!(dict.cached_match(0, 0, &[50], 2, &thresholds(), &flags), None);
    }
}
