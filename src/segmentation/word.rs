//! Dictionary entries: per-pixel local words and frame-wide global words.

use ndarray::Array2;

use super::distance::popcount;
use super::params::WORD_WEIGHT_OFFSET;

/// A (color, descriptor) signature remembered by one pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalWord<const C: usize> {
    pub color: [u8; C],
    pub desc: [u16; C],
    pub desc_bits: [u8; C],
    /// Set bits over all channels
    pub total_bits: usize,
    pub occurrences: usize,
    pub first_occ: usize,
    pub last_occ: usize,
}

impl<const C: usize> LocalWord<C> {
    pub fn new(color: [u8; C], desc: [u16; C], occurrences: usize, frame: usize) -> Self {
        let mut desc_bits = [0u8; C];
        for (bits, &code) in desc_bits.iter_mut().zip(desc.iter()) {
            *bits = popcount(code) as u8;
        }
        Self {
            color,
            desc,
            desc_bits,
            total_bits: desc_bits.iter().map(|&b| b as usize).sum(),
            occurrences,
            first_occ: frame,
            last_occ: frame,
        }
    }

    /// Decaying-recency score of the word at `frame`, in (0, 1].
    ///
    /// Words seen often and recently score high; a word never seen again
    /// decays toward zero without being removed.
    pub fn weight(&self, frame: usize) -> f32 {
        let span = self.last_occ.saturating_sub(self.first_occ) / 2;
        let idle = frame.saturating_sub(self.last_occ);
        let weight = self.occurrences as f32 / (span + idle + WORD_WEIGHT_OFFSET) as f32;
        weight.min(1.0)
    }

    /// Weight the word had one frame after its last sighting.
    pub fn reference_weight(&self) -> f32 {
        self.weight(self.last_occ + 1)
    }

    pub fn hit(&mut self, frame: usize, increment: usize) {
        self.occurrences += increment;
        self.last_occ = frame;
    }
}

/// Weight used for ordering dictionary slots; empty slots rank last.
pub fn slot_weight<const C: usize>(slot: &Option<LocalWord<C>>, frame: usize) -> f32 {
    slot.as_ref().map_or(-1.0, |word| word.weight(frame))
}

/// A signature shared by the whole frame, with per-pixel occupancy.
#[derive(Debug, Clone)]
pub struct GlobalWord<const C: usize> {
    pub color: [u8; C],
    pub total_bits: usize,
    /// Accumulated local weight contributed by each pixel
    pub occupancy: Array2<f32>,
    /// Sum of `occupancy`
    pub latest_weight: f32,
}

impl<const C: usize> GlobalWord<C> {
    pub fn new(color: [u8; C], total_bits: usize, width: usize, height: usize) -> Self {
        Self {
            color,
            total_bits,
            occupancy: Array2::zeros((height, width)),
            latest_weight: 0.0,
        }
    }

    /// Overwrites the signature and forgets all accumulated weight.
    pub fn reset(&mut self, color: [u8; C], total_bits: usize) {
        self.color = color;
        self.total_bits = total_bits;
        self.occupancy.fill(0.0);
        self.latest_weight = 0.0;
    }

    /// Raises the occupancy at (`x`, `y`) by `weight` if it is below it.
    pub fn contribute(&mut self, x: usize, y: usize, weight: f32) {
        let cell = &mut self.occupancy[[y, x]];
        if *cell < weight {
            *cell += weight;
            self.latest_weight += weight;
        }
    }

    pub fn occupancy_at(&self, x: usize, y: usize) -> f32 {
        self.occupancy[[y, x]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_stays_in_unit_interval() {
        let mut word = LocalWord::<1>::new([10], [0], 1, 0);
        assert!(word.weight(0) > 0.0);
        assert!(word.weight(10_000_000) > 0.0);
        word.occurrences = 1_000_000;
        assert_eq!(word.weight(3), 1.0);
    }

    #[test]
    fn weight_decays_while_idle() {
        let word = LocalWord::<3>::new([1, 2, 3], [0b11, 0, 1], 300, 10);
        assert_eq!(word.total_bits, 3);
        assert!(word.weight(10) > word.weight(500));
        assert_eq!(word.reference_weight(), word.weight(11));
    }

    #[test]
    fn hits_raise_weight() {
        let mut word = LocalWord::<1>::new([10], [0], 30, 0);
        let before = word.weight(5);
        word.hit(5, 30);
        assert!(word.weight(5) > before);
        assert_eq!(word.last_occ, 5);
        assert_eq!(word.first_occ, 0);
    }

    #[test]
    fn empty_slots_rank_below_any_word() {
        let empty: Option<LocalWord<1>> = None;
        let word = Some(LocalWord::<1>::new([0], [0], 1, 0));
        assert!(slot_weight(&word, 1_000_000) > slot_weight(&empty, 0));
    }

    #[test]
    fn contributions_only_raise_occupancy() {
        let mut word = GlobalWord::<1>::new([50], 0, 4, 3);
        word.contribute(1, 2, 0.5);
        word.contribute(1, 2, 0.25);
        assert_eq!(word.occupancy_at(1, 2), 0.5);
        assert_eq!(word.latest_weight, 0.5);
        word.reset([60], 4);
        assert_eq!(word.latest_weight, 0.0);
        assert_eq!(word.occupancy.sum(), 0.0);
    }
}
