//! Local Binary Similarity Pattern descriptors.
//!
//! A 16-bit code per channel built from 16 samples of the 5x5 patch around a
//! pixel: a bit is set when the sample differs from the reference intensity by
//! more than the threshold. The reference does not have to be the pixel's own
//! value, which lets the matcher describe the current patch "as seen from" a
//! stored word's color.

use super::params::SINGLE_CHANNEL_THRESHOLD_FACTOR;

/// Half-size of the descriptor patch; pixels closer to the border are not
/// described.
pub const PATCH_RADIUS: usize = 2;

/// Sample offsets (dx, dy), most significant bit first.
const PATTERN: [(isize, isize); 16] = [
    (-1, 1),
    (1, -1),
    (1, 1),
    (-1, -1),
    (1, 0),
    (0, -1),
    (-1, 0),
    (0, 1),
    (-2, -2),
    (2, 2),
    (2, -2),
    (-2, 2),
    (0, 2),
    (0, -2),
    (2, 0),
    (-2, 0),
];

/// Borrowed view over an interleaved 8-bit frame with `C` channels.
#[derive(Clone, Copy)]
pub struct FrameView<'a, const C: usize> {
    data: &'a [u8],
    width: usize,
    height: usize,
}

impl<'a, const C: usize> FrameView<'a, C> {
    pub fn new(data: &'a [u8], width: usize, height: usize) -> Self {
        debug_assert_eq!(data.len(), width * height * C);
        Self {
            data,
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn color(&self, x: usize, y: usize) -> [u8; C] {
        let idx = (y * self.width + x) * C;
        let mut color = [0u8; C];
        color.copy_from_slice(&self.data[idx..idx + C]);
        color
    }

    #[inline]
    fn channel(&self, x: usize, y: usize, c: usize) -> u8 {
        self.data[(y * self.width + x) * C + c]
    }
}

/// LBSP descriptor computer with a per-intensity threshold table.
pub struct Lbsp {
    thresholds: [u8; 256],
}

impl Lbsp {
    /// Builds the threshold table `t * rel + offset`, with the relative part
    /// scaled down for single-channel frames.
    pub fn new(rel_threshold: f32, offset: u8, channels: usize) -> Self {
        let factor = if channels == 1 {
            SINGLE_CHANNEL_THRESHOLD_FACTOR
        } else {
            1.0
        };
        let mut thresholds = [0u8; 256];
        for (t, slot) in thresholds.iter_mut().enumerate() {
            let value = t as f32 * rel_threshold * factor + offset as f32;
            *slot = value.round().clamp(0.0, 255.0) as u8;
        }
        Self { thresholds }
    }

    #[inline]
    pub fn threshold(&self, intensity: u8) -> u8 {
        self.thresholds[intensity as usize]
    }

    /// Code of channel `c` at (`x`, `y`) against `reference`, using the
    /// threshold looked up for that reference.
    pub fn describe<const C: usize>(
        &self,
        frame: &FrameView<'_, C>,
        x: usize,
        y: usize,
        c: usize,
        reference: u8,
    ) -> u16 {
        debug_assert!(x >= PATCH_RADIUS && x + PATCH_RADIUS < frame.width());
        debug_assert!(y >= PATCH_RADIUS && y + PATCH_RADIUS < frame.height());
        let threshold = self.threshold(reference);
        let mut code = 0u16;
        for &(dx, dy) in PATTERN.iter() {
            let sx = (x as isize + dx) as usize;
            let sy = (y as isize + dy) as usize;
            let bit = frame.channel(sx, sy, c).abs_diff(reference) > threshold;
            code = (code << 1) | bit as u16;
        }
        code
    }

    /// Codes of every channel, each against its own reference value.
    pub fn describe_all<const C: usize>(
        &self,
        frame: &FrameView<'_, C>,
        x: usize,
        y: usize,
        reference: &[u8; C],
    ) -> [u16; C] {
        let mut codes = [0u16; C];
        for (c, code) in codes.iter_mut().enumerate() {
            *code = self.describe(frame, x, y, c, reference[c]);
        }
        codes
    }
}

/// Whether a pixel's descriptor patch fits inside a `width` x `height` frame.
pub fn patch_fits(x: u32, y: u32, width: u32, height: u32) -> bool {
    let r = PATCH_RADIUS as u32;
    x >= r && y >= r && x < width.saturating_sub(r) && y < height.saturating_sub(r)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_fit_rejects_far_out_coordinates() {
        assert!(patch_fits(2, 2, 5, 5));
        assert!(!patch_fits(3, 2, 5, 5));
        assert!(!patch_fits(u32::MAX, 5, 16, 16));
        assert!(!patch_fits(5, u32::MAX - 1, 16, 16));
        assert!(!patch_fits(1, 1, 1, 1));
    }

    #[test]
    fn uniform_patch_has_empty_code() {
        let data = vec![90u8; 7 * 7];
        let frame = FrameView::<1>::new(&data, 7, 7);
        let lbsp = Lbsp::new(0.333, 0, 1);
        assert_eq!(lbsp.describe(&frame, 3, 3, 0, 90), 0);
    }

    #[test]
    fn bright_sample_sets_its_bit() {
        let mut data = vec![90u8; 7 * 7];
        // (x+2, y) is the last-but-one sample of the pattern
        data[3 * 7 + 5] = 250;
        let frame = FrameView::<1>::new(&data, 7, 7);
        let lbsp = Lbsp::new(0.333, 0, 1);
        assert_eq!(lbsp.describe(&frame, 3, 3, 0, 90), 0b10);
    }

    #[test]
    fn foreign_reference_describes_contrast() {
        let data = vec![90u8; 7 * 7];
        let frame = FrameView::<1>::new(&data, 7, 7);
        let lbsp = Lbsp::new(0.333, 0, 1);
        assert_eq!(lbsp.describe(&frame, 3, 3, 0, 200), u16::MAX);
    }

    #[test]
    fn rgb_channels_are_described_independently() {
        let mut data = vec![0u8; 5 * 5 * 3];
        for px in data.chunks_mut(3) {
            px.copy_from_slice(&[10, 100, 200]);
        }
        data[(2 * 5 + 4) * 3 + 2] = 20;
        let frame = FrameView::<3>::new(&data, 5, 5);
        let lbsp = Lbsp::new(0.333, 0, 3);
        let codes = lbsp.describe_all(&frame, 2, 2, &frame.color(2, 2));
        assert_eq!(codes, [0, 0, 0b10]);
    }

    #[test]
    fn threshold_table_is_scaled_for_gray() {
        let gray = Lbsp::new(0.5, 2, 1);
        let rgb = Lbsp::new(0.5, 2, 3);
        assert_eq!(rgb.threshold(100), 52);
        assert_eq!(gray.threshold(100), 47);
        assert_eq!(rgb.threshold(255), 130);
    }

    #[test]
    fn border_pixels_do_not_fit() {
        assert!(!patch_fits(1, 5, 10, 10));
        assert!(!patch_fits(5, 8, 10, 10));
        assert!(patch_fits(2, 7, 10, 10));
    }
}
