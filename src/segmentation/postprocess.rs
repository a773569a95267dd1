//! Turns raw per-pixel decisions into the published mask and keeps the blink
//! bookkeeping that feeds the next frame's threshold feedback.

use image::GrayImage;

use super::imgproc::{
    and, and_scalar, close3x3, dilate, enclosed_holes, erode, median, not, or, xor,
};
use super::params::BLINK_HALF;

const ERODE_RADIUS: u8 = 2;
const MEDIAN_RADIUS: u32 = 4;
const DILATE_RADIUS: u8 = 3;

pub struct PostProcessor {
    raw_last: GrayImage,
    toggles_last: GrayImage,
    published: GrayImage,
    dilated: GrayImage,
    dilated_inverted: GrayImage,
    blinks: GrayImage,
}

impl PostProcessor {
    pub fn new(width: u32, height: u32) -> Self {
        let blank = GrayImage::new(width, height);
        Self {
            raw_last: blank.clone(),
            toggles_last: blank.clone(),
            published: blank.clone(),
            dilated: blank.clone(),
            dilated_inverted: blank.clone(),
            blinks: blank,
        }
    }

    /// Blink tags: full for toggling pixels, half for raw foreground left
    /// out of the published mask, zero elsewhere.
    pub fn blinks(&self) -> &GrayImage {
        &self.blinks
    }

    pub fn blink_at(&self, x: u32, y: u32) -> u8 {
        self.blinks.get_pixel(x, y)[0]
    }

    pub fn was_foreground(&self, x: u32, y: u32) -> bool {
        self.published.get_pixel(x, y)[0] != 0
    }

    pub fn was_dilated_foreground(&self, x: u32, y: u32) -> bool {
        self.dilated.get_pixel(x, y)[0] != 0
    }

    /// Cleans `raw` into the mask to publish and updates the blink state.
    pub fn process(&mut self, raw: &GrayImage) -> GrayImage {
        let _span = tracing::debug_span!("postprocess").entered();

        let toggles = xor(raw, &self.raw_last);
        let mut blinks = or(&toggles, &self.toggles_last);
        self.toggles_last = toggles;
        self.raw_last = raw.clone();

        let closed = close3x3(raw);
        let holes = enclosed_holes(&closed);
        let core = erode(&closed, ERODE_RADIUS);
        let filled = or(&or(raw, &holes), &core);

        self.published = median(&filled, MEDIAN_RADIUS);
        self.dilated = dilate(&self.published, DILATE_RADIUS);

        blinks = and(&blinks, &self.dilated_inverted);
        let mut stray = and(&self.raw_last, &self.dilated_inverted);
        self.dilated_inverted = not(&self.dilated);
        blinks = and(&blinks, &self.dilated_inverted);
        stray = and(&stray, &self.dilated_inverted);
        stray = and_scalar(&stray, BLINK_HALF);
        self.blinks = or(&blinks, &stray);

        self.published.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::imgproc::{count_nonzero, FG};
    use crate::segmentation::params::BLINK_FULL;
    use image::Luma;

    fn raw_with(width: u32, height: u32, pixels: &[(u32, u32)]) -> GrayImage {
        let mut raw = GrayImage::new(width, height);
        for &(x, y) in pixels {
            raw.put_pixel(x, y, Luma([FG]));
        }
        raw
    }

    #[test]
    fn empty_raw_mask_publishes_nothing() {
        let mut post = PostProcessor::new(20, 20);
        let mask = post.process(&GrayImage::new(20, 20));
        assert_eq!(count_nonzero(&mask), 0);
        assert_eq!(count_nonzero(post.blinks()), 0);
    }

    #[test]
    fn single_pixel_blink_is_tagged_but_not_published() {
        let mut post = PostProcessor::new(24, 24);
        let on = raw_with(24, 24, &[(12, 12)]);
        let off = GrayImage::new(24, 24);

        for raw in [&on, &off, &on] {
            let mask = post.process(raw);
            assert_eq!(count_nonzero(&mask), 0);
        }
        assert_eq!(post.blink_at(12, 12), BLINK_FULL);
        assert_eq!(post.blink_at(5, 5), 0);
    }

    #[test]
    fn solid_blob_is_published_and_gates_blinks() {
        let mut post = PostProcessor::new(40, 40);
        let blob: Vec<_> = (10..25)
            .flat_map(|y| (10..25).map(move |x| (x, y)))
            .collect();
        let raw = raw_with(40, 40, &blob);
        let mask = post.process(&raw);
        assert_eq!(mask.get_pixel(17, 17)[0], FG);
        assert!(post.was_dilated_foreground(8, 17));

        post.process(&GrayImage::new(40, 40));
        let mask = post.process(&raw);
        assert_eq!(mask.get_pixel(17, 17)[0], FG);
        assert_eq!(post.blink_at(17, 17), 0);
    }

    #[test]
    fn enclosed_holes_are_filled() {
        let mut post = PostProcessor::new(40, 40);
        let ring: Vec<_> = (8..32)
            .flat_map(|y| (8..32).map(move |x| (x, y)))
            .filter(|&(x, y)| !(14..26).contains(&x) || !(14..26).contains(&y))
            .collect();
        let mask = post.process(&raw_with(40, 40, &ring));
        assert_eq!(mask.get_pixel(20, 20)[0], FG);
    }

    #[test]
    fn stray_raw_foreground_gets_half_tag() {
        let mut post = PostProcessor::new(24, 24);
        let on = raw_with(24, 24, &[(4, 4)]);
        post.process(&on);
        post.process(&on);
        // the toggle from the first frame is still remembered
        assert_eq!(post.blink_at(4, 4), BLINK_FULL);
        post.process(&on);
        assert_eq!(post.blink_at(4, 4), BLINK_HALF);
    }
}
