//! Public entry point: validates frames, picks the channel layout once and
//! forwards to the matching [`CodebookModel`].

use std::collections::HashSet;

use image::{DynamicImage, GrayImage, RgbImage};

use crate::config::SubtractorConfig;
use crate::error::{BgsError, Result};

use super::descriptor::{patch_fits, FrameView};
use super::engine::CodebookModel;
use super::params::RefreshParams;
use super::types::{Mask, PixelPos, SegmentationModel};

enum ChannelModel {
    Gray(CodebookModel<1>),
    Rgb(CodebookModel<3>),
}

/// Borrowed pixel data of a frame in one of the two supported layouts.
enum Frame<'a> {
    Gray(&'a GrayImage),
    Rgb(&'a RgbImage),
}

impl<'a> Frame<'a> {
    fn from_image(image: &'a DynamicImage) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(BgsError::EmptyImage);
        }
        match image {
            DynamicImage::ImageLuma8(gray) => Ok(Frame::Gray(gray)),
            DynamicImage::ImageRgb8(rgb) => Ok(Frame::Rgb(rgb)),
            other => Err(BgsError::UnsupportedFormat(format!("{:?}", other.color()))),
        }
    }

    fn shape(&self) -> (u32, u32, usize) {
        match self {
            Frame::Gray(img) => (img.width(), img.height(), 1),
            Frame::Rgb(img) => (img.width(), img.height(), 3),
        }
    }
}

/// Codebook background subtractor with local and global words.
///
/// Holds no model until [`initialize`](Self::initialize) runs; the first
/// frame fixes the size and channel layout of every later frame.
pub struct BackgroundSubtractor {
    config: SubtractorConfig,
    monitored: Option<Vec<PixelPos>>,
    model: Option<ChannelModel>,
}

impl BackgroundSubtractor {
    pub fn new(config: SubtractorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            monitored: None,
            model: None,
        })
    }

    pub fn config(&self) -> &SubtractorConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.model.is_some()
    }

    /// Replaces the monitored pixel set used by the next initialization.
    pub fn set_monitored_pixels(&mut self, pixels: Vec<PixelPos>) -> Result<()> {
        if self.model.is_some() {
            return Err(BgsError::AlreadyAllocated);
        }
        if pixels.is_empty() {
            return Err(BgsError::NoMonitoredPixels);
        }
        self.monitored = Some(pixels);
        Ok(())
    }

    /// Allocates the model for `frame` and seeds it.
    ///
    /// Without `pixels`, the set given to
    /// [`set_monitored_pixels`](Self::set_monitored_pixels) is used, or every
    /// pixel when none was given. Pixels whose descriptor patch would leave
    /// the frame are dropped.
    pub fn initialize(&mut self, frame: &DynamicImage, pixels: Option<&[PixelPos]>) -> Result<()> {
        let frame = Frame::from_image(frame)?;
        let (width, height, channels) = frame.shape();

        let requested = match pixels {
            Some(pixels) => Some(pixels.to_vec()),
            None => self.monitored.clone(),
        };
        let pixels = monitored_pixels(requested, width, height)?;

        tracing::info!(
            "Initializing {}-channel model at {}x{} with {} monitored pixels",
            channels,
            width,
            height,
            pixels.len()
        );

        let (w, h) = (width as usize, height as usize);
        let model = match frame {
            Frame::Gray(img) => ChannelModel::Gray(CodebookModel::new(
                &FrameView::<1>::new(img.as_raw(), w, h),
                pixels,
                &self.config,
            )),
            Frame::Rgb(img) => ChannelModel::Rgb(CodebookModel::new(
                &FrameView::<3>::new(img.as_raw(), w, h),
                pixels,
                &self.config,
            )),
        };
        self.model = Some(model);
        Ok(())
    }

    /// Classifies `frame` and returns the published foreground mask.
    ///
    /// `learning_rate` replaces every pixel's adaptive color update period
    /// for this frame.
    pub fn apply(&mut self, frame: &DynamicImage, learning_rate: Option<f32>) -> Result<Mask> {
        if let Some(rate) = learning_rate {
            if !(rate > 0.0 && rate.is_finite()) {
                return Err(BgsError::InvalidParameter(format!(
                    "learning rate must be a positive number, got {}",
                    rate
                )));
            }
        }
        let expected = self.shape().ok_or(BgsError::NotInitialized)?;
        let frame = Frame::from_image(frame)?;
        let actual = frame.shape();
        if actual != expected {
            return Err(BgsError::ShapeMismatch { expected, actual });
        }

        let (w, h) = (actual.0 as usize, actual.1 as usize);
        let mask = match (self.model.as_mut(), frame) {
            (Some(ChannelModel::Gray(model)), Frame::Gray(img)) => {
                model.apply(&FrameView::<1>::new(img.as_raw(), w, h), learning_rate)
            }
            (Some(ChannelModel::Rgb(model)), Frame::Rgb(img)) => {
                model.apply(&FrameView::<3>::new(img.as_raw(), w, h), learning_rate)
            }
            _ => return Err(BgsError::NotInitialized),
        };
        Ok(mask)
    }

    /// Re-seeds the dictionaries from the last observed frame.
    pub fn refresh_model(&mut self, params: RefreshParams) -> Result<()> {
        match self.model.as_mut().ok_or(BgsError::NotInitialized)? {
            ChannelModel::Gray(model) => model.refresh(params),
            ChannelModel::Rgb(model) => model.refresh(params),
        }
        Ok(())
    }

    /// Synthetic background: per monitored pixel, the weighted average color
    /// of its local words.
    pub fn background_image(&self) -> Result<DynamicImage> {
        let (width, height, _) = self.shape().ok_or(BgsError::NotInitialized)?;
        let image = match self.model.as_ref().ok_or(BgsError::NotInitialized)? {
            ChannelModel::Gray(model) => {
                GrayImage::from_raw(width, height, model.background_image()).map(DynamicImage::ImageLuma8)
            }
            ChannelModel::Rgb(model) => {
                RgbImage::from_raw(width, height, model.background_image()).map(DynamicImage::ImageRgb8)
            }
        };
        image.ok_or(BgsError::EmptyImage)
    }

    /// (width, height, channels) of the initialization frame.
    pub fn shape(&self) -> Option<(u32, u32, usize)> {
        match self.model.as_ref()? {
            ChannelModel::Gray(m) => Some((m.width as u32, m.height as u32, 1)),
            ChannelModel::Rgb(m) => Some((m.width as u32, m.height as u32, 3)),
        }
    }

    /// Frames classified since initialization.
    pub fn frame_index(&self) -> Option<usize> {
        match self.model.as_ref()? {
            ChannelModel::Gray(m) => Some(m.frame_index()),
            ChannelModel::Rgb(m) => Some(m.frame_index()),
        }
    }

    pub fn monitored_pixels(&self) -> Option<&[PixelPos]> {
        match self.model.as_ref()? {
            ChannelModel::Gray(m) => Some(m.pixels()),
            ChannelModel::Rgb(m) => Some(m.pixels()),
        }
    }

    /// Blink tags left by the last frame.
    pub fn blink_mask(&self) -> Option<&GrayImage> {
        match self.model.as_ref()? {
            ChannelModel::Gray(m) => Some(m.post_processor().blinks()),
            ChannelModel::Rgb(m) => Some(m.post_processor().blinks()),
        }
    }

    /// Whether every local dictionary has slot 0 occupied and is sorted by
    /// non-increasing weight.
    pub fn dictionaries_ordered(&self) -> bool {
        match self.model.as_ref() {
            Some(ChannelModel::Gray(m)) => dictionaries_ordered(m),
            Some(ChannelModel::Rgb(m)) => dictionaries_ordered(m),
            None => false,
        }
    }
}

fn dictionaries_ordered<const C: usize>(model: &CodebookModel<C>) -> bool {
    let dicts = model.local_dictionaries();
    (0..dicts.len())
        .all(|d| dicts.word(d, 0).is_some() && dicts.is_sorted(d, model.frame_index()))
}

/// Requested pixels minus duplicates and those too close to the border, or
/// every valid pixel when nothing was requested.
fn monitored_pixels(requested: Option<Vec<PixelPos>>, width: u32, height: u32) -> Result<Vec<PixelPos>> {
    let pixels: Vec<PixelPos> = match requested {
        Some(requested) => {
            let mut seen = HashSet::with_capacity(requested.len());
            requested
                .into_iter()
                .filter(|px| patch_fits(px.x, px.y, width, height) && seen.insert(*px))
                .collect()
        }
        None => (0..height)
            .flat_map(|y| (0..width).map(move |x| PixelPos::new(x, y)))
            .filter(|px| patch_fits(px.x, px.y, width, height))
            .collect(),
    };
    if pixels.is_empty() {
        return Err(BgsError::NoMonitoredPixels);
    }
    Ok(pixels)
}

impl SegmentationModel for BackgroundSubtractor {
    fn segment(&mut self, frame: &DynamicImage) -> Result<Mask> {
        if self.model.is_none() {
            self.initialize(frame, None)?;
        }
        self.apply(frame, None)
    }

    fn reset_state(&mut self) {
        tracing::debug!("Dropping background model");
        self.model = None;
    }

    fn input_size(&self) -> (u32, u32) {
        self.shape().map_or((0, 0), |(w, h, _)| (w, h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba, RgbaImage};

    fn gray(width: u32, height: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([value])))
    }

    fn subtractor() -> BackgroundSubtractor {
        BackgroundSubtractor::new(SubtractorConfig::default().with_seed(1)).expect("valid config")
    }

    #[test]
    fn apply_before_initialize_fails() {
        let mut bgs = subtractor();
        assert!(matches!(
            bgs.apply(&gray(8, 8, 0), None),
            Err(BgsError::NotInitialized)
        ));
        assert!(bgs.background_image().is_err());
        assert!(bgs.refresh_model(crate::segmentation::params::WARMUP_REFRESH).is_err());
    }

    #[test]
    fn empty_and_unsupported_frames_are_rejected() {
        let mut bgs = subtractor();
        assert!(matches!(
            bgs.initialize(&gray(0, 0, 0), None),
            Err(BgsError::EmptyImage)
        ));
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 4])));
        assert!(matches!(
            bgs.initialize(&rgba, None),
            Err(BgsError::UnsupportedFormat(_))
        ));
        assert!(!bgs.is_initialized());
    }

    #[test]
    fn border_only_pixel_set_is_rejected() {
        let mut bgs = subtractor();
        let border = [PixelPos::new(0, 0), PixelPos::new(9, 1)];
        assert!(matches!(
            bgs.initialize(&gray(10, 10, 50), Some(&border)),
            Err(BgsError::NoMonitoredPixels)
        ));
        // too small for any patch
        assert!(matches!(
            bgs.initialize(&gray(4, 4, 50), None),
            Err(BgsError::NoMonitoredPixels)
        ));
    }

    #[test]
    fn out_of_frame_pixels_are_dropped() {
        let mut bgs = subtractor();
        let pixels = [
            PixelPos::new(u32::MAX, 5),
            PixelPos::new(5, u32::MAX),
            PixelPos::new(40, 8),
            PixelPos::new(8, 8),
        ];
        bgs.initialize(&gray(16, 16, 50), Some(&pixels)).expect("initialize");
        assert_eq!(bgs.monitored_pixels(), Some(&[PixelPos::new(8, 8)][..]));
        assert!(bgs.apply(&gray(16, 16, 50), None).is_ok());

        let mut bgs = subtractor();
        assert!(matches!(
            bgs.initialize(&gray(16, 16, 50), Some(&[PixelPos::new(u32::MAX, u32::MAX)])),
            Err(BgsError::NoMonitoredPixels)
        ));
    }

    #[test]
    fn duplicate_pixels_are_monitored_once() {
        let mut bgs = subtractor();
        let pixels = [PixelPos::new(4, 4), PixelPos::new(4, 4), PixelPos::new(5, 4)];
        bgs.initialize(&gray(10, 10, 50), Some(&pixels)).expect("initialize");
        assert_eq!(bgs.monitored_pixels().map(<[_]>::len), Some(2));
    }

    #[test]
    fn shape_mismatch_is_reported_before_any_update() {
        let mut bgs = subtractor();
        bgs.initialize(&gray(12, 10, 80), None).expect("initialize");
        let err = bgs.apply(&gray(10, 12, 80), None).unwrap_err();
        assert!(matches!(
            err,
            BgsError::ShapeMismatch {
                expected: (12, 10, 1),
                actual: (10, 12, 1)
            }
        ));
        let rgb = DynamicImage::ImageRgb8(RgbImage::new(12, 10));
        assert!(matches!(
            bgs.apply(&rgb, None),
            Err(BgsError::ShapeMismatch { .. })
        ));
        assert_eq!(bgs.frame_index(), Some(0));
    }

    #[test]
    fn invalid_learning_rate_is_rejected() {
        let mut bgs = subtractor();
        bgs.initialize(&gray(10, 10, 80), None).expect("initialize");
        assert!(matches!(
            bgs.apply(&gray(10, 10, 80), Some(0.0)),
            Err(BgsError::InvalidParameter(_))
        ));
        assert!(bgs.apply(&gray(10, 10, 80), Some(2.0)).is_ok());
    }

    #[test]
    fn monitored_pixels_are_fixed_after_allocation() {
        let mut bgs = subtractor();
        bgs.set_monitored_pixels(vec![PixelPos::new(5, 5)])
            .expect("before allocation");
        bgs.initialize(&gray(10, 10, 80), None).expect("initialize");
        assert_eq!(bgs.monitored_pixels(), Some(&[PixelPos::new(5, 5)][..]));
        assert!(matches!(
            bgs.set_monitored_pixels(vec![PixelPos::new(6, 6)]),
            Err(BgsError::AlreadyAllocated)
        ));
    }

    #[test]
    fn segment_initializes_lazily_and_reset_drops_the_model() {
        let mut bgs = subtractor();
        assert_eq!(bgs.input_size(), (0, 0));
        let mask = bgs.segment(&gray(16, 12, 100)).expect("segment");
        assert_eq!(mask.dimensions(), (16, 12));
        assert_eq!(bgs.input_size(), (16, 12));

        bgs.reset_state();
        assert!(!bgs.is_initialized());
        let mask = bgs.segment(&gray(20, 14, 100)).expect("segment");
        assert_eq!(mask.dimensions(), (20, 14));
    }

    #[test]
    fn background_keeps_layout_and_blacks_out_the_border() {
        let mut bgs = subtractor();
        let frame = DynamicImage::ImageRgb8(RgbImage::from_pixel(12, 12, image::Rgb([90, 140, 220])));
        bgs.initialize(&frame, None).expect("initialize");
        let background = bgs.background_image().expect("background").to_rgb8();
        assert_eq!(background.get_pixel(0, 0).0, [0, 0, 0]);
        let center = background.get_pixel(6, 6).0;
        assert!(center.iter().all(|&v| v > 0));
    }
}
