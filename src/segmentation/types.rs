use image::{DynamicImage, GrayImage};

use crate::error::Result;

/// Foreground mask: 255 = foreground, 0 = background
/// Dimensions match the input frame dimensions
pub type Mask = GrayImage;

/// Image coordinates of a monitored pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelPos {
    pub x: u32,
    pub y: u32,
}

impl PixelPos {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Trait for segmentation models
/// Allows swapping between different background models
pub trait SegmentationModel {
    /// Process a frame and return a foreground mask
    ///
    /// # Arguments
    /// * `frame` - Input frame (8-bit gray or 8-bit RGB)
    ///
    /// # Returns
    /// * Binary mask with the frame's dimensions
    fn segment(&mut self, frame: &DynamicImage) -> Result<Mask>;

    /// Reset internal state
    ///
    /// Call this when:
    /// - Switching cameras
    /// - Scene cuts detected
    /// - Starting a new video session
    fn reset_state(&mut self) {
        // Default implementation: no-op for stateless models
    }

    /// Get the frame dimensions the model was built for
    ///
    /// Returns (width, height), or (0, 0) before the first frame
    fn input_size(&self) -> (u32, u32);

    /// Get the output dimensions (usually matches input)
    ///
    /// Returns (width, height)
    fn output_size(&self) -> (u32, u32) {
        self.input_size()
    }
}
