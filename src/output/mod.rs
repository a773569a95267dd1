mod mask_dir;

pub use mask_dir::MaskDirectory;

use anyhow::Result;
use image::GrayImage;

/// Trait for mask destinations
pub trait OutputSink {
    /// Write a foreground mask to the output
    fn write_frame(&mut self, mask: &GrayImage) -> Result<()>;

    /// Get the expected output resolution
    fn resolution(&self) -> (u32, u32);
}
