mod sequence;
#[cfg(feature = "webcam")]
mod webcam;

pub use sequence::ImageSequence;
#[cfg(feature = "webcam")]
pub use webcam::WebcamCapture;

use anyhow::Result;
use image::DynamicImage;

/// Trait for frame sources
pub trait CaptureSource {
    /// Capture a single frame, or `None` once the source is exhausted
    fn capture_frame(&mut self) -> Result<Option<DynamicImage>>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);
}

/// Converts a decoded frame to the layout the model expects
pub fn to_model_layout(frame: DynamicImage, grayscale: bool) -> DynamicImage {
    if grayscale {
        DynamicImage::ImageLuma8(frame.into_luma8())
    } else {
        DynamicImage::ImageRgb8(frame.into_rgb8())
    }
}
