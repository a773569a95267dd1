mod descriptor;
mod distance;
mod engine;
mod global_dict;
mod imgproc;
mod local_dict;
mod matching;
pub mod params;
mod postprocess;
mod refresh;
mod sampling;
mod subtractor;
pub mod types;
mod word;

pub use params::{RefreshParams, INIT_REFRESH, WARMUP_REFRESH};
pub use subtractor::BackgroundSubtractor;
pub use types::{Mask, PixelPos, SegmentationModel};

use crate::config::SubtractorConfig;
use crate::error::Result;

/// Create a default segmentation model (codebook background subtraction)
pub fn create_default_model(config: SubtractorConfig) -> Result<Box<dyn SegmentationModel>> {
    let model = BackgroundSubtractor::new(config)?;
    Ok(Box::new(model))
}
