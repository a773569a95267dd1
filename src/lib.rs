//! Codebook background subtraction with local and global words.
//!
//! Every monitored pixel keeps a small ranked dictionary of color and LBSP
//! texture signatures, backed by a frame-wide dictionary of recurring
//! signatures. Per-pixel thresholds and learning rates adapt to the scene
//! through feedback from the published masks.

pub mod config;
pub mod error;
pub mod segmentation;

pub use config::{ModelFlags, SubtractorConfig};
pub use error::{BgsError, Result};
pub use segmentation::{
    BackgroundSubtractor, Mask, PixelPos, RefreshParams, SegmentationModel, INIT_REFRESH,
    WARMUP_REFRESH,
};
