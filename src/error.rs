use thiserror::Error;

pub type Result<T> = std::result::Result<T, BgsError>;

/// Errors reported at the construction/initialization boundary.
///
/// Once a subtractor is initialized, `apply` only fails on a frame whose
/// shape or pixel format differs from the initialization frame.
#[derive(Debug, Error)]
pub enum BgsError {
    #[error("input image is empty")]
    EmptyImage,

    #[error("unsupported pixel format: {0} (expected 8-bit gray or 8-bit RGB)")]
    UnsupportedFormat(String),

    #[error("no monitored pixels left after border validation")]
    NoMonitoredPixels,

    #[error("frame shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (u32, u32, usize),
        actual: (u32, u32, usize),
    },

    #[error("model used before initialization")]
    NotInitialized,

    #[error("monitored pixels can only be replaced before the model is allocated")]
    AlreadyAllocated,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
