use crate::error::{BgsError, Result};

/// Runtime switches for the distance variants the matcher can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelFlags {
    /// Blend set-bit count differences into descriptor distances when either
    /// code is dense.
    pub bit_trick: bool,
    /// Mix color distortion into local word color distances (RGB only).
    pub local_color_distortion: bool,
    /// Mix color distortion into global word color distances (RGB only).
    pub global_color_distortion: bool,
    /// Validate each RGB channel against half the total threshold before
    /// checking the totals.
    pub single_channel_validation: bool,
    /// Consult the frame-wide dictionary before declaring foreground.
    pub global_words: bool,
}

impl Default for ModelFlags {
    fn default() -> Self {
        Self {
            bit_trick: false,
            local_color_distortion: false,
            global_color_distortion: true,
            single_channel_validation: true,
            global_words: true,
        }
    }
}

/// Construction parameters of a [`crate::BackgroundSubtractor`].
#[derive(Debug, Clone, PartialEq)]
pub struct SubtractorConfig {
    /// Relative LBSP threshold (fraction of the reference intensity)
    pub lbsp_rel_threshold: f32,
    /// Absolute offset added to the LBSP threshold
    pub lbsp_offset_threshold: u8,
    /// Base descriptor Hamming distance threshold, per channel
    pub desc_dist_threshold: usize,
    /// Base color distance threshold, per channel
    pub color_dist_threshold: usize,
    /// Local words per channel (the local dictionary also gets 3 base slots)
    pub local_words_per_channel: f32,
    /// Global words per channel
    pub global_words_per_channel: f32,
    /// Sampling seed; `None` draws one from the OS
    pub seed: Option<u64>,
    pub flags: ModelFlags,
}

impl Default for SubtractorConfig {
    fn default() -> Self {
        Self {
            lbsp_rel_threshold: 0.333,
            lbsp_offset_threshold: 0,
            desc_dist_threshold: 3,
            color_dist_threshold: 30,
            local_words_per_channel: 4.0,
            global_words_per_channel: 12.0,
            seed: None,
            flags: ModelFlags::default(),
        }
    }
}

impl SubtractorConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.lbsp_rel_threshold >= 0.0) {
            return Err(BgsError::InvalidParameter(format!(
                "lbsp_rel_threshold must be >= 0, got {}",
                self.lbsp_rel_threshold
            )));
        }
        if self.color_dist_threshold == 0 {
            return Err(BgsError::InvalidParameter(
                "color_dist_threshold must be > 0".into(),
            ));
        }
        if !(self.local_words_per_channel >= 1.0) {
            return Err(BgsError::InvalidParameter(format!(
                "local_words_per_channel must be >= 1, got {}",
                self.local_words_per_channel
            )));
        }
        if !(self.global_words_per_channel >= 1.0) {
            return Err(BgsError::InvalidParameter(format!(
                "global_words_per_channel must be >= 1, got {}",
                self.global_words_per_channel
            )));
        }
        Ok(())
    }

    /// Local dictionary capacity for a frame with `channels` channels.
    /// Fractional products truncate toward zero.
    pub fn local_words(&self, channels: usize) -> usize {
        (self.local_words_per_channel * channels as f32) as usize
            + crate::segmentation::params::LOCAL_WORD_BASE_COUNT
    }

    /// Global dictionary capacity for a frame with `channels` channels.
    /// Truncates like [`SubtractorConfig::local_words`].
    pub fn global_words(&self, channels: usize) -> usize {
        (self.global_words_per_channel * channels as f32) as usize
            + crate::segmentation::params::GLOBAL_WORD_BASE_COUNT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SubtractorConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_fractional_word_counts_below_one() {
        let config = SubtractorConfig {
            local_words_per_channel: 0.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BgsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn rejects_zero_color_threshold() {
        let config = SubtractorConfig {
            color_dist_threshold: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn dictionary_sizes_scale_with_channels() {
        let config = SubtractorConfig::default();
        assert_eq!(config.local_words(1), 7);
        assert_eq!(config.local_words(3), 15);
        assert_eq!(config.global_words(1), 12);
        assert_eq!(config.global_words(3), 36);
    }

    #[test]
    fn fractional_word_counts_truncate() {
        let config = SubtractorConfig {
            local_words_per_channel: 2.9,
            global_words_per_channel: 4.6,
            ..Default::default()
        };
        assert_eq!(config.local_words(1), 5);
        assert_eq!(config.local_words(3), 11);
        assert_eq!(config.global_words(1), 4);
        assert_eq!(config.global_words(3), 13);
    }
}
