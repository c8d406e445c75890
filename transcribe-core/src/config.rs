//! # Configuration Module
//!
//! Explicit, immutable settings shared by the analysis and segmentation
//! stages. Every stage takes its configuration by reference; nothing is read
//! from global state. All structs can be persisted with serde, and missing
//! fields fall back to their defaults.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pitch;

/// Frame layout for the pitch stream analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Number of samples per analysis frame.
    pub frame_size: usize,
    /// Number of samples between the starts of consecutive frames.
    pub hop_size: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop_size: 512,
        }
    }
}

impl AnalysisConfig {
    /// Checks that the frame layout can resolve the lowest detectable pitch
    /// at `sample_rate`.
    pub fn validate(&self, sample_rate: u32) -> Result<(), ConfigError> {
        if sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.hop_size == 0 {
            return Err(ConfigError::ZeroHopSize);
        }
        let required = pitch::min_frame_size(sample_rate);
        if self.frame_size < required {
            return Err(ConfigError::FrameTooShort {
                frame_size: self.frame_size,
                required,
            });
        }
        Ok(())
    }
}

/// Thresholds used when turning a pitch stream into notes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Frames below this confidence are treated as unvoiced.
    pub confidence_threshold: f32,
    /// Shortest note, in seconds, the segmenter will emit.
    pub min_note_duration: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            min_note_duration: 0.05,
        }
    }
}

impl SegmentationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.confidence_threshold));
        }
        if !self.min_note_duration.is_finite() || self.min_note_duration < 0.0 {
            return Err(ConfigError::InvalidMinDuration(self.min_note_duration));
        }
        Ok(())
    }
}

/// Settings for a whole transcription run, as stored in a config file.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub analysis: AnalysisConfig,
    pub segmentation: SegmentationConfig,
}

impl PipelineConfig {
    pub fn validate(&self, sample_rate: u32) -> Result<(), ConfigError> {
        self.analysis.validate(sample_rate)?;
        self.segmentation.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_at_common_rates() {
        let config = PipelineConfig::default();
        assert_eq!(config.validate(44_100), Ok(()));
        assert_eq!(config.validate(48_000), Ok(()));
    }

    #[test]
    fn frame_must_cover_two_periods_of_lowest_pitch() {
        let config = AnalysisConfig {
            frame_size: 1024,
            hop_size: 256,
        };
        // 44100 / 80 = 551 samples per period, so 1103 samples are needed.
        assert_eq!(
            config.validate(44_100),
            Err(ConfigError::FrameTooShort {
                frame_size: 1024,
                required: 1103,
            })
        );
    }

    #[test]
    fn zero_hop_and_rate_are_rejected() {
        let config = AnalysisConfig {
            frame_size: 2048,
            hop_size: 0,
        };
        assert_eq!(config.validate(44_100), Err(ConfigError::ZeroHopSize));
        assert_eq!(
            AnalysisConfig::default().validate(0),
            Err(ConfigError::ZeroSampleRate)
        );
    }

    #[test]
    fn segmentation_ranges() {
        let mut config = SegmentationConfig::default();
        config.confidence_threshold = 1.5;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ThresholdOutOfRange(1.5))
        );
        config.confidence_threshold = 0.5;
        config.min_note_duration = -0.1;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidMinDuration(-0.1))
        );
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let json = r#"{ "segmentation": { "min_note_duration": 0.1 } }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.analysis, AnalysisConfig::default());
        assert_eq!(config.segmentation.min_note_duration, 0.1);
        assert_eq!(config.segmentation.confidence_threshold, 0.6);
    }
}
