//! Error types for the notation reader, the note editor and configuration.

use thiserror::Error;

/// Errors produced while reading notation text back into note events.
///
/// The whole document either decodes or fails; callers never receive a
/// partial note list.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("malformed notation document: {0}")]
    MalformedDocument(String),
    #[error("notation document contains no notes")]
    NoNotes,
    #[error("invalid value '{value}' for field '{field}:'")]
    InvalidField { field: char, value: String },
}

/// Errors produced by note edit operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditError {
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Errors produced when validating analysis or segmentation settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("hop size must be greater than zero")]
    ZeroHopSize,
    #[error("sample rate must be greater than zero")]
    ZeroSampleRate,
    #[error("frame size {frame_size} is too short, at least {required} samples are needed")]
    FrameTooShort { frame_size: usize, required: usize },
    #[error("confidence threshold {0} is outside 0.0..=1.0")]
    ThresholdOutOfRange(f32),
    #[error("minimum note duration {0} must be a non-negative number of seconds")]
    InvalidMinDuration(f64),
}
