// transcribe-core/src/lib.rs

//! The core logic for the melody transcriber.
//! This crate is responsible for pitch tracking, note segmentation,
//! and conversion between note events and ABC-style notation text.
//! It is completely headless and contains no UI or audio I/O code.
//!
//! Data flows leaf-first:
//! samples -> [`analysis`] -> [`segment`] -> [`notation::encode`],
//! with [`notation::decode`] bringing edited notation back into note events.

pub mod analysis;
pub mod config;
pub mod edit;
pub mod error;
pub mod notation;
pub mod note;
pub mod pitch;
pub mod segment;
pub mod tuning;

pub use analysis::PitchTrack;
pub use config::{AnalysisConfig, PipelineConfig, SegmentationConfig};
pub use error::{ConfigError, EditError, ParseError};
pub use notation::{Meter, NotationOptions};
pub use note::{NoteEvent, NoteId};

/// Represents the pitch estimate of a single audio analysis frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PitchEstimate {
    /// The detected fundamental frequency in Hz, `0.0` when unvoiced.
    pub frequency: f32,
    /// The confidence of the detected frequency (0.0 to 1.0).
    pub confidence: f32,
}

impl PitchEstimate {
    /// Silence, noise, or any frame without a usable period.
    pub const UNVOICED: PitchEstimate = PitchEstimate {
        frequency: 0.0,
        confidence: 0.0,
    };

    pub fn is_unvoiced(&self) -> bool {
        self.frequency <= 0.0
    }
}
