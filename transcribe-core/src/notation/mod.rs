//! # Notation Module
//!
//! Conversion between note events and ABC-style notation text.
//!
//! - [`encode`] quantizes notes onto a measure grid and writes text
//! - [`parse`] reads text into the [`model`] element tree
//! - [`decode`] walks the element tree back into timed note events
//!
//! Durations are counted in eighth notes throughout; the text always uses
//! `L:1/8` as its unit note length.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

pub mod decode;
pub mod encode;
pub mod key;
pub mod model;
pub mod parse;
pub mod quantize;

pub use decode::{decode, decode_str, Decoded, NotationMetadata};
pub use encode::{encode, render, RenderedNote, Rendering};
pub use parse::parse_document;

pub const DEFAULT_TEMPO_BPM: u32 = 120;
pub const DEFAULT_KEY: &str = "C";
pub const DEFAULT_TITLE: &str = "Transcription";

/// Time signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meter {
    pub beats_per_measure: u32,
    pub beat_unit: u32,
}

impl Default for Meter {
    fn default() -> Self {
        Self {
            beats_per_measure: 4,
            beat_unit: 4,
        }
    }
}

impl Meter {
    pub fn new(beats_per_measure: u32, beat_unit: u32) -> Self {
        Self {
            beats_per_measure,
            beat_unit,
        }
    }

    /// Length of one measure as a fraction of a whole note.
    pub fn measure_fraction(&self) -> f64 {
        self.beats_per_measure as f64 / self.beat_unit as f64
    }

    /// Length of one measure in eighth notes.
    pub fn measure_eighths(&self) -> f64 {
        self.measure_fraction() * 8.0
    }

    /// True when a measure is a whole number of sixteenth notes, the
    /// shortest length the encoder writes.
    pub fn is_sixteenth_aligned(&self) -> bool {
        self.beats_per_measure > 0
            && self.beat_unit > 0
            && (16 * self.beats_per_measure as u64) % self.beat_unit as u64 == 0
    }

    /// Length of one measure in seconds at `tempo_bpm` quarter notes per minute.
    pub fn measure_seconds(&self, tempo_bpm: u32) -> f64 {
        self.measure_fraction() * 4.0 * (60.0 / tempo_bpm as f64)
    }
}

impl fmt::Display for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats_per_measure, self.beat_unit)
    }
}

impl FromStr for Meter {
    type Err = ParseError;

    /// Accepts `N/D`, `C` (common time) and `C|` (cut time).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidField {
            field: 'M',
            value: s.to_string(),
        };
        match s.trim() {
            "C" => return Ok(Meter::new(4, 4)),
            "C|" => return Ok(Meter::new(2, 2)),
            _ => {}
        }
        let (beats, unit) = s.trim().split_once('/').ok_or_else(invalid)?;
        let beats: u32 = beats.trim().parse().map_err(|_| invalid())?;
        let unit: u32 = unit.trim().parse().map_err(|_| invalid())?;
        if beats == 0 || unit == 0 {
            return Err(invalid());
        }
        Ok(Meter::new(beats, unit))
    }
}

/// Everything the encoder needs besides the notes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotationOptions {
    pub title: String,
    /// Quarter notes per minute; estimated from the notes when `None`.
    pub tempo_bpm: Option<u32>,
    pub meter: Meter,
    /// Key signature such as `C`, `G`, `Bb`, `F#m` or `D dor`.
    pub key: String,
    /// Added to every pitch before spelling.
    pub transpose_semitones: i32,
}

impl Default for NotationOptions {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            tempo_bpm: None,
            meter: Meter::default(),
            key: DEFAULT_KEY.to_string(),
            transpose_semitones: 0,
        }
    }
}
