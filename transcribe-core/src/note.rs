//! Timed note events, the common currency between segmentation, editing
//! and notation.

use serde::{Deserialize, Serialize};

use crate::tuning;

pub type NoteId = u32;

/// A single note with a semitone pitch and a time span in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub id: NoteId,
    /// Semitone number, 60 is middle C.
    pub pitch: i32,
    pub start_time: f64,
    pub end_time: f64,
    /// Confidence of the pitch (0.0 to 1.0).
    pub confidence: f32,
    /// Set once the note has been touched by an edit operation.
    pub user_corrected: bool,
}

impl NoteEvent {
    pub fn new(id: NoteId, pitch: i32, start_time: f64, end_time: f64, confidence: f32) -> Self {
        Self {
            id,
            pitch,
            start_time,
            end_time,
            confidence,
            user_corrected: false,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Note name such as `C#4`.
    pub fn name(&self) -> String {
        tuning::semitone_name(self.pitch)
    }
}

/// Sorts notes by start time, keeping the relative order of equal starts.
pub fn sort_by_start(notes: &mut [NoteEvent]) {
    notes.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
}

/// Reassigns ids sequentially from zero in list order.
pub fn renumber(notes: &mut [NoteEvent]) {
    for (id, note) in notes.iter_mut().enumerate() {
        note.id = id as NoteId;
    }
}
