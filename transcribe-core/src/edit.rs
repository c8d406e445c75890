//! # Note Editing Module
//!
//! Pure edit operations on note events. Nothing is mutated in place: every
//! operation returns new notes (or a new [`NoteList`]) and leaves its inputs
//! untouched, so a failed edit never leaves a half-applied list behind.
//! Change notification is the host's business.

use crate::{
    error::EditError,
    note::{self, NoteEvent, NoteId},
};

/// Two notes closer than this are treated as touching.
const TIME_EPSILON: f64 = 1e-9;

/// Splits `note` at time `at` into two notes covering the original span.
///
/// The first half keeps the original id, the second half gets `new_id`.
/// Both are marked as user corrected.
pub fn split_note(
    note: &NoteEvent,
    at: f64,
    new_id: NoteId,
) -> Result<(NoteEvent, NoteEvent), EditError> {
    if !(note.start_time < at && at < note.end_time) {
        return Err(EditError::InvalidOperation(format!(
            "split point {at}s is not inside note {} ({}s..{}s)",
            note.id, note.start_time, note.end_time
        )));
    }
    let first = NoteEvent {
        end_time: at,
        user_corrected: true,
        ..note.clone()
    };
    let second = NoteEvent {
        id: new_id,
        start_time: at,
        user_corrected: true,
        ..note.clone()
    };
    Ok((first, second))
}

/// Joins `first` and the note `second` that follows it into one note.
///
/// The pitch comes from the longer of the two (the first on a tie) and the
/// confidences are averaged.
pub fn merge_notes(first: &NoteEvent, second: &NoteEvent) -> Result<NoteEvent, EditError> {
    if second.start_time <= first.start_time || second.start_time < first.end_time - TIME_EPSILON {
        return Err(EditError::InvalidOperation(format!(
            "note {} does not follow note {}",
            second.id, first.id
        )));
    }
    let pitch = if second.duration() > first.duration() {
        second.pitch
    } else {
        first.pitch
    };
    Ok(NoteEvent {
        id: first.id,
        pitch,
        start_time: first.start_time,
        end_time: second.end_time,
        confidence: (first.confidence + second.confidence) / 2.0,
        user_corrected: true,
    })
}

/// Returns a copy of `note` at a new pitch.
pub fn set_pitch(note: &NoteEvent, pitch: i32) -> NoteEvent {
    NoteEvent {
        pitch,
        user_corrected: true,
        ..note.clone()
    }
}

/// Returns a copy of `note` moved or resized to `start..end`.
///
/// Any positive length is accepted, including lengths below the
/// segmentation minimum.
pub fn set_times(note: &NoteEvent, start: f64, end: f64) -> Result<NoteEvent, EditError> {
    if !start.is_finite() || !end.is_finite() || end <= start {
        return Err(EditError::InvalidOperation(format!(
            "invalid time span {start}s..{end}s for note {}",
            note.id
        )));
    }
    Ok(NoteEvent {
        start_time: start,
        end_time: end,
        user_corrected: true,
        ..note.clone()
    })
}

/// Copy-on-write list of notes kept sorted by start time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteList {
    notes: Vec<NoteEvent>,
    next_id: NoteId,
}

impl NoteList {
    pub fn new(mut notes: Vec<NoteEvent>) -> Self {
        note::sort_by_start(&mut notes);
        let next_id = notes.iter().map(|n| n.id + 1).max().unwrap_or(0);
        Self { notes, next_id }
    }

    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    pub fn into_notes(self) -> Vec<NoteEvent> {
        self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, id: NoteId) -> Option<&NoteEvent> {
        self.notes.iter().find(|n| n.id == id)
    }

    fn position(&self, id: NoteId) -> Result<usize, EditError> {
        self.notes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| EditError::InvalidOperation(format!("no note with id {id}")))
    }

    fn with_notes(&self, notes: Vec<NoteEvent>, next_id: NoteId) -> NoteList {
        let mut list = NoteList { notes, next_id };
        note::sort_by_start(&mut list.notes);
        list
    }

    /// Adds a user-created note and returns the new list with the note's id.
    pub fn add(&self, pitch: i32, start: f64, end: f64) -> Result<(NoteList, NoteId), EditError> {
        let id = self.next_id;
        let created = set_times(&NoteEvent::new(id, pitch, start, start, 1.0), start, end)?;
        let mut notes = self.notes.clone();
        notes.push(created);
        Ok((self.with_notes(notes, id + 1), id))
    }

    pub fn delete(&self, id: NoteId) -> Result<NoteList, EditError> {
        let index = self.position(id)?;
        let mut notes = self.notes.clone();
        notes.remove(index);
        Ok(self.with_notes(notes, self.next_id))
    }

    pub fn split(&self, id: NoteId, at: f64) -> Result<NoteList, EditError> {
        let index = self.position(id)?;
        let (first, second) = split_note(&self.notes[index], at, self.next_id)?;
        let mut notes = self.notes.clone();
        notes[index] = first;
        notes.insert(index + 1, second);
        Ok(self.with_notes(notes, self.next_id + 1))
    }

    /// Merges note `first` with `second`, which must be the next note in the list.
    pub fn merge(&self, first: NoteId, second: NoteId) -> Result<NoteList, EditError> {
        let index = self.position(first)?;
        let next = self.position(second)?;
        if next != index + 1 {
            return Err(EditError::InvalidOperation(format!(
                "note {second} is not the note right after {first}"
            )));
        }
        let merged = merge_notes(&self.notes[index], &self.notes[next])?;
        let mut notes = self.notes.clone();
        notes[index] = merged;
        notes.remove(next);
        Ok(self.with_notes(notes, self.next_id))
    }

    pub fn set_pitch(&self, id: NoteId, pitch: i32) -> Result<NoteList, EditError> {
        self.update(id, |n| Ok(set_pitch(n, pitch)))
    }

    pub fn set_times(&self, id: NoteId, start: f64, end: f64) -> Result<NoteList, EditError> {
        self.update(id, |n| set_times(n, start, end))
    }

    /// Replaces one note with the result of `edit`, re-sorting afterwards.
    pub fn update<F>(&self, id: NoteId, edit: F) -> Result<NoteList, EditError>
    where
        F: FnOnce(&NoteEvent) -> Result<NoteEvent, EditError>,
    {
        let index = self.position(id)?;
        let edited = edit(&self.notes[index])?;
        let mut notes = self.notes.clone();
        notes[index] = edited;
        Ok(self.with_notes(notes, self.next_id))
    }
}
