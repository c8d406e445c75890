//! Notation documents back to note events.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::ParseError,
    note::{self, NoteEvent},
};

use super::{
    key::{staff_position_to_semitone, KeySignature, MeasureAccidentals},
    model::{Document, Element, StaffPitch},
    parse::parse_document,
    Meter, NotationOptions, DEFAULT_KEY, DEFAULT_TEMPO_BPM, DEFAULT_TITLE,
};

/// Document-level settings, with defaults filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotationMetadata {
    pub title: String,
    pub tempo_bpm: u32,
    pub meter: Meter,
    pub key: String,
}

impl NotationMetadata {
    /// Encoder options that write the document's settings back out.
    pub fn options(&self) -> NotationOptions {
        NotationOptions {
            title: self.title.clone(),
            tempo_bpm: Some(self.tempo_bpm),
            meter: self.meter,
            key: self.key.clone(),
            transpose_semitones: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub notes: Vec<NoteEvent>,
    pub metadata: NotationMetadata,
}

/// Parses and decodes notation text in one step.
pub fn decode_str(text: &str) -> Result<Decoded, ParseError> {
    decode(&parse_document(text)?)
}

/// Per-voice playback state.
#[derive(Default)]
struct VoiceCursor {
    /// Elapsed time as a fraction of a whole note.
    time: f64,
    accidentals: MeasureAccidentals,
    /// Notes tied into whatever comes next, with their staff positions.
    tied: Vec<(i32, NoteEvent)>,
}

pub fn decode(document: &Document) -> Result<Decoded, ParseError> {
    if !document.has_structural_markers() {
        return Err(ParseError::MalformedDocument(
            "missing index, title and key fields".to_string(),
        ));
    }
    if document.elements().next().is_none() {
        return Err(ParseError::MalformedDocument("no notation elements".to_string()));
    }

    let metadata = metadata(document);
    let key = KeySignature::parse(&metadata.key).unwrap_or_else(|| {
        log::warn!("unknown key {:?}, reading as {DEFAULT_KEY}", metadata.key);
        KeySignature::default()
    });
    let whole_note_seconds = 4.0 * 60.0 / metadata.tempo_bpm as f64;

    let mut cursors: HashMap<(usize, usize), VoiceCursor> = HashMap::new();
    let mut notes = Vec::new();

    for (staff, voice, element) in document.elements() {
        let cursor = cursors.entry((staff, voice)).or_default();
        match element {
            Element::Note {
                pitches,
                duration,
                tie,
            } => {
                let start = cursor.time * whole_note_seconds;
                cursor.time += duration;
                let end = cursor.time * whole_note_seconds;

                let mut waiting = std::mem::take(&mut cursor.tied);
                let mut tied = Vec::new();
                for pitch in pitches {
                    // A tie carries its accidental over the bar line.
                    let carried = waiting
                        .iter()
                        .find(|(position, _)| *position == pitch.position)
                        .filter(|_| pitch.accidental.is_none())
                        .map(|(_, held)| held.pitch);
                    let semitone = match carried {
                        Some(semitone) => semitone,
                        None => resolve(pitch, &key, &mut cursor.accidentals),
                    };
                    let event = match waiting.iter().position(|(_, n)| n.pitch == semitone) {
                        Some(index) => {
                            let (_, mut held) = waiting.swap_remove(index);
                            held.end_time = end;
                            held
                        }
                        None => NoteEvent::new(0, semitone, start, end, 1.0),
                    };
                    if *tie {
                        tied.push((pitch.position, event));
                    } else {
                        notes.push(event);
                    }
                }
                notes.extend(waiting.into_iter().map(|(_, held)| held));
                cursor.tied = tied;
            }
            Element::Rest { duration } => {
                cursor.time += duration;
                notes.extend(cursor.tied.drain(..).map(|(_, held)| held));
            }
            Element::Bar => cursor.accidentals.clear(),
        }
    }
    for cursor in cursors.into_values() {
        notes.extend(cursor.tied.into_iter().map(|(_, held)| held));
    }

    if notes.is_empty() {
        return Err(ParseError::NoNotes);
    }
    note::sort_by_start(&mut notes);
    note::renumber(&mut notes);
    log::debug!(
        "decoded {} notes at {} BPM in {}",
        notes.len(),
        metadata.tempo_bpm,
        metadata.meter
    );

    Ok(Decoded { notes, metadata })
}

/// Semitone of a written pitch, honoring and updating measure accidentals.
fn resolve(pitch: &StaffPitch, key: &KeySignature, accidentals: &mut MeasureAccidentals) -> i32 {
    let alteration = match pitch.accidental {
        Some(accidental) => {
            accidentals.record(pitch.position, accidental.alteration());
            accidental.alteration()
        }
        None => accidentals.effective(key, pitch.position),
    };
    staff_position_to_semitone(pitch.position, alteration)
}

fn metadata(document: &Document) -> NotationMetadata {
    let header = &document.header;
    let tempo_bpm = header.tempo_bpm.unwrap_or_else(|| {
        log::debug!("no tempo field, assuming {DEFAULT_TEMPO_BPM} BPM");
        DEFAULT_TEMPO_BPM
    });
    let meter = header.meter.unwrap_or_else(|| {
        log::debug!("no meter field, assuming {}", Meter::default());
        Meter::default()
    });
    NotationMetadata {
        title: header.title.clone().unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        tempo_bpm,
        meter,
        key: header.key.clone().unwrap_or_else(|| DEFAULT_KEY.to_string()),
    }
}
