//! # Note Segmentation Module
//!
//! Turns a pitch track into an ordered list of [`NoteEvent`]s.
//!
//! Two strategies are available and [`segment`] picks one:
//! - **automatic**: a note opens on the first voiced frame and closes on
//!   silence or whenever the rounded semitone changes
//! - **tap-guided**: the user supplies onset times and every window between
//!   two taps becomes one note at its dominant pitch

use std::collections::BTreeMap;

use crate::{
    analysis::PitchTrack,
    config::SegmentationConfig,
    note::{self, NoteEvent},
    tuning,
};

/// Frames at or below this frequency are never voiced.
pub const MIN_VOICED_FREQUENCY: f32 = 20.0;
/// Notes shorter than this and below [`BLIP_CONFIDENCE`] are dropped.
pub const BLIP_DURATION: f64 = 0.03;
pub const BLIP_CONFIDENCE: f32 = 0.6;
/// Gaps shorter than this between neighbouring notes are closed.
pub const GAP_TOLERANCE: f64 = 0.02;

/// Whether a frame carries a usable pitch.
pub fn is_voiced(frequency: f32, confidence: f32, config: &SegmentationConfig) -> bool {
    confidence >= config.confidence_threshold && frequency > MIN_VOICED_FREQUENCY
}

/// Segments `track` into notes.
///
/// With an empty `taps` slice the automatic strategy runs, otherwise the
/// tap-guided one.
pub fn segment(track: &PitchTrack, config: &SegmentationConfig, taps: &[f64]) -> Vec<NoteEvent> {
    let notes = if taps.is_empty() {
        segment_automatic(track, config)
    } else {
        segment_with_taps(track, config, taps)
    };
    log::info!(
        "segmented {} frames into {} notes ({})",
        track.len(),
        notes.len(),
        if taps.is_empty() { "automatic" } else { "tap-guided" }
    );
    notes
}

/// The note currently being accumulated by the automatic strategy.
struct OpenNote {
    semitone: i32,
    start_time: f64,
    confidence_sum: f32,
    frames: usize,
}

impl OpenNote {
    fn new(semitone: i32, start_time: f64, confidence: f32) -> Self {
        Self {
            semitone,
            start_time,
            confidence_sum: confidence,
            frames: 1,
        }
    }

    /// Emits the note into `notes` if it lasted at least the minimum duration.
    fn close(self, end_time: f64, config: &SegmentationConfig, notes: &mut Vec<NoteEvent>) {
        if end_time - self.start_time < config.min_note_duration {
            return;
        }
        let confidence = self.confidence_sum / self.frames as f32;
        notes.push(NoteEvent::new(0, self.semitone, self.start_time, end_time, confidence));
    }
}

/// Onset and pitch-change detection over the whole track.
pub fn segment_automatic(track: &PitchTrack, config: &SegmentationConfig) -> Vec<NoteEvent> {
    let mut notes = Vec::new();
    let mut open: Option<OpenNote> = None;

    for (index, (&frequency, &confidence)) in
        track.frequencies.iter().zip(&track.confidences).enumerate()
    {
        let time = track.frame_time(index);
        if !is_voiced(frequency, confidence, config) {
            if let Some(current) = open.take() {
                current.close(time, config, &mut notes);
            }
            continue;
        }

        let semitone = tuning::frequency_to_semitone(frequency);
        match open.as_mut() {
            Some(current) if current.semitone == semitone => {
                current.confidence_sum += confidence;
                current.frames += 1;
            }
            _ => {
                if let Some(current) = open.take() {
                    current.close(time, config, &mut notes);
                }
                open = Some(OpenNote::new(semitone, time, confidence));
            }
        }
    }
    if let Some(current) = open.take() {
        current.close(track.duration(), config, &mut notes);
    }

    log::debug!("automatic pass emitted {} raw notes", notes.len());
    post_process(notes)
}

/// Drops short low-confidence blips, merges same-pitch neighbours separated
/// by a tiny gap and closes tiny gaps between different pitches.
fn post_process(notes: Vec<NoteEvent>) -> Vec<NoteEvent> {
    let mut result: Vec<NoteEvent> = Vec::with_capacity(notes.len());
    let kept = notes
        .into_iter()
        .filter(|n| !(n.duration() < BLIP_DURATION && n.confidence < BLIP_CONFIDENCE));

    for current in kept {
        if let Some(previous) = result.last_mut() {
            let gap = current.start_time - previous.end_time;
            if gap < GAP_TOLERANCE {
                if previous.pitch == current.pitch {
                    previous.end_time = current.end_time;
                    previous.confidence = (previous.confidence + current.confidence) / 2.0;
                    continue;
                }
                if gap > 0.0 {
                    previous.end_time = current.start_time;
                }
            }
        }
        result.push(current);
    }

    note::renumber(&mut result);
    result
}

/// One note per window between consecutive taps, the last window ending at
/// the end of the track.
///
/// Windows shorter than the minimum note duration and windows without a
/// voiced frame produce no note.
pub fn segment_with_taps(
    track: &PitchTrack,
    config: &SegmentationConfig,
    taps: &[f64],
) -> Vec<NoteEvent> {
    let mut boundaries: Vec<f64> = taps.iter().copied().filter(|t| t.is_finite()).collect();
    boundaries.sort_by(f64::total_cmp);
    boundaries.push(track.duration());

    let mut notes = Vec::new();
    for window in boundaries.windows(2) {
        let (start, end) = (window[0], window[1]);
        if end - start < config.min_note_duration {
            continue;
        }
        match dominant_pitch(track, start, end, config) {
            Some((pitch, confidence)) => {
                notes.push(NoteEvent::new(0, pitch, start, end, confidence));
            }
            None => log::debug!("no voiced frame between {:.3}s and {:.3}s", start, end),
        }
    }

    note::renumber(&mut notes);
    notes
}

/// Confidence-weighted vote over the voiced frames in `[start, end)`.
///
/// Returns the winning semitone and the mean confidence of its frames. On
/// equal weight the lower semitone wins.
fn dominant_pitch(
    track: &PitchTrack,
    start: f64,
    end: f64,
    config: &SegmentationConfig,
) -> Option<(i32, f32)> {
    // semitone -> (accumulated confidence, frame count)
    let mut votes: BTreeMap<i32, (f32, usize)> = BTreeMap::new();

    let mut index = track.first_frame_at(start);
    while index < track.len() && track.frame_time(index) < end {
        if let Some(estimate) = track.estimate(index) {
            if is_voiced(estimate.frequency, estimate.confidence, config) {
                let semitone = tuning::frequency_to_semitone(estimate.frequency);
                let vote = votes.entry(semitone).or_insert((0.0, 0));
                vote.0 += estimate.confidence;
                vote.1 += 1;
            }
        }
        index += 1;
    }

    let mut winner: Option<(i32, f32, usize)> = None;
    for (&semitone, &(weight, count)) in &votes {
        if winner.is_none_or(|(_, best, _)| weight > best) {
            winner = Some((semitone, weight, count));
        }
    }
    winner.map(|(semitone, weight, count)| (semitone, weight / count as f32))
}
