//! Duration quantization and tempo estimation.

use crate::note::NoteEvent;

use super::DEFAULT_TEMPO_BPM;

/// Allowed written durations in eighth notes, shortest first.
pub const QUANTIZATION_LADDER: [f64; 10] = [0.5, 1.0, 1.5, 2.0, 3.0, 4.0, 6.0, 8.0, 12.0, 16.0];

/// Tempo markings the estimator snaps to.
pub const CONVENTIONAL_TEMPI: [u32; 15] = [
    60, 66, 72, 80, 88, 92, 100, 108, 112, 120, 132, 144, 160, 176, 200,
];

/// Closest ladder value to `eighths`.
///
/// The ladder is scanned shortest first and only a strictly smaller
/// distance replaces the current pick, so a value exactly between two
/// rungs goes to the shorter one.
pub fn quantize_eighths(eighths: f64) -> f64 {
    let mut best = QUANTIZATION_LADDER[0];
    let mut best_distance = (eighths - best).abs();
    for &candidate in &QUANTIZATION_LADDER[1..] {
        let distance = (eighths - candidate).abs();
        if distance < best_distance {
            best = candidate;
            best_distance = distance;
        }
    }
    best
}

/// Length of an eighth note in seconds.
pub fn eighth_note_seconds(tempo_bpm: u32) -> f64 {
    (60.0 / tempo_bpm as f64) / 2.0
}

/// Guesses a tempo by assuming the average note is an eighth note.
pub fn estimate_tempo(notes: &[NoteEvent]) -> u32 {
    if notes.is_empty() {
        return DEFAULT_TEMPO_BPM;
    }
    let mean = notes.iter().map(NoteEvent::duration).sum::<f64>() / notes.len() as f64;
    if !mean.is_finite() || mean <= 0.0 {
        return DEFAULT_TEMPO_BPM;
    }
    snap_tempo(30.0 / mean)
}

/// Nearest entry of [`CONVENTIONAL_TEMPI`].
pub fn snap_tempo(bpm: f64) -> u32 {
    let mut best = CONVENTIONAL_TEMPI[0];
    for &candidate in &CONVENTIONAL_TEMPI[1..] {
        if (bpm - candidate as f64).abs() < (bpm - best as f64).abs() {
            best = candidate;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_values_map_to_themselves() {
        for &rung in &QUANTIZATION_LADDER {
            assert_eq!(quantize_eighths(rung), rung);
        }
    }

    #[test]
    fn nearest_rung_wins() {
        assert_eq!(quantize_eighths(0.0), 0.5);
        assert_eq!(quantize_eighths(0.9), 1.0);
        assert_eq!(quantize_eighths(1.3), 1.5);
        assert_eq!(quantize_eighths(3.4), 3.0);
        assert_eq!(quantize_eighths(7.1), 8.0);
        assert_eq!(quantize_eighths(24.0), 16.0);
    }

    #[test]
    fn ties_go_to_the_shorter_rung() {
        assert_eq!(quantize_eighths(2.5), 2.0);
        assert_eq!(quantize_eighths(5.0), 4.0);
        assert_eq!(quantize_eighths(7.0), 6.0);
        assert_eq!(quantize_eighths(10.0), 8.0);
        assert_eq!(quantize_eighths(14.0), 12.0);
    }

    #[test]
    fn tempo_estimate_snaps_to_conventional_marking() {
        // Mean 0.25 s -> 120 BPM.
        let notes = vec![
            NoteEvent::new(0, 60, 0.0, 0.2, 1.0),
            NoteEvent::new(1, 62, 0.2, 0.5, 1.0),
        ];
        assert_eq!(estimate_tempo(&notes), 120);
        assert_eq!(estimate_tempo(&[]), DEFAULT_TEMPO_BPM);
        assert_eq!(snap_tempo(10.0), 60);
        assert_eq!(snap_tempo(500.0), 200);
        assert_eq!(snap_tempo(95.0), 92);
        // Equidistant between 60 and 66 keeps the first.
        assert_eq!(snap_tempo(63.0), 60);
    }

    #[test]
    fn eighth_length() {
        assert_eq!(eighth_note_seconds(120), 0.25);
        assert_eq!(eighth_note_seconds(60), 0.5);
    }
}
