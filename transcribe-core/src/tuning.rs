//! # Musical Tuning Module
//!
//! Equal temperament conversions between frequencies and semitone numbers.
//! Semitone numbers follow the MIDI convention: 69 is A4 at 440 Hz and 60
//! is middle C.

use once_cell::sync::Lazy;

/// Reference frequency of A4 in Hz.
pub const A4_FREQUENCY: f32 = 440.0;
/// Semitone number of A4.
pub const A4_SEMITONE: i32 = 69;

const PITCH_CLASS_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Statically computed names for the full MIDI range (C-1 to G9).
///
/// Octaves change at C, so semitone 60 is "C4" and 59 is "B3".
static NOTE_NAMES: Lazy<Vec<String>> = Lazy::new(|| (0..128).map(format_name).collect());

fn format_name(semitone: i32) -> String {
    let pitch_class = semitone.rem_euclid(12) as usize;
    let octave = semitone.div_euclid(12) - 1;
    format!("{}{}", PITCH_CLASS_NAMES[pitch_class], octave)
}

/// Fractional semitone number of a frequency: `69 + 12 * log2(f / 440)`.
pub fn frequency_to_semitone_f(freq: f32) -> f32 {
    A4_SEMITONE as f32 + 12.0 * (freq / A4_FREQUENCY).log2()
}

/// Nearest semitone number of a frequency.
///
/// The caller must pass a positive frequency.
pub fn frequency_to_semitone(freq: f32) -> i32 {
    frequency_to_semitone_f(freq).round() as i32
}

/// Equal temperament frequency of a semitone number.
pub fn semitone_to_frequency(semitone: i32) -> f32 {
    A4_FREQUENCY * 2.0_f32.powf((semitone - A4_SEMITONE) as f32 / 12.0)
}

/// Name of a semitone number, e.g. "A4" or "C#3".
pub fn semitone_name(semitone: i32) -> String {
    match usize::try_from(semitone) {
        Ok(index) if index < NOTE_NAMES.len() => NOTE_NAMES[index].clone(),
        _ => format_name(semitone),
    }
}
