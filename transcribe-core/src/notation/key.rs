//! Key signatures, pitch spelling and measure accidentals.
//!
//! Staff positions count diatonic steps from middle C: position 0 is the
//! written `C` (semitone 60), 7 is `c`, -7 is `C,`.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Semitone of staff position 0.
pub const REFERENCE_SEMITONE: i32 = 60;
pub const LETTERS: [char; 7] = ['C', 'D', 'E', 'F', 'G', 'A', 'B'];
/// Semitone offset of each letter above C.
pub const DIATONIC_SEMITONES: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

/// Place of each letter on the circle of fifths, counted from C.
const LETTER_FIFTHS: [i32; 7] = [0, 2, 4, -1, 1, 3, 5];
/// Letters in the order sharps enter a key signature: F C G D A E B.
const SHARP_ORDER: [usize; 7] = [3, 0, 4, 1, 5, 2, 6];
/// Letters in the order flats enter a key signature: B E A D G C F.
const FLAT_ORDER: [usize; 7] = [6, 2, 5, 1, 4, 0, 3];

/// `(letter, alteration)` for every pitch class, spelled with sharps.
const SHARP_SPELLING: [(usize, i32); 12] = [
    (0, 0), (0, 1), (1, 0), (1, 1), (2, 0), (3, 0),
    (3, 1), (4, 0), (4, 1), (5, 0), (5, 1), (6, 0),
];
/// `(letter, alteration)` for every pitch class, spelled with flats.
const FLAT_SPELLING: [(usize, i32); 12] = [
    (0, 0), (1, -1), (1, 0), (2, -1), (2, 0), (3, 0),
    (4, -1), (4, 0), (5, -1), (5, 0), (6, -1), (6, 0),
];

/// Mode names (first three letters) and their shift on the circle of
/// fifths relative to the major mode on the same tonic.
static MODES: Lazy<HashMap<&'static str, i32>> = Lazy::new(|| {
    HashMap::from([
        ("", 0),
        ("maj", 0),
        ("ion", 0),
        ("m", -3),
        ("min", -3),
        ("aeo", -3),
        ("mix", -1),
        ("dor", -2),
        ("phr", -4),
        ("lyd", 1),
        ("loc", -5),
    ])
});

/// A key signature as a count of sharps (positive) or flats (negative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeySignature {
    fifths: i32,
}

/// A semitone written as a letter, an alteration and an octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpelledPitch {
    /// Index into [`LETTERS`].
    pub letter: usize,
    /// -2..=2 semitones.
    pub alteration: i32,
    /// Scientific octave of the letter, 4 for middle C.
    pub octave: i32,
}

impl SpelledPitch {
    pub fn staff_position(&self) -> i32 {
        (self.octave - 4) * 7 + self.letter as i32
    }

    pub fn semitone(&self) -> i32 {
        12 * (self.octave + 1) + DIATONIC_SEMITONES[self.letter] + self.alteration
    }
}

impl KeySignature {
    pub fn from_fifths(fifths: i32) -> Option<Self> {
        (-7..=7).contains(&fifths).then_some(Self { fifths })
    }

    /// Parses a key field such as `G`, `Bb`, `F#m`, `Ador` or `D mixolydian`.
    ///
    /// Anything after the mode (for example `clef=bass`) is ignored. An empty
    /// field or `none` means C major.
    pub fn parse(key: &str) -> Option<Self> {
        let key = key.trim();
        if key.is_empty() || key.eq_ignore_ascii_case("none") {
            return Some(Self::default());
        }

        let mut chars = key.chars().peekable();
        let tonic = chars.next()?.to_ascii_uppercase();
        let letter = LETTERS.iter().position(|&l| l == tonic)?;
        let accidental = match chars.peek() {
            Some('#') => 1,
            Some('b') => -1,
            _ => 0,
        };
        if accidental != 0 {
            chars.next();
        }

        let rest: String = chars.collect();
        let first_token = rest.split_whitespace().next().unwrap_or("");
        // `clef=...` and friends carry no mode.
        let word: String = if first_token.contains('=') {
            String::new()
        } else {
            first_token
                .chars()
                .take_while(|c| c.is_ascii_alphabetic())
                .collect::<String>()
                .to_ascii_lowercase()
        };
        let mode = if word.len() >= 3 { &word[..3] } else { word.as_str() };
        let shift = MODES.get(mode)?;

        Self::from_fifths(LETTER_FIFTHS[letter] + 7 * accidental + shift)
    }

    pub fn fifths(&self) -> i32 {
        self.fifths
    }

    /// Alteration the signature applies to `letter`.
    pub fn alteration(&self, letter: usize) -> i32 {
        let count = self.fifths.unsigned_abs() as usize;
        if self.fifths > 0 && SHARP_ORDER[..count].contains(&letter) {
            1
        } else if self.fifths < 0 && FLAT_ORDER[..count].contains(&letter) {
            -1
        } else {
            0
        }
    }

    /// Spells a semitone in this key.
    ///
    /// Pitches that belong to the scale use the signature's letters. Others
    /// are written as naturals or, for black keys, with flats in flat keys
    /// and sharps everywhere else.
    pub fn spell(&self, semitone: i32) -> SpelledPitch {
        let pitch_class = semitone.rem_euclid(12);
        let (letter, alteration) = (0..LETTERS.len())
            .map(|letter| (letter, self.alteration(letter)))
            .find(|&(letter, alteration)| {
                (DIATONIC_SEMITONES[letter] + alteration).rem_euclid(12) == pitch_class
            })
            .unwrap_or(if self.fifths < 0 {
                FLAT_SPELLING[pitch_class as usize]
            } else {
                SHARP_SPELLING[pitch_class as usize]
            });
        let octave = (semitone - DIATONIC_SEMITONES[letter] - alteration).div_euclid(12) - 1;
        SpelledPitch {
            letter,
            alteration,
            octave,
        }
    }
}

/// Semitone of a staff position played with `alteration`.
pub fn staff_position_to_semitone(position: i32, alteration: i32) -> i32 {
    let octave_offset = position.div_euclid(7);
    let diatonic_index = position.rem_euclid(7) as usize;
    REFERENCE_SEMITONE + 12 * octave_offset + DIATONIC_SEMITONES[diatonic_index] + alteration
}

/// Accidentals written so far in the current measure, by staff position.
///
/// An explicit accidental holds for the same letter and octave until the
/// next bar line; everything else follows the key signature.
#[derive(Debug, Clone, Default)]
pub struct MeasureAccidentals {
    written: HashMap<i32, i32>,
}

impl MeasureAccidentals {
    pub fn clear(&mut self) {
        self.written.clear();
    }

    pub fn effective(&self, key: &KeySignature, position: i32) -> i32 {
        self.written
            .get(&position)
            .copied()
            .unwrap_or_else(|| key.alteration(position.rem_euclid(7) as usize))
    }

    pub fn record(&mut self, position: i32, alteration: i32) {
        self.written.insert(position, alteration);
    }
}
