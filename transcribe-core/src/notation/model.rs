//! Notation object model.
//!
//! A parsed document is a tree of lines, staves and voices whose leaves are
//! a closed set of [`Element`]s. Durations are fractions of a whole note.

use super::Meter;

/// Explicit accidental written in front of a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accidental {
    DoubleFlat,
    Flat,
    Natural,
    Sharp,
    DoubleSharp,
}

impl Accidental {
    pub fn from_alteration(alteration: i32) -> Option<Self> {
        match alteration {
            -2 => Some(Self::DoubleFlat),
            -1 => Some(Self::Flat),
            0 => Some(Self::Natural),
            1 => Some(Self::Sharp),
            2 => Some(Self::DoubleSharp),
            _ => None,
        }
    }

    /// Semitone offset from the natural letter.
    pub fn alteration(self) -> i32 {
        match self {
            Self::DoubleFlat => -2,
            Self::Flat => -1,
            Self::Natural => 0,
            Self::Sharp => 1,
            Self::DoubleSharp => 2,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::DoubleFlat => "__",
            Self::Flat => "_",
            Self::Natural => "=",
            Self::Sharp => "^",
            Self::DoubleSharp => "^^",
        }
    }
}

/// A written pitch: a diatonic staff position (0 is middle C) and an
/// optional explicit accidental.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaffPitch {
    pub position: i32,
    pub accidental: Option<Accidental>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// One pitch, or several sounding together for a chord.
    Note {
        pitches: Vec<StaffPitch>,
        duration: f64,
        /// Tied into the next note of the same pitch.
        tie: bool,
    },
    Rest {
        duration: f64,
    },
    Bar,
}

impl Element {
    /// Duration as a fraction of a whole note; zero for bars.
    pub fn duration(&self) -> f64 {
        match self {
            Element::Note { duration, .. } | Element::Rest { duration } => *duration,
            Element::Bar => 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Voice {
    pub elements: Vec<Element>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Staff {
    pub voices: Vec<Voice>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Line {
    pub staves: Vec<Staff>,
}

/// Document-level fields. Anything the document leaves out is `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    pub index: Option<u32>,
    pub title: Option<String>,
    pub meter: Option<Meter>,
    /// Quarter notes per minute.
    pub tempo_bpm: Option<u32>,
    pub key: Option<String>,
    /// Unit note length as a fraction of a whole note.
    pub unit_length: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub header: Header,
    pub lines: Vec<Line>,
}

impl Document {
    /// Every element in document order, tagged with its staff and voice index.
    pub fn elements(&self) -> impl Iterator<Item = (usize, usize, &Element)> {
        self.lines.iter().flat_map(|line| {
            line.staves.iter().enumerate().flat_map(|(staff, s)| {
                s.voices.iter().enumerate().flat_map(move |(voice, v)| {
                    v.elements.iter().map(move |element| (staff, voice, element))
                })
            })
        })
    }

    /// True when the document carries any of the index, title or key fields.
    pub fn has_structural_markers(&self) -> bool {
        self.header.index.is_some() || self.header.title.is_some() || self.header.key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accidentals_map_to_offsets() {
        for alteration in -2..=2 {
            let accidental = Accidental::from_alteration(alteration).unwrap();
            assert_eq!(accidental.alteration(), alteration);
        }
        assert_eq!(Accidental::from_alteration(3), None);
        assert_eq!(Accidental::Sharp.symbol(), "^");
        assert_eq!(Accidental::DoubleFlat.symbol(), "__");
    }

    #[test]
    fn elements_walk_in_document_order() {
        let note = |position| Element::Note {
            pitches: vec![StaffPitch {
                position,
                accidental: None,
            }],
            duration: 0.125,
            tie: false,
        };
        let document = Document {
            header: Header::default(),
            lines: vec![
                Line {
                    staves: vec![Staff {
                        voices: vec![
                            Voice {
                                elements: vec![note(0), Element::Bar],
                            },
                            Voice {
                                elements: vec![note(2)],
                            },
                        ],
                    }],
                },
                Line {
                    staves: vec![Staff {
                        voices: vec![Voice {
                            elements: vec![Element::Rest { duration: 0.5 }],
                        }],
                    }],
                },
            ],
        };
        let walked: Vec<_> = document.elements().map(|(s, v, e)| (s, v, e.duration())).collect();
        assert_eq!(
            walked,
            vec![(0, 0, 0.125), (0, 0, 0.0), (0, 1, 0.125), (0, 0, 0.5)]
        );
        assert!(!document.has_structural_markers());
    }
}
