//! Note events to notation text.
//!
//! Notes are walked in start order. Each duration is quantized onto
//! [`QUANTIZATION_LADDER`] and laid into measures; a note that runs past the
//! bar line fills the measure, gets a tie and carries on in the next one.

use std::fmt::Write as _;

use crate::note::{self, NoteEvent};

use super::{
    key::{KeySignature, MeasureAccidentals, LETTERS},
    model::Accidental,
    quantize::{eighth_note_seconds, estimate_tempo, quantize_eighths, QUANTIZATION_LADDER},
    Meter, NotationOptions, DEFAULT_KEY,
};

/// Slack when comparing positions within a measure, in eighth notes.
const POSITION_TOLERANCE: f64 = 1e-3;
/// A gap longer than this many eighths before a note is written as a rest.
const REST_GAP_EIGHTHS: f64 = 0.3;
const BARS_PER_LINE: usize = 4;

/// One note as written, after transposition and quantization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderedNote {
    pub pitch: i32,
    /// Total written length across all tied fragments.
    pub eighths: f64,
}

/// Encoder output together with the layout decisions behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendering {
    pub text: String,
    pub tempo_bpm: u32,
    /// Same order as the notes sorted by start time.
    pub notes: Vec<RenderedNote>,
}

pub fn encode(notes: &[NoteEvent], options: &NotationOptions) -> String {
    render(notes, options).text
}

pub fn render(notes: &[NoteEvent], options: &NotationOptions) -> Rendering {
    let mut sorted = notes.to_vec();
    note::sort_by_start(&mut sorted);

    let tempo_bpm = match options.tempo_bpm.filter(|&bpm| bpm > 0) {
        Some(bpm) => bpm,
        None => {
            let estimated = estimate_tempo(&sorted);
            log::info!("no tempo given, estimated {estimated} BPM from {} notes", sorted.len());
            estimated
        }
    };

    let (key, key_text) = match KeySignature::parse(&options.key) {
        Some(key) => (key, options.key.trim().to_string()),
        None => {
            log::warn!("unknown key {:?}, writing {DEFAULT_KEY}", options.key);
            (KeySignature::default(), DEFAULT_KEY.to_string())
        }
    };

    let meter = if options.meter.is_sixteenth_aligned() {
        options.meter
    } else {
        log::warn!(
            "meter {} is not a whole number of sixteenths, using {}",
            options.meter,
            Meter::default()
        );
        Meter::default()
    };

    log::debug!(
        "encoding {} notes at {tempo_bpm} BPM in {meter}, key {key_text}",
        sorted.len()
    );

    let eighth = eighth_note_seconds(tempo_bpm);
    let mut body = BodyWriter::new(key, meter.measure_eighths());
    let mut rendered = Vec::with_capacity(sorted.len());
    let mut previous_end = 0.0;

    for note in &sorted {
        let gap = (note.start_time - previous_end) / eighth;
        if gap > REST_GAP_EIGHTHS {
            body.write(gap, None);
        }
        let pitch = note.pitch + options.transpose_semitones;
        let eighths = body.write(note.duration() / eighth, Some(pitch));
        rendered.push(RenderedNote { pitch, eighths });
        previous_end = note.end_time;
    }
    body.pad_measure(sorted.is_empty());

    let mut text = String::new();
    let _ = writeln!(text, "X:1");
    let _ = writeln!(text, "T:{}", options.title);
    let _ = writeln!(text, "M:{meter}");
    let _ = writeln!(text, "L:1/8");
    let _ = writeln!(text, "Q:1/4={tempo_bpm}");
    let _ = writeln!(text, "K:{key_text}");
    text.push_str(&body.finish());
    text.push('\n');

    Rendering {
        text,
        tempo_bpm,
        notes: rendered,
    }
}

/// Writes the tune body one note or rest at a time.
struct BodyWriter {
    key: KeySignature,
    measure_eighths: f64,
    /// Eighths already filled in the current measure.
    position: f64,
    bars: usize,
    accidentals: MeasureAccidentals,
    out: String,
}

impl BodyWriter {
    fn new(key: KeySignature, measure_eighths: f64) -> Self {
        Self {
            key,
            measure_eighths,
            position: 0.0,
            bars: 0,
            accidentals: MeasureAccidentals::default(),
            out: String::new(),
        }
    }

    /// Writes a note (`Some(pitch)`) or a rest lasting `eighths`, splitting it
    /// at bar lines. Returns the written length.
    fn write(&mut self, eighths: f64, pitch: Option<i32>) -> f64 {
        let space = self.measure_eighths - self.position;
        let measures = layout(eighths, space, self.measure_eighths);
        let count: usize = measures.iter().map(Vec::len).sum();
        let mut written = 0.0;
        let mut index = 0;
        for parts in measures {
            for part in parts {
                index += 1;
                // Notes tie into every following fragment, rests just stop.
                self.token(pitch, part, pitch.is_some() && index < count);
                written += part;
                self.advance(part);
            }
        }
        written
    }

    /// Closes the last measure with rests. An empty tune gets one full
    /// measure of rest.
    fn pad_measure(&mut self, empty: bool) {
        if self.position > POSITION_TOLERANCE || empty {
            for part in fill(self.measure_eighths - self.position) {
                self.token(None, part, false);
            }
            self.bar();
        }
    }

    fn advance(&mut self, eighths: f64) {
        self.position += eighths;
        if self.position >= self.measure_eighths - POSITION_TOLERANCE {
            self.bar();
        }
    }

    fn bar(&mut self) {
        self.bars += 1;
        self.position = 0.0;
        self.accidentals.clear();
        self.out
            .push_str(if self.bars % BARS_PER_LINE == 0 { "|\n" } else { "| " });
    }

    fn token(&mut self, pitch: Option<i32>, eighths: f64, tie: bool) {
        match pitch {
            Some(pitch) => {
                let spelled = self.key.spell(pitch);
                let position = spelled.staff_position();
                if spelled.alteration != self.accidentals.effective(&self.key, position) {
                    if let Some(accidental) = Accidental::from_alteration(spelled.alteration) {
                        self.out.push_str(accidental.symbol());
                    }
                    self.accidentals.record(position, spelled.alteration);
                }
                let letter = LETTERS[spelled.letter];
                if spelled.octave >= 5 {
                    self.out.push(letter.to_ascii_lowercase());
                    for _ in 5..spelled.octave {
                        self.out.push('\'');
                    }
                } else {
                    self.out.push(letter);
                    for _ in spelled.octave..4 {
                        self.out.push(',');
                    }
                }
            }
            None => self.out.push('z'),
        }
        self.out.push_str(&duration_text(eighths));
        if tie {
            self.out.push('-');
        }
        self.out.push(' ');
    }

    fn finish(self) -> String {
        let mut body = self.out.trim_end().to_string();
        if body.ends_with('|') {
            body.push(']');
        } else {
            body.push_str(" |]");
        }
        body
    }
}

/// Lays `eighths` out from a position with `space` eighths left in the
/// measure. Returns the written parts grouped by measure.
///
/// A duration whose ladder value does not fit fills the measure and carries
/// the rest over. The written total is itself checked against the ladder:
/// if it would not cross the bar when quantized, the duration is written as
/// that single value. Encoding the written total again therefore gives the
/// same layout.
fn layout(eighths: f64, space: f64, measure: f64) -> Vec<Vec<f64>> {
    let mut crossed = Vec::new();
    let mut left = eighths;
    let mut space = space;
    let mut tail = loop {
        let quantized = quantize_eighths(left);
        if quantized <= space + POSITION_TOLERANCE {
            break vec![vec![quantized]];
        }
        crossed.push(space);
        left -= space;
        if left <= POSITION_TOLERANCE {
            break Vec::new();
        }
        space = measure;
    };

    let mut tail_total: f64 = tail.iter().flatten().sum();
    for &space in crossed.iter().rev() {
        let total = space + tail_total;
        let quantized = quantize_eighths(total);
        if quantized > space + POSITION_TOLERANCE {
            tail.insert(0, fill(space));
            tail_total = total;
        } else {
            tail = vec![vec![quantized]];
            tail_total = quantized;
        }
    }
    tail
}

/// Splits `eighths` into ladder values, longest first.
fn fill(eighths: f64) -> Vec<f64> {
    let mut parts = Vec::new();
    let mut left = eighths;
    while left > POSITION_TOLERANCE {
        match QUANTIZATION_LADDER
            .iter()
            .rev()
            .find(|&&rung| rung <= left + POSITION_TOLERANCE)
        {
            Some(&rung) => {
                parts.push(rung);
                left -= rung;
            }
            None => break,
        }
    }
    parts
}

/// Length suffix for a ladder value under `L:1/8`.
fn duration_text(eighths: f64) -> String {
    let halves = (eighths * 2.0).round() as u32;
    match halves {
        2 => String::new(),
        1 => "/2".to_string(),
        h if h % 2 == 0 => (h / 2).to_string(),
        h => format!("{h}/2"),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn options(tempo: u32, key: &str) -> NotationOptions {
        NotationOptions {
            title: "Test".to_string(),
            tempo_bpm: Some(tempo),
            key: key.to_string(),
            ..NotationOptions::default()
        }
    }

    fn note(pitch: i32, start: f64, end: f64) -> NoteEvent {
        NoteEvent::new(0, pitch, start, end, 1.0)
    }

    fn body(text: &str) -> String {
        text.lines().skip(6).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn header_layout() {
        let text = encode(&[note(60, 0.0, 0.5)], &options(120, "G"));
        assert_eq!(
            text,
            "X:1\nT:Test\nM:4/4\nL:1/8\nQ:1/4=120\nK:G\nC2 z6 |]\n"
        );
    }

    #[test]
    fn quarter_note_then_rest_fills_measure() {
        let text = encode(&[note(60, 0.0, 0.5)], &options(120, "C"));
        assert_eq!(body(&text), "C2 z6 |]");
    }

    #[test]
    fn long_note_ties_across_measures() {
        let text = encode(&[note(60, 0.0, 6.0)], &options(120, "C"));
        assert_eq!(body(&text), "C8- | C8- | C8 |]");
    }

    #[test]
    fn empty_tune_is_one_measure_of_rest() {
        let text = encode(&[], &options(120, "C"));
        assert_eq!(body(&text), "z8 |]");

        let five_four = NotationOptions {
            meter: Meter::new(5, 4),
            ..options(120, "C")
        };
        assert_eq!(body(&encode(&[], &five_four)), "z8 z2 |]");
    }

    #[test]
    fn gaps_become_rests() {
        let notes = [note(64, 0.5, 0.75), note(67, 0.75, 1.0), note(72, 1.5, 2.0)];
        let text = encode(&notes, &options(120, "C"));
        assert_eq!(body(&text), "z2 E G z2 c2 |]");
    }

    #[test]
    fn small_gaps_are_ignored() {
        // 0.05 s is 0.2 eighths at 120 BPM.
        let notes = [note(60, 0.0, 0.25), note(62, 0.3, 0.55)];
        let rendering = render(&notes, &options(120, "C"));
        assert_eq!(body(&rendering.text), "C D z6 |]");
    }

    #[test]
    fn partial_measure_is_filled_before_the_tie() {
        // Dotted quarter in, then a note of six eighths.
        let notes = [note(60, 0.0, 0.75), note(62, 0.75, 2.25)];
        let rendering = render(&notes, &options(120, "C"));
        assert_eq!(body(&rendering.text), "C3 D4- D- | D z6 z |]");
        assert_eq!(
            rendering.notes,
            vec![
                RenderedNote { pitch: 60, eighths: 3.0 },
                RenderedNote { pitch: 62, eighths: 6.0 },
            ]
        );
    }

    #[test]
    fn crossing_that_quantizes_back_inside_the_bar_is_not_split() {
        // 2.6 eighths with 2 left in the bar would be written as 2 + 1/2,
        // and 2.5 quantizes to 2. Writing a plain quarter keeps it stable.
        let notes = [note(60, 0.0, 1.5), note(62, 1.5, 2.15)];
        let rendering = render(&notes, &options(120, "C"));
        assert_eq!(body(&rendering.text), "C6 D2 |]");
        assert_eq!(rendering.notes[1].eighths, 2.0);
    }

    #[test]
    fn layout_keeps_written_totals_on_the_ladder() {
        assert_eq!(layout(24.0, 8.0, 8.0), vec![vec![8.0], vec![8.0], vec![8.0]]);
        assert_eq!(layout(2.6, 2.0, 8.0), vec![vec![2.0]]);
        assert_eq!(layout(5.1, 5.0, 8.0), vec![vec![4.0, 1.0], vec![0.5]]);
        assert_eq!(layout(6.0, 1.0, 8.0), vec![vec![1.0], vec![4.0]]);

        for (eighths, space) in [(24.0, 8.0), (2.6, 2.0), (5.1, 5.0), (6.0, 1.0), (9.7, 3.5)] {
            let first = layout(eighths, space, 8.0);
            let total: f64 = first.iter().flatten().sum();
            assert_eq!(layout(total, space, 8.0), first, "{eighths} from {space}");
        }
    }

    #[test]
    fn unaligned_meter_falls_back_to_common_time() {
        let odd = NotationOptions {
            meter: Meter::new(7, 32),
            ..options(120, "C")
        };
        let text = encode(&[note(60, 0.0, 0.5)], &odd);
        assert!(text.contains("\nM:4/4\n"));
        assert_eq!(body(&text), "C2 z6 |]");
    }

    #[test]
    fn rests_across_bars_carry_no_tie() {
        let notes = [note(60, 0.0, 1.5), note(62, 3.0, 3.5)];
        let text = encode(&notes, &options(120, "C"));
        assert_eq!(body(&text), "C6 z2 | z4 D2 z2 |]");
    }

    #[test]
    fn octaves_and_accidentals() {
        let notes = [
            note(48, 0.0, 0.25),
            note(61, 0.25, 0.5),
            note(61, 0.5, 0.75),
            note(60, 0.75, 1.0),
            note(74, 1.0, 1.25),
            note(86, 1.25, 1.5),
            note(47, 1.5, 1.75),
            note(66, 1.75, 2.0),
        ];
        let text = encode(&notes, &options(120, "C"));
        assert_eq!(body(&text), "C, ^C C =C d d' B,, ^F |]");
    }

    #[test]
    fn key_signature_spelling() {
        let notes = [
            note(66, 0.0, 0.25),
            note(65, 0.25, 0.5),
            note(70, 0.5, 0.75),
            note(63, 0.75, 1.0),
        ];
        let g = encode(&notes, &options(120, "G"));
        assert_eq!(body(&g), "F =F ^A ^D z4 |]");
        let f = encode(&notes, &options(120, "F"));
        assert_eq!(body(&f), "_G F B _E z4 |]");
    }

    #[test]
    fn accidentals_reset_at_bar_lines() {
        let notes = [note(61, 0.0, 2.0), note(61, 2.0, 2.5)];
        let text = encode(&notes, &options(120, "C"));
        assert_eq!(body(&text), "^C8 | ^C2 z6 |]");
    }

    #[test]
    fn line_break_every_four_bars() {
        let notes: Vec<_> = (0..5)
            .map(|i| note(60, i as f64 * 2.0, (i + 1) as f64 * 2.0))
            .collect();
        let text = encode(&notes, &options(120, "C"));
        assert_eq!(body(&text), "C8 | C8 | C8 | C8 |\nC8 |]");
    }

    #[test]
    fn transposition_and_fallbacks() {
        let transposed = NotationOptions {
            transpose_semitones: 2,
            ..options(120, "C")
        };
        let rendering = render(&[note(60, 0.0, 0.5)], &transposed);
        assert_eq!(body(&rendering.text), "D2 z6 |]");
        assert_eq!(rendering.notes[0].pitch, 62);

        let unknown_key = encode(&[note(60, 0.0, 0.5)], &options(120, "H#"));
        assert!(unknown_key.contains("\nK:C\n"));

        let estimated = render(
            &[note(60, 0.0, 0.5), note(62, 0.5, 1.0)],
            &NotationOptions::default(),
        );
        assert_eq!(estimated.tempo_bpm, 60);
        assert!(estimated.text.contains("Q:1/4=60"));
    }

    #[test]
    fn duration_suffixes() {
        let suffixes: Vec<_> = QUANTIZATION_LADDER.iter().map(|&d| duration_text(d)).collect();
        assert_eq!(
            suffixes,
            vec!["/2", "", "3/2", "2", "3", "4", "6", "8", "12", "16"]
        );
        assert_eq!(fill(5.0), vec![4.0, 1.0]);
        assert_eq!(fill(7.5), vec![6.0, 1.5]);
    }
}
