//! Reader for ABC-style notation text.
//!
//! Produces the [`Document`] tree the decoder walks. The reader is lenient
//! about things that carry no timing (annotations, decorations, slurs, grace
//! notes, unknown fields) and strict about note syntax.

use crate::error::ParseError;

use super::{
    key::LETTERS,
    model::{Accidental, Document, Element, Header, Line, Staff, StaffPitch, Voice},
    Meter,
};

/// Reads a notation document. Only the first tune of a multi-tune file is read.
pub fn parse_document(text: &str) -> Result<Document, ParseError> {
    let mut reader = Reader::new();
    let mut in_header = true;

    for (index, raw) in text.lines().enumerate() {
        let number = index + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        if in_header {
            if let Some((letter, value)) = field(line) {
                reader.header_field(letter, value)?;
                if letter == 'K' {
                    in_header = false;
                    reader.start_body();
                }
                continue;
            }
            in_header = false;
            reader.start_body();
        }

        match field(line) {
            Some(('X', _)) => break,
            Some((letter, value)) => reader.body_field(letter, value, number)?,
            None => reader.music_line(line, number)?,
        }
    }

    Ok(reader.finish())
}

fn strip_comment(line: &str) -> &str {
    line.split('%').next().unwrap_or("")
}

/// Splits `K:G` style lines into their letter and value.
fn field(line: &str) -> Option<(char, &str)> {
    let mut chars = line.chars();
    let letter = chars.next()?;
    if letter.is_ascii_alphabetic() && chars.next() == Some(':') {
        Some((letter, line[2..].trim()))
    } else {
        None
    }
}

fn invalid(field: char, value: &str) -> ParseError {
    ParseError::InvalidField {
        field,
        value: value.to_string(),
    }
}

fn malformed(line: usize, message: impl std::fmt::Display) -> ParseError {
    ParseError::MalformedDocument(format!("line {line}: {message}"))
}

/// Parses `1/8` or `1` into a positive fraction.
fn parse_fraction(text: &str) -> Option<f64> {
    let text = text.trim();
    let (numerator, denominator) = match text.split_once('/') {
        Some((n, d)) => (n.trim().parse::<u32>().ok()?, d.trim().parse::<u32>().ok()?),
        None => (text.parse::<u32>().ok()?, 1),
    };
    (numerator > 0 && denominator > 0).then(|| numerator as f64 / denominator as f64)
}

/// Parses a tempo field into quarter notes per minute.
///
/// Accepts `120`, `1/4=120`, `3/8=40` and `"Allegro" 1/4=120`.
fn parse_tempo(value: &str) -> Option<u32> {
    let mut plain = String::new();
    let mut quoted = false;
    for c in value.chars() {
        if c == '"' {
            quoted = !quoted;
        } else if !quoted {
            plain.push(c);
        }
    }
    let plain = plain.trim();

    let bpm = match plain.split_once('=') {
        Some((beats, rate)) => {
            let beat: f64 = beats.split_whitespace().map(parse_fraction).sum::<Option<f64>>()?;
            let rate: f64 = rate.trim().parse().ok()?;
            rate * beat / 0.25
        }
        None => plain.parse::<f64>().ok()?,
    };
    (bpm.is_finite() && bpm >= 1.0).then(|| bpm.round() as u32)
}

/// Notes a tuplet still applies to, and the factor it scales them by.
struct Tuplet {
    factor: f64,
    remaining: usize,
}

struct Reader {
    header: Header,
    lines: Vec<Line>,
    meter: Meter,
    unit_length: f64,
    /// Voice ids in order of first appearance; the index is the staff.
    voices: Vec<String>,
    voice: usize,
    /// Duration factor a broken rhythm left for the next note.
    broken: Option<f64>,
    tuplet: Option<Tuplet>,
}

impl Reader {
    fn new() -> Self {
        Self {
            header: Header::default(),
            lines: Vec::new(),
            meter: Meter::default(),
            unit_length: 0.125,
            voices: Vec::new(),
            voice: 0,
            broken: None,
            tuplet: None,
        }
    }

    fn finish(self) -> Document {
        Document {
            header: self.header,
            lines: self.lines,
        }
    }

    fn header_field(&mut self, letter: char, value: &str) -> Result<(), ParseError> {
        match letter {
            'X' => {
                let index = value.parse().map_err(|_| invalid('X', value))?;
                self.header.index = Some(index);
            }
            'T' => {
                if self.header.title.is_none() {
                    self.header.title = Some(value.to_string());
                }
            }
            'M' => {
                self.header.meter = if value.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(value.parse()?)
                };
            }
            'L' => {
                let unit_length = parse_fraction(value).ok_or_else(|| invalid('L', value))?;
                self.header.unit_length = Some(unit_length);
            }
            'Q' => {
                let tempo_bpm = parse_tempo(value).ok_or_else(|| invalid('Q', value))?;
                self.header.tempo_bpm = Some(tempo_bpm);
            }
            'K' => self.header.key = Some(value.to_string()),
            'V' => {
                self.voice_index(value);
            }
            _ => {}
        }
        Ok(())
    }

    fn start_body(&mut self) {
        self.meter = self.header.meter.unwrap_or_default();
        let default_unit = if self.meter.measure_fraction() < 0.75 {
            1.0 / 16.0
        } else {
            1.0 / 8.0
        };
        self.unit_length = self.header.unit_length.unwrap_or(default_unit);
    }

    fn body_field(&mut self, letter: char, value: &str, number: usize) -> Result<(), ParseError> {
        match letter {
            'V' => self.voice = self.voice_index(value),
            'L' => {
                self.unit_length = parse_fraction(value).ok_or_else(|| invalid('L', value))?;
            }
            'K' | 'M' | 'Q' => {
                log::debug!("ignoring {letter}:{value} change on line {number}");
            }
            _ => {}
        }
        Ok(())
    }

    fn voice_index(&mut self, value: &str) -> usize {
        let id = value.split_whitespace().next().unwrap_or("");
        match self.voices.iter().position(|v| v == id) {
            Some(index) => index,
            None => {
                self.voices.push(id.to_string());
                self.voices.len() - 1
            }
        }
    }

    fn music_line(&mut self, text: &str, number: usize) -> Result<(), ParseError> {
        if self.voices.is_empty() {
            self.voices.push(String::new());
        }

        let mut line = Line::default();
        let mut cursor = Cursor::new(text);

        while let Some(c) = cursor.peek() {
            match c {
                ' ' | '\t' | '`' | 'y' | '\\' | ')' | '.' | '~' => {
                    cursor.bump();
                }
                // Decoration shorthands.
                'H' | 'L' | 'M' | 'O' | 'P' | 'S' | 'T' | 'u' | 'v' => {
                    cursor.bump();
                }
                '"' | '!' | '+' => {
                    cursor.bump();
                    if !cursor.skip_past(c) {
                        return Err(malformed(number, format!("unterminated {c}...{c}")));
                    }
                }
                '{' => {
                    cursor.bump();
                    if !cursor.skip_past('}') {
                        return Err(malformed(number, "unterminated grace notes"));
                    }
                }
                '(' => {
                    cursor.bump();
                    if cursor.peek().is_some_and(|d| d.is_ascii_digit()) {
                        self.tuplet(&mut cursor, number)?;
                    }
                }
                '-' => {
                    cursor.bump();
                    if let Some(Element::Note { tie, .. }) = self.last_element(&mut line) {
                        *tie = true;
                    }
                }
                '>' | '<' => {
                    let mut count = 0;
                    while cursor.eat(c) {
                        count += 1;
                    }
                    self.broken_rhythm(&mut line, c == '>', count);
                }
                '|' | ':' => self.bar(&mut cursor, &mut line),
                '[' => match cursor.peek_at(1) {
                    Some('|') => self.bar(&mut cursor, &mut line),
                    Some(d) if d.is_ascii_digit() => {
                        cursor.bump();
                        skip_ending(&mut cursor);
                    }
                    Some(l) if l.is_ascii_alphabetic() && cursor.peek_at(2) == Some(':') => {
                        self.inline_field(&mut cursor, number)?;
                    }
                    _ => self.chord(&mut cursor, &mut line, number)?,
                },
                'z' | 'x' => {
                    cursor.bump();
                    let multiplier = length(&mut cursor)
                        .ok_or_else(|| malformed(number, "zero length rest"))?;
                    let duration = self.scaled(multiplier);
                    self.push(&mut line, Element::Rest { duration });
                }
                'Z' | 'X' => {
                    cursor.bump();
                    let measures = cursor.number().unwrap_or(1);
                    if measures > 0 {
                        let duration = measures as f64 * self.meter.measure_fraction();
                        self.push(&mut line, Element::Rest { duration });
                    }
                }
                '^' | '_' | '=' | 'A'..='G' | 'a'..='g' => {
                    let pitch = staff_pitch(&mut cursor, number)?;
                    let multiplier = length(&mut cursor)
                        .ok_or_else(|| malformed(number, "zero length note"))?;
                    let duration = self.scaled(multiplier);
                    self.push(
                        &mut line,
                        Element::Note {
                            pitches: vec![pitch],
                            duration,
                            tie: false,
                        },
                    );
                }
                other => return Err(malformed(number, format!("unexpected character '{other}'"))),
            }
        }

        if line.staves.iter().any(|s| s.voices.iter().any(|v| !v.elements.is_empty())) {
            self.lines.push(line);
        }
        Ok(())
    }

    fn push(&self, line: &mut Line, element: Element) {
        while line.staves.len() <= self.voice {
            line.staves.push(Staff {
                voices: vec![Voice::default()],
            });
        }
        line.staves[self.voice].voices[0].elements.push(element);
    }

    fn last_element<'l>(&self, line: &'l mut Line) -> Option<&'l mut Element> {
        line.staves
            .get_mut(self.voice)?
            .voices
            .first_mut()?
            .elements
            .last_mut()
    }

    /// Applies any pending broken rhythm and tuplet to a note length.
    fn scaled(&mut self, multiplier: f64) -> f64 {
        let mut duration = self.unit_length * multiplier;
        if let Some(factor) = self.broken.take() {
            duration *= factor;
        }
        if let Some(tuplet) = &mut self.tuplet {
            duration *= tuplet.factor;
            tuplet.remaining -= 1;
            if tuplet.remaining == 0 {
                self.tuplet = None;
            }
        }
        duration
    }

    fn broken_rhythm(&mut self, line: &mut Line, dotted_first: bool, count: i32) {
        let short = 0.5f64.powi(count);
        let long = 2.0 - short;
        let (previous, next) = if dotted_first { (long, short) } else { (short, long) };
        match self.last_element(line) {
            Some(Element::Note { duration, .. } | Element::Rest { duration }) => {
                *duration *= previous;
                self.broken = Some(next);
            }
            _ => {}
        }
    }

    /// Reads `(p`, `(p:q` or `(p:q:r` after the opening parenthesis.
    fn tuplet(&mut self, cursor: &mut Cursor, number: usize) -> Result<(), ParseError> {
        let notes = cursor.number().unwrap_or(0);
        if notes == 0 {
            return Err(malformed(number, "empty tuplet"));
        }
        let mut time = None;
        let mut count = None;
        if cursor.eat(':') {
            time = cursor.number();
            if cursor.eat(':') {
                count = cursor.number();
            }
        }
        let compound = self.meter.beats_per_measure % 3 == 0 && self.meter.beats_per_measure > 3;
        let time = time.unwrap_or(match notes {
            2 | 4 | 8 => 3,
            3 | 6 => 2,
            _ if compound => 3,
            _ => 2,
        });
        self.tuplet = Some(Tuplet {
            factor: time as f64 / notes as f64,
            remaining: count.unwrap_or(notes).max(1) as usize,
        });
        Ok(())
    }

    fn bar(&mut self, cursor: &mut Cursor, line: &mut Line) {
        cursor.eat('[');
        while matches!(cursor.peek(), Some('|' | ':' | ']')) {
            cursor.bump();
        }
        skip_ending(cursor);
        self.push(line, Element::Bar);
    }

    fn inline_field(&mut self, cursor: &mut Cursor, number: usize) -> Result<(), ParseError> {
        cursor.bump();
        let letter = cursor.bump().unwrap_or(' ');
        cursor.bump();
        let mut value = String::new();
        loop {
            match cursor.bump() {
                Some(']') => break,
                Some(c) => value.push(c),
                None => return Err(malformed(number, "unterminated inline field")),
            }
        }
        self.body_field(letter, value.trim(), number)
    }

    fn chord(
        &mut self,
        cursor: &mut Cursor,
        line: &mut Line,
        number: usize,
    ) -> Result<(), ParseError> {
        cursor.bump();
        let mut pitches = Vec::new();
        let mut first_length = None;
        let mut tie = false;
        loop {
            match cursor.peek() {
                None => return Err(malformed(number, "unterminated chord")),
                Some(']') => {
                    cursor.bump();
                    break;
                }
                Some(' ' | '.' | '~') => {
                    cursor.bump();
                }
                Some('-') => {
                    cursor.bump();
                    tie = true;
                }
                Some(c @ ('"' | '!')) => {
                    cursor.bump();
                    if !cursor.skip_past(c) {
                        return Err(malformed(number, "unterminated chord"));
                    }
                }
                Some(_) => {
                    pitches.push(staff_pitch(cursor, number)?);
                    let multiplier =
                        length(cursor).ok_or_else(|| malformed(number, "zero length note"))?;
                    if first_length.is_none() {
                        first_length = Some(multiplier);
                    }
                }
            }
        }
        let outer = length(cursor).ok_or_else(|| malformed(number, "zero length chord"))?;
        if pitches.is_empty() {
            return Ok(());
        }
        let duration = self.scaled(first_length.unwrap_or(1.0) * outer);
        self.push(line, Element::Note { pitches, duration, tie });
        Ok(())
    }
}

/// Skips variant ending numbers such as `1`, `1,2` or `1-3`.
fn skip_ending(cursor: &mut Cursor) {
    if cursor.peek().is_some_and(|c| c.is_ascii_digit()) {
        while matches!(cursor.peek(), Some('0'..='9' | ',' | '-')) {
            cursor.bump();
        }
    }
}

fn staff_pitch(cursor: &mut Cursor, number: usize) -> Result<StaffPitch, ParseError> {
    let accidental = match cursor.peek() {
        Some('^') => {
            cursor.bump();
            Some(if cursor.eat('^') { Accidental::DoubleSharp } else { Accidental::Sharp })
        }
        Some('_') => {
            cursor.bump();
            Some(if cursor.eat('_') { Accidental::DoubleFlat } else { Accidental::Flat })
        }
        Some('=') => {
            cursor.bump();
            Some(Accidental::Natural)
        }
        _ => None,
    };

    let letter = cursor.bump().ok_or_else(|| malformed(number, "accidental without a note"))?;
    let index = LETTERS
        .iter()
        .position(|&l| l == letter.to_ascii_uppercase())
        .ok_or_else(|| malformed(number, format!("unexpected character '{letter}'")))?;
    let mut position = index as i32;
    if letter.is_ascii_lowercase() {
        position += 7;
    }
    loop {
        if cursor.eat('\'') {
            position += 7;
        } else if cursor.eat(',') {
            position -= 7;
        } else {
            break;
        }
    }

    Ok(StaffPitch { position, accidental })
}

/// Reads a length multiplier such as `2`, `3/2`, `/2`, `/` or `//`.
/// Returns `None` for a zero length.
fn length(cursor: &mut Cursor) -> Option<f64> {
    let numerator = cursor.number().unwrap_or(1);
    let mut denominator = 1;
    if cursor.peek() == Some('/') {
        let mut slashes = 0;
        while cursor.eat('/') {
            slashes += 1;
        }
        denominator = cursor.number().unwrap_or(1u32 << slashes.min(16));
    }
    (numerator > 0 && denominator > 0).then(|| numerator as f64 / denominator as f64)
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn number(&mut self) -> Option<u32> {
        let mut value: Option<u32> = None;
        while let Some(digit) = self.peek().and_then(|c| c.to_digit(10)) {
            self.pos += 1;
            value = Some(value.unwrap_or(0).saturating_mul(10).saturating_add(digit));
        }
        value
    }

    /// Moves past the next `close`; false if the line ends first.
    fn skip_past(&mut self, close: char) -> bool {
        while let Some(c) = self.bump() {
            if c == close {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(document: &Document) -> Vec<Element> {
        document.elements().map(|(_, _, e)| e.clone()).collect()
    }

    fn note(position: i32, duration: f64) -> Element {
        Element::Note {
            pitches: vec![StaffPitch {
                position,
                accidental: None,
            }],
            duration,
            tie: false,
        }
    }

    #[test]
    fn reads_header_fields() {
        let text = "X:3\nT:Air\nT:Second title\nM:3/4\nL:1/4\nQ:1/4=90\nK:G\nABc|\n";
        let document = parse_document(text).unwrap();
        let header = &document.header;
        assert_eq!(header.index, Some(3));
        assert_eq!(header.title.as_deref(), Some("Air"));
        assert_eq!(header.meter, Some(Meter::new(3, 4)));
        assert_eq!(header.unit_length, Some(0.25));
        assert_eq!(header.tempo_bpm, Some(90));
        assert_eq!(header.key.as_deref(), Some("G"));
        assert_eq!(document.lines.len(), 1);
    }

    #[test]
    fn tempo_forms() {
        assert_eq!(parse_tempo("120"), Some(120));
        assert_eq!(parse_tempo("1/4=120"), Some(120));
        assert_eq!(parse_tempo("3/8=40"), Some(60));
        assert_eq!(parse_tempo("1/2=60"), Some(120));
        assert_eq!(parse_tempo("\"Allegro\" 1/4=132"), Some(132));
        assert_eq!(parse_tempo("fast"), None);
        assert_eq!(parse_tempo("=120"), None);
    }

    #[test]
    fn pitches_octaves_and_lengths() {
        let document = parse_document("K:C\nC c C, c' D2 E/2 F3/2 G/ A//\n").unwrap();
        assert_eq!(
            body(&document),
            vec![
                note(0, 0.125),
                note(7, 0.125),
                note(-7, 0.125),
                note(14, 0.125),
                note(1, 0.25),
                note(2, 0.0625),
                note(3, 0.1875),
                note(4, 0.0625),
                note(5, 0.03125),
            ]
        );
    }

    #[test]
    fn accidentals_rests_and_ties() {
        let document = parse_document("K:C\n^C _D =E ^^F __G z2 x C4-|C4|]\n").unwrap();
        let elements = body(&document);
        let accidentals: Vec<_> = elements
            .iter()
            .filter_map(|e| match e {
                Element::Note { pitches, .. } => Some(pitches[0].accidental),
                _ => None,
            })
            .collect();
        assert_eq!(
            accidentals,
            vec![
                Some(Accidental::Sharp),
                Some(Accidental::Flat),
                Some(Accidental::Natural),
                Some(Accidental::DoubleSharp),
                Some(Accidental::DoubleFlat),
                None,
                None,
            ]
        );
        assert_eq!(elements[5], Element::Rest { duration: 0.25 });
        assert_eq!(elements[6], Element::Rest { duration: 0.125 });
        assert!(matches!(elements[7], Element::Note { tie: true, .. }));
        assert_eq!(elements[8], Element::Bar);
        assert!(matches!(elements[9], Element::Note { tie: false, .. }));
        assert_eq!(elements[10], Element::Bar);
    }

    #[test]
    fn chords_take_the_first_note_length() {
        let document = parse_document("K:C\n[CEG]2 [C2E2]/2\n").unwrap();
        let elements = body(&document);
        match &elements[0] {
            Element::Note { pitches, duration, .. } => {
                let positions: Vec<_> = pitches.iter().map(|p| p.position).collect();
                assert_eq!(positions, vec![0, 2, 4]);
                assert_eq!(*duration, 0.25);
            }
            other => panic!("expected chord, got {other:?}"),
        }
        assert_eq!(elements[1].duration(), 0.125);
    }

    #[test]
    fn broken_rhythm_and_triplets() {
        let document = parse_document("K:C\nC>D E<F (3GAB\n").unwrap();
        let durations: Vec<_> = body(&document).iter().map(Element::duration).collect();
        let third = 0.125 * 2.0 / 3.0;
        assert_eq!(durations[..4], [0.1875, 0.0625, 0.0625, 0.1875]);
        for d in &durations[4..] {
            assert!((d - third).abs() < 1e-12);
        }
    }

    #[test]
    fn skips_decorations_annotations_and_grace_notes() {
        let text = "X:1\nK:D\n\"Am\"!trill!A {g}B .c ~d (ef) |: g2 :| [1 a :|2 b |] % comment\n";
        let elements = body(&parse_document(text).unwrap());
        let notes = elements.iter().filter(|e| matches!(e, Element::Note { .. })).count();
        let bars = elements.iter().filter(|e| **e == Element::Bar).count();
        assert_eq!(notes, 9);
        assert_eq!(bars, 4);
    }

    #[test]
    fn voices_map_to_staves() {
        let text = "X:1\nK:C\nV:1\nCDEF|\nV:2\nC,D,E,F,|\nV:1\nGABc|\n";
        let document = parse_document(text).unwrap();
        assert_eq!(document.lines.len(), 3);
        assert_eq!(document.lines[1].staves.len(), 2);
        assert!(document.lines[1].staves[0].voices[0].elements.is_empty());
        let staves: Vec<_> = document.elements().map(|(staff, _, _)| staff).collect();
        assert_eq!(staves.iter().filter(|&&s| s == 1).count(), 5);
    }

    #[test]
    fn default_unit_length_follows_meter() {
        let short = parse_document("M:2/4\nK:C\nC\n").unwrap();
        assert_eq!(body(&short), vec![note(0, 0.0625)]);
        let inline = parse_document("K:C\nC [L:1/4] C\n").unwrap();
        assert_eq!(body(&inline), vec![note(0, 0.125), note(0, 0.25)]);
    }

    #[test]
    fn multi_measure_rest_uses_meter() {
        let document = parse_document("M:3/4\nK:C\nZ2|\n").unwrap();
        assert_eq!(body(&document)[0], Element::Rest { duration: 1.5 });
    }

    #[test]
    fn stops_at_next_tune() {
        let document = parse_document("X:1\nK:C\nCD\n\nX:2\nK:G\nEF\n").unwrap();
        assert_eq!(body(&document).len(), 2);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_document("K:C\nC D $ E\n"),
            Err(ParseError::MalformedDocument(message)) if message.starts_with("line 2")
        ));
        assert!(matches!(
            parse_document("K:C\n[CEG\n"),
            Err(ParseError::MalformedDocument(_))
        ));
        assert!(matches!(
            parse_document("X:one\nK:C\n"),
            Err(ParseError::InvalidField { field: 'X', .. })
        ));
        assert!(matches!(
            parse_document("M:waltz\nK:C\n"),
            Err(ParseError::InvalidField { field: 'M', .. })
        ));
    }
}
