//! Musical note model: pitch classes with enharmonic normalization, symbolic
//! durations, equal-tempered frequencies and the cents distance used by the
//! scorer. Everything here is validated at construction so the scheduler
//! never sees a note with undefined timing or pitch.

use serde::{Deserialize, Serialize};

use crate::{Result, SightReadError};

/// Reference tuning for A4.
pub const A4_HZ: f64 = 440.0;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A pitch class plus octave, normalized to a semitone index 0–11 from C.
///
/// Enharmonic spellings collapse during parsing: E# becomes F, B# becomes C
/// in the next octave, Cb becomes B in the octave below, and flats map to
/// their sharp equivalents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pitch {
    semitone: u8,
    octave: i32,
}

impl Pitch {
    /// Builds a pitch from a name such as `"C#"` or `"Gb"` and an octave.
    pub fn from_parts(name: &str, octave: i32) -> Result<Self> {
        let mut chars = name.chars();
        let letter = chars
            .next()
            .ok_or_else(|| SightReadError::InvalidPitch(name.to_string()))?;
        let base: i32 = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(SightReadError::InvalidPitch(name.to_string())),
        };
        let accidental = match chars.next() {
            None => 0,
            Some('#') => 1,
            Some('b') => -1,
            Some(_) => return Err(SightReadError::InvalidPitch(name.to_string())),
        };
        if chars.next().is_some() {
            return Err(SightReadError::InvalidPitch(name.to_string()));
        }

        // B# carries into the next octave, Cb borrows from the one below.
        let mut semitone = base + accidental;
        let mut octave = octave;
        if semitone < 0 {
            semitone += 12;
            octave -= 1;
        } else if semitone >= 12 {
            semitone -= 12;
            octave += 1;
        }

        Ok(Self {
            semitone: semitone as u8,
            octave,
        })
    }

    /// Parses a combined form such as `"C#4"`, `"Gb3"` or the renderer's
    /// `"C/4"` spelling.
    pub fn parse(text: &str) -> Result<Self> {
        let cleaned = text.replace('/', "");
        let split = cleaned
            .char_indices()
            .find(|(i, c)| (c.is_ascii_digit() || *c == '-') && *i > 0)
            .map(|(i, _)| i)
            .ok_or_else(|| SightReadError::InvalidPitch(text.to_string()))?;
        let (name, octave) = cleaned.split_at(split);
        let octave: i32 = octave
            .parse()
            .map_err(|_| SightReadError::InvalidPitch(text.to_string()))?;
        Self::from_parts(name, octave)
    }

    /// Semitone index from C, 0–11, after enharmonic normalization.
    pub fn semitone(&self) -> u8 {
        self.semitone
    }

    pub fn octave(&self) -> i32 {
        self.octave
    }

    /// Equal-tempered frequency with A4 at 440 Hz.
    pub fn frequency(&self) -> f64 {
        let semitones_from_a4 = (self.octave - 4) * 12 + self.semitone as i32 - 9;
        A4_HZ * (semitones_from_a4 as f64 / 12.0).exp2()
    }

    /// MIDI note number (C4 = 60).
    pub fn midi(&self) -> i32 {
        (self.octave + 1) * 12 + self.semitone as i32
    }
}

impl std::fmt::Display for Pitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", NOTE_NAMES[self.semitone as usize], self.octave)
    }
}

/// Symbolic note length as written, without the dot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationValue {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
}

impl DurationValue {
    fn quarter_units(self) -> f64 {
        match self {
            Self::Whole => 4.0,
            Self::Half => 2.0,
            Self::Quarter => 1.0,
            Self::Eighth => 0.5,
            Self::Sixteenth => 0.25,
            Self::ThirtySecond => 0.125,
        }
    }
}

/// A symbolic duration, optionally dotted. A dot multiplies the length by
/// one and a half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteDuration {
    pub value: DurationValue,
    pub dotted: bool,
}

impl NoteDuration {
    pub fn new(value: DurationValue, dotted: bool) -> Self {
        Self { value, dotted }
    }

    /// Parses the melody source's duration symbols: `w`, `h`, `q`, `8`, `16`
    /// and `32`, each with an optional trailing `d` for dotted.
    pub fn parse(symbol: &str) -> Result<Self> {
        let (body, dotted) = match symbol.strip_suffix('d') {
            Some(body) => (body, true),
            None => (symbol, false),
        };
        let value = match body {
            "w" => DurationValue::Whole,
            "h" => DurationValue::Half,
            "q" => DurationValue::Quarter,
            "8" => DurationValue::Eighth,
            "16" => DurationValue::Sixteenth,
            "32" => DurationValue::ThirtySecond,
            _ => return Err(SightReadError::InvalidDuration(symbol.to_string())),
        };
        Ok(Self { value, dotted })
    }

    /// Length in quarter-note units.
    pub fn quarter_units(&self) -> f64 {
        let base = self.value.quarter_units();
        if self.dotted {
            base * 1.5
        } else {
            base
        }
    }

    /// Length in seconds at the given tempo.
    pub fn seconds(&self, tempo_bpm: f64) -> f64 {
        self.quarter_units() * 60.0 / tempo_bpm
    }
}

/// Immutable musical event owned by the timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    pub pitch: Pitch,
    pub duration: NoteDuration,
}

impl Note {
    pub fn new(pitch: Pitch, duration: NoteDuration) -> Self {
        Self { pitch, duration }
    }
}

/// Signed distance between a detected and an expected frequency in cents.
/// One octave is 1200 cents.
pub fn cents_difference(detected_hz: f64, expected_hz: f64) -> f64 {
    1200.0 * (detected_hz / expected_hz).log2()
}

/// Wire record the melody source produces for a single note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MelodyNote {
    pub pitch: String,
    pub octave: i32,
    pub duration: String,
}

impl MelodyNote {
    /// Validates and converts the wire record. Content errors are reported
    /// distinctly so the session can reject the note without scheduling it.
    pub fn to_note(&self) -> Result<Note> {
        let pitch = Pitch::from_parts(&self.pitch, self.octave)?;
        let duration = NoteDuration::parse(&self.duration)?;
        Ok(Note::new(pitch, duration))
    }
}

/// Decodes a melody source payload, a JSON array of [`MelodyNote`].
pub fn melody_from_json(payload: &str) -> Result<Vec<MelodyNote>> {
    Ok(serde_json::from_str(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn freq(text: &str) -> f64 {
        Pitch::parse(text).unwrap().frequency()
    }

    #[test]
    fn a4_is_reference_pitch() {
        assert!((freq("A4") - 440.0).abs() < 1e-9);
    }

    #[test]
    fn c4_is_middle_c() {
        assert!((freq("C4") - 261.6256).abs() < 0.001);
        assert_eq!(Pitch::parse("C4").unwrap().midi(), 60);
    }

    #[test]
    fn enharmonics_normalize() {
        assert_eq!(Pitch::parse("B#3").unwrap(), Pitch::parse("C4").unwrap());
        assert_eq!(Pitch::parse("Cb4").unwrap(), Pitch::parse("B3").unwrap());
        assert_eq!(Pitch::parse("E#4").unwrap(), Pitch::parse("F4").unwrap());
        assert_eq!(Pitch::parse("Fb4").unwrap(), Pitch::parse("E4").unwrap());
        assert_eq!(Pitch::parse("Gb3").unwrap(), Pitch::parse("F#3").unwrap());
    }

    #[test]
    fn accepts_renderer_spelling() {
        assert_eq!(Pitch::parse("C/4").unwrap(), Pitch::parse("C4").unwrap());
    }

    #[test]
    fn rejects_malformed_pitches() {
        for text in ["H4", "", "C", "C##4", "Cx4", "C#"] {
            assert!(
                matches!(Pitch::parse(text), Err(SightReadError::InvalidPitch(_))),
                "{text:?} should be rejected"
            );
        }
    }

    #[test]
    fn durations_convert_to_quarter_units() {
        let cases = [
            ("w", 4.0),
            ("h", 2.0),
            ("hd", 3.0),
            ("q", 1.0),
            ("qd", 1.5),
            ("8", 0.5),
            ("8d", 0.75),
            ("16", 0.25),
            ("32", 0.125),
        ];
        for (symbol, units) in cases {
            let duration = NoteDuration::parse(symbol).unwrap();
            assert!(
                (duration.quarter_units() - units).abs() < 1e-12,
                "{symbol} should be {units} quarter units"
            );
        }
    }

    #[test]
    fn duration_seconds_follow_tempo() {
        let quarter = NoteDuration::parse("q").unwrap();
        assert!((quarter.seconds(60.0) - 1.0).abs() < 1e-12);
        assert!((quarter.seconds(120.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rejects_unknown_duration_symbol() {
        assert!(matches!(
            NoteDuration::parse("z"),
            Err(SightReadError::InvalidDuration(_))
        ));
    }

    #[test]
    fn cents_measure_log_distance() {
        let c4 = freq("C4");
        let c5 = freq("C5");
        let cs4 = freq("C#4");
        assert!((cents_difference(c5, c4) - 1200.0).abs() < 1e-9);
        assert!((cents_difference(c4, c4)).abs() < 1e-9);
        assert!((cents_difference(cs4, c4) - 100.0).abs() < 1e-9);
        assert!((cents_difference(c4, cs4) + 100.0).abs() < 1e-9);
    }

    #[test]
    fn melody_payload_round_trips() {
        let payload = r#"[
            {"pitch": "C", "octave": 4, "duration": "q"},
            {"pitch": "F#", "octave": 4, "duration": "8d"}
        ]"#;
        let melody = melody_from_json(payload).unwrap();
        assert_eq!(melody.len(), 2);
        let note = melody[1].to_note().unwrap();
        assert_eq!(note.pitch, Pitch::parse("F#4").unwrap());
        assert!((note.duration.quarter_units() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn melody_note_with_bad_duration_is_rejected() {
        let record = MelodyNote {
            pitch: "C".to_string(),
            octave: 4,
            duration: "nope".to_string(),
        };
        assert!(record.to_note().is_err());
    }
}
