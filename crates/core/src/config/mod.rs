use serde::{Deserialize, Serialize};

use crate::{note::Pitch, Result, SightReadError};

/// Session parameters accepted at start. Values arrive pre-parsed from the
/// settings layer; [`SessionConfig::validate`] is the last line of defense
/// before the engine starts ticking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub key_signature: String,
    pub time_signature: TimeSignature,
    /// Beats per minute. The trainer supports 40–140.
    pub tempo_bpm: u32,
    /// Digit string selecting the rhythm set the melody source may use.
    pub rhythms: String,
    /// Lowest pitch the melody source may emit, e.g. "C4".
    pub min_pitch: String,
    /// Highest pitch the melody source may emit, e.g. "C5".
    pub max_pitch: String,
    pub clef: Clef,
    /// Number of missed notes before the session ends.
    pub strike_limit: u32,
    /// Measures requested per melody fetch.
    pub buffer_measures: u32,
    pub audio: AudioConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            key_signature: "C".to_string(),
            time_signature: TimeSignature::default(),
            tempo_bpm: 100,
            rhythms: "1234567".to_string(),
            min_pitch: "C4".to_string(),
            max_pitch: "C5".to_string(),
            clef: Clef::Treble,
            strike_limit: 3,
            buffer_measures: 8,
            audio: AudioConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Checks the parameter ranges the engine depends on. Returns the first
    /// violation found.
    pub fn validate(&self) -> Result<()> {
        if !(40..=140).contains(&self.tempo_bpm) {
            return Err(SightReadError::InvalidConfig(format!(
                "tempo must be between 40 and 140 BPM, got {}",
                self.tempo_bpm
            )));
        }
        if self.time_signature.numerator == 0 {
            return Err(SightReadError::InvalidConfig(
                "time signature numerator must be at least 1".to_string(),
            ));
        }
        if self.strike_limit == 0 {
            return Err(SightReadError::InvalidConfig(
                "strike limit must be at least 1".to_string(),
            ));
        }
        if self.buffer_measures == 0 {
            return Err(SightReadError::InvalidConfig(
                "buffer measures must be at least 1".to_string(),
            ));
        }

        let min = Pitch::parse(&self.min_pitch)?;
        let max = Pitch::parse(&self.max_pitch)?;
        if min.frequency() >= max.frequency() {
            return Err(SightReadError::InvalidConfig(format!(
                "pitch range is empty: {} is not below {}",
                self.min_pitch, self.max_pitch
            )));
        }

        self.audio.validate()
    }

    /// Seconds per beat at the configured tempo.
    pub fn beat_interval(&self) -> f64 {
        60.0 / self.tempo_bpm as f64
    }
}

/// Time signature as written on the staff, e.g. 4/4 or 6/8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }
}

impl std::fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Clef used by the notation renderer. The engine only forwards it to the
/// melody source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Clef {
    Treble,
    Bass,
    Alto,
}

/// Configuration specific to the audio input path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Samples handed to the pitch detector per sampling tick.
    pub frame_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            frame_size: 2048,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(SightReadError::InvalidConfig(
                "sample rate must be positive".to_string(),
            ));
        }
        if self.frame_size < 2 {
            return Err(SightReadError::InvalidConfig(
                "frame size must hold at least two samples".to_string(),
            ));
        }
        Ok(())
    }
}
