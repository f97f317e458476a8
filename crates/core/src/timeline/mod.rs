use std::time::Instant;

use crate::note::Note;

/// Monotonic time source standing in for the audio hardware clock.
///
/// `now()` is seconds since an arbitrary origin fixed for the lifetime of the
/// session. It never goes backwards and never suspends; every component
/// converts note-relative offsets to absolute times against the transport
/// epoch recorded from this clock.
pub trait AudioClock {
    fn now(&self) -> f64;
}

/// [`AudioClock`] backed by [`Instant`], used by drivers that have no real
/// audio backend clock available.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Playback transport: the epoch set when the lead-in countdown completes,
/// the tempo, and whether the session is running. Tempo changes only between
/// playthroughs, never mid-scroll.
#[derive(Debug, Clone)]
pub struct TransportState {
    epoch: f64,
    tempo_bpm: f64,
    running: bool,
}

impl TransportState {
    pub fn new(tempo_bpm: f64) -> Self {
        Self {
            epoch: 0.0,
            tempo_bpm,
            running: false,
        }
    }

    /// Records the session's reference start time.
    pub fn start(&mut self, epoch: f64) {
        self.epoch = epoch;
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Drops the epoch for a full restart while keeping the tempo.
    pub fn reset(&mut self) {
        self.epoch = 0.0;
        self.running = false;
    }

    pub fn epoch(&self) -> f64 {
        self.epoch
    }

    pub fn tempo_bpm(&self) -> f64 {
        self.tempo_bpm
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Seconds per beat.
    pub fn beat_interval(&self) -> f64 {
        60.0 / self.tempo_bpm
    }

    /// Converts a length in quarter-note units to seconds at the current
    /// tempo.
    pub fn quarters_to_seconds(&self, quarter_units: f64) -> f64 {
        quarter_units * 60.0 / self.tempo_bpm
    }
}

/// Append-only ordered sequence of validated notes, grown as the melody
/// source delivers more material.
#[derive(Debug, Default)]
pub struct NoteTimeline {
    notes: Vec<Note>,
    total_measures: u32,
}

impl NoteTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a batch of notes and extends the measure count.
    pub fn append(&mut self, notes: impl IntoIterator<Item = Note>, measures: u32) {
        self.notes.extend(notes);
        self.total_measures += measures;
    }

    pub fn get(&self, index: usize) -> Option<&Note> {
        self.notes.get(index)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn total_measures(&self) -> u32 {
        self.total_measures
    }

    pub fn clear(&mut self) {
        self.notes.clear();
        self.total_measures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::{Note, NoteDuration, Pitch};

    fn quarter(pitch: &str) -> Note {
        Note::new(
            Pitch::parse(pitch).unwrap(),
            NoteDuration::parse("q").unwrap(),
        )
    }

    #[test]
    fn timeline_appends_in_order() {
        let mut timeline = NoteTimeline::new();
        timeline.append([quarter("C4"), quarter("D4")], 1);
        timeline.append([quarter("E4")], 1);

        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline.total_measures(), 2);
        assert_eq!(timeline.get(2), Some(&quarter("E4")));
        assert_eq!(timeline.get(3), None);
    }

    #[test]
    fn transport_converts_quarters_to_seconds() {
        let transport = TransportState::new(120.0);
        assert!((transport.quarters_to_seconds(1.0) - 0.5).abs() < 1e-12);
        assert!((transport.beat_interval() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn transport_start_and_reset() {
        let mut transport = TransportState::new(60.0);
        assert!(!transport.is_running());
        transport.start(12.5);
        assert!(transport.is_running());
        assert!((transport.epoch() - 12.5).abs() < 1e-12);
        transport.reset();
        assert!(!transport.is_running());
        assert_eq!(transport.epoch(), 0.0);
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
