//! Lookahead scheduling: walks the note timeline ahead of real time, turning
//! each note into a judgeable window entry and a pending visual-advance
//! deadline. Deadlines are re-checked against the clock on every tick rather
//! than armed as one-shot wall-clock timers, so jitter in the driving loop
//! cannot accumulate into drift.

use std::collections::VecDeque;

use crate::timeline::{NoteTimeline, TransportState};
use crate::window::{JudgeableWindow, ScheduledEntry};

/// Cadence the driving loop should call [`Scheduler::tick`] at, independent
/// of tempo.
pub const LOOKAHEAD_INTERVAL_MS: u64 = 20;
/// Padding applied to both ends of a note's scoring interval, absorbing
/// human timing variance and detector latency.
pub const TIMING_TOLERANCE_SECS: f64 = 0.2;
/// The low-buffer condition triggers when fewer notes than this remain
/// ahead of the current playing position.
pub const LOW_BUFFER_NOTES: usize = 20;

/// A visual advance lands on a beat when the transport phase is inside this
/// window, making it a candidate for a metronome resync pulse.
const RESYNC_PHASE_WINDOW: f64 = 0.05;
/// Minimum advances between two resync pulses.
const RESYNC_MIN_NOTES: u32 = 10;

/// One armed visual-advance deadline. Armed in nondecreasing due order, so
/// the front of the queue is always the next deadline.
#[derive(Debug, Clone, Copy)]
struct PendingAdvance {
    due: f64,
    index: usize,
}

/// What one lookahead tick produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchedulerTick {
    /// Timeline indices whose visual-advance deadline fired this tick, in
    /// firing order.
    pub advanced: Vec<usize>,
    /// True when an advance landed on a beat and enough notes have passed
    /// since the last metronome resynchronization.
    pub resync: bool,
}

/// The lookahead loop's state: a cursor pair into the timeline plus the
/// queue of armed deadlines. Both cursors are non-decreasing for the life of
/// a playthrough; only a full restart resets them.
#[derive(Debug, Default)]
pub struct Scheduler {
    next_index: usize,
    next_time: f64,
    current_index: usize,
    pending: VecDeque<PendingAdvance>,
    notes_since_resync: u32,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchors the time cursor to the transport epoch. Called once per
    /// playthrough when the countdown completes.
    pub fn arm(&mut self, epoch: f64) {
        self.next_time = epoch;
    }

    /// Index of the next note to schedule.
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Absolute start time of the next note to schedule.
    pub fn next_time(&self) -> f64 {
        self.next_time
    }

    /// Index of the most recently advanced (currently playing) note.
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Notes still buffered ahead of the current playing position.
    pub fn remaining(&self, timeline: &NoteTimeline) -> usize {
        timeline.len().saturating_sub(self.current_index)
    }

    /// True when the cursor is close enough to the buffered end that more
    /// melody should be requested.
    pub fn is_buffer_low(&self, timeline: &NoteTimeline) -> bool {
        self.remaining(timeline) < LOW_BUFFER_NOTES
    }

    /// One lookahead tick.
    ///
    /// Schedules every note currently available past `next_index`: computes
    /// its absolute interval from the tempo, pushes a window entry padded by
    /// [`TIMING_TOLERANCE_SECS`], arms its advance deadline and moves both
    /// cursors. Reaching the end of the available timeline is a no-op, not
    /// an error; the tick retries once more notes arrive. Afterwards fires
    /// every deadline that `now` has reached.
    pub fn tick(
        &mut self,
        now: f64,
        transport: &TransportState,
        timeline: &NoteTimeline,
        window: &mut JudgeableWindow,
    ) -> SchedulerTick {
        let mut output = SchedulerTick::default();
        if !transport.is_running() {
            return output;
        }

        while let Some(note) = timeline.get(self.next_index) {
            let duration = transport.quarters_to_seconds(note.duration.quarter_units());
            window.push(ScheduledEntry::new(
                self.next_index,
                note.pitch.frequency(),
                self.next_time - TIMING_TOLERANCE_SECS,
                self.next_time + duration + TIMING_TOLERANCE_SECS,
            ));
            self.pending.push_back(PendingAdvance {
                due: self.next_time,
                index: self.next_index,
            });
            self.next_time += duration;
            self.next_index += 1;
        }

        while let Some(&PendingAdvance { due, index }) = self.pending.front() {
            if due > now {
                break;
            }
            self.pending.pop_front();
            self.current_index = index;
            output.advanced.push(index);
            if self.advance_wants_resync(now, transport) {
                output.resync = true;
            }
        }

        output
    }

    /// Pulse the metronome back into phase when an advance lands on a beat,
    /// at most once every [`RESYNC_MIN_NOTES`] advances.
    fn advance_wants_resync(&mut self, now: f64, transport: &TransportState) -> bool {
        let phase = (now - transport.epoch()) % transport.beat_interval();
        if phase < RESYNC_PHASE_WINDOW && self.notes_since_resync > RESYNC_MIN_NOTES {
            self.notes_since_resync = 0;
            true
        } else {
            self.notes_since_resync += 1;
            false
        }
    }

    /// Cancels all armed deadlines without touching the cursors. Used by
    /// pause; safe to call repeatedly.
    pub fn cancel_pending(&mut self) {
        self.pending.clear();
    }

    /// Full restart: cursors back to zero, deadlines dropped.
    pub fn reset(&mut self) {
        self.next_index = 0;
        self.next_time = 0.0;
        self.current_index = 0;
        self.pending.clear();
        self.notes_since_resync = 0;
    }
}
