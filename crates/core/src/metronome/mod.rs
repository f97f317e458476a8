//! Metronome duties: the lead-in countdown that establishes the transport
//! epoch, and the periodic audible click during playback. Clicks go through
//! a [`ClickSink`]; a session without a usable click sample ticks silently
//! but keeps alternating the visual pendulum.

use crate::Result;

/// Guard window stopping a click from firing twice within one beat when the
/// driving loop runs faster than the tempo.
pub const CLICK_GUARD_SECS: f64 = 0.2;

/// Playback sink for the click sample. Implementations load the sample up
/// front; a failed load is reported there and the metronome runs silent.
pub trait ClickSink: Send {
    fn click(&mut self) -> Result<()>;
}

/// Visual pendulum state, alternating every click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendulumSide {
    Left,
    Right,
}

impl PendulumSide {
    fn flipped(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// What one countdown tick produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CountdownTick {
    /// Beats-remaining labels that became due this tick, descending.
    pub announced: Vec<u32>,
    /// True once the final beat has elapsed and playback may begin.
    pub finished: bool,
}

/// Pre-roll countdown of N beats, one label per beat, resolving after the
/// Nth beat elapses.
#[derive(Debug)]
pub struct Countdown {
    started_at: f64,
    beats: u32,
    interval: f64,
    emitted: u32,
}

impl Countdown {
    pub fn new(now: f64, beats: u32, beat_interval: f64) -> Self {
        Self {
            started_at: now,
            beats,
            interval: beat_interval,
            emitted: 0,
        }
    }

    /// Emits every label whose beat boundary `now` has passed. The label for
    /// beat `i` is `beats - i`; the boundary after the last label finishes
    /// the countdown.
    pub fn tick(&mut self, now: f64) -> CountdownTick {
        let mut output = CountdownTick::default();
        while self.emitted <= self.beats {
            let due = self.started_at + f64::from(self.emitted) * self.interval;
            if now < due {
                break;
            }
            if self.emitted == self.beats {
                output.finished = true;
            } else {
                output.announced.push(self.beats - self.emitted);
            }
            self.emitted += 1;
        }
        output
    }
}

/// The playback-time click loop.
pub struct Metronome {
    sink: Option<Box<dyn ClickSink>>,
    last_click: f64,
    side: PendulumSide,
    enabled: bool,
}

impl std::fmt::Debug for Metronome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metronome")
            .field("audible", &self.sink.is_some())
            .field("last_click", &self.last_click)
            .field("side", &self.side)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl Metronome {
    /// `sink` is `None` when the click sample failed to load; the metronome
    /// then degrades to silent ticking.
    pub fn new(sink: Option<Box<dyn ClickSink>>) -> Self {
        if sink.is_none() {
            tracing::warn!("metronome click unavailable, ticking silently");
        }
        Self {
            sink,
            last_click: f64::NEG_INFINITY,
            side: PendulumSide::Left,
            enabled: false,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Forces the next tick to click immediately, re-aligning the audible
    /// pulse with the transport beat.
    pub fn resync(&mut self) {
        self.last_click = f64::NEG_INFINITY;
    }

    /// One metronome tick. Clicks and flips the pendulum when at least a
    /// beat (minus the guard window) has elapsed since the last click.
    pub fn tick(&mut self, now: f64, beat_interval: f64) -> Option<PendulumSide> {
        if !self.enabled || now - self.last_click < beat_interval - CLICK_GUARD_SECS {
            return None;
        }
        self.last_click = now;
        if let Some(sink) = self.sink.as_mut() {
            if let Err(error) = sink.click() {
                tracing::warn!(%error, "metronome click failed, continuing silently");
            }
        }
        self.side = self.side.flipped();
        Some(self.side)
    }
}
