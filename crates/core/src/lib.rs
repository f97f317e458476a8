//! Core library for the sight-reading trainer.
//!
//! The crate implements the real-time heart of the trainer: a drift-free
//! musical transport, a lookahead scheduler that advances notation ahead of
//! playback time, a sliding window of currently judgeable notes, a YIN pitch
//! detector for the live microphone feed, and a scorer that judges each note
//! exactly once. Each module owns a distinct subsystem; the [`session`]
//! facade ties them together behind one synchronization boundary so the
//! periodic loops can run on real threads. Notation rendering, melody
//! generation and audio hardware stay outside, behind trait seams.

pub mod config;
pub mod error;
pub mod metronome;
pub mod note;
pub mod pitch;
pub mod scheduler;
pub mod scorer;
pub mod session;
pub mod timeline;
pub mod window;

pub use config::{AudioConfig, Clef, SessionConfig, TimeSignature};
pub use error::{Result, SightReadError};
pub use metronome::{ClickSink, Countdown, Metronome, PendulumSide};
pub use note::{cents_difference, MelodyNote, Note, NoteDuration, Pitch};
pub use pitch::{PitchDetector, PitchSample};
pub use scheduler::{Scheduler, LOOKAHEAD_INTERVAL_MS, LOW_BUFFER_NOTES, TIMING_TOLERANCE_SECS};
pub use scorer::{ScoreState, Scorer, CENTS_TOLERANCE, MIN_CONFIDENCE};
pub use session::{
    EngineEvent, MelodyRequest, MelodySource, SessionEngine, SessionPhase, SAMPLING_INTERVAL_MS,
};
pub use timeline::{AudioClock, MonotonicClock, NoteTimeline, TransportState};
pub use window::{JudgeableWindow, NoteStatus, Resolution, ScheduledEntry};
