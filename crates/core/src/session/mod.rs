//! Session facade: owns every piece of shared state behind one mutex and
//! exposes the periodic entry points the driving loops call. The original
//! design relied on cooperative single-threaded callbacks; here the lock is
//! the explicit synchronization boundary, so the scheduler, sampler and
//! metronome loops may run on real threads.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::config::SessionConfig;
use crate::metronome::{ClickSink, Countdown, Metronome, PendulumSide};
use crate::note::MelodyNote;
use crate::pitch::{PitchDetector, PitchSample};
use crate::scheduler::Scheduler;
use crate::scorer::{ScoreState, Scorer};
use crate::timeline::{NoteTimeline, TransportState};
use crate::window::{JudgeableWindow, NoteStatus};
use crate::{Result, SightReadError};

/// Cadence of the pitch sampling loop, independent of tempo and of the
/// scheduler's lookahead cadence.
pub const SAMPLING_INTERVAL_MS: u64 = 20;

/// Where the session is in its lifecycle. Resume from `Paused` is not
/// supported; a full restart is the only way back to playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    CountingIn,
    Running,
    Paused,
    Over,
}

/// Index-based notifications drained by the UI layer after each tick. No
/// callbacks, no shared handles: the renderer maps indices to glyphs itself.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Lead-in label: this many beats remain before playback.
    CountdownTick(u32),
    /// The countdown elapsed and the transport epoch is set.
    CountdownFinished,
    /// The viewport should scroll to this note now.
    VisualAdvance { index: usize },
    /// A note's indicator changed state.
    NoteStatus { index: usize, status: NoteStatus },
    ScoreUpdate(ScoreState),
    Strike { strikes: u32 },
    MetronomePulse(PendulumSide),
    MetronomeResync,
    /// The buffered timeline is running low; a melody request was queued.
    LowBuffer,
    GameOver { score: ScoreState },
}

/// Parameters of one melody fetch, built from the session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MelodyRequest {
    pub measures: u32,
    pub key: String,
    pub time_signature: String,
    pub rhythms: String,
    pub min_pitch: String,
    pub max_pitch: String,
}

/// External melody provider. Requests may be slow or fail; drivers run them
/// outside the engine lock and splice results in via
/// [`SessionEngine::append_melody`].
pub trait MelodySource {
    fn request(&mut self, request: &MelodyRequest) -> Result<Vec<MelodyNote>>;
}

/// Everything the periodic loops mutate, guarded by one mutex.
#[derive(Debug)]
struct SessionState {
    timeline: NoteTimeline,
    transport: TransportState,
    scheduler: Scheduler,
    window: JudgeableWindow,
    scorer: Scorer,
    metronome: Metronome,
    countdown: Option<Countdown>,
    detector: PitchDetector,
    phase: SessionPhase,
    events: Vec<EngineEvent>,
    fetch_outstanding: bool,
    pending_request: Option<MelodyRequest>,
}

/// High level engine facade.
///
/// Every public method locks, mutates, queues events and unlocks; none of
/// them blocks on anything slower than the lock itself.
#[derive(Debug)]
pub struct SessionEngine {
    config: SessionConfig,
    shared: Arc<Mutex<SessionState>>,
}

impl SessionEngine {
    /// Validates the configuration and builds an idle session. `click_sink`
    /// is `None` when the click sample could not be loaded; the metronome
    /// then ticks silently (never a startup failure).
    pub fn new(config: SessionConfig, click_sink: Option<Box<dyn ClickSink>>) -> Result<Self> {
        config.validate()?;
        let state = SessionState {
            timeline: NoteTimeline::new(),
            transport: TransportState::new(f64::from(config.tempo_bpm)),
            scheduler: Scheduler::new(),
            window: JudgeableWindow::new(),
            scorer: Scorer::new(),
            metronome: Metronome::new(click_sink),
            countdown: None,
            detector: PitchDetector::new(f64::from(config.audio.sample_rate)),
            phase: SessionPhase::Idle,
            events: Vec::new(),
            fetch_outstanding: false,
            pending_request: None,
        };
        Ok(Self {
            config,
            shared: Arc::new(Mutex::new(state)),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Builds the fetch parameters for the configured session. The same
    /// request shape serves the initial fill and every low-buffer top-up.
    pub fn melody_request(&self) -> MelodyRequest {
        MelodyRequest {
            measures: self.config.buffer_measures,
            key: self.config.key_signature.clone(),
            time_signature: self.config.time_signature.to_string(),
            rhythms: self.config.rhythms.clone(),
            min_pitch: self.config.min_pitch.clone(),
            max_pitch: self.config.max_pitch.clone(),
        }
    }

    /// Validates and appends a melody batch. Malformed notes are rejected
    /// individually and logged — they must never reach the scheduler with
    /// undefined timing. Returns how many notes were accepted.
    pub fn append_melody(&self, batch: &[MelodyNote]) -> Result<usize> {
        let mut state = self.lock()?;
        let mut accepted = Vec::with_capacity(batch.len());
        for record in batch {
            match record.to_note() {
                Ok(note) => accepted.push(note),
                Err(error) => {
                    tracing::warn!(%error, record = ?record, "rejecting malformed melody note");
                }
            }
        }
        let count = accepted.len();
        state.timeline.append(accepted, self.config.buffer_measures);
        state.fetch_outstanding = false;
        Ok(count)
    }

    /// Signals that an outstanding melody fetch failed. Scheduling keeps
    /// stalling at the buffered end; the next low-buffer check may retry.
    pub fn melody_fetch_failed(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.fetch_outstanding = false;
        state.pending_request = None;
        tracing::warn!("melody fetch failed, will retry on the next low-buffer check");
        Ok(())
    }

    /// Takes the queued melody request, if one is waiting. The driver
    /// performs the fetch outside the engine lock.
    pub fn poll_melody_request(&self) -> Result<Option<MelodyRequest>> {
        Ok(self.lock()?.pending_request.take())
    }

    /// Starts the lead-in countdown. Only meaningful from idle; any other
    /// phase is a logged no-op.
    pub fn begin(&self, now: f64) -> Result<()> {
        let mut state = self.lock()?;
        if state.phase != SessionPhase::Idle {
            tracing::debug!(phase = ?state.phase, "begin ignored, session already started");
            return Ok(());
        }
        state.countdown = Some(Countdown::new(
            now,
            u32::from(self.config.time_signature.numerator),
            self.config.beat_interval(),
        ));
        state.metronome.set_enabled(true);
        state.phase = SessionPhase::CountingIn;
        Ok(())
    }

    /// The lookahead loop entry point, called roughly every
    /// [`crate::scheduler::LOOKAHEAD_INTERVAL_MS`].
    ///
    /// Drives the countdown to completion, then schedules and fires visual
    /// advances, then runs the low-buffer check. A tick never aborts the
    /// loop: reaching the end of the buffered timeline is simply a no-op.
    pub fn scheduler_tick(&self, now: f64) -> Result<()> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        if state.phase == SessionPhase::CountingIn {
            if let Some(countdown) = state.countdown.as_mut() {
                let output = countdown.tick(now);
                for remaining in output.announced {
                    state.events.push(EngineEvent::CountdownTick(remaining));
                }
                if output.finished {
                    state.countdown = None;
                    state.transport.start(now);
                    state.scheduler.arm(now);
                    state.phase = SessionPhase::Running;
                    state.events.push(EngineEvent::CountdownFinished);
                }
            }
        }

        if state.phase != SessionPhase::Running {
            return Ok(());
        }

        let output = state
            .scheduler
            .tick(now, &state.transport, &state.timeline, &mut state.window);
        for index in output.advanced {
            state.events.push(EngineEvent::VisualAdvance { index });
        }
        if output.resync {
            state.metronome.resync();
            state.events.push(EngineEvent::MetronomeResync);
        }

        if state.scheduler.is_buffer_low(&state.timeline) && !state.fetch_outstanding {
            state.fetch_outstanding = true;
            state.pending_request = Some(self.melody_request());
            state.events.push(EngineEvent::LowBuffer);
        }
        Ok(())
    }

    /// The sampling loop entry point: extracts a pitch from the latest
    /// capture frame and judges the window with it.
    pub fn process_input(&self, samples: &[f32], now: f64) -> Result<()> {
        let mut state = self.lock()?;
        if state.phase != SessionPhase::Running {
            return Ok(());
        }
        let sample = state.detector.detect(samples);
        self.judge(&mut state, sample, now);
        Ok(())
    }

    /// Judges the window with an already-extracted sample. The sampler loop
    /// uses [`Self::process_input`]; this entry exists for drivers that run
    /// their own detector.
    pub fn apply_sample(&self, sample: PitchSample, now: f64) -> Result<()> {
        let mut state = self.lock()?;
        if state.phase != SessionPhase::Running {
            return Ok(());
        }
        self.judge(&mut state, sample, now);
        Ok(())
    }

    fn judge(&self, state: &mut SessionState, sample: PitchSample, now: f64) {
        let resolutions = state.scorer.apply(&mut state.window, &sample, now);
        if resolutions.is_empty() {
            return;
        }

        let missed = resolutions
            .iter()
            .filter(|resolution| resolution.status == NoteStatus::Missed)
            .count() as u32;
        let mut strikes = state.scorer.strikes() - missed;
        for resolution in resolutions {
            state.events.push(EngineEvent::NoteStatus {
                index: resolution.index,
                status: resolution.status,
            });
            if resolution.status == NoteStatus::Missed {
                strikes += 1;
                state.events.push(EngineEvent::Strike { strikes });
            }
        }
        state.events.push(EngineEvent::ScoreUpdate(state.scorer.score()));

        if state.scorer.strikes() >= self.config.strike_limit {
            state.transport.stop();
            state.scheduler.cancel_pending();
            state.metronome.set_enabled(false);
            state.phase = SessionPhase::Over;
            state.events.push(EngineEvent::GameOver {
                score: state.scorer.score(),
            });
        }
    }

    /// The metronome loop entry point. Clicks during the countdown and
    /// during playback, alternating the pendulum each time.
    pub fn metronome_tick(&self, now: f64) -> Result<()> {
        let mut state = self.lock()?;
        if !matches!(
            state.phase,
            SessionPhase::CountingIn | SessionPhase::Running
        ) {
            return Ok(());
        }
        let beat_interval = self.config.beat_interval();
        if let Some(side) = state.metronome.tick(now, beat_interval) {
            state.events.push(EngineEvent::MetronomePulse(side));
        }
        Ok(())
    }

    /// Stops both periodic loops and cancels every pending visual-advance
    /// deadline, keeping cursors and score intact. Idempotent: pausing an
    /// already paused (or never started) session changes nothing.
    pub fn pause(&self) -> Result<()> {
        let mut state = self.lock()?;
        if !matches!(
            state.phase,
            SessionPhase::CountingIn | SessionPhase::Running
        ) {
            return Ok(());
        }
        state.transport.stop();
        state.scheduler.cancel_pending();
        state.metronome.set_enabled(false);
        state.countdown = None;
        state.phase = SessionPhase::Paused;
        Ok(())
    }

    /// Full restart: cursors to zero, window and score cleared, epoch
    /// dropped. The buffered timeline is kept; call [`Self::begin`] to play
    /// it again from the top.
    pub fn restart(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.scheduler.reset();
        state.window.clear();
        state.scorer.reset();
        state.transport.reset();
        state.metronome.set_enabled(false);
        state.metronome.resync();
        state.countdown = None;
        state.events.clear();
        state.fetch_outstanding = false;
        state.pending_request = None;
        state.phase = SessionPhase::Idle;
        Ok(())
    }

    /// Takes every event queued since the last drain, in emission order.
    pub fn drain_events(&self) -> Result<Vec<EngineEvent>> {
        Ok(std::mem::take(&mut self.lock()?.events))
    }

    pub fn phase(&self) -> Result<SessionPhase> {
        Ok(self.lock()?.phase)
    }

    pub fn score(&self) -> Result<ScoreState> {
        Ok(self.lock()?.scorer.score())
    }

    pub fn strikes(&self) -> Result<u32> {
        Ok(self.lock()?.scorer.strikes())
    }

    pub fn next_index(&self) -> Result<usize> {
        Ok(self.lock()?.scheduler.next_index())
    }

    pub fn next_time(&self) -> Result<f64> {
        Ok(self.lock()?.scheduler.next_time())
    }

    pub fn transport_epoch(&self) -> Result<f64> {
        Ok(self.lock()?.transport.epoch())
    }

    pub fn window_len(&self) -> Result<usize> {
        Ok(self.lock()?.window.len())
    }

    pub fn timeline_len(&self) -> Result<usize> {
        Ok(self.lock()?.timeline.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionState>> {
        self.shared
            .lock()
            .map_err(|_| SightReadError::Poisoned("session state"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn melody_note(pitch: &str, octave: i32, duration: &str) -> MelodyNote {
        MelodyNote {
            pitch: pitch.to_string(),
            octave,
            duration: duration.to_string(),
        }
    }

    /// 60 BPM, 4/4: one second per beat, four-beat countdown, epoch at 4.0
    /// when `begin(0.0)` is followed by a tick at 4.0.
    fn engine_at_60() -> SessionEngine {
        let mut config = SessionConfig::default();
        config.tempo_bpm = 60;
        SessionEngine::new(config, None).unwrap()
    }

    fn started(engine: &SessionEngine, melody: &[MelodyNote]) {
        engine.append_melody(melody).unwrap();
        engine.begin(0.0).unwrap();
        engine.scheduler_tick(4.0).unwrap();
        assert_eq!(engine.phase().unwrap(), SessionPhase::Running);
    }

    fn voiced(hz: f64, confidence: f64) -> PitchSample {
        PitchSample {
            frequency: Some(hz),
            confidence,
        }
    }

    fn sine(freq: f32, sample_rate: f32, seconds: f32) -> Vec<f32> {
        let n = (sample_rate * seconds) as usize;
        (0..n)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn countdown_precedes_the_epoch() {
        let engine = engine_at_60();
        engine
            .append_melody(&[melody_note("C", 4, "q")])
            .unwrap();
        engine.begin(0.0).unwrap();

        engine.scheduler_tick(0.0).unwrap();
        engine.scheduler_tick(1.0).unwrap();
        engine.scheduler_tick(2.5).unwrap();
        engine.scheduler_tick(4.0).unwrap();

        let events = engine.drain_events().unwrap();
        let labels: Vec<u32> = events
            .iter()
            .filter_map(|event| match event {
                EngineEvent::CountdownTick(n) => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(labels, vec![4, 3, 2, 1]);
        assert!(events.contains(&EngineEvent::CountdownFinished));
        assert!((engine.transport_epoch().unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn scenario_a_correct_pitch_resolves_correct() {
        let engine = engine_at_60();
        started(&engine, &[melody_note("C", 4, "q")]);

        let events = engine.drain_events().unwrap();
        assert!(events.contains(&EngineEvent::VisualAdvance { index: 0 }));

        // C4 at strong confidence, 0.3 s after the note's nominal start.
        engine.apply_sample(voiced(261.6, 0.9), 4.3).unwrap();

        assert_eq!(
            engine.score().unwrap(),
            ScoreState {
                total: 1,
                correct: 1
            }
        );
        let events = engine.drain_events().unwrap();
        assert!(events.contains(&EngineEvent::NoteStatus {
            index: 0,
            status: NoteStatus::Correct
        }));
    }

    #[test]
    fn scenario_b_silence_times_out_as_missed() {
        let engine = engine_at_60();
        started(&engine, &[melody_note("C", 4, "q")]);

        // Nothing detected inside [3.8, 5.2]; prune past the end.
        engine.apply_sample(PitchSample::unvoiced(), 4.5).unwrap();
        engine.apply_sample(PitchSample::unvoiced(), 5.3).unwrap();

        assert_eq!(
            engine.score().unwrap(),
            ScoreState {
                total: 1,
                correct: 0
            }
        );
        assert_eq!(engine.strikes().unwrap(), 1);
        let events = engine.drain_events().unwrap();
        assert!(events.contains(&EngineEvent::Strike { strikes: 1 }));
    }

    #[test]
    fn scenario_c_semitone_off_never_matches() {
        let engine = engine_at_60();
        started(&engine, &[melody_note("C", 4, "q")]);

        // C#4 against an expected C4 is ~100 cents off.
        engine.apply_sample(voiced(277.18, 0.99), 4.3).unwrap();
        assert_eq!(engine.score().unwrap().total, 0);
        assert_eq!(engine.window_len().unwrap(), 1);

        engine.apply_sample(voiced(277.18, 0.99), 5.3).unwrap();
        assert_eq!(
            engine.score().unwrap(),
            ScoreState {
                total: 1,
                correct: 0
            }
        );
    }

    #[test]
    fn scenario_d_low_buffer_requests_exactly_once() {
        let engine = engine_at_60();
        let short: Vec<MelodyNote> =
            (0..10).map(|_| melody_note("C", 4, "q")).collect();
        started(&engine, &short);

        let events = engine.drain_events().unwrap();
        assert_eq!(
            events
                .iter()
                .filter(|event| matches!(event, EngineEvent::LowBuffer))
                .count(),
            1
        );

        // Still low on the next tick, but a request is already outstanding.
        engine.scheduler_tick(4.02).unwrap();
        assert!(!engine
            .drain_events()
            .unwrap()
            .contains(&EngineEvent::LowBuffer));

        let request = engine.poll_melody_request().unwrap().unwrap();
        assert_eq!(request.measures, 8);
        assert!(engine.poll_melody_request().unwrap().is_none());

        // Arrival clears the outstanding flag and extends the timeline.
        let more: Vec<MelodyNote> = (0..30).map(|_| melody_note("D", 4, "q")).collect();
        engine.append_melody(&more).unwrap();
        assert_eq!(engine.timeline_len().unwrap(), 40);
        engine.scheduler_tick(4.04).unwrap();
        assert!(!engine
            .drain_events()
            .unwrap()
            .contains(&EngineEvent::LowBuffer));
    }

    #[test]
    fn scenario_d_failed_fetch_allows_retry() {
        let engine = engine_at_60();
        let short: Vec<MelodyNote> = (0..10).map(|_| melody_note("C", 4, "q")).collect();
        started(&engine, &short);
        engine.drain_events().unwrap();
        assert!(engine.poll_melody_request().unwrap().is_some());

        engine.melody_fetch_failed().unwrap();
        engine.scheduler_tick(4.1).unwrap();
        assert!(
            engine
                .drain_events()
                .unwrap()
                .contains(&EngineEvent::LowBuffer),
            "a failed fetch must allow the next check to re-request"
        );
    }

    #[test]
    fn scenario_e_pause_is_idempotent_and_restart_resets() {
        let engine = engine_at_60();
        started(&engine, &[melody_note("C", 4, "q"), melody_note("D", 4, "q")]);
        engine.apply_sample(voiced(261.6, 0.9), 4.3).unwrap();

        engine.pause().unwrap();
        let phase_once = engine.phase().unwrap();
        let index_once = engine.next_index().unwrap();
        let score_once = engine.score().unwrap();

        engine.pause().unwrap();
        assert_eq!(engine.phase().unwrap(), phase_once);
        assert_eq!(engine.next_index().unwrap(), index_once);
        assert_eq!(engine.score().unwrap(), score_once);
        assert_eq!(phase_once, SessionPhase::Paused);
        // Pause preserves progress.
        assert_eq!(index_once, 2);
        assert_eq!(score_once.correct, 1);

        // A paused scheduler tick fires nothing.
        engine.drain_events().unwrap();
        engine.scheduler_tick(10.0).unwrap();
        assert!(engine.drain_events().unwrap().is_empty());

        engine.restart().unwrap();
        assert_eq!(engine.phase().unwrap(), SessionPhase::Idle);
        assert_eq!(engine.next_index().unwrap(), 0);
        assert_eq!(engine.next_time().unwrap(), 0.0);
        assert_eq!(engine.score().unwrap(), ScoreState::default());
        assert_eq!(engine.strikes().unwrap(), 0);
        assert_eq!(engine.transport_epoch().unwrap(), 0.0);
        // The buffered melody survives for the next playthrough.
        assert_eq!(engine.timeline_len().unwrap(), 2);
    }

    #[test]
    fn reaching_the_strike_limit_ends_the_session() {
        let engine = engine_at_60();
        let melody: Vec<MelodyNote> = (0..3).map(|_| melody_note("C", 4, "q")).collect();
        started(&engine, &melody);

        // Miss all three notes: intervals end at 5.2, 6.2 and 7.2.
        engine.apply_sample(PitchSample::unvoiced(), 8.0).unwrap();

        assert_eq!(engine.phase().unwrap(), SessionPhase::Over);
        assert_eq!(engine.strikes().unwrap(), 3);
        let events = engine.drain_events().unwrap();
        assert!(events.contains(&EngineEvent::GameOver {
            score: ScoreState {
                total: 3,
                correct: 0
            }
        }));

        // The loops become no-ops once the session is over.
        engine.scheduler_tick(9.0).unwrap();
        engine.apply_sample(voiced(261.6, 0.9), 9.0).unwrap();
        assert!(engine.drain_events().unwrap().is_empty());
    }

    #[test]
    fn process_input_runs_the_detector_end_to_end() {
        let engine = engine_at_60();
        started(&engine, &[melody_note("A", 4, "q")]);

        let frame = sine(440.0, 48_000.0, 0.05);
        engine.process_input(&frame, 4.3).unwrap();

        assert_eq!(
            engine.score().unwrap(),
            ScoreState {
                total: 1,
                correct: 1
            }
        );
    }

    #[test]
    fn silence_never_resolves_a_note_correct() {
        let engine = engine_at_60();
        started(&engine, &[melody_note("C", 4, "q")]);

        engine.process_input(&[0.0; 2048], 4.3).unwrap();
        assert_eq!(engine.score().unwrap().total, 0);
        assert_eq!(engine.window_len().unwrap(), 1);
    }

    #[test]
    fn malformed_melody_notes_are_rejected_individually() {
        let engine = engine_at_60();
        let accepted = engine
            .append_melody(&[
                melody_note("C", 4, "q"),
                melody_note("H", 4, "q"),
                melody_note("D", 4, "zz"),
                melody_note("E", 4, "h"),
            ])
            .unwrap();
        assert_eq!(accepted, 2);
        assert_eq!(engine.timeline_len().unwrap(), 2);
    }

    #[test]
    fn metronome_clicks_during_countdown_and_playback() {
        let engine = engine_at_60();
        engine
            .append_melody(&[melody_note("C", 4, "q")])
            .unwrap();
        engine.begin(0.0).unwrap();

        engine.metronome_tick(0.0).unwrap();
        engine.metronome_tick(0.1).unwrap();
        engine.metronome_tick(1.0).unwrap();

        let pulses = engine
            .drain_events()
            .unwrap()
            .into_iter()
            .filter(|event| matches!(event, EngineEvent::MetronomePulse(_)))
            .count();
        assert_eq!(pulses, 2, "guard window must swallow the 0.1 s tick");
    }

    #[test]
    fn begin_is_ignored_outside_idle() {
        let engine = engine_at_60();
        started(&engine, &[melody_note("C", 4, "q")]);
        engine.begin(100.0).unwrap();
        assert_eq!(engine.phase().unwrap(), SessionPhase::Running);
        // The epoch did not move.
        assert!((engine.transport_epoch().unwrap() - 4.0).abs() < 1e-9);
    }
}
