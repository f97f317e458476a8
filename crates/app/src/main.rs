use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use sightread_core::{
    AudioClock, ClickSink, EngineEvent, MelodyNote, MelodyRequest, MelodySource, MonotonicClock,
    Pitch, SessionConfig, SessionEngine, SessionPhase, LOOKAHEAD_INTERVAL_MS, SAMPLING_INTERVAL_MS,
};
use tracing_subscriber::EnvFilter;

fn main() -> sightread_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            tempo,
            key,
            seconds,
            strikes,
            flub_every,
        } => run_session(tempo, &key, seconds, strikes, flub_every),
        Commands::DefaultConfig { output } => write_default_config(output.as_deref()),
    }
}

/// Runs a simulated session: a deterministic scale source stands in for the
/// melody service and a synthesized sine stands in for the microphone. The
/// three periodic loops run on real threads against the shared engine.
fn run_session(
    tempo: u32,
    key: &str,
    seconds: u64,
    strikes: u32,
    flub_every: Option<usize>,
) -> sightread_core::Result<()> {
    tracing::info!(tempo, key, seconds, "starting simulated session");

    let mut config = SessionConfig::default();
    config.tempo_bpm = tempo;
    config.key_signature = key.to_string();
    config.strike_limit = strikes;
    let sample_rate = config.audio.sample_rate;
    let frame_size = config.audio.frame_size;

    let engine = Arc::new(SessionEngine::new(config, Some(Box::new(LogClick)))?);
    let clock = MonotonicClock::new();
    let mut source = ScaleSource::new(engine.config())?;

    // Frequency the simulated performer is currently producing, as f64 bits.
    // Zero means silence.
    let target_hz = Arc::new(AtomicU64::new(0));
    let stop = Arc::new(AtomicBool::new(false));

    // Initial buffer fill before the countdown starts.
    let mut note_frequencies = Vec::new();
    let initial = source.request(&engine.melody_request())?;
    track_frequencies(&initial, &mut note_frequencies);
    engine.append_melody(&initial)?;
    engine.begin(clock.now())?;

    let scheduler_loop = spawn_loop(
        "scheduler",
        engine.clone(),
        clock.clone(),
        stop.clone(),
        Duration::from_millis(LOOKAHEAD_INTERVAL_MS),
        |engine, now| engine.scheduler_tick(now),
    );
    let metronome_loop = spawn_loop(
        "metronome",
        engine.clone(),
        clock.clone(),
        stop.clone(),
        Duration::from_millis(10),
        |engine, now| engine.metronome_tick(now),
    );

    let sampler_engine = engine.clone();
    let sampler_clock = clock.clone();
    let sampler_stop = stop.clone();
    let sampler_hz = target_hz.clone();
    let sampler_loop = thread::spawn(move || {
        let mut frame = vec![0.0f32; frame_size];
        while !sampler_stop.load(Ordering::Relaxed) {
            let hz = f64::from_bits(sampler_hz.load(Ordering::Relaxed));
            synthesize(&mut frame, hz, sample_rate);
            if let Err(error) = sampler_engine.process_input(&frame, sampler_clock.now()) {
                tracing::error!(%error, "sampler tick failed");
                break;
            }
            thread::sleep(Duration::from_millis(SAMPLING_INTERVAL_MS));
        }
    });

    let deadline = clock.now() + seconds as f64;
    while clock.now() < deadline && !stop.load(Ordering::Relaxed) {
        for event in engine.drain_events()? {
            tracing::info!(?event, "engine event");
            match event {
                EngineEvent::VisualAdvance { index } => {
                    let flubbed = flub_every.is_some_and(|n| n > 0 && (index + 1) % n == 0);
                    let hz = if flubbed {
                        0.0
                    } else {
                        note_frequencies.get(index).copied().unwrap_or(0.0)
                    };
                    target_hz.store(hz.to_bits(), Ordering::Relaxed);
                }
                EngineEvent::GameOver { score } => {
                    tracing::info!(?score, "session over");
                    stop.store(true, Ordering::Relaxed);
                }
                _ => {}
            }
        }

        if let Some(request) = engine.poll_melody_request()? {
            match source.request(&request) {
                Ok(batch) => {
                    track_frequencies(&batch, &mut note_frequencies);
                    engine.append_melody(&batch)?;
                }
                Err(error) => {
                    tracing::warn!(%error, "melody fetch failed");
                    engine.melody_fetch_failed()?;
                }
            }
        }

        thread::sleep(Duration::from_millis(10));
    }

    stop.store(true, Ordering::Relaxed);
    let _ = scheduler_loop.join();
    let _ = metronome_loop.join();
    let _ = sampler_loop.join();

    if engine.phase()? != SessionPhase::Over {
        engine.pause()?;
    }
    let summary = serde_json::json!({
        "score": engine.score()?,
        "strikes": engine.strikes()?,
    });
    println!("{summary}");
    Ok(())
}

fn write_default_config(output: Option<&std::path::Path>) -> sightread_core::Result<()> {
    let rendered = serde_json::to_string_pretty(&SessionConfig::default())
        .map_err(sightread_core::SightReadError::from)?;
    match output {
        Some(path) => std::fs::write(path, rendered)?,
        None => println!("{rendered}"),
    }
    Ok(())
}

fn spawn_loop<F>(
    name: &'static str,
    engine: Arc<SessionEngine>,
    clock: MonotonicClock,
    stop: Arc<AtomicBool>,
    period: Duration,
    tick: F,
) -> thread::JoinHandle<()>
where
    F: Fn(&SessionEngine, f64) -> sightread_core::Result<()> + Send + 'static,
{
    thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            if let Err(error) = tick(&engine, clock.now()) {
                tracing::error!(%error, "{name} tick failed");
                break;
            }
            thread::sleep(period);
        }
    })
}

/// Fills `frame` with a sine at `hz`, or silence when `hz` is zero.
fn synthesize(frame: &mut [f32], hz: f64, sample_rate: u32) {
    if hz <= 0.0 {
        frame.fill(0.0);
        return;
    }
    let step = std::f64::consts::TAU * hz / f64::from(sample_rate);
    for (i, sample) in frame.iter_mut().enumerate() {
        *sample = (0.5 * (step * i as f64).sin()) as f32;
    }
}

fn track_frequencies(batch: &[MelodyNote], frequencies: &mut Vec<f64>) {
    for record in batch {
        if let Ok(note) = record.to_note() {
            frequencies.push(note.pitch.frequency());
        }
    }
}

/// Click sink that logs instead of playing a sample; the demo has no
/// playback device.
struct LogClick;

impl ClickSink for LogClick {
    fn click(&mut self) -> sightread_core::Result<()> {
        tracing::debug!("metronome click");
        Ok(())
    }
}

/// Deterministic stand-in for the external melody service: quarter notes
/// walking the C major scale up and down inside the configured pitch range.
struct ScaleSource {
    candidates: Vec<MelodyNote>,
    cursor: usize,
    ascending: bool,
}

impl ScaleSource {
    fn new(config: &SessionConfig) -> sightread_core::Result<Self> {
        let min = Pitch::parse(&config.min_pitch)?;
        let max = Pitch::parse(&config.max_pitch)?;
        let mut candidates = Vec::new();
        for octave in min.octave()..=max.octave() {
            for name in ["C", "D", "E", "F", "G", "A", "B"] {
                let pitch = Pitch::from_parts(name, octave)?;
                if pitch.midi() >= min.midi() && pitch.midi() <= max.midi() {
                    candidates.push(MelodyNote {
                        pitch: name.to_string(),
                        octave,
                        duration: "q".to_string(),
                    });
                }
            }
        }
        if candidates.is_empty() {
            return Err(sightread_core::SightReadError::InvalidConfig(
                "pitch range holds no scale degrees".to_string(),
            ));
        }
        Ok(Self {
            candidates,
            cursor: 0,
            ascending: true,
        })
    }
}

impl MelodySource for ScaleSource {
    fn request(&mut self, request: &MelodyRequest) -> sightread_core::Result<Vec<MelodyNote>> {
        let beats_per_measure = request
            .time_signature
            .split('/')
            .next()
            .and_then(|n| n.parse::<u32>().ok())
            .unwrap_or(4);
        let count = (request.measures * beats_per_measure) as usize;

        let mut batch = Vec::with_capacity(count);
        for _ in 0..count {
            batch.push(self.candidates[self.cursor].clone());
            if self.ascending {
                if self.cursor + 1 == self.candidates.len() {
                    self.ascending = false;
                } else {
                    self.cursor += 1;
                }
            } else if self.cursor == 0 {
                self.ascending = true;
            } else {
                self.cursor -= 1;
            }
        }
        Ok(batch)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Sight-reading trainer engine demo", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a simulated training session against a synthesized performer.
    Run {
        /// Tempo in beats per minute.
        #[arg(short, long, default_value_t = 100)]
        tempo: u32,
        /// Key signature requested from the melody source.
        #[arg(short, long, default_value = "C")]
        key: String,
        /// How long to run before pausing, in seconds.
        #[arg(short, long, default_value_t = 20)]
        seconds: u64,
        /// Strikes allowed before the session ends.
        #[arg(long, default_value_t = 3)]
        strikes: u32,
        /// Simulate a missed note every N notes.
        #[arg(long)]
        flub_every: Option<usize>,
    },
    /// Print (or write) the default session configuration as JSON.
    DefaultConfig {
        /// Output path for the generated configuration.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
