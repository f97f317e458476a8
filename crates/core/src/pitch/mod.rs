//! Monophonic fundamental-frequency estimation for the live microphone feed.
//!
//! The detector implements YIN: a difference function over the frame, the
//! cumulative mean normalized difference, an absolute-threshold dip search
//! and parabolic interpolation for sub-sample lag accuracy. Confidence is
//! the periodicity strength in `[0, 1]`; frames that fail the RMS gate or
//! produce no plausible dip come back unvoiced and can never match a note.

const YIN_THRESHOLD: f32 = 0.15;
const RMS_GATE: f32 = 0.02;
/// A global CMND minimum above this is noise, not a pitched signal.
const FALLBACK_CEILING: f32 = 0.5;

const DEFAULT_MIN_FREQ: f64 = 60.0;
const DEFAULT_MAX_FREQ: f64 = 1600.0;

/// Transient result of one sampling tick. Not retained between ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchSample {
    /// Detected fundamental in Hz, or `None` for silence and unvoiced input.
    pub frequency: Option<f64>,
    /// Periodicity strength in `[0, 1]`.
    pub confidence: f64,
}

impl PitchSample {
    pub fn unvoiced() -> Self {
        Self {
            frequency: None,
            confidence: 0.0,
        }
    }

    pub fn is_voiced(&self) -> bool {
        self.frequency.is_some()
    }
}

/// YIN pitch detector with pre-allocated work buffers, built once per
/// session and reused on every sampling tick.
#[derive(Debug)]
pub struct PitchDetector {
    sample_rate: f64,
    min_freq: f64,
    max_freq: f64,
    diff: Vec<f32>,
    cmnd: Vec<f32>,
}

impl PitchDetector {
    /// Detector covering the trainer's full pitch range.
    pub fn new(sample_rate: f64) -> Self {
        Self::with_range(sample_rate, DEFAULT_MIN_FREQ, DEFAULT_MAX_FREQ)
    }

    /// Detector restricted to an instrument-specific frequency band.
    pub fn with_range(sample_rate: f64, min_freq: f64, max_freq: f64) -> Self {
        Self {
            sample_rate,
            min_freq,
            max_freq,
            diff: Vec::new(),
            cmnd: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Extracts `(frequency, confidence)` from one frame of samples.
    pub fn detect(&mut self, samples: &[f32]) -> PitchSample {
        if samples.len() < 2 || self.sample_rate <= 0.0 {
            return PitchSample::unvoiced();
        }

        let mean = samples.iter().sum::<f32>() / samples.len() as f32;
        let energy: f32 = samples.iter().map(|s| (s - mean) * (s - mean)).sum();
        let rms = (energy / samples.len() as f32).sqrt();
        if rms < RMS_GATE {
            return PitchSample::unvoiced();
        }

        let half_len = samples.len() / 2;
        let min_lag = (self.sample_rate / self.max_freq).ceil() as usize;
        let max_lag = ((self.sample_rate / self.min_freq).floor() as usize).min(half_len);
        if min_lag >= max_lag || max_lag < 2 {
            return PitchSample::unvoiced();
        }

        self.diff.clear();
        self.diff.resize(max_lag + 1, 0.0);
        for tau in 1..=max_lag {
            let mut sum = 0.0f32;
            for j in 0..half_len {
                let d = samples[j] - samples[j + tau];
                sum += d * d;
            }
            self.diff[tau] = sum;
        }

        self.cmnd.clear();
        self.cmnd.resize(max_lag + 1, 1.0);
        let mut running_sum = 0.0f32;
        for tau in 1..=max_lag {
            running_sum += self.diff[tau];
            if running_sum > 0.0 {
                self.cmnd[tau] = self.diff[tau] * tau as f32 / running_sum;
            }
        }

        // First dip below the threshold wins; walk it down to the local
        // minimum of the valley. Lags below min_lag alias above max_freq.
        let mut best_tau = 0usize;
        for tau in min_lag..=max_lag {
            if self.cmnd[tau] < YIN_THRESHOLD {
                let mut t = tau;
                while t + 1 <= max_lag && self.cmnd[t + 1] < self.cmnd[t] {
                    t += 1;
                }
                best_tau = t;
                break;
            }
        }

        if best_tau == 0 {
            let mut min_val = f32::MAX;
            for tau in min_lag..=max_lag {
                if self.cmnd[tau] < min_val {
                    min_val = self.cmnd[tau];
                    best_tau = tau;
                }
            }
            if min_val > FALLBACK_CEILING {
                return PitchSample::unvoiced();
            }
        }

        let tau_refined = self.interpolate_lag(best_tau, max_lag);
        if tau_refined <= 0.0 {
            return PitchSample::unvoiced();
        }

        let frequency = self.sample_rate / tau_refined;
        let confidence = f64::from(1.0 - self.cmnd[best_tau].min(1.0));
        PitchSample {
            frequency: Some(frequency),
            confidence,
        }
    }

    /// Parabolic interpolation around the chosen lag for sub-sample accuracy.
    fn interpolate_lag(&self, best_tau: usize, max_lag: usize) -> f64 {
        if best_tau == 0 || best_tau >= max_lag {
            return best_tau as f64;
        }
        let alpha = f64::from(self.cmnd[best_tau - 1]);
        let beta = f64::from(self.cmnd[best_tau]);
        let gamma = f64::from(self.cmnd[best_tau + 1]);
        let denom = 2.0 * (2.0 * beta - alpha - gamma);
        if denom.abs() > 1e-10 {
            best_tau as f64 + (alpha - gamma) / denom
        } else {
            best_tau as f64
        }
    }
}
