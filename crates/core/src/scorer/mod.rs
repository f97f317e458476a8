//! Scoring: compares each pitch sample against the judgeable window and
//! keeps the single-writer score and strike tallies.

use serde::Serialize;

use crate::note::cents_difference;
use crate::pitch::PitchSample;
use crate::window::{JudgeableWindow, NoteStatus, Resolution};

/// A detected pitch matches when it is within this many cents of the
/// expected frequency.
pub const CENTS_TOLERANCE: f64 = 15.0;
/// Samples at or below this periodicity strength never match.
pub const MIN_CONFIDENCE: f64 = 0.5;

/// Running tally of judged notes. `total` is monotone and `correct` never
/// exceeds it; both change exactly once per resolved entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreState {
    pub total: u32,
    pub correct: u32,
}

/// Consumer side of the judgeable window. The scorer owns every resolved
/// transition: nothing else mutates the score or the strike counter.
#[derive(Debug, Default)]
pub struct Scorer {
    score: ScoreState,
    strikes: u32,
}

impl Scorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn score(&self) -> ScoreState {
        self.score
    }

    pub fn strikes(&self) -> u32 {
        self.strikes
    }

    pub fn reset(&mut self) {
        self.score = ScoreState::default();
        self.strikes = 0;
    }

    /// The matching rule: within [`CENTS_TOLERANCE`] of the expected
    /// frequency and confidently voiced. Unvoiced samples never match.
    pub fn is_match(sample: &PitchSample, expected_hz: f64) -> bool {
        match sample.frequency {
            Some(hz) if sample.confidence > MIN_CONFIDENCE => {
                cents_difference(hz, expected_hz).abs() < CENTS_TOLERANCE
            }
            _ => false,
        }
    }

    /// Applies one sample to the window at time `now` and books the
    /// resulting resolutions. Returns them in ascending start-time order for
    /// the caller to surface as indicator updates.
    pub fn apply(
        &mut self,
        window: &mut JudgeableWindow,
        sample: &PitchSample,
        now: f64,
    ) -> Vec<Resolution> {
        let resolutions = window.judge(now, |entry| Self::is_match(sample, entry.expected_hz));
        for resolution in &resolutions {
            self.score.total += 1;
            match resolution.status {
                NoteStatus::Correct => self.score.correct += 1,
                NoteStatus::Missed => self.strikes += 1,
                NoteStatus::Pending => unreachable!("window never resolves to pending"),
            }
        }
        resolutions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::Pitch;
    use crate::window::ScheduledEntry;

    fn voiced(hz: f64, confidence: f64) -> PitchSample {
        PitchSample {
            frequency: Some(hz),
            confidence,
        }
    }

    fn c4_entry(index: usize, start: f64, end: f64) -> ScheduledEntry {
        ScheduledEntry::new(index, Pitch::parse("C4").unwrap().frequency(), start, end)
    }

    #[test]
    fn exact_pitch_matches_when_confident() {
        let c4 = Pitch::parse("C4").unwrap().frequency();
        assert!(Scorer::is_match(&voiced(c4, 0.9), c4));
        assert!(!Scorer::is_match(&voiced(c4, 0.4), c4));
    }

    #[test]
    fn semitone_off_never_matches() {
        let c4 = Pitch::parse("C4").unwrap().frequency();
        let cs4 = Pitch::parse("C#4").unwrap().frequency();
        // ~100 cents away, far outside the tolerance at any confidence.
        assert!(!Scorer::is_match(&voiced(cs4, 1.0), c4));
    }

    #[test]
    fn unvoiced_sample_never_matches() {
        let c4 = Pitch::parse("C4").unwrap().frequency();
        assert!(!Scorer::is_match(&PitchSample::unvoiced(), c4));
    }

    #[test]
    fn correct_match_books_total_and_correct() {
        let mut scorer = Scorer::new();
        let mut window = JudgeableWindow::new();
        window.push(c4_entry(0, 0.0, 1.0));

        let sample = voiced(261.6, 0.9);
        let resolutions = scorer.apply(&mut window, &sample, 0.3);

        assert_eq!(resolutions[0].status, NoteStatus::Correct);
        assert_eq!(scorer.score(), ScoreState { total: 1, correct: 1 });
        assert_eq!(scorer.strikes(), 0);
    }

    #[test]
    fn timeout_books_total_and_strike() {
        let mut scorer = Scorer::new();
        let mut window = JudgeableWindow::new();
        window.push(c4_entry(0, 0.0, 1.0));

        let resolutions = scorer.apply(&mut window, &PitchSample::unvoiced(), 1.3);

        assert_eq!(resolutions[0].status, NoteStatus::Missed);
        assert_eq!(scorer.score(), ScoreState { total: 1, correct: 0 });
        assert_eq!(scorer.strikes(), 1);
    }

    #[test]
    fn totals_never_double_count() {
        let mut scorer = Scorer::new();
        let mut window = JudgeableWindow::new();
        window.push(c4_entry(0, 0.0, 1.0));

        let sample = voiced(261.6, 0.9);
        scorer.apply(&mut window, &sample, 0.3);
        scorer.apply(&mut window, &sample, 0.4);
        scorer.apply(&mut window, &PitchSample::unvoiced(), 2.0);

        assert_eq!(scorer.score(), ScoreState { total: 1, correct: 1 });
    }

    #[test]
    fn correct_stays_at_or_below_total() {
        let mut scorer = Scorer::new();
        let mut window = JudgeableWindow::new();
        for i in 0..4 {
            window.push(c4_entry(i, i as f64, i as f64 + 0.5));
        }

        // Miss everything.
        scorer.apply(&mut window, &PitchSample::unvoiced(), 10.0);
        let score = scorer.score();
        assert_eq!(score.total, 4);
        assert!(score.correct <= score.total);
        assert_eq!(scorer.strikes(), 4);
    }
}
