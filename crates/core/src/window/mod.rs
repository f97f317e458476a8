//! The judgeable window: the shared set of scheduled notes whose scoring
//! validity interval has begun but not ended. The scheduler appends entries
//! with monotonically non-decreasing start times; the scorer resolves and
//! removes them, each exactly once.

/// Per-note indicator state surfaced to the notation renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteStatus {
    Pending,
    Correct,
    Missed,
}

/// One scheduled note, eligible for pitch comparison between `start` and
/// `end`. Times are absolute clock seconds padded by the timing tolerance.
#[derive(Debug, Clone)]
pub struct ScheduledEntry {
    /// Position of the note in the timeline.
    pub index: usize,
    /// Equal-tempered frequency the performer is expected to produce.
    pub expected_hz: f64,
    pub start: f64,
    pub end: f64,
}

impl ScheduledEntry {
    pub fn new(index: usize, expected_hz: f64, start: f64, end: f64) -> Self {
        Self {
            index,
            expected_hz,
            start,
            end,
        }
    }
}

/// Outcome of one entry leaving the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub index: usize,
    pub status: NoteStatus,
}

/// Ordered collection of [`ScheduledEntry`] values. Entries keep their
/// insertion order, which the scheduler guarantees is ascending start time,
/// so a single forward pass judges oldest-expected notes first.
#[derive(Debug, Default)]
pub struct JudgeableWindow {
    entries: Vec<ScheduledEntry>,
}

impl JudgeableWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry at the back. The caller must push in ascending
    /// start-time order.
    pub fn push(&mut self, entry: ScheduledEntry) {
        debug_assert!(
            self.entries
                .last()
                .map(|last| entry.start >= last.start)
                .unwrap_or(true),
            "entries must arrive in ascending start-time order"
        );
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_index(&self, index: usize) -> bool {
        self.entries.iter().any(|entry| entry.index == index)
    }

    pub fn entries(&self) -> &[ScheduledEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Runs one scoring pass at time `now`.
    ///
    /// Entries are visited in ascending start order. An entry whose interval
    /// contains `now` and whose pitch satisfies `matches` resolves correct;
    /// an entry whose interval has fully elapsed resolves missed. Resolved
    /// entries are removed, so no entry can ever be counted twice. Entries
    /// still inside their interval but unmatched stay for future ticks, as do
    /// entries whose interval has not started. The correct-match test runs
    /// before the timeout test for every entry.
    pub fn judge<F>(&mut self, now: f64, mut matches: F) -> Vec<Resolution>
    where
        F: FnMut(&ScheduledEntry) -> bool,
    {
        let mut resolutions = Vec::new();
        self.entries.retain(|entry| {
            if now >= entry.start && now <= entry.end {
                if matches(entry) {
                    resolutions.push(Resolution {
                        index: entry.index,
                        status: NoteStatus::Correct,
                    });
                    return false;
                }
                true
            } else if now > entry.end {
                resolutions.push(Resolution {
                    index: entry.index,
                    status: NoteStatus::Missed,
                });
                false
            } else {
                // Interval not reached yet.
                true
            }
        });
        resolutions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: usize, start: f64, end: f64) -> ScheduledEntry {
        ScheduledEntry::new(index, 440.0, start, end)
    }

    #[test]
    fn in_range_match_resolves_correct() {
        let mut window = JudgeableWindow::new();
        window.push(entry(0, 0.0, 1.0));

        let resolutions = window.judge(0.5, |_| true);
        assert_eq!(
            resolutions,
            vec![Resolution {
                index: 0,
                status: NoteStatus::Correct
            }]
        );
        assert!(window.is_empty());
    }

    #[test]
    fn overdue_entry_resolves_missed() {
        let mut window = JudgeableWindow::new();
        window.push(entry(0, 0.0, 1.0));

        let resolutions = window.judge(1.5, |_| true);
        assert_eq!(resolutions[0].status, NoteStatus::Missed);
        assert!(window.is_empty());
    }

    #[test]
    fn unmatched_in_range_entry_stays() {
        let mut window = JudgeableWindow::new();
        window.push(entry(0, 0.0, 1.0));

        assert!(window.judge(0.5, |_| false).is_empty());
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn future_entry_is_untouched() {
        let mut window = JudgeableWindow::new();
        window.push(entry(0, 5.0, 6.0));

        assert!(window.judge(1.0, |_| true).is_empty());
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn each_entry_resolves_at_most_once() {
        let mut window = JudgeableWindow::new();
        window.push(entry(0, 0.0, 1.0));

        let first = window.judge(0.5, |_| true);
        let second = window.judge(0.6, |_| true);
        let third = window.judge(2.0, |_| true);
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert!(third.is_empty());
    }

    #[test]
    fn overlapping_entries_are_judged_independently() {
        let mut window = JudgeableWindow::new();
        window.push(entry(0, 0.0, 1.0));
        window.push(entry(1, 0.0, 1.0));

        // The same detected pitch may claim both overlapping notes.
        let resolutions = window.judge(0.5, |_| true);
        assert_eq!(resolutions.len(), 2);
        assert_eq!(resolutions[0].index, 0);
        assert_eq!(resolutions[1].index, 1);
    }

    #[test]
    fn resolution_order_is_ascending_start_time() {
        let mut window = JudgeableWindow::new();
        window.push(entry(0, 0.0, 0.4));
        window.push(entry(1, 0.2, 0.5));

        let resolutions = window.judge(1.0, |_| false);
        assert_eq!(
            resolutions.iter().map(|r| r.index).collect::<Vec<_>>(),
            vec![0, 1]
        );
    }
}
