use std::fmt;
use std::ops::AddAssign;

use chrono::{DateTime, Local};

use crate::engine::downloader::OutcomeKind;

/// Outcome counters for one round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunTally {
    pub total: usize,
    pub success: usize,
    pub duplicate: usize,
    pub error: usize,
}

impl RunTally {
    /// A round of `total` items with nothing drained yet.
    pub fn with_total(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record(&mut self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Success => self.success += 1,
            OutcomeKind::Duplicate => self.duplicate += 1,
            OutcomeKind::Error => self.error += 1,
        }
    }

    pub fn record_error(&mut self) {
        self.error += 1;
    }

    /// Items that have reached a terminal outcome.
    pub fn settled(&self) -> usize {
        self.success + self.duplicate + self.error
    }
}

impl AddAssign for RunTally {
    fn add_assign(&mut self, rhs: Self) {
        self.total += rhs.total;
        self.success += rhs.success;
        self.duplicate += rhs.duplicate;
        self.error += rhs.error;
    }
}

impl fmt::Display for RunTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Download tasks:  {}", self.total)?;
        writeln!(f, "Succeeded:       {}", self.success)?;
        writeln!(f, "Duplicates:      {}", self.duplicate)?;
        write!(f, "Failed:          {}", self.error)
    }
}

/// Grand total across every round of a run.
#[derive(Debug, Clone)]
pub struct RunAggregator {
    total: RunTally,
    rounds: usize,
    started_at: DateTime<Local>,
}

impl RunAggregator {
    pub fn new() -> Self {
        Self {
            total: RunTally::default(),
            rounds: 0,
            started_at: Local::now(),
        }
    }

    /// A failed round (`None`) adds nothing.
    pub fn fold(&mut self, tally: Option<RunTally>) {
        if let Some(tally) = tally {
            self.total += tally;
            self.rounds += 1;
        }
    }

    pub fn total(&self) -> RunTally {
        self.total
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn summary(&self) -> String {
        let elapsed = Local::now().signed_duration_since(self.started_at);
        format!(
            "{}\nDownload summary ({} rounds, started {}, {}s elapsed)\n{}",
            "*#".repeat(20),
            self.rounds,
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            elapsed.num_seconds(),
            self.total
        )
    }

    pub fn print(&self) {
        println!("{}", self.summary());
    }
}

impl Default for RunAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_routes_each_kind() {
        let mut tally = RunTally::with_total(3);
        tally.record(OutcomeKind::Success);
        tally.record(OutcomeKind::Duplicate);
        tally.record(OutcomeKind::Error);
        assert_eq!(
            tally,
            RunTally { total: 3, success: 1, duplicate: 1, error: 1 }
        );
        assert_eq!(tally.settled(), 3);
    }

    #[test]
    fn aggregator_skips_failed_rounds() {
        let mut aggregator = RunAggregator::new();
        aggregator.fold(Some(RunTally { total: 10, success: 7, duplicate: 2, error: 1 }));
        aggregator.fold(None);
        aggregator.fold(Some(RunTally { total: 5, success: 0, duplicate: 5, error: 0 }));

        assert_eq!(
            aggregator.total(),
            RunTally { total: 15, success: 7, duplicate: 7, error: 1 }
        );
        assert_eq!(aggregator.rounds(), 2);
    }

    #[test]
    fn summary_lists_every_counter() {
        let mut aggregator = RunAggregator::new();
        aggregator.fold(Some(RunTally { total: 4, success: 1, duplicate: 2, error: 1 }));
        let summary = aggregator.summary();
        assert!(summary.contains("Download tasks:  4"));
        assert!(summary.contains("Duplicates:      2"));
        assert!(summary.contains("Failed:          1"));
    }
}
