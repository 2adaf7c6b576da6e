//! Sweep statistics.
//!
//! A [`SweepStats`] is created per location pass and merged into the
//! per-sweep total by addition, so any number of workers can produce them
//! independently.

use std::ops::{Add, AddAssign};

/// Counters for one sweep (or one location within a sweep).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Pending entries found by the range scan.
    pub found_updates: u64,
    /// Entries fully delivered (and therefore unlinked).
    pub successes: u64,
    /// Entries with at least one replica still unacknowledged.
    pub failures: u64,
    /// Entries deleted from the queue.
    pub unlinks: u64,
    /// Locations swept without error.
    pub locations_succeeded: u64,
    /// Locations that failed (unreachable or unexpected error).
    pub locations_failed: u64,
}

impl SweepStats {
    /// Merge another accumulator into this one.
    pub fn merge(&mut self, other: &SweepStats) {
        self.found_updates += other.found_updates;
        self.successes += other.successes;
        self.failures += other.failures;
        self.unlinks += other.unlinks;
        self.locations_succeeded += other.locations_succeeded;
        self.locations_failed += other.locations_failed;
    }

    /// Locations visited, successful or not.
    pub fn locations_swept(&self) -> u64 {
        self.locations_succeeded + self.locations_failed
    }
}

impl AddAssign for SweepStats {
    fn add_assign(&mut self, rhs: SweepStats) {
        self.merge(&rhs);
    }
}

impl Add for SweepStats {
    type Output = SweepStats;

    fn add(mut self, rhs: SweepStats) -> SweepStats {
        self.merge(&rhs);
        self
    }
}

impl std::iter::Sum for SweepStats {
    fn sum<I: Iterator<Item = SweepStats>>(iter: I) -> SweepStats {
        iter.fold(SweepStats::default(), Add::add)
    }
}
