//! Scheduler status types
//!
//! Aggregate counters for a running scheduler.

use serde::{Deserialize, Serialize};

/// Counts of jobs per lifecycle state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub pending: usize,
    pub searching: usize,
    pub queued: usize,
    pub downloading: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Jobs currently holding a concurrency slot
    pub slots_in_use: usize,
    /// Jobs waiting for a slot
    pub slots_waiting: usize,
    /// Combined transfer speed of downloading jobs in bytes/sec
    pub download_speed: u64,
}

impl SchedulerStats {
    /// Jobs that are not in a terminal state
    pub fn unfinished(&self) -> usize {
        self.pending + self.searching + self.queued + self.downloading + self.paused
    }

    pub fn total(&self) -> usize {
        self.unfinished() + self.completed + self.failed + self.cancelled
    }
}
