//! Status - queue counts for dashboards and the autoscaler.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub queued: u64,
    pub in_progress: u64,
    pub finished: u64,
    pub failed: u64,
}

impl QueueCounts {
    /// Work waiting for or occupying a worker.
    pub fn depth(&self) -> u64 {
        self.queued + self.in_progress
    }

    pub fn total(&self) -> u64 {
        self.pending + self.queued + self.in_progress + self.finished + self.failed
    }
}
