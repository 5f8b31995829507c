//! Task record and its status machine.
//!
//! State transitions:
//! - Pending -> Queued -> InProgress -> Finished
//! - Pending -> Queued -> InProgress -> Failed
//!
//! Transitions only move forward. Each accepted transition appends one
//! timestamped entry to `status_log`, so the log is strictly ordered by rank.
//! Terminal states are final; there is no retry state because a replay is a
//! fresh, explicit enqueue.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::document::Document;
use super::envelope::MessageHandle;
use super::ids::{GroupId, TaskId};
use super::payload::{TaskPayload, TaskType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Stored, not yet handed to the broker.
    Pending,

    /// Sent to the broker; waiting for a worker.
    Queued,

    /// Claimed by a worker.
    InProgress,

    /// Processor returned a result.
    Finished,

    /// Processor failed; terminal.
    Failed,
}

impl TaskStatus {
    /// Position in the lifecycle. Both terminal states share the last rank.
    pub fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Queued => 1,
            TaskStatus::InProgress => 2,
            TaskStatus::Finished | TaskStatus::Failed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLogEntry {
    pub status: TaskStatus,
    pub at: DateTime<Utc>,
}

/// A unit of background work, owned by the task queue.
///
/// Only mutated through atomic conditional updates; see `app::task_queue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub group_id: GroupId,
    pub task_type: TaskType,
    pub payload: TaskPayload,
    pub status: TaskStatus,
    pub status_at: DateTime<Utc>,
    pub message_handle: Option<MessageHandle>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_complete: bool,
    pub error: Option<String>,
    pub result: Option<serde_json::Map<String, serde_json::Value>>,
    pub status_log: Vec<StatusLogEntry>,

    /// Worker currently holding the task (set on claim).
    pub claimed_by: Option<String>,

    /// Liveness timestamp refreshed by the keep-alive.
    pub heartbeat_at: Option<DateTime<Utc>>,

    /// Last progress value reported by the processor.
    pub progress: Option<serde_json::Value>,

    /// Set when the holding worker shuts down mid-task.
    pub interrupt_requested: bool,

    /// Number of successful claims.
    pub attempts: u32,
}

impl Task {
    pub fn new(id: TaskId, payload: TaskPayload, created_by: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            group_id: payload.group_id(),
            task_type: payload.task_type(),
            payload,
            status: TaskStatus::Pending,
            status_at: now,
            message_handle: None,
            created_by: created_by.into(),
            created_at: now,
            completed_at: None,
            is_complete: false,
            error: None,
            result: None,
            status_log: vec![StatusLogEntry {
                status: TaskStatus::Pending,
                at: now,
            }],
            claimed_by: None,
            heartbeat_at: None,
            progress: None,
            interrupt_requested: false,
            attempts: 0,
        }
    }

    /// Move to `status` if it is strictly later in the lifecycle.
    ///
    /// Returns false (and changes nothing) for same-rank or backward moves.
    pub fn transition(&mut self, status: TaskStatus, now: DateTime<Utc>) -> bool {
        if status.rank() <= self.status.rank() {
            return false;
        }
        self.status = status;
        self.status_at = now;
        self.status_log.push(StatusLogEntry { status, at: now });
        if status.is_terminal() {
            self.is_complete = true;
            self.completed_at = Some(now);
        }
        true
    }

    /// Heartbeat missing or older than `stale_after`.
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        match self.heartbeat_at {
            Some(at) => now - at > stale_after,
            None => true,
        }
    }

    /// Whether `worker_id` may take (or retake) this task now.
    pub fn is_claimable_by(&self, worker_id: &str, now: DateTime<Utc>, stale_after: Duration) -> bool {
        if self.is_complete {
            return false;
        }
        self.status.rank() < TaskStatus::InProgress.rank()
            || self.interrupt_requested
            || self.claimed_by.as_deref() == Some(worker_id)
            || self.is_stale(now, stale_after)
    }

    pub fn is_held_by(&self, worker_id: &str) -> bool {
        !self.is_complete
            && self.status == TaskStatus::InProgress
            && self.claimed_by.as_deref() == Some(worker_id)
    }
}

impl Document for Task {
    type Id = TaskId;

    fn id(&self) -> &TaskId {
        &self.id
    }
}
