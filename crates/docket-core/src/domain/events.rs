//! Events - audit trail of coordination decisions.
//!
//! Services emit a `DomainEvent` for every state change worth auditing. The
//! sink stamps it into an `AuditRecord` (time + event) and hands it to the
//! audit logger.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ids::{ItemId, JobId, QueueName, SiteId, TaskId, UserId};
use super::payload::TaskType;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    TaskEnqueued {
        task_id: TaskId,
        task_type: TaskType,
        created_by: String,
    },
    TaskClaimed {
        task_id: TaskId,
        worker_id: String,
        attempt: u32,
    },
    TaskFinished {
        task_id: TaskId,
        worker_id: String,
    },
    TaskFailed {
        task_id: TaskId,
        worker_id: String,
        error: String,
    },
    TaskInterrupted {
        task_id: TaskId,
        worker_id: String,
    },
    LockAcquired {
        queue: QueueName,
        item: ItemId,
        user: UserId,
        expires: DateTime<Utc>,
    },
    LockReleased {
        queue: QueueName,
        item: ItemId,
        user: UserId,
    },
    ItemSubmitted {
        queue: QueueName,
        item: ItemId,
        user: UserId,
        action: String,
        reassigned_to: Option<(QueueName, UserId)>,
    },
    JobScheduled {
        job_id: JobId,
        site_id: SiteId,
        trigger: String,
    },
    JobRequeued {
        job_id: JobId,
        site_id: SiteId,
        last_active: Option<DateTime<Utc>>,
    },
    PoolResized {
        from: usize,
        to: usize,
        depth: u64,
    },
}

impl DomainEvent {
    /// Short name used as the log message.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::TaskEnqueued { .. } => "task_enqueued",
            DomainEvent::TaskClaimed { .. } => "task_claimed",
            DomainEvent::TaskFinished { .. } => "task_finished",
            DomainEvent::TaskFailed { .. } => "task_failed",
            DomainEvent::TaskInterrupted { .. } => "task_interrupted",
            DomainEvent::LockAcquired { .. } => "lock_acquired",
            DomainEvent::LockReleased { .. } => "lock_released",
            DomainEvent::ItemSubmitted { .. } => "item_submitted",
            DomainEvent::JobScheduled { .. } => "job_scheduled",
            DomainEvent::JobRequeued { .. } => "job_requeued",
            DomainEvent::PoolResized { .. } => "pool_resized",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: DomainEvent,
}
