//! TaskQueue - idempotent enqueue and the atomic task transitions.
//!
//! Every state change is one conditional update through the lease primitive.
//! A Task held by a worker can only be finished, failed, heartbeated or
//! marked interrupted by that same worker.

use std::sync::Arc;

use chrono::Duration;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::app::status::QueueCounts;
use crate::domain::{
    DocketError, DomainEvent, GroupId, Result, Task, TaskEnvelope, TaskId, TaskPayload, TaskStatus,
};
use crate::lease::Lease;
use crate::ports::store::{DocumentStore, Filter};
use crate::ports::{Clock, EventSink, IdGenerator, Transport};
use crate::processor::ProcessorOutput;

/// How often enqueue retries when the group's task completes between the
/// upsert and the read.
const ENQUEUE_ATTEMPTS: usize = 3;

pub struct TaskQueue {
    store: Arc<dyn DocumentStore<Task>>,
    lease: Lease<Task>,
    transport: Arc<dyn Transport>,
    ids: Arc<dyn IdGenerator>,
    events: Arc<dyn EventSink>,
    stale_after: Duration,
}

fn open_in_group(group_id: GroupId) -> Filter<Task> {
    Box::new(move |t: &Task| t.group_id == group_id && !t.is_complete)
}

impl TaskQueue {
    pub fn new(
        store: Arc<dyn DocumentStore<Task>>,
        transport: Arc<dyn Transport>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
        stale_after: Duration,
    ) -> Self {
        Self {
            lease: Lease::new(store.clone(), clock),
            store,
            transport,
            ids,
            events,
            stale_after,
        }
    }

    /// Enqueue `payload`, or return the open Task of the same group.
    ///
    /// A new Task is sent to the transport and moved to QUEUED. An existing
    /// PENDING/QUEUED Task is re-sent (the broker dedups by task id) so a
    /// previously failed send is repaired. A send failure leaves the Task
    /// PENDING and is returned as `DocketError::Transport`.
    pub async fn enqueue(&self, payload: TaskPayload, created_by: &str) -> Result<Task> {
        let group_id = payload.group_id();

        let mut existing = None;
        for _ in 0..ENQUEUE_ATTEMPTS {
            let candidate = Task::new(self.ids.generate_task_id(), payload.clone(), created_by, self.lease.now());
            let outcome = self
                .store
                .update_one(
                    open_in_group(group_id.clone()),
                    Box::new(|_: &mut Task| {}),
                    Some(candidate.clone()),
                )
                .await?;

            if outcome.upserted_id.is_some() {
                info!(task_id = %candidate.id, task_type = %candidate.task_type, group_id = %group_id, "task created");
                self.events
                    .emit(DomainEvent::TaskEnqueued {
                        task_id: candidate.id,
                        task_type: candidate.task_type,
                        created_by: created_by.to_string(),
                    })
                    .await;
                existing = Some(candidate);
                break;
            }

            let mut open = self.store.find(open_in_group(group_id.clone()), None, Some(1)).await?;
            if let Some(task) = open.pop() {
                debug!(task_id = %task.id, group_id = %group_id, "enqueue joined open task");
                existing = Some(task);
                break;
            }
            // the open task completed in between; try again
        }
        let task = existing.ok_or_else(|| DocketError::not_found("open task for group", &group_id))?;

        if task.status.rank() > TaskStatus::Queued.rank() {
            return Ok(task);
        }
        self.send(task).await
    }

    async fn send(&self, task: Task) -> Result<Task> {
        let envelope = TaskEnvelope::new(task.id, task.task_type);
        let handle = match self
            .transport
            .send(&envelope, &task.id.to_string(), task.group_id.as_str())
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "send failed, task left pending");
                return Err(e.into());
            }
        };

        let queued = self
            .lease
            .try_claim(
                &task.id,
                |t: &Task, _| !t.is_complete && t.status.rank() <= TaskStatus::Queued.rank(),
                move |t: &mut Task, now| {
                    t.message_handle = Some(handle.clone());
                    t.transition(TaskStatus::Queued, now);
                },
            )
            .await?;

        match queued {
            Some(t) => Ok(t),
            // a worker picked it up before we recorded the handle
            None => self.get(task.id).await,
        }
    }

    pub async fn get(&self, id: TaskId) -> Result<Task> {
        self.find(id).await?.ok_or_else(|| DocketError::not_found("task", id))
    }

    pub async fn find(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.store.get(&id).await?)
    }

    /// Move the task to IN_PROGRESS for `worker_id`.
    ///
    /// Succeeds for a task not yet started, one whose holder was interrupted
    /// or went stale, or one this worker already holds. `None` otherwise.
    pub async fn claim(&self, id: TaskId, worker_id: &str) -> Result<Option<Task>> {
        let stale_after = self.stale_after;
        let (w1, w2) = (worker_id.to_string(), worker_id.to_string());
        let claimed = self
            .lease
            .try_claim(
                &id,
                move |t: &Task, now| t.is_claimable_by(&w1, now, stale_after),
                move |t: &mut Task, now| {
                    t.transition(TaskStatus::InProgress, now);
                    t.claimed_by = Some(w2.clone());
                    t.heartbeat_at = Some(now);
                    t.interrupt_requested = false;
                    t.attempts += 1;
                },
            )
            .await?;

        if let Some(task) = &claimed {
            debug!(task_id = %id, worker_id, attempt = task.attempts, "task claimed");
            self.events
                .emit(DomainEvent::TaskClaimed {
                    task_id: id,
                    worker_id: worker_id.to_string(),
                    attempt: task.attempts,
                })
                .await;
        }
        Ok(claimed)
    }

    /// Refresh liveness (and progress). False when the worker no longer holds
    /// the task.
    pub async fn heartbeat(&self, id: TaskId, worker_id: &str, progress: Option<Value>) -> Result<bool> {
        let worker = worker_id.to_string();
        let beat = self
            .lease
            .try_claim(
                &id,
                move |t: &Task, _| t.is_held_by(&worker),
                move |t: &mut Task, now| {
                    t.heartbeat_at = Some(now);
                    if let Some(p) = &progress {
                        t.progress = Some(p.clone());
                    }
                },
            )
            .await?;
        Ok(beat.is_some())
    }

    pub async fn finish(&self, id: TaskId, worker_id: &str, result: ProcessorOutput) -> Result<bool> {
        let worker = worker_id.to_string();
        let done = self
            .lease
            .try_claim(
                &id,
                move |t: &Task, _| t.is_held_by(&worker),
                move |t: &mut Task, now| {
                    t.transition(TaskStatus::Finished, now);
                    t.result = Some(result.clone());
                    t.error = None;
                },
            )
            .await?;

        if done.is_some() {
            info!(task_id = %id, worker_id, "task finished");
            self.events
                .emit(DomainEvent::TaskFinished {
                    task_id: id,
                    worker_id: worker_id.to_string(),
                })
                .await;
        }
        Ok(done.is_some())
    }

    pub async fn fail(&self, id: TaskId, worker_id: &str, error: &str) -> Result<bool> {
        let worker = worker_id.to_string();
        let message = error.to_string();
        let failed = self
            .lease
            .try_claim(
                &id,
                move |t: &Task, _| t.is_held_by(&worker),
                move |t: &mut Task, now| {
                    t.transition(TaskStatus::Failed, now);
                    t.error = Some(message.clone());
                },
            )
            .await?;

        if failed.is_some() {
            warn!(task_id = %id, worker_id, error, "task failed");
            self.events
                .emit(DomainEvent::TaskFailed {
                    task_id: id,
                    worker_id: worker_id.to_string(),
                    error: error.to_string(),
                })
                .await;
        }
        Ok(failed.is_some())
    }

    /// Flag the task so any worker may reclaim it immediately.
    pub async fn mark_interrupted(&self, id: TaskId, worker_id: &str) -> Result<bool> {
        let worker = worker_id.to_string();
        let marked = self
            .lease
            .try_claim(
                &id,
                move |t: &Task, _| t.is_held_by(&worker),
                |t: &mut Task, _| t.interrupt_requested = true,
            )
            .await?;

        if marked.is_some() {
            info!(task_id = %id, worker_id, "task interrupted");
            self.events
                .emit(DomainEvent::TaskInterrupted {
                    task_id: id,
                    worker_id: worker_id.to_string(),
                })
                .await;
        }
        Ok(marked.is_some())
    }

    pub async fn counts(&self) -> Result<QueueCounts> {
        let count = |status: TaskStatus| {
            self.store
                .count(Box::new(move |t: &Task| t.status == status))
        };
        Ok(QueueCounts {
            pending: count(TaskStatus::Pending).await?,
            queued: count(TaskStatus::Queued).await?,
            in_progress: count(TaskStatus::InProgress).await?,
            finished: count(TaskStatus::Finished).await?,
            failed: count(TaskStatus::Failed).await?,
        })
    }

    /// QUEUED + IN_PROGRESS.
    pub async fn depth(&self) -> Result<u64> {
        Ok(self
            .store
            .count(Box::new(|t: &Task| {
                matches!(t.status, TaskStatus::Queued | TaskStatus::InProgress)
            }))
            .await?)
    }
}
