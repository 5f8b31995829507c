//! Listener - the long-poll worker loop.
//!
//! # Flow per delivery
//! 1. resolve the Task (missing or complete: delete the message and skip)
//! 2. claim it (held by a live worker elsewhere: hide the message again)
//! 3. run the processor in its own tokio task next to a keep-alive task
//! 4. success: FINISHED + delete; error or panic: FAILED + delete
//!
//! `run` takes two tokens. `intake` stops receiving; in-flight tasks run to
//! completion. `interrupt` is shutdown: in-flight tasks are marked
//! interrupted, their messages released (visibility 0) and their processors
//! signalled. Processors are never aborted.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app::task_queue::TaskQueue;
use crate::config::ListenerConfig;
use crate::domain::{ReceiptHandle, TaskId};
use crate::ports::transport::Delivery;
use crate::ports::Transport;
use crate::processor::{ProcessorError, ProcessorRegistry, TaskContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingTask,
    AlreadyComplete,
    HeldElsewhere,
    StoreUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    Skipped(SkipReason),
    Finished,
    Failed,
    /// Interrupted by shutdown and handed back to the broker.
    Released,
}

pub struct Listener {
    worker_id: String,
    queue: Arc<TaskQueue>,
    transport: Arc<dyn Transport>,
    registry: ProcessorRegistry,
    config: ListenerConfig,
}

impl Listener {
    pub fn new(
        worker_id: impl Into<String>,
        queue: Arc<TaskQueue>,
        transport: Arc<dyn Transport>,
        registry: ProcessorRegistry,
        config: ListenerConfig,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            queue,
            transport,
            registry,
            config,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Receive and handle batches until `intake` is cancelled. Cancelling
    /// `interrupt` also hands in-flight tasks back to the broker; it must
    /// imply `intake` (pass a parent token, or the same one).
    pub async fn run(self: Arc<Self>, intake: CancellationToken, interrupt: CancellationToken) {
        info!(worker_id = %self.worker_id, "listener started");
        loop {
            let received = tokio::select! {
                biased;
                _ = intake.cancelled() => break,
                r = self.transport.receive(self.config.batch_size, self.config.wait()) => r,
            };

            let batch = match received {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(worker_id = %self.worker_id, error = %e, "receive failed");
                    tokio::select! {
                        _ = intake.cancelled() => break,
                        _ = tokio::time::sleep(self.config.receive_backoff()) => continue,
                    }
                }
            };
            if batch.is_empty() {
                continue;
            }
            debug!(worker_id = %self.worker_id, count = batch.len(), "batch received");

            let mut in_flight = JoinSet::new();
            for delivery in batch {
                let this = self.clone();
                let interrupt = interrupt.clone();
                in_flight.spawn(async move { this.handle(delivery, interrupt).await });
            }
            while let Some(joined) = in_flight.join_next().await {
                if let Err(e) = joined {
                    error!(worker_id = %self.worker_id, error = %e, "delivery handler crashed");
                }
            }
        }
        info!(worker_id = %self.worker_id, "listener stopped");
    }

    /// Process one delivery end to end.
    pub async fn handle(&self, delivery: Delivery, shutdown: CancellationToken) -> HandleOutcome {
        let task_id = delivery.envelope.task_id();
        let receipt = delivery.receipt.clone();

        let task = match self.queue.find(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                warn!(%task_id, "message for unknown task, dropping");
                self.delete(&receipt, task_id).await;
                return HandleOutcome::Skipped(SkipReason::MissingTask);
            }
            Err(e) => {
                // leave the message; it comes back after the visibility timeout
                warn!(%task_id, error = %e, "task lookup failed");
                return HandleOutcome::Skipped(SkipReason::StoreUnavailable);
            }
        };
        if task.is_complete {
            debug!(%task_id, status = ?task.status, "redelivered complete task, dropping");
            self.delete(&receipt, task_id).await;
            return HandleOutcome::Skipped(SkipReason::AlreadyComplete);
        }

        let claimed = match self.queue.claim(task_id, &self.worker_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                // a live worker holds it; look again once its heartbeat could be stale
                debug!(%task_id, holder = ?task.claimed_by, "task held elsewhere");
                if let Err(e) = self
                    .transport
                    .extend_visibility(&receipt, self.config.visibility_timeout())
                    .await
                {
                    warn!(%task_id, error = %e, "could not hide message");
                }
                return HandleOutcome::Skipped(SkipReason::HeldElsewhere);
            }
            Err(e) => {
                warn!(%task_id, error = %e, "claim failed");
                return HandleOutcome::Skipped(SkipReason::StoreUnavailable);
            }
        };

        let Some(processor) = self.registry.get(claimed.task_type) else {
            let message = format!("no processor registered for task type '{}'", claimed.task_type);
            return self.settle_failure(task_id, &receipt, &message).await;
        };

        info!(%task_id, task_type = %claimed.task_type, worker_id = %self.worker_id, attempt = claimed.attempts, "processing task");

        let interrupt = CancellationToken::new();
        let ctx = TaskContext::new(task_id, self.worker_id.clone(), claimed.attempts, interrupt.clone());
        let payload = claimed.payload.clone();
        let mut run = tokio::spawn({
            let ctx = ctx.clone();
            async move { processor.process(&payload, &ctx).await }
        });

        let stop_keep_alive = CancellationToken::new();
        let keep_alive = tokio::spawn(keep_alive(
            self.queue.clone(),
            self.transport.clone(),
            receipt.clone(),
            task_id,
            self.worker_id.clone(),
            ctx,
            self.config.heartbeat_interval(),
            self.config.visibility_timeout(),
            stop_keep_alive.clone(),
        ));

        let mut released = false;
        let joined = tokio::select! {
            joined = &mut run => joined,
            _ = shutdown.cancelled() => {
                stop_keep_alive.cancel();
                self.release(task_id, &receipt).await;
                interrupt.cancel();
                released = true;
                run.await
            }
        };
        stop_keep_alive.cancel();
        if let Err(e) = keep_alive.await {
            warn!(%task_id, error = %e, "keep-alive task crashed");
        }

        match joined {
            Ok(Ok(output)) => match self.queue.finish(task_id, &self.worker_id, output).await {
                Ok(true) => {
                    self.delete(&receipt, task_id).await;
                    HandleOutcome::Finished
                }
                Ok(false) => {
                    warn!(%task_id, "finished after losing the task, result discarded");
                    HandleOutcome::Released
                }
                Err(e) => {
                    error!(%task_id, error = %e, "could not record result");
                    HandleOutcome::Skipped(SkipReason::StoreUnavailable)
                }
            },
            Ok(Err(ProcessorError::Interrupted)) if released => {
                info!(%task_id, "processor stopped on interrupt, task left for another worker");
                HandleOutcome::Released
            }
            Ok(Err(e)) => self.settle_failure(task_id, &receipt, &e.to_string()).await,
            Err(e) => {
                let message = panic_message(e);
                self.settle_failure(task_id, &receipt, &message).await
            }
        }
    }

    /// FAILED + delete. No broker-level retry: a replay is a fresh enqueue.
    async fn settle_failure(&self, task_id: TaskId, receipt: &ReceiptHandle, message: &str) -> HandleOutcome {
        match self.queue.fail(task_id, &self.worker_id, message).await {
            Ok(true) => {
                self.delete(receipt, task_id).await;
                HandleOutcome::Failed
            }
            Ok(false) => {
                warn!(%task_id, error = message, "failed after losing the task");
                HandleOutcome::Released
            }
            Err(e) => {
                error!(%task_id, error = %e, "could not record failure");
                HandleOutcome::Skipped(SkipReason::StoreUnavailable)
            }
        }
    }

    async fn release(&self, task_id: TaskId, receipt: &ReceiptHandle) {
        if let Err(e) = self.queue.mark_interrupted(task_id, &self.worker_id).await {
            warn!(%task_id, error = %e, "could not mark task interrupted");
        }
        if let Err(e) = self.transport.extend_visibility(receipt, Duration::ZERO).await {
            warn!(%task_id, error = %e, "could not release message");
        }
    }

    async fn delete(&self, receipt: &ReceiptHandle, task_id: TaskId) {
        if let Err(e) = self.transport.delete(receipt).await {
            warn!(%task_id, error = %e, "could not delete message");
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn keep_alive(
    queue: Arc<TaskQueue>,
    transport: Arc<dyn Transport>,
    receipt: ReceiptHandle,
    task_id: TaskId,
    worker_id: String,
    ctx: TaskContext,
    interval: Duration,
    visibility: Duration,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        if let Err(e) = transport.extend_visibility(&receipt, visibility).await {
            warn!(%task_id, error = %e, "failed to extend visibility");
        }
        match queue.heartbeat(task_id, &worker_id, ctx.progress()).await {
            Ok(true) => debug!(%task_id, "heartbeat"),
            Ok(false) => warn!(%task_id, %worker_id, "heartbeat rejected, task no longer held"),
            Err(e) => warn!(%task_id, error = %e, "heartbeat failed"),
        }
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return format!("processor task aborted: {err}");
    }
    let panic = err.into_panic();
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("processor panicked: {detail}")
}
