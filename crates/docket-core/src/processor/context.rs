//! TaskContext - what a running processor can see of its environment.
//!
//! Interruption is cooperative: the listener cancels the token on shutdown and
//! the processor decides where it can stop. Progress is a last-value slot the
//! keep-alive persists on each beat.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::domain::TaskId;

#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: Option<TaskId>,
    worker_id: String,
    attempt: u32,
    interrupt: CancellationToken,
    progress: Arc<Mutex<Option<Value>>>,
}

impl TaskContext {
    pub fn new(task_id: TaskId, worker_id: impl Into<String>, attempt: u32, interrupt: CancellationToken) -> Self {
        Self {
            task_id: Some(task_id),
            worker_id: worker_id.into(),
            attempt,
            interrupt,
            progress: Arc::new(Mutex::new(None)),
        }
    }

    /// Context not attached to a stored task; used when a processor runs
    /// another processor inline, and in tests.
    pub fn detached() -> Self {
        Self {
            task_id: None,
            worker_id: String::new(),
            attempt: 0,
            interrupt: CancellationToken::new(),
            progress: Arc::new(Mutex::new(None)),
        }
    }

    /// Same interrupt signal and progress slot; used for nested processors.
    pub fn child(&self) -> Self {
        self.clone()
    }

    pub fn task_id(&self) -> Option<TaskId> {
        self.task_id
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_cancelled()
    }

    /// Resolves once the worker asks this task to stop.
    pub async fn interrupted(&self) {
        self.interrupt.cancelled().await
    }

    pub fn report_progress(&self, progress: Value) {
        *self.progress.lock().unwrap_or_else(|e| e.into_inner()) = Some(progress);
    }

    pub fn progress(&self) -> Option<Value> {
        self.progress.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
