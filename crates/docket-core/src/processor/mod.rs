//! Processors - the code that actually runs a task.
//!
//! # Two layers
//! - `Processor`: object-safe trait taking the whole `TaskPayload` (what the
//!   registry stores and the listener calls)
//! - `PayloadProcessor`: typed per-variant trait; `Typed` adapts it to
//!   `Processor` by matching the payload variant once
//!
//! Processors are keyed by `TaskType` in `ProcessorRegistry`.

pub mod context;
pub mod registry;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::{TaskPayload, TaskType};

pub use self::context::TaskContext;
pub use self::registry::{ProcessorRegistry, RegistryError};

/// Result map merged into the owning document / stored on the Task.
pub type ProcessorOutput = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessorError {
    #[error("{0}")]
    Failed(String),

    #[error("processor for {expected} received a {got} payload")]
    InvalidPayload { expected: TaskType, got: TaskType },

    /// Stopped early after the interrupt signal.
    #[error("interrupted")]
    Interrupted,
}

impl ProcessorError {
    pub fn failed(message: impl std::fmt::Display) -> Self {
        ProcessorError::Failed(message.to_string())
    }
}

#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, payload: &TaskPayload, ctx: &TaskContext) -> Result<ProcessorOutput, ProcessorError>;
}

/// Typed processor for one payload variant.
///
/// ```ignore
/// struct DateExtractor;
///
/// #[async_trait]
/// impl PayloadProcessor for DateExtractor {
///     type Payload = DocTask;
///     const TASK_TYPE: TaskType = TaskType::Date;
///
///     fn extract(payload: &TaskPayload) -> Option<&DocTask> {
///         match payload { TaskPayload::Date(t) => Some(t), _ => None }
///     }
///
///     async fn run(&self, task: &DocTask, ctx: &TaskContext) -> Result<ProcessorOutput, ProcessorError> { ... }
/// }
///
/// registry.register(TaskType::Date, Typed(DateExtractor))?;
/// ```
#[async_trait]
pub trait PayloadProcessor: Send + Sync {
    type Payload: Send + Sync;
    const TASK_TYPE: TaskType;

    fn extract(payload: &TaskPayload) -> Option<&Self::Payload>;

    async fn run(&self, payload: &Self::Payload, ctx: &TaskContext) -> Result<ProcessorOutput, ProcessorError>;
}

/// Adapter from `PayloadProcessor` to `Processor`.
pub struct Typed<P>(pub P);

#[async_trait]
impl<P: PayloadProcessor> Processor for Typed<P> {
    async fn process(&self, payload: &TaskPayload, ctx: &TaskContext) -> Result<ProcessorOutput, ProcessorError> {
        let typed = P::extract(payload).ok_or(ProcessorError::InvalidPayload {
            expected: P::TASK_TYPE,
            got: payload.task_type(),
        })?;
        self.0.run(typed, ctx).await
    }
}
