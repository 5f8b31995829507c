//! WorkerPool port - something the autoscaler can resize.

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("pool is shutting down")]
    ShuttingDown,

    #[error("resize to {requested} failed: {reason}")]
    ResizeFailed { requested: usize, reason: String },
}

#[async_trait]
pub trait WorkerPool: Send + Sync {
    async fn size(&self) -> usize;

    async fn resize(&self, target: usize) -> Result<(), PoolError>;
}
