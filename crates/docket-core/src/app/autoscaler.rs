//! Autoscaler - resizes the worker pool from queue depth.
//!
//! `desired = ceil(depth / tasks_per_worker)` clamped to
//! `[min_workers, max_workers]`. Disabled outside environments that allow
//! autoscaling.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::jobs::ScheduledJobs;
use crate::app::task_queue::TaskQueue;
use crate::config::{AutoscalerConfig, Environment};
use crate::domain::{DomainEvent, Result};
use crate::ports::{EventSink, WorkerPool};

/// Anything with a QUEUED + IN_PROGRESS count.
#[async_trait]
pub trait QueueDepth: Send + Sync {
    async fn depth(&self) -> Result<u64>;
}

#[async_trait]
impl QueueDepth for TaskQueue {
    async fn depth(&self) -> Result<u64> {
        TaskQueue::depth(self).await
    }
}

#[async_trait]
impl QueueDepth for ScheduledJobs {
    async fn depth(&self) -> Result<u64> {
        ScheduledJobs::depth(self).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    Disabled,
    Unchanged { size: usize },
    Resized { from: usize, to: usize },
}

pub fn desired_size(depth: u64, config: &AutoscalerConfig) -> usize {
    let per_worker = config.tasks_per_worker.max(1);
    let wanted = usize::try_from(depth.div_ceil(per_worker)).unwrap_or(usize::MAX);
    wanted.clamp(config.min_workers, config.max_workers)
}

pub struct Autoscaler {
    depth: Arc<dyn QueueDepth>,
    pool: Arc<dyn WorkerPool>,
    events: Arc<dyn EventSink>,
    environment: Environment,
    config: AutoscalerConfig,
}

impl Autoscaler {
    pub fn new(
        depth: Arc<dyn QueueDepth>,
        pool: Arc<dyn WorkerPool>,
        events: Arc<dyn EventSink>,
        environment: Environment,
        config: AutoscalerConfig,
    ) -> Self {
        Self {
            depth,
            pool,
            events,
            environment,
            config,
        }
    }

    pub async fn tick(&self) -> Result<ScaleDecision> {
        if !self.environment.allows_autoscaling() {
            return Ok(ScaleDecision::Disabled);
        }

        let depth = self.depth.depth().await?;
        let current = self.pool.size().await;
        let desired = desired_size(depth, &self.config);
        if desired == current {
            debug!(depth, size = current, "pool size unchanged");
            return Ok(ScaleDecision::Unchanged { size: current });
        }

        self.pool.resize(desired).await?;
        info!(depth, from = current, to = desired, "worker pool resized");
        self.events
            .emit(DomainEvent::PoolResized {
                from: current,
                to: desired,
                depth,
            })
            .await;
        Ok(ScaleDecision::Resized {
            from: current,
            to: desired,
        })
    }

    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        if !self.environment.allows_autoscaling() {
            info!(environment = ?self.environment, "autoscaling disabled");
            return;
        }
        info!(interval = ?self.config.interval(), "autoscaler started");
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.tick().await {
                warn!(error = %e, "autoscaler tick failed");
            }
        }
        info!("autoscaler stopped");
    }
}
