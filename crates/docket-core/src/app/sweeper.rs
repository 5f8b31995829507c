//! Sweeper - recovers scrape jobs whose worker stopped heartbeating.
//!
//! Runs on its own timer, independent of the scheduler. A hung job is put
//! back in the queue under the same id; the dead worker is never contacted.

use std::sync::Arc;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::jobs::ScheduledJobs;
use crate::config::SweeperConfig;
use crate::domain::{Result, ScheduledJob};

pub struct Sweeper {
    jobs: Arc<ScheduledJobs>,
    config: SweeperConfig,
}

impl Sweeper {
    pub fn new(jobs: Arc<ScheduledJobs>, config: SweeperConfig) -> Self {
        Self { jobs, config }
    }

    pub async fn sweep(&self) -> Result<Vec<ScheduledJob>> {
        let requeued = self.jobs.sweep_hung(self.config.stale_after()).await?;
        if !requeued.is_empty() {
            info!(count = requeued.len(), "sweep requeued hung jobs");
        }
        Ok(requeued)
    }

    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(interval = ?self.config.interval(), "sweeper started");
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.sweep().await {
                warn!(error = %e, "sweep failed");
            }
        }
        info!("sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::jobs::tests::fixture;
    use crate::domain::{JobStatus, SiteId};
    use chrono::Duration;

    #[tokio::test]
    async fn requeues_only_stale_jobs() {
        let f = fixture();
        let sweeper = Sweeper::new(f.jobs.clone(), SweeperConfig::default());

        let stale = f.jobs.enqueue_unique(&SiteId::new("a"), "cron").await.unwrap().unwrap();
        f.jobs.claim_next("w1").await.unwrap();
        let fresh = f.jobs.enqueue_unique(&SiteId::new("b"), "cron").await.unwrap().unwrap();
        f.jobs.claim_next("w2").await.unwrap();

        f.clock.advance(Duration::seconds(601));
        f.jobs.heartbeat(fresh, "w2").await.unwrap();

        let requeued = sweeper.sweep().await.unwrap();
        assert_eq!(requeued.iter().map(|j| j.id).collect::<Vec<_>>(), vec![stale]);
        assert_eq!(f.jobs.get(stale).await.unwrap().status, JobStatus::Queued);
        assert_eq!(f.jobs.get(fresh).await.unwrap().status, JobStatus::InProgress);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let f = fixture();
        let sweeper = Arc::new(Sweeper::new(f.jobs.clone(), SweeperConfig::default()));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(sweeper.run(shutdown.clone()));
        shutdown.cancel();
        handle.await.unwrap();
    }
}
