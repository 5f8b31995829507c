//! Scheduler - fires scrape jobs for sites whose cron matches the current minute.
//!
//! Any number of schedulers may tick concurrently; duplicates are absorbed by
//! `ScheduledJobs::enqueue_unique`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::jobs::ScheduledJobs;
use crate::config::SchedulerConfig;
use crate::domain::{CronSpec, JobId, Result, Site};
use crate::ports::store::DocumentStore;
use crate::ports::Clock;

pub const CRON_TRIGGER: &str = "cron";

pub struct Scheduler {
    sites: Arc<dyn DocumentStore<Site>>,
    jobs: Arc<ScheduledJobs>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        sites: Arc<dyn DocumentStore<Site>>,
        jobs: Arc<ScheduledJobs>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            sites,
            jobs,
            clock,
            config,
        }
    }

    /// Sites due at `now`: enabled, with an active endpoint, and a cron spec
    /// in the `{*, literal}` cross product for `now`.
    pub async fn due_sites(&self, now: DateTime<Utc>) -> Result<Vec<Site>> {
        let candidates: HashSet<CronSpec> = CronSpec::candidates(now).into_iter().collect();
        let sites = self
            .sites
            .find(Box::new(|s: &Site| s.enabled && s.has_active_endpoint()), None, None)
            .await?;

        let mut due = Vec::new();
        for site in sites {
            match site.cron_spec() {
                Ok(spec) if candidates.contains(&spec) => due.push(site),
                Ok(_) => {}
                Err(e) => warn!(site_id = %site.id, cron = %site.cron, error = %e, "invalid cron spec, skipping site"),
            }
        }
        Ok(due)
    }

    /// One scheduling pass. Returns the jobs created by this tick.
    pub async fn tick(&self) -> Result<Vec<JobId>> {
        let now = self.clock.now();
        let debounce_from = now - self.config.debounce();
        let mut created = Vec::new();

        for site in self.due_sites(now).await? {
            let recent = self
                .jobs
                .for_site(&site.id)
                .await?
                .into_iter()
                .any(|job| job.queued_time > debounce_from);
            if recent {
                debug!(site_id = %site.id, "fired recently, debounced");
                continue;
            }
            if let Some(job_id) = self.jobs.enqueue_unique(&site.id, CRON_TRIGGER).await? {
                created.push(job_id);
            }
        }

        if !created.is_empty() {
            info!(count = created.len(), "scheduler tick created jobs");
        }
        Ok(created)
    }

    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(interval = ?self.config.tick_interval(), "scheduler started");
        let mut ticker = interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.tick().await {
                warn!(error = %e, "scheduler tick failed");
            }
        }
        info!("scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::jobs::tests::fixture;
    use crate::app::jobs::JobOutcome;
    use crate::domain::{Endpoint, SiteId};
    use crate::impls::InMemoryStore;
    use chrono::Duration;

    fn site(id: &str, cron: &str) -> Site {
        Site {
            id: SiteId::new(id),
            name: id.to_string(),
            cron: cron.to_string(),
            enabled: true,
            endpoints: vec![Endpoint {
                url: format!("https://{id}.example/feed"),
                active: true,
            }],
        }
    }

    fn scheduler(sites: Vec<Site>) -> (Arc<Scheduler>, crate::app::jobs::tests::Fixture) {
        let f = fixture();
        let scheduler = Arc::new(Scheduler::new(
            Arc::new(InMemoryStore::with_documents(sites)),
            f.jobs.clone(),
            Arc::new(f.clock.clone()),
            SchedulerConfig::default(),
        ));
        (scheduler, f)
    }

    #[tokio::test]
    async fn selects_due_enabled_sites_with_endpoints() {
        let mut disabled = site("disabled", "0 12 * * *");
        disabled.enabled = false;
        let mut no_endpoint = site("dark", "0 12 * * *");
        no_endpoint.endpoints[0].active = false;
        let sites = vec![
            site("noon", "0 12 * * *"),
            site("every", "* * * * *"),
            site("later", "30 12 * * *"),
            site("broken", "61 * * * *"),
            disabled,
            no_endpoint,
        ];
        let (scheduler, f) = scheduler(sites);

        let mut due: Vec<String> = scheduler
            .due_sites(f.clock.now())
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id.to_string())
            .collect();
        due.sort();
        assert_eq!(due, vec!["every", "noon"]);
    }

    #[tokio::test]
    async fn concurrent_ticks_create_one_job() {
        let (scheduler, f) = scheduler(vec![site("noon", "0 12 * * *")]);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let s = scheduler.clone();
            handles.push(tokio::spawn(async move { s.tick().await.unwrap().len() }));
        }
        let mut total = 0;
        for h in handles {
            total += h.await.unwrap();
        }
        assert_eq!(total, 1);
        assert_eq!(f.store.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn recently_fired_site_is_debounced() {
        let (scheduler, f) = scheduler(vec![site("every", "* * * * *")]);
        let first = scheduler.tick().await.unwrap();
        assert_eq!(first.len(), 1);

        let job = f.jobs.claim_next("w1").await.unwrap().unwrap();
        f.jobs.complete(job.id, "w1", JobOutcome::Finished).await.unwrap();
        f.clock.advance(Duration::seconds(30));
        assert!(scheduler.tick().await.unwrap().is_empty());

        f.clock.advance(Duration::seconds(31));
        assert_eq!(scheduler.tick().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn active_job_blocks_refire() {
        let (scheduler, f) = scheduler(vec![site("every", "* * * * *")]);
        scheduler.tick().await.unwrap();
        f.jobs.claim_next("w1").await.unwrap().unwrap();

        f.clock.advance(Duration::minutes(5));
        assert!(scheduler.tick().await.unwrap().is_empty());
    }
}
