//! ScheduledJobs - scrape job lifecycle shared by the scheduler, the sweeper
//! and the scraping workers.
//!
//! Uniqueness (one active job per site) rests on a single `update_one` upsert
//! whose filter is "an active job for this site exists". Every other
//! transition is a lease claim on the job document.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, warn};

use crate::domain::{DocketError, DomainEvent, JobId, JobStatus, Result, ScheduledJob, SiteId};
use crate::lease::Lease;
use crate::ports::store::DocumentStore;
use crate::ports::{Clock, EventSink, IdGenerator};

/// How many QUEUED candidates `claim_next` races for per call.
const CLAIM_CANDIDATES: usize = 8;

/// How a worker left a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Finished,
    Failed(String),
    Canceled,
}

impl JobOutcome {
    fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Finished => JobStatus::Finished,
            JobOutcome::Failed(_) => JobStatus::Failed,
            JobOutcome::Canceled => JobStatus::Canceled,
        }
    }
}

pub struct ScheduledJobs {
    store: Arc<dyn DocumentStore<ScheduledJob>>,
    lease: Lease<ScheduledJob>,
    ids: Arc<dyn IdGenerator>,
    events: Arc<dyn EventSink>,
}

impl ScheduledJobs {
    pub fn new(
        store: Arc<dyn DocumentStore<ScheduledJob>>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            lease: Lease::new(store.clone(), clock),
            store,
            ids,
            events,
        }
    }

    /// Insert a QUEUED job for `site` unless one is already active.
    ///
    /// Returns the new job's id, or `None` when the site already had an
    /// active job.
    pub async fn enqueue_unique(&self, site: &SiteId, trigger: &str) -> Result<Option<JobId>> {
        let job = ScheduledJob::queued(self.ids.generate_job_id(), site.clone(), trigger, self.lease.now());
        let key = site.clone();
        let outcome = self
            .store
            .update_one(
                Box::new(move |j: &ScheduledJob| j.site_id == key && j.status.is_active()),
                Box::new(|_: &mut ScheduledJob| {}),
                Some(job.clone()),
            )
            .await?;

        if outcome.upserted_id.is_none() {
            debug!(site_id = %site, trigger, "site already has an active job");
            return Ok(None);
        }
        info!(job_id = %job.id, site_id = %site, trigger, "job scheduled");
        self.events
            .emit(DomainEvent::JobScheduled {
                job_id: job.id,
                site_id: site.clone(),
                trigger: trigger.to_string(),
            })
            .await;
        Ok(Some(job.id))
    }

    pub async fn get(&self, id: JobId) -> Result<ScheduledJob> {
        self.store
            .get(&id)
            .await?
            .ok_or_else(|| DocketError::not_found("job", id))
    }

    /// Claim the oldest QUEUED job for `worker`.
    pub async fn claim_next(&self, worker: &str) -> Result<Option<ScheduledJob>> {
        let candidates = self
            .store
            .find(
                Box::new(|j: &ScheduledJob| j.status == JobStatus::Queued),
                Some(Box::new(|a: &ScheduledJob, b: &ScheduledJob| {
                    a.queued_time.cmp(&b.queued_time).then(a.id.cmp(&b.id))
                })),
                Some(CLAIM_CANDIDATES),
            )
            .await?;

        for candidate in candidates {
            let worker_id = worker.to_string();
            let claimed = self
                .lease
                .try_claim(
                    &candidate.id,
                    |j: &ScheduledJob, _| j.status == JobStatus::Queued,
                    move |j: &mut ScheduledJob, now| {
                        j.status = JobStatus::InProgress;
                        j.worker_id = Some(worker_id.clone());
                        j.started_at = Some(now);
                        j.last_active = Some(now);
                    },
                )
                .await?;
            if let Some(job) = claimed {
                info!(job_id = %job.id, site_id = %job.site_id, worker_id = worker, "job claimed");
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    /// Refresh `last_active`. Returns the job's status while `worker` still
    /// owns it; `Some(Canceling)` tells the worker to wind down.
    pub async fn heartbeat(&self, id: JobId, worker: &str) -> Result<Option<JobStatus>> {
        let owner = worker.to_string();
        let beat = self
            .lease
            .try_claim(
                &id,
                move |j: &ScheduledJob, _| {
                    matches!(j.status, JobStatus::InProgress | JobStatus::Canceling)
                        && j.worker_id.as_deref() == Some(owner.as_str())
                },
                |j: &mut ScheduledJob, now| j.last_active = Some(now),
            )
            .await?;
        if beat.is_none() {
            warn!(job_id = %id, worker_id = worker, "job heartbeat rejected");
        }
        Ok(beat.map(|j| j.status))
    }

    /// Record how `worker` left the job. `false` when it no longer owned it.
    pub async fn complete(&self, id: JobId, worker: &str, outcome: JobOutcome) -> Result<bool> {
        let owner = worker.to_string();
        let status = outcome.status();
        let error = match &outcome {
            JobOutcome::Failed(e) => Some(e.clone()),
            _ => None,
        };
        let done = self
            .lease
            .try_claim(
                &id,
                move |j: &ScheduledJob, _| j.status.is_active() && j.worker_id.as_deref() == Some(owner.as_str()),
                move |j: &mut ScheduledJob, now| {
                    j.status = status;
                    j.completed_at = Some(now);
                    j.last_active = Some(now);
                    j.error = error.clone();
                },
            )
            .await?;

        match &done {
            Some(job) => info!(job_id = %id, site_id = %job.site_id, status = ?status, "job completed"),
            None => warn!(job_id = %id, worker_id = worker, "completion for job not held, ignored"),
        }
        Ok(done.is_some())
    }

    /// QUEUED jobs are canceled outright; running ones move to CANCELING and
    /// the worker sees it on its next heartbeat.
    pub async fn request_cancel(&self, id: JobId) -> Result<Option<JobStatus>> {
        let updated = self
            .lease
            .try_claim(
                &id,
                |j: &ScheduledJob, _| matches!(j.status, JobStatus::Queued | JobStatus::InProgress),
                |j: &mut ScheduledJob, now| {
                    if j.status == JobStatus::Queued {
                        j.status = JobStatus::Canceled;
                        j.completed_at = Some(now);
                    } else {
                        j.status = JobStatus::Canceling;
                    }
                },
            )
            .await?;
        match updated {
            Some(job) => {
                info!(job_id = %id, status = ?job.status, "cancel requested");
                Ok(Some(job.status))
            }
            None => {
                // distinguish "no such job" from "nothing to cancel"
                self.get(id).await?;
                Ok(None)
            }
        }
    }

    /// Requeue IN_PROGRESS/CANCELING jobs whose heartbeat is older than
    /// `stale_after` (or missing), under the same id.
    pub async fn sweep_hung(&self, stale_after: Duration) -> Result<Vec<ScheduledJob>> {
        let now = self.lease.now();
        let hung = self
            .store
            .find(Box::new(move |j: &ScheduledJob| j.is_hung(now, stale_after)), None, None)
            .await?;

        let mut requeued = Vec::new();
        for job in hung {
            let claimed = self
                .lease
                .try_claim(
                    &job.id,
                    move |j: &ScheduledJob, now| j.is_hung(now, stale_after),
                    |j: &mut ScheduledJob, now| j.requeue(now),
                )
                .await?;
            let Some(fresh) = claimed else {
                // heartbeat arrived in between
                continue;
            };
            warn!(
                job_id = %fresh.id,
                site_id = %fresh.site_id,
                worker_id = ?job.worker_id,
                last_active = ?job.last_active,
                requeues = fresh.requeues,
                "hung job requeued"
            );
            self.events
                .emit(DomainEvent::JobRequeued {
                    job_id: fresh.id,
                    site_id: fresh.site_id.clone(),
                    last_active: job.last_active,
                })
                .await;
            requeued.push(fresh);
        }
        Ok(requeued)
    }

    /// Jobs for `site`, newest first.
    pub async fn for_site(&self, site: &SiteId) -> Result<Vec<ScheduledJob>> {
        let site = site.clone();
        Ok(self
            .store
            .find(
                Box::new(move |j: &ScheduledJob| j.site_id == site),
                Some(Box::new(|a: &ScheduledJob, b: &ScheduledJob| b.queued_time.cmp(&a.queued_time))),
                None,
            )
            .await?)
    }

    /// QUEUED + IN_PROGRESS.
    pub async fn depth(&self) -> Result<u64> {
        Ok(self
            .store
            .count(Box::new(|j: &ScheduledJob| {
                matches!(j.status, JobStatus::Queued | JobStatus::InProgress)
            }))
            .await?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::impls::InMemoryStore;
    use crate::ports::{FixedClock, NoopEventSink, UlidGenerator};
    use chrono::{TimeZone, Utc};

    pub(crate) struct Fixture {
        pub jobs: Arc<ScheduledJobs>,
        pub store: Arc<InMemoryStore<ScheduledJob>>,
        pub clock: FixedClock,
    }

    pub(crate) fn fixture() -> Fixture {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
        let store = Arc::new(InMemoryStore::<ScheduledJob>::new());
        let jobs = Arc::new(ScheduledJobs::new(
            store.clone(),
            Arc::new(UlidGenerator::new(clock.clone())),
            Arc::new(clock.clone()),
            Arc::new(NoopEventSink),
        ));
        Fixture { jobs, store, clock }
    }

    fn site(id: &str) -> SiteId {
        SiteId::new(id)
    }

    #[tokio::test]
    async fn concurrent_enqueues_create_one_job() {
        let f = fixture();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let jobs = f.jobs.clone();
            handles.push(tokio::spawn(async move { jobs.enqueue_unique(&site("s1"), "cron").await.unwrap() }));
        }
        let mut created = 0;
        for h in handles {
            if h.await.unwrap().is_some() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(f.store.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn finished_job_allows_a_new_one() {
        let f = fixture();
        let first = f.jobs.enqueue_unique(&site("s1"), "cron").await.unwrap().unwrap();
        assert!(f.jobs.enqueue_unique(&site("s1"), "manual").await.unwrap().is_none());

        let job = f.jobs.claim_next("scraper-1").await.unwrap().unwrap();
        assert_eq!(job.id, first);
        assert!(f.jobs.complete(first, "scraper-1", JobOutcome::Finished).await.unwrap());

        let second = f.jobs.enqueue_unique(&site("s1"), "manual").await.unwrap();
        assert!(second.is_some_and(|id| id != first));
    }

    #[tokio::test]
    async fn claim_next_takes_oldest_once() {
        let f = fixture();
        let older = f.jobs.enqueue_unique(&site("a"), "cron").await.unwrap().unwrap();
        f.clock.advance(Duration::seconds(5));
        f.jobs.enqueue_unique(&site("b"), "cron").await.unwrap().unwrap();

        let first = f.jobs.claim_next("w1").await.unwrap().unwrap();
        assert_eq!(first.id, older);
        assert_eq!(first.status, JobStatus::InProgress);
        let second = f.jobs.claim_next("w2").await.unwrap().unwrap();
        assert_ne!(second.id, older);
        assert!(f.jobs.claim_next("w3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn heartbeat_and_complete_require_ownership() {
        let f = fixture();
        let id = f.jobs.enqueue_unique(&site("a"), "cron").await.unwrap().unwrap();
        f.jobs.claim_next("w1").await.unwrap().unwrap();

        assert_eq!(f.jobs.heartbeat(id, "w1").await.unwrap(), Some(JobStatus::InProgress));
        assert_eq!(f.jobs.heartbeat(id, "w2").await.unwrap(), None);
        assert!(!f.jobs.complete(id, "w2", JobOutcome::Finished).await.unwrap());

        assert!(f.jobs.complete(id, "w1", JobOutcome::Failed("timeout".into())).await.unwrap());
        let job = f.jobs.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn cancel_queued_and_running_jobs() {
        let f = fixture();
        let queued = f.jobs.enqueue_unique(&site("a"), "cron").await.unwrap().unwrap();
        assert_eq!(f.jobs.request_cancel(queued).await.unwrap(), Some(JobStatus::Canceled));

        let running = f.jobs.enqueue_unique(&site("b"), "cron").await.unwrap().unwrap();
        f.jobs.claim_next("w1").await.unwrap().unwrap();
        assert_eq!(f.jobs.request_cancel(running).await.unwrap(), Some(JobStatus::Canceling));
        assert_eq!(f.jobs.heartbeat(running, "w1").await.unwrap(), Some(JobStatus::Canceling));
        assert!(f.jobs.complete(running, "w1", JobOutcome::Canceled).await.unwrap());

        assert_eq!(f.jobs.request_cancel(running).await.unwrap(), None);
        let missing = f.jobs.request_cancel(JobId::from(ulid::Ulid::new())).await;
        assert!(matches!(missing, Err(DocketError::NotFound { kind: "job", .. })));
    }

    #[tokio::test]
    async fn sweep_requeues_stale_and_leaves_fresh() {
        let f = fixture();
        let stale = f.jobs.enqueue_unique(&site("stale"), "cron").await.unwrap().unwrap();
        f.jobs.claim_next("w1").await.unwrap().unwrap();
        f.clock.advance(Duration::seconds(1));
        let fresh = f.jobs.enqueue_unique(&site("fresh"), "cron").await.unwrap().unwrap();
        f.jobs.claim_next("w2").await.unwrap().unwrap();

        f.clock.advance(Duration::seconds(600));
        f.jobs.heartbeat(fresh, "w2").await.unwrap();
        f.clock.advance(Duration::seconds(5));

        let requeued = f.jobs.sweep_hung(Duration::seconds(600)).await.unwrap();
        assert_eq!(requeued.len(), 1);
        assert_eq!(requeued[0].id, stale);
        assert_eq!(requeued[0].status, JobStatus::Queued);
        assert_eq!(requeued[0].requeues, 1);
        assert_eq!(f.jobs.get(fresh).await.unwrap().status, JobStatus::InProgress);

        // same id goes back through the queue
        let again = f.jobs.claim_next("w3").await.unwrap().unwrap();
        assert_eq!(again.id, stale);
        assert_eq!(f.jobs.depth().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn sweep_requeues_canceling_without_heartbeat() {
        let f = fixture();
        let id = f.jobs.enqueue_unique(&site("a"), "cron").await.unwrap().unwrap();
        f.jobs.claim_next("w1").await.unwrap().unwrap();
        f.jobs.request_cancel(id).await.unwrap();
        f.store
            .update_one(
                Box::new(|_: &ScheduledJob| true),
                Box::new(|j: &mut ScheduledJob| j.last_active = None),
                None,
            )
            .await
            .unwrap();

        let requeued = f.jobs.sweep_hung(Duration::seconds(600)).await.unwrap();
        assert_eq!(requeued.len(), 1);
        assert!(f.jobs.sweep_hung(Duration::seconds(600)).await.unwrap().is_empty());
    }
}
