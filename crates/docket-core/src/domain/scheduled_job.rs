//! ScheduledJob - one scrape run for a site.
//!
//! At most one job per site may be active (QUEUED, IN_PROGRESS or CANCELING).
//! That is enforced by the unique-enqueue upsert, not by this type.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::document::Document;
use super::ids::{JobId, SiteId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    InProgress,
    Canceling,
    Canceled,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn is_active(self) -> bool {
        matches!(
            self,
            JobStatus::Queued | JobStatus::InProgress | JobStatus::Canceling
        )
    }

    /// States a worker can leave a job in when it stops.
    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: JobId,
    pub site_id: SiteId,
    pub queued_time: DateTime<Utc>,
    pub status: JobStatus,
    pub last_active: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,

    /// What created the job ("cron", "manual", ...).
    pub trigger: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,

    /// Times the hung-task sweep has put this job back in the queue.
    #[serde(default)]
    pub requeues: u32,
}

impl ScheduledJob {
    pub fn queued(id: JobId, site_id: SiteId, trigger: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            site_id,
            queued_time: now,
            status: JobStatus::Queued,
            last_active: None,
            worker_id: None,
            trigger: trigger.into(),
            started_at: None,
            completed_at: None,
            error: None,
            requeues: 0,
        }
    }

    /// IN_PROGRESS/CANCELING with a missing or stale heartbeat.
    pub fn is_hung(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        if !matches!(self.status, JobStatus::InProgress | JobStatus::Canceling) {
            return false;
        }
        match self.last_active {
            Some(at) => now - at > stale_after,
            None => true,
        }
    }

    /// Put the job back in the queue under the same id.
    pub fn requeue(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Queued;
        self.queued_time = now;
        self.last_active = None;
        self.worker_id = None;
        self.started_at = None;
        self.requeues += 1;
    }
}

impl Document for ScheduledJob {
    type Id = JobId;

    fn id(&self) -> &JobId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use ulid::Ulid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn job(status: JobStatus, last_active: Option<i64>) -> ScheduledJob {
        let mut job = ScheduledJob::queued(JobId::from_ulid(Ulid::new()), SiteId::new("s1"), "cron", now());
        job.status = status;
        job.last_active = last_active.map(|secs| now() - Duration::seconds(secs));
        job
    }

    #[rstest]
    #[case::stale(JobStatus::InProgress, Some(700), true)]
    #[case::missing(JobStatus::InProgress, None, true)]
    #[case::fresh(JobStatus::InProgress, Some(30), false)]
    #[case::canceling_stale(JobStatus::Canceling, Some(700), true)]
    #[case::queued(JobStatus::Queued, None, false)]
    #[case::finished(JobStatus::Finished, Some(700), false)]
    fn hung_detection(#[case] status: JobStatus, #[case] last_active: Option<i64>, #[case] hung: bool) {
        assert_eq!(job(status, last_active).is_hung(now(), Duration::seconds(600)), hung);
    }

    #[test]
    fn requeue_keeps_id_and_clears_worker() {
        let mut j = job(JobStatus::InProgress, Some(700));
        j.worker_id = Some("w1".into());
        let id = j.id;
        j.requeue(now());

        assert_eq!(j.id, id);
        assert_eq!(j.status, JobStatus::Queued);
        assert_eq!(j.worker_id, None);
        assert_eq!(j.requeues, 1);
    }
}
