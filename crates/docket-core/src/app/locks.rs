//! LockManager - per-item TTL locks for human work queues.
//!
//! Locks live on the work item itself (`locks: [{work_queue_id, user_id,
//! expires}]`). Every decision that establishes or moves ownership is a single
//! `atomic_lock_update` whose filter checks liveness against `now` read from
//! the clock at the moment the call is built.
//!
//! # Acquire
//! 1. prune expired entries (best effort)
//! 2. renew: live lock for (queue, user) -> extend to `now + grace`
//! 3. claim: no live lock for queue -> append a new lock
//! 4. otherwise report the foreign lock
//!
//! # Submit with reassignment
//! The destination lock is taken before the source lock is dropped, so the
//! item always carries a live lock in one of the two queues.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::app::work_queues::{BoundQueue, WorkQueueRegistry};
use crate::config::TakeNextConfig;
use crate::domain::{Comment, DocketError, ItemId, ItemLock, QueueName, Result, UserId, WorkItem};
use crate::domain::DomainEvent;
use crate::ports::store::DocumentStore;
use crate::ports::{Clock, EventSink, IdGenerator, WorkItemRepository};

/// Lifetime of a lock handed to another reviewer on reassignment.
pub fn reassignment_grace() -> Duration {
    Duration::days(365)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockAttempt {
    pub acquired: bool,
    /// The caller's lock when `acquired`.
    pub lock: Option<ItemLock>,
    /// The foreign live lock when not `acquired`, for display.
    pub conflict: Option<ItemLock>,
}

impl LockAttempt {
    fn won(lock: ItemLock) -> Self {
        Self {
            acquired: true,
            lock: Some(lock),
            conflict: None,
        }
    }

    fn lost(conflict: Option<ItemLock>) -> Self {
        Self {
            acquired: false,
            lock: None,
            conflict,
        }
    }

    /// `LockConflict` when another holder is live.
    pub fn into_result(self) -> Result<Option<ItemLock>> {
        match (self.lock, self.conflict) {
            (Some(lock), _) => Ok(Some(lock)),
            (None, Some(other)) => Err(DocketError::LockConflict {
                holder: other.user_id.to_string(),
                expires: other.expires,
            }),
            (None, None) => Ok(None),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub queue: QueueName,
    pub item: ItemId,
    pub user: UserId,
    pub action: String,
    /// Applied after the action's own updates.
    pub updates: Map<String, Value>,
    pub reassign_to: Option<(QueueName, UserId)>,
    pub comment: Option<String>,
}

impl Submission {
    pub fn new(
        queue: impl Into<QueueName>,
        item: impl Into<ItemId>,
        user: impl Into<UserId>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            queue: queue.into(),
            item: item.into(),
            user: user.into(),
            action: action.into(),
            updates: Map::new(),
            reassign_to: None,
            comment: None,
        }
    }

    pub fn with_updates(mut self, updates: Map<String, Value>) -> Self {
        self.updates = updates;
        self
    }

    pub fn reassign(mut self, queue: impl Into<QueueName>, user: impl Into<UserId>) -> Self {
        self.reassign_to = Some((queue.into(), user.into()));
        self
    }

    pub fn with_comment(mut self, text: impl Into<String>) -> Self {
        self.comment = Some(text.into());
        self
    }
}

pub struct LockManager {
    queues: WorkQueueRegistry,
    comments: Arc<dyn DocumentStore<Comment>>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    take_next: TakeNextConfig,
}

impl LockManager {
    pub fn new(
        queues: WorkQueueRegistry,
        comments: Arc<dyn DocumentStore<Comment>>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
        take_next: TakeNextConfig,
    ) -> Self {
        Self {
            queues,
            comments,
            ids,
            clock,
            events,
            take_next,
        }
    }

    pub fn queues(&self) -> &WorkQueueRegistry {
        &self.queues
    }

    /// Acquire or renew the lock on `item` in `queue` for `user`, with the
    /// queue's grace period.
    pub async fn attempt_lock_acquire(&self, queue: &QueueName, item: &ItemId, user: &UserId) -> Result<LockAttempt> {
        let bound = self.queues.get(queue)?;
        self.acquire(bound, item, user).await
    }

    /// Claim the first eligible unlocked item, retrying a bounded number of
    /// times when another reviewer wins the race for the same candidate.
    pub async fn take_next(&self, queue: &QueueName, user: &UserId) -> Result<Option<ItemId>> {
        let bound = self.queues.get(queue)?;
        let def = &bound.definition;

        for attempt in 1..=self.take_next.attempts {
            let candidates = bound
                .items
                .project_id_only(&def.document_query, &def.sort_query, queue, self.clock.now(), Some(1))
                .await?;
            let Some(candidate) = candidates.into_iter().next() else {
                debug!(%queue, %user, "no eligible items");
                return Ok(None);
            };

            if self.acquire(bound, &candidate, user).await?.acquired {
                return Ok(Some(candidate));
            }
            debug!(%queue, %user, item = %candidate, attempt, "lost race for candidate");
            if attempt < self.take_next.attempts {
                tokio::time::sleep(self.take_next.delay()).await;
            }
        }

        info!(%queue, %user, attempts = self.take_next.attempts, "take_next gave up");
        Ok(None)
    }

    /// Apply a submit action. The caller must hold the lock.
    pub async fn submit(&self, submission: Submission) -> Result<WorkItem> {
        let Submission {
            queue,
            item,
            user,
            action,
            updates,
            reassign_to,
            comment,
        } = submission;

        let bound = self.queues.get(&queue)?;
        let Some(submit_action) = bound.definition.action(&action) else {
            return Err(DocketError::UnknownAction {
                queue: queue.to_string(),
                action,
            });
        };
        if reassign_to.is_some() && !submit_action.reassignable {
            return Err(DocketError::NotReassignable(action));
        }
        if let Some((dest, _)) = &reassign_to
            && dest != &queue
        {
            self.queues.get(dest)?;
        }

        // holding is verified by renewal
        if self.renew(&bound.items, &queue, &item, &user, bound.definition.grace_period()).await?.is_none() {
            return Err(self.not_held(&bound.items, &queue, &item, &user).await);
        }

        let mut merged = submit_action.updates.clone();
        merged.extend(updates);
        let now = self.clock.now();
        let (q, u) = (queue.clone(), user.clone());
        let mut current = bound
            .items
            .atomic_lock_update(
                &item,
                Box::new(move |w: &WorkItem| w.is_held_by(&q, &u, now)),
                Box::new(move |w: &mut WorkItem| w.apply_updates(&merged)),
            )
            .await?
            .ok_or_else(|| lock_not_held(&queue, &item, &user))?;

        match &reassign_to {
            Some((dest_queue, dest_user)) if dest_queue == &queue => {
                current = self.swap_holder(&bound.items, &queue, &item, &user, dest_user).await?;
            }
            Some((dest_queue, dest_user)) => {
                self.preclaim(&bound.items, dest_queue, &item, dest_user).await?;
                current = self.drop_lock(&bound.items, &queue, &item, &user).await?.unwrap_or(current);
            }
            None => {
                current = self.drop_lock(&bound.items, &queue, &item, &user).await?.unwrap_or(current);
            }
        }

        if let Some(text) = comment {
            self.comments
                .insert(Comment {
                    id: self.ids.generate_comment_id(),
                    item_id: item.clone(),
                    queue: queue.clone(),
                    user_id: user.clone(),
                    action: action.clone(),
                    text,
                    created_at: self.clock.now(),
                })
                .await?;
        }

        info!(%queue, %item, %user, action = %action, reassigned = reassign_to.is_some(), "item submitted");
        self.events
            .emit(DomainEvent::ItemSubmitted {
                queue,
                item,
                user,
                action,
                reassigned_to: reassign_to,
            })
            .await;
        Ok(current)
    }

    /// Give up a held lock. `false` when the caller did not hold it.
    pub async fn release(&self, queue: &QueueName, item: &ItemId, user: &UserId) -> Result<bool> {
        let bound = self.queues.get(queue)?;
        Ok(self.drop_lock(&bound.items, queue, item, user).await?.is_some())
    }

    /// Live lock on `item` in `queue`, for display.
    pub async fn current_lock(&self, queue: &QueueName, item: &ItemId) -> Result<Option<ItemLock>> {
        let bound = self.queues.get(queue)?;
        let found = bound
            .items
            .get(item)
            .await?
            .ok_or_else(|| DocketError::not_found("work item", item))?;
        Ok(found.live_lock(queue, self.clock.now()).cloned())
    }

    /// Comments left on `item`, oldest first.
    pub async fn comments(&self, item: &ItemId) -> Result<Vec<Comment>> {
        let item = item.clone();
        Ok(self
            .comments
            .find(
                Box::new(move |c: &Comment| c.item_id == item),
                Some(Box::new(|a: &Comment, b: &Comment| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))),
                None,
            )
            .await?)
    }

    async fn acquire(&self, bound: &BoundQueue, item: &ItemId, user: &UserId) -> Result<LockAttempt> {
        let queue = &bound.definition.name;
        let grace = bound.definition.grace_period();
        let items = &bound.items;

        // lazy cleanup; a failure here does not block the claim
        let now = self.clock.now();
        if let Err(e) = items
            .atomic_lock_update(
                item,
                Box::new(move |w: &WorkItem| w.locks.iter().any(|l| !l.is_live(now))),
                Box::new(move |w: &mut WorkItem| {
                    w.prune_expired(now);
                }),
            )
            .await
        {
            warn!(%queue, %item, error = %e, "pruning expired locks failed");
        }

        if let Some(lock) = self.renew(items, queue, item, user, grace).await? {
            debug!(%queue, %item, %user, expires = %lock.expires, "lock renewed");
            return Ok(LockAttempt::won(lock));
        }

        let now = self.clock.now();
        let fresh = ItemLock {
            work_queue_id: queue.clone(),
            user_id: user.clone(),
            expires: now + grace,
        };
        let (q, lock) = (queue.clone(), fresh.clone());
        let claimed = items
            .atomic_lock_update(
                item,
                Box::new(move |w: &WorkItem| w.is_unlocked(&q, now)),
                Box::new(move |w: &mut WorkItem| {
                    w.locks.retain(|l| l.work_queue_id != lock.work_queue_id);
                    w.locks.push(lock.clone());
                }),
            )
            .await?;
        if claimed.is_some() {
            info!(%queue, %item, %user, expires = %fresh.expires, "lock acquired");
            self.events
                .emit(DomainEvent::LockAcquired {
                    queue: queue.clone(),
                    item: item.clone(),
                    user: user.clone(),
                    expires: fresh.expires,
                })
                .await;
            return Ok(LockAttempt::won(fresh));
        }

        let existing = items
            .get(item)
            .await?
            .ok_or_else(|| DocketError::not_found("work item", item))?;
        let now = self.clock.now();
        let conflict = existing.live_lock(queue, now).cloned();
        debug!(
            %queue,
            %item,
            %user,
            holder = ?conflict.as_ref().map(|l| &l.user_id),
            remaining_secs = conflict.as_ref().map(|l| remaining(l, now).num_seconds()),
            "lock held elsewhere"
        );
        Ok(LockAttempt::lost(conflict))
    }

    /// Extend the caller's live lock. Expiry only ever moves forward.
    async fn renew(
        &self,
        items: &Arc<dyn WorkItemRepository>,
        queue: &QueueName,
        item: &ItemId,
        user: &UserId,
        grace: Duration,
    ) -> Result<Option<ItemLock>> {
        let now = self.clock.now();
        let expires = now + grace;
        let (q, u) = (queue.clone(), user.clone());
        let (q2, u2) = (queue.clone(), user.clone());
        let renewed = items
            .atomic_lock_update(
                item,
                Box::new(move |w: &WorkItem| w.is_held_by(&q, &u, now)),
                Box::new(move |w: &mut WorkItem| {
                    for lock in w.locks.iter_mut() {
                        if lock.work_queue_id == q2 && lock.user_id == u2 && lock.is_live(now) {
                            lock.expires = lock.expires.max(expires);
                        }
                    }
                }),
            )
            .await?;
        Ok(renewed.and_then(|w| w.live_lock(queue, now).cloned()))
    }

    /// Take a long-lived lock for `user` in `queue` ahead of a hand-off.
    async fn preclaim(
        &self,
        items: &Arc<dyn WorkItemRepository>,
        queue: &QueueName,
        item: &ItemId,
        user: &UserId,
    ) -> Result<()> {
        let now = self.clock.now();
        let lock = ItemLock {
            work_queue_id: queue.clone(),
            user_id: user.clone(),
            expires: now + reassignment_grace(),
        };
        let (q, u, l) = (queue.clone(), user.clone(), lock.clone());
        let claimed = items
            .atomic_lock_update(
                item,
                Box::new(move |w: &WorkItem| w.is_unlocked(&q, now) || w.is_held_by(&q, &u, now)),
                Box::new(move |w: &mut WorkItem| {
                    w.locks.retain(|x| x.work_queue_id != l.work_queue_id);
                    w.locks.push(l.clone());
                }),
            )
            .await?;
        if claimed.is_some() {
            self.events
                .emit(DomainEvent::LockAcquired {
                    queue: queue.clone(),
                    item: item.clone(),
                    user: user.clone(),
                    expires: lock.expires,
                })
                .await;
            return Ok(());
        }

        let existing = items
            .get(item)
            .await?
            .ok_or_else(|| DocketError::not_found("work item", item))?;
        match existing.live_lock(queue, self.clock.now()) {
            Some(other) => Err(DocketError::LockConflict {
                holder: other.user_id.to_string(),
                expires: other.expires,
            }),
            None => Err(lock_not_held(queue, item, user)),
        }
    }

    /// Hand a same-queue lock to `to` in one update.
    async fn swap_holder(
        &self,
        items: &Arc<dyn WorkItemRepository>,
        queue: &QueueName,
        item: &ItemId,
        from: &UserId,
        to: &UserId,
    ) -> Result<WorkItem> {
        let now = self.clock.now();
        let expires = now + reassignment_grace();
        let (q, f) = (queue.clone(), from.clone());
        let (q2, to2) = (queue.clone(), to.clone());
        let swapped = items
            .atomic_lock_update(
                item,
                Box::new(move |w: &WorkItem| w.is_held_by(&q, &f, now)),
                Box::new(move |w: &mut WorkItem| {
                    for lock in w.locks.iter_mut().filter(|l| l.work_queue_id == q2) {
                        lock.user_id = to2.clone();
                        lock.expires = expires;
                    }
                }),
            )
            .await?
            .ok_or_else(|| lock_not_held(queue, item, from))?;
        self.events
            .emit(DomainEvent::LockReleased {
                queue: queue.clone(),
                item: item.clone(),
                user: from.clone(),
            })
            .await;
        self.events
            .emit(DomainEvent::LockAcquired {
                queue: queue.clone(),
                item: item.clone(),
                user: to.clone(),
                expires,
            })
            .await;
        Ok(swapped)
    }

    async fn drop_lock(
        &self,
        items: &Arc<dyn WorkItemRepository>,
        queue: &QueueName,
        item: &ItemId,
        user: &UserId,
    ) -> Result<Option<WorkItem>> {
        let now = self.clock.now();
        let (q, u) = (queue.clone(), user.clone());
        let (q2, u2) = (queue.clone(), user.clone());
        let released = items
            .atomic_lock_update(
                item,
                Box::new(move |w: &WorkItem| w.is_held_by(&q, &u, now)),
                Box::new(move |w: &mut WorkItem| {
                    w.locks.retain(|l| !(l.work_queue_id == q2 && l.user_id == u2));
                }),
            )
            .await?;
        if released.is_some() {
            debug!(%queue, %item, %user, "lock released");
            self.events
                .emit(DomainEvent::LockReleased {
                    queue: queue.clone(),
                    item: item.clone(),
                    user: user.clone(),
                })
                .await;
        }
        Ok(released)
    }

    async fn not_held(
        &self,
        items: &Arc<dyn WorkItemRepository>,
        queue: &QueueName,
        item: &ItemId,
        user: &UserId,
    ) -> DocketError {
        match items.get(item).await {
            Ok(Some(_)) => lock_not_held(queue, item, user),
            Ok(None) => DocketError::not_found("work item", item),
            Err(e) => e.into(),
        }
    }
}

fn lock_not_held(queue: &QueueName, item: &ItemId, user: &UserId) -> DocketError {
    DocketError::LockNotHeld {
        queue: queue.to_string(),
        item: item.to_string(),
        user: user.to_string(),
    }
}

/// Time left on `lock` at `now`, zero once expired.
fn remaining(lock: &ItemLock, now: DateTime<Utc>) -> Duration {
    (lock.expires - now).max(Duration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    use crate::domain::{Selector, SortKey, SubmitAction, WorkQueueDefinition};
    use crate::impls::{CollectionRepository, InMemoryStore};
    use crate::ports::store::{Filter, Mutation, StoreError};
    use crate::ports::{FixedClock, NoopEventSink, UlidGenerator};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;

    /// Records every item state written by an atomic update.
    struct Recording {
        inner: CollectionRepository,
        writes: StdMutex<Vec<WorkItem>>,
    }

    #[async_trait]
    impl WorkItemRepository for Recording {
        async fn get(&self, id: &ItemId) -> std::result::Result<Option<WorkItem>, StoreError> {
            self.inner.get(id).await
        }

        async fn find(
            &self,
            selector: &Selector,
            sort: &[SortKey],
            limit: Option<usize>,
        ) -> std::result::Result<Vec<WorkItem>, StoreError> {
            self.inner.find(selector, sort, limit).await
        }

        async fn project_id_only(
            &self,
            selector: &Selector,
            sort: &[SortKey],
            queue: &QueueName,
            now: DateTime<Utc>,
            limit: Option<usize>,
        ) -> std::result::Result<Vec<ItemId>, StoreError> {
            self.inner.project_id_only(selector, sort, queue, now, limit).await
        }

        async fn atomic_lock_update(
            &self,
            id: &ItemId,
            filter: Filter<WorkItem>,
            update: Mutation<WorkItem>,
        ) -> std::result::Result<Option<WorkItem>, StoreError> {
            let updated = self.inner.atomic_lock_update(id, filter, update).await?;
            if let Some(item) = &updated {
                self.writes.lock().unwrap().push(item.clone());
            }
            Ok(updated)
        }
    }

    struct Fixture {
        locks: Arc<LockManager>,
        repo: Arc<Recording>,
        comments: Arc<InMemoryStore<Comment>>,
        clock: FixedClock,
    }

    fn item(id: &str, priority: i64) -> WorkItem {
        WorkItem::new(
            id,
            json!({"status": "pending", "priority": priority})
                .as_object()
                .cloned()
                .unwrap(),
        )
    }

    fn fixture(items: Vec<WorkItem>) -> Fixture {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
        let repo = Arc::new(Recording {
            inner: CollectionRepository::new(Arc::new(InMemoryStore::with_documents(items))),
            writes: StdMutex::new(Vec::new()),
        });

        let mut review = WorkQueueDefinition::new("review", "documents");
        review.grace_period_secs = 30;
        review.document_query = Selector::new().with("status", crate::domain::Condition::Equals(json!("pending")));
        review.sort_query = vec![SortKey::desc("priority")];
        review.submit_actions = vec![
            SubmitAction {
                label: "approve".into(),
                updates: json!({"status": "approved"}).as_object().cloned().unwrap(),
                reassignable: false,
            },
            SubmitAction {
                label: "escalate".into(),
                updates: json!({"status": "escalated"}).as_object().cloned().unwrap(),
                reassignable: true,
            },
        ];
        let qa = WorkQueueDefinition::new("qa", "documents");

        let collections: HashMap<String, Arc<dyn WorkItemRepository>> =
            HashMap::from([("documents".to_string(), repo.clone() as Arc<dyn WorkItemRepository>)]);
        let registry = WorkQueueRegistry::build(&[review, qa], &collections).unwrap();
        let comments = Arc::new(InMemoryStore::<Comment>::new());
        let locks = Arc::new(LockManager::new(
            registry,
            comments.clone(),
            Arc::new(UlidGenerator::new(clock.clone())),
            Arc::new(clock.clone()),
            Arc::new(NoopEventSink),
            TakeNextConfig {
                attempts: 5,
                delay_ms: 1,
            },
        ));
        Fixture {
            locks,
            repo,
            comments,
            clock,
        }
    }

    fn q(name: &str) -> QueueName {
        QueueName::new(name)
    }

    fn u(name: &str) -> UserId {
        UserId::new(name)
    }

    fn i(name: &str) -> ItemId {
        ItemId::new(name)
    }

    #[tokio::test]
    async fn concurrent_acquires_have_one_winner() {
        let f = fixture(vec![item("x", 1)]);
        let mut handles = Vec::new();
        for n in 0..16 {
            let locks = f.locks.clone();
            handles.push(tokio::spawn(async move {
                locks
                    .attempt_lock_acquire(&q("review"), &i("x"), &u(&format!("user{n}")))
                    .await
                    .unwrap()
            }));
        }
        let mut attempts = Vec::new();
        for h in handles {
            attempts.push(h.await.unwrap());
        }

        let winners: Vec<_> = attempts.iter().filter(|a| a.acquired).collect();
        assert_eq!(winners.len(), 1);
        let winner = winners[0].lock.clone().unwrap();
        for loser in attempts.iter().filter(|a| !a.acquired) {
            assert_eq!(loser.conflict.as_ref().map(|l| &l.user_id), Some(&winner.user_id));
        }
    }

    #[tokio::test]
    async fn renewal_extends_and_never_shortens() {
        let f = fixture(vec![item("x", 1)]);
        let first = f.locks.attempt_lock_acquire(&q("review"), &i("x"), &u("alice")).await.unwrap();
        let first_expiry = first.lock.unwrap().expires;

        f.clock.advance(Duration::seconds(10));
        let renewed = f.locks.attempt_lock_acquire(&q("review"), &i("x"), &u("alice")).await.unwrap();
        assert!(renewed.acquired);
        assert!(renewed.lock.unwrap().expires > first_expiry);

        // a long reassignment lock is not cut back to the grace period by a renewal
        let submitted = f
            .locks
            .submit(Submission::new("review", "x", "alice", "escalate").reassign("review", "bob"))
            .await
            .unwrap();
        let long = submitted.live_lock(&q("review"), f.clock.now()).unwrap().expires;
        let again = f.locks.attempt_lock_acquire(&q("review"), &i("x"), &u("bob")).await.unwrap();
        assert_eq!(again.lock.unwrap().expires, long);
    }

    #[tokio::test]
    async fn conflict_renders_holder_and_expiry() {
        let f = fixture(vec![item("x", 1)]);
        f.locks.attempt_lock_acquire(&q("review"), &i("x"), &u("alice")).await.unwrap();
        let lost = f.locks.attempt_lock_acquire(&q("review"), &i("x"), &u("bob")).await.unwrap();

        assert!(!lost.acquired);
        let err = lost.into_result().unwrap_err();
        assert_eq!(err.to_string(), "claimed by alice until 2024-01-01 12:00:30 UTC");
    }

    #[tokio::test]
    async fn take_next_respects_grace_period() {
        let f = fixture(vec![item("x", 9), item("y", 5)]);

        let a = f.locks.take_next(&q("review"), &u("alice")).await.unwrap();
        assert_eq!(a, Some(i("x")));
        let b = f.locks.take_next(&q("review"), &u("bob")).await.unwrap();
        assert_eq!(b, Some(i("y")));
        let none = f.locks.take_next(&q("review"), &u("carol")).await.unwrap();
        assert_eq!(none, None);

        f.clock.advance(Duration::seconds(31));
        let c = f.locks.take_next(&q("review"), &u("carol")).await.unwrap();
        assert_eq!(c, Some(i("x")));
    }

    #[tokio::test]
    async fn take_next_skips_items_outside_selector() {
        let mut done = item("z", 100);
        done.fields.insert("status".into(), json!("approved"));
        let f = fixture(vec![done, item("x", 1)]);

        assert_eq!(f.locks.take_next(&q("review"), &u("alice")).await.unwrap(), Some(i("x")));
    }

    #[tokio::test]
    async fn concurrent_take_next_hands_out_distinct_items() {
        let f = fixture(vec![item("a", 3), item("b", 2), item("c", 1)]);
        let mut handles = Vec::new();
        for n in 0..3 {
            let locks = f.locks.clone();
            handles.push(tokio::spawn(async move {
                locks.take_next(&q("review"), &u(&format!("user{n}"))).await.unwrap()
            }));
        }
        let mut got = Vec::new();
        for h in handles {
            if let Some(id) = h.await.unwrap() {
                got.push(id);
            }
        }
        let before = got.len();
        got.sort();
        got.dedup();
        assert_eq!(got.len(), before);
        assert!(!got.is_empty());
    }

    #[tokio::test]
    async fn submit_applies_action_and_releases() {
        let f = fixture(vec![item("x", 1)]);
        f.locks.attempt_lock_acquire(&q("review"), &i("x"), &u("alice")).await.unwrap();

        let done = f
            .locks
            .submit(
                Submission::new("review", "x", "alice", "approve")
                    .with_updates(json!({"review.note": "ok"}).as_object().cloned().unwrap())
                    .with_comment("looks right"),
            )
            .await
            .unwrap();

        assert_eq!(done.field("status"), Some(&json!("approved")));
        assert_eq!(done.field("review.note"), Some(&json!("ok")));
        assert!(done.is_unlocked(&q("review"), f.clock.now()));
        assert_eq!(f.locks.current_lock(&q("review"), &i("x")).await.unwrap(), None);

        let comments = f.locks.comments(&i("x")).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].text, "looks right");
        assert_eq!(f.comments.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn submit_without_lock_is_rejected() {
        let f = fixture(vec![item("x", 1)]);
        let err = f
            .locks
            .submit(Submission::new("review", "x", "alice", "approve"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocketError::LockNotHeld { .. }));

        let missing = f
            .locks
            .submit(Submission::new("review", "nope", "alice", "approve"))
            .await
            .unwrap_err();
        assert!(matches!(missing, DocketError::NotFound { kind: "work item", .. }));
    }

    #[tokio::test]
    async fn submit_validates_action() {
        let f = fixture(vec![item("x", 1)]);
        f.locks.attempt_lock_acquire(&q("review"), &i("x"), &u("alice")).await.unwrap();

        let unknown = f.locks.submit(Submission::new("review", "x", "alice", "shred")).await.unwrap_err();
        assert!(matches!(unknown, DocketError::UnknownAction { .. }));

        let not_reassignable = f
            .locks
            .submit(Submission::new("review", "x", "alice", "approve").reassign("qa", "bob"))
            .await
            .unwrap_err();
        assert!(matches!(not_reassignable, DocketError::NotReassignable(a) if a == "approve"));

        // still held after the rejected submits
        assert!(f.locks.current_lock(&q("review"), &i("x")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reassignment_is_never_observably_unlocked() {
        let f = fixture(vec![item("x", 1)]);
        f.locks.attempt_lock_acquire(&q("review"), &i("x"), &u("alice")).await.unwrap();

        let moved = f
            .locks
            .submit(Submission::new("review", "x", "alice", "escalate").reassign("qa", "bob"))
            .await
            .unwrap();

        let now = f.clock.now();
        assert!(moved.is_unlocked(&q("review"), now));
        assert!(moved.is_held_by(&q("qa"), &u("bob"), now));
        for state in f.repo.writes.lock().unwrap().iter() {
            assert!(
                state.locks.iter().any(|l| l.is_live(now)),
                "item was unlocked at some point: {state:?}"
            );
        }

        let lock = f.locks.current_lock(&q("qa"), &i("x")).await.unwrap().unwrap();
        assert_eq!(remaining(&lock, now), reassignment_grace());
    }

    #[test]
    fn remaining_is_clamped_at_zero() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let lock = ItemLock {
            work_queue_id: q("review"),
            user_id: u("alice"),
            expires: now + Duration::seconds(30),
        };
        assert_eq!(remaining(&lock, now), Duration::seconds(30));
        assert_eq!(remaining(&lock, now + Duration::seconds(45)), Duration::zero());
    }

    #[tokio::test]
    async fn same_queue_reassignment_swaps_holder() {
        let f = fixture(vec![item("x", 1)]);
        f.locks.attempt_lock_acquire(&q("review"), &i("x"), &u("alice")).await.unwrap();

        let swapped = f
            .locks
            .submit(Submission::new("review", "x", "alice", "escalate").reassign("review", "bob"))
            .await
            .unwrap();

        let lock = swapped.live_lock(&q("review"), f.clock.now()).unwrap();
        assert_eq!(lock.user_id, u("bob"));
        assert_eq!(swapped.locks.len(), 1);
    }

    #[tokio::test]
    async fn reassignment_to_foreign_held_queue_conflicts() {
        let f = fixture(vec![item("x", 1)]);
        f.locks.attempt_lock_acquire(&q("review"), &i("x"), &u("alice")).await.unwrap();
        f.locks.attempt_lock_acquire(&q("qa"), &i("x"), &u("carol")).await.unwrap();

        let err = f
            .locks
            .submit(Submission::new("review", "x", "alice", "escalate").reassign("qa", "bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocketError::LockConflict { holder, .. } if holder == "carol"));
        assert!(f.locks.current_lock(&q("review"), &i("x")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn release_and_unknown_queue() {
        let f = fixture(vec![item("x", 1)]);
        f.locks.attempt_lock_acquire(&q("review"), &i("x"), &u("alice")).await.unwrap();

        assert!(!f.locks.release(&q("review"), &i("x"), &u("bob")).await.unwrap());
        assert!(f.locks.release(&q("review"), &i("x"), &u("alice")).await.unwrap());
        assert!(matches!(
            f.locks.take_next(&q("nope"), &u("alice")).await,
            Err(DocketError::UnknownQueue(_))
        ));
    }

    #[tokio::test]
    async fn expired_locks_are_pruned_before_claim() {
        let f = fixture(vec![item("x", 1)]);
        f.locks.attempt_lock_acquire(&q("review"), &i("x"), &u("alice")).await.unwrap();
        f.locks.attempt_lock_acquire(&q("qa"), &i("x"), &u("bob")).await.unwrap();
        f.clock.advance(Duration::seconds(31));

        // qa's default grace is 30 minutes, so only review's lock expired
        let attempt = f.locks.attempt_lock_acquire(&q("review"), &i("x"), &u("carol")).await.unwrap();
        assert!(attempt.acquired);
        let item = f.repo.get(&i("x")).await.unwrap().unwrap();
        assert_eq!(item.locks.len(), 2);
        assert!(item.is_held_by(&q("review"), &u("carol"), f.clock.now()));
    }
}
