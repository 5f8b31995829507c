//! Work items and their per-queue locks.
//!
//! A work item is any document a human reviews: the shape of `fields` belongs to
//! the backing collection. The coordination core only looks at `locks`.
//!
//! Invariant: per `work_queue_id`, at most one lock with `expires > now`.
//! Expired entries may linger until pruned; they never count as held.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::document::Document;
use super::ids::{ItemId, QueueName, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemLock {
    pub work_queue_id: QueueName,
    pub user_id: UserId,
    pub expires: DateTime<Utc>,
}

impl ItemLock {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires > now
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: ItemId,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub locks: Vec<ItemLock>,
}

impl WorkItem {
    pub fn new(id: impl Into<ItemId>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
            locks: Vec::new(),
        }
    }

    /// The live lock for `queue`, if any.
    pub fn live_lock(&self, queue: &QueueName, now: DateTime<Utc>) -> Option<&ItemLock> {
        self.locks
            .iter()
            .find(|l| &l.work_queue_id == queue && l.is_live(now))
    }

    pub fn is_unlocked(&self, queue: &QueueName, now: DateTime<Utc>) -> bool {
        self.live_lock(queue, now).is_none()
    }

    pub fn is_held_by(&self, queue: &QueueName, user: &UserId, now: DateTime<Utc>) -> bool {
        self.live_lock(queue, now)
            .map(|l| &l.user_id == user)
            .unwrap_or(false)
    }

    /// Drop every expired lock. Returns how many were removed.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.locks.len();
        self.locks.retain(|l| l.is_live(now));
        before - self.locks.len()
    }

    /// Look up a dotted path (`"review.status"`) in `fields`.
    pub fn field(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// `$set`-style update: each key is a dotted path, intermediate objects are
    /// created as needed and non-object intermediates are replaced.
    pub fn apply_updates(&mut self, updates: &Map<String, Value>) {
        for (path, value) in updates {
            set_path(&mut self.fields, path, value.clone());
        }
    }
}

fn set_path(target: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            target.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = target
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(inner) = entry {
                set_path(inner, rest, value);
            }
        }
    }
}

impl Document for WorkItem {
    type Id = ItemId;

    fn id(&self) -> &ItemId {
        &self.id
    }
}
