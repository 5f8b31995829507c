//! Domain identifiers (strongly-typed IDs).
//!
//! Two families live here:
//! - `Id<T>`: ULID-backed ids for records this crate creates (tasks, scheduled
//!   jobs, comments). Sortable by creation time and generated without
//!   coordination.
//! - String newtypes for ids owned by collaborators (work items, users, sites,
//!   documents, queue names) or derived from content (group keys).
//!
//! `Id<T>` uses a phantom marker so a `TaskId` can never be passed where a
//! `JobId` is expected, while sharing one implementation.
//!
//! # Serialization
//! - `Id<T>` serializes as the bare ULID string; the prefix is display-only
//! - string newtypes serialize transparently
//!
//! # Example
//! ```ignore
//! let id = TaskId::from_ulid(Ulid::new());
//! assert!(id.to_string().starts_with("task-"));
//! let json = serde_json::to_string(&id)?; // "\"01H...\"", no prefix
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait for each ULID id type.
///
/// Provides the prefix used by `Display` ("task-", "job-", ...).
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic ULID id.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// Markers
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Job {}

impl IdMarker for Job {
    fn prefix() -> &'static str {
        "job-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Comment {}

impl IdMarker for Comment {
    fn prefix() -> &'static str {
        "comment-"
    }
}

/// Identifier of a queued Task (one unit of background processing).
pub type TaskId = Id<Task>;

/// Identifier of a ScheduledJob (one scrape run for a site).
pub type JobId = Id<Job>;

/// Identifier of a review comment left on submit.
pub type CommentId = Id<Comment>;

// ========================================
// String ids
// ========================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Id of a work item inside its backing collection.
    ItemId
);
string_id!(
    /// Reviewer identity as supplied by the auth layer.
    UserId
);
string_id!(
    /// Scraped site.
    SiteId
);
string_id!(
    /// Ingested source document.
    DocId
);
string_id!(
    /// Work queue name; doubles as the `work_queue_id` stored on locks.
    QueueName
);
string_id!(
    /// Deterministic dedup key of a task (hash of type + payload).
    GroupId
);
