//! IdGenerator port - id generation.
//!
//! Ids are minted by the process that creates the record, never by the store,
//! so a task id exists before its first insert and can be used as the
//! transport's dedup key. Abstracted as a trait so tests pin the time part.
//!
//! # Implementations
//! - **UlidGenerator**: ULID from the clock's millisecond timestamp plus
//!   random bits

use crate::domain::ids::{CommentId, JobId, TaskId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator creates ids usable across processes without coordination.
///
/// # ULID properties
/// - sortable by creation time (millisecond resolution)
/// - generated on any node with no shared counter
/// - 128 bits, stored as the 26-character Crockford string
///
/// # Thread Safety
/// - `Send + Sync`: one generator is shared by every loop of a worker
pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;

    fn generate_job_id(&self) -> JobId;

    fn generate_comment_id(&self) -> CommentId;
}

/// ULID generator driven by a `Clock`, so a `FixedClock` pins the timestamp part.
///
/// Two ids from the same millisecond differ only in their random bits and
/// therefore do not sort by call order.
///
/// # Example
/// ```ignore
/// let ids = UlidGenerator::new(FixedClock::new(noon));
/// let task = ids.generate_task_id();
/// assert_eq!(task.as_ulid().timestamp_ms(), noon.timestamp_millis() as u64);
/// ```
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        TaskId::from(self.next())
    }

    fn generate_job_id(&self) -> JobId {
        JobId::from(self.next())
    }

    fn generate_comment_id(&self) -> CommentId {
        CommentId::from(self.next())
    }
}
