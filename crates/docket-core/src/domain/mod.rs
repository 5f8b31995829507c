//! Domain model (ids, tasks, work items, scheduled jobs, pipeline, events).
//!
//! Pure data and the rules that only need the data itself. Anything that
//! touches storage or the broker lives in `ports`/`app`.

pub mod comment;
pub mod cron;
pub mod document;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod ids;
pub mod payload;
pub mod pipeline;
pub mod scheduled_job;
pub mod site;
pub mod source_document;
pub mod task;
pub mod work_item;
pub mod work_queue;

pub use comment::Comment;
pub use cron::{CronError, CronSpec};
pub use document::Document;
pub use envelope::{MessageHandle, ReceiptHandle, TaskEnvelope};
pub use errors::{DocketError, Result};
pub use events::{AuditRecord, DomainEvent};
pub use ids::{CommentId, DocId, GroupId, ItemId, JobId, QueueName, SiteId, TaskId, UserId};
pub use payload::{DocTask, PdfDiffTask, RescrapeTask, SiteTask, TaskPayload, TaskType};
pub use pipeline::{PipelineVersions, Stage, StageVersions};
pub use scheduled_job::{JobStatus, ScheduledJob};
pub use site::{Endpoint, Site};
pub use source_document::SourceDocument;
pub use task::{StatusLogEntry, Task, TaskStatus};
pub use work_item::{ItemLock, WorkItem};
pub use work_queue::{Condition, OperatorCondition, Selector, SortKey, SubmitAction, WorkQueueDefinition};
