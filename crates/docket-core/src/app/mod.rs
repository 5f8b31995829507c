//! Application layer: composes ports into the task queue, listeners, lock
//! manager, scheduler, sweeper and autoscaler.

pub mod autoscaler;
pub mod builder;
pub mod jobs;
pub mod listener;
pub mod locks;
pub mod pipeline;
pub mod scheduler;
pub mod status;
pub mod sweeper;
pub mod task_queue;
pub mod work_queues;
pub mod worker_group;

pub use self::autoscaler::{Autoscaler, QueueDepth, ScaleDecision};
pub use self::builder::{App, AppBuilder, BuildError, Clients, RunningApp};
pub use self::jobs::{JobOutcome, ScheduledJobs};
pub use self::listener::{HandleOutcome, Listener, SkipReason};
pub use self::locks::{LockAttempt, LockManager, Submission};
pub use self::pipeline::{DocPipelineProcessor, SiteDocsPipelineProcessor};
pub use self::scheduler::Scheduler;
pub use self::status::QueueCounts;
pub use self::sweeper::Sweeper;
pub use self::task_queue::TaskQueue;
pub use self::work_queues::{BoundQueue, WorkQueueRegistry};
pub use self::worker_group::ListenerPool;
