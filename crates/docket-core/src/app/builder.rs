//! AppBuilder - wiring and startup validation.
//!
//! Clients (stores, broker, clock, id generator) are constructed by the caller
//! and injected; nothing in the crate reaches for a global. `build` fails fast
//! when an expected task type has no processor or a work queue names an
//! unknown collection.
//!
//! ```ignore
//! let app = AppBuilder::new(config, "node-1", Clients::in_memory(&["documents"], visibility))
//!     .register(TaskType::Content, ContentExtractor)?
//!     .expect_tasks(&[TaskType::Content, TaskType::DocPipeline])
//!     .build()?;
//! let running = app.start(4).await?;
//! // ...
//! running.shutdown().await;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::autoscaler::Autoscaler;
use crate::app::jobs::ScheduledJobs;
use crate::app::locks::LockManager;
use crate::app::pipeline::{DocPipelineProcessor, SiteDocsPipelineProcessor};
use crate::app::scheduler::Scheduler;
use crate::app::sweeper::Sweeper;
use crate::app::task_queue::TaskQueue;
use crate::app::work_queues::WorkQueueRegistry;
use crate::app::worker_group::ListenerPool;
use crate::config::{ConfigError, DocketConfig};
use crate::domain::{Comment, Result, ScheduledJob, Site, SourceDocument, Task, TaskType, WorkItem};
use crate::impls::{
    AuditLogger, AuditWriter, CollectionRepository, InMemoryStore, InMemoryTransport, StoreDocuments,
    TracingAuditWriter,
};
use crate::ports::store::DocumentStore;
use crate::ports::{
    Clock, DocumentRepository, EventSink, IdGenerator, SystemClock, Transport, UlidGenerator, WorkItemRepository,
    WorkerPool,
};
use crate::processor::{Processor, ProcessorRegistry, RegistryError, Typed};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing task types: {0:?}. These tasks were expected but not registered.")]
    MissingTaskTypes(Vec<TaskType>),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Explicitly constructed clients the app runs against.
#[derive(Clone)]
pub struct Clients {
    pub tasks: Arc<dyn DocumentStore<Task>>,
    pub jobs: Arc<dyn DocumentStore<ScheduledJob>>,
    pub sites: Arc<dyn DocumentStore<Site>>,
    pub comments: Arc<dyn DocumentStore<Comment>>,
    pub documents: Arc<dyn DocumentRepository>,
    /// Backing collections work queues may name.
    pub collections: HashMap<String, Arc<dyn WorkItemRepository>>,
    pub transport: Arc<dyn Transport>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
}

impl Clients {
    /// Single-process clients: in-memory stores and broker, system clock.
    pub fn in_memory(collections: &[&str], visibility_timeout: Duration) -> Self {
        let collections = collections
            .iter()
            .map(|name| {
                let repo: Arc<dyn WorkItemRepository> =
                    Arc::new(CollectionRepository::new(Arc::new(InMemoryStore::<WorkItem>::new())));
                (name.to_string(), repo)
            })
            .collect();
        Self {
            tasks: Arc::new(InMemoryStore::<Task>::new()),
            jobs: Arc::new(InMemoryStore::<ScheduledJob>::new()),
            sites: Arc::new(InMemoryStore::<Site>::new()),
            comments: Arc::new(InMemoryStore::<Comment>::new()),
            documents: Arc::new(StoreDocuments::new(Arc::new(InMemoryStore::<SourceDocument>::new()))),
            collections,
            transport: Arc::new(InMemoryTransport::new(visibility_timeout)),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
        }
    }
}

pub struct AppBuilder {
    config: DocketConfig,
    worker_id: String,
    clients: Clients,
    processors: ProcessorRegistry,
    expected_tasks: Option<Vec<TaskType>>,
    audit_writer: Box<dyn AuditWriter>,
}

impl AppBuilder {
    pub fn new(config: DocketConfig, worker_id: impl Into<String>, clients: Clients) -> Self {
        Self {
            config,
            worker_id: worker_id.into(),
            clients,
            processors: ProcessorRegistry::new(),
            expected_tasks: None,
            audit_writer: Box::new(TracingAuditWriter),
        }
    }

    pub fn register<P: Processor + 'static>(mut self, task_type: TaskType, processor: P) -> std::result::Result<Self, BuildError> {
        self.processors.register(task_type, processor)?;
        Ok(self)
    }

    /// Task types that must have a processor once built-ins are added.
    pub fn expect_tasks(mut self, task_types: &[TaskType]) -> Self {
        self.expected_tasks = Some(task_types.to_vec());
        self
    }

    pub fn audit_writer(mut self, writer: impl AuditWriter) -> Self {
        self.audit_writer = Box::new(writer);
        self
    }

    /// Validate and wire everything. Spawns the audit logger, so it must run
    /// inside a tokio runtime.
    pub fn build(self) -> std::result::Result<App, BuildError> {
        let AppBuilder {
            config,
            worker_id,
            clients,
            processors,
            expected_tasks,
            audit_writer,
        } = self;
        config.validate()?;
        let work_queues = WorkQueueRegistry::build(&config.work_queues, &clients.collections)?;

        let (sink, audit) = AuditLogger::spawn(config.audit.capacity, clients.clock.clone(), audit_writer);
        let events: Arc<dyn EventSink> = Arc::new(sink);

        let queue = Arc::new(TaskQueue::new(
            clients.tasks.clone(),
            clients.transport.clone(),
            clients.ids.clone(),
            clients.clock.clone(),
            events.clone(),
            config.listener.stale_after(),
        ));
        let jobs = Arc::new(ScheduledJobs::new(
            clients.jobs.clone(),
            clients.ids.clone(),
            clients.clock.clone(),
            events.clone(),
        ));
        let locks = Arc::new(LockManager::new(
            work_queues,
            clients.comments.clone(),
            clients.ids.clone(),
            clients.clock.clone(),
            events.clone(),
            config.take_next.clone(),
        ));

        // stage processors are whatever was registered before the built-ins
        let mut registry = processors.clone();
        if registry.get(TaskType::DocPipeline).is_none() {
            registry.register(
                TaskType::DocPipeline,
                Typed(DocPipelineProcessor::new(
                    clients.documents.clone(),
                    processors,
                    config.pipeline_versions.clone(),
                )),
            )?;
        }
        if registry.get(TaskType::SiteDocsPipeline).is_none() {
            registry.register(
                TaskType::SiteDocsPipeline,
                Typed(SiteDocsPipelineProcessor::new(clients.documents.clone(), queue.clone())),
            )?;
        }

        if let Some(expected) = &expected_tasks {
            let missing = registry.missing(expected);
            if !missing.is_empty() {
                return Err(BuildError::MissingTaskTypes(missing));
            }
        }

        info!(
            worker_id = %worker_id,
            environment = ?config.environment,
            processors = ?registry.registered_types(),
            work_queues = config.work_queues.len(),
            "app built"
        );
        Ok(App {
            config,
            worker_id,
            clients,
            registry,
            events,
            audit,
            queue,
            jobs,
            locks,
        })
    }
}

/// Wired but not yet running.
pub struct App {
    config: DocketConfig,
    worker_id: String,
    clients: Clients,
    registry: ProcessorRegistry,
    events: Arc<dyn EventSink>,
    audit: AuditLogger,
    queue: Arc<TaskQueue>,
    jobs: Arc<ScheduledJobs>,
    locks: Arc<LockManager>,
}

impl App {
    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn jobs(&self) -> &Arc<ScheduledJobs> {
        &self.jobs
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    /// Spawn `listeners` listen loops plus the scheduler, sweeper and
    /// autoscaler loops.
    pub async fn start(self, listeners: usize) -> Result<RunningApp> {
        let root = CancellationToken::new();
        let pool = Arc::new(ListenerPool::new(
            self.worker_id.clone(),
            self.queue.clone(),
            self.clients.transport.clone(),
            self.registry.clone(),
            self.config.listener.clone(),
            root.child_token(),
        ));
        pool.resize(listeners).await?;

        let scheduler = Arc::new(Scheduler::new(
            self.clients.sites.clone(),
            self.jobs.clone(),
            self.clients.clock.clone(),
            self.config.scheduler.clone(),
        ));
        let sweeper = Arc::new(Sweeper::new(self.jobs.clone(), self.config.sweeper.clone()));
        let autoscaler = Arc::new(Autoscaler::new(
            self.queue.clone(),
            pool.clone(),
            self.events.clone(),
            self.config.environment,
            self.config.autoscaler.clone(),
        ));

        let loops = vec![
            tokio::spawn(scheduler.run(root.child_token())),
            tokio::spawn(sweeper.run(root.child_token())),
            tokio::spawn(autoscaler.run(root.child_token())),
        ];
        info!(worker_id = %self.worker_id, listeners, "app started");

        Ok(RunningApp {
            worker_id: self.worker_id,
            root,
            pool,
            loops,
            audit: self.audit,
            queue: self.queue,
            jobs: self.jobs,
            locks: self.locks,
        })
    }
}

pub struct RunningApp {
    worker_id: String,
    root: CancellationToken,
    pool: Arc<ListenerPool>,
    loops: Vec<JoinHandle<()>>,
    audit: AuditLogger,
    queue: Arc<TaskQueue>,
    jobs: Arc<ScheduledJobs>,
    locks: Arc<LockManager>,
}

impl RunningApp {
    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn jobs(&self) -> &Arc<ScheduledJobs> {
        &self.jobs
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    pub async fn pool_size(&self) -> usize {
        self.pool.size().await
    }

    /// Stop intake, release in-flight tasks, join every loop and flush the
    /// audit trail. Returns the number of audit records written.
    pub async fn shutdown(self) -> usize {
        info!(worker_id = %self.worker_id, "shutting down");
        self.root.cancel();
        self.pool.shutdown_and_join().await;
        for join in self.loops {
            if let Err(e) = join.await {
                warn!(error = %e, "background loop ended abnormally");
            }
        }
        let written = self.audit.shutdown().await;
        info!(worker_id = %self.worker_id, audit_records = written, "shutdown complete");
        written
    }
}
