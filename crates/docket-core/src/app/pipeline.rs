//! Built-in pipeline processors.
//!
//! - `DocPipelineProcessor` plans one document: compares each stage's recorded
//!   version with the current registry version and runs only stale stages,
//!   in dependency order, through the registered stage processors.
//! - `SiteDocsPipelineProcessor` fans a site out into one DocPipeline task
//!   per document.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::app::task_queue::TaskQueue;
use crate::domain::{DocTask, DocketError, PipelineVersions, SiteTask, Stage, TaskPayload, TaskType};
use crate::ports::DocumentRepository;
use crate::processor::{PayloadProcessor, ProcessorError, ProcessorOutput, ProcessorRegistry, TaskContext};

pub struct DocPipelineProcessor {
    documents: Arc<dyn DocumentRepository>,
    stages: ProcessorRegistry,
    versions: PipelineVersions,
}

impl DocPipelineProcessor {
    /// `stages` must hold a processor for every stage's task type.
    pub fn new(documents: Arc<dyn DocumentRepository>, stages: ProcessorRegistry, versions: PipelineVersions) -> Self {
        Self {
            documents,
            stages,
            versions,
        }
    }

    /// Task types this processor dispatches to.
    pub fn stage_types() -> Vec<TaskType> {
        Stage::ORDER.iter().map(|s| s.task_type()).collect()
    }
}

#[async_trait]
impl PayloadProcessor for DocPipelineProcessor {
    type Payload = DocTask;
    const TASK_TYPE: TaskType = TaskType::DocPipeline;

    fn extract(payload: &TaskPayload) -> Option<&DocTask> {
        match payload {
            TaskPayload::DocPipeline(task) => Some(task),
            _ => None,
        }
    }

    async fn run(&self, task: &DocTask, ctx: &TaskContext) -> Result<ProcessorOutput, ProcessorError> {
        let recorded = self
            .documents
            .stage_versions(&task.doc_id)
            .await
            .map_err(ProcessorError::failed)?;
        let plan = self.versions.plan(&recorded, task.reprocess);
        let skipped: Vec<Stage> = Stage::ORDER.into_iter().filter(|s| !plan.contains(s)).collect();
        debug!(doc_id = %task.doc_id, ?plan, ?skipped, "pipeline planned");

        let total = plan.len();
        for (done, stage) in plan.iter().copied().enumerate() {
            if ctx.is_interrupted() {
                info!(doc_id = %task.doc_id, %stage, "pipeline interrupted between stages");
                return Err(ProcessorError::Interrupted);
            }
            let processor = self
                .stages
                .get(stage.task_type())
                .ok_or_else(|| ProcessorError::failed(format!("no processor registered for stage '{stage}'")))?;

            let output = processor.process(&stage.payload(task.doc_id.clone()), &ctx.child()).await?;
            self.documents
                .record_stage(&task.doc_id, stage, self.versions.current(stage), output)
                .await
                .map_err(ProcessorError::failed)?;
            ctx.report_progress(json!({"stage": stage, "done": done + 1, "total": total}));
        }

        let mut out = ProcessorOutput::new();
        out.insert("doc_id".into(), json!(task.doc_id));
        out.insert("stages_run".into(), json!(plan));
        out.insert("stages_skipped".into(), json!(skipped));
        Ok(out)
    }
}

pub struct SiteDocsPipelineProcessor {
    documents: Arc<dyn DocumentRepository>,
    queue: Arc<TaskQueue>,
}

impl SiteDocsPipelineProcessor {
    pub fn new(documents: Arc<dyn DocumentRepository>, queue: Arc<TaskQueue>) -> Self {
        Self { documents, queue }
    }
}

#[async_trait]
impl PayloadProcessor for SiteDocsPipelineProcessor {
    type Payload = SiteTask;
    const TASK_TYPE: TaskType = TaskType::SiteDocsPipeline;

    fn extract(payload: &TaskPayload) -> Option<&SiteTask> {
        match payload {
            TaskPayload::SiteDocsPipeline(task) => Some(task),
            _ => None,
        }
    }

    async fn run(&self, task: &SiteTask, ctx: &TaskContext) -> Result<ProcessorOutput, ProcessorError> {
        let docs = self
            .documents
            .docs_for_site(&task.site_id)
            .await
            .map_err(ProcessorError::failed)?;
        let created_by = format!("site-pipeline:{}", task.site_id);

        let mut task_ids: Vec<Value> = Vec::with_capacity(docs.len());
        let mut send_failures = 0usize;
        for doc in docs {
            if ctx.is_interrupted() {
                return Err(ProcessorError::Interrupted);
            }
            let mut doc_task = DocTask::new(doc.clone());
            doc_task.reprocess = task.reprocess;
            match self.queue.enqueue(TaskPayload::DocPipeline(doc_task), &created_by).await {
                Ok(t) => task_ids.push(json!(t.id.to_string())),
                // the task exists PENDING; a later enqueue re-sends it
                Err(DocketError::Transport(e)) => {
                    warn!(site_id = %task.site_id, doc_id = %doc, error = %e, "pipeline task not sent");
                    send_failures += 1;
                }
                Err(e) => return Err(ProcessorError::failed(e)),
            }
            ctx.report_progress(json!({"enqueued": task_ids.len()}));
        }

        info!(site_id = %task.site_id, enqueued = task_ids.len(), send_failures, "site pipeline fanned out");
        let mut out = ProcessorOutput::new();
        out.insert("site_id".into(), json!(task.site_id));
        out.insert("enqueued".into(), json!(task_ids.len()));
        out.insert("task_ids".into(), Value::Array(task_ids));
        out.insert("send_failures".into(), json!(send_failures));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::task_queue::tests::fixture;
    use crate::domain::{DocId, SiteId, SourceDocument, StageVersions};
    use crate::impls::{InMemoryStore, StoreDocuments};
    use crate::ports::DocumentStore;
    use crate::processor::{Processor, Typed};
    use std::sync::Mutex;

    /// Records which stages ran and returns one field per stage.
    #[derive(Clone, Default)]
    struct Stub {
        ran: Arc<Mutex<Vec<TaskType>>>,
    }

    #[async_trait]
    impl Processor for Stub {
        async fn process(&self, payload: &TaskPayload, _ctx: &TaskContext) -> Result<ProcessorOutput, ProcessorError> {
            self.ran.lock().unwrap().push(payload.task_type());
            let mut out = ProcessorOutput::new();
            out.insert(payload.task_type().as_str().into(), json!(true));
            Ok(out)
        }
    }

    fn documents(docs: Vec<SourceDocument>) -> (Arc<StoreDocuments>, Arc<InMemoryStore<SourceDocument>>) {
        let store = Arc::new(InMemoryStore::with_documents(docs));
        (Arc::new(StoreDocuments::new(store.clone())), store)
    }

    fn stages(stub: &Stub) -> ProcessorRegistry {
        let mut registry = ProcessorRegistry::new();
        for t in DocPipelineProcessor::stage_types() {
            registry.register(t, stub.clone()).unwrap();
        }
        registry
    }

    fn run_payload(doc: &str, reprocess: bool) -> TaskPayload {
        let mut task = DocTask::new(doc);
        task.reprocess = reprocess;
        TaskPayload::DocPipeline(task)
    }

    #[tokio::test]
    async fn runs_only_stale_stages_in_order() {
        let mut doc = SourceDocument::new("d1", "s1");
        doc.stage_versions = [(Stage::Content, 1), (Stage::Date, 1), (Stage::DocType, 1), (Stage::Tag, 1)]
            .into_iter()
            .collect::<StageVersions>();
        let (docs, store) = documents(vec![doc]);
        let stub = Stub::default();
        let versions = PipelineVersions::default().with(Stage::Tag, 2).with(Stage::Date, 3);
        let pipeline = Typed(DocPipelineProcessor::new(docs, stages(&stub), versions));

        let ctx = TaskContext::detached();
        let out = pipeline.process(&run_payload("d1", false), &ctx).await.unwrap();

        assert_eq!(*stub.ran.lock().unwrap(), vec![TaskType::Date, TaskType::Tag]);
        assert_eq!(out["stages_run"], json!(["date", "tag"]));
        assert_eq!(out["stages_skipped"], json!(["content", "doc_type"]));
        let stored = store.get(&DocId::new("d1")).await.unwrap().unwrap();
        assert_eq!(stored.stage_versions[&Stage::Tag], 2);
        assert_eq!(stored.stage_versions[&Stage::Date], 3);
        assert_eq!(stored.fields["tag"], json!(true));
        assert_eq!(ctx.progress().unwrap()["done"], 2);

        // second run has nothing to do
        stub.ran.lock().unwrap().clear();
        pipeline.process(&run_payload("d1", false), &ctx).await.unwrap();
        assert!(stub.ran.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reprocess_runs_everything() {
        let mut doc = SourceDocument::new("d1", "s1");
        doc.stage_versions = Stage::ORDER.iter().map(|s| (*s, 1)).collect();
        let (docs, _) = documents(vec![doc]);
        let stub = Stub::default();
        let pipeline = Typed(DocPipelineProcessor::new(docs, stages(&stub), PipelineVersions::default()));

        pipeline.process(&run_payload("d1", true), &TaskContext::detached()).await.unwrap();
        assert_eq!(*stub.ran.lock().unwrap(), DocPipelineProcessor::stage_types());
    }

    #[tokio::test]
    async fn missing_document_and_missing_stage_fail() {
        let (docs, _) = documents(vec![SourceDocument::new("d1", "s1")]);
        let pipeline = Typed(DocPipelineProcessor::new(
            docs,
            ProcessorRegistry::new(),
            PipelineVersions::default(),
        ));

        let missing = pipeline.process(&run_payload("nope", false), &TaskContext::detached()).await;
        assert!(matches!(missing, Err(ProcessorError::Failed(m)) if m.contains("not found")));

        let no_stage = pipeline.process(&run_payload("d1", false), &TaskContext::detached()).await;
        assert!(matches!(no_stage, Err(ProcessorError::Failed(m)) if m.contains("content")));
    }

    #[tokio::test]
    async fn interrupt_stops_between_stages() {
        let (docs, store) = documents(vec![SourceDocument::new("d1", "s1")]);
        let stub = Stub::default();
        let pipeline = Typed(DocPipelineProcessor::new(docs, stages(&stub), PipelineVersions::default()));

        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();
        let ctx = TaskContext::new(crate::domain::TaskId::from(ulid::Ulid::new()), "w1", 1, token);
        let result = pipeline.process(&run_payload("d1", false), &ctx).await;

        assert_eq!(result, Err(ProcessorError::Interrupted));
        assert!(stub.ran.lock().unwrap().is_empty());
        let stored = store.get(&DocId::new("d1")).await.unwrap().unwrap();
        assert!(stored.stage_versions.is_empty());
    }

    #[tokio::test]
    async fn site_pipeline_enqueues_one_task_per_document() {
        let f = fixture();
        let (docs, _) = documents(vec![
            SourceDocument::new("a", "s1"),
            SourceDocument::new("b", "s1"),
            SourceDocument::new("c", "s2"),
        ]);
        let fan_out = Typed(SiteDocsPipelineProcessor::new(docs, f.queue.clone()));
        let payload = TaskPayload::SiteDocsPipeline(SiteTask {
            site_id: SiteId::new("s1"),
            reprocess: false,
        });

        let out = fan_out.process(&payload, &TaskContext::detached()).await.unwrap();
        assert_eq!(out["enqueued"], 2);
        assert_eq!(f.store.snapshot().await.len(), 2);

        // idempotent while those tasks are open
        fan_out.process(&payload, &TaskContext::detached()).await.unwrap();
        assert_eq!(f.store.snapshot().await.len(), 2);
        assert_eq!(f.queue.counts().await.unwrap().queued, 2);
    }
}
