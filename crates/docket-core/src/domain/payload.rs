//! Task payloads: the closed set of background work this system knows about.
//!
//! Every payload variant has exactly one `TaskType`. Processors are registered
//! per `TaskType`, and `TaskPayload::task_type` is an exhaustive match, so adding
//! a variant without deciding its type does not compile.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::ids::{DocId, GroupId, SiteId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Content,
    Date,
    DocType,
    Tag,
    Lineage,
    PdfDiff,
    DocPipeline,
    SiteDocsPipeline,
    RescrapeDoc,
}

impl TaskType {
    pub const ALL: [TaskType; 9] = [
        TaskType::Content,
        TaskType::Date,
        TaskType::DocType,
        TaskType::Tag,
        TaskType::Lineage,
        TaskType::PdfDiff,
        TaskType::DocPipeline,
        TaskType::SiteDocsPipeline,
        TaskType::RescrapeDoc,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Content => "content",
            TaskType::Date => "date",
            TaskType::DocType => "doc_type",
            TaskType::Tag => "tag",
            TaskType::Lineage => "lineage",
            TaskType::PdfDiff => "pdf_diff",
            TaskType::DocPipeline => "doc_pipeline",
            TaskType::SiteDocsPipeline => "site_docs_pipeline",
            TaskType::RescrapeDoc => "rescrape_doc",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work against a single document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocTask {
    pub doc_id: DocId,
    /// Re-run even when the recorded stage version is current.
    #[serde(default)]
    pub reprocess: bool,
}

impl DocTask {
    pub fn new(doc_id: impl Into<DocId>) -> Self {
        Self {
            doc_id: doc_id.into(),
            reprocess: false,
        }
    }

    pub fn reprocess(mut self) -> Self {
        self.reprocess = true;
        self
    }
}

/// Work against every document of a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteTask {
    pub site_id: SiteId,
    #[serde(default)]
    pub reprocess: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfDiffTask {
    pub current_doc_id: DocId,
    pub previous_doc_id: DocId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescrapeTask {
    pub doc_id: DocId,
}

/// Tagged union of every payload a Task can carry.
///
/// Serialized adjacently tagged: `{"task_type": "content", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task_type", content = "payload", rename_all = "snake_case")]
pub enum TaskPayload {
    Content(DocTask),
    Date(DocTask),
    DocType(DocTask),
    Tag(DocTask),
    Lineage(SiteTask),
    PdfDiff(PdfDiffTask),
    DocPipeline(DocTask),
    SiteDocsPipeline(SiteTask),
    RescrapeDoc(RescrapeTask),
}

impl TaskPayload {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskPayload::Content(_) => TaskType::Content,
            TaskPayload::Date(_) => TaskType::Date,
            TaskPayload::DocType(_) => TaskType::DocType,
            TaskPayload::Tag(_) => TaskType::Tag,
            TaskPayload::Lineage(_) => TaskType::Lineage,
            TaskPayload::PdfDiff(_) => TaskType::PdfDiff,
            TaskPayload::DocPipeline(_) => TaskType::DocPipeline,
            TaskPayload::SiteDocsPipeline(_) => TaskType::SiteDocsPipeline,
            TaskPayload::RescrapeDoc(_) => TaskType::RescrapeDoc,
        }
    }

    /// Deterministic dedup key: SHA-256 over the tagged JSON encoding.
    ///
    /// The encoding contains the task type, so equal payloads of different
    /// types never collide. Struct fields serialize in declaration order, which
    /// keeps the bytes stable across processes.
    pub fn group_id(&self) -> GroupId {
        let encoded = serde_json::to_vec(self).unwrap_or_else(|_| self.task_type().as_str().into());
        let digest = Sha256::digest(&encoded);
        GroupId::new(hex::encode(digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_type_follows_variant() {
        let payload = TaskPayload::DocPipeline(DocTask::new("doc-1"));
        assert_eq!(payload.task_type(), TaskType::DocPipeline);
        assert_eq!(payload.task_type().to_string(), "doc_pipeline");
    }

    #[test]
    fn payload_is_adjacently_tagged() {
        let payload = TaskPayload::Tag(DocTask::new("doc-9"));
        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["task_type"], "tag");
        assert_eq!(v["payload"]["doc_id"], "doc-9");
        assert_eq!(v["payload"]["reprocess"], false);
    }

    #[test]
    fn group_id_is_deterministic() {
        let a = TaskPayload::Content(DocTask::new("doc-1"));
        let b = TaskPayload::Content(DocTask::new("doc-1"));
        assert_eq!(a.group_id(), b.group_id());
        assert_eq!(a.group_id().as_str().len(), 64);
    }

    #[test]
    fn group_id_separates_types_and_payloads() {
        let content = TaskPayload::Content(DocTask::new("doc-1"));
        let date = TaskPayload::Date(DocTask::new("doc-1"));
        let other_doc = TaskPayload::Content(DocTask::new("doc-2"));
        let forced = TaskPayload::Content(DocTask::new("doc-1").reprocess());

        assert_ne!(content.group_id(), date.group_id());
        assert_ne!(content.group_id(), other_doc.group_id());
        assert_ne!(content.group_id(), forced.group_id());
    }

    #[test]
    fn task_type_list_is_complete() {
        let mut seen = std::collections::HashSet::new();
        for t in TaskType::ALL {
            assert!(seen.insert(t));
        }
        assert_eq!(seen.len(), 9);
    }
}
