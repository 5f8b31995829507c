//! DocumentRepository port - what the pipeline needs from the document store.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::{DocId, DocketError, SiteId, Stage, StageVersions};

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Recorded stage versions of `doc`; `NotFound` if it does not exist.
    async fn stage_versions(&self, doc: &DocId) -> Result<StageVersions, DocketError>;

    /// Merge `result` into the document and record `stage` at `version`, in one
    /// atomic update.
    async fn record_stage(
        &self,
        doc: &DocId,
        stage: Stage,
        version: u32,
        result: Map<String, Value>,
    ) -> Result<(), DocketError>;

    async fn docs_for_site(&self, site: &SiteId) -> Result<Vec<DocId>, DocketError>;
}
