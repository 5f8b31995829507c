//! StoreDocuments - DocumentRepository over a DocumentStore<SourceDocument>.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::{DocId, DocketError, SiteId, SourceDocument, Stage, StageVersions};
use crate::ports::store::DocumentStore;
use crate::ports::DocumentRepository;

#[derive(Clone)]
pub struct StoreDocuments {
    store: Arc<dyn DocumentStore<SourceDocument>>,
}

impl StoreDocuments {
    pub fn new(store: Arc<dyn DocumentStore<SourceDocument>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DocumentRepository for StoreDocuments {
    async fn stage_versions(&self, doc: &DocId) -> Result<StageVersions, DocketError> {
        self.store
            .get(doc)
            .await?
            .map(|d| d.stage_versions)
            .ok_or_else(|| DocketError::not_found("document", doc))
    }

    async fn record_stage(
        &self,
        doc: &DocId,
        stage: Stage,
        version: u32,
        result: Map<String, Value>,
    ) -> Result<(), DocketError> {
        let id = doc.clone();
        let updated = self
            .store
            .find_one_and_update(
                Box::new(move |d: &SourceDocument| d.id == id),
                Box::new(move |d: &mut SourceDocument| {
                    for (k, v) in &result {
                        d.fields.insert(k.clone(), v.clone());
                    }
                    d.stage_versions.insert(stage, version);
                }),
            )
            .await?;
        match updated {
            Some(_) => Ok(()),
            None => Err(DocketError::not_found("document", doc)),
        }
    }

    async fn docs_for_site(&self, site: &SiteId) -> Result<Vec<DocId>, DocketError> {
        let site = site.clone();
        let docs = self
            .store
            .find(Box::new(move |d: &SourceDocument| d.site_id == site), None, None)
            .await?;
        Ok(docs.into_iter().map(|d| d.id).collect())
    }
}
