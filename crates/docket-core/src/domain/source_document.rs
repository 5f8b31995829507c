//! SourceDocument - a scraped document the pipeline enriches.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::document::Document;
use super::ids::{DocId, SiteId};
use super::pipeline::StageVersions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: DocId,
    pub site_id: SiteId,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub stage_versions: StageVersions,
}

impl SourceDocument {
    pub fn new(id: impl Into<DocId>, site_id: impl Into<SiteId>) -> Self {
        Self {
            id: id.into(),
            site_id: site_id.into(),
            fields: Map::new(),
            stage_versions: StageVersions::new(),
        }
    }
}

impl Document for SourceDocument {
    type Id = DocId;

    fn id(&self) -> &DocId {
        &self.id
    }
}
