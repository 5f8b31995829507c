//! Sites - scrape targets the scheduler fires on a cron.

use serde::{Deserialize, Serialize};

use super::cron::{CronError, CronSpec};
use super::document::Document;
use super::ids::SiteId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub name: String,
    pub cron: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl Site {
    pub fn cron_spec(&self) -> Result<CronSpec, CronError> {
        self.cron.parse()
    }

    pub fn has_active_endpoint(&self) -> bool {
        self.endpoints.iter().any(|e| e.active)
    }
}

impl Document for Site {
    type Id = SiteId;

    fn id(&self) -> &SiteId {
        &self.id
    }
}
