//! Document pipeline stages and version gating.
//!
//! Stage order: Content -> {Date, DocType} -> Tag. Each document records the
//! version of every stage it last ran; a stage is stale when that version
//! differs from the current registry version (or was never recorded).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::DocId;
use super::payload::{DocTask, TaskPayload, TaskType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Content,
    Date,
    DocType,
    Tag,
}

impl Stage {
    /// Dependency order. Date and DocType only need Content; Tag needs all.
    pub const ORDER: [Stage; 4] = [Stage::Content, Stage::Date, Stage::DocType, Stage::Tag];

    pub fn task_type(self) -> TaskType {
        match self {
            Stage::Content => TaskType::Content,
            Stage::Date => TaskType::Date,
            Stage::DocType => TaskType::DocType,
            Stage::Tag => TaskType::Tag,
        }
    }

    pub fn depends_on(self) -> &'static [Stage] {
        match self {
            Stage::Content => &[],
            Stage::Date | Stage::DocType => &[Stage::Content],
            Stage::Tag => &[Stage::Content, Stage::Date, Stage::DocType],
        }
    }

    /// The single-stage payload run for this stage.
    pub fn payload(self, doc_id: DocId) -> TaskPayload {
        let task = DocTask::new(doc_id);
        match self {
            Stage::Content => TaskPayload::Content(task),
            Stage::Date => TaskPayload::Date(task),
            Stage::DocType => TaskPayload::DocType(task),
            Stage::Tag => TaskPayload::Tag(task),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.task_type().as_str())
    }
}

pub type StageVersions = BTreeMap<Stage, u32>;

/// Current version of every stage.
///
/// Stages missing from configuration are at version 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineVersions(StageVersions);

impl Default for PipelineVersions {
    fn default() -> Self {
        Self(Stage::ORDER.iter().map(|s| (*s, 1)).collect())
    }
}

impl PipelineVersions {
    pub fn with(mut self, stage: Stage, version: u32) -> Self {
        self.0.insert(stage, version);
        self
    }

    pub fn current(&self, stage: Stage) -> u32 {
        self.0.get(&stage).copied().unwrap_or(1)
    }

    /// Stages to run, in dependency order.
    ///
    /// With `reprocess` every stage runs; otherwise only stale ones.
    pub fn plan(&self, recorded: &StageVersions, reprocess: bool) -> Vec<Stage> {
        Stage::ORDER
            .into_iter()
            .filter(|stage| reprocess || recorded.get(stage) != Some(&self.current(*stage)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_document_runs_every_stage() {
        let plan = PipelineVersions::default().plan(&StageVersions::new(), false);
        assert_eq!(plan, Stage::ORDER.to_vec());
    }

    #[test]
    fn only_stale_stages_run_in_order() {
        let versions = PipelineVersions::default().with(Stage::Tag, 3).with(Stage::Date, 2);
        let recorded: StageVersions = [
            (Stage::Content, 1),
            (Stage::Date, 1),
            (Stage::DocType, 1),
            (Stage::Tag, 2),
        ]
        .into_iter()
        .collect();

        assert_eq!(versions.plan(&recorded, false), vec![Stage::Date, Stage::Tag]);
    }

    #[test]
    fn up_to_date_document_is_skipped_unless_forced() {
        let versions = PipelineVersions::default();
        let recorded: StageVersions = Stage::ORDER.iter().map(|s| (*s, 1)).collect();

        assert!(versions.plan(&recorded, false).is_empty());
        assert_eq!(versions.plan(&recorded, true).len(), 4);
    }

    #[test]
    fn dependencies_come_earlier_in_order() {
        for (i, stage) in Stage::ORDER.iter().enumerate() {
            for dep in stage.depends_on() {
                let pos = Stage::ORDER.iter().position(|s| s == dep).unwrap();
                assert!(pos < i, "{dep} must precede {stage}");
            }
        }
    }

    #[test]
    fn versions_parse_from_yaml() {
        let v: PipelineVersions = serde_yaml::from_str("content: 2\ntag: 4\n").unwrap();
        assert_eq!(v.current(Stage::Content), 2);
        assert_eq!(v.current(Stage::Date), 1);
        assert_eq!(v.current(Stage::Tag), 4);
    }
}
