//! WorkQueue definitions - static review-queue configuration.
//!
//! A queue names a backing collection, a selector for eligible items, a sort
//! order, a lock grace period and the actions a reviewer may submit. These
//! are loaded once from configuration and never mutated by the lock manager.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ids::QueueName;
use super::work_item::WorkItem;

/// One field condition.
///
/// ```yaml
/// status: pending                 # equality
/// assignee: { $exists: false }
/// kind: { $in: [invoice, memo] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Operator(OperatorCondition),
    Equals(Value),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorCondition {
    #[serde(rename = "$exists", default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    #[serde(rename = "$ne", default, skip_serializing_if = "Option::is_none")]
    pub ne: Option<Value>,
    #[serde(rename = "$in", default, skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<Value>>,
}

impl Condition {
    fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Condition::Equals(expected) => value == Some(expected),
            Condition::Operator(op) => {
                if let Some(exists) = op.exists
                    && exists != value.is_some()
                {
                    return false;
                }
                if let Some(ne) = &op.ne
                    && value == Some(ne)
                {
                    return false;
                }
                if let Some(one_of) = &op.one_of {
                    return value.is_some_and(|v| one_of.contains(v));
                }
                true
            }
        }
    }
}

/// Conjunction of field conditions keyed by dotted path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selector(BTreeMap<String, Condition>);

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, condition: Condition) -> Self {
        self.0.insert(path.into(), condition);
        self
    }

    pub fn matches(&self, item: &WorkItem) -> bool {
        self.0
            .iter()
            .all(|(path, cond)| cond.matches(item.field(path)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    #[serde(default)]
    pub descending: bool,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Compare two items by a list of sort keys; ties fall back to item id so the
/// order is total.
pub fn compare_items(keys: &[SortKey], a: &WorkItem, b: &WorkItem) -> Ordering {
    for key in keys {
        let ord = compare_values(a.field(&key.field), b.field(&key.field));
        let ord = if key.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.id.as_str().cmp(b.id.as_str())
}

// Missing < null < bool < number < string; other kinds compare equal.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(_) => 5,
        }
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitAction {
    pub label: String,

    /// `$set` document applied to the item on submit.
    #[serde(default)]
    pub updates: Map<String, Value>,

    /// Whether the reviewer may hand the item to another queue/user.
    #[serde(default)]
    pub reassignable: bool,
}

fn default_grace_period_secs() -> u64 {
    30 * 60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkQueueDefinition {
    pub name: QueueName,

    /// Declared name of the backing collection; resolved by the registry.
    pub collection: String,

    #[serde(default)]
    pub document_query: Selector,

    #[serde(default)]
    pub sort_query: Vec<SortKey>,

    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    #[serde(default)]
    pub submit_actions: Vec<SubmitAction>,
}

impl WorkQueueDefinition {
    pub fn new(name: impl Into<QueueName>, collection: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: collection.into(),
            document_query: Selector::default(),
            sort_query: Vec::new(),
            grace_period_secs: default_grace_period_secs(),
            submit_actions: Vec::new(),
        }
    }

    pub fn grace_period(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.grace_period_secs.min(u64::from(u32::MAX)) as i64)
    }

    pub fn action(&self, label: &str) -> Option<&SubmitAction> {
        self.submit_actions.iter().find(|a| a.label == label)
    }
}
