//! TaskEnvelope - what travels through the broker.
//!
//! The broker only carries the task id (plus its type for logging). State and
//! payload stay in the document store, which is the source of truth; a
//! redelivered envelope is resolved against the stored Task before anything
//! runs.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::TaskId;
use super::payload::TaskType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    task_id: TaskId,
    task_type: TaskType,
}

impl TaskEnvelope {
    pub fn new(task_id: TaskId, task_type: TaskType) -> Self {
        Self { task_id, task_type }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }
}

/// Broker-assigned id of a sent message, stored on the Task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageHandle(String);

impl MessageHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Handle of one particular receipt of a message.
///
/// Needed to delete the message or change its visibility. Each redelivery
/// yields a new receipt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
