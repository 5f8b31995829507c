//! Transport port - at-least-once message broker.
//!
//! Semantics expected from an adapter (FIFO queue with visibility timeout):
//! - a received, undeleted message is hidden for the visibility timeout and
//!   then redelivered with a fresh receipt
//! - sends carrying a dedup key already seen within the dedup window are
//!   accepted but not enqueued twice
//! - within one group key messages are delivered in order, one in flight at a
//!   time; across groups there is no ordering

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{MessageHandle, ReceiptHandle, TaskEnvelope};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("receipt {0} is not valid")]
    InvalidReceipt(String),

    #[error("malformed message body: {0}")]
    Malformed(String),
}

/// One received message.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub receipt: ReceiptHandle,
    pub message_id: MessageHandle,
    pub envelope: TaskEnvelope,

    /// How many times this message has been received, this one included.
    pub receive_count: u32,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        envelope: &TaskEnvelope,
        dedup_key: &str,
        group_key: &str,
    ) -> Result<MessageHandle, TransportError>;

    /// Long-poll up to `max_messages`, waiting at most `wait`.
    async fn receive(&self, max_messages: usize, wait: Duration) -> Result<Vec<Delivery>, TransportError>;

    async fn delete(&self, receipt: &ReceiptHandle) -> Result<(), TransportError>;

    /// Reset the message's visibility timeout to `timeout` from now. Zero makes
    /// it visible immediately.
    async fn extend_visibility(&self, receipt: &ReceiptHandle, timeout: Duration) -> Result<(), TransportError>;
}
