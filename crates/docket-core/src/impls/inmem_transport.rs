//! InMemoryTransport - development FIFO broker with visibility timeouts.
//!
//! # Semantics
//! - received messages stay hidden for `visibility_timeout`, then come back
//!   with a new receipt and a higher `receive_count`
//! - a dedup key seen within `DEDUP_WINDOW` returns the original message id
//!   without enqueueing again
//! - per group only the oldest message is deliverable, and only while nothing
//!   from that group is in flight
//!
//! Waiters register a `Notified` future before inspecting state, so a send
//! between the check and the wait is never missed.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::{MessageHandle, ReceiptHandle, TaskEnvelope};
use crate::ports::transport::{Delivery, Transport, TransportError};

pub const DEDUP_WINDOW: Duration = Duration::from_secs(5 * 60);

struct Message {
    id: MessageHandle,
    envelope: TaskEnvelope,
    group: String,
    visible_at: Instant,
    receipt: Option<ReceiptHandle>,
    receive_count: u32,
}

impl Message {
    fn in_flight(&self, now: Instant) -> bool {
        self.receipt.is_some() && self.visible_at > now
    }
}

#[derive(Default)]
struct TransportState {
    /// Messages in send order.
    messages: VecDeque<Message>,

    /// dedup key -> (first send, message id)
    dedup: HashMap<String, (Instant, MessageHandle)>,

    next_seq: u64,
}

impl TransportState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_seq += 1;
        format!("{prefix}-{:08}", self.next_seq)
    }

    fn take_batch(&mut self, max: usize, visibility: Duration, now: Instant) -> Vec<Delivery> {
        let mut batch = Vec::new();
        let mut seen_groups = HashSet::new();
        let mut receipts = Vec::new();
        for (idx, msg) in self.messages.iter().enumerate() {
            if receipts.len() >= max {
                break;
            }
            // only the head of each group is a candidate
            if !seen_groups.insert(msg.group.clone()) {
                continue;
            }
            if msg.visible_at > now {
                continue;
            }
            receipts.push(idx);
        }
        for idx in receipts {
            let receipt = ReceiptHandle::new(self.next_id("rcpt"));
            if let Some(msg) = self.messages.get_mut(idx) {
                msg.receipt = Some(receipt.clone());
                msg.receive_count += 1;
                msg.visible_at = now + visibility;
                batch.push(Delivery {
                    receipt,
                    message_id: msg.id.clone(),
                    envelope: msg.envelope.clone(),
                    receive_count: msg.receive_count,
                });
            }
        }
        batch
    }

    /// Earliest moment a hidden message becomes visible again.
    fn next_visible(&self, now: Instant) -> Option<Instant> {
        self.messages
            .iter()
            .filter(|m| m.in_flight(now))
            .map(|m| m.visible_at)
            .min()
    }

    fn find_mut(&mut self, receipt: &ReceiptHandle) -> Result<&mut Message, TransportError> {
        self.messages
            .iter_mut()
            .find(|m| m.receipt.as_ref() == Some(receipt))
            .ok_or_else(|| TransportError::InvalidReceipt(receipt.to_string()))
    }
}

pub struct InMemoryTransport {
    state: Arc<Mutex<TransportState>>,
    notify: Arc<Notify>,
    visibility_timeout: Duration,
}

impl InMemoryTransport {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(TransportState::default())),
            notify: Arc::new(Notify::new()),
            visibility_timeout,
        }
    }

    /// Messages not yet deleted (visible or in flight).
    pub async fn len(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(
        &self,
        envelope: &TaskEnvelope,
        dedup_key: &str,
        group_key: &str,
    ) -> Result<MessageHandle, TransportError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state
            .dedup
            .retain(|_, (sent_at, _)| now.duration_since(*sent_at) < DEDUP_WINDOW);
        if let Some((_, id)) = state.dedup.get(dedup_key) {
            return Ok(id.clone());
        }

        let id = MessageHandle::new(state.next_id("msg"));
        state.dedup.insert(dedup_key.to_string(), (now, id.clone()));
        state.messages.push_back(Message {
            id: id.clone(),
            envelope: envelope.clone(),
            group: group_key.to_string(),
            visible_at: now,
            receipt: None,
            receive_count: 0,
        });
        drop(state);

        self.notify.notify_waiters();
        Ok(id)
    }

    async fn receive(&self, max_messages: usize, wait: Duration) -> Result<Vec<Delivery>, TransportError> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.notify.notified();

            let wake_at = {
                let now = Instant::now();
                let mut state = self.state.lock().await;
                let batch = state.take_batch(max_messages, self.visibility_timeout, now);
                if !batch.is_empty() || now >= deadline {
                    return Ok(batch);
                }
                state
                    .next_visible(now)
                    .map_or(deadline, |at| at.min(deadline))
            };

            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        let idx = state
            .messages
            .iter()
            .position(|m| m.receipt.as_ref() == Some(receipt))
            .ok_or_else(|| TransportError::InvalidReceipt(receipt.to_string()))?;
        state.messages.remove(idx);
        drop(state);

        // the next message of the group may now be deliverable
        self.notify.notify_waiters();
        Ok(())
    }

    async fn extend_visibility(&self, receipt: &ReceiptHandle, timeout: Duration) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        let msg = state.find_mut(receipt)?;
        msg.visible_at = Instant::now() + timeout;
        drop(state);

        if timeout.is_zero() {
            self.notify.notify_waiters();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskId, TaskType};
    use ulid::Ulid;

    fn envelope() -> TaskEnvelope {
        TaskEnvelope::new(TaskId::from_ulid(Ulid::new()), TaskType::Content)
    }

    #[tokio::test]
    async fn received_message_is_hidden_until_deleted() {
        let transport = InMemoryTransport::new(Duration::from_secs(30));
        let env = envelope();
        transport.send(&env, "d1", "g1").await.unwrap();

        let batch = transport.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].envelope, env);
        assert_eq!(batch[0].receive_count, 1);

        assert!(transport.receive(10, Duration::ZERO).await.unwrap().is_empty());

        transport.delete(&batch[0].receipt).await.unwrap();
        assert!(transport.is_empty().await);
    }

    #[tokio::test]
    async fn dedup_key_returns_original_message() {
        let transport = InMemoryTransport::new(Duration::from_secs(30));
        let env = envelope();
        let first = transport.send(&env, "same", "g1").await.unwrap();
        let second = transport.send(&env, "same", "g1").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.len().await, 1);
    }

    #[tokio::test]
    async fn one_message_in_flight_per_group() {
        let transport = InMemoryTransport::new(Duration::from_secs(30));
        let (a, b, c) = (envelope(), envelope(), envelope());
        transport.send(&a, "a", "g1").await.unwrap();
        transport.send(&b, "b", "g1").await.unwrap();
        transport.send(&c, "c", "g2").await.unwrap();

        let batch = transport.receive(10, Duration::ZERO).await.unwrap();
        let got: Vec<_> = batch.iter().map(|d| d.envelope.clone()).collect();
        assert_eq!(got, vec![a, c]);

        transport.delete(&batch[0].receipt).await.unwrap();
        let next = transport.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].envelope, b);
    }

    #[tokio::test]
    async fn zero_visibility_releases_immediately() {
        let transport = InMemoryTransport::new(Duration::from_secs(30));
        transport.send(&envelope(), "d1", "g1").await.unwrap();
        let first = transport.receive(1, Duration::ZERO).await.unwrap();

        transport
            .extend_visibility(&first[0].receipt, Duration::ZERO)
            .await
            .unwrap();

        let again = transport.receive(1, Duration::ZERO).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].receive_count, 2);
        assert_ne!(again[0].receipt, first[0].receipt);
    }

    #[tokio::test]
    async fn expired_visibility_redelivers() {
        let transport = InMemoryTransport::new(Duration::from_millis(50));
        transport.send(&envelope(), "d1", "g1").await.unwrap();
        let first = transport.receive(1, Duration::ZERO).await.unwrap();
        assert_eq!(first.len(), 1);

        let again = transport.receive(1, Duration::from_secs(2)).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].message_id, first[0].message_id);
    }

    #[tokio::test]
    async fn send_wakes_long_poll() {
        let transport = Arc::new(InMemoryTransport::new(Duration::from_secs(30)));
        let waiter = tokio::spawn({
            let transport = transport.clone();
            async move { transport.receive(1, Duration::from_secs(5)).await.unwrap() }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        transport.send(&envelope(), "d1", "g1").await.unwrap();

        let start = Instant::now();
        let batch = waiter.await.unwrap();
        assert_eq!(batch.len(), 1);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn unknown_receipt_is_rejected() {
        let transport = InMemoryTransport::new(Duration::from_secs(30));
        let err = transport
            .delete(&ReceiptHandle::new("nope"))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::InvalidReceipt("nope".into()));
    }
}
