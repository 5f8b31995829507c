//! EventSink port - audit trail of domain events.
//!
//! # Implementations
//! - `NoopEventSink`: drops everything (tests, tools)
//! - `impls::ChannelEventSink`: bounded channel drained by the audit logger

use async_trait::async_trait;

use crate::domain::DomainEvent;

/// EventSink receives every state change worth auditing.
///
/// # Ordering
/// - events from one emitter arrive in emit order
/// - no ordering across emitters
///
/// # Thread Safety
/// - `Send + Sync`: one sink is shared by the queue, the lock manager, the
///   job store and the autoscaler
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Record an event. May wait for buffer space; never drops silently.
    async fn emit(&self, event: DomainEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn emit(&self, _event: DomainEvent) {}
}
