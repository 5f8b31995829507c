//! Audit logging through a bounded channel.
//!
//! `ChannelEventSink::emit` stamps the event and awaits channel capacity, so a
//! slow writer back-pressures emitters instead of losing records. A single
//! logger task owns the `AuditWriter`. `AuditLogger::shutdown` closes the
//! channel and drains everything already buffered before returning.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{AuditRecord, DomainEvent};
use crate::ports::{Clock, EventSink};

/// Destination of audit records. Runs on the logger task only.
pub trait AuditWriter: Send + 'static {
    fn write(&mut self, record: &AuditRecord);
}

impl AuditWriter for Box<dyn AuditWriter> {
    fn write(&mut self, record: &AuditRecord) {
        (**self).write(record)
    }
}

/// Writes each record as one structured `tracing` event on `docket::audit`.
#[derive(Debug, Default)]
pub struct TracingAuditWriter;

impl AuditWriter for TracingAuditWriter {
    fn write(&mut self, record: &AuditRecord) {
        match serde_json::to_string(record) {
            Ok(json) => info!(target: "docket::audit", event = record.event.name(), %json, "audit"),
            Err(e) => warn!(target: "docket::audit", event = record.event.name(), error = %e, "audit record not serializable"),
        }
    }
}

/// Keeps records in memory; clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditWriter {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryAuditWriter {
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl AuditWriter for MemoryAuditWriter {
    fn write(&mut self, record: &AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
    }
}

#[derive(Clone)]
pub struct ChannelEventSink {
    tx: mpsc::Sender<AuditRecord>,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: DomainEvent) {
        let record = AuditRecord {
            at: self.clock.now(),
            event,
        };
        if let Err(e) = self.tx.send(record).await {
            warn!(event = e.0.event.name(), "audit logger closed, record not written");
        }
    }
}

/// Handle on the logger task.
pub struct AuditLogger {
    close: CancellationToken,
    handle: JoinHandle<usize>,
}

impl AuditLogger {
    /// Spawn the logger task and return the sink feeding it.
    pub fn spawn<W: AuditWriter>(capacity: usize, clock: Arc<dyn Clock>, mut writer: W) -> (ChannelEventSink, Self) {
        let (tx, mut rx) = mpsc::channel::<AuditRecord>(capacity.max(1));
        let close = CancellationToken::new();
        let closed = close.clone();

        let handle = tokio::spawn(async move {
            let mut written = 0usize;
            loop {
                tokio::select! {
                    record = rx.recv() => match record {
                        Some(record) => {
                            writer.write(&record);
                            written += 1;
                        }
                        None => return written,
                    },
                    _ = closed.cancelled() => break,
                }
            }
            // flush: no new sends are accepted, buffered ones are still written
            rx.close();
            while let Some(record) = rx.recv().await {
                writer.write(&record);
                written += 1;
            }
            written
        });

        (ChannelEventSink { tx, clock }, Self { close, handle })
    }

    /// Close the channel, write every buffered record and return the total
    /// number written.
    pub async fn shutdown(self) -> usize {
        self.close.cancel();
        match self.handle.await {
            Ok(written) => written,
            Err(e) => {
                warn!(error = %e, "audit logger task failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobId, SiteId};
    use crate::ports::SystemClock;
    use ulid::Ulid;

    fn scheduled(site: &str) -> DomainEvent {
        DomainEvent::JobScheduled {
            job_id: JobId::from_ulid(Ulid::new()),
            site_id: SiteId::new(site),
            trigger: "cron".into(),
        }
    }

    #[tokio::test]
    async fn shutdown_flushes_buffered_records_in_order() {
        let writer = MemoryAuditWriter::default();
        let (sink, logger) = AuditLogger::spawn(16, Arc::new(SystemClock), writer.clone());

        for site in ["a", "b", "c"] {
            sink.emit(scheduled(site)).await;
        }
        let written = logger.shutdown().await;

        assert_eq!(written, 3);
        let sites: Vec<String> = writer
            .records()
            .into_iter()
            .filter_map(|r| match r.event {
                DomainEvent::JobScheduled { site_id, .. } => Some(site_id.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(sites, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn emit_after_shutdown_does_not_panic() {
        let writer = MemoryAuditWriter::default();
        let (sink, logger) = AuditLogger::spawn(4, Arc::new(SystemClock), writer.clone());
        logger.shutdown().await;

        sink.emit(scheduled("late")).await;
        assert!(writer.records().is_empty());
    }
}
