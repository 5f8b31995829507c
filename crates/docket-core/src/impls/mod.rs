//! Implementations of the ports.
//!
//! In-memory adapters are used by tests and by the single-process daemon;
//! production adapters for a real store/broker implement the same traits.

pub mod channel_sink;
pub mod collection_repository;
pub mod inmem_transport;
pub mod memory_store;
pub mod store_documents;

pub use self::channel_sink::{AuditLogger, AuditWriter, ChannelEventSink, MemoryAuditWriter, TracingAuditWriter};
pub use self::collection_repository::CollectionRepository;
pub use self::inmem_transport::InMemoryTransport;
pub use self::memory_store::InMemoryStore;
pub use self::store_documents::StoreDocuments;
