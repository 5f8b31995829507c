//! Ports - the seams between coordination logic and the outside world.
//!
//! Each trait stands for an external system (document store, message broker,
//! clock, process pool). The document store is the source of truth and the
//! only shared mutable resource; the broker only carries task ids.

pub mod clock;
pub mod documents;
pub mod event_sink;
pub mod id_generator;
pub mod store;
pub mod transport;
pub mod work_items;
pub mod worker_pool;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::documents::DocumentRepository;
pub use self::event_sink::{EventSink, NoopEventSink};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::store::{DocumentStore, Filter, Mutation, SortBy, StoreError, UpdateResult};
pub use self::transport::{Delivery, Transport, TransportError};
pub use self::work_items::WorkItemRepository;
pub use self::worker_pool::{PoolError, WorkerPool};
