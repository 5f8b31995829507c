//! Errors - crate-wide error taxonomy.
//!
//! Boundary errors (store, transport, processor, ...) live next to the port
//! that produces them and convert into `DocketError` with `?`.
//!
//! Losing an atomic claim is not an error: the lease primitive returns
//! `Ok(None)` and the lock manager returns `acquired = false`.

use chrono::{DateTime, Utc};

use crate::ports::store::StoreError;
use crate::ports::transport::TransportError;
use crate::ports::worker_pool::PoolError;

/// DocketError is what the application services return.
#[derive(Debug, thiserror::Error)]
pub enum DocketError {
    /// Missing Task / WorkItem / Job id. Surfaced, never retried.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Another holder has a live lock.
    #[error("claimed by {holder} until {expires}")]
    LockConflict {
        holder: String,
        expires: DateTime<Utc>,
    },

    /// Caller tried to act on an item without holding its lock.
    #[error("lock on {item} in queue {queue} is not held by {user}")]
    LockNotHeld {
        queue: String,
        item: String,
        user: String,
    },

    #[error("processor failed: {0}")]
    ProcessorFailure(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("unknown work queue '{0}'")]
    UnknownQueue(String),

    #[error("unknown submit action '{action}' for queue '{queue}'")]
    UnknownAction { queue: String, action: String },

    #[error("submit action '{0}' does not allow reassignment")]
    NotReassignable(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DocketError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        DocketError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DocketError>;
