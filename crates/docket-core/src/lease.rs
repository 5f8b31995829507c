//! Lease primitive - atomic single-document claim.
//!
//! `try_claim` is one conditional update: the predicate is evaluated against
//! the stored document and the lease fields are applied in the same atomic
//! step. `now` is read from the clock when the call is built, never from an
//! earlier read of the document. A `None` result means the claim was lost and
//! is ordinary control flow.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::Document;
use crate::ports::store::{DocumentStore, StoreError};
use crate::ports::Clock;

pub struct Lease<D: Document> {
    store: Arc<dyn DocumentStore<D>>,
    clock: Arc<dyn Clock>,
}

impl<D: Document> Clone for Lease<D> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<D: Document> Lease<D> {
    pub fn new(store: Arc<dyn DocumentStore<D>>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore<D>> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Claim `id` if `predicate(doc, now)` holds, applying `lease_fields(doc, now)`.
    ///
    /// Returns the post-update document iff the predicate matched.
    pub async fn try_claim<P, F>(&self, id: &D::Id, predicate: P, lease_fields: F) -> Result<Option<D>, StoreError>
    where
        P: Fn(&D, DateTime<Utc>) -> bool + Send + Sync + 'static,
        F: Fn(&mut D, DateTime<Utc>) + Send + Sync + 'static,
    {
        let now = self.clock.now();
        let id = id.clone();
        self.store
            .find_one_and_update(
                Box::new(move |doc: &D| doc.id() == &id && predicate(doc, now)),
                Box::new(move |doc: &mut D| lease_fields(doc, now)),
            )
            .await
    }
}
