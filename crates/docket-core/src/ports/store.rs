//! DocumentStore port - the narrow atomic conditional-update contract.
//!
//! This is not a query engine. Filters, updates and sort orders are plain
//! closures; the only guarantee an adapter must give is that each
//! single-document operation (`find_one_and_update`, `update_one`) evaluates
//! its filter and applies its update as one atomic step. Every exclusivity
//! decision in the crate is built on that guarantee.

use std::cmp::Ordering;

use async_trait::async_trait;

use crate::domain::Document;

pub type Filter<D> = Box<dyn Fn(&D) -> bool + Send + Sync>;
pub type Mutation<D> = Box<dyn Fn(&mut D) + Send + Sync>;
pub type SortBy<D> = Box<dyn Fn(&D, &D) -> Ordering + Send + Sync>;

/// Filter matching every document.
pub fn all<D: 'static>() -> Filter<D> {
    Box::new(|_: &D| true)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateResult<I> {
    /// Documents the filter matched (and were updated).
    pub matched: u64,

    /// Id of the inserted document when the upsert branch ran.
    pub upserted_id: Option<I>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Collection of documents of one type.
///
/// # Thread Safety
/// - `Send + Sync`; shared between loops as `Arc<dyn DocumentStore<D>>`
#[async_trait]
pub trait DocumentStore<D: Document>: Send + Sync {
    /// Insert a new document. Fails with `DuplicateKey` if the id exists.
    async fn insert(&self, doc: D) -> Result<(), StoreError>;

    async fn get(&self, id: &D::Id) -> Result<Option<D>, StoreError>;

    /// Matching documents, optionally sorted and limited.
    async fn find(
        &self,
        filter: Filter<D>,
        sort: Option<SortBy<D>>,
        limit: Option<usize>,
    ) -> Result<Vec<D>, StoreError>;

    async fn count(&self, filter: Filter<D>) -> Result<u64, StoreError>;

    /// Atomically: find the first document matching `filter`, apply `update`,
    /// return the post-update document.
    async fn find_one_and_update(
        &self,
        filter: Filter<D>,
        update: Mutation<D>,
    ) -> Result<Option<D>, StoreError>;

    /// Atomically update the first match; if nothing matches and `upsert` is
    /// given, insert it instead.
    async fn update_one(
        &self,
        filter: Filter<D>,
        update: Mutation<D>,
        upsert: Option<D>,
    ) -> Result<UpdateResult<D::Id>, StoreError>;

    /// Update every match. Each document is updated atomically; the set as a
    /// whole is not.
    async fn update_many(&self, filter: Filter<D>, update: Mutation<D>) -> Result<u64, StoreError>;
}
