//! InMemoryStore - development/test document store.
//!
//! One async mutex guards the whole collection, so every operation (and in
//! particular every filter-then-update) is atomic. No await happens while the
//! lock is held except the lock itself.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::Document;
use crate::ports::store::{DocumentStore, Filter, Mutation, SortBy, StoreError, UpdateResult};

pub struct InMemoryStore<D> {
    docs: Arc<Mutex<Vec<D>>>,
}

impl<D: Document> InMemoryStore<D> {
    pub fn new() -> Self {
        Self::with_documents(Vec::new())
    }

    pub fn with_documents(docs: Vec<D>) -> Self {
        Self {
            docs: Arc::new(Mutex::new(docs)),
        }
    }

    /// Snapshot of every stored document, in insertion order.
    pub async fn snapshot(&self) -> Vec<D> {
        self.docs.lock().await.clone()
    }
}

impl<D: Document> Default for InMemoryStore<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<D: Document> DocumentStore<D> for InMemoryStore<D> {
    async fn insert(&self, doc: D) -> Result<(), StoreError> {
        let mut docs = self.docs.lock().await;
        if docs.iter().any(|d| d.id() == doc.id()) {
            return Err(StoreError::DuplicateKey(doc.id().to_string()));
        }
        docs.push(doc);
        Ok(())
    }

    async fn get(&self, id: &D::Id) -> Result<Option<D>, StoreError> {
        let docs = self.docs.lock().await;
        Ok(docs.iter().find(|d| d.id() == id).cloned())
    }

    async fn find(
        &self,
        filter: Filter<D>,
        sort: Option<SortBy<D>>,
        limit: Option<usize>,
    ) -> Result<Vec<D>, StoreError> {
        let mut found: Vec<D> = {
            let docs = self.docs.lock().await;
            docs.iter().filter(|d| filter(d)).cloned().collect()
        };
        if let Some(sort) = sort {
            found.sort_by(|a, b| sort(a, b));
        }
        if let Some(limit) = limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn count(&self, filter: Filter<D>) -> Result<u64, StoreError> {
        let docs = self.docs.lock().await;
        Ok(docs.iter().filter(|d| filter(d)).count() as u64)
    }

    async fn find_one_and_update(
        &self,
        filter: Filter<D>,
        update: Mutation<D>,
    ) -> Result<Option<D>, StoreError> {
        let mut docs = self.docs.lock().await;
        Ok(docs.iter_mut().find(|d| filter(d)).map(|doc| {
            update(doc);
            doc.clone()
        }))
    }

    async fn update_one(
        &self,
        filter: Filter<D>,
        update: Mutation<D>,
        upsert: Option<D>,
    ) -> Result<UpdateResult<D::Id>, StoreError> {
        let mut docs = self.docs.lock().await;
        if let Some(doc) = docs.iter_mut().find(|d| filter(d)) {
            update(doc);
            return Ok(UpdateResult {
                matched: 1,
                upserted_id: None,
            });
        }
        let Some(doc) = upsert else {
            return Ok(UpdateResult {
                matched: 0,
                upserted_id: None,
            });
        };
        if docs.iter().any(|d| d.id() == doc.id()) {
            return Err(StoreError::DuplicateKey(doc.id().to_string()));
        }
        let id = doc.id().clone();
        docs.push(doc);
        Ok(UpdateResult {
            matched: 0,
            upserted_id: Some(id),
        })
    }

    async fn update_many(&self, filter: Filter<D>, update: Mutation<D>) -> Result<u64, StoreError> {
        let mut docs = self.docs.lock().await;
        let mut matched = 0;
        for doc in docs.iter_mut().filter(|d| filter(d)) {
            update(doc);
            matched += 1;
        }
        Ok(matched)
    }
}
