//! CollectionRepository - WorkItemRepository over a DocumentStore.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::work_queue::compare_items;
use crate::domain::{ItemId, QueueName, Selector, SortKey, WorkItem};
use crate::ports::store::{DocumentStore, Filter, Mutation, SortBy, StoreError};
use crate::ports::WorkItemRepository;

#[derive(Clone)]
pub struct CollectionRepository {
    store: Arc<dyn DocumentStore<WorkItem>>,
}

impl CollectionRepository {
    pub fn new(store: Arc<dyn DocumentStore<WorkItem>>) -> Self {
        Self { store }
    }
}

fn sort_by(keys: &[SortKey]) -> Option<SortBy<WorkItem>> {
    let keys = keys.to_vec();
    Some(Box::new(move |a: &WorkItem, b: &WorkItem| compare_items(&keys, a, b)))
}

#[async_trait]
impl WorkItemRepository for CollectionRepository {
    async fn get(&self, id: &ItemId) -> Result<Option<WorkItem>, StoreError> {
        self.store.get(id).await
    }

    async fn find(
        &self,
        selector: &Selector,
        sort: &[SortKey],
        limit: Option<usize>,
    ) -> Result<Vec<WorkItem>, StoreError> {
        let selector = selector.clone();
        self.store
            .find(Box::new(move |item: &WorkItem| selector.matches(item)), sort_by(sort), limit)
            .await
    }

    async fn project_id_only(
        &self,
        selector: &Selector,
        sort: &[SortKey],
        queue: &QueueName,
        now: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<ItemId>, StoreError> {
        let selector = selector.clone();
        let queue = queue.clone();
        let found = self
            .store
            .find(
                Box::new(move |item: &WorkItem| item.is_unlocked(&queue, now) && selector.matches(item)),
                sort_by(sort),
                limit,
            )
            .await?;
        Ok(found.into_iter().map(|item| item.id).collect())
    }

    async fn atomic_lock_update(
        &self,
        id: &ItemId,
        filter: Filter<WorkItem>,
        update: Mutation<WorkItem>,
    ) -> Result<Option<WorkItem>, StoreError> {
        let id = id.clone();
        self.store
            .find_one_and_update(Box::new(move |item: &WorkItem| item.id == id && filter(item)), update)
            .await
    }
}
