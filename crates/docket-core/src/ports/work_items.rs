//! WorkItemRepository port - typed access to one backing collection.
//!
//! Work queues name their collection in configuration; the registry resolves
//! each name to one of these at load time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ItemId, QueueName, Selector, SortKey, WorkItem};
use crate::ports::store::{Filter, Mutation, StoreError};

#[async_trait]
pub trait WorkItemRepository: Send + Sync {
    async fn get(&self, id: &ItemId) -> Result<Option<WorkItem>, StoreError>;

    async fn find(
        &self,
        selector: &Selector,
        sort: &[SortKey],
        limit: Option<usize>,
    ) -> Result<Vec<WorkItem>, StoreError>;

    /// Ids of items matching `selector` with no live lock for `queue` at `now`,
    /// in `sort` order.
    async fn project_id_only(
        &self,
        selector: &Selector,
        sort: &[SortKey],
        queue: &QueueName,
        now: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<ItemId>, StoreError>;

    /// Single atomic conditional update of item `id`. `None` when the item is
    /// missing or `filter` did not match.
    async fn atomic_lock_update(
        &self,
        id: &ItemId,
        filter: Filter<WorkItem>,
        update: Mutation<WorkItem>,
    ) -> Result<Option<WorkItem>, StoreError>;
}
