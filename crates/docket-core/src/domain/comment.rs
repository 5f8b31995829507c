//! Review comments left on submit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::Document;
use super::ids::{CommentId, ItemId, QueueName, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub item_id: ItemId,
    pub queue: QueueName,
    pub user_id: UserId,
    pub action: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Document for Comment {
    type Id = CommentId;

    fn id(&self) -> &CommentId {
        &self.id
    }
}
