use async_trait::async_trait;
use sea_orm::sea_query::{LockBehavior, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Database, DatabaseConnection, EntityTrait, NotSet, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::model::sea_orm_storage_model::commit_event;
use crate::model::{CommitEvent, GenericError};

/// Commit events waiting for their side effects.
#[async_trait]
pub trait QueueService: Send + Sync + 'static {
    async fn enqueue(&self, event: CommitEvent) -> Result<(), GenericError>;

    /// Pops up to `number` events, oldest first.
    async fn fetch_next(&self, number: usize) -> Result<Vec<CommitEvent>, GenericError>;

    async fn len(&self) -> Result<usize, GenericError>;
}

/// Process-local queue. Events are kept serialised, as a broker would.
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    queue: Arc<Mutex<VecDeque<String>>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueService for InMemoryQueue {
    async fn enqueue(&self, event: CommitEvent) -> Result<(), GenericError> {
        let serialized = serde_json::to_string(&event)?;
        self.queue.lock().await.push_back(serialized);
        Ok(())
    }

    async fn fetch_next(&self, number: usize) -> Result<Vec<CommitEvent>, GenericError> {
        let mut queue = self.queue.lock().await;
        let take = number.min(queue.len());
        queue
            .drain(..take)
            .map(|serialized| serde_json::from_str::<CommitEvent>(&serialized).map_err(GenericError::from))
            .collect()
    }

    async fn len(&self) -> Result<usize, GenericError> {
        Ok(self.queue.lock().await.len())
    }
}

/// Outbox table shared by every process that imports or processes records.
/// Concurrent workers skip rows another worker has locked.
#[derive(Clone)]
pub struct ProdQueue {
    db: DatabaseConnection,
}

impl ProdQueue {
    pub async fn new(database_url: &str) -> Result<Self, GenericError> {
        let db = Database::connect(database_url).await?;
        Ok(Self { db })
    }
}

#[async_trait]
impl QueueService for ProdQueue {
    async fn enqueue(&self, event: CommitEvent) -> Result<(), GenericError> {
        commit_event::ActiveModel {
            id: NotSet,
            payload: Set(serde_json::to_value(event)?),
            created_at: Set(chrono::Utc::now().naive_utc()),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    async fn fetch_next(&self, number: usize) -> Result<Vec<CommitEvent>, GenericError> {
        let txn = self.db.begin().await?;
        let rows = commit_event::Entity::find()
            .order_by_asc(commit_event::Column::Id)
            .limit(number as u64)
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .all(&txn)
            .await?;
        if rows.is_empty() {
            txn.commit().await?;
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        commit_event::Entity::delete_many()
            .filter(commit_event::Column::Id.is_in(ids))
            .exec(&txn)
            .await?;
        let events = rows
            .into_iter()
            .map(|row| serde_json::from_value::<CommitEvent>(row.payload).map_err(GenericError::from))
            .collect::<Result<Vec<_>, _>>()?;
        txn.commit().await?;
        Ok(events)
    }

    async fn len(&self) -> Result<usize, GenericError> {
        Ok(commit_event::Entity::find().count(&self.db).await? as usize)
    }
}
