//! Ground-truth store: durable item state plus the append-only review log.
//!
//! Every cached or derived view in the engine can be rebuilt from what this
//! store returns.

pub mod memory;
pub mod postgres;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use study_core::{Grade, ItemState, ReviewEvent, SpacedRepetitionAlgorithm, TimezoneOffset};

pub use memory::MemoryStore;
pub use postgres::Database;

/// Ground-truth store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("item not found: {0}")]
    NotFound(Uuid),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Outcome of a committed review: the locked prior state, the new state and
/// the appended event.
#[derive(Debug, Clone)]
pub struct CommittedReview {
    pub before: ItemState,
    pub after: ItemState,
    pub event: ReviewEvent,
}

/// Durable source of truth.
#[async_trait]
pub trait GroundTruthStore: Send + Sync {
    /// Current state of an item, regardless of owner.
    async fn get_item_state(&self, item_id: Uuid) -> StoreResult<Option<ItemState>>;

    /// Insert or overwrite an item's state (item CRUD boundary).
    async fn persist_item_state(&self, item: &ItemState) -> StoreResult<()>;

    /// Delete an item's state together with its owning item.
    async fn delete_item_state(&self, item_id: Uuid, owner_id: Uuid) -> StoreResult<bool>;

    /// Apply `grade` to the item and append the review event as one unit.
    ///
    /// The item is re-read under a per-item lock and the algorithm is applied
    /// to that locked row, so concurrent reviews of one item serialize. On
    /// error nothing has been written.
    async fn commit_review(
        &self,
        owner_id: Uuid,
        item_id: Uuid,
        grade: Grade,
        now: DateTime<Utc>,
        algorithm: &dyn SpacedRepetitionAlgorithm,
    ) -> StoreResult<CommittedReview>;

    async fn get_item_states_by_owner(&self, owner_id: Uuid) -> StoreResult<Vec<ItemState>>;

    /// Items of an owner with `next_due_at <= at`.
    async fn count_due_items(&self, owner_id: Uuid, at: DateTime<Utc>) -> StoreResult<u64>;

    /// Reviews with `start <= occurred_at < end`.
    async fn count_reviews_between(
        &self,
        owner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<u64>;

    async fn count_reviews(&self, owner_id: Uuid) -> StoreResult<u64>;

    /// Distinct local dates (at `offset`) with at least one review.
    async fn get_active_local_dates(
        &self,
        owner_id: Uuid,
        offset: TimezoneOffset,
    ) -> StoreResult<BTreeSet<NaiveDate>>;

    /// Review history of one item, oldest first.
    async fn get_reviews_for_item(&self, item_id: Uuid) -> StoreResult<Vec<ReviewEvent>>;
}
