//! PostgreSQL database operations

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use study_core::{Grade, ItemState, ReviewEvent, SpacedRepetitionAlgorithm, TimezoneOffset};

use super::{CommittedReview, GroundTruthStore, StoreError, StoreResult};
use crate::models::{DbItemState, DbReviewEvent};

const ITEM_COLUMNS: &str = "item_id, owner_id, collection_id, interval_days, difficulty, \
                            next_due_at, reviews_count, updated_at";

const REVIEW_COLUMNS: &str = "id, item_id, owner_id, collection_id, grade, occurred_at, \
                              interval_before, interval_after, difficulty_before, difficulty_after";

/// Database wrapper with connection pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL and create connection pool
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl GroundTruthStore for Database {
    async fn get_item_state(&self, item_id: Uuid) -> StoreResult<Option<ItemState>> {
        let row = sqlx::query_as::<_, DbItemState>(&format!(
            "SELECT {ITEM_COLUMNS} FROM item_states WHERE item_id = $1"
        ))
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DbItemState::into_item_state).transpose()
    }

    async fn persist_item_state(&self, item: &ItemState) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO item_states (item_id, owner_id, collection_id, interval_days, difficulty,
                                     next_due_at, reviews_count, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (item_id) DO UPDATE SET
                collection_id = EXCLUDED.collection_id,
                interval_days = EXCLUDED.interval_days,
                difficulty = EXCLUDED.difficulty,
                next_due_at = EXCLUDED.next_due_at,
                reviews_count = EXCLUDED.reviews_count,
                updated_at = EXCLUDED.updated_at
            WHERE item_states.owner_id = EXCLUDED.owner_id
            "#,
        )
        .bind(item.item_id)
        .bind(item.owner_id)
        .bind(item.collection_id)
        .bind(item.state.interval_days as i32)
        .bind(item.state.difficulty)
        .bind(item.state.next_due_at)
        .bind(item.state.reviews_count as i32)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_item_state(&self, item_id: Uuid, owner_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM item_states WHERE item_id = $1 AND owner_id = $2")
            .bind(item_id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit_review(
        &self,
        owner_id: Uuid,
        item_id: Uuid,
        grade: Grade,
        now: DateTime<Utc>,
        algorithm: &dyn SpacedRepetitionAlgorithm,
    ) -> StoreResult<CommittedReview> {
        // Dropping the transaction on any early return rolls it back.
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, DbItemState>(&format!(
            "SELECT {ITEM_COLUMNS} FROM item_states WHERE item_id = $1 FOR UPDATE"
        ))
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?;

        let before = match row {
            Some(row) if row.owner_id == owner_id => row.into_item_state()?,
            _ => return Err(StoreError::NotFound(item_id)),
        };

        let new_state = algorithm.schedule(&before.state, grade, now);
        let event = ReviewEvent::record(&before, grade, &new_state, now);

        sqlx::query(
            r#"
            UPDATE item_states
            SET interval_days = $2, difficulty = $3, next_due_at = $4,
                reviews_count = $5, updated_at = $6
            WHERE item_id = $1
            "#,
        )
        .bind(item_id)
        .bind(new_state.interval_days as i32)
        .bind(new_state.difficulty)
        .bind(new_state.next_due_at)
        .bind(new_state.reviews_count as i32)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO review_events (id, item_id, owner_id, collection_id, grade, occurred_at,
                                       interval_before, interval_after, difficulty_before, difficulty_after)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.id)
        .bind(event.item_id)
        .bind(event.owner_id)
        .bind(event.collection_id)
        .bind(event.grade.to_value() as i16)
        .bind(event.occurred_at)
        .bind(event.interval_before as i32)
        .bind(event.interval_after as i32)
        .bind(event.difficulty_before)
        .bind(event.difficulty_after)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let after = ItemState {
            state: new_state,
            updated_at: now,
            ..before.clone()
        };

        Ok(CommittedReview {
            before,
            after,
            event,
        })
    }

    async fn get_item_states_by_owner(&self, owner_id: Uuid) -> StoreResult<Vec<ItemState>> {
        let rows = sqlx::query_as::<_, DbItemState>(&format!(
            "SELECT {ITEM_COLUMNS} FROM item_states WHERE owner_id = $1 ORDER BY next_due_at"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DbItemState::into_item_state).collect()
    }

    async fn count_due_items(&self, owner_id: Uuid, at: DateTime<Utc>) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM item_states WHERE owner_id = $1 AND next_due_at <= $2",
        )
        .bind(owner_id)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }

    async fn count_reviews_between(
        &self,
        owner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM review_events
            WHERE owner_id = $1 AND occurred_at >= $2 AND occurred_at < $3
            "#,
        )
        .bind(owner_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }

    async fn count_reviews(&self, owner_id: Uuid) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM review_events WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    async fn get_active_local_dates(
        &self,
        owner_id: Uuid,
        offset: TimezoneOffset,
    ) -> StoreResult<BTreeSet<NaiveDate>> {
        let dates: Vec<NaiveDate> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT ((occurred_at AT TIME ZONE 'UTC') + make_interval(secs => $2))::date
            FROM review_events
            WHERE owner_id = $1
            "#,
        )
        .bind(owner_id)
        .bind(offset.seconds() as f64)
        .fetch_all(&self.pool)
        .await?;

        Ok(dates.into_iter().collect())
    }

    async fn get_reviews_for_item(&self, item_id: Uuid) -> StoreResult<Vec<ReviewEvent>> {
        let rows = sqlx::query_as::<_, DbReviewEvent>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM review_events WHERE item_id = $1 ORDER BY occurred_at"
        ))
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DbReviewEvent::into_event).collect()
    }
}
