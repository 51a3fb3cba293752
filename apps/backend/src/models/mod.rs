//! Database models and API types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::StoreError;

// Re-export shared types from study-core
pub use study_core::{Grade, ItemBuckets, ItemState, ReviewEvent, ReviewState, StreakRecord};

// === Database Entity Types ===

/// Item state row in PostgreSQL
#[derive(Debug, Clone, FromRow)]
pub struct DbItemState {
    pub item_id: Uuid,
    pub owner_id: Uuid,
    pub collection_id: Uuid,
    pub interval_days: i32,
    pub difficulty: f64,
    pub next_due_at: DateTime<Utc>,
    pub reviews_count: i32,
    pub updated_at: DateTime<Utc>,
}

impl DbItemState {
    /// Convert to study-core ItemState
    pub fn into_item_state(self) -> Result<ItemState, StoreError> {
        let interval_days = u32::try_from(self.interval_days).map_err(|_| {
            StoreError::InvalidData(format!(
                "negative interval {} for item {}",
                self.interval_days, self.item_id
            ))
        })?;

        Ok(ItemState {
            item_id: self.item_id,
            owner_id: self.owner_id,
            collection_id: self.collection_id,
            state: ReviewState {
                interval_days,
                difficulty: self.difficulty,
                next_due_at: self.next_due_at,
                reviews_count: self.reviews_count.max(0) as u32,
            },
            updated_at: self.updated_at,
        })
    }
}

/// Review event row
#[derive(Debug, Clone, FromRow)]
pub struct DbReviewEvent {
    pub id: Uuid,
    pub item_id: Uuid,
    pub owner_id: Uuid,
    pub collection_id: Uuid,
    pub grade: i16,
    pub occurred_at: DateTime<Utc>,
    pub interval_before: i32,
    pub interval_after: i32,
    pub difficulty_before: f64,
    pub difficulty_after: f64,
}

impl DbReviewEvent {
    /// Convert to study-core ReviewEvent
    pub fn into_event(self) -> Result<ReviewEvent, StoreError> {
        let grade = Grade::from_value(self.grade as i64)
            .map_err(|e| StoreError::InvalidData(format!("review {}: {}", self.id, e)))?;

        Ok(ReviewEvent {
            id: self.id,
            item_id: self.item_id,
            owner_id: self.owner_id,
            collection_id: self.collection_id,
            grade,
            occurred_at: self.occurred_at,
            interval_before: self.interval_before.max(0) as u32,
            interval_after: self.interval_after.max(0) as u32,
            difficulty_before: self.difficulty_before,
            difficulty_after: self.difficulty_after,
        })
    }
}

// === API Request/Response Types ===

// Study types
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitReviewRequest {
    pub item_id: Uuid,
    /// Raw 0-3 ordinal; validated after the item is loaded.
    pub grade: i64,
    #[serde(default)]
    pub timezone_offset_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyProgress {
    pub studied_today: u64,
    pub due_today: u64,
    pub goal: u64,
    pub goal_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakSummary {
    pub current: u32,
    pub longest: u32,
}

impl From<&StreakRecord> for StreakSummary {
    fn from(record: &StreakRecord) -> Self {
        Self {
            current: record.current_streak,
            longest: record.longest_streak,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReviewResponse {
    pub new_interval: u32,
    pub new_difficulty: f64,
    pub next_due_at: DateTime<Utc>,
    pub daily_progress: DailyProgress,
    pub streak: StreakSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DueItemsQuery {
    pub collection_id: Option<Uuid>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DueItemsResponse {
    pub item_ids: Vec<Uuid>,
    pub due_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RebuildResponse {
    pub indexed_items: usize,
}

// Stats types
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub timezone_offset_hours: f64,
}

/// Long-TTL cached rollup. Never holds live counters.
///
/// Active days depend on the reader's offset, so a snapshot only serves reads
/// made at the offset it was computed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub buckets: ItemBuckets,
    pub total_reviews: u64,
    pub avg_reviews_per_active_day: f64,
    pub offset_seconds: i32,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total: u64,
    pub new: u64,
    pub learning: u64,
    pub mastered: u64,
    pub due_today: u64,
    pub studied_today: u64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_reviews: u64,
    pub avg_reviews_per_active_day: f64,
}

// Item types
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateItemRequest {
    pub item_id: Option<Uuid>,
    pub collection_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemReviewsResponse {
    pub item_id: Uuid,
    pub reviews: Vec<ReviewEvent>,
}

/// Trigger events for notification delivery outside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StudyEvent {
    LevelUp {
        owner_id: Uuid,
        item_id: Uuid,
        new_level: u32,
        total_xp: u64,
        occurred_at: DateTime<Utc>,
    },
    DailyGoalReached {
        owner_id: Uuid,
        local_date: NaiveDate,
        studied_today: u64,
        goal: u64,
    },
}
