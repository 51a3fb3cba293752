//! Core types for study scheduling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ScheduleError};

/// Interval (days) at or above which an item can count as mastered.
pub const MASTERY_INTERVAL_DAYS: u32 = 7;

/// Difficulty at or above which an item can count as mastered.
pub const MASTERY_DIFFICULTY: f64 = 2.0;

/// Learner's self-reported recall quality for one review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Again,
    Hard,
    Good,
    Easy,
}

impl Grade {
    /// Convert to the 0-3 ordinal used on the wire and in storage.
    pub fn to_value(self) -> u8 {
        match self {
            Self::Again => 0,
            Self::Hard => 1,
            Self::Good => 2,
            Self::Easy => 3,
        }
    }

    /// Create from the 0-3 ordinal.
    pub fn from_value(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Self::Again),
            1 => Ok(Self::Hard),
            2 => Ok(Self::Good),
            3 => Ok(Self::Easy),
            other => Err(ScheduleError::InvalidGrade(other)),
        }
    }
}

/// Scheduling state of a single item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewState {
    pub interval_days: u32,
    pub difficulty: f64,
    pub next_due_at: DateTime<Utc>,
    pub reviews_count: u32,
}

impl ReviewState {
    /// State of a freshly created item: interval 0, full difficulty, due now.
    pub fn new_item(now: DateTime<Utc>) -> Self {
        Self {
            interval_days: 0,
            difficulty: 2.5,
            next_due_at: now,
            reviews_count: 0,
        }
    }

    /// An item is mastered once both interval and difficulty reach their thresholds.
    pub fn is_mastered(&self) -> bool {
        self.interval_days >= MASTERY_INTERVAL_DAYS && self.difficulty >= MASTERY_DIFFICULTY
    }

    /// Never reviewed.
    pub fn is_new(&self) -> bool {
        self.reviews_count == 0
    }
}

/// Current state of an item, one row per item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemState {
    pub item_id: Uuid,
    pub owner_id: Uuid,
    pub collection_id: Uuid,
    #[serde(flatten)]
    pub state: ReviewState,
    pub updated_at: DateTime<Utc>,
}

impl ItemState {
    /// Create the initial state for a newly created item.
    pub fn new(item_id: Uuid, owner_id: Uuid, collection_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            item_id,
            owner_id,
            collection_id,
            state: ReviewState::new_item(now),
            updated_at: now,
        }
    }

    pub fn next_due_at(&self) -> DateTime<Utc> {
        self.state.next_due_at
    }
}

/// Immutable record of a single completed review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub id: Uuid,
    pub item_id: Uuid,
    pub owner_id: Uuid,
    pub collection_id: Uuid,
    pub grade: Grade,
    pub occurred_at: DateTime<Utc>,
    pub interval_before: u32,
    pub interval_after: u32,
    pub difficulty_before: f64,
    pub difficulty_after: f64,
}

impl ReviewEvent {
    /// Build the event describing the transition `before -> after` for an item.
    pub fn record(
        item: &ItemState,
        grade: Grade,
        after: &ReviewState,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_id: item.item_id,
            owner_id: item.owner_id,
            collection_id: item.collection_id,
            grade,
            occurred_at,
            interval_before: item.state.interval_days,
            interval_after: after.interval_days,
            difficulty_before: item.state.difficulty,
            difficulty_after: after.difficulty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_round_trips_through_ordinal() {
        for value in 0..=3 {
            let grade = Grade::from_value(value).unwrap();
            assert_eq!(grade.to_value() as i64, value);
        }
    }

    #[test]
    fn grade_rejects_out_of_range() {
        assert_eq!(Grade::from_value(4), Err(ScheduleError::InvalidGrade(4)));
        assert_eq!(Grade::from_value(-1), Err(ScheduleError::InvalidGrade(-1)));
    }

    #[test]
    fn new_item_is_due_immediately() {
        let now = Utc::now();
        let state = ReviewState::new_item(now);
        assert_eq!(state.next_due_at, now);
        assert_eq!(state.interval_days, 0);
        assert!(state.is_new());
        assert!(!state.is_mastered());
    }

    #[test]
    fn mastery_requires_both_thresholds() {
        let now = Utc::now();
        let mut state = ReviewState::new_item(now);
        state.interval_days = 7;
        state.difficulty = 2.0;
        assert!(state.is_mastered());

        state.difficulty = 1.95;
        assert!(!state.is_mastered());

        state.difficulty = 2.5;
        state.interval_days = 6;
        assert!(!state.is_mastered());
    }

    #[test]
    fn item_state_serializes_flat() {
        let now = Utc::now();
        let item = ItemState::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), now);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["interval_days"], 0);
        assert_eq!(json["difficulty"], 2.5);
        assert!(json.get("state").is_none());
    }
}
