//! Spaced repetition algorithm implementations.

pub mod sm2;

use crate::types::{Grade, ReviewState};
use chrono::{DateTime, Utc};

/// Trait for spaced repetition algorithms.
pub trait SpacedRepetitionAlgorithm: Send + Sync {
    /// Algorithm identifier.
    fn name(&self) -> &'static str;

    /// Calculate next review state after a review.
    fn schedule(&self, state: &ReviewState, grade: Grade, now: DateTime<Utc>) -> ReviewState;

    /// Initial state for a new item.
    fn initial_state(&self, now: DateTime<Utc>) -> ReviewState;
}
