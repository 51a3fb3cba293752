//! SM-2 spaced repetition algorithm.
//!
//! A SuperMemo 2 variant: young items follow a fixed ramp (1 day, 3 days,
//! then x1.5) until they reach the mastery interval, after which intervals
//! grow by the item's difficulty factor.

use super::SpacedRepetitionAlgorithm;
use crate::types::{Grade, ReviewState, MASTERY_INTERVAL_DAYS};
use chrono::{DateTime, Duration, Utc};

/// SM-2 algorithm with configurable parameters.
///
/// Difficulty is stored at two decimal places after every adjustment.
#[derive(Debug, Clone)]
pub struct Sm2 {
    pub initial_difficulty: f64,
    pub minimum_difficulty: f64,
    pub maximum_difficulty: f64,
    pub maximum_interval: u32,
    pub relearn_delay_minutes: i64,
    pub again_penalty: f64,
    pub hard_penalty: f64,
    pub hard_multiplier: f64,
    pub good_bonus: f64,
    pub easy_bonus: f64,
    pub ramp_multiplier: f64,
}

impl Default for Sm2 {
    fn default() -> Self {
        Self {
            initial_difficulty: 2.5,
            minimum_difficulty: 1.3,
            maximum_difficulty: 2.5,
            maximum_interval: 180,
            relearn_delay_minutes: 10,
            again_penalty: 0.2,
            hard_penalty: 0.15,
            hard_multiplier: 0.5,
            good_bonus: 0.05,
            easy_bonus: 0.15,
            ramp_multiplier: 1.5,
        }
    }
}

impl SpacedRepetitionAlgorithm for Sm2 {
    fn name(&self) -> &'static str {
        "sm2"
    }

    fn initial_state(&self, now: DateTime<Utc>) -> ReviewState {
        ReviewState {
            interval_days: 0,
            difficulty: self.initial_difficulty,
            next_due_at: now,
            reviews_count: 0,
        }
    }

    fn schedule(&self, state: &ReviewState, grade: Grade, now: DateTime<Utc>) -> ReviewState {
        let (interval, difficulty) = match grade {
            Grade::Again => (0, state.difficulty - self.again_penalty),
            Grade::Hard => {
                let halved = (state.interval_days as f64 * self.hard_multiplier).floor() as u32;
                (halved.max(1), state.difficulty - self.hard_penalty)
            }
            Grade::Good => (self.grow(state), state.difficulty + self.good_bonus),
            Grade::Easy => (self.grow(state), state.difficulty + self.easy_bonus),
        };

        let interval_days = interval.min(self.maximum_interval);
        let difficulty = self.clamp_difficulty(difficulty);

        let next_due_at = if interval_days == 0 {
            now + Duration::minutes(self.relearn_delay_minutes)
        } else {
            now + Duration::days(interval_days as i64)
        };

        ReviewState {
            interval_days,
            difficulty,
            next_due_at,
            reviews_count: state.reviews_count + 1,
        }
    }
}

impl Sm2 {
    /// Interval growth for a passing grade, driven by the prior interval.
    fn grow(&self, state: &ReviewState) -> u32 {
        let interval = state.interval_days;
        match interval {
            0 => 1,
            1 => 3,
            i if i < MASTERY_INTERVAL_DAYS => (i as f64 * self.ramp_multiplier).round() as u32,
            i => (i as f64 * state.difficulty).round() as u32,
        }
    }

    fn clamp_difficulty(&self, difficulty: f64) -> f64 {
        // Two decimals keep repeated 0.05 steps from drifting across thresholds.
        let rounded = (difficulty * 100.0).round() / 100.0;
        rounded.clamp(self.minimum_difficulty, self.maximum_difficulty)
    }
}
