//! Core study-scheduling library shared by the backend service and its tests.
//!
//! Provides:
//! - Spaced repetition scheduling (SM-2 variant with a fixed learning ramp)
//! - Local calendar-day bucketing for client timezone offsets
//! - Streak derivation from active study days
//! - Shared types (ItemState, ReviewEvent, Grade, etc.)

pub mod algorithm;
pub mod calendar;
pub mod error;
pub mod stats;
pub mod streak;
pub mod types;

pub use algorithm::{sm2::Sm2, SpacedRepetitionAlgorithm};
pub use calendar::{date_key, local_date, local_day_bounds, TimezoneOffset};
pub use error::{Result, ScheduleError};
pub use stats::{average_per_active_day, ItemBuckets};
pub use streak::StreakRecord;
pub use types::{Grade, ItemState, ReviewEvent, ReviewState};
