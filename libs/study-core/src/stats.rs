//! Item bucket summaries used by study statistics.

use serde::{Deserialize, Serialize};

use crate::types::ReviewState;

/// Partition of an owner's items into new, learning and mastered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemBuckets {
    pub total: u64,
    pub new: u64,
    pub learning: u64,
    pub mastered: u64,
}

impl ItemBuckets {
    pub fn from_states<'a, I>(states: I) -> Self
    where
        I: IntoIterator<Item = &'a ReviewState>,
    {
        let mut buckets = Self::default();
        for state in states {
            buckets.total += 1;
            if state.is_new() {
                buckets.new += 1;
            } else if state.is_mastered() {
                buckets.mastered += 1;
            } else {
                buckets.learning += 1;
            }
        }
        buckets
    }
}

/// Average reviews per day with at least one review, rounded to 2 decimals.
pub fn average_per_active_day(total_reviews: u64, active_days: u32) -> f64 {
    if active_days == 0 {
        return 0.0;
    }
    let avg = total_reviews as f64 / active_days as f64;
    (avg * 100.0).round() / 100.0
}
