//! Consecutive-day streak derivation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Streak summary for one owner, derived from the local dates that have at
/// least one review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakRecord {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_active_local_date: Option<NaiveDate>,
    pub active_days: u32,
}

impl StreakRecord {
    /// Derive the record from every local date with a review.
    ///
    /// The current streak counts back from `today`, or from yesterday when
    /// nothing has been studied yet today, and stops at the first gap.
    pub fn from_active_dates(dates: &BTreeSet<NaiveDate>, today: NaiveDate) -> Self {
        let mut current_streak = 0u32;
        let mut cursor = if dates.contains(&today) {
            Some(today)
        } else {
            today.pred_opt()
        };

        while let Some(day) = cursor {
            if !dates.contains(&day) {
                break;
            }
            current_streak += 1;
            cursor = day.pred_opt();
        }

        Self {
            current_streak,
            longest_streak: longest_run(dates).max(current_streak),
            last_active_local_date: dates.range(..=today).next_back().copied(),
            active_days: dates.len() as u32,
        }
    }

    /// Keep `longest_streak` from ever going backwards relative to a record
    /// computed earlier.
    pub fn merge_longest(mut self, previous: Option<&StreakRecord>) -> Self {
        if let Some(prev) = previous {
            self.longest_streak = self.longest_streak.max(prev.longest_streak);
        }
        self
    }

    /// Re-evaluate a cached record on a later day: a streak whose last active
    /// day is older than yesterday is broken.
    pub fn as_of(&self, today: NaiveDate) -> Self {
        let mut record = self.clone();
        let alive = match (self.last_active_local_date, today.pred_opt()) {
            (Some(last), Some(yesterday)) => last >= yesterday,
            _ => false,
        };
        if !alive {
            record.current_streak = 0;
        }
        record
    }
}

fn longest_run(dates: &BTreeSet<NaiveDate>) -> u32 {
    let mut longest = 0u32;
    let mut run = 0u32;
    let mut prev: Option<NaiveDate> = None;

    for &day in dates {
        run = match prev {
            Some(p) if p.succ_opt() == Some(day) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        prev = Some(day);
    }

    longest
}
