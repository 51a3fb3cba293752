//! Cache-aside stats rollup with repair on miss.
//!
//! Live values (due count, today's count, streak) are always read from their
//! own components; only the slow-moving bucket counts and totals sit in the
//! snapshot cache.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use study_core::{average_per_active_day, ItemBuckets, StreakRecord, TimezoneOffset};

use crate::cache::Cache;
use crate::db::GroundTruthStore;
use crate::error::Result;
use crate::models::{StatsResponse, StatsSnapshot};
use crate::services::daily::{DailyCounter, StreakTracker};
use crate::services::due_queue::DueQueue;

fn stats_key(owner_id: Uuid) -> String {
    format!("stats:{}", owner_id)
}

#[derive(Clone)]
pub struct StatsAggregator {
    store: Arc<dyn GroundTruthStore>,
    cache: Cache,
    due_queue: DueQueue,
    counter: DailyCounter,
    streaks: StreakTracker,
    ttl: Duration,
}

impl StatsAggregator {
    pub fn new(
        store: Arc<dyn GroundTruthStore>,
        cache: Cache,
        due_queue: DueQueue,
        counter: DailyCounter,
        streaks: StreakTracker,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            due_queue,
            counter,
            streaks,
            ttl,
        }
    }

    pub async fn get_stats(
        &self,
        owner_id: Uuid,
        offset: TimezoneOffset,
        now: DateTime<Utc>,
    ) -> Result<StatsResponse> {
        let cached: Option<StatsSnapshot> = self
            .cache
            .get_json::<StatsSnapshot>(&stats_key(owner_id))
            .await
            .filter(|s| s.offset_seconds == offset.seconds());

        let (snapshot, streak, studied_today) = match cached {
            Some(snapshot) => {
                tracing::debug!(%owner_id, "stats cache hit");
                let streak = self.streaks.get(owner_id, offset, now).await?;
                let studied_today = self.counter.studied_today(owner_id, offset, now).await?;
                (snapshot, streak, studied_today)
            }
            None => {
                tracing::debug!(%owner_id, "stats cache miss, recomputing");
                self.recompute(owner_id, offset, now).await?
            }
        };

        let due_today = self.due_today(owner_id, now).await?;

        Ok(StatsResponse {
            total: snapshot.buckets.total,
            new: snapshot.buckets.new,
            learning: snapshot.buckets.learning,
            mastered: snapshot.buckets.mastered,
            due_today,
            studied_today,
            current_streak: streak.current_streak,
            longest_streak: streak.longest_streak,
            total_reviews: snapshot.total_reviews,
            avg_reviews_per_active_day: snapshot.avg_reviews_per_active_day,
        })
    }

    /// Drop the cached snapshot; the next read recomputes it.
    pub async fn invalidate(&self, owner_id: Uuid) -> bool {
        self.cache.delete(&stats_key(owner_id)).await
    }

    /// Due count from the index, or from ground truth when the index is down.
    pub async fn due_today(&self, owner_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
        match self.due_queue.count_due(owner_id, now).await {
            Some(count) => Ok(count),
            None => Ok(self.store.count_due_items(owner_id, now).await?),
        }
    }

    async fn recompute(
        &self,
        owner_id: Uuid,
        offset: TimezoneOffset,
        now: DateTime<Utc>,
    ) -> Result<(StatsSnapshot, StreakRecord, u64)> {
        let states = self.store.get_item_states_by_owner(owner_id).await?;
        self.due_queue.reconcile(owner_id, &states).await;
        let studied_today = self.counter.reconcile(owner_id, offset, now).await?;

        let buckets = ItemBuckets::from_states(states.iter().map(|s| &s.state));
        let total_reviews = self.store.count_reviews(owner_id).await?;
        let streak = self.streaks.refresh(owner_id, offset, now).await?;

        let snapshot = StatsSnapshot {
            buckets,
            total_reviews,
            avg_reviews_per_active_day: average_per_active_day(total_reviews, streak.active_days),
            offset_seconds: offset.seconds(),
            computed_at: now,
        };

        self.cache
            .set_json(&stats_key(owner_id), &snapshot, Some(self.ttl))
            .await;

        Ok((snapshot, streak, studied_today))
    }
}
