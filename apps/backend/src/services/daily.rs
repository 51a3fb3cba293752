//! Per-local-day review counters and the derived study streak.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use study_core::{date_key, local_date, local_day_bounds, StreakRecord, TimezoneOffset};

use crate::cache::Cache;
use crate::db::{GroundTruthStore, StoreResult};

fn counter_key(owner_id: Uuid, date: NaiveDate) -> String {
    format!("daily:{}:{}", owner_id, date_key(date))
}

fn streak_key(owner_id: Uuid) -> String {
    format!("streak:{}", owner_id)
}

/// Atomic count of reviews per owner and local calendar day.
#[derive(Clone)]
pub struct DailyCounter {
    cache: Cache,
    store: Arc<dyn GroundTruthStore>,
    ttl: Duration,
}

impl DailyCounter {
    pub fn new(cache: Cache, store: Arc<dyn GroundTruthStore>, ttl: Duration) -> Self {
        Self { cache, store, ttl }
    }

    /// Count one review; returns the post-increment value.
    pub async fn increment(&self, owner_id: Uuid, date: NaiveDate) -> Option<u64> {
        self.cache
            .incr_by(&counter_key(owner_id, date), 1, self.ttl)
            .await
            .map(|v| v.max(0) as u64)
    }

    /// Current counter value; `None` for a missing key or an unreachable cache.
    pub async fn get(&self, owner_id: Uuid, date: NaiveDate) -> Option<u64> {
        let raw = self.cache.get(&counter_key(owner_id, date)).await?;
        match raw.parse::<i64>() {
            Ok(v) => Some(v.max(0) as u64),
            Err(_) => {
                tracing::warn!(%owner_id, %date, value = %raw, "non-numeric daily counter");
                None
            }
        }
    }

    /// Raise the counter to `ground_truth` by adding the missing delta, so an
    /// increment that lands concurrently is kept.
    pub async fn repair(
        &self,
        owner_id: Uuid,
        date: NaiveDate,
        observed: u64,
        ground_truth: u64,
    ) -> Option<u64> {
        if ground_truth <= observed {
            return Some(observed);
        }
        let delta = (ground_truth - observed) as i64;
        tracing::warn!(%owner_id, %date, observed, ground_truth, "daily counter drift, repairing");
        self.cache
            .incr_by(&counter_key(owner_id, date), delta, self.ttl)
            .await
            .map(|v| v.max(0) as u64)
    }

    /// Reviews in ground truth for the local `date` at `offset`.
    pub async fn ground_truth_count(
        &self,
        owner_id: Uuid,
        date: NaiveDate,
        offset: TimezoneOffset,
    ) -> StoreResult<u64> {
        let (start, end) = local_day_bounds(date, offset);
        self.store.count_reviews_between(owner_id, start, end).await
    }

    /// Today's count for reads.
    ///
    /// A counter reading zero (or unreadable) is checked against ground truth
    /// and repaired when reviews exist; the ground-truth count is returned.
    pub async fn studied_today(
        &self,
        owner_id: Uuid,
        offset: TimezoneOffset,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let today = local_date(now, offset);
        let observed = self.get(owner_id, today).await;
        if let Some(count) = observed.filter(|c| *c > 0) {
            return Ok(count);
        }

        let truth = self.ground_truth_count(owner_id, today, offset).await?;
        if truth > 0 {
            self.repair(owner_id, today, observed.unwrap_or(0), truth).await;
        }
        Ok(truth)
    }

    /// Raise today's counter to the ground-truth count when it is behind,
    /// whatever its current value. Used on the stats recompute path.
    ///
    /// Ground truth is counted before the counter is read; a review that
    /// commits in between only shows up as a later increment.
    pub async fn reconcile(
        &self,
        owner_id: Uuid,
        offset: TimezoneOffset,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let today = local_date(now, offset);
        let truth = self.ground_truth_count(owner_id, today, offset).await?;
        let observed = self.get(owner_id, today).await.unwrap_or(0);
        if observed >= truth {
            return Ok(observed);
        }
        Ok(self
            .repair(owner_id, today, observed, truth)
            .await
            .unwrap_or(truth))
    }
}

/// Derives and caches each owner's streak record.
#[derive(Clone)]
pub struct StreakTracker {
    cache: Cache,
    store: Arc<dyn GroundTruthStore>,
    ttl: Duration,
}

impl StreakTracker {
    pub fn new(cache: Cache, store: Arc<dyn GroundTruthStore>, ttl: Duration) -> Self {
        Self { cache, store, ttl }
    }

    /// Recompute from ground truth and cache the result.
    pub async fn refresh(
        &self,
        owner_id: Uuid,
        offset: TimezoneOffset,
        now: DateTime<Utc>,
    ) -> StoreResult<StreakRecord> {
        let dates = self.store.get_active_local_dates(owner_id, offset).await?;
        let previous: Option<StreakRecord> = self.cache.get_json(&streak_key(owner_id)).await;

        let record = StreakRecord::from_active_dates(&dates, local_date(now, offset))
            .merge_longest(previous.as_ref());

        self.cache
            .set_json(&streak_key(owner_id), &record, Some(self.ttl))
            .await;
        Ok(record)
    }

    /// Cached record evaluated as of today, recomputing on a miss.
    pub async fn get(
        &self,
        owner_id: Uuid,
        offset: TimezoneOffset,
        now: DateTime<Utc>,
    ) -> StoreResult<StreakRecord> {
        match self.cached(owner_id, offset, now).await {
            Some(record) => Ok(record),
            None => self.refresh(owner_id, offset, now).await,
        }
    }

    pub async fn cached(
        &self,
        owner_id: Uuid,
        offset: TimezoneOffset,
        now: DateTime<Utc>,
    ) -> Option<StreakRecord> {
        let record: StreakRecord = self.cache.get_json(&streak_key(owner_id)).await?;
        Some(record.as_of(local_date(now, offset)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::MemoryStore;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use pretty_assertions::assert_eq;
    use study_core::{Grade, ItemState, ReviewEvent, ReviewState};

    struct Fixture {
        store: Arc<MemoryStore>,
        cache_store: Arc<MemoryCache>,
        counter: DailyCounter,
        streaks: StreakTracker,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let cache_store = Arc::new(MemoryCache::new());
        let cache = Cache::new(cache_store.clone(), Duration::from_millis(100));
        Fixture {
            counter: DailyCounter::new(cache.clone(), store.clone(), Duration::from_secs(3600)),
            streaks: StreakTracker::new(cache, store.clone(), Duration::from_secs(3600)),
            store,
            cache_store,
        }
    }

    fn review_at(owner_id: Uuid, at: DateTime<Utc>) -> ReviewEvent {
        let item = ItemState::new(Uuid::new_v4(), owner_id, Uuid::new_v4(), at);
        let after = ReviewState {
            interval_days: 1,
            ..item.state.clone()
        };
        ReviewEvent::record(&item, Grade::Good, &after, at)
    }

    #[tokio::test]
    async fn concurrent_increments_are_all_counted() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let counter = f.counter.clone();
                tokio::spawn(async move { counter.increment(owner, date).await })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            assert!(result.unwrap().is_some());
        }

        assert_eq!(f.counter.get(owner, date).await, Some(50));
    }

    #[tokio::test]
    async fn counters_are_per_local_day() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let next = day.succ_opt().unwrap();

        f.counter.increment(owner, day).await;
        f.counter.increment(owner, day).await;
        f.counter.increment(owner, next).await;

        assert_eq!(f.counter.get(owner, day).await, Some(2));
        assert_eq!(f.counter.get(owner, next).await, Some(1));
    }

    #[tokio::test]
    async fn studied_today_repairs_empty_counter() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 15, 0, 0).unwrap();
        for i in 0..5 {
            f.store.insert_review(review_at(owner, now - ChronoDuration::minutes(i * 10)));
        }
        // Yesterday's review must not count.
        f.store.insert_review(review_at(owner, now - ChronoDuration::days(1)));

        let studied = f
            .counter
            .studied_today(owner, TimezoneOffset::UTC, now)
            .await
            .unwrap();
        assert_eq!(studied, 5);
        assert_eq!(f.counter.get(owner, now.date_naive()).await, Some(5));
    }

    #[tokio::test]
    async fn repair_keeps_concurrent_increment() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();

        // Observed 0, then a live increment lands before the repair.
        f.counter.increment(owner, date).await;
        let repaired = f.counter.repair(owner, date, 0, 4).await;
        assert_eq!(repaired, Some(5));
    }

    #[tokio::test]
    async fn local_day_follows_offset() {
        let f = fixture();
        let owner = Uuid::new_v4();
        // 23:30 UTC on the 9th is already the 10th at UTC+2.
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 23, 30, 0).unwrap();
        f.store.insert_review(review_at(owner, at));

        let plus_two = TimezoneOffset::from_hours(2.0).unwrap();
        let tenth = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let ninth = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

        assert_eq!(f.counter.ground_truth_count(owner, tenth, plus_two).await.unwrap(), 1);
        assert_eq!(f.counter.ground_truth_count(owner, ninth, plus_two).await.unwrap(), 0);
        assert_eq!(
            f.counter.ground_truth_count(owner, ninth, TimezoneOffset::UTC).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn streak_counts_back_to_first_gap() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        for days_ago in [0, 1, 2, 4, 5] {
            f.store.insert_review(review_at(owner, now - ChronoDuration::days(days_ago)));
        }

        let record = f.streaks.refresh(owner, TimezoneOffset::UTC, now).await.unwrap();
        assert_eq!(record.current_streak, 3);
        assert_eq!(record.longest_streak, 3);
        assert_eq!(record.active_days, 5);
        assert_eq!(record.last_active_local_date, Some(now.date_naive()));
    }

    #[tokio::test]
    async fn cached_streak_breaks_after_idle_day() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        f.store.insert_review(review_at(owner, now));
        f.store.insert_review(review_at(owner, now - ChronoDuration::days(1)));
        f.streaks.refresh(owner, TimezoneOffset::UTC, now).await.unwrap();

        let tomorrow = f
            .streaks
            .get(owner, TimezoneOffset::UTC, now + ChronoDuration::days(1))
            .await
            .unwrap();
        assert_eq!(tomorrow.current_streak, 2);

        let later = f
            .streaks
            .get(owner, TimezoneOffset::UTC, now + ChronoDuration::days(2))
            .await
            .unwrap();
        assert_eq!(later.current_streak, 0);
        assert_eq!(later.longest_streak, 2);
    }

    #[tokio::test]
    async fn longest_streak_never_decreases() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        // 23:00 and 01:00 UTC on consecutive days.
        f.store.insert_review(review_at(owner, Utc.with_ymd_and_hms(2024, 3, 8, 23, 0, 0).unwrap()));
        f.store.insert_review(review_at(owner, Utc.with_ymd_and_hms(2024, 3, 10, 1, 0, 0).unwrap()));
        f.store.insert_review(review_at(owner, Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap()));

        let utc = f.streaks.refresh(owner, TimezoneOffset::UTC, now).await.unwrap();
        assert_eq!(utc.longest_streak, 3);

        // At UTC+2 the first two reviews fall on the 9th and 10th, so the
        // active set shrinks to two days; the longest run must hold.
        let plus_two = TimezoneOffset::from_hours(2.0).unwrap();
        let shifted = f.streaks.refresh(owner, plus_two, now).await.unwrap();
        assert_eq!(shifted.active_days, 2);
        assert_eq!(shifted.longest_streak, 3);
    }

    #[tokio::test]
    async fn offline_cache_still_derives_streak() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let now = Utc::now();
        f.store.insert_review(review_at(owner, now));
        f.cache_store.set_available(false);

        let record = f.streaks.get(owner, TimezoneOffset::UTC, now).await.unwrap();
        assert_eq!(record.current_streak, 1);
        assert_eq!(f.counter.increment(owner, now.date_naive()).await, None);
        assert_eq!(
            f.counter.studied_today(owner, TimezoneOffset::UTC, now).await.unwrap(),
            1
        );
    }
}
