//! Review write path.
//!
//! Ground truth is committed first and is the only step that can fail the
//! request. Index, counter, streak and stats-cache updates follow on a
//! best-effort basis and self-heal on later reads.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use study_core::{local_date, Grade, ItemState, SpacedRepetitionAlgorithm, TimezoneOffset};

use crate::db::{CommittedReview, GroundTruthStore, StoreError};
use crate::error::{ApiError, Result};
use crate::models::{DailyProgress, StreakSummary, StudyEvent, SubmitReviewResponse};
use crate::services::daily::{DailyCounter, StreakTracker};
use crate::services::due_queue::DueQueue;
use crate::services::events::{EventBus, Leveling};
use crate::services::stats::StatsAggregator;

/// A review as submitted by an authenticated owner.
#[derive(Debug, Clone, Copy)]
pub struct ReviewSubmission {
    pub owner_id: Uuid,
    pub item_id: Uuid,
    pub grade: i64,
    pub timezone_offset_hours: f64,
}

#[derive(Clone)]
pub struct ReviewCoordinator {
    store: Arc<dyn GroundTruthStore>,
    algorithm: Arc<dyn SpacedRepetitionAlgorithm>,
    due_queue: DueQueue,
    counter: DailyCounter,
    streaks: StreakTracker,
    stats: StatsAggregator,
    events: EventBus,
    leveling: Option<Arc<dyn Leveling>>,
    daily_goal: u64,
}

impl ReviewCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn GroundTruthStore>,
        algorithm: Arc<dyn SpacedRepetitionAlgorithm>,
        due_queue: DueQueue,
        counter: DailyCounter,
        streaks: StreakTracker,
        stats: StatsAggregator,
        events: EventBus,
        daily_goal: u64,
    ) -> Self {
        Self {
            store,
            algorithm,
            due_queue,
            counter,
            streaks,
            stats,
            events,
            leveling: None,
            daily_goal,
        }
    }

    pub fn with_leveling(mut self, leveling: Arc<dyn Leveling>) -> Self {
        self.leveling = Some(leveling);
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub async fn submit_review(
        &self,
        submission: ReviewSubmission,
        now: DateTime<Utc>,
    ) -> Result<SubmitReviewResponse> {
        let ReviewSubmission {
            owner_id,
            item_id,
            ..
        } = submission;

        match self.store.get_item_state(item_id).await? {
            Some(item) if item.owner_id == owner_id => {}
            _ => return Err(ApiError::NotFound(format!("Item {} not found", item_id))),
        }

        let grade = Grade::from_value(submission.grade)?;
        let offset = TimezoneOffset::from_hours(submission.timezone_offset_hours)?;

        let committed = self
            .store
            .commit_review(owner_id, item_id, grade, now, self.algorithm.as_ref())
            .await
            .map_err(|e| {
                if !matches!(e, StoreError::NotFound(_)) {
                    tracing::error!(%owner_id, %item_id, error = %e, "review commit failed");
                }
                match e {
                    StoreError::Database(db) => ApiError::GroundTruthWrite(db.to_string()),
                    other => ApiError::from(other),
                }
            })?;

        tracing::info!(
            %owner_id,
            %item_id,
            grade = grade.to_value(),
            interval = committed.after.state.interval_days,
            algorithm = self.algorithm.name(),
            "review committed"
        );

        let today = local_date(now, offset);

        if !self.due_queue.upsert(&committed.after).await {
            tracing::warn!(%owner_id, %item_id, "due-queue update skipped");
        }

        let studied_today = self.count_review(owner_id, offset, now).await;

        let streak = match self.streaks.refresh(owner_id, offset, now).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(%owner_id, error = %e, "streak refresh failed");
                self.streaks
                    .cached(owner_id, offset, now)
                    .await
                    .unwrap_or_default()
            }
        };

        self.stats.invalidate(owner_id).await;

        let due_today = self.stats.due_today(owner_id, now).await.unwrap_or_else(|e| {
            tracing::warn!(%owner_id, error = %e, "due count unavailable");
            0
        });

        self.emit_events(&committed, today, studied_today);

        Ok(SubmitReviewResponse {
            new_interval: committed.after.state.interval_days,
            new_difficulty: committed.after.state.difficulty,
            next_due_at: committed.after.next_due_at(),
            daily_progress: DailyProgress {
                studied_today,
                due_today,
                goal: self.daily_goal,
                goal_completed: studied_today >= self.daily_goal,
            },
            streak: StreakSummary::from(&streak),
        })
    }

    /// Create an item's state at the item boundary and index it.
    pub async fn create_item(
        &self,
        owner_id: Uuid,
        item_id: Uuid,
        collection_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ItemState> {
        if self.store.get_item_state(item_id).await?.is_some() {
            return Err(ApiError::BadRequest(format!("Item {} already exists", item_id)));
        }

        let item = ItemState {
            state: self.algorithm.initial_state(now),
            ..ItemState::new(item_id, owner_id, collection_id, now)
        };
        self.store.persist_item_state(&item).await?;
        self.due_queue.upsert(&item).await;
        self.stats.invalidate(owner_id).await;

        tracing::info!(%owner_id, %item_id, %collection_id, "item created");
        Ok(item)
    }

    /// Delete an item's state and drop it from the index.
    pub async fn delete_item(&self, owner_id: Uuid, item_id: Uuid) -> Result<()> {
        let item = match self.store.get_item_state(item_id).await? {
            Some(item) if item.owner_id == owner_id => item,
            _ => return Err(ApiError::NotFound(format!("Item {} not found", item_id))),
        };

        if !self.store.delete_item_state(item_id, owner_id).await? {
            return Err(ApiError::NotFound(format!("Item {} not found", item_id)));
        }
        self.due_queue.remove(&item).await;
        self.stats.invalidate(owner_id).await;

        tracing::info!(%owner_id, %item_id, "item deleted");
        Ok(())
    }

    /// Post-commit counter increment with ground-truth fallback.
    ///
    /// A counter that starts at 1 may have been recreated after a flush, so
    /// the reported value is checked against the day's review log. The
    /// counter itself is left for the stats read path to repair.
    async fn count_review(
        &self,
        owner_id: Uuid,
        offset: TimezoneOffset,
        now: DateTime<Utc>,
    ) -> u64 {
        let today = local_date(now, offset);
        match self.counter.increment(owner_id, today).await {
            Some(1) => self.day_count(owner_id, today, offset).await.max(1),
            Some(count) => count,
            None => {
                tracing::warn!(%owner_id, "daily counter unavailable, counting from ground truth");
                self.day_count(owner_id, today, offset).await
            }
        }
    }

    async fn day_count(&self, owner_id: Uuid, today: NaiveDate, offset: TimezoneOffset) -> u64 {
        self.counter
            .ground_truth_count(owner_id, today, offset)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(%owner_id, error = %e, "ground-truth day count failed");
                0
            })
    }

    fn emit_events(
        &self,
        committed: &CommittedReview,
        today: NaiveDate,
        studied_today: u64,
    ) {
        let owner_id = committed.event.owner_id;

        if let Some(level) = self
            .leveling
            .as_ref()
            .and_then(|l| l.on_review(owner_id, &committed.event))
        {
            self.events.publish(StudyEvent::LevelUp {
                owner_id,
                item_id: committed.event.item_id,
                new_level: level.new_level,
                total_xp: level.total_xp,
                occurred_at: committed.event.occurred_at,
            });
        }

        if self.daily_goal > 0 && studied_today == self.daily_goal {
            self.events.publish(StudyEvent::DailyGoalReached {
                owner_id,
                local_date: today,
                studied_today,
                goal: self.daily_goal,
            });
        }
    }
}
