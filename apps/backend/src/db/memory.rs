//! In-memory ground-truth store for local development and tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use study_core::{
    local_date, Grade, ItemState, ReviewEvent, SpacedRepetitionAlgorithm, TimezoneOffset,
};

use super::{CommittedReview, GroundTruthStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Tables {
    items: HashMap<Uuid, ItemState>,
    reviews: Vec<ReviewEvent>,
}

/// Ground-truth store held in process memory.
///
/// Item state and review log share one lock so a commit is all-or-nothing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, to exercise abort paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Append a review event directly, bypassing the scheduler. Used to seed
    /// history.
    pub fn insert_review(&self, event: ReviewEvent) {
        self.lock().reviews.push(event);
    }

    pub fn review_count(&self) -> usize {
        self.lock().reviews.len()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed("memory store rejecting writes".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl GroundTruthStore for MemoryStore {
    async fn get_item_state(&self, item_id: Uuid) -> StoreResult<Option<ItemState>> {
        Ok(self.lock().items.get(&item_id).cloned())
    }

    async fn persist_item_state(&self, item: &ItemState) -> StoreResult<()> {
        self.check_writable()?;
        let mut tables = self.lock();
        match tables.items.get(&item.item_id) {
            Some(existing) if existing.owner_id != item.owner_id => {}
            _ => {
                tables.items.insert(item.item_id, item.clone());
            }
        }
        Ok(())
    }

    async fn delete_item_state(&self, item_id: Uuid, owner_id: Uuid) -> StoreResult<bool> {
        self.check_writable()?;
        let mut tables = self.lock();
        let owned = tables
            .items
            .get(&item_id)
            .is_some_and(|item| item.owner_id == owner_id);
        if owned {
            tables.items.remove(&item_id);
        }
        Ok(owned)
    }

    async fn commit_review(
        &self,
        owner_id: Uuid,
        item_id: Uuid,
        grade: Grade,
        now: DateTime<Utc>,
        algorithm: &dyn SpacedRepetitionAlgorithm,
    ) -> StoreResult<CommittedReview> {
        let mut tables = self.lock();

        let before = match tables.items.get(&item_id) {
            Some(item) if item.owner_id == owner_id => item.clone(),
            _ => return Err(StoreError::NotFound(item_id)),
        };
        self.check_writable()?;

        let new_state = algorithm.schedule(&before.state, grade, now);
        let event = ReviewEvent::record(&before, grade, &new_state, now);
        let after = ItemState {
            state: new_state,
            updated_at: now,
            ..before.clone()
        };

        tables.items.insert(item_id, after.clone());
        tables.reviews.push(event.clone());

        Ok(CommittedReview {
            before,
            after,
            event,
        })
    }

    async fn get_item_states_by_owner(&self, owner_id: Uuid) -> StoreResult<Vec<ItemState>> {
        let mut items: Vec<ItemState> = self
            .lock()
            .items
            .values()
            .filter(|item| item.owner_id == owner_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.state.next_due_at);
        Ok(items)
    }

    async fn count_due_items(&self, owner_id: Uuid, at: DateTime<Utc>) -> StoreResult<u64> {
        Ok(self
            .lock()
            .items
            .values()
            .filter(|item| item.owner_id == owner_id && item.state.next_due_at <= at)
            .count() as u64)
    }

    async fn count_reviews_between(
        &self,
        owner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<u64> {
        Ok(self
            .lock()
            .reviews
            .iter()
            .filter(|r| r.owner_id == owner_id && r.occurred_at >= start && r.occurred_at < end)
            .count() as u64)
    }

    async fn count_reviews(&self, owner_id: Uuid) -> StoreResult<u64> {
        Ok(self
            .lock()
            .reviews
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .count() as u64)
    }

    async fn get_active_local_dates(
        &self,
        owner_id: Uuid,
        offset: TimezoneOffset,
    ) -> StoreResult<BTreeSet<NaiveDate>> {
        Ok(self
            .lock()
            .reviews
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .map(|r| local_date(r.occurred_at, offset))
            .collect())
    }

    async fn get_reviews_for_item(&self, item_id: Uuid) -> StoreResult<Vec<ReviewEvent>> {
        let mut reviews: Vec<ReviewEvent> = self
            .lock()
            .reviews
            .iter()
            .filter(|r| r.item_id == item_id)
            .cloned()
            .collect();
        reviews.sort_by_key(|r| r.occurred_at);
        Ok(reviews)
    }
}
