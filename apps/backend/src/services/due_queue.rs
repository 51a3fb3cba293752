//! Due-queue index: per-owner sorted sets of item ids scored by due instant.
//!
//! The index lives in the cache and is never authoritative. A readiness
//! marker records that an owner's index has been populated; when it is
//! missing (cold start, eviction, flush) the index is rebuilt from the
//! ground-truth store before it is read.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use study_core::ItemState;

use crate::cache::Cache;
use crate::db::{GroundTruthStore, StoreResult};

fn owner_key(owner_id: Uuid) -> String {
    format!("due:{}", owner_id)
}

fn collection_key(owner_id: Uuid, collection_id: Uuid) -> String {
    format!("due:{}:{}", owner_id, collection_id)
}

fn ready_key(owner_id: Uuid) -> String {
    format!("due:{}:ready", owner_id)
}

fn score(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// What a reconcile pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub indexed: usize,
    pub rewritten: usize,
    pub removed: usize,
}

impl ReconcileReport {
    pub fn drifted(&self) -> bool {
        self.rewritten > 0 || self.removed > 0
    }
}

#[derive(Clone)]
pub struct DueQueue {
    cache: Cache,
    store: Arc<dyn GroundTruthStore>,
}

impl DueQueue {
    pub fn new(cache: Cache, store: Arc<dyn GroundTruthStore>) -> Self {
        Self { cache, store }
    }

    /// Insert or move an item in its owner and collection sets.
    pub async fn upsert(&self, item: &ItemState) -> bool {
        let member = item.item_id.to_string();
        let due = score(item.next_due_at());
        let owner = self.cache.zadd(&owner_key(item.owner_id), &member, due).await;
        let collection = self
            .cache
            .zadd(&collection_key(item.owner_id, item.collection_id), &member, due)
            .await;
        owner && collection
    }

    pub async fn remove(&self, item: &ItemState) -> bool {
        let member = item.item_id.to_string();
        let owner = self.cache.zrem(&owner_key(item.owner_id), &member).await;
        let collection = self
            .cache
            .zrem(&collection_key(item.owner_id, item.collection_id), &member)
            .await;
        owner && collection
    }

    /// Number of the owner's items due at or before `at`.
    ///
    /// `None` when the index cannot be read or rebuilt; callers fall back to
    /// the ground-truth store.
    pub async fn count_due(&self, owner_id: Uuid, at: DateTime<Utc>) -> Option<u64> {
        if !self.ensure_ready(owner_id).await {
            return None;
        }
        self.cache.zcount(&owner_key(owner_id), score(at)).await
    }

    /// Due item ids in due order, optionally restricted to one collection.
    pub async fn due_items(
        &self,
        owner_id: Uuid,
        collection_id: Option<Uuid>,
        at: DateTime<Utc>,
        limit: usize,
    ) -> Option<Vec<Uuid>> {
        if !self.ensure_ready(owner_id).await {
            return None;
        }
        let key = match collection_id {
            Some(collection_id) => collection_key(owner_id, collection_id),
            None => owner_key(owner_id),
        };
        let members = self.cache.zrange_by_score(&key, score(at), limit).await?;
        Some(
            members
                .iter()
                .filter_map(|m| Uuid::parse_str(m).ok())
                .collect(),
        )
    }

    /// Repopulate the owner's index from every item state in ground truth.
    ///
    /// The report is `None` when the cache could not be written.
    pub async fn rebuild_from_ground_truth(
        &self,
        owner_id: Uuid,
    ) -> StoreResult<Option<ReconcileReport>> {
        let states = self.store.get_item_states_by_owner(owner_id).await?;
        Ok(self.reconcile(owner_id, &states).await)
    }

    /// Bring the owner's index in line with `states`, a full scan of the
    /// owner's item states.
    ///
    /// Entries are upserted first and stale members removed afterwards, so a
    /// concurrent reader never sees a half-empty index. Before an entry is
    /// rewritten or removed the item is re-read, so a live upsert that landed
    /// after the scan is kept.
    pub async fn reconcile(&self, owner_id: Uuid, states: &[ItemState]) -> Option<ReconcileReport> {
        let was_ready = self.cache.get(&ready_key(owner_id)).await.is_some();
        let mut report = ReconcileReport {
            indexed: states.len(),
            ..Default::default()
        };

        let expected: Vec<(String, i64)> = states
            .iter()
            .map(|s| (s.item_id.to_string(), score(s.next_due_at())))
            .collect();
        let (rewritten, removed) = self.sync_set(owner_id, None, &expected).await?;
        report.rewritten += rewritten;
        report.removed += removed;

        let mut by_collection: HashMap<Uuid, Vec<(String, i64)>> = HashMap::new();
        for state in states {
            by_collection
                .entry(state.collection_id)
                .or_default()
                .push((state.item_id.to_string(), score(state.next_due_at())));
        }
        for (collection_id, expected) in &by_collection {
            let (rewritten, removed) = self
                .sync_set(owner_id, Some(*collection_id), expected)
                .await?;
            report.rewritten += rewritten;
            report.removed += removed;
        }

        if !self.cache.set(&ready_key(owner_id), "1", None).await {
            return None;
        }

        if was_ready && report.drifted() {
            tracing::warn!(
                %owner_id,
                rewritten = report.rewritten,
                removed = report.removed,
                "due-queue drift detected and repaired"
            );
        }
        Some(report)
    }

    async fn sync_set(
        &self,
        owner_id: Uuid,
        collection_id: Option<Uuid>,
        expected: &[(String, i64)],
    ) -> Option<(usize, usize)> {
        let key = match collection_id {
            Some(collection_id) => collection_key(owner_id, collection_id),
            None => owner_key(owner_id),
        };
        let current: HashMap<String, i64> = self.cache.zmembers(&key).await?.into_iter().collect();

        let mut rewrites: Vec<(String, i64)> = Vec::new();
        for (member, due) in expected {
            if current.get(member) == Some(due) {
                continue;
            }
            match self.fresh_score(owner_id, collection_id, member).await {
                Ok(Some(fresh)) if current.get(member) != Some(&fresh) => {
                    rewrites.push((member.clone(), fresh));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(%owner_id, %member, error = %e, "item re-read failed, entry left as is");
                }
            }
        }
        if !self.cache.zadd_many(&key, &rewrites).await {
            return None;
        }

        let wanted: HashSet<&str> = expected.iter().map(|(m, _)| m.as_str()).collect();
        let mut removed = 0;
        for member in current.keys().filter(|m| !wanted.contains(m.as_str())) {
            match self.fresh_score(owner_id, collection_id, member).await {
                Ok(None) => {
                    if !self.cache.zrem(&key, member).await {
                        return None;
                    }
                    removed += 1;
                }
                // Created after the scan; its own upsert indexed it.
                Ok(Some(_)) => {}
                Err(e) => {
                    tracing::warn!(%owner_id, %member, error = %e, "item re-read failed, entry left as is");
                }
            }
        }

        Some((rewrites.len(), removed))
    }

    /// Ground-truth score of `member` in the given set, `None` once the item
    /// no longer belongs there.
    async fn fresh_score(
        &self,
        owner_id: Uuid,
        collection_id: Option<Uuid>,
        member: &str,
    ) -> StoreResult<Option<i64>> {
        let Ok(item_id) = Uuid::parse_str(member) else {
            return Ok(None);
        };
        let item = self.store.get_item_state(item_id).await?;
        Ok(item
            .filter(|i| i.owner_id == owner_id)
            .filter(|i| collection_id.map_or(true, |c| c == i.collection_id))
            .map(|i| score(i.next_due_at())))
    }

    async fn ensure_ready(&self, owner_id: Uuid) -> bool {
        if self.cache.get(&ready_key(owner_id)).await.is_some() {
            return true;
        }
        tracing::debug!(%owner_id, "due-queue index cold, rebuilding");
        match self.rebuild_from_ground_truth(owner_id).await {
            Ok(Some(report)) => {
                tracing::info!(%owner_id, indexed = report.indexed, "due-queue index rebuilt");
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(%owner_id, error = %e, "due-queue rebuild failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, MemoryCache};
    use crate::db::MemoryStore;
    use chrono::Duration;
    use std::time::Duration as StdDuration;
    use study_core::{Grade, Sm2};

    struct Fixture {
        store: Arc<MemoryStore>,
        cache_store: Arc<MemoryCache>,
        queue: DueQueue,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let cache_store = Arc::new(MemoryCache::new());
        let cache = Cache::new(cache_store.clone(), StdDuration::from_millis(100));
        let queue = DueQueue::new(cache, store.clone());
        Fixture {
            store,
            cache_store,
            queue,
        }
    }

    async fn seed(
        store: &MemoryStore,
        owner_id: Uuid,
        collection_id: Uuid,
        due: DateTime<Utc>,
    ) -> ItemState {
        let item = ItemState::new(Uuid::new_v4(), owner_id, collection_id, due);
        store.persist_item_state(&item).await.unwrap();
        item
    }

    #[tokio::test]
    async fn cold_index_rebuilds_before_counting() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let collection = Uuid::new_v4();
        let now = Utc::now();
        seed(&f.store, owner, collection, now - Duration::hours(1)).await;
        seed(&f.store, owner, collection, now - Duration::minutes(1)).await;
        seed(&f.store, owner, collection, now + Duration::days(2)).await;

        assert_eq!(f.queue.count_due(owner, now).await, Some(2));
        assert_eq!(f.queue.count_due(owner, now + Duration::days(3)).await, Some(3));
    }

    #[tokio::test]
    async fn due_items_are_ordered_and_scoped() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let rust = Uuid::new_v4();
        let python = Uuid::new_v4();
        let now = Utc::now();
        let late = seed(&f.store, owner, rust, now - Duration::minutes(5)).await;
        let early = seed(&f.store, owner, rust, now - Duration::hours(5)).await;
        let other = seed(&f.store, owner, python, now - Duration::hours(1)).await;

        let all = f.queue.due_items(owner, None, now, 10).await.unwrap();
        assert_eq!(all, vec![early.item_id, other.item_id, late.item_id]);

        let scoped = f.queue.due_items(owner, Some(rust), now, 10).await.unwrap();
        assert_eq!(scoped, vec![early.item_id, late.item_id]);

        let limited = f.queue.due_items(owner, None, now, 1).await.unwrap();
        assert_eq!(limited, vec![early.item_id]);
    }

    #[tokio::test]
    async fn rebuild_matches_live_index() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let collection = Uuid::new_v4();
        let algorithm = Sm2::default();
        let mut now = Utc::now();

        let mut items = Vec::new();
        for _ in 0..6 {
            let item = seed(&f.store, owner, collection, now).await;
            f.queue.upsert(&item).await;
            items.push(item);
        }
        assert_eq!(f.queue.count_due(owner, now).await, Some(6));

        let grades = [Grade::Good, Grade::Again, Grade::Easy, Grade::Hard, Grade::Good];
        for (i, grade) in grades.iter().enumerate() {
            now += Duration::minutes(3);
            let item = &items[i % items.len()];
            let committed = f
                .store
                .commit_review(owner, item.item_id, *grade, now, &algorithm)
                .await
                .unwrap();
            f.queue.upsert(&committed.after).await;
        }

        let horizons = [now, now + Duration::minutes(15), now + Duration::days(4)];
        let mut live = Vec::new();
        for at in horizons {
            live.push(f.queue.count_due(owner, at).await);
        }

        f.cache_store.flush();
        let report = f.queue.rebuild_from_ground_truth(owner).await.unwrap().unwrap();
        assert_eq!(report.indexed, 6);

        for (at, expected) in horizons.into_iter().zip(live) {
            assert_eq!(f.queue.count_due(owner, at).await, expected);
        }
    }

    #[tokio::test]
    async fn reconcile_repairs_drift() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let collection = Uuid::new_v4();
        let now = Utc::now();
        let item = seed(&f.store, owner, collection, now - Duration::hours(1)).await;
        let states = f.store.get_item_states_by_owner(owner).await.unwrap();
        f.queue.reconcile(owner, &states).await.unwrap();

        // Stale score plus a ghost entry for an item that no longer exists.
        f.cache_store
            .zadd(&owner_key(owner), &item.item_id.to_string(), score(now + Duration::days(9)))
            .await
            .unwrap();
        f.cache_store
            .zadd(&owner_key(owner), &Uuid::new_v4().to_string(), 0)
            .await
            .unwrap();
        assert_eq!(f.queue.count_due(owner, now).await, Some(1));

        let report = f.queue.reconcile(owner, &states).await.unwrap();
        assert_eq!(report.rewritten, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(f.queue.count_due(owner, now).await, Some(1));
        assert_eq!(
            f.queue.due_items(owner, None, now, 10).await.unwrap(),
            vec![item.item_id]
        );
    }

    #[tokio::test]
    async fn reconcile_keeps_writes_newer_than_its_scan() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let collection = Uuid::new_v4();
        let now = Utc::now();
        let reviewed = seed(&f.store, owner, collection, now - Duration::hours(1)).await;
        f.queue.upsert(&reviewed).await;
        let scan = f.store.get_item_states_by_owner(owner).await.unwrap();

        // A review and a new item land after the scan was taken.
        let committed = f
            .store
            .commit_review(owner, reviewed.item_id, Grade::Good, now, &Sm2::default())
            .await
            .unwrap();
        f.queue.upsert(&committed.after).await;
        let created = seed(&f.store, owner, collection, now - Duration::minutes(5)).await;
        f.queue.upsert(&created).await;

        let report = f.queue.reconcile(owner, &scan).await.unwrap();

        assert_eq!(report.rewritten, 0);
        assert_eq!(report.removed, 0);
        assert_eq!(
            f.queue.due_items(owner, None, now, 10).await.unwrap(),
            vec![created.item_id]
        );
        assert_eq!(
            f.queue.due_items(owner, Some(collection), now, 10).await.unwrap(),
            vec![created.item_id]
        );
        assert_eq!(
            f.queue.count_due(owner, now + Duration::days(2)).await,
            Some(2)
        );
    }

    #[tokio::test]
    async fn remove_drops_item_from_both_sets() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let collection = Uuid::new_v4();
        let now = Utc::now();
        let item = seed(&f.store, owner, collection, now).await;
        assert_eq!(f.queue.count_due(owner, now).await, Some(1));

        f.store.delete_item_state(item.item_id, owner).await.unwrap();
        assert!(f.queue.remove(&item).await);

        assert_eq!(f.queue.count_due(owner, now).await, Some(0));
        assert_eq!(
            f.queue.due_items(owner, Some(collection), now, 10).await,
            Some(vec![])
        );
    }

    #[tokio::test]
    async fn unavailable_cache_reads_as_none() {
        let f = fixture();
        let owner = Uuid::new_v4();
        seed(&f.store, owner, Uuid::new_v4(), Utc::now()).await;

        f.cache_store.set_available(false);
        assert_eq!(f.queue.count_due(owner, Utc::now()).await, None);
        assert_eq!(f.queue.rebuild_from_ground_truth(owner).await.unwrap(), None);
    }
}
