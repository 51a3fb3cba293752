//! In-process cache backend.
//!
//! Used when no Redis URL is configured and as the fake backend in tests.
//! Sorted sets are kept as an ordered `(score, member)` set plus a
//! member-to-score map, giving O(log n) upsert/remove and O(log n + k) range
//! scans.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{CacheError, CacheResult, CacheStore};

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

impl SortedSet {
    fn insert(&mut self, member: &str, score: i64) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.ordered.remove(&(old, member.to_string()));
        }
        self.ordered.insert((score, member.to_string()));
    }

    fn remove(&mut self, member: &str) {
        if let Some(old) = self.scores.remove(member) {
            self.ordered.remove(&(old, member.to_string()));
        }
    }

    fn range_to(&self, max_score: i64) -> impl Iterator<Item = &(i64, String)> {
        // (max + 1, "") sorts after every (max, member) pair.
        self.ordered
            .range(..(max_score.saturating_add(1), String::new()))
    }
}

#[derive(Debug)]
enum Value {
    Str(String),
    Zset(SortedSet),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Mutex-guarded map with lazy TTL expiry.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backend going away (every call fails) or coming back.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Add artificial latency to every call.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Drop every key, as if the cache server restarted.
    pub fn flush(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        // A poisoned map only means a panic mid-update of ephemeral data.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn check(&self) -> CacheResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("memory cache offline".to_string()));
        }
        Ok(())
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> CacheResult<T>) -> CacheResult<T> {
        let mut entries = self.lock();
        let now = Instant::now();
        entries.retain(|_, entry| !entry.expired(now));
        f(&mut entries)
    }

    fn with_zset<T>(
        &self,
        key: &str,
        f: impl FnOnce(Option<&mut SortedSet>) -> CacheResult<T>,
    ) -> CacheResult<T> {
        self.with_entries(|entries| match entries.get_mut(key) {
            None => f(None),
            Some(Entry {
                value: Value::Zset(set),
                ..
            }) => f(Some(set)),
            Some(_) => Err(CacheError::WrongType(key.to_string())),
        })
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check().await?;
        self.with_entries(|entries| match entries.get(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(CacheError::WrongType(key.to_string())),
        })
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        self.check().await?;
        self.with_entries(|entries| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Str(value.to_string()),
                    expires_at: ttl.map(|t| Instant::now() + t),
                },
            );
            Ok(())
        })
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.check().await?;
        self.with_entries(|entries| {
            entries.remove(key);
            Ok(())
        })
    }

    async fn incr_by(&self, key: &str, delta: i64, ttl: Duration) -> CacheResult<i64> {
        self.check().await?;
        self.with_entries(|entries| {
            let current = match entries.get(key) {
                None => 0,
                Some(Entry {
                    value: Value::Str(s),
                    ..
                }) => s
                    .parse::<i64>()
                    .map_err(|_| CacheError::WrongType(key.to_string()))?,
                Some(_) => return Err(CacheError::WrongType(key.to_string())),
            };
            let next = current + delta;
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Str(next.to_string()),
                    expires_at: Some(Instant::now() + ttl),
                },
            );
            Ok(next)
        })
    }

    async fn zadd(&self, key: &str, member: &str, score: i64) -> CacheResult<()> {
        self.check().await?;
        self.with_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Value::Zset(SortedSet::default()),
                expires_at: None,
            });
            match &mut entry.value {
                Value::Zset(set) => {
                    set.insert(member, score);
                    Ok(())
                }
                Value::Str(_) => Err(CacheError::WrongType(key.to_string())),
            }
        })
    }

    async fn zrem(&self, key: &str, member: &str) -> CacheResult<()> {
        self.check().await?;
        self.with_entries(|entries| {
            let now_empty = match entries.get_mut(key) {
                None => return Ok(()),
                Some(Entry {
                    value: Value::Zset(set),
                    ..
                }) => {
                    set.remove(member);
                    set.scores.is_empty()
                }
                Some(_) => return Err(CacheError::WrongType(key.to_string())),
            };
            // Redis drops empty sorted sets.
            if now_empty {
                entries.remove(key);
            }
            Ok(())
        })
    }

    async fn zcount(&self, key: &str, max_score: i64) -> CacheResult<u64> {
        self.check().await?;
        self.with_zset(key, |set| {
            Ok(set.map_or(0, |s| s.range_to(max_score).count() as u64))
        })
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        max_score: i64,
        limit: usize,
    ) -> CacheResult<Vec<String>> {
        self.check().await?;
        self.with_zset(key, |set| {
            Ok(set.map_or_else(Vec::new, |s| {
                s.range_to(max_score)
                    .take(limit)
                    .map(|(_, member)| member.clone())
                    .collect()
            }))
        })
    }

    async fn zmembers(&self, key: &str) -> CacheResult<Vec<(String, i64)>> {
        self.check().await?;
        self.with_zset(key, |set| {
            Ok(set.map_or_else(Vec::new, |s| {
                s.ordered
                    .iter()
                    .map(|(score, member)| (member.clone(), *score))
                    .collect()
            }))
        })
    }
}
