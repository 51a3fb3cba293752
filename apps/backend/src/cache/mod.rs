//! Ephemeral cache layer.
//!
//! Everything stored here can be rebuilt from the ground-truth store, so the
//! [`Cache`] wrapper never returns an error: a failed or slow backend call is
//! logged and reported as a miss.

pub mod memory;
pub mod redis_cache;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

/// Cache backend errors. These never leave the cache layer.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("wrong value type at key {0}")]
    WrongType(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Key-value, counter and sorted-set primitives the engine needs from a cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Backend identifier for logs.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Atomically add `delta` and refresh the key's expiry, returning the new value.
    async fn incr_by(&self, key: &str, delta: i64, ttl: Duration) -> CacheResult<i64>;

    /// Insert or move a sorted-set member.
    async fn zadd(&self, key: &str, member: &str, score: i64) -> CacheResult<()>;

    async fn zadd_many(&self, key: &str, members: &[(String, i64)]) -> CacheResult<()> {
        for (member, score) in members {
            self.zadd(key, member, *score).await?;
        }
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> CacheResult<()>;

    /// Number of members with score <= `max_score`.
    async fn zcount(&self, key: &str, max_score: i64) -> CacheResult<u64>;

    /// Members with score <= `max_score`, lowest score first.
    async fn zrange_by_score(
        &self,
        key: &str,
        max_score: i64,
        limit: usize,
    ) -> CacheResult<Vec<String>>;

    /// Every member with its score.
    async fn zmembers(&self, key: &str) -> CacheResult<Vec<(String, i64)>>;
}

/// Bounded-latency, error-swallowing front for a [`CacheStore`].
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
    timeout: Duration,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    async fn run<T, F>(&self, op: &'static str, key: &str, fut: F) -> Option<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        let err = match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(e)) => e,
            Err(_) => CacheError::Timeout(self.timeout),
        };
        tracing::warn!(backend = self.store.name(), op, key, error = %err, "cache operation failed, treating as miss");
        None
    }

    /// `None` on a miss or when the backend is unavailable.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.run("get", key, self.store.get(key)).await.flatten()
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "undecodable cache entry, treating as miss");
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool {
        self.run("set", key, self.store.set(key, value, ttl))
            .await
            .is_some()
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, &raw, ttl).await,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to encode cache entry");
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.run("delete", key, self.store.delete(key)).await.is_some()
    }

    pub async fn incr_by(&self, key: &str, delta: i64, ttl: Duration) -> Option<i64> {
        self.run("incr_by", key, self.store.incr_by(key, delta, ttl))
            .await
    }

    pub async fn zadd(&self, key: &str, member: &str, score: i64) -> bool {
        self.run("zadd", key, self.store.zadd(key, member, score))
            .await
            .is_some()
    }

    pub async fn zadd_many(&self, key: &str, members: &[(String, i64)]) -> bool {
        if members.is_empty() {
            return true;
        }
        self.run("zadd_many", key, self.store.zadd_many(key, members))
            .await
            .is_some()
    }

    pub async fn zrem(&self, key: &str, member: &str) -> bool {
        self.run("zrem", key, self.store.zrem(key, member))
            .await
            .is_some()
    }

    pub async fn zcount(&self, key: &str, max_score: i64) -> Option<u64> {
        self.run("zcount", key, self.store.zcount(key, max_score))
            .await
    }

    pub async fn zrange_by_score(&self, key: &str, max_score: i64, limit: usize) -> Option<Vec<String>> {
        self.run(
            "zrange_by_score",
            key,
            self.store.zrange_by_score(key, max_score, limit),
        )
        .await
    }

    pub async fn zmembers(&self, key: &str) -> Option<Vec<(String, i64)>> {
        self.run("zmembers", key, self.store.zmembers(key)).await
    }
}
