//! Redis cache backend.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;

use super::{CacheResult, CacheStore};

/// Redis-backed cache using a multiplexed async connection.
pub struct RedisCache {
    connection: MultiplexedConnection,
}

impl RedisCache {
    /// Connect to Redis at `url` (e.g. `redis://localhost:6379`).
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Self { connection })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.connection.clone()
    }
}

fn millis(ttl: Duration) -> u64 {
    ttl.as_millis().max(1) as u64
}

#[async_trait]
impl CacheStore for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let value = redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut self.conn())
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl));
        }
        cmd.query_async::<_, ()>(&mut self.conn()).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: i64, ttl: Duration) -> CacheResult<i64> {
        // MULTI/EXEC so the increment and its expiry land together.
        let (value,): (i64,) = redis::pipe()
            .atomic()
            .cmd("INCRBY")
            .arg(key)
            .arg(delta)
            .cmd("PEXPIRE")
            .arg(key)
            .arg(millis(ttl))
            .ignore()
            .query_async(&mut self.conn())
            .await?;
        Ok(value)
    }

    async fn zadd(&self, key: &str, member: &str, score: i64) -> CacheResult<()> {
        redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async::<_, ()>(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn zadd_many(&self, key: &str, members: &[(String, i64)]) -> CacheResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(key);
        for (member, score) in members {
            cmd.arg(*score).arg(member);
        }
        cmd.query_async::<_, ()>(&mut self.conn()).await?;
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> CacheResult<()> {
        redis::cmd("ZREM")
            .arg(key)
            .arg(member)
            .query_async::<_, ()>(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn zcount(&self, key: &str, max_score: i64) -> CacheResult<u64> {
        let count = redis::cmd("ZCOUNT")
            .arg(key)
            .arg("-inf")
            .arg(max_score)
            .query_async::<_, u64>(&mut self.conn())
            .await?;
        Ok(count)
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        max_score: i64,
        limit: usize,
    ) -> CacheResult<Vec<String>> {
        let members = redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg("-inf")
            .arg(max_score)
            .arg("LIMIT")
            .arg(0)
            .arg(limit)
            .query_async::<_, Vec<String>>(&mut self.conn())
            .await?;
        Ok(members)
    }

    async fn zmembers(&self, key: &str) -> CacheResult<Vec<(String, i64)>> {
        let members = redis::cmd("ZRANGE")
            .arg(key)
            .arg(0)
            .arg(-1)
            .arg("WITHSCORES")
            .query_async::<_, Vec<(String, f64)>>(&mut self.conn())
            .await?;
        Ok(members
            .into_iter()
            .map(|(member, score)| (member, score as i64))
            .collect())
    }
}
