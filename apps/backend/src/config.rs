//! Runtime configuration read from environment variables.

use std::str::FromStr;
use std::time::Duration;

/// Service configuration.
///
/// Env vars (all optional):
/// - HOST, PORT: bind address (default 0.0.0.0:3000)
/// - DATABASE_URL: PostgreSQL ground truth; in-memory store when unset
/// - REDIS_URL: Redis cache; in-process cache when unset
/// - CACHE_TIMEOUT_MS: upper bound on any single cache call (250)
/// - STATS_TTL_SECS: stats snapshot lifetime (300)
/// - STREAK_TTL_SECS: cached streak record lifetime (3600)
/// - DAILY_COUNTER_TTL_SECS: daily counter lifetime after last increment (172800)
/// - DAILY_GOAL: reviews per local day that complete the goal (20)
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub cache_timeout: Duration,
    pub stats_ttl: Duration,
    pub streak_ttl: Duration,
    pub daily_counter_ttl: Duration,
    pub daily_goal: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: None,
            redis_url: None,
            cache_timeout: Duration::from_millis(250),
            stats_ttl: Duration::from_secs(300),
            streak_ttl: Duration::from_secs(3600),
            daily_counter_ttl: Duration::from_secs(48 * 3600),
            daily_goal: 20,
        }
    }
}

impl Config {
    /// Load from the process environment. Call `dotenvy::dotenv()` first to
    /// pick up a `.env` file.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve each variable.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port),
            database_url: non_empty("DATABASE_URL"),
            redis_url: non_empty("REDIS_URL"),
            cache_timeout: Duration::from_millis(parse_or(
                &lookup,
                "CACHE_TIMEOUT_MS",
                defaults.cache_timeout.as_millis() as u64,
            )),
            stats_ttl: Duration::from_secs(parse_or(
                &lookup,
                "STATS_TTL_SECS",
                defaults.stats_ttl.as_secs(),
            )),
            streak_ttl: Duration::from_secs(parse_or(
                &lookup,
                "STREAK_TTL_SECS",
                defaults.streak_ttl.as_secs(),
            )),
            daily_counter_ttl: Duration::from_secs(parse_or(
                &lookup,
                "DAILY_COUNTER_TTL_SECS",
                defaults.daily_counter_ttl.as_secs(),
            )),
            daily_goal: parse_or(&lookup, "DAILY_GOAL", defaults.daily_goal),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, default = %default, "unparseable setting, using default");
                default
            }
        },
    }
}
