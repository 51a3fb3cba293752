pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use study_core::Sm2;

use crate::cache::{Cache, CacheStore, MemoryCache, RedisCache};
use crate::config::Config;
use crate::db::{Database, GroundTruthStore, MemoryStore};
use crate::services::{
    DailyCounter, DueQueue, EventBus, ReviewCoordinator, StatsAggregator, StreakTracker,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn GroundTruthStore>,
    pub due_queue: DueQueue,
    pub stats: StatsAggregator,
    pub coordinator: ReviewCoordinator,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire every engine component over one ground-truth store and one cache.
    pub fn new(
        store: Arc<dyn GroundTruthStore>,
        cache_store: Arc<dyn CacheStore>,
        config: Config,
    ) -> Self {
        let cache = Cache::new(cache_store, config.cache_timeout);

        let due_queue = DueQueue::new(cache.clone(), store.clone());
        let counter = DailyCounter::new(cache.clone(), store.clone(), config.daily_counter_ttl);
        let streaks = StreakTracker::new(cache.clone(), store.clone(), config.streak_ttl);
        let stats = StatsAggregator::new(
            store.clone(),
            cache,
            due_queue.clone(),
            counter.clone(),
            streaks.clone(),
            config.stats_ttl,
        );
        let coordinator = ReviewCoordinator::new(
            store.clone(),
            Arc::new(Sm2::default()),
            due_queue.clone(),
            counter,
            streaks,
            stats.clone(),
            EventBus::default(),
            config.daily_goal,
        );

        Self {
            store,
            due_queue,
            stats,
            coordinator,
            config: Arc::new(config),
        }
    }
}

/// Build the full router.
pub fn app(state: AppState) -> Router {
    let protected_routes = Router::new()
        // Study routes
        .route("/api/study/review", post(routes::study::review))
        .route("/api/study/due", get(routes::study::due))
        .route("/api/study/rebuild", post(routes::study::rebuild))
        // Stats routes
        .route("/api/stats", get(routes::stats::get))
        // Item routes
        .route("/api/items", post(routes::items::create))
        .route(
            "/api/items/:id",
            get(routes::items::get).delete(routes::items::delete),
        )
        .route("/api/items/:id/reviews", get(routes::items::reviews))
        .layer(middleware::from_fn(routes::auth::owner_middleware));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let store: Arc<dyn GroundTruthStore> = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let db = Database::connect(url).await?;

            tracing::info!("Running migrations...");
            db.run_migrations().await?;
            Arc::new(db)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory ground truth (data is lost on exit)");
            Arc::new(MemoryStore::new())
        }
    };

    let cache_store: Arc<dyn CacheStore> = match &config.redis_url {
        Some(url) => {
            tracing::info!("Connecting to Redis...");
            Arc::new(RedisCache::connect(url).await?)
        }
        None => {
            tracing::info!("REDIS_URL not set, using in-process cache");
            Arc::new(MemoryCache::new())
        }
    };

    let addr = config.bind_addr();
    let state = AppState::new(store, cache_store, config);
    let router = app(state);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}
