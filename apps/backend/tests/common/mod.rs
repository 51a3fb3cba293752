//! Common test utilities and fixtures for integration tests.
//!
//! This module provides shared test infrastructure including:
//! - TestContext wiring the full router over in-memory backends
//! - Helpers for seeding items and review history
//! - Owner header helpers
//!
//! # Requirements
//! The default context needs no external services. Tests marked
//! `#[ignore = "requires database"]` use `TestContext::with_database`, which
//! reads DATABASE_URL.

#![allow(dead_code)]

pub mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::Router;
use axum_test::TestServer;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use study_backend::cache::MemoryCache;
use study_backend::config::Config;
use study_backend::db::{Database, GroundTruthStore, MemoryStore};
use study_backend::models::ItemState;
use study_backend::{app, AppState};

/// Test context holding the backends and the router built over them.
pub struct TestContext {
    pub store: Arc<dyn GroundTruthStore>,
    /// Present when the ground truth is the in-memory store.
    pub memory_store: Option<Arc<MemoryStore>>,
    pub cache: Arc<MemoryCache>,
    pub state: AppState,
    app: Router,
}

impl TestContext {
    /// Create a context over in-memory ground truth and cache.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let memory_store = Arc::new(MemoryStore::new());
        let store: Arc<dyn GroundTruthStore> = memory_store.clone();
        Self::build(store, Some(memory_store), config)
    }

    /// Create a context over PostgreSQL.
    ///
    /// # Panics
    /// Panics if DATABASE_URL is not set or database connection fails.
    pub async fn with_database() -> Self {
        dotenvy::dotenv().ok();

        let database_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");

        let db = Database::connect(&database_url)
            .await
            .expect("Failed to connect to test database");

        db.run_migrations()
            .await
            .expect("Failed to run migrations");

        Self::build(Arc::new(db), None, test_config())
    }

    fn build(
        store: Arc<dyn GroundTruthStore>,
        memory_store: Option<Arc<MemoryStore>>,
        config: Config,
    ) -> Self {
        let cache = Arc::new(MemoryCache::new());
        let state = AppState::new(store.clone(), cache.clone(), config);
        let app = app(state.clone());

        Self {
            store,
            memory_store,
            cache,
            state,
            app,
        }
    }

    /// Get the router for use with axum-test.
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(self.router()).unwrap()
    }

    /// The in-memory store; panics for database-backed contexts.
    pub fn memory(&self) -> &MemoryStore {
        self.memory_store
            .as_deref()
            .expect("context is not backed by the in-memory store")
    }

    /// Format the owner header value.
    pub fn owner_header_value(owner_id: Uuid) -> HeaderValue {
        HeaderValue::from_str(&owner_id.to_string()).unwrap()
    }

    /// Create an item for `owner_id` through the coordinator, due at `now`.
    pub async fn create_item(&self, owner_id: Uuid, collection_id: Uuid) -> ItemState {
        self.create_item_at(owner_id, collection_id, Utc::now()).await
    }

    pub async fn create_item_at(
        &self,
        owner_id: Uuid,
        collection_id: Uuid,
        now: DateTime<Utc>,
    ) -> ItemState {
        self.state
            .coordinator
            .create_item(owner_id, Uuid::new_v4(), collection_id, now)
            .await
            .expect("Failed to create test item")
    }
}

/// Config used by every test context: a short cache timeout and a small goal.
pub fn test_config() -> Config {
    Config {
        cache_timeout: Duration::from_millis(100),
        daily_goal: 3,
        ..Config::default()
    }
}
