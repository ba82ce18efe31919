//! Common test utilities and fixtures for integration tests.
//!
//! Every `TestContext` owns a private in-memory SQLite database, so tests
//! run in parallel without cleanup.

pub mod fixtures;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use axum_test::TestServer;
use chrono::{Duration, Utc};

use memora_backend::config::ServerConfig;
use memora_backend::db::Database;
use memora_backend::models::DbPackage;
use memora_backend::{build_router, AppState};

/// Test context containing the database and router.
pub struct TestContext {
    pub db: Arc<Database>,
    app: Router,
}

impl TestContext {
    /// Create a new test context on a fresh in-memory database.
    pub async fn new() -> Self {
        let config = ServerConfig {
            database_url: "sqlite::memory:".to_string(),
            ..ServerConfig::default()
        };

        let state = AppState::initialize(config)
            .await
            .expect("Failed to initialize test database");

        let db = state.db.clone();
        let app = build_router(state);

        Self { db, app }
    }

    /// Get the router for use with axum-test.
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(self.router()).expect("Failed to start test server")
    }

    /// Issue a token valid for a day and return it.
    pub async fn create_test_user(&self, user_id: &str) -> String {
        self.db
            .issue_token(user_id, Duration::days(1))
            .await
            .expect("Failed to issue test token")
            .token
    }

    /// Store a token that expired an hour ago.
    pub async fn create_expired_token(&self, user_id: &str) -> String {
        let token = format!("expired-{}", user_id);
        self.db
            .store_token(&token, user_id, Utc::now() - Duration::hours(1))
            .await
            .expect("Failed to store expired token");
        token
    }

    /// Register a package with `questions_count` questions.
    pub async fn create_test_package(&self, uuid: &str, questions_count: i64) -> DbPackage {
        self.db
            .upsert_package(uuid, &format!("Package {}", uuid), questions_count)
            .await
            .expect("Failed to create test package")
    }

    /// Format authorization header value.
    pub fn auth_header_value(token: &str) -> HeaderValue {
        HeaderValue::from_str(&format!("Bearer {}", token)).expect("Invalid token characters")
    }
}
