//! Test utilities for integration testing (available with `test-utils` feature).

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use axum_test::TestServer;
use sqlx::SqlitePool;

use crate::{
    AppState,
    analysis::{AnalysisEntry, AnalysisError, SleepAnalyzer},
    config::{Config, ProxyHeaderConfig},
    db::{
        handlers::{Repository, SleepRecords, Users},
        models::{
            sleep_records::{SleepRecordCreateDBRequest, SleepRecordDBResponse},
            users::UserDBResponse,
        },
    },
    types::UserId,
};

pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.host = "127.0.0.1".to_string();
    config.database.max_connections = 1;
    config.database.run_migrations = false;
    config
}

pub fn create_test_state(pool: SqlitePool, config: Config) -> AppState {
    AppState::builder().db(pool).config(config).build()
}

pub fn create_test_app(pool: SqlitePool) -> TestServer {
    server_for(create_test_state(pool, create_test_config()))
}

pub fn create_test_app_with_analyzer(pool: SqlitePool, analyzer: Arc<dyn SleepAnalyzer>) -> TestServer {
    let state = AppState::builder()
        .db(pool)
        .config(create_test_config())
        .analyzer(analyzer)
        .build();
    server_for(state)
}

fn server_for(state: AppState) -> TestServer {
    let router = crate::build_router(state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}

pub async fn create_test_user(pool: &SqlitePool, email: &str) -> UserDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Users::new(&mut conn)
        .get_or_create_by_email(email, None)
        .await
        .expect("Failed to create test user")
}

pub async fn create_test_admin_user(pool: &SqlitePool, email: &str) -> UserDBResponse {
    let user = create_test_user(pool, email).await;
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Users::new(&mut conn)
        .update(
            user.id,
            &crate::db::models::users::UserUpdateDBRequest {
                name: None,
                role: Some(crate::api::models::users::Role::Admin),
            },
        )
        .await
        .expect("Failed to promote test user")
}

pub async fn create_test_record(pool: &SqlitePool, owner: UserId, date: &str, sleep: &str, wake: &str) -> SleepRecordDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    SleepRecords::new(&mut conn, owner)
        .create(&SleepRecordCreateDBRequest {
            date: date.parse().expect("valid test date"),
            sleep_time: sleep.to_string(),
            wake_time: wake.to_string(),
            notes: None,
        })
        .await
        .expect("Failed to create test record")
}

pub fn add_auth_headers(user: &UserDBResponse) -> (String, String) {
    let config = ProxyHeaderConfig::default();
    (config.header_name, user.email.clone())
}

/// Analyzer that answers with fixed text and remembers how many nights it was shown.
#[derive(Default)]
pub struct StubAnalyzer {
    pub reply: String,
    pub fail: bool,
    pub last_entry_count: AtomicUsize,
    pub calls: AtomicUsize,
}

impl StubAnalyzer {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            ..Default::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }
}

#[async_trait]
impl SleepAnalyzer for StubAnalyzer {
    async fn summarize(&self, entries: &[AnalysisEntry]) -> Result<String, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_entry_count.store(entries.len(), Ordering::SeqCst);
        if self.fail {
            return Err(AnalysisError::EmptyResponse);
        }
        Ok(self.reply.clone())
    }
}
