//! # sleeplog: a personal sleep log service
//!
//! `sleeplog` records when each user went to bed and woke up, turns those readings into chart
//! series, and can ask a generative-language model for a plain-language review of the pattern.
//!
//! ## Overview
//!
//! A record is one night: the calendar date the night begins on, a bedtime and a wake time,
//! both `HH:MM` on a 24-hour clock, and optional notes. Nothing derived is ever stored. Duration
//! and the chart coordinates are computed on read by [`intervals`], so changing a rule never
//! needs a data migration.
//!
//! Two rules make overnight sleep come out right:
//!
//! - A wake time earlier than the bedtime is on the next morning (`23:00` to `07:00` is 8 hours).
//! - On the chart, bedtimes before 06:00 are plotted past 24 (`00:30` becomes 24.5), so a late
//!   night sits above an early one instead of dropping to the bottom of the axis.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum) over a SQLite database accessed
//! with SQLx. Requests flow through:
//!
//! 1. The [`CurrentUser`](api::models::users::CurrentUser) extractor ([`auth`]) resolves the
//!    caller from a trusted proxy header, or a configured default user.
//! 2. Handlers ([`api::handlers`]) validate the body and open a repository ([`db::handlers`])
//!    scoped to that caller.
//! 3. Chart and analysis endpoints feed the caller's records through [`intervals`] and, for
//!    analysis, through a [`SleepAnalyzer`](analysis::SleepAnalyzer).
//!
//! The analyzer is optional. Without an API key the service still records and charts nights;
//! only the analysis endpoint answers 503.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use sleeplog::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = sleeplog::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     sleeplog::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     }).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod analysis;
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod intervals;
mod openapi;
pub mod telemetry;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use std::{str::FromStr, sync::Arc};

use axum::{
    Router,
    http::{self, HeaderValue, Method},
    routing::get,
};
use bon::Builder;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

use crate::{
    analysis::{AnalysisError, GeminiAnalyzer, SleepAnalyzer},
    api::{
        handlers::{health, sleep_records, users},
        models::users::Role,
    },
    config::{AnalysisConfig, CorsOrigin},
    db::{
        handlers::{Repository, Users},
        models::users::UserUpdateDBRequest,
    },
    openapi::ApiDoc,
};
pub use config::Config;
pub use types::{SleepRecordId, UserId};

/// Application state shared across all request handlers.
///
/// # Fields
///
/// - `db`: SQLite connection pool
/// - `config`: Application configuration loaded from environment/files
/// - `analyzer`: Language model client for the analysis endpoint, absent when not configured
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config)
///     .maybe_analyzer(analyzer)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
    pub analyzer: Option<Arc<dyn SleepAnalyzer>>,
}

/// Get the sleeplog database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Install the process-wide rustls crypto provider. Safe to call more than once.
pub fn install_crypto_provider() {
    // Err only means a provider is already installed
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Make sure the configured admin account exists and has the `ADMIN` role.
///
/// Idempotent: an existing account keeps its name and records and is only promoted.
#[instrument(skip(db))]
pub async fn create_initial_admin_user(email: &str, db: &SqlitePool) -> anyhow::Result<UserId> {
    let mut tx = db.begin().await?;
    let mut user_repo = Users::new(&mut tx);

    let user = user_repo.get_or_create_by_email(email, None).await?;
    if user.role != Role::Admin {
        user_repo
            .update(
                user.id,
                &UserUpdateDBRequest {
                    name: None,
                    role: Some(Role::Admin),
                },
            )
            .await?;
        info!(user_id = user.id, "Promoted {} to admin", email);
    }

    tx.commit().await?;
    Ok(user.id)
}

/// Connect to SQLite, creating the file if needed, then migrate and seed as configured.
async fn setup_database(config: &Config) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database.url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(options)
        .await?;

    if config.database.run_migrations {
        migrator().run(&pool).await?;
    }

    if config.database.seed_demo_data {
        db::seed::seed_demo_data(&pool).await?;
    }

    Ok(pool)
}

/// Build the analysis client, or explain in the logs why analysis is off.
fn build_analyzer(config: &AnalysisConfig) -> Option<Arc<dyn SleepAnalyzer>> {
    match GeminiAnalyzer::new(config) {
        Ok(analyzer) => {
            info!("Sleep analysis enabled with model {}", config.model);
            Some(Arc::new(analyzer))
        }
        Err(AnalysisError::MissingApiKey) => {
            warn!("No analysis API key configured (set GEMINI_API_KEY); the analysis endpoint will return 503");
            None
        }
        Err(e) => {
            warn!("Failed to initialise analysis client, analysis disabled: {}", e);
            None
        }
    }
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors = &config.cors;

    let allow_origin = if cors.allowed_origins.contains(&CorsOrigin::Wildcard) {
        // A literal `*` cannot be sent together with credentials
        AllowOrigin::mirror_request()
    } else {
        let mut origins = Vec::new();
        for origin in &cors.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut layer = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([http::header::CONTENT_TYPE])
        .allow_credentials(cors.allow_credentials);

    if let Some(max_age) = cors.max_age {
        layer = layer.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(layer)
}

/// Build the application router: the `/api` routes, API docs, CORS and request tracing.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors_layer = create_cors_layer(&state.config)?;

    let api_routes = Router::new()
        .route("/health", get(health::health))
        .route(
            "/sleep-records",
            get(sleep_records::list_sleep_records).post(sleep_records::create_sleep_record),
        )
        .route("/sleep-records/chart", get(sleep_records::get_sleep_chart))
        .route("/sleep-records/analysis", get(sleep_records::analyze_sleep_records))
        .route(
            "/sleep-records/{id}",
            axum::routing::put(sleep_records::update_sleep_record).delete(sleep_records::delete_sleep_record),
        )
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/{user_id}",
            get(users::get_user).patch(users::update_user).delete(users::delete_user),
        )
        .with_state(state);

    let router = Router::new()
        .nest("/api", api_routes)
        .merge(RapiDoc::with_openapi("/api/openapi.json", ApiDoc::openapi()).path("/api/docs"))
        .layer(cors_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// The configured service, ready to serve.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] connects to the database, runs migrations, seeds demo
///    data when asked to, and builds the analysis client if a key is configured
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown future resolves, in-flight requests finish and the pool is closed
pub struct Application {
    router: Router,
    config: Config,
    pool: SqlitePool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting sleeplog with configuration: {:#?}", config);

        let pool = setup_database(&config).await?;

        if let Some(admin_email) = &config.auth.admin_email {
            create_initial_admin_user(admin_email, &pool).await?;
        }

        let analyzer = build_analyzer(&config.analysis);

        let app_state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .maybe_analyzer(analyzer)
            .build();
        let router = build_router(app_state)?;

        Ok(Self { router, config, pool })
    }

    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Sleeplog listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}
