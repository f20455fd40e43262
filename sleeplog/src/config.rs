//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `SLEEPLOG_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `SLEEPLOG_` override YAML values
//! 3. **DATABASE_URL** - Special case: overrides `database.url` if set
//! 4. **GEMINI_API_KEY** - Special case: overrides `analysis.api_key` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `SLEEPLOG_ANALYSIS__MODEL=gemini-2.0-flash` sets the `analysis.model` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use sleeplog::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}", config.bind_address());
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! SLEEPLOG_PORT=8080
//!
//! # Point at another database file
//! DATABASE_URL="sqlite:///var/lib/sleeplog/sleeplog.db"
//!
//! # Enable sleep analysis
//! GEMINI_API_KEY=...
//!
//! # Single-user deployment without an auth proxy
//! SLEEPLOG_AUTH__DEFAULT_USER_EMAIL=test@example.com
//! ```

use axum::http::HeaderName;
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "SLEEPLOG_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields have defaults, so an empty (or missing) config file yields a working local setup
/// backed by `sleeplog.db` with analysis disabled.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    /// Settings for the LLM used by the analysis endpoint
    pub analysis: AnalysisConfig,
    pub cors: CorsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            analysis: AnalysisConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite connection string. The file is created if it does not exist.
    pub url: String,
    pub max_connections: u32,
    /// Apply embedded migrations on startup
    pub run_migrations: bool,
    /// Insert the demo user and a week of sample nights when they are missing
    pub seed_demo_data: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://sleeplog.db".to_string(),
            max_connections: 5,
            run_migrations: true,
            seed_demo_data: false,
        }
    }
}

/// How requests are attributed to a user.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub proxy_header: ProxyHeaderConfig,
    /// Account promoted to `ADMIN` on startup (created if missing)
    pub admin_email: Option<String>,
    /// Account used when a request carries no identity header. Leave unset to require the
    /// header on every request; set it for single-user deployments without an auth proxy.
    pub default_user_email: Option<String>,
}

/// Identity headers set by a trusted upstream proxy (for example oauth2-proxy).
///
/// Only deploy with these enabled behind a proxy that strips the same headers from client
/// requests, otherwise any caller can claim any account.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyHeaderConfig {
    /// Header carrying the user's email address
    pub header_name: String,
    /// Optional header carrying a display name, used when the account is auto-created
    pub name_header_name: String,
    /// Create an account the first time an unknown email is seen
    pub auto_create_users: bool,
}

impl Default for ProxyHeaderConfig {
    fn default() -> Self {
        Self {
            header_name: "x-sleeplog-user-email".to_string(),
            name_header_name: "x-sleeplog-user-name".to_string(),
            auto_create_users: true,
        }
    }
}

/// Generative-language model used for sleep analysis.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Analysis is disabled when this is unset
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: Url,
    pub model: String,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    /// Total time allowed for one model call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: Url::parse("https://generativelanguage.googleapis.com").expect("static URL is valid"),
            model: "gemma-3-1b-it".to_string(),
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 4096,
            timeout: Duration::from_secs(60),
        }
    }
}

impl std::fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("top_k", &self.top_k)
            .field("top_p", &self.top_p)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            // The Vite dev server the web client runs on
            allowed_origins: vec![CorsOrigin::Url(
                Url::parse("http://localhost:5173").expect("static URL is valid"),
            )],
            allow_credentials: true,
            max_age: Some(3600),
        }
    }
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://sleep.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

fn invalid(message: String) -> Error {
    Error::Other(anyhow::anyhow!("Config validation: {message}"))
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.port == 0 {
            return Err(invalid("port must be non-zero".to_string()));
        }

        if self.database.url.trim().is_empty() {
            return Err(invalid("database.url must not be empty".to_string()));
        }

        if self.database.max_connections == 0 {
            return Err(invalid("database.max_connections must be at least 1".to_string()));
        }

        let proxy = &self.auth.proxy_header;
        for (field, value) in [
            ("auth.proxy_header.header_name", &proxy.header_name),
            ("auth.proxy_header.name_header_name", &proxy.name_header_name),
        ] {
            if HeaderName::from_bytes(value.as_bytes()).is_err() {
                return Err(invalid(format!("{field} ('{value}') is not a valid HTTP header name")));
            }
        }

        for (field, email) in [
            ("auth.default_user_email", &self.auth.default_user_email),
            ("auth.admin_email", &self.auth.admin_email),
        ] {
            if let Some(email) = email
                && !email.contains('@')
            {
                return Err(invalid(format!("{field} ('{email}') is not an email address")));
            }
        }

        let analysis = &self.analysis;
        if !(0.0..=2.0).contains(&analysis.temperature) {
            return Err(invalid(format!(
                "analysis.temperature ({}) must be between 0.0 and 2.0",
                analysis.temperature
            )));
        }

        if !(0.0..=1.0).contains(&analysis.top_p) {
            return Err(invalid(format!("analysis.top_p ({}) must be between 0.0 and 1.0", analysis.top_p)));
        }

        if analysis.top_k == 0 || analysis.max_output_tokens == 0 {
            return Err(invalid("analysis.top_k and analysis.max_output_tokens must be positive".to_string()));
        }

        if analysis.model.trim().is_empty() {
            return Err(invalid("analysis.model must not be empty".to_string()));
        }

        if analysis.timeout.is_zero() {
            return Err(invalid("analysis.timeout must be positive".to_string()));
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("SLEEPLOG_").ignore(&["config"]).split("__"))
            // Conventional names used by tooling and the original deployment
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "database.url".into()))
            .merge(Env::raw().only(&["GEMINI_API_KEY"]).map(|_| "analysis.api_key".into()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
