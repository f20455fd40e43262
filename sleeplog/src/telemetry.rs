//! Tracing initialization (fmt subscriber filtered by `RUST_LOG`).
//!
//! Filtering uses the standard `RUST_LOG` syntax and defaults to `info`. For example, to see
//! every repository query and the outgoing analysis requests:
//!
//! ```bash
//! RUST_LOG=info,sleeplog::db=debug,sleeplog::analysis=debug sleeplog
//! ```

use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default directives when `RUST_LOG` is unset or unparsable
const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    info!("Telemetry initialized");
    Ok(())
}
