//! Diagnostic logging with tracing
//!
//! The managed log files never go through `tracing`. Rollover, eviction and
//! write failures of the writer itself are reported here instead, on stderr.

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_DIAGNOSTIC_FILTER: &str = "file_logger=info";

/// Install the global diagnostic subscriber
///
/// `RUST_LOG` overrides `default_filter`. Fails if a global subscriber is
/// already installed.
pub fn init_diagnostics(default_filter: Option<&str>) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.unwrap_or(DEFAULT_DIAGNOSTIC_FILTER).into());

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init()
        .context("Failed to install diagnostic subscriber")
}
