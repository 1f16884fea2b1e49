//! Tracing setup for the dbbox CLI
//!
//! Usage:
//!   dbbox --debug ...               # Debug logging to stderr
//!   RUST_LOG=dbbox_core=debug dbbox # Fine-grained log control
//!
//! Environment variables:
//!   RUST_LOG                        # Log filter (default: info, debug with --debug)

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Tracing configuration options
#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    /// Enable debug logging (sets RUST_LOG=debug if not already set)
    pub debug: bool,
}

/// Initialize console tracing.
///
/// Logs go to stderr so query output on stdout stays machine-readable.
pub fn init(config: &TracingConfig) -> Result<()> {
    let default_level = if config.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.debug)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}
