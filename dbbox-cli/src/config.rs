//! Configuration loading for the CLI
//!
//! Order of precedence (highest first): DBBOX_* environment variables,
//! `.env` files, the TOML config file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use dbbox_core::DbBoxConfig;
use tracing::debug;

/// Load `.env` from the current directory, then `~/.dbbox/.env`.
///
/// dotenvy never overwrites variables that are already set, so the current
/// directory wins over the home directory and the real environment wins
/// over both.
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        debug!("Loaded .env from {}", path.display());
    }

    if let Some(home_dir) = dirs::home_dir() {
        let env_file = home_dir.join(".dbbox").join(".env");
        if env_file.exists() {
            match dotenvy::from_path(&env_file) {
                Ok(()) => debug!("Loaded .env from {}", env_file.display()),
                Err(e) => debug!("Failed to load {}: {}", env_file.display(), e),
            }
        }
    }
}

/// Read the config file (default `~/.dbbox/config.toml`) and apply overrides
pub fn load(path: Option<PathBuf>) -> Result<DbBoxConfig> {
    load_dotenv();

    let path = path.unwrap_or_else(DbBoxConfig::config_path);
    let config = DbBoxConfig::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?
        .with_env_overrides()
        .context("Invalid DBBOX_* environment override")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}
