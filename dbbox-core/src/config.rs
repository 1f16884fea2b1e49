use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dialect::Dialect;
use crate::error::{DbError, Result};

/// Top-level configuration, usually read from ~/.dbbox/config.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbBoxConfig {
    #[serde(default)]
    pub datasource: DatasourceConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// Where to connect and as whom
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasourceConfig {
    #[serde(default)]
    pub driver: Dialect,
    #[serde(default = "default_host")]
    pub host: String,
    /// Defaults to the driver's standard port
    pub port: Option<u16>,
    /// Database name; for SQLite this is the database file path
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

impl Default for DatasourceConfig {
    fn default() -> Self {
        Self {
            driver: Dialect::default(),
            host: default_host(),
            port: None,
            database: String::new(),
            user: String::new(),
            password: String::new(),
        }
    }
}

impl DatasourceConfig {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.driver.default_port())
    }

    /// Connection URL understood by the sqlx `Any` driver
    ///
    /// User, password and database name are percent-encoded.
    pub fn url(&self) -> String {
        match self.driver {
            Dialect::Sqlite => format!("sqlite://{}?mode=rwc", self.database),
            driver => {
                let user = urlencoding::encode(&self.user);
                let password = urlencoding::encode(&self.password);
                let credentials = match (self.user.is_empty(), self.password.is_empty()) {
                    (true, _) => String::new(),
                    (false, true) => format!("{user}@"),
                    (false, false) => format!("{user}:{password}@"),
                };
                format!(
                    "{}://{}{}:{}/{}",
                    driver.scheme(),
                    credentials,
                    self.host,
                    self.port(),
                    urlencoding::encode(&self.database)
                )
            }
        }
    }
}

/// Whether a failed attempt is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Retry every failure until the attempt budget is spent
    #[default]
    All,
    /// Stop at the first failure classified as permanent
    TransientOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Upper bound on pooled connections (idle + checked out)
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Connections opened eagerly at startup
    #[serde(default = "default_initial_size")]
    pub initial_size: usize,

    /// Separate bound for connections used by transactions
    #[serde(default = "default_transaction_pool_size")]
    pub transaction_pool_size: usize,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub retry_policy: RetryPolicy,
}

fn default_max_size() -> usize {
    10
}

// One below max_size: the last slot is only opened on demand
fn default_initial_size() -> usize {
    9
}

fn default_transaction_pool_size() -> usize {
    2
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            initial_size: default_initial_size(),
            transaction_pool_size: default_transaction_pool_size(),
            max_attempts: default_max_attempts(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(DbError::config("pool.max_size must be at least 1"));
        }
        if self.initial_size > self.max_size {
            return Err(DbError::config(format!(
                "pool.initial_size ({}) exceeds pool.max_size ({})",
                self.initial_size, self.max_size
            )));
        }
        if self.transaction_pool_size == 0 {
            return Err(DbError::config(
                "pool.transaction_pool_size must be at least 1",
            ));
        }
        if self.max_attempts == 0 {
            return Err(DbError::config("pool.max_attempts must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Clean cached rows older than this are reloaded; unset means never
    pub ttl_secs: Option<u64>,
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

impl DbBoxConfig {
    /// Config for a datasource with default pool and cache settings
    pub fn new(datasource: DatasourceConfig) -> Self {
        Self {
            datasource,
            ..Self::default()
        }
    }

    /// Get config file path: ~/.dbbox/config.toml
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dbbox/config.toml")
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| DbError::config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DbError::config(format!(
                "config not found at {}",
                path.display()
            )));
        }
        let content = fs::read_to_string(path).map_err(|e| {
            DbError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply DBBOX_HOST, DBBOX_PORT, DBBOX_DATABASE, DBBOX_USER, DBBOX_PASSWORD
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(host) = env::var("DBBOX_HOST") {
            self.datasource.host = host;
        }
        if let Ok(port) = env::var("DBBOX_PORT") {
            let port = port
                .parse()
                .map_err(|_| DbError::config(format!("DBBOX_PORT is not a port: {port}")))?;
            self.datasource.port = Some(port);
        }
        if let Ok(database) = env::var("DBBOX_DATABASE") {
            self.datasource.database = database;
        }
        if let Ok(user) = env::var("DBBOX_USER") {
            self.datasource.user = user;
        }
        if let Ok(password) = env::var("DBBOX_PASSWORD") {
            self.datasource.password = password;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.datasource.database.is_empty() {
            return Err(DbError::config("datasource.database is required"));
        }
        self.pool.validate()
    }
}
