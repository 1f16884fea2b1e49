//! Shared fixtures for dbbox-core integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dbbox_core::{
    BoxConnection, ColumnInfo, Connection, Connector, DataSource, DatasourceConfig, DbBoxConfig,
    DbError, Dialect, ResultSet, SqlxConnector, Value,
};
use tempfile::TempDir;

/// Counters and failure knobs shared by every `FlakyConnection`
#[derive(Default)]
pub struct Faults {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub executions: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    in_flight: AtomicUsize,
    failures_left: AtomicUsize,
    permanent: AtomicBool,
    delay_ms: AtomicU64,
}

impl Faults {
    /// Fail the next `count` statements, whichever connection runs them
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Failures injected from now on are classified as permanent
    pub fn fail_permanently(&self) {
        self.permanent.store(true, Ordering::SeqCst);
    }

    pub fn delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    async fn run(&self) -> dbbox_core::Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.executions.fetch_add(1, Ordering::SeqCst);

        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if !fail {
            return Ok(());
        }
        if self.permanent.load(Ordering::SeqCst) {
            Err(DbError::Driver(sqlx::Error::ColumnNotFound("missing".into())))
        } else {
            Err(DbError::Driver(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))))
        }
    }
}

struct FlakyConnection(Arc<Faults>);

#[async_trait]
impl Connection for FlakyConnection {
    async fn query(&mut self, _sql: &str, _params: &[Value]) -> dbbox_core::Result<ResultSet> {
        self.0.run().await?;
        Ok(ResultSet::default())
    }

    async fn execute(&mut self, _sql: &str, _params: &[Value]) -> dbbox_core::Result<u64> {
        self.0.run().await?;
        Ok(1)
    }

    async fn begin(&mut self) -> dbbox_core::Result<()> {
        Ok(())
    }

    async fn commit(&mut self) -> dbbox_core::Result<()> {
        Ok(())
    }

    async fn rollback(&mut self) -> dbbox_core::Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> dbbox_core::Result<()> {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FlakyConnector(pub Arc<Faults>);

#[async_trait]
impl Connector for FlakyConnector {
    async fn connect(&self) -> dbbox_core::Result<BoxConnection> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FlakyConnection(self.0.clone())))
    }
}

/// Data source with default pool settings over a `FlakyConnector`
pub async fn flaky_source(config: DbBoxConfig) -> (DataSource, Arc<Faults>) {
    let faults = Arc::new(Faults::default());
    let source = DataSource::with_connector(config, Arc::new(FlakyConnector(faults.clone())))
        .await
        .unwrap();
    (source, faults)
}

pub fn config_for(driver: Dialect, database: &str) -> DbBoxConfig {
    DbBoxConfig::new(DatasourceConfig {
        driver,
        database: database.to_string(),
        ..DatasourceConfig::default()
    })
}

/// Every statement that reached a real connection, in order
#[derive(Default)]
pub struct StatementLog {
    entries: Mutex<Vec<String>>,
    rows_read: AtomicUsize,
}

impl StatementLog {
    /// Rows materialized by `query` calls since the last `clear`
    pub fn rows_read(&self) -> usize {
        self.rows_read.load(Ordering::SeqCst)
    }

    pub fn all(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.all().iter().filter(|sql| sql.starts_with(prefix)).count()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
        self.rows_read.store(0, Ordering::SeqCst);
    }

    fn push(&self, sql: &str) {
        self.entries.lock().unwrap().push(sql.to_string());
    }
}

struct LoggingConnection {
    inner: BoxConnection,
    log: Arc<StatementLog>,
}

#[async_trait]
impl Connection for LoggingConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> dbbox_core::Result<ResultSet> {
        self.log.push(sql);
        let result = self.inner.query(sql, params).await?;
        self.log.rows_read.fetch_add(result.len(), Ordering::SeqCst);
        Ok(result)
    }

    async fn columns(&mut self, sql: &str) -> dbbox_core::Result<Vec<ColumnInfo>> {
        self.log.push(sql);
        self.inner.columns(sql).await
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> dbbox_core::Result<u64> {
        self.log.push(sql);
        self.inner.execute(sql, params).await
    }

    async fn begin(&mut self) -> dbbox_core::Result<()> {
        self.inner.begin().await
    }

    async fn commit(&mut self) -> dbbox_core::Result<()> {
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> dbbox_core::Result<()> {
        self.inner.rollback().await
    }

    async fn close(&mut self) -> dbbox_core::Result<()> {
        self.inner.close().await
    }
}

struct LoggingConnector {
    inner: SqlxConnector,
    log: Arc<StatementLog>,
}

#[async_trait]
impl Connector for LoggingConnector {
    async fn connect(&self) -> dbbox_core::Result<BoxConnection> {
        Ok(Box::new(LoggingConnection {
            inner: self.inner.connect().await?,
            log: self.log.clone(),
        }))
    }
}

/// SQLite database in a temp dir, reached through the sqlx driver.
///
/// Keep the `TempDir` alive for as long as the data source is used.
pub async fn sqlite_source(ttl_secs: Option<u64>) -> (TempDir, DataSource, Arc<StatementLog>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dbbox.sqlite");
    let mut config = config_for(Dialect::Sqlite, &path.display().to_string());
    config.pool.max_size = 4;
    config.pool.initial_size = 2;
    config.cache.ttl_secs = ttl_secs;

    let log = Arc::new(StatementLog::default());
    let connector = LoggingConnector {
        inner: SqlxConnector::new(config.datasource.url()),
        log: log.clone(),
    };
    let source = DataSource::with_connector(config, Arc::new(connector))
        .await
        .unwrap();
    (dir, source, log)
}

/// `users(id, name, status)` with three rows: 1 active, 2 inactive, 3 active
pub async fn seed_users(source: &DataSource) {
    source
        .create_table("users")
        .unwrap()
        .add_long("id")
        .add_string("name")
        .add_string("status")
        .primary_key("id")
        .create()
        .await
        .unwrap();

    for (id, name, status) in [
        (1i64, "alice", "active"),
        (2, "bob", "inactive"),
        (3, "carol", "active"),
    ] {
        source
            .update(
                "INSERT INTO users (id, name, status) VALUES (?, ?, ?)",
                vec![Value::from(id), Value::from(name), Value::from(status)],
            )
            .await
            .unwrap();
    }
}
