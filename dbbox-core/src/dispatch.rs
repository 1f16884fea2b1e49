//! The data source: pooled, retrying, asynchronous statement dispatch
//!
//! `query` and `update` run on spawned tasks gated by a worker semaphore the
//! size of the pool, so the number of tasks competing for connections never
//! outgrows the pool. Transactions run on the caller's task against their own
//! small pool, isolated from pooled read/write traffic.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::builder::TableBuilder;
use crate::config::DbBoxConfig;
use crate::connection::{BoxConnection, Connector};
use crate::dialect::Dialect;
use crate::driver::SqlxConnector;
use crate::error::{DbError, Result};
use crate::pool::{ConnectionPool, PoolStatus};
use crate::result::{ColumnInfo, ResultSet};
use crate::retry::RetryingExecutor;
use crate::table::Table;
use crate::value::{render_params, Value};

/// Completion handle for dispatched work.
///
/// Await it to observe the outcome; drop it to let the work finish on its own.
pub struct DispatchHandle<T> {
    state: HandleState<T>,
}

enum HandleState<T> {
    Ready(Option<Result<T>>),
    Spawned(JoinHandle<Result<T>>),
}

impl<T: Send + 'static> DispatchHandle<T> {
    pub(crate) fn spawn<F>(work: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            state: HandleState::Spawned(tokio::spawn(work)),
        }
    }
}

impl<T> DispatchHandle<T> {
    /// A handle that is already complete
    pub fn ready(result: Result<T>) -> Self {
        Self {
            state: HandleState::Ready(Some(result)),
        }
    }

    pub fn is_finished(&self) -> bool {
        match &self.state {
            HandleState::Ready(_) => true,
            HandleState::Spawned(join) => join.is_finished(),
        }
    }
}

// Never pin-projects into its fields; JoinHandle is Unpin.
impl<T> Unpin for DispatchHandle<T> {}

impl<T> Future for DispatchHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            HandleState::Ready(slot) => Poll::Ready(slot.take().unwrap_or_else(|| {
                Err(DbError::invalid_argument("dispatch handle polled after completion"))
            })),
            HandleState::Spawned(join) => Pin::new(join)
                .poll(cx)
                .map(|joined| joined.unwrap_or_else(|err| Err(DbError::Worker(err)))),
        }
    }
}

struct Inner {
    config: DbBoxConfig,
    executor: RetryingExecutor,
    transactions: ConnectionPool,
    workers: Semaphore,
    tables: Mutex<HashMap<String, Table>>,
}

/// Manages pooled connections and runs statements against them.
///
/// Cheap to clone; clones share pools, workers and the table registry.
#[derive(Clone)]
pub struct DataSource {
    inner: Arc<Inner>,
}

impl DataSource {
    /// Connect using the sqlx driver selected by `config.datasource.driver`.
    pub async fn connect(config: DbBoxConfig) -> Result<Self> {
        config.validate()?;
        let connector = SqlxConnector::new(config.datasource.url());
        Self::with_connector(config, Arc::new(connector)).await
    }

    /// Build on a caller-supplied connector.
    pub async fn with_connector(config: DbBoxConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        let pool_config = &config.pool;
        pool_config.validate()?;

        let pool = ConnectionPool::open(
            "main",
            connector.clone(),
            pool_config.max_size,
            pool_config.initial_size,
        )
        .await?;
        let transactions =
            ConnectionPool::open("transaction", connector, pool_config.transaction_pool_size, 0)
                .await?;

        let executor = RetryingExecutor::new(
            Arc::new(pool),
            pool_config.max_attempts,
            pool_config.retry_policy,
        );
        let workers = Semaphore::new(pool_config.max_size);

        info!(
            driver = config.datasource.driver.scheme(),
            max_size = pool_config.max_size,
            max_attempts = pool_config.max_attempts,
            "data source ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                executor,
                transactions,
                workers,
                tables: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn config(&self) -> &DbBoxConfig {
        &self.inner.config
    }

    pub fn dialect(&self) -> Dialect {
        self.inner.config.datasource.driver
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.inner.executor.pool().status()
    }

    pub fn transaction_pool_status(&self) -> PoolStatus {
        self.inner.transactions.status()
    }

    /// Run a row-returning statement in the background.
    pub fn query(&self, sql: impl Into<String>, params: Vec<Value>) -> DispatchHandle<ResultSet> {
        self.dispatch("query", sql.into(), params, |conn, sql, params| {
            Box::pin(async move { conn.query(&sql, &params).await })
        })
    }

    /// Run a data-modifying statement in the background; yields affected rows.
    pub fn update(&self, sql: impl Into<String>, params: Vec<Value>) -> DispatchHandle<u64> {
        self.dispatch("update", sql.into(), params, |conn, sql, params| {
            Box::pin(async move { conn.execute(&sql, &params).await })
        })
    }

    /// Column shape of a row-returning statement, without reading its rows.
    pub fn columns(&self, sql: impl Into<String>) -> DispatchHandle<Vec<ColumnInfo>> {
        self.dispatch("describe", sql.into(), Vec::new(), |conn, sql, _| {
            Box::pin(async move { conn.columns(&sql).await })
        })
    }

    fn dispatch<T, F>(
        &self,
        operation: &'static str,
        sql: String,
        params: Vec<Value>,
        call: F,
    ) -> DispatchHandle<T>
    where
        T: Send + 'static,
        F: for<'c> Fn(&'c mut BoxConnection, Arc<str>, Arc<[Value]>) -> BoxFuture<'c, Result<T>>
            + Send
            + Sync
            + 'static,
    {
        let inner = self.inner.clone();
        let sql: Arc<str> = Arc::from(sql);
        let params: Arc<[Value]> = Arc::from(params);

        DispatchHandle::spawn(async move {
            debug!(operation, sql = %sql, "dispatching statement");
            let outcome = match inner.workers.acquire().await {
                Ok(_permit) => {
                    inner
                        .executor
                        .run(operation, |conn| call(conn, sql.clone(), params.clone()))
                        .await
                }
                Err(_) => Err(DbError::PoolClosed),
            };
            outcome.map_err(|err| DbError::statement(&*sql, render_params(&params), err))
        })
    }

    /// Run `work` inside a transaction on the caller's task.
    ///
    /// Commits when `work` succeeds and rolls back when it (or the commit)
    /// fails. The connection returns to auto-commit either way and goes back
    /// to the transaction pool; it is discarded if the rollback itself failed.
    /// If the caller stops polling partway through, the connection is dropped
    /// with its transaction still open and the slot is freed.
    pub async fn transaction<T, F>(&self, work: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut BoxConnection) -> BoxFuture<'c, Result<T>>,
    {
        let mut conn = self
            .inner
            .transactions
            .acquire()
            .await
            .map_err(DbError::transaction)?;

        if let Err(err) = conn.begin().await {
            conn.discard().await;
            return Err(DbError::transaction(err));
        }

        let outcome = match work(&mut *conn).await {
            Ok(value) => conn.commit().await.map(|()| value),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(value) => {
                conn.release().await;
                Ok(value)
            }
            Err(err) => {
                match conn.rollback().await {
                    Ok(()) => conn.release().await,
                    Err(rollback_err) => {
                        error!(error = %rollback_err, "rollback failed");
                        conn.discard().await;
                    }
                }
                Err(DbError::transaction(err))
            }
        }
    }

    /// Table handle for `name`, opening it on first use.
    ///
    /// The same `Table` is returned for the same name, so every caller shares
    /// one row cache per table.
    pub async fn table(&self, name: &str, identifier: &str) -> Result<Table> {
        let mut tables = self.inner.tables.lock().await;
        if let Some(table) = tables.get(name) {
            if table.identifier() != identifier {
                return Err(DbError::invalid_argument(format!(
                    "table '{name}' is already open with identifier '{}', not '{identifier}'",
                    table.identifier()
                )));
            }
            return Ok(table.clone());
        }

        let table = Table::open(self.clone(), name, identifier).await?;
        tables.insert(name.to_string(), table.clone());
        Ok(table)
    }

    pub(crate) fn downgrade(&self) -> WeakDataSource {
        WeakDataSource {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// DDL helper for `CREATE TABLE IF NOT EXISTS`
    pub fn create_table(&self, name: &str) -> Result<TableBuilder> {
        TableBuilder::new(self.clone(), name)
    }

    /// Stop dispatching, close idle connections in both pools and forget
    /// open tables.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.workers.close();
        self.inner.tables.lock().await.clear();

        let pooled = self.inner.executor.pool().shutdown().await;
        let transactions = self.inner.transactions.shutdown().await;
        pooled.and(transactions)
    }
}

/// Non-owning reference held by open tables.
///
/// The registry inside a data source owns its tables, so a table must not
/// own the data source back.
#[derive(Clone)]
pub(crate) struct WeakDataSource {
    inner: Weak<Inner>,
}

impl WeakDataSource {
    /// Fails with `PoolClosed` once every `DataSource` handle is gone.
    pub(crate) fn upgrade(&self) -> Result<DataSource> {
        self.inner
            .upgrade()
            .map(|inner| DataSource { inner })
            .ok_or(DbError::PoolClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::data_source;

    #[tokio::test]
    async fn ready_handle_yields_its_result() {
        let handle = DispatchHandle::ready(Ok(7u64));
        assert!(handle.is_finished());
        assert_eq!(handle.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn dropping_every_handle_closes_the_pools_despite_open_tables() {
        let (source, recorder) = data_source(Dialect::Sqlite).await;
        let table = source.table("users", "id").await.unwrap();
        let copy = source.clone();
        drop(source);
        assert_eq!(recorder.dropped(), 0);

        drop(copy);
        assert_eq!(recorder.dropped(), recorder.opened());
        assert!(matches!(table.exists("1").await, Err(DbError::PoolClosed)));
        assert!(matches!(table.update("1").await, Err(DbError::PoolClosed)));
    }
}
