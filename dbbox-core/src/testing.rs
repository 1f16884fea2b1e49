//! In-memory connector for unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::{DatasourceConfig, DbBoxConfig};
use crate::connection::{BoxConnection, Connection, Connector};
use crate::dialect::Dialect;
use crate::dispatch::DataSource;
use crate::error::Result;
use crate::result::{ColumnInfo, ResultSet};
use crate::value::Value;

/// Shared record of what the fake connections were asked to do
#[derive(Default)]
pub(crate) struct Recorder {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub dropped: AtomicUsize,
    statements: Mutex<Vec<(String, Vec<Value>)>>,
}

impl Recorder {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    pub fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.statements.lock().unwrap().clone()
    }

    fn record(&self, sql: &str, params: &[Value]) {
        self.statements
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
    }
}

/// Every table it is asked about has `id BIGINT, name TEXT`
pub(crate) struct NullConnection(Arc<Recorder>);

impl Drop for NullConnection {
    fn drop(&mut self) {
        self.0.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connection for NullConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        self.0.record(sql, params);
        Ok(ResultSet::default())
    }
    async fn columns(&mut self, sql: &str) -> Result<Vec<ColumnInfo>> {
        self.0.record(sql, &[]);
        Ok(vec![
            ColumnInfo::new("id", "BIGINT"),
            ColumnInfo::new("name", "TEXT"),
        ])
    }
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.0.record(sql, params);
        Ok(0)
    }
    async fn begin(&mut self) -> Result<()> {
        Ok(())
    }
    async fn commit(&mut self) -> Result<()> {
        Ok(())
    }
    async fn rollback(&mut self) -> Result<()> {
        Ok(())
    }
    async fn close(&mut self) -> Result<()> {
        self.0.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct NullConnector(pub Arc<Recorder>);

#[async_trait]
impl Connector for NullConnector {
    async fn connect(&self) -> Result<BoxConnection> {
        self.0.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(NullConnection(self.0.clone())))
    }
}

/// A data source over [`NullConnector`] that records every statement
pub(crate) async fn data_source(driver: Dialect) -> (DataSource, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let mut config = DbBoxConfig::new(DatasourceConfig {
        driver,
        database: "test".to_string(),
        ..DatasourceConfig::default()
    });
    config.pool.initial_size = 1;
    config.pool.max_size = 2;

    let source = DataSource::with_connector(config, Arc::new(NullConnector(recorder.clone())))
        .await
        .unwrap();
    (source, recorder)
}
