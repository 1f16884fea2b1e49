//! Driver seam: the capability set the pool and executor rely on
//!
//! Anything that can open a connection and run parameterized statements can
//! back a [`DataSource`](crate::DataSource). The default implementation is
//! [`SqlxConnector`](crate::driver::SqlxConnector).

use async_trait::async_trait;

use crate::error::Result;
use crate::result::{ColumnInfo, ResultSet};
use crate::value::Value;

/// A live link to the database, owned by one operation at a time
#[async_trait]
pub trait Connection: Send {
    /// Run a statement that returns rows
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<ResultSet>;

    /// Column shape of a row-returning statement.
    ///
    /// Drivers should stop reading at the first row. The fallback runs the
    /// whole query.
    async fn columns(&mut self, sql: &str) -> Result<Vec<ColumnInfo>> {
        Ok(self.query(sql, &[]).await?.columns().to_vec())
    }

    /// Run a statement that returns an affected-row count
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Turn auto-commit off by opening a transaction
    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Close the link. Further calls on a closed connection fail.
    async fn close(&mut self) -> Result<()>;
}

pub type BoxConnection = Box<dyn Connection>;

/// Opens new connections for a pool
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<BoxConnection>;
}
