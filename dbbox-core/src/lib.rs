pub mod builder;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod pool;
pub mod result;
pub mod retry;
pub mod table;
pub mod value;

#[cfg(test)]
mod testing;

pub use builder::{SelectBuilder, TableBuilder, UpdateBuilder};
pub use config::{CacheConfig, DatasourceConfig, DbBoxConfig, PoolConfig, RetryPolicy};
pub use connection::{BoxConnection, Connection, Connector};
pub use dialect::Dialect;
pub use dispatch::{DataSource, DispatchHandle};
pub use driver::{SqlxConnection, SqlxConnector};
pub use error::{DbError, Result};
pub use pool::{Checkout, ConnectionPool, PoolStatus};
pub use result::{ColumnInfo, ResultSet};
pub use retry::RetryingExecutor;
pub use table::{CachedRow, Column, Table, TableEntry, TableStats};
pub use value::{DataType, Value};
