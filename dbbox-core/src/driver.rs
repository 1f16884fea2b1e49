//! sqlx-backed connections
//!
//! Uses the runtime-selected `Any` driver so one build talks to MySQL,
//! PostgreSQL or SQLite depending on the URL scheme.

use async_trait::async_trait;
use sqlx::any::{install_default_drivers, AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{
    Any, AnyConnection, Column as _, Database, Executor as _, Row as _, TypeInfo as _,
    ValueRef as _,
};

use crate::connection::{BoxConnection, Connection, Connector};
use crate::error::{DbError, Result};
use crate::result::{ColumnInfo, ResultSet};
use crate::value::Value;

/// Opens `AnyConnection`s for a URL such as `mysql://root@localhost:3306/app`
pub struct SqlxConnector {
    url: String,
}

impl SqlxConnector {
    pub fn new(url: impl Into<String>) -> Self {
        install_default_drivers();
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for SqlxConnector {
    async fn connect(&self) -> Result<BoxConnection> {
        let conn = <AnyConnection as sqlx::Connection>::connect(&self.url).await?;
        Ok(Box::new(SqlxConnection { inner: Some(conn) }))
    }
}

pub struct SqlxConnection {
    inner: Option<AnyConnection>,
}

impl SqlxConnection {
    fn conn(&mut self) -> Result<&mut AnyConnection> {
        self.inner
            .as_mut()
            .ok_or_else(|| DbError::Driver(sqlx::Error::Protocol("connection is closed".into())))
    }

    /// Transaction control statement, sent unprepared
    async fn control(&mut self, sql: &'static str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(sqlx::raw_sql(sql)).await?;
        Ok(())
    }
}

fn bind_params<'q>(sql: &'q str, params: &[Value]) -> Query<'q, Any, AnyArguments<'q>> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, value| match value {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Long(l) => query.bind(*l),
            Value::Float(f) => query.bind(*f),
            Value::Double(d) => query.bind(*d),
            Value::Text(s) => query.bind(s.clone()),
            Value::Bytes(b) => query.bind(b.clone()),
        })
}

type AnyColumn = <Any as Database>::Column;

fn column_info(column: &AnyColumn) -> ColumnInfo {
    ColumnInfo::new(column.name(), column.type_info().name())
}

fn decode_value(row: &AnyRow, index: usize) -> Result<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_owned();

    let value = match type_name.as_str() {
        "BOOLEAN" => Value::Bool(row.try_get(index)?),
        "SMALLINT" => Value::Int(i32::from(row.try_get::<i16, _>(index)?)),
        "INTEGER" => Value::Int(row.try_get(index)?),
        "BIGINT" => Value::Long(row.try_get(index)?),
        "REAL" => Value::Float(row.try_get(index)?),
        "DOUBLE" => Value::Double(row.try_get(index)?),
        "BLOB" => Value::Bytes(row.try_get(index)?),
        _ => Value::Text(row.try_get(index)?),
    };
    Ok(value)
}

/// Shape of a statement with no row to read it from
async fn describe(conn: &mut AnyConnection, sql: &str) -> Result<Vec<ColumnInfo>> {
    let described = conn.describe(sql).await?;
    Ok(described.columns().iter().map(column_info).collect())
}

fn decode_row(row: &AnyRow) -> Result<Vec<Value>> {
    (0..row.len()).map(|index| decode_value(row, index)).collect()
}

#[async_trait]
impl Connection for SqlxConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        let conn = self.conn()?;
        let rows = bind_params(sql, params).fetch_all(&mut *conn).await?;

        let columns = match rows.first() {
            Some(row) => row.columns().iter().map(column_info).collect(),
            None => describe(conn, sql).await?,
        };
        let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>>>()?;

        Ok(ResultSet::new(columns, rows))
    }

    async fn columns(&mut self, sql: &str) -> Result<Vec<ColumnInfo>> {
        let conn = self.conn()?;
        // stops reading after the first row
        let first = sqlx::query(sql).fetch_optional(&mut *conn).await?;
        match first {
            Some(row) => Ok(row.columns().iter().map(column_info).collect()),
            None => describe(conn, sql).await,
        }
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let conn = self.conn()?;
        let result = bind_params(sql, params).execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }

    async fn begin(&mut self) -> Result<()> {
        self.control("BEGIN").await
    }

    async fn commit(&mut self) -> Result<()> {
        self.control("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.control("ROLLBACK").await
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.inner.take() {
            sqlx::Connection::close(conn).await?;
        }
        Ok(())
    }
}
