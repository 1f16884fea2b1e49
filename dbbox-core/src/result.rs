//! Materialized query results with a forward cursor and typed getters

use crate::error::{DbError, Result};
use crate::value::Value;

/// Name and engine-reported type of one result column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Rows returned by a query.
///
/// The driver statement is finished by the time a `ResultSet` exists, so
/// holding one never pins a pooled connection.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    columns: Vec<ColumnInfo>,
    rows: Vec<Vec<Value>>,
    cursor: Option<usize>,
}

impl ResultSet {
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            cursor: None,
        }
    }

    /// Advance to the next row. Returns false once the rows are exhausted.
    pub fn next(&mut self) -> bool {
        let next = self.cursor.map_or(0, |c| c + 1);
        if next < self.rows.len() {
            self.cursor = Some(next);
            true
        } else {
            self.cursor = Some(self.rows.len());
            false
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Column name by 0-based position
    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|c| c.name.as_str())
    }

    /// Engine-reported column type name by 0-based position
    pub fn column_type(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|c| c.type_name.as_str())
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn current_row(&self) -> Result<&[Value]> {
        self.cursor
            .and_then(|c| self.rows.get(c))
            .map(Vec::as_slice)
            .ok_or(DbError::NoCurrentRow)
    }

    /// Raw value of a column on the current row
    pub fn get(&self, name: &str) -> Result<&Value> {
        let index = self
            .column_index(name)
            .ok_or_else(|| DbError::missing_column(name))?;
        self.current_row()?
            .get(index)
            .ok_or_else(|| DbError::missing_column(name))
    }

    fn typed<T>(
        &self,
        name: &str,
        expected: &'static str,
        convert: impl FnOnce(&Value) -> Option<T>,
    ) -> Result<Option<T>> {
        let value = self.get(name)?;
        if value.is_null() {
            return Ok(None);
        }
        convert(value).map(Some).ok_or_else(|| DbError::TypeMismatch {
            column: name.to_owned(),
            expected,
            found: value.kind(),
        })
    }

    pub fn get_string(&self, name: &str) -> Result<Option<String>> {
        self.typed(name, "string", |v| match v {
            Value::Bytes(_) => None,
            other => Some(other.to_string()),
        })
    }

    pub fn get_int(&self, name: &str) -> Result<Option<i32>> {
        self.typed(name, "int", |v| {
            v.as_i64().and_then(|i| i32::try_from(i).ok())
        })
    }

    pub fn get_long(&self, name: &str) -> Result<Option<i64>> {
        self.typed(name, "long", Value::as_i64)
    }

    pub fn get_float(&self, name: &str) -> Result<Option<f32>> {
        self.typed(name, "float", |v| v.as_f64().map(|d| d as f32))
    }

    pub fn get_double(&self, name: &str) -> Result<Option<f64>> {
        self.typed(name, "double", Value::as_f64)
    }

    pub fn get_bool(&self, name: &str) -> Result<Option<bool>> {
        self.typed(name, "boolean", Value::as_bool)
    }

    /// Release the result. Rows are owned, so this only drops them.
    pub fn close(self) {}
}
