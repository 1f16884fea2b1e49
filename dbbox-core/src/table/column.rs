//! Column metadata and the cached row representation

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::result::ColumnInfo;
use crate::value::{DataType, Value};

/// A table column as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    type_name: String,
    data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            name: name.into(),
            data_type: DataType::from_type_name(&type_name),
            type_name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type name exactly as the engine reported it
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Equality of a stored value and a candidate under this column's type.
    ///
    /// Both sides are coerced first, so `Long(1)` matches `Int(1)` or `"1"`
    /// in a numeric column. Values that do not coerce compare structurally.
    pub fn value_matches(&self, value: &Value, candidate: &Value) -> bool {
        match (self.data_type.coerce(value), self.data_type.coerce(candidate)) {
            (Some(a), Some(b)) => a == b,
            _ => value == candidate,
        }
    }
}

impl From<&ColumnInfo> for Column {
    fn from(info: &ColumnInfo) -> Self {
        Column::new(info.name.as_str(), info.type_name.as_str())
    }
}

/// One column's value inside a cached row
#[derive(Debug, Clone, PartialEq)]
pub struct TableEntry {
    column: Arc<Column>,
    value: Value,
}

impl TableEntry {
    pub fn new(column: Arc<Column>, value: Value) -> Self {
        Self { column, value }
    }

    pub fn column(&self) -> &Column {
        &self.column
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn update(&mut self, value: Value) {
        self.value = value;
    }

    pub fn matches(&self, candidate: &Value) -> bool {
        self.column.value_matches(&self.value, candidate)
    }
}

/// Snapshot of one row, one entry per table column in column order
#[derive(Debug, Clone)]
pub struct CachedRow {
    loaded_at: DateTime<Utc>,
    dirty: bool,
    entries: Vec<TableEntry>,
}

impl CachedRow {
    pub(crate) fn new(entries: Vec<TableEntry>) -> Self {
        Self {
            loaded_at: Utc::now(),
            dirty: false,
            entries,
        }
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// True once the row holds local changes not yet flushed
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    pub(crate) fn entry(&self, index: usize) -> Option<&TableEntry> {
        self.entries.get(index)
    }

    pub(crate) fn set(&mut self, index: usize, value: Value) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.update(value);
            self.dirty = true;
        }
    }

    pub(crate) fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|e| e.value.clone()).collect()
    }

    /// Whether the row may still be served. Dirty rows never go stale.
    pub(crate) fn is_fresh(&self, ttl: Option<Duration>) -> bool {
        let Some(ttl) = ttl else {
            return true;
        };
        if self.dirty {
            return true;
        }
        Utc::now()
            .signed_duration_since(self.loaded_at)
            .to_std()
            .map_or(true, |age| age < ttl)
    }
}
