use crate::dispatch::{DataSource, DispatchHandle};
use crate::error::{DbError, Result};
use crate::table::check_name;
use crate::value::DataType;

/// `CREATE TABLE IF NOT EXISTS` with dialect column types
pub struct TableBuilder {
    source: DataSource,
    name: String,
    columns: Vec<(String, DataType)>,
    primary_key: Option<String>,
}

impl TableBuilder {
    pub fn new(source: DataSource, name: &str) -> Result<Self> {
        check_name("table", name)?;
        Ok(Self {
            source,
            name: name.to_string(),
            columns: Vec::new(),
            primary_key: None,
        })
    }

    pub fn add(mut self, column: &str, data_type: DataType) -> Self {
        self.columns.push((column.to_string(), data_type));
        self
    }

    pub fn add_string(self, column: &str) -> Self {
        self.add(column, DataType::String)
    }

    pub fn add_int(self, column: &str) -> Self {
        self.add(column, DataType::Int)
    }

    pub fn add_long(self, column: &str) -> Self {
        self.add(column, DataType::Long)
    }

    pub fn add_float(self, column: &str) -> Self {
        self.add(column, DataType::Float)
    }

    pub fn add_double(self, column: &str) -> Self {
        self.add(column, DataType::Double)
    }

    pub fn add_boolean(self, column: &str) -> Self {
        self.add(column, DataType::Boolean)
    }

    pub fn add_bytes(self, column: &str) -> Self {
        self.add(column, DataType::Bytes)
    }

    /// Make `column` the primary key. Upserts on a cached table need a
    /// unique identifier column.
    pub fn primary_key(mut self, column: &str) -> Self {
        self.primary_key = Some(column.to_string());
        self
    }

    pub fn to_sql(&self) -> Result<String> {
        if self.columns.is_empty() {
            return Err(DbError::invalid_argument(format!(
                "table '{}' needs at least one column",
                self.name
            )));
        }

        let dialect = self.source.dialect();
        let mut definitions = Vec::with_capacity(self.columns.len() + 1);
        for (column, data_type) in &self.columns {
            check_name("column", column)?;
            definitions.push(format!("{column} {}", dialect.column_type(*data_type)));
        }

        if let Some(key) = &self.primary_key {
            if !self.columns.iter().any(|(c, _)| c == key) {
                return Err(DbError::unknown_column(&self.name, key));
            }
            definitions.push(format!("PRIMARY KEY ({key})"));
        }

        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.name,
            definitions.join(", ")
        ))
    }

    pub fn create(self) -> DispatchHandle<u64> {
        match self.to_sql() {
            Ok(sql) => self.source.update(sql, Vec::new()),
            Err(err) => DispatchHandle::ready(Err(err)),
        }
    }
}
