use crate::dispatch::{DataSource, DispatchHandle};
use crate::error::Result;
use crate::result::ResultSet;
use crate::table::check_name;
use crate::value::Value;

/// `SELECT <columns> FROM <table> WHERE a = ? AND b = ?`
pub struct SelectBuilder {
    source: DataSource,
    table: String,
    columns: Vec<String>,
    conditions: Vec<(String, Value)>,
}

impl SelectBuilder {
    pub fn new(source: DataSource, table: &str) -> Self {
        Self {
            source,
            table: table.to_string(),
            columns: Vec::new(),
            conditions: Vec::new(),
        }
    }

    /// Columns to project. Without any, every column is selected.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn where_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((column.to_string(), value.into()));
        self
    }

    pub fn and(self, column: &str, value: impl Into<Value>) -> Self {
        self.where_eq(column, value)
    }

    /// Statement text and its parameters
    pub fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        check_name("table", &self.table)?;
        for column in self.columns.iter().chain(self.conditions.iter().map(|(c, _)| c)) {
            check_name("column", column)?;
        }

        let projection = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };
        let mut sql = format!("SELECT {projection} FROM {}", self.table);

        if !self.conditions.is_empty() {
            let dialect = self.source.dialect();
            let predicates = self
                .conditions
                .iter()
                .enumerate()
                .map(|(i, (column, _))| format!("{column} = {}", dialect.placeholder(i + 1)))
                .collect::<Vec<_>>()
                .join(" AND ");
            sql.push_str(" WHERE ");
            sql.push_str(&predicates);
        }

        let params = self.conditions.iter().map(|(_, v)| v.clone()).collect();
        Ok((sql, params))
    }

    pub fn execute(self) -> DispatchHandle<ResultSet> {
        match self.to_sql() {
            Ok((sql, params)) => self.source.query(sql, params),
            Err(err) => DispatchHandle::ready(Err(err)),
        }
    }
}
