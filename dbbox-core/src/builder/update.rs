use crate::dispatch::{DataSource, DispatchHandle};
use crate::error::{DbError, Result};
use crate::table::check_name;
use crate::value::Value;

/// `UPDATE <table> SET a = ?, b = ? WHERE <clause> AND <clause>`
///
/// Where clauses are written by the caller with `?` markers; they are
/// renumbered for dialects with positional placeholders.
pub struct UpdateBuilder {
    source: DataSource,
    table: String,
    assignments: Vec<(String, Value)>,
    clauses: Vec<String>,
    clause_params: Vec<Value>,
}

impl UpdateBuilder {
    pub fn new(source: DataSource, table: &str) -> Self {
        Self {
            source,
            table: table.to_string(),
            assignments: Vec::new(),
            clauses: Vec::new(),
            clause_params: Vec::new(),
        }
    }

    /// Assign `column`. Setting a column again replaces its value but keeps
    /// its original position.
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        match self.assignments.iter_mut().find(|(c, _)| c == column) {
            Some((_, existing)) => *existing = value,
            None => self.assignments.push((column.to_string(), value)),
        }
        self
    }

    pub fn where_clause(mut self, clause: &str, params: Vec<Value>) -> Self {
        self.clauses.push(clause.to_string());
        self.clause_params.extend(params);
        self
    }

    pub fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        if self.assignments.is_empty() {
            return Err(DbError::invalid_argument(format!(
                "update of '{}' has no columns to set",
                self.table
            )));
        }
        check_name("table", &self.table)?;
        for (column, _) in &self.assignments {
            check_name("column", column)?;
        }

        let dialect = self.source.dialect();
        let assignments = self
            .assignments
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{column} = {}", dialect.placeholder(i + 1)))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("UPDATE {} SET {assignments}", self.table);

        if !self.clauses.is_empty() {
            let mut next = self.assignments.len() + 1;
            let mut numbered = Vec::with_capacity(self.clauses.len());
            for clause in &self.clauses {
                let (clause, after) = dialect.number_placeholders(clause, next);
                numbered.push(clause);
                next = after;
            }
            sql.push_str(" WHERE ");
            sql.push_str(&numbered.join(" AND "));
        }

        let params = self
            .assignments
            .iter()
            .map(|(_, v)| v.clone())
            .chain(self.clause_params.iter().cloned())
            .collect();
        Ok((sql, params))
    }

    /// Dispatch the update. Fails before dispatch when nothing is set.
    pub fn execute(self) -> Result<DispatchHandle<u64>> {
        let (sql, params) = self.to_sql()?;
        Ok(self.source.update(sql, params))
    }
}
