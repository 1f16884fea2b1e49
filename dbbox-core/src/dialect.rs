//! SQL dialect differences: placeholders, upserts, DDL type names

use serde::{Deserialize, Serialize};

use crate::value::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    MySql,
    Postgres,
    Sqlite,
}

impl Dialect {
    pub fn scheme(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Dialect::MySql => 3306,
            Dialect::Postgres => 5432,
            Dialect::Sqlite => 0,
        }
    }

    /// Placeholder for the 1-based parameter `n`
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${n}"),
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
        }
    }

    /// `count` comma-separated placeholders starting at parameter `first`
    pub fn placeholders(&self, first: usize, count: usize) -> String {
        (first..first + count)
            .map(|n| self.placeholder(n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Insert-or-update of every column, keyed on `identifier`.
    ///
    /// Returns the statement and how many times the column values must be
    /// bound (MySQL repeats them for the update half).
    pub fn upsert(&self, table: &str, identifier: &str, columns: &[&str]) -> (String, usize) {
        let column_list = columns.join(", ");
        let values = self.placeholders(1, columns.len());
        match self {
            Dialect::MySql => {
                let assignments = columns
                    .iter()
                    .map(|c| format!("{c} = ?"))
                    .collect::<Vec<_>>()
                    .join(", ");
                (
                    format!(
                        "INSERT INTO {table} ({column_list}) VALUES ({values}) \
                         ON DUPLICATE KEY UPDATE {assignments}"
                    ),
                    2,
                )
            }
            Dialect::Postgres | Dialect::Sqlite => {
                let assignments = columns
                    .iter()
                    .map(|c| format!("{c} = EXCLUDED.{c}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                (
                    format!(
                        "INSERT INTO {table} ({column_list}) VALUES ({values}) \
                         ON CONFLICT ({identifier}) DO UPDATE SET {assignments}"
                    ),
                    1,
                )
            }
        }
    }

    /// Column type used by `CREATE TABLE`
    pub fn column_type(&self, data_type: DataType) -> &'static str {
        match (self, data_type) {
            (Dialect::MySql, DataType::String) => "VARCHAR(255)",
            (Dialect::MySql, DataType::Int) => "INT",
            (Dialect::MySql, DataType::Long) => "BIGINT",
            (Dialect::MySql, DataType::Float) => "FLOAT",
            (Dialect::MySql, DataType::Double) => "DOUBLE",
            (Dialect::MySql, DataType::Boolean) => "BOOLEAN",
            (Dialect::MySql, DataType::Bytes) => "BLOB",
            (Dialect::Postgres, DataType::String) => "TEXT",
            (Dialect::Postgres, DataType::Int) => "INTEGER",
            (Dialect::Postgres, DataType::Long) => "BIGINT",
            (Dialect::Postgres, DataType::Float) => "REAL",
            (Dialect::Postgres, DataType::Double) => "DOUBLE PRECISION",
            (Dialect::Postgres, DataType::Boolean) => "BOOLEAN",
            (Dialect::Postgres, DataType::Bytes) => "BYTEA",
            // the sqlx Any driver cannot decode SQLite's BOOLEAN affinity, store 0/1
            (Dialect::Sqlite, DataType::Boolean) => "INTEGER",
            (Dialect::Sqlite, DataType::String) => "TEXT",
            (Dialect::Sqlite, DataType::Int | DataType::Long) => "INTEGER",
            (Dialect::Sqlite, DataType::Float | DataType::Double) => "REAL",
            (Dialect::Sqlite, DataType::Bytes) => "BLOB",
        }
    }

    /// Rewrite `?` markers in a caller-written clause to this dialect's
    /// placeholders, numbering from `first`. Markers inside single-quoted
    /// literals are left alone. Returns the clause and the next free number.
    pub fn number_placeholders(&self, clause: &str, first: usize) -> (String, usize) {
        let mut out = String::with_capacity(clause.len());
        let mut next = first;
        let mut in_literal = false;
        for ch in clause.chars() {
            match ch {
                '\'' => {
                    in_literal = !in_literal;
                    out.push(ch);
                }
                '?' if !in_literal => {
                    out.push_str(&self.placeholder(next));
                    next += 1;
                }
                _ => out.push(ch),
            }
        }
        (out, next)
    }
}
