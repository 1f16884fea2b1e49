//! Structured error type for dbbox-core.
//!
//! Uses `thiserror` so library consumers get composable errors.
//! The CLI wraps these in `anyhow` for context.

use thiserror::Error;

/// Main error type for dbbox-core operations
#[derive(Error, Debug)]
pub enum DbError {
    /// Driver-level failure (I/O, protocol, database-reported error)
    #[error("database driver error: {0}")]
    Driver(#[from] sqlx::Error),

    /// The pool was shut down while waiting for a connection
    #[error("connection pool is closed")]
    PoolClosed,

    /// Every attempt of a retried operation failed
    #[error("{operation} failed in all {attempts} attempts: {source}")]
    Exhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<DbError>,
    },

    /// A dispatched statement failed; carries the SQL and parameters
    #[error("error executing '{sql}' with parameters '{params}': {source}")]
    Statement {
        sql: String,
        params: String,
        #[source]
        source: Box<DbError>,
    },

    /// Transaction was rolled back
    #[error("transaction failed: {source}")]
    Transaction {
        #[source]
        source: Box<DbError>,
    },

    /// Caller violated an API contract
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Column name not known to the table
    #[error("table '{table}' contains no column '{column}'")]
    UnknownColumn { table: String, column: String },

    /// Flush requested for a key that was never loaded
    #[error("key '{key}' is not cached in table '{table}'")]
    NotCached { table: String, key: String },

    /// Point load found no row
    #[error("no row with key '{key}' in table '{table}'")]
    RowNotFound { table: String, key: String },

    /// Result getter called before `next()` or past the end
    #[error("result cursor is not positioned on a row")]
    NoCurrentRow,

    /// Result getter named a column the result does not have
    #[error("result has no column '{column}'")]
    MissingColumn { column: String },

    /// Result getter asked for an incompatible type
    #[error("column '{column}' holds {found}, expected {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Configuration error
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// Background worker panicked or was aborted
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Result type alias for dbbox-core operations
pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    pub fn exhausted(operation: impl Into<String>, attempts: u32, source: DbError) -> Self {
        Self::Exhausted {
            operation: operation.into(),
            attempts,
            source: Box::new(source),
        }
    }

    pub fn statement(sql: impl Into<String>, params: impl Into<String>, source: DbError) -> Self {
        Self::Statement {
            sql: sql.into(),
            params: params.into(),
            source: Box::new(source),
        }
    }

    pub fn transaction(source: DbError) -> Self {
        Self::Transaction {
            source: Box::new(source),
        }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn unknown_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::UnknownColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn not_cached(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotCached {
            table: table.into(),
            key: key.into(),
        }
    }

    pub fn row_not_found(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::RowNotFound {
            table: table.into(),
            key: key.into(),
        }
    }

    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Whether a retry could plausibly succeed.
    ///
    /// Constraint violations, syntax/access errors and decode problems are
    /// permanent; connectivity failures and anything unrecognized are not.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::Driver(err) => driver_error_is_transient(err),
            DbError::PoolClosed => true,
            DbError::Exhausted { source, .. }
            | DbError::Statement { source, .. }
            | DbError::Transaction { source } => source.is_transient(),
            DbError::Worker(_) => true,
            _ => false,
        }
    }

    /// Innermost error, skipping the escalation wrappers.
    pub fn root_cause(&self) -> &DbError {
        match self {
            DbError::Exhausted { source, .. }
            | DbError::Statement { source, .. }
            | DbError::Transaction { source } => source.root_cause(),
            other => other,
        }
    }
}

fn driver_error_is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            if matches!(
                db.kind(),
                sqlx::error::ErrorKind::UniqueViolation
                    | sqlx::error::ErrorKind::ForeignKeyViolation
                    | sqlx::error::ErrorKind::NotNullViolation
                    | sqlx::error::ErrorKind::CheckViolation
            ) {
                return false;
            }
            // SQLSTATE class 42 is syntax/access; SQLite reports plain SQLITE_ERROR as "1"
            match db.code() {
                Some(code) => !(code.starts_with("42") || code == "1"),
                None => true,
            }
        }
        sqlx::Error::Configuration(_)
        | sqlx::Error::RowNotFound
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Encode(_)
        | sqlx::Error::Decode(_) => false,
        _ => true,
    }
}
