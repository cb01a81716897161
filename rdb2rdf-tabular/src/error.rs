//! Error types for tabular sources.

use thiserror::Error;

/// Errors raised while querying a source or reading a cursor.
#[derive(Debug, Error)]
pub enum TabularError {
    /// Schema or structural error (row width mismatch, duplicate column, etc.)
    #[error("Schema error: {0}")]
    Schema(String),

    /// Column lookup by name failed
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Column lookup by 1-based index failed
    #[error("Column index {index} out of range (1..={count})")]
    IndexOutOfRange { index: usize, count: usize },

    /// Cursor accessed before the first `next()` or after the last row
    #[error("Cursor is not positioned on a row")]
    NoCurrentRow,

    /// Opening or configuring the connection failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// The database rejected or failed to run a query
    #[error("Query failed: {message}\n  query: {query}")]
    Query { query: String, message: String },
}

/// Result type for tabular operations.
pub type Result<T> = std::result::Result<T, TabularError>;
