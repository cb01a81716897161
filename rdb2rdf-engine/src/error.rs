//! Engine error types

use rdb2rdf_tabular::TabularError;
use thiserror::Error;

/// Errors raised while building or executing a mapping document.
///
/// Configuration errors (`InvalidTemplate`, `UnmappedDatatype`,
/// `AmbiguousJoinParent`, ...) are reported before any row is processed
/// whenever the problem is detectable up front. Null template fields are a
/// routine data condition and never surface here.
#[derive(Debug, Error)]
pub enum R2rmlError {
    /// Invalid template syntax
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    /// Invalid property value in a mapping rule
    #[error("Invalid value for {property}: {message}")]
    InvalidValue { property: String, message: String },

    /// Reference to a mapping id that is not in the document
    #[error("Unknown mapping: {0}")]
    UnknownMapping(String),

    /// Column not present in a query result
    #[error("Column not found: {column} in results of {mapping}")]
    ColumnNotFound { column: String, mapping: String },

    /// Native SQL type with no literal datatype
    #[error("Unmapped source datatype: '{0}'")]
    UnmappedDatatype(String),

    /// Parameterized join against a parent view that does not read exactly one table
    #[error("Join parent {parent} must read exactly one table, its view reads {tables}")]
    AmbiguousJoinParent { parent: String, tables: usize },

    /// Reference resolved before its parent mapping executed
    #[error("Mapping {child} references {parent}, which has not executed yet")]
    OrderingViolation { child: String, parent: String },

    /// Reference graph is not acyclic
    #[error("Dependency cycle between mappings: {0}")]
    DependencyCycle(String),

    /// Engine configuration problem
    #[error("Configuration error: {0}")]
    Config(String),

    /// Query execution or cursor error from the source
    #[error("Source error: {0}")]
    Source(#[from] TabularError),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Graph parse or write failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Unreadable or unwritable run log
    #[error("Run log error: {0}")]
    RunLog(String),

    /// Target store failure
    #[error("Store error: {0}")]
    Store(String),
}

impl R2rmlError {
    /// True for errors caused by the mapping document or configuration rather
    /// than by I/O.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            R2rmlError::InvalidTemplate(_)
                | R2rmlError::InvalidValue { .. }
                | R2rmlError::UnknownMapping(_)
                | R2rmlError::ColumnNotFound { .. }
                | R2rmlError::UnmappedDatatype(_)
                | R2rmlError::AmbiguousJoinParent { .. }
                | R2rmlError::OrderingViolation { .. }
                | R2rmlError::DependencyCycle(_)
                | R2rmlError::Config(_)
        )
    }

    /// Attach the mapping id to a column lookup failure raised below the
    /// mapping level.
    pub(crate) fn in_mapping(self, mapping_id: &str) -> Self {
        match self {
            R2rmlError::ColumnNotFound { column, mapping } if mapping.is_empty() => {
                R2rmlError::ColumnNotFound {
                    column,
                    mapping: mapping_id.to_string(),
                }
            }
            other => other,
        }
    }

    pub(crate) fn invalid_value(property: &str, message: impl Into<String>) -> Self {
        R2rmlError::InvalidValue {
            property: property.to_string(),
            message: message.into(),
        }
    }
}

impl From<rio_turtle::TurtleError> for R2rmlError {
    fn from(e: rio_turtle::TurtleError) -> Self {
        R2rmlError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for R2rmlError {
    fn from(e: serde_json::Error) -> Self {
        R2rmlError::RunLog(e.to_string())
    }
}

impl From<rusqlite::Error> for R2rmlError {
    fn from(e: rusqlite::Error) -> Self {
        R2rmlError::Store(e.to_string())
    }
}

/// Result type for engine operations
pub type R2rmlResult<T> = Result<T, R2rmlError>;
