//! Relational source access for the rdb2rdf mapping engine.
//!
//! This crate provides the row-oriented result model consumed by mapping
//! rules and the [`SqlSource`] trait the engine uses to run queries.
//!
//! # Design
//!
//! - **Owned cursors**: every query returns a materialized [`RowCursor`] that
//!   is dropped by whoever opened it; nothing outlives the iteration
//! - **Re-scannable**: cursors rewind with `before_first()`, so a result can
//!   be hashed and then mapped from a single round-trip
//! - **Native types kept**: column metadata carries the source's type names
//!   for literal datatype derivation

pub mod error;
pub mod row;
pub mod source;
pub mod sqlite;

pub use error::{Result, TabularError};
pub use row::{ColumnInfo, ResultSchema, Row, RowCursor, Value};
pub use source::SqlSource;
pub use sqlite::SqliteSource;
