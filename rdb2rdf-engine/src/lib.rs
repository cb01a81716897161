//! Relational-to-graph mapping engine
//!
//! This crate executes mapping rules against a relational source and
//! materializes the resulting graph statements into a file or a statement
//! store, regenerating only what changed since the previous run.
//!
//! # Key Features
//!
//! - **Validated mapping model**: rules, templates and references are checked
//!   when a [`MappingDocument`] is built, including reference cycles
//! - **Parents-first execution**: referenced mappings run before the mappings
//!   that join against them
//! - **Change detection**: each mapping is fingerprinted by query, definition
//!   and result content; unchanged mappings are skipped
//! - **Provenance side-table**: statements are recorded per mapping so
//!   regenerated mappings can be purged precisely
//!
//! # Usage
//!
//! Parse a [`MappingDefinition`] from JSON, build a [`MappingDocument`] from
//! it, then run an [`Orchestrator`] configured by an [`EngineConfig`] against
//! any [`rdb2rdf_tabular::SqlSource`].

pub mod config;
pub mod error;
pub mod mapping;
pub mod materialize;
pub mod orchestrator;
pub mod runlog;
pub mod signature;
pub mod sync;
pub mod vocab;

pub use config::{EngineConfig, OutputTarget};
pub use error::{R2rmlError, R2rmlResult};
pub use mapping::{
    JoinCondition, MappingDefinition, MappingDocument, MappingRule, ObjectSpec,
    PredicateObjectSpec, Reference, SubjectSpec, Template, TermType, View,
};
pub use materialize::{DatatypeMapper, RdfTerm, Resource, Statement, TermBuilder, XsdDatatype};
pub use orchestrator::{MappingOutcome, MappingReport, Orchestrator, RunReport};
pub use runlog::{MappingLogEntry, PreviousState, RunLog};
pub use signature::{ChangeDetector, RunSignature};
pub use sync::{GraphFormat, GraphStore, ModelSynchronizer, ProvenanceIndex, SqliteStore, SyncReport};
