//! Statement materialization
//!
//! Turns mapping rules plus source rows into graph statements:
//!
//! - [`term`]: owned terms and statements, and their `rio_api` conversions
//! - [`datatype`]: native SQL type to literal datatype lookup
//! - [`builder`]: per-row statement construction
//! - [`join`]: cross-mapping references and the produced-subjects registry

pub mod builder;
pub mod datatype;
pub mod join;
pub mod term;

pub use builder::{RulePlan, TermBuilder};
pub use datatype::{DatatypeMapper, XsdDatatype};
pub use join::{derive_parent_query, JoinResolver, ProducedSubjects, SubjectList};
pub use term::{blank_node_label, RdfTerm, Resource, Statement};
