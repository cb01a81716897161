//! Mapping model
//!
//! The in-memory form of a mapping document. Structures here are built once,
//! validated at construction, and read-only for the rest of a run.

mod definition;
mod document;
mod reference;
mod rule;
mod template;

pub use definition::{
    JoinDefinition, MappingDefinition, PredicateObjectDefinition, ReferenceDefinition,
    RuleDefinition, SubjectDefinition,
};
pub use document::MappingDocument;
pub use reference::{JoinCondition, Reference};
pub use rule::{MappingRule, ObjectSpec, PredicateObjectSpec, SubjectSpec, View};
pub use template::{encode, Prefixes, Template, TermType};
