//! Graph terms and statements
//!
//! [`Statement`] is the unit everything downstream works with: statement sets
//! are `BTreeSet<Statement>`, so output order is deterministic and set
//! differences are cheap. Conversion to and from `rio_api` model types lives
//! here too; those borrow from the owned terms and are only built at the
//! serialization boundary.

use std::fmt;
use std::fmt::Write as _;

use rio_api::model::{BlankNode, Literal, NamedNode, Subject, Term, Triple};

use crate::error::{R2rmlError, R2rmlResult};

/// A statement subject: IRI or blank node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Resource {
    Iri(String),
    BlankNode(String),
}

impl Resource {
    pub fn iri(iri: impl Into<String>) -> Self {
        Resource::Iri(iri.into())
    }

    pub fn blank_node(id: impl Into<String>) -> Self {
        Resource::BlankNode(id.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Resource::Iri(s) | Resource::BlankNode(s) => s,
        }
    }

    pub(crate) fn as_rio(&self) -> Subject<'_> {
        match self {
            Resource::Iri(iri) => Subject::NamedNode(NamedNode { iri }),
            Resource::BlankNode(id) => Subject::BlankNode(BlankNode { id }),
        }
    }
}

impl From<Resource> for RdfTerm {
    fn from(r: Resource) -> Self {
        match r {
            Resource::Iri(iri) => RdfTerm::Iri(iri),
            Resource::BlankNode(id) => RdfTerm::BlankNode(id),
        }
    }
}

/// Materialized graph term
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RdfTerm {
    /// An IRI
    Iri(String),
    /// A blank node with local identifier
    BlankNode(String),
    /// A literal with optional datatype or language (never both)
    Literal {
        value: String,
        datatype: Option<String>,
        language: Option<String>,
    },
}

impl RdfTerm {
    pub fn iri(iri: impl Into<String>) -> Self {
        RdfTerm::Iri(iri.into())
    }

    pub fn blank_node(id: impl Into<String>) -> Self {
        RdfTerm::BlankNode(id.into())
    }

    /// Plain literal
    pub fn string(value: impl Into<String>) -> Self {
        RdfTerm::Literal {
            value: value.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        RdfTerm::Literal {
            value: value.into(),
            datatype: Some(datatype.into()),
            language: None,
        }
    }

    pub fn lang_string(value: impl Into<String>, lang: impl Into<String>) -> Self {
        RdfTerm::Literal {
            value: value.into(),
            datatype: None,
            language: Some(lang.into()),
        }
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, RdfTerm::Iri(_))
    }

    pub fn is_blank_node(&self) -> bool {
        matches!(self, RdfTerm::BlankNode(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, RdfTerm::Literal { .. })
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            RdfTerm::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    /// The subject form of this term, `None` for literals.
    pub fn to_resource(&self) -> Option<Resource> {
        match self {
            RdfTerm::Iri(iri) => Some(Resource::Iri(iri.clone())),
            RdfTerm::BlankNode(id) => Some(Resource::BlankNode(id.clone())),
            RdfTerm::Literal { .. } => None,
        }
    }

    pub(crate) fn as_rio(&self) -> Term<'_> {
        match self {
            RdfTerm::Iri(iri) => Term::NamedNode(NamedNode { iri }),
            RdfTerm::BlankNode(id) => Term::BlankNode(BlankNode { id }),
            RdfTerm::Literal {
                value,
                language: Some(language),
                ..
            } => Term::Literal(Literal::LanguageTaggedString { value, language }),
            RdfTerm::Literal {
                value,
                datatype: Some(iri),
                ..
            } => Term::Literal(Literal::Typed {
                value,
                datatype: NamedNode { iri },
            }),
            RdfTerm::Literal { value, .. } => Term::Literal(Literal::Simple { value }),
        }
    }
}

/// A subject/predicate/object statement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Statement {
    pub subject: Resource,
    pub predicate: String,
    pub object: RdfTerm,
}

impl Statement {
    pub fn new(subject: Resource, predicate: impl Into<String>, object: RdfTerm) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
        }
    }

    pub(crate) fn as_triple(&self) -> Triple<'_> {
        Triple {
            subject: self.subject.as_rio(),
            predicate: NamedNode {
                iri: &self.predicate,
            },
            object: self.object.as_rio(),
        }
    }

    /// Convert a parsed triple. RDF-star triples are rejected.
    pub(crate) fn from_triple(t: &Triple<'_>) -> R2rmlResult<Self> {
        let subject = match t.subject {
            Subject::NamedNode(n) => Resource::Iri(n.iri.to_string()),
            Subject::BlankNode(b) => Resource::BlankNode(b.id.to_string()),
            _ => {
                return Err(R2rmlError::Serialization(format!(
                    "unsupported subject in {t}"
                )))
            }
        };
        let object = match t.object {
            Term::NamedNode(n) => RdfTerm::Iri(n.iri.to_string()),
            Term::BlankNode(b) => RdfTerm::BlankNode(b.id.to_string()),
            Term::Literal(Literal::Simple { value }) => RdfTerm::string(value),
            Term::Literal(Literal::LanguageTaggedString { value, language }) => {
                RdfTerm::lang_string(value, language)
            }
            Term::Literal(Literal::Typed { value, datatype }) => RdfTerm::typed(value, datatype.iri),
            _ => {
                return Err(R2rmlError::Serialization(format!(
                    "unsupported object in {t}"
                )))
            }
        };
        Ok(Statement {
            subject,
            predicate: t.predicate.iri.to_string(),
            object,
        })
    }
}

/// N-Triples form, without the trailing newline.
impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .", self.as_triple())
    }
}

/// Blank node label for a resolved template value.
///
/// ASCII alphanumerics are kept; every other byte becomes `_XX`. The mapping
/// is injective, so distinct values never share a node.
pub fn blank_node_label(value: &str) -> String {
    let mut label = String::with_capacity(value.len() + 1);
    label.push('b');
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() {
            label.push(byte as char);
        } else {
            let _ = write!(label, "_{byte:02X}");
        }
    }
    label
}
