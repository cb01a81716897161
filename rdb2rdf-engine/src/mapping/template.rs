//! Templates and term types
//!
//! A template is literal text interleaved with `{column}` placeholders, e.g.
//! `http://data.example.com/film/{film_id}`. Templates are parsed once when
//! the mapping document is built; resolving one against a row never fails on
//! syntax, only on a missing column.

use std::collections::BTreeMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rdb2rdf_tabular::Row;
use serde::{Deserialize, Serialize};

use crate::error::{R2rmlError, R2rmlResult};

/// Prefix label to namespace IRI, used to recognize absolute templates.
pub type Prefixes = BTreeMap<String, String>;

/// Characters kept verbatim by URL encoding: ASCII alphanumerics and `-._*`.
/// Space becomes `+`; everything else is percent-encoded.
const FORM_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'*');

/// Kind of term a template produces
///
/// `Auto` only exists in mapping input. It is replaced by a concrete kind
/// when the [`Template`] is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum TermType {
    /// Generate an IRI (default for subjects)
    #[default]
    Iri,
    /// Generate a blank node
    BlankNode,
    /// Generate a literal
    Literal,
    /// Decide from the template text at construction time
    Auto,
}

impl TermType {
    /// Parse term type from its R2RML IRI
    pub fn from_iri(iri: &str) -> Option<Self> {
        match iri {
            "http://www.w3.org/ns/r2rml#IRI" => Some(TermType::Iri),
            "http://www.w3.org/ns/r2rml#BlankNode" => Some(TermType::BlankNode),
            "http://www.w3.org/ns/r2rml#Literal" => Some(TermType::Literal),
            _ => None,
        }
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, TermType::Iri)
    }

    pub fn is_blank_node(&self) -> bool {
        matches!(self, TermType::BlankNode)
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, TermType::Literal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TermType::Iri => "iri",
            TermType::BlankNode => "blankNode",
            TermType::Literal => "literal",
            TermType::Auto => "auto",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Field(String),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    text: String,
    segments: Vec<Segment>,
    /// Concrete term type, never `Auto`.
    term_type: TermType,
    /// Term type as written in the mapping.
    declared: TermType,
    absolute: bool,
    namespace: Option<String>,
}

impl Template {
    /// Parse a template with no known prefixes.
    pub fn new(text: impl Into<String>, term_type: TermType) -> R2rmlResult<Self> {
        Self::with_prefixes(text, term_type, &Prefixes::new())
    }

    /// Parse a template, using `prefixes` to recognize absolute references.
    ///
    /// `Auto` resolves to IRI when the text looks absolute and to literal
    /// otherwise.
    pub fn with_prefixes(
        text: impl Into<String>,
        term_type: TermType,
        prefixes: &Prefixes,
    ) -> R2rmlResult<Self> {
        let text = text.into();
        let segments = parse_segments(&text)?;
        let absolute = looks_absolute(&text, prefixes);
        let resolved = match term_type {
            TermType::Auto if absolute => TermType::Iri,
            TermType::Auto => TermType::Literal,
            other => other,
        };

        Ok(Self {
            text,
            segments,
            term_type: resolved,
            declared: term_type,
            absolute,
            namespace: None,
        })
    }

    /// Set the namespace relative IRIs resolve against. Ignored for templates
    /// declared literal; an `Auto` template keeps it in case it becomes a
    /// subject.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        if self.declared != TermType::Literal {
            self.namespace = Some(namespace.into());
        }
        self
    }

    /// Re-check this template for use as a subject: `Auto` becomes IRI and a
    /// literal is rejected.
    pub(crate) fn into_subject(mut self) -> R2rmlResult<Self> {
        match self.declared {
            TermType::Literal => Err(R2rmlError::invalid_value(
                "termType",
                format!("subject template '{}' cannot produce a literal", self.text),
            )),
            TermType::Auto => {
                self.term_type = TermType::Iri;
                Ok(self)
            }
            _ => Ok(self),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn term_type(&self) -> TermType {
        self.term_type
    }

    pub fn declared_term_type(&self) -> TermType {
        self.declared
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// True when the text was recognized as an absolute reference.
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// An IRI template that can only produce relative IRIs: its leading text
    /// has no scheme, it is not absolute and no namespace is set. Templates
    /// starting with a placeholder are taken to carry their own scheme.
    pub fn is_unanchored(&self) -> bool {
        if !self.term_type.is_iri() || self.absolute || self.namespace.is_some() {
            return false;
        }
        match self.segments.first() {
            Some(Segment::Text(text)) => !has_scheme(text),
            _ => false,
        }
    }

    /// Column names referenced by placeholders, in order.
    pub fn fields(&self) -> impl Iterator<Item = &str> + '_ {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(name) => Some(name.as_str()),
            Segment::Text(_) => None,
        })
    }

    /// The column name when the whole template is one bare placeholder.
    pub fn single_field(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [Segment::Field(name)] => Some(name),
            _ => None,
        }
    }

    /// Resolve against a row.
    ///
    /// Returns `Ok(None)` when any referenced column is NULL: substitution is
    /// all-or-nothing. A column missing from the row is an error.
    pub fn resolve(&self, row: &Row<'_>, encode_urls: bool) -> R2rmlResult<Option<String>> {
        let mut value = String::with_capacity(self.text.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => value.push_str(text),
                Segment::Field(name) => {
                    let cell = row.get(name).ok_or_else(|| R2rmlError::ColumnNotFound {
                        column: name.clone(),
                        mapping: String::new(),
                    })?;
                    match cell.lexical() {
                        Some(v) => value.push_str(&v),
                        None => return Ok(None),
                    }
                }
            }
        }

        let value = self.finish(value, encode_urls);
        if self.term_type.is_iri() && self.namespace.is_none() && !self.absolute && !has_scheme(&value) {
            return Err(R2rmlError::invalid_value(
                "template",
                format!("'{}' produced the relative IRI '{value}' and no namespace is set", self.text),
            ));
        }
        Ok(Some(value))
    }

    fn finish(&self, value: String, encode_urls: bool) -> String {
        if !self.term_type.is_iri() {
            return value;
        }

        if self.absolute {
            return if encode_urls {
                encode_last_segment(&value)
            } else {
                value
            };
        }

        let tail = if encode_urls { encode(&value) } else { value };
        match &self.namespace {
            Some(ns) if ns.ends_with('/') || ns.ends_with('#') => format!("{ns}{tail}"),
            Some(ns) => format!("{ns}/{tail}"),
            None => tail,
        }
    }
}

/// Form-encode a whole value (`application/x-www-form-urlencoded` rules).
pub fn encode(value: &str) -> String {
    // an encoded `%` is `%25`, so every `%20` left is a space
    utf8_percent_encode(value, FORM_ENCODE)
        .to_string()
        .replace("%20", "+")
}

/// Percent-encode only the part after the last `/` or `#`.
fn encode_last_segment(value: &str) -> String {
    match value.rfind(['/', '#']) {
        Some(i) => format!("{}{}", &value[..=i], encode(&value[i + 1..])),
        None => encode(value),
    }
}

/// True when `text` starts with a URI scheme such as `http:` or `urn:`.
fn has_scheme(text: &str) -> bool {
    let Some((scheme, _)) = text.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Absolute-reference heuristic: the text mentions a known `prefix:`, a known
/// namespace IRI, or `http`.
fn looks_absolute(text: &str, prefixes: &Prefixes) -> bool {
    let known = prefixes.iter().any(|(prefix, ns)| {
        (!prefix.is_empty() && text.contains(&format!("{prefix}:")))
            || (!ns.is_empty() && text.contains(ns.as_str()))
    });
    known || text.contains("http")
}

fn parse_segments(text: &str) -> R2rmlResult<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.clone().next() {
                Some(next @ ('{' | '}' | '\\')) => {
                    chars.next();
                    literal.push(next);
                }
                _ => literal.push('\\'),
            },
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    match c {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => {
                            return Err(R2rmlError::InvalidTemplate(format!(
                                "nested '{{' in '{text}'"
                            )))
                        }
                        c => name.push(c),
                    }
                }
                if !closed {
                    return Err(R2rmlError::InvalidTemplate(format!(
                        "unterminated placeholder in '{text}'"
                    )));
                }

                let name = unquote(name.trim());
                if name.is_empty() {
                    return Err(R2rmlError::InvalidTemplate(format!(
                        "empty placeholder in '{text}'"
                    )));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field(name.to_string()));
            }
            '}' => {
                return Err(R2rmlError::InvalidTemplate(format!(
                    "unbalanced '}}' in '{text}'"
                )))
            }
            c => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Text(literal));
    }
    Ok(segments)
}

/// Strip surrounding double quotes from a column name (`"Name"` -> `Name`).
pub(crate) fn unquote(name: &str) -> &str {
    if name.len() >= 2 && name.starts_with('"') && name.ends_with('"') {
        &name[1..name.len() - 1]
    } else {
        name
    }
}
