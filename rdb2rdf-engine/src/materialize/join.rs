//! Cross-mapping join resolution
//!
//! Objects of a [`Reference`] are subjects of the parent mapping. With join
//! conditions, the parent's query is narrowed to the rows matching the current
//! child row and re-run; without, the subjects the parent already produced in
//! this run are reused.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use rdb2rdf_tabular::{Row, SqlSource, Value};
use regex::Regex;
use tracing::trace;

use super::builder::subject_resource;
use super::term::{RdfTerm, Resource};
use crate::error::{R2rmlError, R2rmlResult};
use crate::mapping::{MappingDocument, MappingRule, Reference};

/// Subjects produced by one mapping, in first-seen order, without repeats.
#[derive(Debug, Clone, Default)]
pub struct SubjectList {
    order: Vec<Resource>,
    seen: HashSet<Resource>,
}

impl SubjectList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a subject. Returns false if it was already present.
    pub fn push(&mut self, subject: &Resource) -> bool {
        if self.seen.contains(subject) {
            return false;
        }
        self.seen.insert(subject.clone());
        self.order.push(subject.clone());
        true
    }

    /// Keep only the subjects matching `keep`, preserving order.
    pub fn retain(&mut self, mut keep: impl FnMut(&Resource) -> bool) {
        let order = std::mem::take(&mut self.order);
        self.seen.clear();
        for subject in order {
            if keep(&subject) {
                self.seen.insert(subject.clone());
                self.order.push(subject);
            }
        }
    }

    pub fn contains(&self, subject: &Resource) -> bool {
        self.seen.contains(subject)
    }

    pub fn as_slice(&self) -> &[Resource] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl FromIterator<Resource> for SubjectList {
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        let mut list = SubjectList::new();
        for r in iter {
            list.push(&r);
        }
        list
    }
}

/// Subjects of every mapping that finished in the current run
///
/// Each entry is written once, when its mapping completes (or is recovered
/// from prior state), and only read afterwards.
#[derive(Debug, Default)]
pub struct ProducedSubjects {
    sealed: HashMap<String, SubjectList>,
}

impl ProducedSubjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seal(&mut self, mapping_id: impl Into<String>, subjects: SubjectList) {
        self.sealed.insert(mapping_id.into(), subjects);
    }

    pub fn is_sealed(&self, mapping_id: &str) -> bool {
        self.sealed.contains_key(mapping_id)
    }

    pub fn get(&self, mapping_id: &str) -> Option<&SubjectList> {
        self.sealed.get(mapping_id)
    }
}

/// Resolves reference objects for one child row.
pub struct JoinResolver<'a, S: SqlSource + ?Sized> {
    document: &'a MappingDocument,
    source: &'a S,
    encode_urls: bool,
}

impl<'a, S: SqlSource + ?Sized> JoinResolver<'a, S> {
    pub fn new(document: &'a MappingDocument, source: &'a S, encode_urls: bool) -> Self {
        Self {
            document,
            source,
            encode_urls,
        }
    }

    /// Check that `reference` can be resolved at all: the parent exists and,
    /// with join conditions, its view reads a single table.
    pub fn check(&self, child: &MappingRule, reference: &Reference) -> R2rmlResult<()> {
        let parent = self
            .document
            .get(&reference.parent)
            .ok_or_else(|| R2rmlError::UnknownMapping(reference.parent.clone()))?;
        if reference.has_conditions() {
            single_table(parent)?;
        }
        trace!(child = child.id(), parent = parent.id(), "reference checked");
        Ok(())
    }

    /// Objects for `reference` on the current `row` of `child`.
    ///
    /// `own` is the child's subject list so far, used when a mapping reuses
    /// its own subjects.
    pub fn resolve(
        &self,
        child: &MappingRule,
        reference: &Reference,
        row: &Row<'_>,
        produced: &ProducedSubjects,
        own: &SubjectList,
    ) -> R2rmlResult<Vec<RdfTerm>> {
        let parent = self
            .document
            .get(&reference.parent)
            .ok_or_else(|| R2rmlError::UnknownMapping(reference.parent.clone()))?;
        let self_join = parent.id() == child.id();

        if !reference.has_conditions() {
            let subjects = if self_join {
                own
            } else {
                produced
                    .get(parent.id())
                    .ok_or_else(|| ordering_violation(child, parent))?
            };
            return Ok(subjects
                .as_slice()
                .iter()
                .cloned()
                .map(RdfTerm::from)
                .collect());
        }

        if !self_join && !produced.is_sealed(parent.id()) {
            return Err(ordering_violation(child, parent));
        }
        single_table(parent)?;

        let mut bindings = Vec::with_capacity(reference.join_conditions.len());
        for jc in &reference.join_conditions {
            let value = row
                .get(&jc.child_column)
                .ok_or_else(|| R2rmlError::ColumnNotFound {
                    column: jc.child_column.clone(),
                    mapping: child.id().to_string(),
                })?;
            if value.is_null() {
                return Ok(Vec::new());
            }
            bindings.push((jc.parent_column.as_str(), value));
        }

        let query = derive_parent_query(parent.view().sql(), &bindings);
        trace!(child = child.id(), parent = parent.id(), %query, "join query");

        let template = parent.subject().template();
        let mut cursor = self.source.execute(&query)?;
        let mut objects = Vec::new();
        while cursor.next() {
            let parent_row = cursor.row()?;
            let resolved = template
                .resolve(&parent_row, self.encode_urls)
                .map_err(|e| e.in_mapping(parent.id()))?;
            if let Some(value) = resolved {
                objects.push(subject_resource(template, value).into());
            }
        }
        Ok(objects)
    }
}

fn single_table(parent: &MappingRule) -> R2rmlResult<()> {
    let tables = parent.view().tables().len();
    if tables != 1 {
        return Err(R2rmlError::AmbiguousJoinParent {
            parent: parent.id().to_string(),
            tables,
        });
    }
    Ok(())
}

fn ordering_violation(child: &MappingRule, parent: &MappingRule) -> R2rmlError {
    R2rmlError::OrderingViolation {
        child: child.id().to_string(),
        parent: parent.id().to_string(),
    }
}

/// Narrow `parent_query` to rows where each column equals its bound value.
///
/// The condition is merged into an existing top-level `WHERE` and placed
/// before any top-level `GROUP BY`, `HAVING`, `ORDER BY` or `LIMIT`.
pub fn derive_parent_query(parent_query: &str, bindings: &[(&str, &Value)]) -> String {
    let query = parent_query.trim().trim_end_matches(';').trim_end();
    let condition = bindings
        .iter()
        .map(|(column, value)| format!("{column} = {}", sql_literal(value)))
        .collect::<Vec<_>>()
        .join(" AND ");

    let clauses = Clauses::scan(query);
    let split = clauses.tail.unwrap_or(query.len());
    let (head, tail) = query.split_at(split);
    let head = head.trim_end();
    let tail = tail.trim_start();
    let sep = if tail.is_empty() { "" } else { " " };

    match clauses.where_at {
        Some(at) if at < split => {
            let existing = head[at + "WHERE".len()..].trim();
            let select = head[..at].trim_end();
            format!("{select} WHERE ({existing}) AND {condition}{sep}{tail}")
        }
        _ => format!("{head} WHERE {condition}{sep}{tail}"),
    }
}

/// Byte offsets of top-level clause keywords.
struct Clauses {
    where_at: Option<usize>,
    /// First clause that must stay after `WHERE`
    tail: Option<usize>,
}

impl Clauses {
    fn scan(query: &str) -> Self {
        static KEYWORDS: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?i)\b(where|group\s+by|having|order\s+by|limit)\b").expect("valid regex")
        });

        let top_level = top_level_mask(query);
        let mut clauses = Clauses {
            where_at: None,
            tail: None,
        };
        for m in KEYWORDS.find_iter(query) {
            if !top_level[m.start()] {
                continue;
            }
            if m.as_str().eq_ignore_ascii_case("where") {
                clauses.where_at.get_or_insert(m.start());
            } else if clauses.tail.is_none() {
                clauses.tail = Some(m.start());
            }
        }
        clauses
    }
}

/// For each byte: true when outside parentheses, quotes and identifiers.
fn top_level_mask(query: &str) -> Vec<bool> {
    let mut mask = vec![false; query.len() + 1];
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in query.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            _ => {}
        }
        mask[i] = quote.is_none() && depth == 0 && c != '\'' && c != '"';
    }
    mask
}

/// SQL literal for a bound join value. Numbers stay bare, text is quoted
/// with embedded quotes doubled.
fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Real(_) => value.lexical().unwrap_or_default(),
        Value::Boolean(b) => String::from(if *b { "1" } else { "0" }),
        Value::Blob(bytes) => format!("X'{}'", hex::encode(bytes)),
        Value::Text(_) | Value::Date(_) | Value::Time(_) | Value::Timestamp(_) => {
            let text = value.lexical().unwrap_or_default();
            format!("'{}'", text.replace('\'', "''"))
        }
    }
}
