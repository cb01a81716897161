//! Provenance side-table
//!
//! Records which mapping produced each statement, so an incremental run can
//! drop exactly the statements of regenerated or removed mappings. Persisted
//! as N-Quads where the graph name encodes the mapping id.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use rio_api::formatter::QuadsFormatter;
use rio_api::model::{GraphName, NamedNode, Quad, Triple};
use rio_api::parser::QuadsParser;
use rio_turtle::{NQuadsFormatter, NQuadsParser};

use super::format::write_replacing;
use crate::error::{R2rmlError, R2rmlResult};
use crate::materialize::Statement;
use crate::vocab::provenance::{MAPPING_GRAPH_PREFIX, SEED_GRAPH};

/// Index key of seed graph statements. Mapping ids are never empty.
pub const SEED_ID: &str = "";

/// Mapping id → the statements it produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvenanceIndex {
    by_mapping: BTreeMap<String, BTreeSet<Statement>>,
}

impl ProvenanceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the statements recorded for `mapping_id`.
    pub fn insert(&mut self, mapping_id: impl Into<String>, statements: BTreeSet<Statement>) {
        self.by_mapping.insert(mapping_id.into(), statements);
    }

    pub fn remove(&mut self, mapping_id: &str) -> Option<BTreeSet<Statement>> {
        self.by_mapping.remove(mapping_id)
    }

    pub fn get(&self, mapping_id: &str) -> Option<&BTreeSet<Statement>> {
        self.by_mapping.get(mapping_id)
    }

    pub fn statement_count(&self, mapping_id: &str) -> usize {
        self.by_mapping.get(mapping_id).map_or(0, BTreeSet::len)
    }

    pub fn mapping_ids(&self) -> impl Iterator<Item = &str> {
        self.by_mapping.keys().map(String::as_str)
    }

    pub fn contains(&self, mapping_id: &str) -> bool {
        self.by_mapping.contains_key(mapping_id)
    }

    pub fn is_empty(&self) -> bool {
        self.by_mapping.values().all(BTreeSet::is_empty)
    }

    /// Distinct statements across all mappings.
    pub fn union(&self) -> BTreeSet<Statement> {
        self.by_mapping.values().flatten().cloned().collect()
    }

    /// Keep only mappings for which `keep` holds; returns the dropped ids.
    pub fn retain_mappings(&mut self, mut keep: impl FnMut(&str) -> bool) -> Vec<String> {
        let dropped: Vec<String> = self
            .by_mapping
            .keys()
            .filter(|id| !keep(id.as_str()))
            .cloned()
            .collect();
        for id in &dropped {
            self.by_mapping.remove(id);
        }
        dropped
    }

    /// Load from an N-Quads file. Quads outside a mapping graph are rejected.
    pub fn load(path: &Path) -> R2rmlResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut index = ProvenanceIndex::new();
        NQuadsParser::new(reader).parse_all(&mut |q: Quad<'_>| -> R2rmlResult<()> {
            let mapping_id = match q.graph_name {
                Some(GraphName::NamedNode(n)) => mapping_id_from_graph(n.iri),
                _ => None,
            }
            .ok_or_else(|| {
                R2rmlError::Serialization(format!("statement without mapping graph: {q}"))
            })?;
            let statement = Statement::from_triple(&Triple {
                subject: q.subject,
                predicate: q.predicate,
                object: q.object,
            })?;
            index
                .by_mapping
                .entry(mapping_id)
                .or_default()
                .insert(statement);
            Ok(())
        })?;
        Ok(index)
    }

    /// Write as N-Quads, returning the file size.
    pub fn save(&self, path: &Path) -> R2rmlResult<u64> {
        write_replacing(path, |out| {
            let mut formatter = NQuadsFormatter::new(out);
            for (mapping_id, statements) in &self.by_mapping {
                let graph = graph_name(mapping_id);
                for s in statements {
                    let t = s.as_triple();
                    formatter.format(&Quad {
                        subject: t.subject,
                        predicate: t.predicate,
                        object: t.object,
                        graph_name: Some(GraphName::NamedNode(NamedNode { iri: &graph })),
                    })?;
                }
            }
            formatter.finish().map(|_| ())
        })
    }
}

/// Graph name tagging statements of `mapping_id`.
pub fn graph_name(mapping_id: &str) -> String {
    if mapping_id == SEED_ID {
        return SEED_GRAPH.to_string();
    }
    format!(
        "{MAPPING_GRAPH_PREFIX}{}",
        utf8_percent_encode(mapping_id, NON_ALPHANUMERIC)
    )
}

/// Mapping id encoded in a graph name, if it is one of ours.
pub fn mapping_id_from_graph(iri: &str) -> Option<String> {
    if iri == SEED_GRAPH {
        return Some(SEED_ID.to_string());
    }
    let encoded = iri.strip_prefix(MAPPING_GRAPH_PREFIX)?;
    percent_decode_str(encoded)
        .decode_utf8()
        .ok()
        .map(|id| id.into_owned())
}
