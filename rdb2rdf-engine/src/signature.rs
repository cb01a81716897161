//! Change detection
//!
//! A [`RunSignature`] fingerprints one mapping with three SHA-256 hashes: its
//! query text, its definition, and the full content of its query result. A
//! mapping whose three hashes match the previous run (and whose previous
//! output is still on record) does not need to be regenerated.

use rdb2rdf_tabular::RowCursor;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use sha2::{Digest, Sha256};

use crate::error::R2rmlResult;
use crate::mapping::{MappingRule, ObjectSpec, Template};
use crate::runlog::PreviousState;

const CELL_SEP: u8 = 0x1f;
const ROW_SEP: u8 = 0x1e;

/// Three-hash fingerprint of one mapping, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunSignature {
    pub query_hash: String,
    pub mapping_hash: String,
    pub results_hash: String,
}

pub struct ChangeDetector;

impl ChangeDetector {
    /// Signature of `rule` over an opened cursor of its query.
    ///
    /// The cursor is rewound before and after hashing so the caller can
    /// stream it again.
    pub fn signature(rule: &MappingRule, cursor: &mut RowCursor) -> R2rmlResult<RunSignature> {
        Ok(RunSignature {
            query_hash: Self::query_hash(rule.view().sql()),
            mapping_hash: Self::mapping_hash(rule),
            results_hash: Self::results_hash(cursor)?,
        })
    }

    /// Hash of the query text with whitespace runs collapsed.
    pub fn query_hash(query: &str) -> String {
        let normalized = query.split_whitespace().collect::<Vec<_>>().join(" ");
        sha256_hex(normalized.as_bytes())
    }

    /// Hash of the semantically relevant parts of a rule's definition.
    pub fn mapping_hash(rule: &MappingRule) -> String {
        sha256_hex(canonical_definition(rule).to_string().as_bytes())
    }

    /// Hash over every cell, in row and column order.
    pub fn results_hash(cursor: &mut RowCursor) -> R2rmlResult<String> {
        let mut hasher = Sha256::new();
        cursor.before_first();
        while cursor.next() {
            let row = cursor.row()?;
            for value in row.values() {
                hasher.update(value.type_tag().as_bytes());
                hasher.update([CELL_SEP]);
                if let Some(lexical) = value.lexical() {
                    hasher.update(lexical.as_bytes());
                }
                hasher.update([CELL_SEP]);
            }
            hasher.update([ROW_SEP]);
        }
        cursor.before_first();
        Ok(hex::encode(hasher.finalize()))
    }

    /// True unless the previous run recorded the same signature and still
    /// holds statements for this mapping.
    pub fn should_execute(mapping_id: &str, current: &RunSignature, previous: &PreviousState) -> bool {
        let Some(entry) = previous.entry(mapping_id) else {
            return true;
        };
        if entry.signature() != *current {
            return true;
        }
        previous.statement_count(mapping_id) == 0
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn template_json(t: &Template) -> Json {
    json!({
        "text": t.text(),
        "termType": t.term_type().as_str(),
        "namespace": t.namespace(),
    })
}

/// Stable JSON form of a rule. Object keys are sorted by `serde_json`.
fn canonical_definition(rule: &MappingRule) -> Json {
    let poms: Vec<Json> = rule
        .predicate_objects()
        .iter()
        .map(|pom| {
            let object = match pom.object() {
                ObjectSpec::Template(t) => template_json(t),
                ObjectSpec::Column(c) => json!({ "column": c }),
                ObjectSpec::Reference(r) => json!({
                    "parent": r.parent,
                    "join": r
                        .join_conditions
                        .iter()
                        .map(|jc| [jc.child_column.as_str(), jc.parent_column.as_str()])
                        .collect::<Vec<_>>(),
                }),
                ObjectSpec::None => Json::Null,
            };
            json!({
                "predicates": pom.predicates(),
                "kind": pom.object().kind(),
                "object": object,
                "datatype": pom.datatype(),
                "language": pom.language().map(template_json),
            })
        })
        .collect();

    json!({
        "query": rule.view().sql(),
        "tables": rule.view().tables(),
        "subject": template_json(rule.subject().template()),
        "classes": rule.subject().classes(),
        "predicateObjects": poms,
    })
}
