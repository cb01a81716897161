//! Serializable mapping definitions
//!
//! [`MappingDefinition`] is the on-disk shape of a mapping document (JSON, or
//! TOML through the CLI). [`MappingDocument::from_definition`] validates it and
//! builds the in-memory model. Compact IRIs (`ex:Person`) in predicates,
//! classes and datatypes are expanded against the declared prefixes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{
    JoinCondition, MappingDocument, MappingRule, ObjectSpec, PredicateObjectSpec, Prefixes,
    Reference, SubjectSpec, Template, TermType, View,
};
use crate::error::{R2rmlError, R2rmlResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MappingDefinition {
    /// Base namespace for relative IRI templates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Prefix label → namespace IRI
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub prefixes: BTreeMap<String, String>,
    #[serde(default)]
    pub mappings: Vec<RuleDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RuleDefinition {
    pub id: String,
    /// SQL query; exclusive with `table`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Explicit source tables, overriding detection from the query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<String>>,
    pub subject: SubjectDefinition,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub predicate_objects: Vec<PredicateObjectDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubjectDefinition {
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_type: Option<TermType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PredicateObjectDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub predicates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Term type of a template object; `auto` when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_type: Option<TermType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<ReferenceDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    /// Language tag or language template (`en`, `{lang}`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReferenceDefinition {
    pub parent: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub join: Vec<JoinDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinDefinition {
    pub child: String,
    pub parent: String,
}

impl MappingDefinition {
    pub fn from_json(json: &str) -> R2rmlResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| R2rmlError::Config(format!("invalid mapping definition: {e}")))
    }
}

impl MappingDocument {
    /// Validate a definition and build the mapping model.
    pub fn from_definition(def: &MappingDefinition) -> R2rmlResult<Self> {
        let prefixes: Prefixes = def.prefixes.clone();
        let rules = def
            .mappings
            .iter()
            .map(|rule| build_rule(rule, def.namespace.as_deref(), &prefixes))
            .collect::<R2rmlResult<Vec<_>>>()?;
        MappingDocument::with_prefixes(rules, prefixes)
    }
}

fn build_rule(
    def: &RuleDefinition,
    namespace: Option<&str>,
    prefixes: &Prefixes,
) -> R2rmlResult<MappingRule> {
    let view = match (&def.query, &def.table) {
        (Some(query), None) => View::query(query.as_str()),
        (None, Some(table)) => View::table(table.as_str()),
        (Some(_), Some(_)) => {
            return Err(R2rmlError::invalid_value(
                "query",
                format!("mapping {} declares both a query and a table", def.id),
            ))
        }
        (None, None) => {
            return Err(R2rmlError::invalid_value(
                "query",
                format!("mapping {} declares neither a query nor a table", def.id),
            ))
        }
    };
    let view = match &def.tables {
        Some(tables) => view.with_tables(tables.clone()),
        None => view,
    };

    let subject_type = match def.subject.term_type.unwrap_or_default() {
        TermType::Auto => TermType::Iri,
        declared => declared,
    };
    let template = Template::with_prefixes(def.subject.template.as_str(), subject_type, prefixes)?;
    let template = with_namespace(template, namespace);
    let subject = def
        .subject
        .classes
        .iter()
        .try_fold(SubjectSpec::new(template)?, |spec, class| {
            Ok::<_, R2rmlError>(spec.with_class(expand(class, prefixes)?))
        })?;

    let mut rule = MappingRule::new(def.id.as_str(), view, subject);
    for pom in &def.predicate_objects {
        rule = rule.with_predicate_object(build_predicate_object(pom, &def.id, namespace, prefixes)?);
    }
    Ok(rule)
}

fn build_predicate_object(
    def: &PredicateObjectDefinition,
    mapping: &str,
    namespace: Option<&str>,
    prefixes: &Prefixes,
) -> R2rmlResult<PredicateObjectSpec> {
    let mut predicates = Vec::with_capacity(def.predicates.len() + 1);
    for p in def.predicate.iter().chain(def.predicates.iter()) {
        predicates.push(expand(p, prefixes)?);
    }
    let mut predicates = predicates.into_iter();
    let Some(first) = predicates.next() else {
        return Err(R2rmlError::invalid_value(
            "predicate",
            format!("mapping {mapping} has a predicate-object entry without predicates"),
        ));
    };

    let object = match (&def.template, &def.column, &def.reference) {
        (Some(text), None, None) => {
            let t = Template::with_prefixes(
                text.as_str(),
                def.term_type.unwrap_or(TermType::Auto),
                prefixes,
            )?;
            ObjectSpec::Template(with_namespace(t, namespace))
        }
        (None, Some(column), None) => ObjectSpec::Column(column.clone()),
        (None, None, Some(r)) => ObjectSpec::Reference(Reference::with_conditions(
            r.parent.as_str(),
            r.join
                .iter()
                .map(|j| JoinCondition::new(j.child.as_str(), j.parent.as_str()))
                .collect(),
        )),
        (None, None, None) => ObjectSpec::None,
        _ => {
            return Err(R2rmlError::invalid_value(
                "objectMap",
                format!("mapping {mapping}: template, column and reference are exclusive"),
            ))
        }
    };

    let mut spec = predicates.fold(PredicateObjectSpec::new(first, object), |spec, p| {
        spec.with_predicate(p)
    });
    if let Some(dt) = &def.datatype {
        spec = spec.with_datatype(expand(dt, prefixes)?);
    }
    if let Some(lang) = &def.language {
        spec = spec.with_language(Template::new(lang.as_str(), TermType::Literal)?);
    }
    Ok(spec)
}

fn with_namespace(template: Template, namespace: Option<&str>) -> Template {
    match namespace {
        Some(ns) => template.with_namespace(ns),
        None => template,
    }
}

/// Expand `prefix:local` against the declared prefixes. Full IRIs pass through.
fn expand(value: &str, prefixes: &Prefixes) -> R2rmlResult<String> {
    if value.trim().is_empty() {
        return Err(R2rmlError::invalid_value("iri", "empty IRI"));
    }
    if let Some((prefix, local)) = value.split_once(':') {
        if !local.starts_with("//") {
            if let Some(ns) = prefixes.get(prefix) {
                return Ok(format!("{ns}{local}"));
            }
        }
    }
    Ok(value.to_string())
}
