//! Statement construction
//!
//! [`TermBuilder::prepare`] checks a rule against the schema of its opened
//! cursor (missing columns, unmapped datatypes) before any row is read.
//! [`TermBuilder::build_statements`] then turns one row into the statements
//! of one subject.

use std::collections::BTreeSet;

use rdb2rdf_tabular::{ResultSchema, Row, SqlSource};
use tracing::debug;

use super::datatype::DatatypeMapper;
use super::join::{JoinResolver, ProducedSubjects, SubjectList};
use super::term::{blank_node_label, RdfTerm, Resource, Statement};
use crate::config::EngineConfig;
use crate::error::{R2rmlError, R2rmlResult};
use crate::mapping::{MappingDocument, MappingRule, ObjectSpec, PredicateObjectSpec, Template, TermType};
use crate::vocab::rdf;

/// A rule checked against its result schema.
#[derive(Debug)]
pub struct RulePlan<'r> {
    rule: &'r MappingRule,
    /// Literal datatype per predicate-object specification
    datatypes: Vec<Option<String>>,
}

impl<'r> RulePlan<'r> {
    pub fn rule(&self) -> &'r MappingRule {
        self.rule
    }

    /// Datatype IRI literals of the `index`th predicate-object specification carry.
    pub fn datatype(&self, index: usize) -> Option<&str> {
        self.datatypes.get(index).and_then(|d| d.as_deref())
    }
}

/// Builds statements for mapping rules, row by row.
pub struct TermBuilder<'a, S: SqlSource + ?Sized> {
    joins: JoinResolver<'a, S>,
    encode_urls: bool,
    verbose: bool,
}

impl<'a, S: SqlSource + ?Sized> TermBuilder<'a, S> {
    pub fn new(document: &'a MappingDocument, source: &'a S, config: &EngineConfig) -> Self {
        Self {
            joins: JoinResolver::new(document, source, config.encode_urls()),
            encode_urls: config.encode_urls(),
            verbose: config.verbose(),
        }
    }

    /// Check every column the rule reads and fix literal datatypes.
    pub fn prepare<'r>(
        &self,
        rule: &'r MappingRule,
        schema: &ResultSchema,
    ) -> R2rmlResult<RulePlan<'r>> {
        require_template(rule, rule.subject().template(), schema)?;

        let mut datatypes = Vec::with_capacity(rule.predicate_objects().len());
        for pom in rule.predicate_objects() {
            if let Some(language) = pom.language() {
                require_template(rule, language, schema)?;
            }
            let datatype = match pom.object() {
                ObjectSpec::Template(t) => {
                    require_template(rule, t, schema)?;
                    if t.term_type().is_literal() {
                        literal_datatype(pom, t.single_field(), schema)?
                    } else {
                        None
                    }
                }
                ObjectSpec::Column(column) => {
                    require_column(rule, column, schema)?;
                    literal_datatype(pom, Some(column), schema)?
                }
                ObjectSpec::Reference(r) => {
                    self.joins.check(rule, r)?;
                    for column in r.child_columns() {
                        require_column(rule, column, schema)?;
                    }
                    None
                }
                ObjectSpec::None => None,
            };
            datatypes.push(datatype);
        }

        Ok(RulePlan { rule, datatypes })
    }

    /// Statements for the current row, inserted into `sink`.
    ///
    /// Returns how many were new to the sink. A NULL in the subject template
    /// yields nothing. A resolved subject is recorded in `subjects` after its
    /// objects, so a rule reusing its own subjects sees earlier rows only.
    pub fn build_statements(
        &self,
        plan: &RulePlan<'_>,
        row: &Row<'_>,
        produced: &ProducedSubjects,
        subjects: &mut SubjectList,
        sink: &mut BTreeSet<Statement>,
    ) -> R2rmlResult<usize> {
        let rule = plan.rule;
        let template = rule.subject().template();
        let resolved = template
            .resolve(row, self.encode_urls)
            .map_err(|e| e.in_mapping(rule.id()))?;
        let Some(value) = resolved else {
            return Ok(0);
        };
        let subject = subject_resource(template, value);

        let mut emitted = Vec::new();
        for class in rule.subject().classes() {
            emitted.push(Statement::new(
                subject.clone(),
                rdf::TYPE,
                RdfTerm::iri(class.as_str()),
            ));
        }
        for (idx, pom) in rule.predicate_objects().iter().enumerate() {
            let objects = self.objects(plan, pom, plan.datatype(idx), row, produced, subjects)?;
            for object in objects {
                for predicate in pom.predicates() {
                    emitted.push(Statement::new(
                        subject.clone(),
                        predicate.as_str(),
                        object.clone(),
                    ));
                }
            }
        }

        subjects.push(&subject);
        let mut added = 0;
        for statement in emitted {
            if self.verbose {
                debug!(mapping = rule.id(), %statement, "statement");
            }
            if sink.insert(statement) {
                added += 1;
            }
        }
        Ok(added)
    }

    fn objects(
        &self,
        plan: &RulePlan<'_>,
        pom: &PredicateObjectSpec,
        datatype: Option<&str>,
        row: &Row<'_>,
        produced: &ProducedSubjects,
        own: &SubjectList,
    ) -> R2rmlResult<Vec<RdfTerm>> {
        let rule = plan.rule;
        match pom.object() {
            ObjectSpec::None => Ok(Vec::new()),
            ObjectSpec::Reference(reference) => {
                self.joins.resolve(rule, reference, row, produced, own)
            }
            ObjectSpec::Template(t) => {
                let resolved = t
                    .resolve(row, self.encode_urls)
                    .map_err(|e| e.in_mapping(rule.id()))?;
                let Some(value) = resolved else {
                    return Ok(Vec::new());
                };
                let term = match t.term_type() {
                    TermType::Iri => RdfTerm::Iri(value),
                    TermType::BlankNode => RdfTerm::BlankNode(blank_node_label(&value)),
                    TermType::Literal | TermType::Auto => {
                        self.literal(rule, pom, value, datatype, row)?
                    }
                };
                Ok(vec![term])
            }
            ObjectSpec::Column(column) => {
                let cell = row.get(column).ok_or_else(|| R2rmlError::ColumnNotFound {
                    column: column.clone(),
                    mapping: rule.id().to_string(),
                })?;
                match cell.lexical() {
                    Some(value) => Ok(vec![self.literal(rule, pom, value, datatype, row)?]),
                    None => Ok(Vec::new()),
                }
            }
        }
    }

    /// Language tag first; a NULL language falls back to a plain literal.
    fn literal(
        &self,
        rule: &MappingRule,
        pom: &PredicateObjectSpec,
        value: String,
        datatype: Option<&str>,
        row: &Row<'_>,
    ) -> R2rmlResult<RdfTerm> {
        if let Some(language) = pom.language() {
            let tag = language
                .resolve(row, false)
                .map_err(|e| e.in_mapping(rule.id()))?;
            return Ok(match tag {
                Some(tag) => RdfTerm::lang_string(value, tag),
                None => RdfTerm::string(value),
            });
        }
        Ok(match datatype {
            Some(dt) => RdfTerm::typed(value, dt),
            None => RdfTerm::string(value),
        })
    }
}

/// Subject term for a resolved subject template value.
pub(crate) fn subject_resource(template: &Template, value: String) -> Resource {
    if template.term_type().is_blank_node() {
        Resource::BlankNode(blank_node_label(&value))
    } else {
        Resource::Iri(value)
    }
}

/// Declared datatype, else the mapped native type of the single source
/// column, else none. Language-tagged literals never carry a datatype.
fn literal_datatype(
    pom: &PredicateObjectSpec,
    column: Option<&str>,
    schema: &ResultSchema,
) -> R2rmlResult<Option<String>> {
    if pom.language().is_some() {
        return Ok(None);
    }
    if let Some(declared) = pom.datatype() {
        return Ok(Some(declared.to_string()));
    }
    let Some(type_name) = column.and_then(|c| schema.type_name(c)) else {
        return Ok(None);
    };
    Ok(DatatypeMapper::from_native_type(type_name)?.map(|dt| dt.iri().to_string()))
}

fn require_template(rule: &MappingRule, template: &Template, schema: &ResultSchema) -> R2rmlResult<()> {
    template
        .fields()
        .try_for_each(|field| require_column(rule, field, schema))
}

fn require_column(rule: &MappingRule, column: &str, schema: &ResultSchema) -> R2rmlResult<()> {
    match schema.index_of(column) {
        Some(_) => Ok(()),
        None => Err(R2rmlError::ColumnNotFound {
            column: column.to_string(),
            mapping: rule.id().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{Reference, SubjectSpec, View};
    use crate::vocab::xsd;
    use rdb2rdf_tabular::{ColumnInfo, RowCursor, Value};
    use std::sync::Arc;

    struct NoSource;

    impl SqlSource for NoSource {
        fn execute(&self, query: &str) -> rdb2rdf_tabular::Result<RowCursor> {
            Err(rdb2rdf_tabular::TabularError::Query {
                query: query.to_string(),
                message: "no source in this test".into(),
            })
        }
    }

    fn cursor(columns: &[(&str, &str)], rows: Vec<Vec<Value>>) -> RowCursor {
        let schema = ResultSchema::new(
            columns
                .iter()
                .map(|(name, ty)| ColumnInfo::new(*name, *ty))
                .collect(),
        );
        RowCursor::new(Arc::new(schema), rows).unwrap()
    }

    fn person_rule() -> MappingRule {
        let subject = SubjectSpec::new(
            Template::new("person/{id}", TermType::Iri)
                .unwrap()
                .with_namespace("http://example.com"),
        )
        .unwrap()
        .with_class("http://example.com/Person");
        MappingRule::new("#People", View::table("person"), subject)
            .with_predicate_object(PredicateObjectSpec::new(
                "http://example.com/name",
                ObjectSpec::Column("name".into()),
            ))
            .with_predicate_object(PredicateObjectSpec::new(
                "http://example.com/born",
                ObjectSpec::Column("born".into()),
            ))
    }

    fn build(rule: &MappingRule, mut rows: RowCursor) -> R2rmlResult<BTreeSet<Statement>> {
        let doc = MappingDocument::new(vec![rule.clone()])?;
        let config = EngineConfig::to_file("/tmp/out.nt");
        let builder = TermBuilder::new(&doc, &NoSource, &config);
        let rule = doc.get(rule.id()).unwrap();
        let plan = builder.prepare(rule, rows.schema())?;
        let produced = ProducedSubjects::new();
        let mut subjects = SubjectList::new();
        let mut sink = BTreeSet::new();
        while rows.next() {
            builder.build_statements(&plan, &rows.row()?, &produced, &mut subjects, &mut sink)?;
        }
        Ok(sink)
    }

    #[test]
    fn test_class_and_typed_column_statements() {
        let rows = cursor(
            &[("id", "INTEGER"), ("name", "VARCHAR(20)"), ("born", "DATE")],
            vec![vec![
                Value::Integer(1),
                Value::Text("Ann".into()),
                Value::Text("2024-01-01".into()),
            ]],
        );
        let stmts = build(&person_rule(), rows).unwrap();
        let subject = Resource::iri("http://example.com/person/1");
        assert!(stmts.contains(&Statement::new(
            subject.clone(),
            rdf::TYPE,
            RdfTerm::iri("http://example.com/Person")
        )));
        assert!(stmts.contains(&Statement::new(
            subject.clone(),
            "http://example.com/name",
            RdfTerm::string("Ann")
        )));
        assert!(stmts.contains(&Statement::new(
            subject,
            "http://example.com/born",
            RdfTerm::typed("2024-01-01", xsd::DATE)
        )));
        assert_eq!(stmts.len(), 3);
    }

    #[test]
    fn test_null_subject_and_null_object() {
        let rows = cursor(
            &[("id", "INTEGER"), ("name", "TEXT"), ("born", "DATE")],
            vec![
                vec![Value::Null, Value::Text("Ghost".into()), Value::Null],
                vec![Value::Integer(2), Value::Null, Value::Null],
            ],
        );
        let stmts = build(&person_rule(), rows).unwrap();
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts.iter().next().map(|s| s.predicate.as_str()), Some(rdf::TYPE));
    }

    #[test]
    fn test_unmapped_column_type_fails_before_rows() {
        let rows = cursor(
            &[("id", "INTEGER"), ("name", "TEXT"), ("born", "GEOMETRY")],
            vec![],
        );
        assert!(matches!(
            build(&person_rule(), rows),
            Err(R2rmlError::UnmappedDatatype(_))
        ));
    }

    #[test]
    fn test_missing_column_reported_with_mapping() {
        let rows = cursor(&[("id", "INTEGER"), ("name", "TEXT")], vec![]);
        match build(&person_rule(), rows) {
            Err(R2rmlError::ColumnNotFound { column, mapping }) => {
                assert_eq!(column, "born");
                assert_eq!(mapping, "#People");
            }
            other => panic!("expected ColumnNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_language_and_declared_datatype() {
        let subject = SubjectSpec::new(
            Template::new("http://example.com/film/{id}", TermType::Iri).unwrap(),
        )
        .unwrap();
        let rule = MappingRule::new("#Films", View::table("film"), subject)
            .with_predicate_object(
                PredicateObjectSpec::new(
                    "http://example.com/title",
                    ObjectSpec::Template(Template::new("{title}", TermType::Auto).unwrap()),
                )
                .with_language(Template::new("{lang}", TermType::Literal).unwrap()),
            )
            .with_predicate_object(
                PredicateObjectSpec::new("http://example.com/year", ObjectSpec::Column("year".into()))
                    .with_datatype(xsd::INTEGER),
            );
        let rows = cursor(
            &[("id", "INTEGER"), ("title", "TEXT"), ("lang", "TEXT"), ("year", "TEXT")],
            vec![vec![
                Value::Integer(7),
                Value::Text("Amélie".into()),
                Value::Text("fr".into()),
                Value::Text("2001".into()),
            ]],
        );
        let stmts = build(&rule, rows).unwrap();
        let subject = Resource::iri("http://example.com/film/7");
        assert!(stmts.contains(&Statement::new(
            subject.clone(),
            "http://example.com/title",
            RdfTerm::lang_string("Amélie", "fr")
        )));
        assert!(stmts.contains(&Statement::new(
            subject,
            "http://example.com/year",
            RdfTerm::typed("2001", xsd::INTEGER)
        )));
    }

    #[test]
    fn test_blank_node_subjects_and_single_field_datatype() {
        let subject =
            SubjectSpec::new(Template::new("{code}", TermType::BlankNode).unwrap()).unwrap();
        let rule = MappingRule::new("#Rates", View::table("rate"), subject).with_predicate_object(
            PredicateObjectSpec::new(
                "http://example.com/value",
                ObjectSpec::Template(Template::new("{amount}", TermType::Literal).unwrap()),
            ),
        );
        let rows = cursor(
            &[("code", "TEXT"), ("amount", "NUMERIC(8,2)")],
            vec![vec![Value::Text("EUR USD".into()), Value::Real(1.08)]],
        );
        let stmts = build(&rule, rows).unwrap();
        let s = stmts.iter().next().unwrap();
        assert_eq!(s.subject, Resource::blank_node("bEUR_20USD"));
        assert_eq!(s.object, RdfTerm::typed("1.08", xsd::DECIMAL));
    }

    #[test]
    fn test_self_reuse_sees_earlier_subjects() {
        let subject = SubjectSpec::new(
            Template::new("http://example.com/n/{id}", TermType::Iri).unwrap(),
        )
        .unwrap();
        let rule = MappingRule::new("#Nodes", View::table("node"), subject).with_predicate_object(
            PredicateObjectSpec::new(
                "http://example.com/after",
                ObjectSpec::Reference(Reference::to_subjects("#Nodes")),
            ),
        );
        let rows = cursor(
            &[("id", "INTEGER")],
            vec![vec![Value::Integer(1)], vec![Value::Integer(2)]],
        );
        let stmts = build(&rule, rows).unwrap();
        // first row has nothing to point at, second points at the first
        assert_eq!(stmts.len(), 1);
        let s = stmts.iter().next().unwrap();
        assert_eq!(s.subject, Resource::iri("http://example.com/n/2"));
        assert_eq!(s.object, RdfTerm::iri("http://example.com/n/1"));
    }
}
