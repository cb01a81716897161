//! Mapping rules
//!
//! A [`MappingRule`] turns the rows of one [`View`] into statements about one
//! kind of subject.

use sqlparser::ast::{SetExpr, Statement as SqlStatement, TableFactor, TableWithJoins};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use super::{Reference, Template, TermType};
use crate::error::{R2rmlError, R2rmlResult};

/// The rows a mapping reads: a query plus the source tables it touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    query: String,
    tables: Vec<String>,
}

impl View {
    /// View over an arbitrary query. Source tables are read from the query's
    /// `FROM` clause; a query that does not parse reports no tables.
    pub fn query(query: impl Into<String>) -> Self {
        let query = query.into();
        let tables = tables_of(&query);
        Self { query, tables }
    }

    /// View over a whole table.
    pub fn table(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            query: format!("SELECT * FROM {name}"),
            tables: vec![name],
        }
    }

    /// Override the detected source tables.
    pub fn with_tables(mut self, tables: Vec<String>) -> Self {
        self.tables = tables;
        self
    }

    pub fn sql(&self) -> &str {
        &self.query
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }
}

fn tables_of(query: &str) -> Vec<String> {
    let statements = match Parser::parse_sql(&GenericDialect {}, query) {
        Ok(statements) => statements,
        Err(e) => {
            debug!(error = %e, "view query not parsed, no source tables detected");
            return Vec::new();
        }
    };

    let mut tables = Vec::new();
    for statement in &statements {
        if let SqlStatement::Query(q) = statement {
            collect_set_expr(&q.body, &mut tables);
        }
    }
    tables
}

fn collect_set_expr(body: &SetExpr, tables: &mut Vec<String>) {
    match body {
        SetExpr::Select(select) => {
            for from in &select.from {
                collect_table_with_joins(from, tables);
            }
        }
        SetExpr::Query(q) => collect_set_expr(&q.body, tables),
        SetExpr::SetOperation { left, right, .. } => {
            collect_set_expr(left, tables);
            collect_set_expr(right, tables);
        }
        _ => {}
    }
}

fn collect_table_with_joins(from: &TableWithJoins, tables: &mut Vec<String>) {
    collect_factor(&from.relation, tables);
    for join in &from.joins {
        collect_factor(&join.relation, tables);
    }
}

fn collect_factor(factor: &TableFactor, tables: &mut Vec<String>) {
    match factor {
        TableFactor::Table { name, .. } => {
            let name = name.to_string();
            if !tables.contains(&name) {
                tables.push(name);
            }
        }
        TableFactor::Derived { subquery, .. } => collect_set_expr(&subquery.body, tables),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => collect_table_with_joins(table_with_joins, tables),
        _ => {}
    }
}

/// How subjects are generated: a template plus the classes every subject is
/// declared a member of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectSpec {
    template: Template,
    classes: Vec<String>,
}

impl SubjectSpec {
    /// Fails with `InvalidValue` when the template is declared literal.
    pub fn new(template: Template) -> R2rmlResult<Self> {
        Ok(Self {
            template: template.into_subject()?,
            classes: Vec::new(),
        })
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

/// Where an object comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectSpec {
    /// Resolve a template against the row
    Template(Template),
    /// Read a column as a literal
    Column(String),
    /// Subjects of another mapping
    Reference(Reference),
    /// No object; the specification emits nothing
    None,
}

impl ObjectSpec {
    /// Name used in logs and signatures
    pub fn kind(&self) -> &'static str {
        match self {
            ObjectSpec::Template(_) => "template",
            ObjectSpec::Column(_) => "column",
            ObjectSpec::Reference(_) => "reference",
            ObjectSpec::None => "none",
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            ObjectSpec::Reference(r) => Some(r),
            _ => None,
        }
    }
}

/// Predicates paired with one object specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateObjectSpec {
    predicates: Vec<String>,
    object: ObjectSpec,
    datatype: Option<String>,
    language: Option<Template>,
}

impl PredicateObjectSpec {
    pub fn new(predicate: impl Into<String>, object: ObjectSpec) -> Self {
        Self {
            predicates: vec![predicate.into()],
            object,
            datatype: None,
            language: None,
        }
    }

    pub fn with_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicates.push(predicate.into());
        self
    }

    /// Declared datatype IRI for literal objects.
    pub fn with_datatype(mut self, datatype: impl Into<String>) -> Self {
        self.datatype = Some(datatype.into());
        self
    }

    /// Language tag template for literal objects, e.g. `en` or `{lang}`.
    pub fn with_language(mut self, language: Template) -> Self {
        self.language = Some(language);
        self
    }

    pub fn predicates(&self) -> &[String] {
        &self.predicates
    }

    pub fn object(&self) -> &ObjectSpec {
        &self.object
    }

    pub fn datatype(&self) -> Option<&str> {
        self.datatype.as_deref()
    }

    pub fn language(&self) -> Option<&Template> {
        self.language.as_ref()
    }

    fn validate(&self, mapping: &str) -> R2rmlResult<()> {
        if self.predicates.is_empty() {
            return Err(R2rmlError::invalid_value(
                "predicate",
                format!("mapping {mapping} has a predicate-object specification without predicates"),
            ));
        }
        if self.datatype.is_some() && self.language.is_some() {
            return Err(R2rmlError::invalid_value(
                "datatype",
                format!("mapping {mapping} declares both a datatype and a language"),
            ));
        }
        let literal_object = match &self.object {
            ObjectSpec::Template(t) => t.term_type() == TermType::Literal,
            ObjectSpec::Column(_) => true,
            ObjectSpec::Reference(_) | ObjectSpec::None => false,
        };
        if !literal_object && (self.datatype.is_some() || self.language.is_some()) {
            return Err(R2rmlError::invalid_value(
                "datatype",
                format!(
                    "mapping {mapping}: datatype and language apply to literal objects only, found {}",
                    self.object.kind()
                ),
            ));
        }
        Ok(())
    }
}

/// One execution unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRule {
    id: String,
    view: View,
    subject: SubjectSpec,
    predicate_objects: Vec<PredicateObjectSpec>,
}

impl MappingRule {
    pub fn new(id: impl Into<String>, view: View, subject: SubjectSpec) -> Self {
        Self {
            id: id.into(),
            view,
            subject,
            predicate_objects: Vec::new(),
        }
    }

    pub fn with_predicate_object(mut self, spec: PredicateObjectSpec) -> Self {
        self.predicate_objects.push(spec);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn subject(&self) -> &SubjectSpec {
        &self.subject
    }

    pub fn predicate_objects(&self) -> &[PredicateObjectSpec] {
        &self.predicate_objects
    }

    /// Ids of the mappings this rule references, in order, without repeats.
    pub fn parents(&self) -> Vec<&str> {
        let mut parents: Vec<&str> = Vec::new();
        for pom in &self.predicate_objects {
            if let Some(r) = pom.object.as_reference() {
                if !parents.contains(&r.parent.as_str()) {
                    parents.push(&r.parent);
                }
            }
        }
        parents
    }

    pub(crate) fn validate(&self) -> R2rmlResult<()> {
        if self.id.trim().is_empty() {
            return Err(R2rmlError::invalid_value("id", "mapping id is empty"));
        }
        if self.view.sql().trim().is_empty() {
            return Err(R2rmlError::invalid_value(
                "query",
                format!("mapping {} has an empty query", self.id),
            ));
        }
        require_anchor(self.subject.template(), &self.id)?;
        for pom in &self.predicate_objects {
            pom.validate(&self.id)?;
            if let ObjectSpec::Template(t) = pom.object() {
                require_anchor(t, &self.id)?;
            }
        }
        Ok(())
    }
}

fn require_anchor(template: &Template, mapping: &str) -> R2rmlResult<()> {
    if template.is_unanchored() {
        return Err(R2rmlError::invalid_value(
            "namespace",
            format!(
                "mapping {mapping}: template '{}' is a relative IRI and no namespace is set",
                template.text()
            ),
        ));
    }
    Ok(())
}
