use std::collections::BTreeSet;
use std::path::Path;

use rdb2rdf_engine::materialize::{ProducedSubjects, SubjectList};
use rdb2rdf_engine::sync::read_statements;
use rdb2rdf_engine::vocab::{rdf, xsd};
use rdb2rdf_engine::{
    EngineConfig, GraphFormat, MappingDefinition, MappingDocument, Orchestrator, R2rmlError,
    RdfTerm, Resource, RunReport, Statement, TermBuilder,
};
use rdb2rdf_tabular::{SqlSource, SqliteSource};
use serde_json::json;
use tempfile::TempDir;

const EX: &str = "http://example.com";

fn source(sql: &str) -> SqliteSource {
    let source = SqliteSource::open_in_memory().unwrap();
    source.execute_batch(sql).unwrap();
    source
}

fn document(definition: serde_json::Value) -> MappingDocument {
    let def = MappingDefinition::from_json(&definition.to_string()).unwrap();
    MappingDocument::from_definition(&def).unwrap()
}

fn run(document: &MappingDocument, source: &SqliteSource, out: &Path) -> RunReport {
    let config = EngineConfig::to_file(out);
    Orchestrator::new(&config).run(document, source).unwrap()
}

fn output(out: &Path) -> BTreeSet<Statement> {
    read_statements(out, GraphFormat::NTriples).unwrap()
}

fn iri(path: &str) -> Resource {
    Resource::iri(format!("{EX}/{path}"))
}

fn pred(name: &str) -> String {
    format!("{EX}/{name}")
}

#[test]
fn classes_and_columns() {
    let src = source(
        "CREATE TABLE person (id INTEGER PRIMARY KEY, name VARCHAR(40));
         INSERT INTO person VALUES (1, 'Ann'), (2, 'Bob');",
    );
    let doc = document(json!({
        "mappings": [{
            "id": "#Person",
            "table": "person",
            "subject": {
                "template": "http://example.com/person/{id}",
                "classes": ["http://example.com/Person"]
            },
            "predicateObjects": [
                { "predicate": "http://example.com/name", "column": "name" },
                { "predicate": "http://example.com/label", "column": "name", "language": "en" }
            ]
        }]
    }));
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("people.nt");
    let report = run(&doc, &src, &out);

    let graph = output(&out);
    let types: Vec<_> = graph.iter().filter(|s| s.predicate == rdf::TYPE).collect();
    assert_eq!(types.len(), 2);
    assert!(graph.contains(&Statement::new(iri("person/1"), pred("name"), RdfTerm::string("Ann"))));
    assert!(graph.contains(&Statement::new(
        iri("person/2"),
        pred("label"),
        RdfTerm::lang_string("Bob", "en")
    )));
    assert_eq!(report.statement_count, 6);
    assert_eq!(report.executed(), vec!["#Person"]);
}

#[test]
fn reference_joins_parent_subjects() {
    let src = source(
        "CREATE TABLE customer (id INTEGER PRIMARY KEY, name VARCHAR(40));
         CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER);
         INSERT INTO customer VALUES (1, 'Ann'), (2, 'Bob');
         INSERT INTO orders VALUES (9, 2);",
    );
    let doc = document(json!({
        "namespace": EX,
        "prefixes": { "ex": "http://example.com/" },
        "mappings": [
            {
                "id": "#Orders",
                "table": "orders",
                "subject": { "template": "order/{id}" },
                "predicateObjects": [{
                    "predicate": "ex:hasCustomer",
                    "reference": { "parent": "#Customers", "join": [{ "child": "customer_id", "parent": "id" }] }
                }]
            },
            {
                "id": "#Customers",
                "table": "customer",
                "subject": { "template": "customer/{id}", "classes": ["ex:Customer"] }
            }
        ]
    }));
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("orders.nt");
    let report = run(&doc, &src, &out);

    assert_eq!(report.executed(), vec!["#Customers", "#Orders"]);
    let graph = output(&out);
    assert!(graph.contains(&Statement::new(
        iri("order/9"),
        pred("hasCustomer"),
        RdfTerm::iri(format!("{EX}/customer/2"))
    )));
    assert!(graph.contains(&Statement::new(
        iri("customer/1"),
        rdf::TYPE,
        RdfTerm::iri(format!("{EX}/Customer"))
    )));
}

#[test]
fn native_types_pick_datatypes() {
    let src = source(
        "CREATE TABLE event (id INTEGER PRIMARY KEY, day DATE, note VARCHAR(20), seats INTEGER);
         INSERT INTO event VALUES (1, '2024-03-01', '2024-03-01', 40);",
    );
    let doc = document(json!({
        "mappings": [{
            "id": "#Event",
            "table": "event",
            "subject": { "template": "http://example.com/event/{id}" },
            "predicateObjects": [
                { "predicate": "http://example.com/day", "column": "day" },
                { "predicate": "http://example.com/note", "column": "note" },
                { "predicate": "http://example.com/seats", "column": "seats" },
                { "predicate": "http://example.com/capacity", "column": "seats", "datatype": xsd::DECIMAL }
            ]
        }]
    }));
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("events.nt");
    run(&doc, &src, &out);

    let graph = output(&out);
    let subject = iri("event/1");
    for expected in [
        Statement::new(subject.clone(), pred("day"), RdfTerm::typed("2024-03-01", xsd::DATE)),
        Statement::new(subject.clone(), pred("note"), RdfTerm::string("2024-03-01")),
        Statement::new(subject.clone(), pred("seats"), RdfTerm::typed("40", xsd::INTEGER)),
        Statement::new(subject, pred("capacity"), RdfTerm::typed("40", xsd::DECIMAL)),
    ] {
        assert!(graph.contains(&expected), "missing {expected}");
    }
}

#[test]
fn nulls_suppress_terms() {
    let src = source(
        "CREATE TABLE person (id INTEGER, first VARCHAR(20), last VARCHAR(20));
         INSERT INTO person VALUES (1, 'Ann', 'Lee'), (2, 'Bob', NULL), (NULL, 'Nobody', 'X');",
    );
    let doc = document(json!({
        "mappings": [{
            "id": "#Person",
            "query": "SELECT id, first, last FROM person",
            "subject": { "template": "http://example.com/person/{id}" },
            "predicateObjects": [
                { "predicate": "http://example.com/fullName", "template": "{first} {last}" },
                { "predicate": "http://example.com/first", "column": "first" }
            ]
        }]
    }));
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("people.nt");
    run(&doc, &src, &out);

    let graph = output(&out);
    assert!(graph.contains(&Statement::new(
        iri("person/1"),
        pred("fullName"),
        RdfTerm::string("Ann Lee")
    )));
    let bob: Vec<_> = graph.iter().filter(|s| s.subject == iri("person/2")).collect();
    assert_eq!(bob.len(), 1, "only the first name survives a NULL last name");
    // a NULL subject key produces nothing at all
    assert!(!graph.iter().any(|s| s.object == RdfTerm::string("Nobody")));
}

#[test]
fn unsealed_parent_is_an_ordering_violation() {
    let src = source(
        "CREATE TABLE a (id INTEGER);
         CREATE TABLE b (id INTEGER);
         INSERT INTO a VALUES (1);
         INSERT INTO b VALUES (1);",
    );
    let doc = document(json!({
        "mappings": [
            { "id": "#A", "table": "a", "subject": { "template": "http://example.com/a/{id}" } },
            {
                "id": "#B",
                "table": "b",
                "subject": { "template": "http://example.com/b/{id}" },
                "predicateObjects": [{ "predicate": "http://example.com/rel", "reference": { "parent": "#A" } }]
            }
        ]
    }));
    let config = EngineConfig::to_file("unused.nt");
    let builder = TermBuilder::new(&doc, &src, &config);
    let rule = doc.get("#B").unwrap();
    let mut cursor = src.execute(rule.view().sql()).unwrap();
    let plan = builder.prepare(rule, cursor.schema()).unwrap();
    assert!(cursor.next());
    let row = cursor.row().unwrap();

    let err = builder
        .build_statements(
            &plan,
            &row,
            &ProducedSubjects::new(),
            &mut SubjectList::new(),
            &mut BTreeSet::new(),
        )
        .unwrap_err();
    match err {
        R2rmlError::OrderingViolation { child, parent } => {
            assert_eq!(child, "#B");
            assert_eq!(parent, "#A");
        }
        other => panic!("expected OrderingViolation, got {other:?}"),
    }
}

#[test]
fn reference_cycle_is_rejected_before_output() {
    let src = source("CREATE TABLE a (id INTEGER); CREATE TABLE b (id INTEGER);");
    let doc = document(json!({
        "mappings": [
            {
                "id": "#A",
                "table": "a",
                "subject": { "template": "http://example.com/a/{id}" },
                "predicateObjects": [{ "predicate": "http://example.com/rel", "reference": { "parent": "#B" } }]
            },
            {
                "id": "#B",
                "table": "b",
                "subject": { "template": "http://example.com/b/{id}" },
                "predicateObjects": [{ "predicate": "http://example.com/rel", "reference": { "parent": "#A" } }]
            }
        ]
    }));
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("cycle.nt");
    let config = EngineConfig::to_file(&out);

    let err = Orchestrator::new(&config).run(&doc, &src).unwrap_err();
    assert!(matches!(err, R2rmlError::DependencyCycle(_)), "{err:?}");
    assert!(!out.exists());
}

#[test]
fn missing_column_names_the_mapping() {
    let src = source("CREATE TABLE a (id INTEGER); INSERT INTO a VALUES (1);");
    let doc = document(json!({
        "mappings": [{
            "id": "#A",
            "table": "a",
            "subject": { "template": "http://example.com/a/{id}" },
            "predicateObjects": [{ "predicate": "http://example.com/p", "column": "missing" }]
        }]
    }));
    let dir = TempDir::new().unwrap();
    let config = EngineConfig::to_file(dir.path().join("a.nt"));

    match Orchestrator::new(&config).run(&doc, &src).unwrap_err() {
        R2rmlError::ColumnNotFound { column, mapping } => {
            assert_eq!(column, "missing");
            assert_eq!(mapping, "#A");
        }
        other => panic!("expected ColumnNotFound, got {other:?}"),
    }
}

#[test]
fn self_reference_reuses_earlier_subjects() {
    let src = source(
        "CREATE TABLE node (id INTEGER PRIMARY KEY);
         INSERT INTO node VALUES (1), (2), (3);",
    );
    let doc = document(json!({
        "mappings": [{
            "id": "#Node",
            "query": "SELECT id FROM node ORDER BY id",
            "subject": { "template": "http://example.com/n/{id}" },
            "predicateObjects": [{ "predicate": "http://example.com/after", "reference": { "parent": "#Node" } }]
        }]
    }));
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("nodes.nt");
    run(&doc, &src, &out);

    let graph = output(&out);
    let after = |s: &str, o: &str| Statement::new(iri(s), pred("after"), RdfTerm::from(iri(o)));
    assert_eq!(
        graph,
        BTreeSet::from([after("n/2", "n/1"), after("n/3", "n/1"), after("n/3", "n/2")])
    );
}

#[test]
fn relative_template_without_namespace_is_rejected() {
    let def = MappingDefinition::from_json(
        &json!({
            "mappings": [{ "id": "#P", "table": "person", "subject": { "template": "person/{id}" } }]
        })
        .to_string(),
    )
    .unwrap();
    let err = MappingDocument::from_definition(&def).unwrap_err();
    assert!(err.is_configuration(), "{err:?}");
    assert!(err.to_string().contains("person/{id}"), "{err}");
}

#[test]
fn join_against_multi_table_parent_is_rejected() {
    let src = source(
        "CREATE TABLE region (id INTEGER PRIMARY KEY, name TEXT);
         CREATE TABLE customer (id INTEGER PRIMARY KEY, region INTEGER);
         CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER);
         INSERT INTO region VALUES (1, 'North');
         INSERT INTO customer VALUES (2, 1);
         INSERT INTO orders VALUES (9, 2);",
    );
    let doc = document(json!({
        "mappings": [
            {
                "id": "#Customers",
                "query": "SELECT c.id, r.name FROM customer c JOIN region r ON c.region = r.id",
                "subject": { "template": "http://example.com/customer/{id}" }
            },
            {
                "id": "#Orders",
                "table": "orders",
                "subject": { "template": "http://example.com/order/{id}" },
                "predicateObjects": [{
                    "predicate": "http://example.com/hasCustomer",
                    "reference": { "parent": "#Customers", "join": [{ "child": "customer_id", "parent": "id" }] }
                }]
            }
        ]
    }));
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("orders.nt");
    let config = EngineConfig::to_file(&out);

    match Orchestrator::new(&config).run(&doc, &src).unwrap_err() {
        R2rmlError::AmbiguousJoinParent { parent, tables } => {
            assert_eq!(parent, "#Customers");
            assert_eq!(tables, 2);
        }
        other => panic!("expected AmbiguousJoinParent, got {other:?}"),
    }
    assert!(!out.exists());
}

#[test]
fn turtle_output_uses_document_prefixes() {
    let src = source(
        "CREATE TABLE person (id INTEGER PRIMARY KEY, name VARCHAR(40));
         INSERT INTO person VALUES (1, 'Ann');",
    );
    let doc = document(json!({
        "namespace": EX,
        "prefixes": { "ex": "http://example.com/", "foaf": "http://xmlns.com/foaf/0.1/" },
        "mappings": [{
            "id": "#Person",
            "table": "person",
            "subject": { "template": "person/{id}", "classes": ["foaf:Person"] },
            "predicateObjects": [{ "predicate": "foaf:name", "column": "name" }]
        }]
    }));
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("people.ttl");
    run(&doc, &src, &out);

    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.contains("@prefix ex: <http://example.com/> ."), "{text}");
    assert!(text.contains("@prefix foaf: <http://xmlns.com/foaf/0.1/> ."), "{text}");
    assert!(text.contains("a foaf:Person"), "{text}");
    assert!(text.contains("foaf:name \"Ann\""), "{text}");

    let graph = read_statements(&out, GraphFormat::Turtle).unwrap();
    assert_eq!(graph.len(), 2);
    assert!(graph.contains(&Statement::new(
        iri("person/1"),
        "http://xmlns.com/foaf/0.1/name",
        RdfTerm::string("Ann")
    )));
}
