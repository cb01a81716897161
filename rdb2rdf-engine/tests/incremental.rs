use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use rdb2rdf_engine::sync::read_statements;
use rdb2rdf_engine::vocab::xsd;
use rdb2rdf_engine::{
    EngineConfig, GraphFormat, GraphStore, MappingDefinition, MappingDocument, MappingOutcome,
    Orchestrator, RdfTerm, Resource, RunLog, RunReport, SqliteStore, Statement,
};
use rdb2rdf_tabular::SqliteSource;
use serde_json::{json, Value as Json};
use tempfile::TempDir;

fn source() -> SqliteSource {
    let source = SqliteSource::open_in_memory().unwrap();
    source
        .execute_batch(
            "CREATE TABLE dept (id INTEGER PRIMARY KEY, title VARCHAR(40));
             CREATE TABLE person (id INTEGER PRIMARY KEY, name VARCHAR(40), age INTEGER, dept_id INTEGER);
             CREATE TABLE tag (id INTEGER PRIMARY KEY, label VARCHAR(20));
             INSERT INTO dept VALUES (1, 'Research'), (2, 'Sales');
             INSERT INTO person VALUES (1, 'Ann', 30, 1), (2, 'Bob', 41, 2);
             INSERT INTO tag VALUES (1, 'alpha');",
        )
        .unwrap();
    source
}

/// Departments, people referencing them, and an unrelated tag mapping.
fn definition(age_datatype: Option<&str>) -> Json {
    let mut age = json!({ "predicate": "ex:age", "column": "age" });
    if let Some(dt) = age_datatype {
        age["datatype"] = json!(dt);
    }
    json!({
        "namespace": "http://example.com",
        "prefixes": { "ex": "http://example.com/" },
        "mappings": [
            {
                "id": "#Dept",
                "table": "dept",
                "subject": { "template": "dept/{id}" },
                "predicateObjects": [{ "predicate": "ex:title", "column": "title" }]
            },
            {
                "id": "#Person",
                "table": "person",
                "subject": { "template": "person/{id}", "classes": ["ex:Person"] },
                "predicateObjects": [
                    { "predicate": "ex:name", "column": "name" },
                    age,
                    {
                        "predicate": "ex:dept",
                        "reference": { "parent": "#Dept", "join": [{ "child": "dept_id", "parent": "id" }] }
                    }
                ]
            },
            {
                "id": "#Tag",
                "table": "tag",
                "subject": { "template": "tag/{id}" },
                "predicateObjects": [{ "predicate": "ex:label", "column": "label" }]
            }
        ]
    })
}

fn document(definition: &Json) -> MappingDocument {
    let def = MappingDefinition::from_json(&definition.to_string()).unwrap();
    MappingDocument::from_definition(&def).unwrap()
}

struct Workspace {
    _dir: TempDir,
    out: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("graph.nt");
        Self { _dir: dir, out }
    }

    fn config(&self) -> EngineConfig {
        EngineConfig::to_file(&self.out).with_incremental(true)
    }

    fn run(&self, doc: &MappingDocument, src: &SqliteSource) -> RunReport {
        Orchestrator::new(&self.config()).run(doc, src).unwrap()
    }

    fn graph(&self) -> BTreeSet<Statement> {
        read_statements(&self.out, GraphFormat::NTriples).unwrap()
    }
}

fn age(person: u32, value: &str, datatype: &str) -> Statement {
    Statement::new(
        Resource::iri(format!("http://example.com/person/{person}")),
        "http://example.com/age",
        RdfTerm::typed(value, datatype),
    )
}

fn modified(path: &Path) -> std::time::SystemTime {
    fs::metadata(path).unwrap().modified().unwrap()
}

#[test]
fn second_run_changes_nothing() {
    let ws = Workspace::new();
    let src = source();
    let doc = document(&definition(None));

    let first = ws.run(&doc, &src);
    assert!(first.full_run);
    assert_eq!(first.executed().len(), 3);
    let graph = ws.graph();
    let stamp = modified(&ws.out);

    let second = ws.run(&doc, &src);
    assert!(!second.full_run);
    assert!(second.executed().is_empty());
    assert_eq!(second.skipped(), vec!["#Dept", "#Person", "#Tag"]);
    assert_eq!((second.sync.added, second.sync.removed), (0, 0));
    assert_eq!(ws.graph(), graph);
    assert_eq!(modified(&ws.out), stamp);

    // the rewritten log still validates
    let third = ws.run(&doc, &src);
    assert!(!third.full_run);
    assert!(third.executed().is_empty());
}

#[test]
fn datatype_change_regenerates_only_its_mapping() {
    let ws = Workspace::new();
    let src = source();
    ws.run(&document(&definition(None)), &src);
    assert!(ws.graph().contains(&age(1, "30", xsd::INTEGER)));

    let report = ws.run(&document(&definition(Some(xsd::DECIMAL))), &src);
    assert_eq!(report.executed(), vec!["#Person"]);
    assert_eq!(report.skipped(), vec!["#Dept", "#Tag"]);
    assert_eq!((report.sync.added, report.sync.removed), (2, 2));

    let graph = ws.graph();
    assert!(graph.contains(&age(1, "30", xsd::DECIMAL)));
    assert!(!graph.contains(&age(1, "30", xsd::INTEGER)));
}

#[test]
fn parent_data_change_reruns_dependents() {
    let ws = Workspace::new();
    let src = source();
    let doc = document(&definition(None));
    ws.run(&doc, &src);

    src.execute_batch("UPDATE dept SET title = 'R&D' WHERE id = 1;").unwrap();
    let report = ws.run(&doc, &src);
    assert_eq!(report.executed(), vec!["#Dept", "#Person"]);
    assert_eq!(report.skipped(), vec!["#Tag"]);
    assert_eq!((report.sync.added, report.sync.removed), (1, 1));
}

#[test]
fn removed_mapping_is_purged() {
    let ws = Workspace::new();
    let src = source();
    ws.run(&document(&definition(None)), &src);

    let mut def = definition(None);
    def["mappings"].as_array_mut().unwrap().retain(|m| m["id"] != "#Tag");
    let report = ws.run(&document(&def), &src);

    assert!(report.executed().is_empty());
    assert_eq!(report.sync.removed, 1);
    assert!(!ws
        .graph()
        .iter()
        .any(|s| s.predicate == "http://example.com/label"));
    let log = RunLog::load(ws.config().run_log()).unwrap();
    assert!(!log.mappings.contains_key("#Tag"));
}

#[test]
fn corrupt_log_forces_full_run() {
    let ws = Workspace::new();
    let src = source();
    let doc = document(&definition(None));
    ws.run(&doc, &src);
    let graph = ws.graph();

    fs::write(ws.config().run_log(), "{ truncated").unwrap();
    let report = ws.run(&doc, &src);
    assert!(report.full_run);
    assert_eq!(report.executed().len(), 3);
    assert_eq!((report.sync.added, report.sync.removed), (0, 0));
    assert_eq!(ws.graph(), graph);
}

#[test]
fn edited_output_forces_full_run() {
    let ws = Workspace::new();
    let src = source();
    let doc = document(&definition(None));
    ws.run(&doc, &src);

    let mut content = fs::read_to_string(&ws.out).unwrap();
    content.push_str("<http://example.com/x> <http://example.com/y> \"z\" .\n");
    fs::write(&ws.out, content).unwrap();

    let report = ws.run(&doc, &src);
    assert!(report.full_run);
    assert_eq!(report.sync.removed, 1);
}

#[test]
fn failed_mapping_keeps_previous_statements() {
    let ws = Workspace::new();
    let src = source();
    let doc = document(&definition(None));
    ws.run(&doc, &src);
    let before = ws.graph();

    src.execute_batch("DROP TABLE dept;").unwrap();
    let config = ws.config().with_continue_on_error(true);
    let report = Orchestrator::new(&config).run(&doc, &src).unwrap();

    assert_eq!(report.failed(), vec!["#Dept", "#Person"]);
    assert!(matches!(
        report.outcome("#Person"),
        Some(MappingOutcome::Failed { error }) if error.contains("#Dept")
    ));
    assert_eq!(report.skipped(), vec!["#Tag"]);
    assert_eq!(ws.graph(), before);

    let log = RunLog::load(config.run_log()).unwrap();
    assert_eq!(log.mappings.keys().collect::<Vec<_>>(), vec!["#Tag"]);
}

#[test]
fn failure_without_continue_leaves_output_alone() {
    let ws = Workspace::new();
    let src = source();
    let doc = document(&definition(None));
    ws.run(&doc, &src);
    let stamp = modified(&ws.out);
    let log_before = fs::read_to_string(ws.config().run_log()).unwrap();

    src.execute_batch("DROP TABLE tag;").unwrap();
    assert!(Orchestrator::new(&ws.config()).run(&doc, &src).is_err());
    assert_eq!(modified(&ws.out), stamp);
    assert_eq!(fs::read_to_string(ws.config().run_log()).unwrap(), log_before);
}

#[test]
fn store_receives_deltas() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("graph.db");
    let config = EngineConfig::to_store(&db).with_incremental(true);
    let src = source();
    let doc = document(&definition(None));

    let first = Orchestrator::new(&config).run(&doc, &src).unwrap();
    assert!(first.full_run);
    assert_eq!(first.sync.removed, 0);
    assert_eq!(first.sync.added, first.sync.total);

    let again = Orchestrator::new(&config).run(&doc, &src).unwrap();
    assert_eq!(again.executed().len(), 3);
    assert_eq!((again.sync.added, again.sync.removed), (0, 0));

    src.execute_batch("DELETE FROM tag;").unwrap();
    let report = Orchestrator::new(&config).run(&doc, &src).unwrap();
    assert_eq!((report.sync.added, report.sync.removed), (0, 1));

    let store = SqliteStore::open(&db).unwrap();
    assert_eq!(store.len().unwrap(), report.sync.total);
}

#[test]
fn store_keeps_statements_of_failed_mappings() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("graph.db");
    let config = EngineConfig::to_store(&db).with_continue_on_error(true);
    let src = source();
    let doc = document(&definition(None));
    let first = Orchestrator::new(&config).run(&doc, &src).unwrap();

    src.execute_batch("DROP TABLE tag;").unwrap();
    let report = Orchestrator::new(&config).run(&doc, &src).unwrap();
    assert_eq!(report.failed(), vec!["#Tag"]);
    assert_eq!(report.sync.removed, 0);
    assert_eq!(report.sync.total, first.sync.total);
}

#[test]
fn seed_graph_is_merged_and_tracked() {
    let ws = Workspace::new();
    let seed = ws.out.with_file_name("seed.nt");
    let title = |t: &str| {
        format!("<http://example.com/dataset> <http://purl.org/dc/terms/title> \"{t}\" .\n")
    };
    fs::write(&seed, title("People")).unwrap();
    let config = ws.config().with_seed_graph(&seed);
    let src = source();
    let doc = document(&definition(None));
    let seeded = |t: &str| {
        Statement::new(
            Resource::iri("http://example.com/dataset"),
            "http://purl.org/dc/terms/title",
            RdfTerm::string(t),
        )
    };

    let first = Orchestrator::new(&config).run(&doc, &src).unwrap();
    assert!(ws.graph().contains(&seeded("People")));
    assert_eq!(first.sync.total, ws.graph().len());
    let stamp = modified(&ws.out);

    // unchanged seed and data leave the output alone
    let second = Orchestrator::new(&config).run(&doc, &src).unwrap();
    assert!(second.executed().is_empty());
    assert_eq!(modified(&ws.out), stamp);

    fs::write(&seed, title("Staff")).unwrap();
    let third = Orchestrator::new(&config).run(&doc, &src).unwrap();
    assert!(third.executed().is_empty());
    assert_eq!((third.sync.added, third.sync.removed), (1, 1));
    let graph = ws.graph();
    assert!(graph.contains(&seeded("Staff")));
    assert!(!graph.contains(&seeded("People")));

    // the seed never shows up as a mapping in the log
    let log = RunLog::load(config.run_log()).unwrap();
    assert_eq!(log.mappings.len(), 3);
}

#[test]
fn unreadable_seed_graph_aborts_before_writing() {
    let ws = Workspace::new();
    let config = ws.config().with_seed_graph(ws.out.with_file_name("missing.nt"));
    let err = Orchestrator::new(&config)
        .run(&document(&definition(None)), &source())
        .unwrap_err();
    assert!(err.to_string().contains("missing.nt"));
    assert!(!ws.out.exists());
}

#[test]
fn clean_store_drops_statements_a_failed_run_would_keep() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("graph.db");
    let foreign = Statement::new(
        Resource::iri("http://other.example/x"),
        "http://other.example/p",
        RdfTerm::string("stale"),
    );
    SqliteStore::open(&db)
        .unwrap()
        .apply(&BTreeSet::new(), &BTreeSet::from([foreign.clone()]))
        .unwrap();
    let src = source();
    src.execute_batch("DROP TABLE tag;").unwrap();
    let doc = document(&definition(None));

    // a failed mapping suppresses removals
    let config = EngineConfig::to_store(&db).with_continue_on_error(true);
    let kept = Orchestrator::new(&config).run(&doc, &src).unwrap();
    assert_eq!(kept.failed(), vec!["#Tag"]);
    assert_eq!(kept.sync.removed, 0);
    assert!(SqliteStore::open(&db).unwrap().statements().unwrap().contains(&foreign));

    let report = Orchestrator::new(&config.with_clean_store(true)).run(&doc, &src).unwrap();
    let statements = SqliteStore::open(&db).unwrap().statements().unwrap();
    assert!(!statements.contains(&foreign));
    assert_eq!(report.sync.removed, kept.sync.total);
    assert_eq!(report.sync.added, report.sync.total);
    assert_eq!(statements.len(), report.sync.total);
}
