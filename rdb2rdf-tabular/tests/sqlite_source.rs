use rdb2rdf_tabular::{SqlSource, SqliteSource, TabularError, Value};
use tempfile::TempDir;

fn fixture() -> SqliteSource {
    let source = SqliteSource::open_in_memory().unwrap();
    source
        .execute_batch(
            "CREATE TABLE person (
                 id INTEGER PRIMARY KEY,
                 name VARCHAR(40),
                 born DATE,
                 active BOOLEAN,
                 score NUMERIC(5,2),
                 updated TIMESTAMP
             );
             INSERT INTO person VALUES (1, 'Alice', '1990-04-02', 1, 12.5, '2024-01-01 10:00:00');
             INSERT INTO person VALUES (2, NULL, NULL, 0, NULL, NULL);",
        )
        .unwrap();
    source
}

#[test]
fn declared_types_are_reported() {
    let source = fixture();
    let cursor = source.execute("SELECT * FROM person ORDER BY id").unwrap();
    let schema = cursor.schema();

    assert_eq!(schema.type_name("id"), Some("INTEGER"));
    assert_eq!(schema.type_name("name"), Some("VARCHAR(40)"));
    assert_eq!(schema.type_name("born"), Some("DATE"));
    assert_eq!(schema.type_name("score"), Some("NUMERIC(5,2)"));
}

#[test]
fn values_follow_declared_types() {
    let source = fixture();
    let mut cursor = source.execute("SELECT * FROM person ORDER BY id").unwrap();

    assert!(cursor.next());
    let row = cursor.row().unwrap();
    assert_eq!(row.get("id"), Some(&Value::Integer(1)));
    assert_eq!(row.get("active"), Some(&Value::Boolean(true)));
    assert_eq!(row.get_string("born").unwrap(), Some("1990-04-02".to_string()));
    assert_eq!(
        row.get_string("updated").unwrap(),
        Some("2024-01-01T10:00:00".to_string())
    );

    assert!(cursor.next());
    let row = cursor.row().unwrap();
    assert_eq!(row.get("name"), Some(&Value::Null));
    assert_eq!(row.get("active"), Some(&Value::Boolean(false)));

    assert!(!cursor.next());
}

#[test]
fn untyped_expressions_use_storage_class() {
    let source = fixture();
    let cursor = source
        .execute("SELECT id * 2 AS doubled, upper(name) AS shout FROM person WHERE id = 1")
        .unwrap();
    assert_eq!(cursor.schema().type_name("doubled"), Some("integer"));
    assert_eq!(cursor.schema().type_name("shout"), Some("text"));
}

#[test]
fn query_errors_are_typed() {
    let source = fixture();
    let err = source.execute("SELECT nope FROM person").unwrap_err();
    match err {
        TabularError::Query { query, .. } => assert_eq!(query, "SELECT nope FROM person"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn file_database_opens_read_only() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("source.db");
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (7);")
            .unwrap();
    }

    let source = SqliteSource::open(&path).unwrap();
    let mut cursor = source.execute("SELECT id FROM t").unwrap();
    assert!(cursor.next());
    assert_eq!(cursor.get_index(1).unwrap(), &Value::Integer(7));
    assert!(source.execute_batch("INSERT INTO t VALUES (8)").is_err());
}
