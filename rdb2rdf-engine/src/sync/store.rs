//! Statement stores
//!
//! A [`GraphStore`] holds the target graph for store outputs. The
//! synchronizer only ever sends it add/remove deltas.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use tracing::debug;

use crate::error::{R2rmlError, R2rmlResult};
use crate::materialize::{RdfTerm, Resource, Statement};

/// Persistent statement collection updated through deltas.
pub trait GraphStore {
    /// Every statement currently stored.
    fn statements(&self) -> R2rmlResult<BTreeSet<Statement>>;

    /// Remove then add, as one unit.
    fn apply(&mut self, remove: &BTreeSet<Statement>, add: &BTreeSet<Statement>) -> R2rmlResult<()>;

    fn len(&self) -> R2rmlResult<usize> {
        Ok(self.statements()?.len())
    }
}

/// In-memory store, mostly for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    statements: BTreeSet<Statement>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FromIterator<Statement> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = Statement>>(iter: I) -> Self {
        Self {
            statements: iter.into_iter().collect(),
        }
    }
}

impl GraphStore for MemoryStore {
    fn statements(&self) -> R2rmlResult<BTreeSet<Statement>> {
        Ok(self.statements.clone())
    }

    fn apply(&mut self, remove: &BTreeSet<Statement>, add: &BTreeSet<Statement>) -> R2rmlResult<()> {
        for s in remove {
            self.statements.remove(s);
        }
        self.statements.extend(add.iter().cloned());
        Ok(())
    }

    fn len(&self) -> R2rmlResult<usize> {
        Ok(self.statements.len())
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS statements (
    subject      TEXT NOT NULL,
    subject_kind TEXT NOT NULL,
    predicate    TEXT NOT NULL,
    object       TEXT NOT NULL,
    object_kind  TEXT NOT NULL,
    datatype     TEXT NOT NULL DEFAULT '',
    language     TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (subject, subject_kind, predicate, object, object_kind, datatype, language)
) WITHOUT ROWID;
";

const IRI: &str = "iri";
const BLANK: &str = "bnode";
const LITERAL: &str = "literal";

/// Statements kept in a `statements` table of a SQLite file.
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> R2rmlResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, path })
    }

    pub fn open_in_memory() -> R2rmlResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Flattened row form: (subject, subject kind, predicate, object, object kind, datatype, language)
type StatementRow<'a> = (&'a str, &'a str, &'a str, &'a str, &'a str, &'a str, &'a str);

fn to_row(s: &Statement) -> StatementRow<'_> {
    let (subject, subject_kind) = match &s.subject {
        Resource::Iri(iri) => (iri.as_str(), IRI),
        Resource::BlankNode(id) => (id.as_str(), BLANK),
    };
    let (object, object_kind, datatype, language) = match &s.object {
        RdfTerm::Iri(iri) => (iri.as_str(), IRI, "", ""),
        RdfTerm::BlankNode(id) => (id.as_str(), BLANK, "", ""),
        RdfTerm::Literal {
            value,
            datatype,
            language,
        } => (
            value.as_str(),
            LITERAL,
            datatype.as_deref().unwrap_or(""),
            language.as_deref().unwrap_or(""),
        ),
    };
    (
        subject,
        subject_kind,
        s.predicate.as_str(),
        object,
        object_kind,
        datatype,
        language,
    )
}

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Statement, String>> {
    let subject: String = row.get(0)?;
    let subject_kind: String = row.get(1)?;
    let predicate: String = row.get(2)?;
    let object: String = row.get(3)?;
    let object_kind: String = row.get(4)?;
    let datatype: String = row.get(5)?;
    let language: String = row.get(6)?;

    let subject = match subject_kind.as_str() {
        IRI => Resource::Iri(subject),
        BLANK => Resource::BlankNode(subject),
        other => return Ok(Err(format!("unknown subject kind '{other}'"))),
    };
    let object = match object_kind.as_str() {
        IRI => RdfTerm::Iri(object),
        BLANK => RdfTerm::BlankNode(object),
        LITERAL => RdfTerm::Literal {
            value: object,
            datatype: Some(datatype).filter(|d| !d.is_empty()),
            language: Some(language).filter(|l| !l.is_empty()),
        },
        other => return Ok(Err(format!("unknown object kind '{other}'"))),
    };
    Ok(Ok(Statement {
        subject,
        predicate,
        object,
    }))
}

impl GraphStore for SqliteStore {
    fn statements(&self) -> R2rmlResult<BTreeSet<Statement>> {
        let mut stmt = self.conn.prepare(
            "SELECT subject, subject_kind, predicate, object, object_kind, datatype, language
             FROM statements",
        )?;
        let rows = stmt.query_map([], from_row)?;
        let mut statements = BTreeSet::new();
        for row in rows {
            statements.insert(row?.map_err(R2rmlError::Store)?);
        }
        Ok(statements)
    }

    fn apply(&mut self, remove: &BTreeSet<Statement>, add: &BTreeSet<Statement>) -> R2rmlResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut delete = tx.prepare(
                "DELETE FROM statements WHERE subject = ?1 AND subject_kind = ?2 AND predicate = ?3
                 AND object = ?4 AND object_kind = ?5 AND datatype = ?6 AND language = ?7",
            )?;
            for s in remove {
                let (a, b, c, d, e, f, g) = to_row(s);
                delete.execute(params![a, b, c, d, e, f, g])?;
            }

            let mut insert = tx.prepare(
                "INSERT OR IGNORE INTO statements
                 (subject, subject_kind, predicate, object, object_kind, datatype, language)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for s in add {
                let (a, b, c, d, e, f, g) = to_row(s);
                insert.execute(params![a, b, c, d, e, f, g])?;
            }
        }
        tx.commit()?;
        debug!(removed = remove.len(), added = add.len(), store = %self.path.display(), "store updated");
        Ok(())
    }

    fn len(&self) -> R2rmlResult<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM statements", [], |r| r.get(0))?;
        Ok(usize::try_from(n).unwrap_or_default())
    }
}
