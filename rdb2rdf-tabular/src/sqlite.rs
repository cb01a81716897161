//! SQLite-backed [`SqlSource`].
//!
//! SQLite keeps dates, times and booleans in generic storage classes, so the
//! declared column type drives conversion: a `DATE` column holding
//! `'2024-01-01'` becomes [`Value::Date`], a `BOOLEAN` column holding `1`
//! becomes [`Value::Boolean`]. Columns without a declared type (expressions,
//! aggregates) report the storage class of their first non-null value.

use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use crate::error::{Result, TabularError};
use crate::row::{ColumnInfo, ResultSchema, RowCursor, Value};
use crate::source::SqlSource;

/// Type name reported for untyped columns whose values are all NULL.
const FALLBACK_TYPE: &str = "text";

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// A SQLite database used as the relational source.
pub struct SqliteSource {
    conn: Connection,
    label: String,
}

impl SqliteSource {
    /// Open an existing database file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
        )
        .map_err(|e| TabularError::Connection(format!("{}: {e}", path.display())))?;

        Ok(Self {
            conn,
            label: path.display().to_string(),
        })
    }

    /// Open a private in-memory database (writable, for fixtures and tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| TabularError::Connection(e.to_string()))?;
        Ok(Self {
            conn,
            label: ":memory:".to_string(),
        })
    }

    /// Wrap an already configured connection.
    pub fn from_connection(conn: Connection, label: impl Into<String>) -> Self {
        Self {
            conn,
            label: label.into(),
        }
    }

    /// Run one or more statements that return no rows (DDL, inserts).
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql).map_err(|e| TabularError::Query {
            query: sql.to_string(),
            message: e.to_string(),
        })
    }
}

impl SqlSource for SqliteSource {
    fn execute(&self, query: &str) -> Result<RowCursor> {
        let query_err = |e: rusqlite::Error| TabularError::Query {
            query: query.to_string(),
            message: e.to_string(),
        };

        let mut stmt = self.conn.prepare(query).map_err(query_err)?;
        let declared: Vec<(String, Option<String>)> = stmt
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.decl_type().map(str::to_string)))
            .collect();
        let affinities: Vec<Affinity> = declared
            .iter()
            .map(|(_, decl)| Affinity::from_decl(decl.as_deref()))
            .collect();
        let width = declared.len();

        let mut observed: Vec<Option<&'static str>> = vec![None; width];
        let mut rows = Vec::new();
        let mut result = stmt.query([]).map_err(query_err)?;
        while let Some(row) = result.next().map_err(query_err)? {
            let mut values = Vec::with_capacity(width);
            for (i, affinity) in affinities.iter().enumerate() {
                let raw = row.get_ref(i).map_err(query_err)?;
                if observed[i].is_none() {
                    observed[i] = storage_class(raw);
                }
                values.push(affinity.convert(raw));
            }
            rows.push(values);
        }

        let columns = declared
            .into_iter()
            .zip(observed)
            .map(|((name, decl), seen)| {
                let type_name = decl.unwrap_or_else(|| seen.unwrap_or(FALLBACK_TYPE).to_string());
                ColumnInfo::new(name, type_name)
            })
            .collect();

        debug!(rows = rows.len(), source = %self.label, "query executed");
        RowCursor::new(Arc::new(ResultSchema::new(columns)), rows)
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.label)
    }
}

/// Conversion rule derived from a declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Affinity {
    Boolean,
    Date,
    Time,
    Timestamp,
    Other,
}

impl Affinity {
    fn from_decl(decl: Option<&str>) -> Self {
        let Some(decl) = decl else {
            return Affinity::Other;
        };
        let lowered = decl.to_ascii_lowercase();
        let base = lowered.split('(').next().unwrap_or("").trim();
        match base {
            "boolean" | "bool" => Affinity::Boolean,
            "date" => Affinity::Date,
            "time" | "timetz" => Affinity::Time,
            "datetime" => Affinity::Timestamp,
            b if b.starts_with("timestamp") => Affinity::Timestamp,
            _ => Affinity::Other,
        }
    }

    fn convert(self, raw: ValueRef<'_>) -> Value {
        match raw {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(n) if self == Affinity::Boolean => Value::Boolean(n != 0),
            ValueRef::Integer(n) => Value::Integer(n),
            ValueRef::Real(n) => Value::Real(n),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
            ValueRef::Text(bytes) => {
                let text = String::from_utf8_lossy(bytes).into_owned();
                match self {
                    Affinity::Date => NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                        .map(Value::Date)
                        .unwrap_or(Value::Text(text)),
                    Affinity::Time => NaiveTime::parse_from_str(&text, "%H:%M:%S%.f")
                        .map(Value::Time)
                        .unwrap_or(Value::Text(text)),
                    Affinity::Timestamp => match parse_timestamp(&text) {
                        Some(ts) => Value::Timestamp(ts),
                        None => Value::Text(text),
                    },
                    Affinity::Boolean => match text.to_ascii_lowercase().as_str() {
                        "true" | "t" => Value::Boolean(true),
                        "false" | "f" => Value::Boolean(false),
                        _ => Value::Text(text),
                    },
                    Affinity::Other => Value::Text(text),
                }
            }
        }
    }
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn storage_class(raw: ValueRef<'_>) -> Option<&'static str> {
    match raw {
        ValueRef::Null => None,
        ValueRef::Integer(_) => Some("integer"),
        ValueRef::Real(_) => Some("real"),
        ValueRef::Text(_) => Some("text"),
        ValueRef::Blob(_) => Some("blob"),
    }
}
