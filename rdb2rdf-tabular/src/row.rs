//! Row-oriented result sets.
//!
//! A [`RowCursor`] is the materialized result of one query. It is
//! forward-scrollable and re-scannable: [`RowCursor::before_first`] rewinds it
//! so the same result can be hashed and then iterated again without a second
//! round-trip to the database.
//!
//! # Design
//!
//! - **Row storage**: values are kept per row, matching how mapping rules
//!   consume them (one subject per row)
//! - **Strongly typed**: every cell is a [`Value`], no `dyn Any`
//! - **Native type names**: each column keeps the type name reported by the
//!   source so literal datatypes can be derived from it
//! - **Two lookups**: by name (exact, then ASCII case-insensitive) and by
//!   1-based index

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Result, TabularError};

/// Column metadata for a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column label as returned by the query.
    pub name: String,
    /// Native type name reported by the source (e.g. `VARCHAR(20)`, `date`).
    pub type_name: String,
    /// Table the column was read from, when the source knows it.
    pub table: Option<String>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            table: None,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }
}

/// Schema for a result set.
#[derive(Debug, Clone)]
pub struct ResultSchema {
    /// Columns in select-list order.
    pub columns: Vec<ColumnInfo>,
    /// Exact lookup by name.
    name_to_index: HashMap<String, usize>,
    /// Fallback lookup by lowercased name.
    folded_to_index: HashMap<String, usize>,
}

impl ResultSchema {
    /// Create a schema from column definitions.
    ///
    /// When two columns share a label the first one wins, like JDBC-style
    /// lookups do.
    pub fn new(columns: Vec<ColumnInfo>) -> Self {
        let mut name_to_index = HashMap::with_capacity(columns.len());
        let mut folded_to_index = HashMap::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            name_to_index.entry(col.name.clone()).or_insert(i);
            folded_to_index
                .entry(col.name.to_ascii_lowercase())
                .or_insert(i);
        }

        Self {
            columns,
            name_to_index,
            folded_to_index,
        }
    }

    /// Get a column's 0-based position by name.
    #[inline]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index
            .get(name)
            .or_else(|| self.folded_to_index.get(&name.to_ascii_lowercase()))
            .copied()
    }

    /// Get column info by name.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.index_of(name).map(|i| &self.columns[i])
    }

    /// Native type name of a column.
    pub fn type_name(&self, name: &str) -> Option<&str> {
        self.column(name).map(|c| c.type_name.as_str())
    }

    /// Number of columns.
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Column names in select-list order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for values that can be written unquoted in SQL.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Real(_) | Value::Boolean(_))
    }

    /// Short tag naming the variant, used when hashing result sets.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Timestamp(_) => "timestamp",
        }
    }

    /// Lexical form of the value, or `None` for SQL NULL.
    ///
    /// Dates and timestamps use the XML Schema lexical forms and blobs are
    /// base64 encoded, so the result can be used directly as a typed literal.
    pub fn lexical(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Boolean(b) => Some(b.to_string()),
            Value::Integer(n) => Some(n.to_string()),
            Value::Real(n) => Some(format_real(*n)),
            Value::Text(s) => Some(s.clone()),
            Value::Blob(b) => Some(base64::engine::general_purpose::STANDARD.encode(b)),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::Time(t) => Some(t.format("%H:%M:%S%.f").to_string()),
            Value::Timestamp(ts) => Some(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lexical() {
            Some(s) => f.write_str(&s),
            None => f.write_str("NULL"),
        }
    }
}

/// Format a float so whole numbers keep a fractional part (`1.0`, not `1`).
fn format_real(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.1}")
    } else {
        n.to_string()
    }
}

/// Borrowed view of the row a cursor is positioned on.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    schema: &'a ResultSchema,
    values: &'a [Value],
}

impl<'a> Row<'a> {
    /// Value of a column by name, `None` if the column does not exist.
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        let values = self.values;
        self.schema.index_of(name).map(|i| &values[i])
    }

    /// Value of a column by 1-based index.
    pub fn get_index(&self, index: usize) -> Result<&'a Value> {
        if index == 0 || index > self.values.len() {
            return Err(TabularError::IndexOutOfRange {
                index,
                count: self.values.len(),
            });
        }
        let values = self.values;
        Ok(&values[index - 1])
    }

    /// Lexical value of a column; `Ok(None)` for NULL, error if absent.
    pub fn get_string(&self, name: &str) -> Result<Option<String>> {
        self.get(name)
            .map(Value::lexical)
            .ok_or_else(|| TabularError::ColumnNotFound(name.to_string()))
    }

    pub fn schema(&self) -> &'a ResultSchema {
        self.schema
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }
}

/// Materialized, re-scannable query result.
#[derive(Debug, Clone)]
pub struct RowCursor {
    schema: Arc<ResultSchema>,
    rows: Vec<Vec<Value>>,
    /// `None` before the first row, `Some(rows.len())` after the last.
    position: Option<usize>,
}

impl RowCursor {
    /// Create a cursor, validating that every row matches the schema width.
    pub fn new(schema: Arc<ResultSchema>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let width = schema.num_columns();
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(TabularError::Schema(format!(
                "Row {} has {} values, schema has {} columns",
                i,
                row.len(),
                width
            )));
        }

        Ok(Self {
            schema,
            rows,
            position: None,
        })
    }

    /// Rewind to before the first row.
    pub fn before_first(&mut self) {
        self.position = None;
    }

    /// Advance to the next row; returns `false` once the rows are exhausted.
    pub fn next(&mut self) -> bool {
        let next = self.position.map_or(0, |p| (p + 1).min(self.rows.len()));
        self.position = Some(next);
        next < self.rows.len()
    }

    /// The row the cursor is positioned on.
    pub fn row(&self) -> Result<Row<'_>> {
        match self.position {
            Some(p) if p < self.rows.len() => Ok(Row {
                schema: &self.schema,
                values: &self.rows[p],
            }),
            _ => Err(TabularError::NoCurrentRow),
        }
    }

    /// Value of a column in the current row by name.
    pub fn get(&self, name: &str) -> Result<&Value> {
        self.row()?
            .get(name)
            .ok_or_else(|| TabularError::ColumnNotFound(name.to_string()))
    }

    /// Value of a column in the current row by 1-based index.
    pub fn get_index(&self, index: usize) -> Result<&Value> {
        self.row()?.get_index(index)
    }

    pub fn schema(&self) -> &ResultSchema {
        &self.schema
    }

    /// Number of rows in the result.
    #[inline]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cursor() -> RowCursor {
        let schema = Arc::new(ResultSchema::new(vec![
            ColumnInfo::new("id", "INTEGER"),
            ColumnInfo::new("Name", "VARCHAR(40)"),
            ColumnInfo::new("born", "DATE"),
        ]));
        RowCursor::new(
            schema,
            vec![
                vec![
                    Value::Integer(1),
                    Value::Text("Alice".to_string()),
                    Value::Date(NaiveDate::from_ymd_opt(1990, 4, 2).unwrap()),
                ],
                vec![Value::Integer(2), Value::Null, Value::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_cursor_scrolls_and_rescans() {
        let mut cursor = sample_cursor();
        assert!(cursor.row().is_err());

        let mut ids = Vec::new();
        while cursor.next() {
            ids.push(cursor.get("id").unwrap().clone());
        }
        assert_eq!(ids, vec![Value::Integer(1), Value::Integer(2)]);
        assert!(!cursor.next());
        assert!(cursor.row().is_err());

        cursor.before_first();
        assert!(cursor.next());
        assert_eq!(cursor.get("id").unwrap(), &Value::Integer(1));
    }

    #[test]
    fn test_lookup_by_name_and_index() {
        let mut cursor = sample_cursor();
        cursor.next();

        assert_eq!(cursor.get("Name").unwrap(), &Value::Text("Alice".into()));
        // case-insensitive fallback
        assert_eq!(cursor.get("name").unwrap(), &Value::Text("Alice".into()));
        assert_eq!(cursor.get_index(1).unwrap(), &Value::Integer(1));
        assert!(matches!(
            cursor.get_index(4),
            Err(TabularError::IndexOutOfRange { index: 4, count: 3 })
        ));
        assert!(matches!(
            cursor.get("missing"),
            Err(TabularError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_row_get_string() {
        let mut cursor = sample_cursor();
        cursor.next();
        let row = cursor.row().unwrap();
        assert_eq!(row.get_string("born").unwrap(), Some("1990-04-02".to_string()));

        cursor.next();
        let row = cursor.row().unwrap();
        assert_eq!(row.get_string("Name").unwrap(), None);
    }

    #[test]
    fn test_row_width_mismatch_rejected() {
        let schema = Arc::new(ResultSchema::new(vec![ColumnInfo::new("id", "INTEGER")]));
        let err = RowCursor::new(schema, vec![vec![Value::Integer(1), Value::Null]]);
        assert!(matches!(err, Err(TabularError::Schema(_))));
    }

    #[test]
    fn test_value_lexical_forms() {
        assert_eq!(Value::Null.lexical(), None);
        assert_eq!(Value::Boolean(true).lexical(), Some("true".into()));
        assert_eq!(Value::Real(2.0).lexical(), Some("2.0".into()));
        assert_eq!(Value::Real(2.5).lexical(), Some("2.5".into()));
        assert_eq!(Value::Blob(b"hi".to_vec()).lexical(), Some("aGk=".into()));

        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(
            Value::Timestamp(ts).lexical(),
            Some("2024-01-01T10:30:00".into())
        );
    }
}
