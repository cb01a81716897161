//! SQL cursor providers.

use crate::error::Result;
use crate::row::RowCursor;

/// Something that can run a query and hand back a cursor over its rows.
///
/// Every call returns an independent, fully owned cursor, so a caller can
/// hold the cursor of a mapping's main query while issuing derived join
/// queries against the same source.
pub trait SqlSource {
    /// Execute `query` and return its rows.
    fn execute(&self, query: &str) -> Result<RowCursor>;

    /// Short description of the source for log output.
    fn describe(&self) -> String {
        "sql source".to_string()
    }
}

impl<S: SqlSource + ?Sized> SqlSource for &S {
    fn execute(&self, query: &str) -> Result<RowCursor> {
        (**self).execute(query)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
