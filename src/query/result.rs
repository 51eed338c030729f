//! Query results

use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

/// Fully fetched text result set, consumed row by row.
///
/// A statement that returns no rows (an OK packet) yields an empty set with no
/// columns and the server's affected row count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    columns: Arc<[String]>,
    rows: VecDeque<Vec<Option<String>>>,
    affected_rows: u64,
}

impl ResultSet {
    /// Result set with rows
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self {
            columns: columns.into(),
            rows: rows.into(),
            affected_rows: 0,
        }
    }

    /// Result of a statement without a result set
    pub fn affected(affected_rows: u64) -> Self {
        Self {
            affected_rows,
            ..Default::default()
        }
    }

    /// Column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows affected by a statement without a result set
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// Rows not yet consumed
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether every row has been consumed (or there were none)
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Iterator for ResultSet {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.pop_front().map(|values| Row {
            columns: Arc::clone(&self.columns),
            values,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.rows.len(), Some(self.rows.len()))
    }
}

impl ExactSizeIterator for ResultSet {}

/// One row; values are text, `None` is SQL NULL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Option<String>>,
}

impl Row {
    /// Value at `index`; `None` for NULL or out of range
    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).and_then(|v| v.as_deref())
    }

    /// Value of the first column named `name`, compared case-insensitively
    pub fn get_by_name(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|i| self.get(i))
    }

    /// All values in column order
    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Terminal query failure as reported to the caller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct QueryError {
    /// `Query '<text>' failed: '<server message>'`
    pub message: String,
    /// Server error code, or the client code for connectivity failures
    pub code: u16,
}
