//! Row streams produced by executed queries.
//!
//! The primary query is executed once. Its rows are held in a
//! [`BufferedStatement`] so external association loading can scan them for
//! keys and the result set factory can scan them again for hydration.
//! Each external association then wraps the stream in a
//! [`CallbackStatement`] that splices its rows in while the stream is read.

use std::fmt;
use std::sync::Arc;

use strata_core::{Record, Row};

/// Per-row decoration applied while a statement is read.
pub type RowInjector = Arc<dyn Fn(Record) -> Record + Send + Sync>;

/// A forward-only stream of flat result rows keyed by `Alias__column`.
pub trait Statement: Send {
    /// Next row, or `None` once exhausted.
    fn fetch(&mut self) -> Option<Record>;

    /// Number of rows the statement produced when it was executed.
    fn row_count(&self) -> usize;

    /// Labels of the selected columns, in select order.
    fn columns(&self) -> &[String];

    /// Remaining rows.
    fn fetch_all(&mut self) -> Vec<Record> {
        std::iter::from_fn(|| self.fetch()).collect()
    }

    /// Convert into a replayable statement, reading whatever is left.
    fn into_buffered(self: Box<Self>) -> BufferedStatement;
}

/// A fully materialized, rewindable statement.
#[derive(Debug, Clone, Default)]
pub struct BufferedStatement {
    columns: Vec<String>,
    rows: Vec<Record>,
    position: usize,
}

impl BufferedStatement {
    pub fn new(columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self {
            columns,
            rows,
            position: 0,
        }
    }

    /// Buffer the rows returned by a connection.
    ///
    /// `columns` is the select list of the executed query; it is used when no
    /// row came back to describe the column set.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let columns = rows.first().map_or(columns, |row| {
            row.column_names().map(str::to_string).collect()
        });
        Self::new(columns, rows.into_iter().map(Row::into_record).collect())
    }

    /// Every buffered row, regardless of the read position.
    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    /// Whether the column label was part of the executed select list.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Restart reading from the first row.
    pub fn rewind(&mut self) {
        self.position = 0;
    }
}

impl Statement for BufferedStatement {
    fn fetch(&mut self) -> Option<Record> {
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        row
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn into_buffered(self: Box<Self>) -> BufferedStatement {
        *self
    }
}

/// Applies a [`RowInjector`] to every row read from the wrapped statement.
pub struct CallbackStatement {
    inner: Box<dyn Statement>,
    callback: RowInjector,
}

impl CallbackStatement {
    pub fn new(inner: Box<dyn Statement>, callback: RowInjector) -> Self {
        Self { inner, callback }
    }
}

impl fmt::Debug for CallbackStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackStatement")
            .field("columns", &self.inner.columns())
            .field("row_count", &self.inner.row_count())
            .finish_non_exhaustive()
    }
}

impl Statement for CallbackStatement {
    fn fetch(&mut self) -> Option<Record> {
        self.inner.fetch().map(|row| (self.callback)(row))
    }

    fn row_count(&self) -> usize {
        self.inner.row_count()
    }

    fn columns(&self) -> &[String] {
        self.inner.columns()
    }

    fn into_buffered(mut self: Box<Self>) -> BufferedStatement {
        let columns = self.inner.columns().to_vec();
        let rows = self.fetch_all();
        BufferedStatement::new(columns, rows)
    }
}
