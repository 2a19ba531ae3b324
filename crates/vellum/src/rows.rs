use std::collections::VecDeque;

use vellum_core::Transaction;
use vellum_error::{Result, VellumError};
use vellum_types::{Document, Value};

use crate::scan::FromValue;

/// One result row: the projected document of a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    doc: Document,
}

impl Row {
    pub(crate) fn new(doc: Document) -> Self {
        Self { doc }
    }

    /// Value of the column at `idx`, in projection order.
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.doc.iter().nth(idx).map(|(_, value)| value)
    }

    /// Convert the column at `idx` into a Rust destination type.
    pub fn get_as<T: FromValue>(&self, idx: usize) -> Result<T> {
        let value = self.get(idx).ok_or_else(|| {
            VellumError::type_error(format!("no column at index {idx}"))
        })?;
        T::from_value(value)
    }

    /// Value of the first column with the given name.
    pub fn column(&self, name: &str) -> Option<&Value> {
        self.doc.get(name)
    }

    /// Column names, in projection order.
    pub fn columns(&self) -> Vec<&str> {
        self.doc.iter().map(|(name, _)| name).collect()
    }

    /// The row as a document.
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Consume the row, keeping its document.
    pub fn into_document(self) -> Document {
        self.doc
    }
}

/// The result set of a query.
///
/// Owns the transaction of the last statement when the executor opened one;
/// [`Rows::close`] commits a writable transaction and rolls back a read-only
/// one. Dropping unclosed rows closes them, discarding any close error.
#[derive(Debug)]
pub struct Rows {
    rows: VecDeque<Row>,
    tx: Option<Transaction>,
    closed: bool,
}

impl Rows {
    pub(crate) fn new(rows: Vec<Row>, tx: Option<Transaction>) -> Self {
        Self {
            rows: rows.into(),
            tx,
            closed: false,
        }
    }

    /// The next row, front to back.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }

    /// Rows remaining.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no rows remain.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Close the result set and its owned transaction. Safe to call twice.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.tx.take() {
            Some(mut tx) if tx.is_writable() => tx.commit(),
            Some(mut tx) => tx.rollback(),
            None => Ok(()),
        }
    }
}

impl Drop for Rows {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl Iterator for Rows {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        Rows::next(self)
    }
}

/// Outcome of [`crate::Db::exec`]: rows affected plus the key generated by
/// the last insert, if any.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecSummary {
    pub(crate) rows_affected: u64,
    pub(crate) last_insert_key: Option<Vec<u8>>,
}

impl ExecSummary {
    /// Number of rows the statement touched.
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// Document key generated by the last `INSERT`, decodable with the key
    /// codec. The analogue of `LAST_INSERT_ID` for schemaless tables.
    pub fn last_insert_key(&self) -> Option<&[u8]> {
        self.last_insert_key.as_deref()
    }
}
