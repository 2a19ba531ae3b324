//! The stream execution model: a pull-based pipeline of operators.
//!
//! A [`Stream`] is a sequence of [`Operator`]s piped left to right. Execution
//! is a chain of synchronous callbacks: each operator drives its upstream and
//! pushes environments into a sink closure. `Take` stops iteration early by
//! returning the internal `StreamClosed` marker, which the stream driver
//! swallows. Every operator has a stable string form, and equivalent
//! constructions compare equal.

mod exec;
mod operator;

pub use operator::{Operator, ValueRange};

use std::cell::{Cell, RefCell};
use std::fmt;

use vellum_core::Transaction;
use vellum_error::{Result, VellumError};
use vellum_expr::Environment;

/// Execution context shared by the operators of one statement.
pub struct StreamContext<'a> {
    /// The transaction side effects go through.
    pub tx: &'a Transaction,
    /// Environments dropped by `discard()`; the affected-row count of write
    /// statements.
    pub discarded: Cell<u64>,
    /// Document key of the last insert, for `last_insert_key` reporting.
    pub last_insert_key: RefCell<Option<Vec<u8>>>,
}

impl<'a> StreamContext<'a> {
    /// A fresh context over `tx`.
    pub fn new(tx: &'a Transaction) -> Self {
        Self {
            tx,
            discarded: Cell::new(0),
            last_insert_key: RefCell::new(None),
        }
    }
}

/// A pipeline of operators.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stream {
    ops: Vec<Operator>,
}

impl Stream {
    /// A stream with a single source operator.
    pub fn new(source: Operator) -> Self {
        Self { ops: vec![source] }
    }

    /// Append an operator to the pipeline.
    #[must_use]
    pub fn pipe(mut self, op: Operator) -> Self {
        self.ops.push(op);
        self
    }

    /// The operators of this stream, in pipeline order.
    pub fn ops(&self) -> &[Operator] {
        &self.ops
    }

    /// Drive the pipeline, calling `sink` once per emitted environment.
    ///
    /// An early stop (LIMIT satisfied) terminates cleanly; real errors abort
    /// iteration and propagate.
    pub fn iterate(
        &self,
        ctx: &StreamContext<'_>,
        base: &Environment,
        sink: &mut dyn FnMut(&Environment) -> Result<()>,
    ) -> Result<()> {
        match exec::iterate_ops(&self.ops, ctx, base, sink) {
            Err(VellumError::StreamClosed) => Ok(()),
            other => other,
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{op}")?;
        }
        Ok(())
    }
}
