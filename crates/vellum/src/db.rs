use vellum_core::{Database, Transaction};
use vellum_engine::{Engine, MemoryEngine};
use vellum_error::{Result, VellumError};
use vellum_parser::parse_script;

use crate::executor;
use crate::param::Param;
use crate::rows::{ExecSummary, Rows};

/// A handle on an open database.
///
/// Cheap to clone; clones share the engine and catalog. `":memory:"` opens
/// the in-memory engine; on-disk engines plug in through [`Db::open_with`].
#[derive(Clone)]
pub struct Db {
    inner: Database,
}

impl Db {
    /// Open a database at `path`. Only `":memory:"` is supported by the
    /// built-in engine set.
    pub fn open(path: &str) -> Result<Self> {
        if path != ":memory:" {
            return Err(VellumError::engine(format!(
                "unsupported database path {path:?}: only \":memory:\" is built in, \
                 use Db::open_with for other engines"
            )));
        }
        Self::open_with(Box::new(MemoryEngine::new()))
    }

    /// Open a database over a caller-supplied engine.
    pub fn open_with(engine: Box<dyn Engine>) -> Result<Self> {
        Ok(Self {
            inner: Database::new(engine)?,
        })
    }

    /// Run a (possibly multi-statement) script and return the rows of its
    /// last statement.
    pub fn query(&self, sql: &str, params: &[Param]) -> Result<Rows> {
        let stmts = parse_script(sql)?;
        let (output, tx) = executor::run_script(&self.inner, &stmts, params)?;
        Ok(Rows::new(output.rows, tx))
    }

    /// Run a script and return its write summary, discarding rows.
    pub fn exec(&self, sql: &str, params: &[Param]) -> Result<ExecSummary> {
        let stmts = parse_script(sql)?;
        let (output, tx) = executor::run_script(&self.inner, &stmts, params)?;
        if let Some(mut tx) = tx {
            if tx.is_writable() {
                tx.commit()?;
            } else {
                tx.rollback()?;
            }
        }
        Ok(ExecSummary {
            rows_affected: output.rows_affected,
            last_insert_key: output.last_insert_key,
        })
    }

    /// Begin an explicit transaction.
    pub fn begin(&self, read_only: bool) -> Result<Tx> {
        Ok(Tx {
            tx: self.inner.begin(!read_only)?,
        })
    }

    /// Close the database: rolls back any attached transaction, flushes
    /// sequence state, and closes the engine.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

/// An explicit transaction. All queries run against its snapshot; writes
/// become durable at [`Tx::commit`].
#[derive(Debug)]
pub struct Tx {
    tx: Transaction,
}

impl Tx {
    /// Run a script within this transaction and return the rows of its last
    /// statement.
    pub fn query(&self, sql: &str, params: &[Param]) -> Result<Rows> {
        let stmts = parse_script(sql)?;
        let output = executor::run_in_tx(&self.tx, &stmts, params)?;
        Ok(Rows::new(output.rows, None))
    }

    /// Run a script within this transaction and return its write summary.
    pub fn exec(&self, sql: &str, params: &[Param]) -> Result<ExecSummary> {
        let stmts = parse_script(sql)?;
        let output = executor::run_in_tx(&self.tx, &stmts, params)?;
        Ok(ExecSummary {
            rows_affected: output.rows_affected,
            last_insert_key: output.last_insert_key,
        })
    }

    /// Commit the transaction.
    pub fn commit(mut self) -> Result<()> {
        self.tx.commit()
    }

    /// Roll back the transaction. Dropping an uncommitted transaction also
    /// rolls it back.
    pub fn rollback(mut self) -> Result<()> {
        self.tx.rollback()
    }
}
