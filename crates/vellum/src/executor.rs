//! The query executor: drives parsed statements in sequence, managing
//! per-statement transactions or a caller-supplied one.
//!
//! Without a supplied transaction each statement runs in its own, committed
//! (writable) or rolled back (read-only) before the next starts; the last
//! statement's transaction transfers to the returned result set. `BEGIN`
//! attaches a database-level transaction that subsequent statements reuse
//! until `COMMIT`/`ROLLBACK`.

use std::sync::Arc;

use tracing::debug;
use vellum_ast::Statement;
use vellum_core::{Database, Transaction};
use vellum_error::{Result, VellumError};
use vellum_expr::{Environment, Params};
use vellum_planner::plan_statement;
use vellum_stream::{Operator, StreamContext};
use vellum_types::Document;

use crate::param::{bind, Param};
use crate::rows::Row;

/// What one statement produced.
#[derive(Default)]
pub(crate) struct StmtOutput {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
    pub last_insert_key: Option<Vec<u8>>,
}

fn close_tx(tx: &mut Option<Transaction>) -> Result<()> {
    match tx.take() {
        Some(mut tx) if tx.is_writable() => tx.commit(),
        Some(mut tx) => tx.rollback(),
        None => Ok(()),
    }
}

/// Run a script with executor-owned transactions. Returns the last
/// statement's output and, when the last statement ran in its own
/// transaction, that transaction for the result set to close.
pub(crate) fn run_script(
    db: &Database,
    stmts: &[Statement],
    params: &[Param],
) -> Result<(StmtOutput, Option<Transaction>)> {
    let bindings = Arc::new(bind(params));
    let mut last = StmtOutput::default();
    let mut current: Option<Transaction> = None;

    for stmt in stmts {
        match stmt {
            Statement::Begin { read_only } => {
                close_tx(&mut current)?;
                if db.has_attached() {
                    return Err(VellumError::NestedTransaction);
                }
                let tx = db.begin(!*read_only)?;
                db.attach(tx)?;
                last = StmtOutput::default();
                continue;
            }
            Statement::Commit => {
                close_tx(&mut current)?;
                let mut tx = db
                    .take_attached()
                    .ok_or_else(|| VellumError::internal("no transaction in progress"))?;
                tx.commit()?;
                last = StmtOutput::default();
                continue;
            }
            Statement::Rollback => {
                close_tx(&mut current)?;
                let mut tx = db
                    .take_attached()
                    .ok_or_else(|| VellumError::internal("no transaction in progress"))?;
                tx.rollback()?;
                last = StmtOutput::default();
                continue;
            }
            _ => {}
        }

        if db.has_attached() {
            close_tx(&mut current)?;
            last = db.with_attached(|tx| {
                let tx = tx
                    .ok_or_else(|| VellumError::internal("attached transaction vanished"))?;
                execute_statement(tx, stmt, &bindings)
            })?;
            continue;
        }

        close_tx(&mut current)?;
        let mut tx = db.begin(!stmt.is_read_only())?;
        match execute_statement(&tx, stmt, &bindings) {
            Ok(output) => {
                last = output;
                current = Some(tx);
            }
            Err(err) => {
                let _ = tx.rollback();
                return Err(err);
            }
        }
    }
    Ok((last, current))
}

/// Run a script inside a caller-supplied transaction.
pub(crate) fn run_in_tx(
    tx: &Transaction,
    stmts: &[Statement],
    params: &[Param],
) -> Result<StmtOutput> {
    let bindings = Arc::new(bind(params));
    let mut last = StmtOutput::default();
    for stmt in stmts {
        match stmt {
            Statement::Begin { .. } => return Err(VellumError::NestedTransaction),
            Statement::Commit | Statement::Rollback => {
                return Err(VellumError::internal(
                    "cannot COMMIT or ROLLBACK a caller-supplied transaction",
                ))
            }
            _ => {}
        }
        last = execute_statement(tx, stmt, &bindings)?;
    }
    Ok(last)
}

fn execute_statement(
    tx: &Transaction,
    stmt: &Statement,
    params: &Arc<Params>,
) -> Result<StmtOutput> {
    if !tx.is_writable() && !stmt.is_read_only() {
        return Err(VellumError::ReadOnly);
    }
    debug!(statement = %stmt, "executing statement");

    match stmt {
        Statement::CreateTable(create) => {
            match tx.create_table(&create.name, create.primary_key.clone()) {
                Ok(_) => {}
                Err(VellumError::TableExists { .. }) if create.if_not_exists => {}
                Err(err) => return Err(err),
            }
            Ok(StmtOutput::default())
        }
        Statement::CreateIndex(create) => {
            match tx.create_index(&create.name, &create.table, create.path.clone(), create.unique)
            {
                Ok(_) => {}
                Err(VellumError::IndexExists { .. }) if create.if_not_exists => {}
                Err(err) => return Err(err),
            }
            Ok(StmtOutput::default())
        }
        Statement::CreateSequence(create) => {
            match tx.create_sequence(&create.name) {
                Ok(()) => {}
                Err(VellumError::SequenceExists { .. }) if create.if_not_exists => {}
                Err(err) => return Err(err),
            }
            Ok(StmtOutput::default())
        }
        Statement::DropTable { name, if_exists } => {
            match tx.drop_table(name) {
                Ok(()) => {}
                Err(VellumError::NoSuchTable { .. }) if *if_exists => {}
                Err(err) => return Err(err),
            }
            Ok(StmtOutput::default())
        }
        Statement::DropIndex { name, if_exists } => {
            match tx.drop_index(name) {
                Ok(()) => {}
                Err(VellumError::NoSuchIndex { .. }) if *if_exists => {}
                Err(err) => return Err(err),
            }
            Ok(StmtOutput::default())
        }
        Statement::DropSequence { name, if_exists } => {
            match tx.drop_sequence(name) {
                Ok(()) => {}
                Err(VellumError::NoSuchSequence { .. }) if *if_exists => {}
                Err(err) => return Err(err),
            }
            Ok(StmtOutput::default())
        }
        Statement::Select(_) => {
            let stream = plan_statement(tx, stmt)?;
            let ctx = StreamContext::new(tx);
            let env = Environment::with_params(Arc::clone(params));
            let mut rows = Vec::new();
            stream.iterate(&ctx, &env, &mut |env| {
                let doc = env.document().cloned().unwrap_or_default();
                rows.push(Row::new(doc));
                Ok(())
            })?;
            Ok(StmtOutput {
                rows,
                ..StmtOutput::default()
            })
        }
        Statement::Insert(_) | Statement::Update(_) | Statement::Delete(_) => {
            let stream = plan_statement(tx, stmt)?.pipe(Operator::Discard);
            let ctx = StreamContext::new(tx);
            let env = Environment::with_params(Arc::clone(params));
            stream.iterate(&ctx, &env, &mut |_| Ok(()))?;
            let last_insert_key = ctx.last_insert_key.borrow().clone();
            Ok(StmtOutput {
                rows: Vec::new(),
                rows_affected: ctx.discarded.get(),
                last_insert_key,
            })
        }
        Statement::Explain(inner) => {
            let stream = plan_statement(tx, inner)?;
            let mut doc = Document::new();
            doc.set("plan", stream.to_string());
            Ok(StmtOutput {
                rows: vec![Row::new(doc)],
                ..StmtOutput::default()
            })
        }
        Statement::Begin { .. } | Statement::Commit | Statement::Rollback => Err(
            VellumError::internal("transaction control must be handled by the executor"),
        ),
    }
}
