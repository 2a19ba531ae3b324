//! The planner: compiles each data statement into a stream.
//!
//! `SELECT` becomes `Scan → Filter → Sort → Skip → Take → Project`; when the
//! WHERE clause contains a usable conjunct on the primary key or a
//! single-path index, the leading full scan is replaced by a range scan and
//! the conjunct is dropped from the filter. There is no cost model: the
//! first matching conjunct wins, indexes are tried in name order.

use tracing::debug;
use vellum_ast::{
    BinaryOp, DeleteStatement, Direction, Expr, InsertSource, InsertStatement, SelectStatement,
    Statement, UpdateOp, UpdateStatement,
};
use vellum_core::Transaction;
use vellum_error::{Result, VellumError};
use vellum_stream::{Operator, Stream, ValueRange};
use vellum_types::Path;

/// Compile a data statement (`SELECT`, `INSERT`, `UPDATE`, `DELETE`) into a
/// stream. Other statements are handled directly by the executor.
pub fn plan_statement(tx: &Transaction, stmt: &Statement) -> Result<Stream> {
    match stmt {
        Statement::Select(select) => plan_select(tx, select),
        Statement::Insert(insert) => plan_insert(tx, insert),
        Statement::Update(update) => plan_update(tx, update),
        Statement::Delete(delete) => plan_delete(tx, delete),
        other => Err(VellumError::internal(format!(
            "statement cannot be planned as a stream: {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// SELECT
// ---------------------------------------------------------------------------

fn plan_select(tx: &Transaction, select: &SelectStatement) -> Result<Stream> {
    let mut stream;
    let mut sorted_by_scan = false;

    match &select.table {
        None => {
            // Expression-only SELECT: seed the pipeline with one empty
            // document.
            stream = Stream::new(Operator::Emit(vec![Expr::DocumentLiteral(vec![])]));
            if let Some(filter) = &select.filter {
                stream = stream.pipe(Operator::Filter(filter.clone()));
            }
        }
        Some(table) => {
            tx.table_info(table)?;
            let access = choose_access_path(tx, table, select)?;
            sorted_by_scan = access.sorted_by_scan;
            stream = Stream::new(access.source);
            if let Some(filter) = access.remaining_filter {
                stream = stream.pipe(Operator::Filter(filter));
            }
        }
    }

    if let Some(order_by) = &select.order_by {
        if !sorted_by_scan {
            stream = stream.pipe(Operator::Sort {
                expr: order_by.expr.clone(),
                desc: order_by.direction == Direction::Desc,
            });
        }
    }
    if let Some(offset) = &select.offset {
        stream = stream.pipe(Operator::Skip(offset.clone()));
    }
    if let Some(limit) = &select.limit {
        stream = stream.pipe(Operator::Take(limit.clone()));
    }
    stream = stream.pipe(Operator::Project(select.projections.clone()));
    Ok(stream)
}

struct AccessPath {
    source: Operator,
    remaining_filter: Option<Expr>,
    sorted_by_scan: bool,
}

/// One usable WHERE conjunct: `path <op> const` with op ∈ {=, >, >=, <, <=}.
struct IndexableConjunct {
    path: Path,
    range: ValueRange,
}

fn choose_access_path(
    tx: &Transaction,
    table: &str,
    select: &SelectStatement,
) -> Result<AccessPath> {
    let table_info = tx.table_info(table)?;
    let indexes = tx.indexes_of(table);
    let conjuncts = match &select.filter {
        Some(filter) => flatten_and(filter),
        None => Vec::new(),
    };

    let order_path = select.order_by.as_ref().and_then(|o| match &o.expr {
        Expr::Path(path) => Some(path.clone()),
        _ => None,
    });
    let order_desc = select
        .order_by
        .as_ref()
        .is_some_and(|o| o.direction == Direction::Desc);

    for (i, conjunct) in conjuncts.iter().enumerate() {
        let Some(indexable) = as_indexable(conjunct) else {
            continue;
        };

        let source = if table_info.primary_key.as_ref() == Some(&indexable.path) {
            Some(Operator::TableScan {
                table: table.to_owned(),
                range: Some(indexable.range.clone()),
                reverse: false,
            })
        } else {
            indexes
                .iter()
                .find(|idx| idx.path == indexable.path)
                .map(|idx| Operator::IndexScan {
                    index: idx.name.clone(),
                    range: Some(indexable.range.clone()),
                    reverse: false,
                })
        };

        if let Some(mut source) = source {
            // The scan emits in key order on the matched path: an ORDER BY
            // on the same path rides the scan instead of a Sort.
            let sorted_by_scan = order_path.as_ref() == Some(&indexable.path);
            if sorted_by_scan && order_desc {
                match &mut source {
                    Operator::TableScan { reverse, .. }
                    | Operator::IndexScan { reverse, .. } => *reverse = true,
                    _ => {}
                }
            }
            let mut rest: Vec<Expr> = conjuncts.clone();
            rest.remove(i);
            debug!(table, source = %source, "access path selected");
            return Ok(AccessPath {
                source,
                remaining_filter: recombine_and(rest),
                sorted_by_scan,
            });
        }
    }

    // No usable predicate: full scan, plus an ORDER BY ride-along when the
    // sort key is the primary key itself.
    let sorted_by_scan = order_path.is_some() && order_path == table_info.primary_key;
    Ok(AccessPath {
        source: Operator::TableScan {
            table: table.to_owned(),
            range: None,
            reverse: sorted_by_scan && order_desc,
        },
        remaining_filter: recombine_and(conjuncts),
        sorted_by_scan,
    })
}

/// Split an AND tree into its conjuncts.
fn flatten_and(expr: &Expr) -> Vec<Expr> {
    match expr {
        Expr::Binary {
            lhs,
            op: BinaryOp::And,
            rhs,
        } => {
            let mut out = flatten_and(lhs);
            out.extend(flatten_and(rhs));
            out
        }
        other => vec![other.clone()],
    }
}

/// Rebuild an AND tree from conjuncts; `None` when empty.
fn recombine_and(conjuncts: Vec<Expr>) -> Option<Expr> {
    conjuncts
        .into_iter()
        .reduce(|acc, next| acc.binary(BinaryOp::And, next))
}

/// A constant in the planner's sense: known before any row is read.
fn is_const(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Literal(_) | Expr::Positional(_) | Expr::Named(_)
    )
}

fn as_indexable(conjunct: &Expr) -> Option<IndexableConjunct> {
    let Expr::Binary { lhs, op, rhs } = conjunct else {
        return None;
    };
    // Normalize `const op path` to `path op' const`.
    let (path, op, value) = match (lhs.as_ref(), rhs.as_ref()) {
        (Expr::Path(path), value) if is_const(value) => (path.clone(), *op, value.clone()),
        (value, Expr::Path(path)) if is_const(value) => (path.clone(), flip(*op)?, value.clone()),
        _ => return None,
    };
    let range = match op {
        BinaryOp::Eq => ValueRange::exactly(value),
        BinaryOp::Gt => ValueRange {
            min: Some(value),
            min_exclusive: true,
            ..ValueRange::default()
        },
        BinaryOp::Ge => ValueRange {
            min: Some(value),
            ..ValueRange::default()
        },
        BinaryOp::Lt => ValueRange {
            max: Some(value),
            max_exclusive: true,
            ..ValueRange::default()
        },
        BinaryOp::Le => ValueRange {
            max: Some(value),
            ..ValueRange::default()
        },
        _ => return None,
    };
    Some(IndexableConjunct { path, range })
}

/// Mirror a comparison for operand swapping; `5 < a` means `a > 5`.
const fn flip(op: BinaryOp) -> Option<BinaryOp> {
    match op {
        BinaryOp::Eq => Some(BinaryOp::Eq),
        BinaryOp::Lt => Some(BinaryOp::Gt),
        BinaryOp::Le => Some(BinaryOp::Ge),
        BinaryOp::Gt => Some(BinaryOp::Lt),
        BinaryOp::Ge => Some(BinaryOp::Le),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// INSERT / UPDATE / DELETE
// ---------------------------------------------------------------------------

fn plan_insert(tx: &Transaction, insert: &InsertStatement) -> Result<Stream> {
    tx.table_info(&insert.table)?;
    let docs: Vec<Expr> = match &insert.source {
        InsertSource::Documents(docs) => docs.clone(),
        InsertSource::Tuples { fields, rows } => rows
            .iter()
            .map(|row| {
                Expr::DocumentLiteral(
                    fields
                        .iter()
                        .cloned()
                        .zip(row.iter().cloned())
                        .collect(),
                )
            })
            .collect(),
    };
    Ok(Stream::new(Operator::Emit(docs)).pipe(Operator::TableInsert(insert.table.clone())))
}

fn plan_update(tx: &Transaction, update: &UpdateStatement) -> Result<Stream> {
    tx.table_info(&update.table)?;
    let mut stream = Stream::new(Operator::TableScan {
        table: update.table.clone(),
        range: None,
        reverse: false,
    });
    if let Some(filter) = &update.filter {
        stream = stream.pipe(Operator::Filter(filter.clone()));
    }
    for op in &update.ops {
        stream = stream.pipe(match op {
            UpdateOp::Set { path, expr } => Operator::PathSet {
                path: path.clone(),
                expr: expr.clone(),
            },
            UpdateOp::Unset { path } => Operator::PathUnset(path.clone()),
        });
    }
    Ok(stream.pipe(Operator::TableReplace(update.table.clone())))
}

fn plan_delete(tx: &Transaction, delete: &DeleteStatement) -> Result<Stream> {
    tx.table_info(&delete.table)?;
    let mut stream = Stream::new(Operator::TableScan {
        table: delete.table.clone(),
        range: None,
        reverse: false,
    });
    if let Some(filter) = &delete.filter {
        stream = stream.pipe(Operator::Filter(filter.clone()));
    }
    Ok(stream.pipe(Operator::TableDelete(delete.table.clone())))
}
