//! Operator execution: each operator drives its upstream and pushes
//! environments into a sink callback.

use std::ops::Bound;

use vellum_ast::Expr;
use vellum_codec::encode_key;
use vellum_engine::{next_prefix, KeyRange};
use vellum_error::{Result, VellumError};
use vellum_expr::{eval, Environment};
use vellum_types::{Document, Value};

use crate::operator::{Operator, ValueRange};
use crate::StreamContext;

pub(crate) fn iterate_ops(
    ops: &[Operator],
    ctx: &StreamContext<'_>,
    base: &Environment,
    sink: &mut dyn FnMut(&Environment) -> Result<()>,
) -> Result<()> {
    let Some((op, upstream)) = ops.split_last() else {
        return sink(base);
    };
    match op {
        Operator::Emit(exprs) => {
            require_source(upstream)?;
            for expr in exprs {
                let doc = eval_document(expr, base)?;
                let env = base.with_document(doc);
                sink(&env)?;
            }
            Ok(())
        }
        Operator::TableScan {
            table,
            range,
            reverse,
        } => {
            require_source(upstream)?;
            let handle = ctx.tx.table(table)?;
            let key_range = resolve_range(range.as_ref(), base)?;
            for entry in handle.iter(key_range, *reverse)? {
                let (key, doc) = entry?;
                let env = base.with_row(key, doc);
                sink(&env)?;
            }
            Ok(())
        }
        Operator::IndexScan {
            index,
            range,
            reverse,
        } => {
            require_source(upstream)?;
            let idx = ctx.tx.index(index)?;
            let handle = ctx.tx.table(&idx.info.table)?;
            let key_range = resolve_range(range.as_ref(), base)?;
            for entry in idx.store.scan(key_range, *reverse)? {
                let (_, doc_key) = entry?;
                let doc = handle.get(&doc_key)?.ok_or_else(|| {
                    VellumError::corrupted("index entry points at a missing document")
                })?;
                let env = base.with_row(doc_key, doc);
                sink(&env)?;
            }
            Ok(())
        }
        Operator::Filter(pred) => iterate_ops(upstream, ctx, base, &mut |env| {
            if eval(pred, env)?.is_truthy() {
                sink(env)
            } else {
                Ok(())
            }
        }),
        Operator::Map(expr) => iterate_ops(upstream, ctx, base, &mut |env| {
            let doc = eval_document(expr, env)?;
            let out = env.with_document(doc);
            sink(&out)
        }),
        Operator::Project(projections) => iterate_ops(upstream, ctx, base, &mut |env| {
            let mut out = Document::new();
            for projection in projections {
                match &projection.expr {
                    Expr::Wildcard => {
                        if let Some(doc) = env.document() {
                            for (name, value) in doc.iter() {
                                out.push(name, value.clone());
                            }
                        }
                    }
                    expr => {
                        let value = eval(expr, env)?;
                        let name = projection
                            .alias
                            .clone()
                            .unwrap_or_else(|| expr.to_string());
                        out.push(name, value);
                    }
                }
            }
            let out_env = env.with_document(out);
            sink(&out_env)
        }),
        Operator::Sort { expr, desc } => {
            let mut rows: Vec<(Value, Environment)> = Vec::new();
            match iterate_ops(upstream, ctx, base, &mut |env| {
                let key = eval(expr, env)?;
                rows.push((key, env.clone()));
                Ok(())
            }) {
                Ok(()) | Err(VellumError::StreamClosed) => {}
                Err(err) => return Err(err),
            }
            // Stable in both directions: descending reverses the comparator,
            // not the rows.
            if *desc {
                rows.sort_by(|a, b| b.0.order_cmp(&a.0));
            } else {
                rows.sort_by(|a, b| a.0.order_cmp(&b.0));
            }
            for (_, env) in &rows {
                sink(env)?;
            }
            Ok(())
        }
        Operator::Take(expr) => {
            let n = eval_count(expr, base)?;
            if n == 0 {
                return Err(VellumError::StreamClosed);
            }
            let mut remaining = n;
            iterate_ops(upstream, ctx, base, &mut |env| {
                sink(env)?;
                remaining -= 1;
                if remaining == 0 {
                    Err(VellumError::StreamClosed)
                } else {
                    Ok(())
                }
            })
        }
        Operator::Skip(expr) => {
            let n = eval_count(expr, base)?;
            let mut seen = 0u64;
            iterate_ops(upstream, ctx, base, &mut |env| {
                if seen < n {
                    seen += 1;
                    Ok(())
                } else {
                    sink(env)
                }
            })
        }
        Operator::PathSet { path, expr } => iterate_ops(upstream, ctx, base, &mut |env| {
            let value = eval(expr, env)?;
            let mut doc = env.document().cloned().ok_or_else(no_document)?;
            doc.set_path(path, value)
                .map_err(|e| VellumError::type_error(e.to_string()))?;
            let out = env.with_document(doc);
            sink(&out)
        }),
        Operator::PathUnset(path) => iterate_ops(upstream, ctx, base, &mut |env| {
            let mut doc = env.document().cloned().ok_or_else(no_document)?;
            doc.unset_path(path);
            let out = env.with_document(doc);
            sink(&out)
        }),
        Operator::TableInsert(name) => {
            let table = ctx.tx.table(name)?;
            iterate_ops(upstream, ctx, base, &mut |env| {
                let doc = env.document().cloned().ok_or_else(no_document)?;
                let key = table.insert(&doc)?;
                *ctx.last_insert_key.borrow_mut() = Some(key.clone());
                let out = env.with_row(key, doc);
                sink(&out)
            })
        }
        Operator::TableReplace(name) => {
            let table = ctx.tx.table(name)?;
            iterate_ops(upstream, ctx, base, &mut |env| {
                let key = env.key().ok_or_else(no_key)?.to_vec();
                let doc = env.document().cloned().ok_or_else(no_document)?;
                table.replace(&key, &doc)?;
                sink(env)
            })
        }
        Operator::TableDelete(name) => {
            let table = ctx.tx.table(name)?;
            iterate_ops(upstream, ctx, base, &mut |env| {
                let key = env.key().ok_or_else(no_key)?.to_vec();
                table.delete(&key)?;
                sink(env)
            })
        }
        Operator::Discard => iterate_ops(upstream, ctx, base, &mut |_env| {
            ctx.discarded.set(ctx.discarded.get() + 1);
            Ok(())
        }),
    }
}

fn require_source(upstream: &[Operator]) -> Result<()> {
    if upstream.is_empty() {
        Ok(())
    } else {
        Err(VellumError::internal(
            "source operator must be first in the stream",
        ))
    }
}

fn no_document() -> VellumError {
    VellumError::internal("operator requires a current document")
}

fn no_key() -> VellumError {
    VellumError::internal("operator requires a stored row")
}

fn eval_document(expr: &Expr, env: &Environment) -> Result<Document> {
    match eval(expr, env)? {
        Value::Document(doc) => Ok(doc),
        other => Err(VellumError::type_error(format!(
            "expected a document, found {}",
            other.type_name()
        ))),
    }
}

fn eval_count(expr: &Expr, env: &Environment) -> Result<u64> {
    match eval(expr, env)? {
        Value::Int(n) if n >= 0 => Ok(n as u64),
        other => Err(VellumError::type_error(format!(
            "LIMIT/OFFSET must be a non-negative integer, found {other}"
        ))),
    }
}

/// Evaluate a logical value range into engine key bounds.
///
/// Non-unique index keys append the document key after the encoded value, so
/// bounds use `next_prefix` to cover every composite with the bound's value
/// prefix; the same bounds are exact for unique-index and primary-key scans.
fn resolve_range(range: Option<&ValueRange>, env: &Environment) -> Result<KeyRange> {
    let Some(range) = range else {
        return Ok(KeyRange::all());
    };
    let start = match &range.min {
        None => Bound::Unbounded,
        Some(expr) => {
            let encoded = encode_key(&eval(expr, env)?);
            if range.min_exclusive {
                match next_prefix(&encoded) {
                    Some(upper) => Bound::Included(upper),
                    // Nothing sorts above the bound: the range is empty.
                    None => {
                        return Ok(KeyRange::between(
                            Bound::Excluded(encoded.clone()),
                            Bound::Excluded(encoded),
                        ))
                    }
                }
            } else {
                Bound::Included(encoded)
            }
        }
    };
    let end = match &range.max {
        None => Bound::Unbounded,
        Some(expr) => {
            let encoded = encode_key(&eval(expr, env)?);
            if range.max_exclusive {
                Bound::Excluded(encoded)
            } else {
                match next_prefix(&encoded) {
                    Some(upper) => Bound::Excluded(upper),
                    None => Bound::Unbounded,
                }
            }
        }
    };
    Ok(KeyRange::between(start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Stream;
    use vellum_core::Database;
    use vellum_engine::MemoryEngine;
    use vellum_error::ErrorKind;
    use vellum_parser::{parse_expr_text, parse_path_text};
    use vellum_types::Path;

    fn open() -> Database {
        Database::new(Box::new(MemoryEngine::new())).unwrap()
    }

    fn collect_docs(stream: &Stream, ctx: &StreamContext<'_>) -> Result<Vec<Document>> {
        let mut docs = Vec::new();
        let base = Environment::default();
        stream.iterate(ctx, &base, &mut |env| {
            docs.push(env.document().cloned().expect("document expected"));
            Ok(())
        })?;
        Ok(docs)
    }

    fn doc(src: &str) -> Document {
        let expr = parse_expr_text(src).unwrap();
        match eval(&expr, &Environment::default()).unwrap() {
            Value::Document(d) => d,
            other => panic!("expected document, got {other}"),
        }
    }

    #[test]
    fn emit_map_filter_pipeline() {
        let db = open();
        let mut tx = db.begin(false).unwrap();
        {
            let ctx = StreamContext::new(&tx);
            let stream = Stream::new(Operator::Emit(vec![
                parse_expr_text("{a: 1}").unwrap(),
                parse_expr_text("{a: 2}").unwrap(),
            ]))
            .pipe(Operator::Map(parse_expr_text("{a: a + 1}").unwrap()))
            .pipe(Operator::Filter(parse_expr_text("a > 2").unwrap()));

            let docs = collect_docs(&stream, &ctx).unwrap();
            assert_eq!(docs, vec![doc("{a: 3}")]);
        }
        tx.rollback().unwrap();
    }

    #[test]
    fn set_creates_and_pads() {
        let db = open();
        let mut tx = db.begin(false).unwrap();
        {
            let ctx = StreamContext::new(&tx);
            let stream = Stream::new(Operator::Emit(vec![
                parse_expr_text("{a: [{}]}").unwrap(),
            ]))
            .pipe(Operator::PathSet {
                path: parse_path_text("a[0].b").unwrap(),
                expr: parse_expr_text("10").unwrap(),
            });
            let docs = collect_docs(&stream, &ctx).unwrap();
            assert_eq!(docs, vec![doc("{a: [{b: 10}]}")]);

            let stream = Stream::new(Operator::Emit(vec![parse_expr_text("{a: [1]}").unwrap()]))
                .pipe(Operator::PathSet {
                    path: parse_path_text("a[2]").unwrap(),
                    expr: parse_expr_text("10").unwrap(),
                });
            let docs = collect_docs(&stream, &ctx).unwrap();
            assert_eq!(docs, vec![doc("{a: [1, null, 10]}")]);
        }
        tx.rollback().unwrap();
    }

    #[test]
    fn unset_is_noop_when_missing() {
        let db = open();
        let mut tx = db.begin(false).unwrap();
        {
            let ctx = StreamContext::new(&tx);
            let stream = Stream::new(Operator::Emit(vec![
                parse_expr_text("{a: 1, b: 2}").unwrap(),
            ]))
            .pipe(Operator::PathUnset(Path::field("a")))
            .pipe(Operator::PathUnset(Path::field("zzz")));
            let docs = collect_docs(&stream, &ctx).unwrap();
            assert_eq!(docs, vec![doc("{b: 2}")]);
        }
        tx.rollback().unwrap();
    }

    #[test]
    fn sort_take_skip() {
        let db = open();
        let mut tx = db.begin(false).unwrap();
        {
            let ctx = StreamContext::new(&tx);
            let emit = Operator::Emit(vec![
                parse_expr_text("{a: 3}").unwrap(),
                parse_expr_text("{a: 1}").unwrap(),
                parse_expr_text("{a: 2}").unwrap(),
            ]);

            let stream = Stream::new(emit.clone()).pipe(Operator::Sort {
                expr: parse_expr_text("a").unwrap(),
                desc: false,
            });
            let docs = collect_docs(&stream, &ctx).unwrap();
            assert_eq!(docs, vec![doc("{a: 1}"), doc("{a: 2}"), doc("{a: 3}")]);

            let stream = Stream::new(emit.clone())
                .pipe(Operator::Sort {
                    expr: parse_expr_text("a").unwrap(),
                    desc: true,
                })
                .pipe(Operator::Skip(Expr::int(1)))
                .pipe(Operator::Take(Expr::int(1)));
            let docs = collect_docs(&stream, &ctx).unwrap();
            assert_eq!(docs, vec![doc("{a: 2}")]);

            // LIMIT 0 yields nothing without touching upstream.
            let stream = Stream::new(emit).pipe(Operator::Take(Expr::int(0)));
            let docs = collect_docs(&stream, &ctx).unwrap();
            assert!(docs.is_empty());
        }
        tx.rollback().unwrap();
    }

    #[test]
    fn fractional_limit_is_an_arithmetic_error() {
        let db = open();
        let mut tx = db.begin(false).unwrap();
        {
            let ctx = StreamContext::new(&tx);
            let stream = Stream::new(Operator::Emit(vec![parse_expr_text("{a: 1}").unwrap()]))
                .pipe(Operator::Take(parse_expr_text("0 % .5").unwrap()));
            let err = collect_docs(&stream, &ctx).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Arithmetic);
        }
        tx.rollback().unwrap();
    }

    #[test]
    fn insert_scan_and_discard() {
        let db = open();
        let mut tx = db.begin(true).unwrap();
        tx.create_table("test", None).unwrap();
        {
            let ctx = StreamContext::new(&tx);
            let stream = Stream::new(Operator::Emit(vec![
                parse_expr_text("{a: 1}").unwrap(),
                parse_expr_text("{a: 2}").unwrap(),
            ]))
            .pipe(Operator::TableInsert("test".to_owned()))
            .pipe(Operator::Discard);
            let docs = collect_docs(&stream, &ctx).unwrap();
            assert!(docs.is_empty());
            assert_eq!(ctx.discarded.get(), 2);
            assert!(ctx.last_insert_key.borrow().is_some());

            // Scan returns rows in insertion order.
            let ctx = StreamContext::new(&tx);
            let stream = Stream::new(Operator::TableScan {
                table: "test".to_owned(),
                range: None,
                reverse: false,
            });
            let docs = collect_docs(&stream, &ctx).unwrap();
            assert_eq!(docs, vec![doc("{a: 1}"), doc("{a: 2}")]);
        }
        tx.rollback().unwrap();
    }

    #[test]
    fn replace_and_delete_through_streams() {
        let db = open();
        let mut tx = db.begin(true).unwrap();
        tx.create_table("test", None).unwrap();
        {
            let ctx = StreamContext::new(&tx);
            let insert = Stream::new(Operator::Emit(vec![
                parse_expr_text("{a: 1}").unwrap(),
                parse_expr_text("{a: 2}").unwrap(),
                parse_expr_text("{a: 3}").unwrap(),
            ]))
            .pipe(Operator::TableInsert("test".to_owned()))
            .pipe(Operator::Discard);
            collect_docs(&insert, &ctx).unwrap();

            // UPDATE test SET a = 9 WHERE a >= 2
            let ctx = StreamContext::new(&tx);
            let update = Stream::new(Operator::TableScan {
                table: "test".to_owned(),
                range: None,
                reverse: false,
            })
            .pipe(Operator::Filter(parse_expr_text("a >= 2").unwrap()))
            .pipe(Operator::PathSet {
                path: Path::field("a"),
                expr: parse_expr_text("9").unwrap(),
            })
            .pipe(Operator::TableReplace("test".to_owned()))
            .pipe(Operator::Discard);
            collect_docs(&update, &ctx).unwrap();
            assert_eq!(ctx.discarded.get(), 2);

            // DELETE FROM test WHERE a = 1
            let ctx = StreamContext::new(&tx);
            let delete = Stream::new(Operator::TableScan {
                table: "test".to_owned(),
                range: None,
                reverse: false,
            })
            .pipe(Operator::Filter(parse_expr_text("a = 1").unwrap()))
            .pipe(Operator::TableDelete("test".to_owned()))
            .pipe(Operator::Discard);
            collect_docs(&delete, &ctx).unwrap();
            assert_eq!(ctx.discarded.get(), 1);

            let ctx = StreamContext::new(&tx);
            let scan = Stream::new(Operator::TableScan {
                table: "test".to_owned(),
                range: None,
                reverse: false,
            });
            let docs = collect_docs(&scan, &ctx).unwrap();
            assert_eq!(docs, vec![doc("{a: 9}"), doc("{a: 9}")]);
        }
        tx.rollback().unwrap();
    }

    #[test]
    fn index_scan_with_range() {
        let db = open();
        let mut tx = db.begin(true).unwrap();
        tx.create_table("test", None).unwrap();
        tx.create_index("idx_a", "test", Path::field("a"), false)
            .unwrap();
        {
            let ctx = StreamContext::new(&tx);
            let insert = Stream::new(Operator::Emit(
                (0..10)
                    .map(|i| parse_expr_text(&format!("{{a: {i}}}")).unwrap())
                    .collect(),
            ))
            .pipe(Operator::TableInsert("test".to_owned()))
            .pipe(Operator::Discard);
            collect_docs(&insert, &ctx).unwrap();

            let ctx = StreamContext::new(&tx);
            let scan = Stream::new(Operator::IndexScan {
                index: "idx_a".to_owned(),
                range: Some(ValueRange {
                    min: Some(Expr::int(3)),
                    max: Some(Expr::int(6)),
                    min_exclusive: true,
                    max_exclusive: false,
                }),
                reverse: false,
            });
            let docs = collect_docs(&scan, &ctx).unwrap();
            assert_eq!(
                docs,
                vec![doc("{a: 4}"), doc("{a: 5}"), doc("{a: 6}")]
            );
        }
        tx.rollback().unwrap();
    }

    #[test]
    fn stream_display_joins_operators() {
        let stream = Stream::new(Operator::TableScan {
            table: "t".to_owned(),
            range: None,
            reverse: false,
        })
        .pipe(Operator::Filter(parse_expr_text("a > 1").unwrap()))
        .pipe(Operator::Take(Expr::int(5)));
        assert_eq!(
            stream.to_string(),
            "table.Scan(t) | docs.Filter(a > 1) | docs.Take(5)"
        );
    }
}
