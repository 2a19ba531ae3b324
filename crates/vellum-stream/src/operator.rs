use std::fmt;

use vellum_ast::{Expr, Projection};
use vellum_types::Path;

/// A logical value range on a scanned key path. The bound expressions are
/// evaluated when the scan starts (they may reference parameters) and encoded
/// with the key codec.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValueRange {
    pub min: Option<Expr>,
    pub max: Option<Expr>,
    pub min_exclusive: bool,
    pub max_exclusive: bool,
}

impl ValueRange {
    /// The exact-match range for an equality predicate.
    pub fn exactly(value: Expr) -> Self {
        Self {
            min: Some(value.clone()),
            max: Some(value),
            min_exclusive: false,
            max_exclusive: false,
        }
    }
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min_op = if self.min_exclusive { "<" } else { "<=" };
        let max_op = if self.max_exclusive { "<" } else { "<=" };
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => write!(f, "{min} {min_op} v {max_op} {max}"),
            (Some(min), None) => write!(f, "{min} {min_op} v"),
            (None, Some(max)) => write!(f, "v {max_op} {max}"),
            (None, None) => f.write_str("v"),
        }
    }
}

/// A pipeline node. Sources (`Emit`, the scans) must come first in a stream;
/// every other operator transforms or consumes the environments flowing
/// through it.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    /// Emit one environment per expression; seeds INSERT pipelines.
    Emit(Vec<Expr>),
    /// Emit each stored document of a table in key order.
    TableScan {
        table: String,
        range: Option<ValueRange>,
        reverse: bool,
    },
    /// Emit document keys from an index, fetching each document.
    IndexScan {
        index: String,
        range: Option<ValueRange>,
        reverse: bool,
    },
    /// Forward environments whose predicate is truthy.
    Filter(Expr),
    /// Replace the current document with an evaluated document expression.
    Map(Expr),
    /// Evaluate projections into a new document; `*` expands all fields.
    Project(Vec<Projection>),
    /// Materialize, stably sort by the key expression, re-emit.
    Sort { expr: Expr, desc: bool },
    /// Forward at most N environments, then stop the stream.
    Take(Expr),
    /// Drop the first N environments.
    Skip(Expr),
    /// Write an evaluated value at a path in the current document.
    PathSet { path: Path, expr: Expr },
    /// Remove the field at a path; no-op when missing.
    PathUnset(Path),
    /// Sink: insert the current document into a table.
    TableInsert(String),
    /// Sink: replace the current row (by its key) with the current document.
    TableReplace(String),
    /// Sink: delete the current row.
    TableDelete(String),
    /// Terminal sink that drops all environments, counting them.
    Discard,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Emit(exprs) => {
                f.write_str("docs.Emit(")?;
                for (i, expr) in exprs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{expr}")?;
                }
                f.write_str(")")
            }
            Self::TableScan {
                table,
                range,
                reverse,
            } => scan_form(f, "table.Scan", table, range, *reverse),
            Self::IndexScan {
                index,
                range,
                reverse,
            } => scan_form(f, "index.Scan", index, range, *reverse),
            Self::Filter(expr) => write!(f, "docs.Filter({expr})"),
            Self::Map(expr) => write!(f, "docs.Map({expr})"),
            Self::Project(projections) => {
                f.write_str("docs.Project(")?;
                for (i, projection) in projections.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{projection}")?;
                }
                f.write_str(")")
            }
            Self::Sort { expr, desc: false } => write!(f, "docs.Sort({expr})"),
            Self::Sort { expr, desc: true } => write!(f, "docs.Sort({expr}, desc)"),
            Self::Take(expr) => write!(f, "docs.Take({expr})"),
            Self::Skip(expr) => write!(f, "docs.Skip({expr})"),
            Self::PathSet { path, expr } => write!(f, "paths.Set({path}, {expr})"),
            Self::PathUnset(path) => write!(f, "paths.Unset({path})"),
            Self::TableInsert(table) => write!(f, "table.Insert({table})"),
            Self::TableReplace(table) => write!(f, "table.Replace({table})"),
            Self::TableDelete(table) => write!(f, "table.Delete({table})"),
            Self::Discard => f.write_str("discard()"),
        }
    }
}

fn scan_form(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    target: &str,
    range: &Option<ValueRange>,
    reverse: bool,
) -> fmt::Result {
    write!(f, "{name}({target}")?;
    if let Some(range) = range {
        write!(f, ", {range}")?;
    }
    if reverse {
        f.write_str(", reverse")?;
    }
    f.write_str(")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_ast::Expr;

    #[test]
    fn string_forms_are_stable() {
        let cases: Vec<(Operator, &str)> = vec![
            (
                Operator::Emit(vec![Expr::int(1), Expr::int(2)]),
                "docs.Emit(1, 2)",
            ),
            (
                Operator::TableScan {
                    table: "test".to_owned(),
                    range: None,
                    reverse: false,
                },
                "table.Scan(test)",
            ),
            (
                Operator::TableScan {
                    table: "test".to_owned(),
                    range: Some(ValueRange {
                        min: Some(Expr::int(5)),
                        max: Some(Expr::int(10)),
                        min_exclusive: false,
                        max_exclusive: true,
                    }),
                    reverse: true,
                },
                "table.Scan(test, 5 <= v < 10, reverse)",
            ),
            (
                Operator::IndexScan {
                    index: "idx_a".to_owned(),
                    range: Some(ValueRange::exactly(Expr::int(5))),
                    reverse: false,
                },
                "index.Scan(idx_a, 5 <= v <= 5)",
            ),
            (
                Operator::Filter(Expr::field("a").binary(vellum_ast::BinaryOp::Gt, Expr::int(2))),
                "docs.Filter(a > 2)",
            ),
            (Operator::Map(Expr::field("a")), "docs.Map(a)"),
            (
                Operator::Sort {
                    expr: Expr::field("a"),
                    desc: true,
                },
                "docs.Sort(a, desc)",
            ),
            (Operator::Take(Expr::int(10)), "docs.Take(10)"),
            (Operator::Skip(Expr::int(2)), "docs.Skip(2)"),
            (
                Operator::PathSet {
                    path: vellum_types::Path::field("a").with_field("b"),
                    expr: Expr::int(1),
                },
                "paths.Set(a.b, 1)",
            ),
            (
                Operator::PathUnset(vellum_types::Path::field("a")),
                "paths.Unset(a)",
            ),
            (
                Operator::TableInsert("test".to_owned()),
                "table.Insert(test)",
            ),
            (
                Operator::TableReplace("test".to_owned()),
                "table.Replace(test)",
            ),
            (
                Operator::TableDelete("test".to_owned()),
                "table.Delete(test)",
            ),
            (Operator::Discard, "discard()"),
        ];
        for (op, expected) in cases {
            assert_eq!(op.to_string(), expected);
        }
    }

    #[test]
    fn equivalent_constructions_are_equal() {
        let a = Operator::TableScan {
            table: "t".to_owned(),
            range: None,
            reverse: false,
        };
        let b = Operator::TableScan {
            table: "t".to_owned(),
            range: None,
            reverse: false,
        };
        assert_eq!(a, b);
        assert_ne!(a, Operator::Discard);
        assert_eq!(
            ValueRange::exactly(Expr::int(1)),
            ValueRange::exactly(Expr::int(1))
        );
    }
}
