//! Canonical SQL formatting for AST nodes.
//!
//! The formatter emits SQL that re-parses to an identical tree: operator
//! precedence decides where parentheses go, floats always carry a decimal
//! point, and strings are double-quoted with escapes.

use std::fmt;

use crate::{
    CreateIndexStatement, CreateSequenceStatement, CreateTableStatement, DeleteStatement,
    Direction, Expr, InsertSource, InsertStatement, Literal, OrderBy, Projection, SelectStatement,
    Statement, UnaryOp, UpdateOp, UpdateStatement,
};

const PREC_NOT: u8 = 3;
const PREC_NEG: u8 = 7;
const PREC_PRIMARY: u8 = 8;

fn expr_precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Binary { op, .. } => op.precedence(),
        Expr::Unary {
            op: UnaryOp::Not, ..
        } => PREC_NOT,
        Expr::Unary {
            op: UnaryOp::Neg, ..
        } => PREC_NEG,
        _ => PREC_PRIMARY,
    }
}

fn fmt_expr(f: &mut fmt::Formatter<'_>, expr: &Expr, parent_prec: u8) -> fmt::Result {
    let prec = expr_precedence(expr);
    let parens = prec < parent_prec;
    if parens {
        f.write_str("(")?;
    }
    match expr {
        Expr::Literal(lit) => fmt_literal(f, lit)?,
        Expr::Path(path) => write!(f, "{path}")?,
        Expr::Wildcard => f.write_str("*")?,
        Expr::Positional(_) => f.write_str("?")?,
        Expr::Named(name) => write!(f, "${name}")?,
        Expr::Array(items) => {
            f.write_str("[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                fmt_expr(f, item, 0)?;
            }
            f.write_str("]")?;
        }
        Expr::DocumentLiteral(fields) => {
            f.write_str("{")?;
            for (i, (name, value)) in fields.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{name}: ")?;
                fmt_expr(f, value, 0)?;
            }
            f.write_str("}")?;
        }
        Expr::Unary { op, operand } => match op {
            UnaryOp::Neg => {
                f.write_str("-")?;
                // Force parens around a nested negation: `--x` would lex as
                // a comment.
                fmt_expr(f, operand, PREC_PRIMARY)?;
            }
            UnaryOp::Not => {
                f.write_str("NOT ")?;
                fmt_expr(f, operand, PREC_NOT)?;
            }
        },
        Expr::Binary { lhs, op, rhs } => {
            fmt_expr(f, lhs, prec)?;
            write!(f, " {} ", op.symbol())?;
            fmt_expr(f, rhs, prec + 1)?;
        }
        Expr::Call { name, args } => {
            write!(f, "{name}(")?;
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                fmt_expr(f, arg, 0)?;
            }
            f.write_str(")")?;
        }
    }
    if parens {
        f.write_str(")")?;
    }
    Ok(())
}

fn fmt_literal(f: &mut fmt::Formatter<'_>, lit: &Literal) -> fmt::Result {
    match lit {
        Literal::Null => f.write_str("NULL"),
        Literal::Bool(true) => f.write_str("true"),
        Literal::Bool(false) => f.write_str("false"),
        Literal::Int(i) => write!(f, "{i}"),
        Literal::Float(v) => {
            if v.fract() == 0.0 && v.is_finite() {
                write!(f, "{v:.1}")
            } else {
                write!(f, "{v}")
            }
        }
        Literal::Text(s) => {
            f.write_str("\"")?;
            for ch in s.chars() {
                match ch {
                    '"' => f.write_str("\\\"")?,
                    '\\' => f.write_str("\\\\")?,
                    '\n' => f.write_str("\\n")?,
                    '\t' => f.write_str("\\t")?,
                    '\r' => f.write_str("\\r")?,
                    other => write!(f, "{other}")?,
                }
            }
            f.write_str("\"")
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_expr(f, self, 0)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => f.write_str("ASC"),
            Self::Desc => f.write_str("DESC"),
        }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {alias}")?;
        }
        Ok(())
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.expr, self.direction)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateTable(stmt) => write!(f, "{stmt}"),
            Self::CreateIndex(stmt) => write!(f, "{stmt}"),
            Self::CreateSequence(stmt) => write!(f, "{stmt}"),
            Self::DropTable { name, if_exists } => {
                write!(f, "DROP TABLE {}{name}", if_exists_sql(*if_exists))
            }
            Self::DropIndex { name, if_exists } => {
                write!(f, "DROP INDEX {}{name}", if_exists_sql(*if_exists))
            }
            Self::DropSequence { name, if_exists } => {
                write!(f, "DROP SEQUENCE {}{name}", if_exists_sql(*if_exists))
            }
            Self::Insert(stmt) => write!(f, "{stmt}"),
            Self::Select(stmt) => write!(f, "{stmt}"),
            Self::Update(stmt) => write!(f, "{stmt}"),
            Self::Delete(stmt) => write!(f, "{stmt}"),
            Self::Begin { read_only: false } => f.write_str("BEGIN"),
            Self::Begin { read_only: true } => f.write_str("BEGIN READ ONLY"),
            Self::Commit => f.write_str("COMMIT"),
            Self::Rollback => f.write_str("ROLLBACK"),
            Self::Explain(inner) => write!(f, "EXPLAIN {inner}"),
        }
    }
}

fn if_exists_sql(if_exists: bool) -> &'static str {
    if if_exists {
        "IF EXISTS "
    } else {
        ""
    }
}

fn if_not_exists_sql(if_not_exists: bool) -> &'static str {
    if if_not_exists {
        "IF NOT EXISTS "
    } else {
        ""
    }
}

impl fmt::Display for CreateTableStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CREATE TABLE {}{}",
            if_not_exists_sql(self.if_not_exists),
            self.name
        )?;
        if let Some(pk) = &self.primary_key {
            write!(f, " ({pk} PRIMARY KEY)")?;
        }
        Ok(())
    }
}

impl fmt::Display for CreateIndexStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CREATE {}INDEX {}{} ON {} ({})",
            if self.unique { "UNIQUE " } else { "" },
            if_not_exists_sql(self.if_not_exists),
            self.name,
            self.table,
            self.path
        )
    }
}

impl fmt::Display for CreateSequenceStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CREATE SEQUENCE {}{}",
            if_not_exists_sql(self.if_not_exists),
            self.name
        )
    }
}

impl fmt::Display for InsertStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "INSERT INTO {}", self.table)?;
        match &self.source {
            InsertSource::Tuples { fields, rows } => {
                if !fields.is_empty() {
                    f.write_str(" (")?;
                    for (i, field) in fields.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        f.write_str(field)?;
                    }
                    f.write_str(")")?;
                }
                f.write_str(" VALUES ")?;
                for (i, row) in rows.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str("(")?;
                    for (j, value) in row.iter().enumerate() {
                        if j > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{value}")?;
                    }
                    f.write_str(")")?;
                }
                Ok(())
            }
            InsertSource::Documents(docs) => {
                f.write_str(" VALUES ")?;
                for (i, doc) in docs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{doc}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for SelectStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        for (i, projection) in self.projections.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{projection}")?;
        }
        if let Some(table) = &self.table {
            write!(f, " FROM {table}")?;
        }
        if let Some(filter) = &self.filter {
            write!(f, " WHERE {filter}")?;
        }
        if let Some(order_by) = &self.order_by {
            write!(f, " ORDER BY {order_by}")?;
        }
        if let Some(limit) = &self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        if let Some(offset) = &self.offset {
            write!(f, " OFFSET {offset}")?;
        }
        Ok(())
    }
}

impl fmt::Display for UpdateStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UPDATE {} ", self.table)?;
        let is_unset = matches!(self.ops.first(), Some(UpdateOp::Unset { .. }));
        f.write_str(if is_unset { "UNSET " } else { "SET " })?;
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match op {
                UpdateOp::Set { path, expr } => write!(f, "{path} = {expr}")?,
                UpdateOp::Unset { path } => write!(f, "{path}")?,
            }
        }
        if let Some(filter) = &self.filter {
            write!(f, " WHERE {filter}")?;
        }
        Ok(())
    }
}

impl fmt::Display for DeleteStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DELETE FROM {}", self.table)?;
        if let Some(filter) = &self.filter {
            write!(f, " WHERE {filter}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BinaryOp;
    use vellum_types::Path;

    #[test]
    fn binary_precedence_omits_redundant_parens() {
        // a + b * c needs no parentheses.
        let expr = Expr::field("a").binary(
            BinaryOp::Add,
            Expr::field("b").binary(BinaryOp::Mul, Expr::field("c")),
        );
        assert_eq!(expr.to_string(), "a + b * c");

        // (a + b) * c does.
        let expr = Expr::field("a")
            .binary(BinaryOp::Add, Expr::field("b"))
            .binary(BinaryOp::Mul, Expr::field("c"));
        assert_eq!(expr.to_string(), "(a + b) * c");
    }

    #[test]
    fn right_associative_grouping_keeps_parens() {
        // a - (b - c) must keep the parentheses.
        let expr = Expr::field("a").binary(
            BinaryOp::Sub,
            Expr::field("b").binary(BinaryOp::Sub, Expr::field("c")),
        );
        assert_eq!(expr.to_string(), "a - (b - c)");
    }

    #[test]
    fn nested_negation_is_parenthesized() {
        let expr = Expr::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(Expr::field("x")),
            }),
        };
        // `--x` would lex as a comment.
        assert_eq!(expr.to_string(), "-(-x)");
    }

    #[test]
    fn not_binds_below_comparison() {
        let expr = Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(Expr::field("a").binary(BinaryOp::Eq, Expr::int(1))),
        };
        assert_eq!(expr.to_string(), "NOT a = 1");
    }

    #[test]
    fn literals_format_canonically() {
        assert_eq!(Expr::Literal(Literal::Float(1.0)).to_string(), "1.0");
        assert_eq!(Expr::Literal(Literal::Float(2.5)).to_string(), "2.5");
        assert_eq!(Expr::Literal(Literal::Null).to_string(), "NULL");
        assert_eq!(
            Expr::text("say \"hi\"\n").to_string(),
            "\"say \\\"hi\\\"\\n\""
        );
    }

    #[test]
    fn document_and_array_literals() {
        let expr = Expr::DocumentLiteral(vec![
            ("a".to_owned(), Expr::int(1)),
            (
                "b".to_owned(),
                Expr::Array(vec![Expr::int(2), Expr::text("x")]),
            ),
        ]);
        assert_eq!(expr.to_string(), "{a: 1, b: [2, \"x\"]}");
    }

    #[test]
    fn select_statement_full_form() {
        let stmt = Statement::Select(SelectStatement {
            projections: vec![
                Projection {
                    expr: Expr::field("a"),
                    alias: Some("x".to_owned()),
                },
                Projection {
                    expr: Expr::Wildcard,
                    alias: None,
                },
            ],
            table: Some("t".to_owned()),
            filter: Some(Expr::field("a").binary(BinaryOp::Gt, Expr::int(5))),
            order_by: Some(OrderBy {
                expr: Expr::field("a"),
                direction: Direction::Desc,
            }),
            limit: Some(Expr::int(10)),
            offset: Some(Expr::int(2)),
        });
        assert_eq!(
            stmt.to_string(),
            "SELECT a AS x, * FROM t WHERE a > 5 ORDER BY a DESC LIMIT 10 OFFSET 2"
        );
    }

    #[test]
    fn update_set_and_unset_forms() {
        let set = Statement::Update(UpdateStatement {
            table: "t".to_owned(),
            ops: vec![UpdateOp::Set {
                path: Path::field("a").with_index(0),
                expr: Expr::int(1),
            }],
            filter: None,
        });
        assert_eq!(set.to_string(), "UPDATE t SET a[0] = 1");

        let unset = Statement::Update(UpdateStatement {
            table: "t".to_owned(),
            ops: vec![
                UpdateOp::Unset {
                    path: Path::field("a"),
                },
                UpdateOp::Unset {
                    path: Path::field("b"),
                },
            ],
            filter: None,
        });
        assert_eq!(unset.to_string(), "UPDATE t UNSET a, b");
    }

    #[test]
    fn create_table_with_primary_key() {
        let stmt = Statement::CreateTable(CreateTableStatement {
            name: "users".to_owned(),
            if_not_exists: true,
            primary_key: Some(Path::field("id")),
        });
        assert_eq!(
            stmt.to_string(),
            "CREATE TABLE IF NOT EXISTS users (id PRIMARY KEY)"
        );
    }

    #[test]
    fn insert_forms() {
        let tuples = Statement::Insert(InsertStatement {
            table: "t".to_owned(),
            source: InsertSource::Tuples {
                fields: vec!["a".to_owned(), "b".to_owned()],
                rows: vec![vec![Expr::int(1), Expr::int(2)]],
            },
        });
        assert_eq!(tuples.to_string(), "INSERT INTO t (a, b) VALUES (1, 2)");

        let docs = Statement::Insert(InsertStatement {
            table: "t".to_owned(),
            source: InsertSource::Documents(vec![Expr::DocumentLiteral(vec![(
                "a".to_owned(),
                Expr::int(1),
            )])]),
        });
        assert_eq!(docs.to_string(), "INSERT INTO t VALUES {a: 1}");
    }

    #[test]
    fn explain_wraps_statement() {
        let stmt = Statement::Explain(Box::new(Statement::Delete(DeleteStatement {
            table: "t".to_owned(),
            filter: None,
        })));
        assert_eq!(stmt.to_string(), "EXPLAIN DELETE FROM t");
    }
}
