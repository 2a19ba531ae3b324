//! Recursive-descent parser: token stream → statement tree.
//!
//! One statement per semicolon-delimited command; empty statements are
//! discarded. `?` placeholders are numbered left to right within each
//! statement; `$name` placeholders bind by name.

use vellum_ast::{
    BinaryOp, CreateIndexStatement, CreateSequenceStatement, CreateTableStatement,
    DeleteStatement, Direction, Expr, InsertSource, InsertStatement, Literal, OrderBy, Projection,
    SelectStatement, Statement, UnaryOp, UpdateOp, UpdateStatement,
};
use vellum_error::{Result, VellumError};
use vellum_types::{Path, PathStep};

use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

/// Parse a multi-statement SQL script.
///
/// Runs of `;` produce no statements: `";;;"` yields an empty Vec.
pub fn parse_script(sql: &str) -> Result<Vec<Statement>> {
    Parser::new(sql).script()
}

/// Parse a single expression (no trailing input allowed).
pub fn parse_expr_text(src: &str) -> Result<Expr> {
    let mut parser = Parser::new(src);
    let expr = parser.expr()?;
    parser.expect_eof()?;
    Ok(expr)
}

/// Parse a single path like `a.b[2].c` (no trailing input allowed).
pub fn parse_path_text(src: &str) -> Result<Path> {
    let mut parser = Parser::new(src);
    let path = parser.path()?;
    parser.expect_eof()?;
    Ok(path)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Next 1-based ordinal for a `?` placeholder; reset per statement.
    next_ordinal: u32,
}

impl Parser {
    fn new(src: &str) -> Self {
        Self {
            tokens: Lexer::tokenize(src),
            pos: 0,
            next_ordinal: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Token plumbing
    // -----------------------------------------------------------------------

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_token(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Consume the next token if it matches `kind`.
    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error(format!(
                "expected {}, found {}",
                kind.describe(),
                self.peek().describe()
            )))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek() {
            TokenKind::Ident(_) => match self.advance().kind {
                TokenKind::Ident(name) => Ok(name),
                _ => unreachable!(),
            },
            other => Err(self.error(format!("expected identifier, found {}", other.describe()))),
        }
    }

    fn expect_eof(&mut self) -> Result<()> {
        if matches!(self.peek(), TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.error(format!("unexpected {}", self.peek().describe())))
        }
    }

    /// Syntax error pointing at the current token.
    fn error(&self, detail: impl Into<String>) -> VellumError {
        let token = self.peek_token();
        VellumError::syntax(token.line, token.col, detail)
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn script(&mut self) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            while self.eat(&TokenKind::Semicolon) {}
            if matches!(self.peek(), TokenKind::Eof) {
                break;
            }
            self.next_ordinal = 0;
            statements.push(self.statement()?);
            match self.peek() {
                TokenKind::Semicolon | TokenKind::Eof => {}
                other => {
                    return Err(self.error(format!(
                        "expected ';' or end of input, found {}",
                        other.describe()
                    )))
                }
            }
        }
        Ok(statements)
    }

    fn statement(&mut self) -> Result<Statement> {
        match self.peek() {
            TokenKind::KwCreate => self.create_statement(),
            TokenKind::KwDrop => self.drop_statement(),
            TokenKind::KwInsert => self.insert_statement(),
            TokenKind::KwSelect => self.select_statement(),
            TokenKind::KwUpdate => self.update_statement(),
            TokenKind::KwDelete => self.delete_statement(),
            TokenKind::KwBegin => self.begin_statement(),
            TokenKind::KwCommit => {
                self.advance();
                self.eat(&TokenKind::KwTransaction);
                Ok(Statement::Commit)
            }
            TokenKind::KwRollback => {
                self.advance();
                self.eat(&TokenKind::KwTransaction);
                Ok(Statement::Rollback)
            }
            TokenKind::KwExplain => self.explain_statement(),
            other => Err(self.error(format!("unexpected {}", other.describe()))),
        }
    }

    fn explain_statement(&mut self) -> Result<Statement> {
        self.advance(); // EXPLAIN
        let inner = self.statement()?;
        match inner {
            Statement::Select(_)
            | Statement::Insert(_)
            | Statement::Update(_)
            | Statement::Delete(_) => Ok(Statement::Explain(Box::new(inner))),
            _ => Err(self.error("EXPLAIN supports only SELECT, INSERT, UPDATE, and DELETE")),
        }
    }

    fn create_statement(&mut self) -> Result<Statement> {
        self.advance(); // CREATE
        match self.peek() {
            TokenKind::KwTable => {
                self.advance();
                let if_not_exists = self.if_not_exists()?;
                let name = self.expect_ident()?;
                let primary_key = if self.eat(&TokenKind::LParen) {
                    let path = self.path()?;
                    self.expect(&TokenKind::KwPrimary)?;
                    self.expect(&TokenKind::KwKey)?;
                    self.expect(&TokenKind::RParen)?;
                    Some(path)
                } else {
                    None
                };
                Ok(Statement::CreateTable(CreateTableStatement {
                    name,
                    if_not_exists,
                    primary_key,
                }))
            }
            TokenKind::KwUnique => {
                self.advance();
                self.expect(&TokenKind::KwIndex)?;
                self.create_index(true)
            }
            TokenKind::KwIndex => {
                self.advance();
                self.create_index(false)
            }
            TokenKind::KwSequence => {
                self.advance();
                let if_not_exists = self.if_not_exists()?;
                let name = self.expect_ident()?;
                Ok(Statement::CreateSequence(CreateSequenceStatement {
                    name,
                    if_not_exists,
                }))
            }
            other => Err(self.error(format!(
                "expected TABLE, INDEX, UNIQUE, or SEQUENCE, found {}",
                other.describe()
            ))),
        }
    }

    fn create_index(&mut self, unique: bool) -> Result<Statement> {
        let if_not_exists = self.if_not_exists()?;
        let name = self.expect_ident()?;
        self.expect(&TokenKind::KwOn)?;
        let table = self.expect_ident()?;
        self.expect(&TokenKind::LParen)?;
        let path = self.path()?;
        self.expect(&TokenKind::RParen)?;
        Ok(Statement::CreateIndex(CreateIndexStatement {
            name,
            if_not_exists,
            unique,
            table,
            path,
        }))
    }

    fn if_not_exists(&mut self) -> Result<bool> {
        if self.eat(&TokenKind::KwIf) {
            self.expect(&TokenKind::KwNot)?;
            self.expect(&TokenKind::KwExists)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn if_exists(&mut self) -> Result<bool> {
        if self.eat(&TokenKind::KwIf) {
            self.expect(&TokenKind::KwExists)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn drop_statement(&mut self) -> Result<Statement> {
        self.advance(); // DROP
        let kind = self.advance().kind;
        let if_exists = self.if_exists()?;
        let name = self.expect_ident()?;
        match kind {
            TokenKind::KwTable => Ok(Statement::DropTable { name, if_exists }),
            TokenKind::KwIndex => Ok(Statement::DropIndex { name, if_exists }),
            TokenKind::KwSequence => Ok(Statement::DropSequence { name, if_exists }),
            other => Err(self.error(format!(
                "expected TABLE, INDEX, or SEQUENCE, found {}",
                other.describe()
            ))),
        }
    }

    fn insert_statement(&mut self) -> Result<Statement> {
        self.advance(); // INSERT
        self.expect(&TokenKind::KwInto)?;
        let table = self.expect_ident()?;

        let fields = if self.eat(&TokenKind::LParen) {
            let mut fields = vec![self.expect_ident()?];
            while self.eat(&TokenKind::Comma) {
                fields.push(self.expect_ident()?);
            }
            self.expect(&TokenKind::RParen)?;
            fields
        } else {
            Vec::new()
        };

        self.expect(&TokenKind::KwValues)?;

        if matches!(self.peek(), TokenKind::LParen) {
            if fields.is_empty() {
                return Err(self.error("INSERT with tuple values requires a field list"));
            }
            let mut rows = vec![self.insert_tuple(fields.len())?];
            while self.eat(&TokenKind::Comma) {
                rows.push(self.insert_tuple(fields.len())?);
            }
            Ok(Statement::Insert(InsertStatement {
                table,
                source: InsertSource::Tuples { fields, rows },
            }))
        } else {
            if !fields.is_empty() {
                return Err(self.error("a field list requires tuple values"));
            }
            let mut docs = vec![self.expr()?];
            while self.eat(&TokenKind::Comma) {
                docs.push(self.expr()?);
            }
            Ok(Statement::Insert(InsertStatement {
                table,
                source: InsertSource::Documents(docs),
            }))
        }
    }

    fn insert_tuple(&mut self, arity: usize) -> Result<Vec<Expr>> {
        self.expect(&TokenKind::LParen)?;
        let mut row = vec![self.expr()?];
        while self.eat(&TokenKind::Comma) {
            row.push(self.expr()?);
        }
        self.expect(&TokenKind::RParen)?;
        if row.len() != arity {
            return Err(self.error(format!(
                "VALUES tuple has {} expressions but the field list has {arity}",
                row.len()
            )));
        }
        Ok(row)
    }

    fn select_statement(&mut self) -> Result<Statement> {
        self.advance(); // SELECT

        let mut projections = vec![self.projection()?];
        while self.eat(&TokenKind::Comma) {
            projections.push(self.projection()?);
        }

        let table = if self.eat(&TokenKind::KwFrom) {
            Some(self.expect_ident()?)
        } else {
            None
        };

        let filter = if self.eat(&TokenKind::KwWhere) {
            Some(self.expr()?)
        } else {
            None
        };

        let order_by = if self.eat(&TokenKind::KwOrder) {
            self.expect(&TokenKind::KwBy)?;
            let expr = self.expr()?;
            let direction = if self.eat(&TokenKind::KwDesc) {
                Direction::Desc
            } else {
                self.eat(&TokenKind::KwAsc);
                Direction::Asc
            };
            Some(OrderBy { expr, direction })
        } else {
            None
        };

        let limit = if self.eat(&TokenKind::KwLimit) {
            Some(self.expr()?)
        } else {
            None
        };

        let offset = if self.eat(&TokenKind::KwOffset) {
            Some(self.expr()?)
        } else {
            None
        };

        Ok(Statement::Select(SelectStatement {
            projections,
            table,
            filter,
            order_by,
            limit,
            offset,
        }))
    }

    fn projection(&mut self) -> Result<Projection> {
        if self.eat(&TokenKind::Star) {
            return Ok(Projection {
                expr: Expr::Wildcard,
                alias: None,
            });
        }
        let expr = self.expr()?;
        let alias = if self.eat(&TokenKind::KwAs) {
            Some(self.expect_ident()?)
        } else {
            None
        };
        Ok(Projection { expr, alias })
    }

    fn update_statement(&mut self) -> Result<Statement> {
        self.advance(); // UPDATE
        let table = self.expect_ident()?;

        let ops = match self.peek() {
            TokenKind::KwSet => {
                self.advance();
                let mut ops = vec![self.set_op()?];
                while self.eat(&TokenKind::Comma) {
                    ops.push(self.set_op()?);
                }
                ops
            }
            TokenKind::KwUnset => {
                self.advance();
                let mut ops = vec![UpdateOp::Unset { path: self.path()? }];
                while self.eat(&TokenKind::Comma) {
                    ops.push(UpdateOp::Unset { path: self.path()? });
                }
                ops
            }
            other => {
                return Err(self.error(format!(
                    "expected SET or UNSET, found {}",
                    other.describe()
                )))
            }
        };

        let filter = if self.eat(&TokenKind::KwWhere) {
            Some(self.expr()?)
        } else {
            None
        };

        Ok(Statement::Update(UpdateStatement { table, ops, filter }))
    }

    fn set_op(&mut self) -> Result<UpdateOp> {
        let path = self.path()?;
        self.expect(&TokenKind::Eq)?;
        let expr = self.expr()?;
        Ok(UpdateOp::Set { path, expr })
    }

    fn delete_statement(&mut self) -> Result<Statement> {
        self.advance(); // DELETE
        self.expect(&TokenKind::KwFrom)?;
        let table = self.expect_ident()?;
        let filter = if self.eat(&TokenKind::KwWhere) {
            Some(self.expr()?)
        } else {
            None
        };
        Ok(Statement::Delete(DeleteStatement { table, filter }))
    }

    fn begin_statement(&mut self) -> Result<Statement> {
        self.advance(); // BEGIN
        self.eat(&TokenKind::KwTransaction);
        let read_only = if self.eat(&TokenKind::KwRead) {
            self.expect(&TokenKind::KwOnly)?;
            true
        } else {
            false
        };
        Ok(Statement::Begin { read_only })
    }

    // -----------------------------------------------------------------------
    // Expressions (precedence low → high: OR, AND, NOT, comparison,
    // additive, multiplicative, unary minus, primary)
    // -----------------------------------------------------------------------

    fn expr(&mut self) -> Result<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.and_expr()?;
        while self.eat(&TokenKind::KwOr) {
            let rhs = self.and_expr()?;
            lhs = lhs.binary(BinaryOp::Or, rhs);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.not_expr()?;
        while self.eat(&TokenKind::KwAnd) {
            let rhs = self.not_expr()?;
            lhs = lhs.binary(BinaryOp::And, rhs);
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.eat(&TokenKind::KwNot) {
            let operand = self.not_expr()?;
            Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            })
        } else {
            self.cmp_expr()
        }
    }

    fn cmp_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.add_expr()?;
        loop {
            let op = match self.peek() {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::Neq => BinaryOp::Neq,
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                TokenKind::KwIn => BinaryOp::In,
                _ => break,
            };
            self.advance();
            let rhs = if op == BinaryOp::In && matches!(self.peek(), TokenKind::LParen) {
                // `a IN (1, 2, 3)` — sugar for an array literal.
                self.advance();
                let mut items = vec![self.expr()?];
                while self.eat(&TokenKind::Comma) {
                    items.push(self.expr()?);
                }
                self.expect(&TokenKind::RParen)?;
                Expr::Array(items)
            } else {
                self.add_expr()?
            };
            lhs = lhs.binary(op, rhs);
        }
        Ok(lhs)
    }

    fn add_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.mul_expr()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.mul_expr()?;
            lhs = lhs.binary(op, rhs);
        }
        Ok(lhs)
    }

    fn mul_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.unary_expr()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.unary_expr()?;
            lhs = lhs.binary(op, rhs);
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Result<Expr> {
        if self.eat(&TokenKind::Minus) {
            let operand = self.unary_expr()?;
            Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            })
        } else {
            self.primary()
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.peek().clone() {
            TokenKind::Int(v) => {
                self.advance();
                Ok(Expr::Literal(Literal::Int(v)))
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(Expr::Literal(Literal::Float(v)))
            }
            TokenKind::Text(s) => {
                self.advance();
                Ok(Expr::Literal(Literal::Text(s)))
            }
            TokenKind::KwTrue => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(true)))
            }
            TokenKind::KwFalse => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(false)))
            }
            TokenKind::KwNull => {
                self.advance();
                Ok(Expr::Literal(Literal::Null))
            }
            TokenKind::Question => {
                self.advance();
                self.next_ordinal += 1;
                Ok(Expr::Positional(self.next_ordinal))
            }
            TokenKind::Dollar(name) => {
                self.advance();
                Ok(Expr::Named(name))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if !matches!(self.peek(), TokenKind::RBracket) {
                    items.push(self.expr()?);
                    while self.eat(&TokenKind::Comma) {
                        items.push(self.expr()?);
                    }
                }
                self.expect(&TokenKind::RBracket)?;
                Ok(Expr::Array(items))
            }
            TokenKind::LBrace => self.document_literal(),
            TokenKind::Ident(name) => {
                self.advance();
                if matches!(self.peek(), TokenKind::LParen) {
                    self.advance();
                    let mut args = Vec::new();
                    if !matches!(self.peek(), TokenKind::RParen) {
                        args.push(self.expr()?);
                        while self.eat(&TokenKind::Comma) {
                            args.push(self.expr()?);
                        }
                    }
                    self.expect(&TokenKind::RParen)?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Path(self.path_tail(name)?))
                }
            }
            other => Err(self.error(format!("unexpected {}", other.describe()))),
        }
    }

    fn document_literal(&mut self) -> Result<Expr> {
        self.expect(&TokenKind::LBrace)?;
        let mut fields = Vec::new();
        if !matches!(self.peek(), TokenKind::RBrace) {
            loop {
                let key = match self.peek().clone() {
                    TokenKind::Ident(name) => {
                        self.advance();
                        name
                    }
                    TokenKind::Text(s) => {
                        self.advance();
                        s
                    }
                    other => {
                        return Err(self.error(format!(
                            "expected field name, found {}",
                            other.describe()
                        )))
                    }
                };
                self.expect(&TokenKind::Colon)?;
                let value = self.expr()?;
                fields.push((key, value));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Expr::DocumentLiteral(fields))
    }

    /// Parse a full path starting from the next token.
    fn path(&mut self) -> Result<Path> {
        let first = self.expect_ident()?;
        self.path_tail(first)
    }

    /// Parse the remaining steps of a path whose first field is known.
    fn path_tail(&mut self, first: String) -> Result<Path> {
        let mut steps = vec![PathStep::Field(first)];
        loop {
            if self.eat(&TokenKind::Dot) {
                steps.push(PathStep::Field(self.expect_ident()?));
            } else if matches!(self.peek(), TokenKind::LBracket) {
                self.advance();
                let idx = match self.peek().clone() {
                    TokenKind::Int(v) if v >= 0 => {
                        self.advance();
                        v as usize
                    }
                    other => {
                        return Err(self.error(format!(
                            "expected non-negative array index, found {}",
                            other.describe()
                        )))
                    }
                };
                self.expect(&TokenKind::RBracket)?;
                steps.push(PathStep::Index(idx));
            } else {
                return Ok(Path::new(steps));
            }
        }
    }
}
