//! SQL front end for Vellum: a hand-written tokenizer and a recursive-descent
//! parser producing [`vellum_ast`] statement trees.
//!
//! Multi-statement scripts are separated by `;`; runs of semicolons are legal
//! and produce no statements. Syntax errors report the line and column of the
//! offending token.

mod lexer;
mod parser;
mod token;

pub use lexer::Lexer;
pub use parser::{parse_expr_text, parse_path_text, parse_script};
pub use token::{Token, TokenKind};
