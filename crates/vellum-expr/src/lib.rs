//! Expression evaluation against a row environment.
//!
//! An [`Environment`] carries the current document, the statement's parameter
//! bindings, and an optional outer scope. [`eval`] walks an AST expression
//! and produces a [`Value`], following SQL tri-valued logic: comparisons and
//! arithmetic involving Null yield Null, and only truthy predicate results
//! keep a row.

mod env;
mod eval;
mod functions;

pub use env::{Environment, Params};
pub use eval::eval;
