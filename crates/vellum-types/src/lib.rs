//! Core data model for Vellum: dynamically-typed values, insertion-ordered
//! documents, and paths that navigate into them.
//!
//! Everything above this crate (codec, expressions, streams, storage) speaks
//! in terms of [`Value`], [`Document`], and [`Path`].

mod document;
mod path;
mod value;

pub use document::Document;
pub use path::{Path, PathStep, PathWriteError};
pub use value::{Value, ValueClass};
