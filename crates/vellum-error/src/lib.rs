//! Primary error type for Vellum operations.
//!
//! Structured variants for the common cases, with a stable [`ErrorKind`]
//! classification so callers can match on error categories without parsing
//! messages.

use thiserror::Error;

/// Primary error type for Vellum operations.
#[derive(Error, Debug)]
pub enum VellumError {
    // === SQL errors ===
    /// The parser rejected the input.
    #[error("syntax error at line {line}, column {col}: {detail}")]
    Syntax { line: u32, col: u32, detail: String },

    // === Missing objects ===
    /// No such table.
    #[error("no such table: {name}")]
    NoSuchTable { name: String },

    /// No such index.
    #[error("no such index: {name}")]
    NoSuchIndex { name: String },

    /// No such sequence.
    #[error("no such sequence: {name}")]
    NoSuchSequence { name: String },

    /// No such engine store.
    #[error("no such store: {name}")]
    NoSuchStore { name: String },

    /// No such scalar function.
    #[error("no such function: {name}")]
    NoSuchFunction { name: String },

    /// A key was absent from a store.
    #[error("key not found")]
    KeyNotFound,

    /// A stored document was absent.
    #[error("document not found")]
    DocumentNotFound,

    // === Creation collisions ===
    /// Table already exists.
    #[error("table {name} already exists")]
    TableExists { name: String },

    /// Index already exists.
    #[error("index {name} already exists")]
    IndexExists { name: String },

    /// Sequence already exists.
    #[error("sequence {name} already exists")]
    SequenceExists { name: String },

    /// Engine store already exists.
    #[error("store {name} already exists")]
    StoreExists { name: String },

    /// Another transaction is already attached to the database.
    #[error("cannot open a transaction within a transaction")]
    NestedTransaction,

    // === Constraint errors ===
    /// Primary-key or unique-index violation.
    #[error("duplicate document key")]
    DuplicateKey,

    // === Expression errors ===
    /// An expression operated on incompatible types.
    #[error("type error: {detail}")]
    Type { detail: String },

    /// Division or modulo by zero.
    #[error("division by zero")]
    DivideByZero,

    /// Checked integer arithmetic overflowed.
    #[error("integer overflow")]
    IntegerOverflow,

    // === Transaction errors ===
    /// A write reached a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// The transaction was already committed or rolled back.
    #[error("transaction has already been closed")]
    TransactionDone,

    // === Cancellation ===
    /// The cancellation token fired.
    #[error("operation canceled")]
    Canceled,

    // === Storage errors ===
    /// The underlying engine reported a failure.
    #[error("engine error: {detail}")]
    Engine { detail: String },

    /// File I/O error from an engine implementation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored bytes could not be decoded.
    #[error("corrupted record: {detail}")]
    Corrupted { detail: String },

    // === Internal ===
    /// Invariant violation (should never happen).
    #[error("internal error: {0}")]
    Internal(String),

    /// Stream control marker: iteration stopped early (LIMIT reached).
    /// Never surfaces to callers; swallowed by the stream driver.
    #[error("stream closed")]
    StreamClosed,
}

/// Stable, programmatically-distinguishable error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The parser rejected the input.
    Syntax,
    /// Table/index/sequence/document absent.
    NotFound,
    /// Creation collides with an existing object.
    AlreadyExists,
    /// Primary or unique-index violation.
    DuplicateKey,
    /// Expression operated on incompatible types.
    Type,
    /// Divide/mod by zero or checked overflow.
    Arithmetic,
    /// Write attempted on a read-only transaction.
    ReadOnly,
    /// Cancellation token fired.
    Canceled,
    /// Underlying storage reported a failure.
    Engine,
    /// Invariant violation.
    Internal,
}

impl VellumError {
    /// Classify this error into its stable [`ErrorKind`].
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Syntax { .. } => ErrorKind::Syntax,
            Self::NoSuchTable { .. }
            | Self::NoSuchIndex { .. }
            | Self::NoSuchSequence { .. }
            | Self::NoSuchStore { .. }
            | Self::NoSuchFunction { .. }
            | Self::KeyNotFound
            | Self::DocumentNotFound => ErrorKind::NotFound,
            Self::TableExists { .. }
            | Self::IndexExists { .. }
            | Self::SequenceExists { .. }
            | Self::StoreExists { .. }
            | Self::NestedTransaction => ErrorKind::AlreadyExists,
            Self::DuplicateKey => ErrorKind::DuplicateKey,
            Self::Type { .. } => ErrorKind::Type,
            Self::DivideByZero | Self::IntegerOverflow => ErrorKind::Arithmetic,
            Self::ReadOnly => ErrorKind::ReadOnly,
            Self::Canceled => ErrorKind::Canceled,
            Self::Engine { .. } | Self::Io(_) | Self::Corrupted { .. } => ErrorKind::Engine,
            Self::Internal(_) | Self::TransactionDone | Self::StreamClosed => ErrorKind::Internal,
        }
    }

    /// Create a syntax error with position information.
    pub fn syntax(line: u32, col: u32, detail: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            col,
            detail: detail.into(),
        }
    }

    /// Create a type error.
    pub fn type_error(detail: impl Into<String>) -> Self {
        Self::Type {
            detail: detail.into(),
        }
    }

    /// Create an engine error.
    pub fn engine(detail: impl Into<String>) -> Self {
        Self::Engine {
            detail: detail.into(),
        }
    }

    /// Create a corrupted-record error.
    pub fn corrupted(detail: impl Into<String>) -> Self {
        Self::Corrupted {
            detail: detail.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using [`VellumError`].
pub type Result<T> = std::result::Result<T, VellumError>;
