//! Vellum: an embeddable SQL-like document database.
//!
//! Schemaless documents stored on an ordered key-value engine, queried with a
//! SQL dialect extended with path expressions into nested documents and
//! arrays:
//!
//! ```
//! use vellum::{Db, Param};
//!
//! let db = Db::open(":memory:").unwrap();
//! db.exec("CREATE TABLE users", &[]).unwrap();
//! db.exec(
//!     "INSERT INTO users VALUES {name: \"ada\", tags: [\"admin\"]}",
//!     &[],
//! )
//! .unwrap();
//!
//! let mut rows = db
//!     .query("SELECT name FROM users WHERE tags[0] = ?", &[Param::from("admin")])
//!     .unwrap();
//! let row = rows.next().unwrap();
//! assert_eq!(row.get_as::<String>(0).unwrap(), "ada");
//! rows.close().unwrap();
//! db.close().unwrap();
//! ```

mod db;
mod executor;
mod param;
mod rows;
mod scan;

pub use db::{Db, Tx};
pub use param::Param;
pub use rows::{ExecSummary, Row, Rows};
pub use scan::FromValue;

pub use vellum_codec::decode_key;
pub use vellum_engine::{CancelToken, Engine, MemoryEngine};
pub use vellum_error::{ErrorKind, Result, VellumError};
pub use vellum_types::{Document, Path, PathStep, Value};
