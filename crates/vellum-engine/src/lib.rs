//! Storage engine contract for Vellum, plus the in-memory reference engine.
//!
//! An engine is an ordered key-value store with transactions and namespaced
//! stores. Keys compare lexicographically. The database layer above
//! guarantees single-writer/multi-reader discipline; engines only need to
//! provide snapshot reads and atomic commit.

mod cancel;
mod memory;
mod range;

pub use cancel::CancelToken;
pub use memory::MemoryEngine;
pub use range::{next_prefix, KeyRange};

use vellum_error::Result;

/// A key/value pair produced by a scan.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// An ordered key-value storage engine.
pub trait Engine: Send + Sync {
    /// Begin a transaction. Writes through a non-writable transaction fail
    /// with `ReadOnly`. The token cancels in-progress operations.
    fn begin(&self, token: CancelToken, writable: bool) -> Result<Box<dyn EngineTx>>;

    /// Close the engine. Transactions begun before the close keep their
    /// snapshots; new `begin` calls fail.
    fn close(&self) -> Result<()>;
}

/// An engine-level transaction over namespaced stores.
pub trait EngineTx: Send {
    /// Open an existing store. Fails with `NoSuchStore` if absent.
    fn store(&self, name: &str) -> Result<Box<dyn Store>>;

    /// Create a new store. Fails with `StoreExists` if the name is taken.
    fn create_store(&self, name: &str) -> Result<Box<dyn Store>>;

    /// Drop a store and its contents. Fails with `NoSuchStore` if absent.
    fn drop_store(&self, name: &str) -> Result<()>;

    /// Make all writes of this transaction durable and visible.
    fn commit(&mut self) -> Result<()>;

    /// Discard all writes of this transaction.
    fn rollback(&mut self) -> Result<()>;
}

/// A single ordered keyspace inside a transaction.
pub trait Store: Send {
    /// Read the value stored under `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any existing value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key`. Fails with `KeyNotFound` if absent.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Iterate the keys inside `range` in lexicographic order (reversed when
    /// `reverse`). The iterator checks the cancellation token per item.
    fn scan(
        &self,
        range: KeyRange,
        reverse: bool,
    ) -> Result<Box<dyn Iterator<Item = Result<KeyValue>> + Send>>;
}
