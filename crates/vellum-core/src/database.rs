//! The database: engine + catalog + locking discipline.
//!
//! Two locks govern concurrency: `txmu` (readers shared, one writer
//! exclusive, held for a transaction's lifetime) and the attached-transaction
//! slot mutex. The attached slot backs SQL `BEGIN … COMMIT`: while occupied,
//! no other transaction may start.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;
use vellum_engine::{CancelToken, Engine};
use vellum_error::{Result, VellumError};

use crate::catalog::{self, Catalog, CatalogState, SEQ_STORE};
use crate::transaction::{Transaction, TxGuard};

pub(crate) struct DatabaseShared {
    pub(crate) engine: Box<dyn Engine>,
    pub(crate) catalog: Catalog,
    pub(crate) txmu: Arc<RwLock<()>>,
    pub(crate) attached: Mutex<Option<Transaction>>,
}

/// A handle on an open database. Cheap to clone; all clones share the same
/// engine and catalog.
#[derive(Clone)]
pub struct Database {
    shared: Arc<DatabaseShared>,
}

impl Database {
    /// Open a database over `engine`, loading the catalog from the reserved
    /// namespace within a single transaction.
    pub fn new(engine: Box<dyn Engine>) -> Result<Self> {
        let db = Self {
            shared: Arc::new(DatabaseShared {
                engine,
                catalog: Catalog::default(),
                txmu: Arc::new(RwLock::new(())),
                attached: Mutex::new(None),
            }),
        };

        let mut tx = db.begin(true)?;
        tx.ensure_internal_stores()?;
        let state = catalog::load(tx.engine_tx())?;
        tx.set_overlay(state);
        tx.commit()?;
        debug!("database opened");
        Ok(db)
    }

    /// The committed catalog snapshot.
    pub fn catalog(&self) -> Arc<CatalogState> {
        self.shared.catalog.snapshot()
    }

    /// Begin a transaction with a fresh cancellation token.
    pub fn begin(&self, writable: bool) -> Result<Transaction> {
        self.begin_with(CancelToken::new(), writable)
    }

    /// Begin a transaction with an explicit cancellation token.
    ///
    /// Writers take `txmu` exclusively, readers share it; the guard is held
    /// for the transaction's lifetime. Fails with `NestedTransaction` while
    /// an attached transaction exists.
    pub fn begin_with(&self, token: CancelToken, writable: bool) -> Result<Transaction> {
        // Fail fast before blocking on txmu: an attached writable
        // transaction holds txmu for its whole lifetime.
        if self.has_attached() {
            return Err(VellumError::NestedTransaction);
        }
        let guard = if writable {
            TxGuard::Write(self.shared.txmu.write_arc())
        } else {
            TxGuard::Read(self.shared.txmu.read_arc())
        };
        if self.has_attached() {
            return Err(VellumError::NestedTransaction);
        }
        self.begin_locked(token, writable, Some(guard))
    }

    fn begin_locked(
        &self,
        token: CancelToken,
        writable: bool,
        guard: Option<TxGuard>,
    ) -> Result<Transaction> {
        let engine_tx = self.shared.engine.begin(token.clone(), writable)?;
        let overlay = (*self.shared.catalog.snapshot()).clone();
        debug!(writable, "transaction started");
        Ok(Transaction::new(
            Arc::downgrade(&self.shared),
            engine_tx,
            overlay,
            writable,
            token,
            guard,
        ))
    }

    // -----------------------------------------------------------------------
    // Attached transaction (SQL BEGIN … COMMIT)
    // -----------------------------------------------------------------------

    /// Park a transaction in the attached slot. The database owns it until
    /// [`Database::take_attached`] releases it.
    pub fn attach(&self, tx: Transaction) -> Result<()> {
        let mut slot = self.shared.attached.lock();
        if slot.is_some() {
            return Err(VellumError::NestedTransaction);
        }
        *slot = Some(tx);
        debug!("transaction attached");
        Ok(())
    }

    /// Take the attached transaction out of the slot, if any.
    pub fn take_attached(&self) -> Option<Transaction> {
        self.shared.attached.lock().take()
    }

    /// Whether an attached transaction exists.
    pub fn has_attached(&self) -> bool {
        self.shared.attached.lock().is_some()
    }

    /// Run `f` against the attached transaction while holding the slot.
    pub fn with_attached<R>(&self, f: impl FnOnce(Option<&Transaction>) -> R) -> R {
        let slot = self.shared.attached.lock();
        f(slot.as_ref())
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Close the database: roll back any attached transaction, release every
    /// sequence's unused cached range, and close the engine.
    pub fn close(&self) -> Result<()> {
        if let Some(mut tx) = self.take_attached() {
            let _ = tx.rollback();
        }

        let _guard = self.shared.txmu.write();

        // Transient writable transaction, engine-level: txmu is already held.
        let token = CancelToken::new();
        let mut engine_tx = self.shared.engine.begin(token, true)?;
        let seq_store = engine_tx.store(SEQ_STORE)?;
        let snapshot = self.shared.catalog.snapshot();
        for seq in snapshot.sequences() {
            seq.release(seq_store.as_ref())?;
        }
        engine_tx.commit()?;

        debug!("database closed");
        self.shared.engine.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_engine::MemoryEngine;
    use vellum_types::{Document, Path, Value};

    fn open() -> Database {
        Database::new(Box::new(MemoryEngine::new())).expect("open should succeed")
    }

    #[test]
    fn open_is_idempotent_over_reopen() {
        let engine = MemoryEngine::new();
        {
            let db = Database::new(Box::new(engine.clone())).unwrap();
            let mut tx = db.begin(true).unwrap();
            tx.create_table("test", None).unwrap();
            tx.commit().unwrap();
        }
        // Reopen over the same engine: catalog reloads from storage.
        let db = Database::new(Box::new(engine)).unwrap();
        let mut tx = db.begin(false).unwrap();
        assert!(tx.table_info("test").is_ok());
        tx.rollback().unwrap();
    }

    #[test]
    fn catalog_mutations_visible_only_after_commit() {
        let db = open();
        let mut tx = db.begin(true).unwrap();
        tx.create_table("t", None).unwrap();
        // Own writes are visible inside the transaction.
        assert!(tx.table_info("t").is_ok());
        tx.rollback().unwrap();

        // Rollback left the shared catalog unchanged.
        let mut tx = db.begin(false).unwrap();
        assert!(matches!(
            tx.table_info("t"),
            Err(VellumError::NoSuchTable { .. })
        ));
        tx.rollback().unwrap();

        let mut tx = db.begin(true).unwrap();
        tx.create_table("t", None).unwrap();
        tx.commit().unwrap();
        let mut tx = db.begin(false).unwrap();
        assert!(tx.table_info("t").is_ok());
        tx.rollback().unwrap();
    }

    #[test]
    fn create_existing_table_collides() {
        let db = open();
        let mut tx = db.begin(true).unwrap();
        tx.create_table("t", None).unwrap();
        assert!(matches!(
            tx.create_table("t", None),
            Err(VellumError::TableExists { .. })
        ));
        tx.rollback().unwrap();
    }

    #[test]
    fn insert_and_read_back() {
        let db = open();
        let mut tx = db.begin(true).unwrap();
        tx.create_table("t", None).unwrap();
        let table = tx.table("t").unwrap();
        let doc = Document::from_fields([("a", 1i64)]);
        let key = table.insert(&doc).unwrap();
        assert_eq!(table.get(&key).unwrap(), Some(doc));
        drop(table);
        tx.commit().unwrap();
    }

    #[test]
    fn primary_key_tables_reject_duplicates() {
        let db = open();
        let mut tx = db.begin(true).unwrap();
        tx.create_table("t", Some(Path::field("id"))).unwrap();
        let table = tx.table("t").unwrap();
        table
            .insert(&Document::from_fields([("id", 1i64)]))
            .unwrap();
        assert!(matches!(
            table.insert(&Document::from_fields([("id", 1i64)])),
            Err(VellumError::DuplicateKey)
        ));
        // Missing primary key is a type error.
        assert!(matches!(
            table.insert(&Document::from_fields([("x", 1i64)])),
            Err(VellumError::Type { .. })
        ));
        drop(table);
        tx.rollback().unwrap();
    }

    #[test]
    fn unique_index_rejects_duplicates() {
        let db = open();
        let mut tx = db.begin(true).unwrap();
        tx.create_table("t", None).unwrap();
        tx.create_index("idx_a", "t", Path::field("a"), true)
            .unwrap();
        let table = tx.table("t").unwrap();
        table.insert(&Document::from_fields([("a", 1i64)])).unwrap();
        assert!(matches!(
            table.insert(&Document::from_fields([("a", 1i64)])),
            Err(VellumError::DuplicateKey)
        ));
        // Rows without the indexed path are not indexed.
        table.insert(&Document::from_fields([("b", 9i64)])).unwrap();
        drop(table);
        tx.rollback().unwrap();
    }

    #[test]
    fn index_backfill_covers_existing_rows() {
        let db = open();
        let mut tx = db.begin(true).unwrap();
        tx.create_table("t", None).unwrap();
        let table = tx.table("t").unwrap();
        for i in 0..5i64 {
            table.insert(&Document::from_fields([("a", i)])).unwrap();
        }
        drop(table);
        tx.create_index("idx_a", "t", Path::field("a"), false)
            .unwrap();
        let index = tx.index("idx_a").unwrap();
        let entries: Vec<_> = index
            .store
            .scan(vellum_engine::KeyRange::all(), false)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(entries.len(), 5);
        tx.rollback().unwrap();
    }

    #[test]
    fn replace_and_delete_maintain_indexes() {
        let db = open();
        let mut tx = db.begin(true).unwrap();
        tx.create_table("t", None).unwrap();
        tx.create_index("idx_a", "t", Path::field("a"), false)
            .unwrap();
        let table = tx.table("t").unwrap();
        let key = table
            .insert(&Document::from_fields([("a", 1i64)]))
            .unwrap();
        table
            .replace(&key, &Document::from_fields([("a", 2i64)]))
            .unwrap();
        table.delete(&key).unwrap();
        drop(table);
        let index = tx.index("idx_a").unwrap();
        let entries: Vec<_> = index
            .store
            .scan(vellum_engine::KeyRange::all(), false)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert!(entries.is_empty(), "index must be empty after delete");
        tx.rollback().unwrap();
    }

    #[test]
    fn read_only_transaction_refuses_writes() {
        let db = open();
        let mut tx = db.begin(true).unwrap();
        tx.create_table("t", None).unwrap();
        tx.commit().unwrap();

        let mut tx = db.begin(false).unwrap();
        assert!(matches!(
            tx.create_table("x", None),
            Err(VellumError::ReadOnly)
        ));
        let table = tx.table("t").unwrap();
        assert!(matches!(
            table.insert(&Document::new()),
            Err(VellumError::ReadOnly)
        ));
        drop(table);
        tx.rollback().unwrap();
    }

    #[test]
    fn commit_after_close_is_error_rollback_is_noop() {
        let db = open();
        let mut tx = db.begin(true).unwrap();
        tx.commit().unwrap();
        assert!(matches!(tx.commit(), Err(VellumError::TransactionDone)));
        assert!(tx.rollback().is_ok());
        assert!(tx.rollback().is_ok());
    }

    #[test]
    fn attached_slot_refuses_second_transaction() {
        let db = open();
        let tx = db.begin(false).unwrap();
        db.attach(tx).unwrap();
        assert!(matches!(
            db.begin(false),
            Err(VellumError::NestedTransaction)
        ));
        let mut tx = db.take_attached().unwrap();
        tx.rollback().unwrap();
        assert!(db.begin(false).is_ok());
    }

    #[test]
    fn close_releases_sequences() {
        let engine = MemoryEngine::new();
        let db = Database::new(Box::new(engine.clone())).unwrap();
        let mut tx = db.begin(true).unwrap();
        tx.create_table("t", None).unwrap();
        let table = tx.table("t").unwrap();
        for i in 0..3i64 {
            table.insert(&Document::from_fields([("a", i)])).unwrap();
        }
        drop(table);
        tx.commit().unwrap();
        db.close().unwrap();

        // Reopen: the next document key continues from 4, not from the
        // 64-value lease boundary.
        engine.reopen();
        let db = Database::new(Box::new(engine)).unwrap();
        let mut tx = db.begin(true).unwrap();
        let table = tx.table("t").unwrap();
        let key = table
            .insert(&Document::from_fields([("a", 99i64)]))
            .unwrap();
        assert_eq!(
            vellum_codec::decode_key(&key).unwrap(),
            Value::Int(4)
        );
        drop(table);
        tx.commit().unwrap();
    }

    #[test]
    fn snapshot_isolation_for_readers() {
        let db = open();
        let mut setup = db.begin(true).unwrap();
        setup.create_table("t", None).unwrap();
        let table = setup.table("t").unwrap();
        table.insert(&Document::from_fields([("a", 1i64)])).unwrap();
        drop(table);
        setup.commit().unwrap();

        let reader = db.begin(false).unwrap();
        let count_before = {
            let table = reader.table("t").unwrap();
            let iter = table.iter(vellum_engine::KeyRange::all(), false).unwrap();
            iter.count()
        };
        drop(reader);

        let mut writer = db.begin(true).unwrap();
        let table = writer.table("t").unwrap();
        table.insert(&Document::from_fields([("a", 2i64)])).unwrap();
        drop(table);
        writer.commit().unwrap();

        assert_eq!(count_before, 1);
        let reader = db.begin(false).unwrap();
        let table = reader.table("t").unwrap();
        let count_after = table
            .iter(vellum_engine::KeyRange::all(), false)
            .unwrap()
            .count();
        assert_eq!(count_after, 2);
    }
}
