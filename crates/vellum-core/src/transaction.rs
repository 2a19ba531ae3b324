//! Transactions: an engine transaction plus a copy-on-write catalog overlay.
//!
//! Catalog mutations write records into the reserved catalog store of the
//! engine transaction and mutate the overlay; only a successful commit swaps
//! the overlay into the shared catalog. A transaction is single-threaded
//! from the caller's perspective.

use std::sync::{Arc, Weak};

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{Mutex, MutexGuard, RawRwLock};
use tracing::debug;
use vellum_codec::decode_document;
use vellum_engine::{CancelToken, EngineTx, KeyRange, Store};
use vellum_error::{Result, VellumError};
use vellum_types::Path;

use crate::catalog::{
    self, CatalogState, IndexInfo, TableInfo, CATALOG_STORE, SEQ_STORE,
};
use crate::database::DatabaseShared;
use crate::sequence::Sequence;
use crate::table::{index_put, IndexHandle, Table};
use crate::INTERNAL_PREFIX;

/// The database lock held for the lifetime of a transaction: exclusive for
/// writers, shared for readers. Held purely for its release-on-drop effect.
#[allow(dead_code)]
pub(crate) enum TxGuard {
    Read(ArcRwLockReadGuard<RawRwLock, ()>),
    Write(ArcRwLockWriteGuard<RawRwLock, ()>),
}

/// A transaction over the engine and the catalog.
pub struct Transaction {
    db: Weak<DatabaseShared>,
    engine_tx: Box<dyn EngineTx>,
    overlay: Mutex<CatalogState>,
    writable: bool,
    token: CancelToken,
    guard: Option<TxGuard>,
    done: bool,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("writable", &self.writable)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl Transaction {
    pub(crate) fn new(
        db: Weak<DatabaseShared>,
        engine_tx: Box<dyn EngineTx>,
        overlay: CatalogState,
        writable: bool,
        token: CancelToken,
        guard: Option<TxGuard>,
    ) -> Self {
        Self {
            db,
            engine_tx,
            overlay: Mutex::new(overlay),
            writable,
            token,
            guard,
            done: false,
        }
    }

    /// Whether this transaction may write.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// The cancellation token this transaction was started with.
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub(crate) fn require_writable(&self) -> Result<()> {
        self.check_open()?;
        if self.writable {
            Ok(())
        } else {
            Err(VellumError::ReadOnly)
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.done {
            Err(VellumError::TransactionDone)
        } else {
            Ok(())
        }
    }

    pub(crate) fn catalog_overlay(&self) -> MutexGuard<'_, CatalogState> {
        self.overlay.lock()
    }

    pub(crate) fn set_overlay(&self, state: CatalogState) {
        *self.overlay.lock() = state;
    }

    pub(crate) fn engine_tx(&self) -> &dyn EngineTx {
        self.engine_tx.as_ref()
    }

    /// Open an engine store by raw name.
    pub(crate) fn raw_store(&self, name: &str) -> Result<Box<dyn Store>> {
        self.check_open()?;
        self.engine_tx.store(name)
    }

    /// Create the reserved stores on first open.
    pub(crate) fn ensure_internal_stores(&self) -> Result<()> {
        for name in [CATALOG_STORE, SEQ_STORE] {
            match self.engine_tx.store(name) {
                Ok(_) => {}
                Err(VellumError::NoSuchStore { .. }) => {
                    self.engine_tx.create_store(name)?;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Catalog reads
    // -----------------------------------------------------------------------

    /// Definition of the named table.
    pub fn table_info(&self, name: &str) -> Result<TableInfo> {
        self.check_open()?;
        self.overlay.lock().table(name).cloned()
    }

    /// Definition of the named index.
    pub fn index_info(&self, name: &str) -> Result<IndexInfo> {
        self.check_open()?;
        self.overlay.lock().index(name).cloned()
    }

    /// All indexes on `table`, sorted by name.
    pub fn indexes_of(&self, table: &str) -> Vec<IndexInfo> {
        self.overlay
            .lock()
            .indexes_of(table)
            .into_iter()
            .cloned()
            .collect()
    }

    /// The named sequence.
    pub fn sequence(&self, name: &str) -> Result<Arc<Sequence>> {
        self.check_open()?;
        self.overlay.lock().sequence(name).cloned()
    }

    /// Names of all sequences, sorted.
    pub fn sequence_names(&self) -> Vec<String> {
        self.overlay.lock().sequence_names()
    }

    // -----------------------------------------------------------------------
    // Table and index handles
    // -----------------------------------------------------------------------

    /// Open a handle on a table, with the stores of all its indexes.
    pub fn table(&self, name: &str) -> Result<Table<'_>> {
        self.check_open()?;
        let (info, index_infos) = {
            let overlay = self.overlay.lock();
            let info = overlay.table(name)?.clone();
            let indexes: Vec<IndexInfo> =
                overlay.indexes_of(name).into_iter().cloned().collect();
            (info, indexes)
        };
        let store = self.engine_tx.store(&info.store_name())?;
        let mut indexes = Vec::with_capacity(index_infos.len());
        for idx in index_infos {
            let istore = self.engine_tx.store(&idx.store_name())?;
            indexes.push((idx, istore));
        }
        Ok(Table::new(self, info, store, indexes))
    }

    /// Open a handle on an index.
    pub fn index(&self, name: &str) -> Result<IndexHandle> {
        self.check_open()?;
        let info = self.overlay.lock().index(name)?.clone();
        let store = self.engine_tx.store(&info.store_name())?;
        Ok(IndexHandle { info, store })
    }

    // -----------------------------------------------------------------------
    // Catalog mutations
    // -----------------------------------------------------------------------

    /// Create a table. Tables without a primary key get a backing sequence
    /// for document keys.
    pub fn create_table(&self, name: &str, primary_key: Option<Path>) -> Result<TableInfo> {
        self.require_writable()?;
        let mut overlay = self.overlay.lock();
        if overlay.table(name).is_ok() {
            return Err(VellumError::TableExists {
                name: name.to_owned(),
            });
        }
        let id = overlay.allocate_id();
        let docid_seq = primary_key
            .is_none()
            .then(|| format!("{INTERNAL_PREFIX}docid_{id}"));
        let info = TableInfo {
            name: name.to_owned(),
            id,
            primary_key,
            docid_seq: docid_seq.clone(),
        };

        self.engine_tx.create_store(&info.store_name())?;
        let catalog_store = self.engine_tx.store(CATALOG_STORE)?;
        let (key, value) = catalog::table_record(&info);
        catalog_store.put(&key, &value)?;

        if let Some(seq_name) = docid_seq {
            let (key, value) = catalog::sequence_record(&seq_name);
            catalog_store.put(&key, &value)?;
            overlay.insert_sequence(Arc::new(Sequence::new(seq_name, 0)))?;
        }
        overlay.insert_table(info.clone())?;
        debug!(table = %name, id, "table created");
        Ok(info)
    }

    /// Drop a table, its indexes, and its backing sequence.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.require_writable()?;
        let mut overlay = self.overlay.lock();
        let info = overlay.remove_table(name)?;
        let catalog_store = self.engine_tx.store(CATALOG_STORE)?;

        self.engine_tx.drop_store(&info.store_name())?;
        catalog_store.delete(&catalog::table_record_key(name))?;

        let index_names: Vec<String> = overlay
            .indexes_of(name)
            .into_iter()
            .map(|idx| idx.name.clone())
            .collect();
        for index_name in index_names {
            let idx = overlay.remove_index(&index_name)?;
            self.engine_tx.drop_store(&idx.store_name())?;
            catalog_store.delete(&catalog::index_record_key(&index_name))?;
        }

        if let Some(seq_name) = &info.docid_seq {
            overlay.remove_sequence(seq_name)?;
            catalog_store.delete(&catalog::sequence_record_key(seq_name))?;
            let seq_store = self.engine_tx.store(SEQ_STORE)?;
            match seq_store.delete(seq_name.as_bytes()) {
                Ok(()) | Err(VellumError::KeyNotFound) => {}
                Err(err) => return Err(err),
            }
        }
        debug!(table = %name, "table dropped");
        Ok(())
    }

    /// Create an index and backfill it from the table's existing rows.
    pub fn create_index(
        &self,
        name: &str,
        table: &str,
        path: Path,
        unique: bool,
    ) -> Result<IndexInfo> {
        self.require_writable()?;
        let (info, table_store_name) = {
            let mut overlay = self.overlay.lock();
            if overlay.index(name).is_ok() {
                return Err(VellumError::IndexExists {
                    name: name.to_owned(),
                });
            }
            let table_info = overlay.table(table)?.clone();
            let id = overlay.allocate_id();
            let info = IndexInfo {
                name: name.to_owned(),
                id,
                table: table.to_owned(),
                path,
                unique,
            };
            overlay.insert_index(info.clone())?;
            (info, table_info.store_name())
        };

        let index_store = self.engine_tx.create_store(&info.store_name())?;
        let catalog_store = self.engine_tx.store(CATALOG_STORE)?;
        let (key, value) = catalog::index_record(&info);
        catalog_store.put(&key, &value)?;

        // Backfill from existing rows.
        let table_store = self.engine_tx.store(&table_store_name)?;
        for entry in table_store.scan(KeyRange::all(), false)? {
            let (row_key, bytes) = entry?;
            let doc = decode_document(&bytes)?;
            index_put(&info, index_store.as_ref(), &doc, &row_key)?;
        }
        debug!(index = %name, table = %table, unique, "index created");
        Ok(info)
    }

    /// Drop an index.
    pub fn drop_index(&self, name: &str) -> Result<()> {
        self.require_writable()?;
        let mut overlay = self.overlay.lock();
        let info = overlay.remove_index(name)?;
        self.engine_tx.drop_store(&info.store_name())?;
        let catalog_store = self.engine_tx.store(CATALOG_STORE)?;
        catalog_store.delete(&catalog::index_record_key(name))?;
        debug!(index = %name, "index dropped");
        Ok(())
    }

    /// Create a user sequence.
    pub fn create_sequence(&self, name: &str) -> Result<()> {
        self.require_writable()?;
        let mut overlay = self.overlay.lock();
        if overlay.sequence(name).is_ok() {
            return Err(VellumError::SequenceExists {
                name: name.to_owned(),
            });
        }
        let catalog_store = self.engine_tx.store(CATALOG_STORE)?;
        let (key, value) = catalog::sequence_record(name);
        catalog_store.put(&key, &value)?;
        overlay.insert_sequence(Arc::new(Sequence::new(name, 0)))?;
        debug!(sequence = %name, "sequence created");
        Ok(())
    }

    /// Drop a sequence and its persisted watermark.
    pub fn drop_sequence(&self, name: &str) -> Result<()> {
        self.require_writable()?;
        let mut overlay = self.overlay.lock();
        overlay.remove_sequence(name)?;
        let catalog_store = self.engine_tx.store(CATALOG_STORE)?;
        catalog_store.delete(&catalog::sequence_record_key(name))?;
        let seq_store = self.engine_tx.store(SEQ_STORE)?;
        match seq_store.delete(name.as_bytes()) {
            Ok(()) | Err(VellumError::KeyNotFound) => {}
            Err(err) => return Err(err),
        }
        debug!(sequence = %name, "sequence dropped");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Commit the transaction. A second close is an error.
    pub fn commit(&mut self) -> Result<()> {
        self.check_open()?;
        self.engine_tx.commit()?;
        self.done = true;
        if self.writable {
            if let Some(db) = self.db.upgrade() {
                db.catalog.install(self.overlay.lock().clone());
            }
        }
        self.guard.take();
        debug!(writable = self.writable, "transaction committed");
        Ok(())
    }

    /// Roll back the transaction. Idempotent: a second call is a no-op.
    pub fn rollback(&mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        let result = self.engine_tx.rollback();
        self.guard.take();
        debug!(writable = self.writable, "transaction rolled back");
        result
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.engine_tx.rollback();
            self.done = true;
        }
    }
}
