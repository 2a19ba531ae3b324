//! In-memory engine: one `BTreeMap` per store, snapshot semantics.
//!
//! A writable transaction clones the committed store map, mutates the clone,
//! and swaps it in atomically at commit. Read-only transactions share the
//! committed snapshot without copying. The database layer serializes writers,
//! so at most one working copy exists at a time.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;
use vellum_error::{Result, VellumError};

use crate::{CancelToken, Engine, EngineTx, KeyRange, KeyValue, Store};

type StoreData = BTreeMap<Vec<u8>, Vec<u8>>;
type StoreMap = HashMap<String, StoreData>;

struct Inner {
    committed: RwLock<Arc<StoreMap>>,
    closed: AtomicBool,
}

/// The in-memory reference engine.
#[derive(Clone)]
pub struct MemoryEngine {
    inner: Arc<Inner>,
}

impl MemoryEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                committed: RwLock::new(Arc::new(StoreMap::new())),
                closed: AtomicBool::new(false),
            }),
        }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Clear the closed flag, keeping all committed data.
    ///
    /// Models a process restart over the same storage: close the engine,
    /// reopen it, and verify what survived. Clones share the reopened state.
    pub fn reopen(&self) {
        self.inner.closed.store(false, Ordering::Release);
    }
}

impl Engine for MemoryEngine {
    fn begin(&self, token: CancelToken, writable: bool) -> Result<Box<dyn EngineTx>> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(VellumError::engine("engine is closed"));
        }
        token.check()?;
        let backing = if writable {
            let working = (**self.inner.committed.read()).clone();
            Backing::Working(Arc::new(Mutex::new(working)))
        } else {
            Backing::Snapshot(Arc::clone(&self.inner.committed.read()))
        };
        debug!(writable, "memory engine transaction started");
        Ok(Box::new(MemTx {
            engine: Arc::clone(&self.inner),
            backing,
            token,
            done: false,
        }))
    }

    fn close(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::Release);
        debug!("memory engine closed");
        Ok(())
    }
}

/// The data a transaction reads and writes through.
#[derive(Clone)]
enum Backing {
    /// Committed snapshot; immutable.
    Snapshot(Arc<StoreMap>),
    /// Private working copy of a writable transaction.
    Working(Arc<Mutex<StoreMap>>),
}

impl Backing {
    fn is_writable(&self) -> bool {
        matches!(self, Self::Working(_))
    }

    fn contains(&self, name: &str) -> bool {
        match self {
            Self::Snapshot(map) => map.contains_key(name),
            Self::Working(map) => map.lock().contains_key(name),
        }
    }
}

struct MemTx {
    engine: Arc<Inner>,
    backing: Backing,
    token: CancelToken,
    done: bool,
}

impl EngineTx for MemTx {
    fn store(&self, name: &str) -> Result<Box<dyn Store>> {
        self.token.check()?;
        if !self.backing.contains(name) {
            return Err(VellumError::NoSuchStore {
                name: name.to_owned(),
            });
        }
        Ok(Box::new(MemStore {
            backing: self.backing.clone(),
            name: name.to_owned(),
            token: self.token.clone(),
        }))
    }

    fn create_store(&self, name: &str) -> Result<Box<dyn Store>> {
        self.token.check()?;
        let Backing::Working(map) = &self.backing else {
            return Err(VellumError::ReadOnly);
        };
        {
            let mut map = map.lock();
            if map.contains_key(name) {
                return Err(VellumError::StoreExists {
                    name: name.to_owned(),
                });
            }
            map.insert(name.to_owned(), StoreData::new());
        }
        Ok(Box::new(MemStore {
            backing: self.backing.clone(),
            name: name.to_owned(),
            token: self.token.clone(),
        }))
    }

    fn drop_store(&self, name: &str) -> Result<()> {
        self.token.check()?;
        let Backing::Working(map) = &self.backing else {
            return Err(VellumError::ReadOnly);
        };
        if map.lock().remove(name).is_none() {
            return Err(VellumError::NoSuchStore {
                name: name.to_owned(),
            });
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.done {
            return Err(VellumError::TransactionDone);
        }
        self.done = true;
        if let Backing::Working(map) = &self.backing {
            let committed = std::mem::take(&mut *map.lock());
            *self.engine.committed.write() = Arc::new(committed);
            debug!("memory engine transaction committed");
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        // Idempotent: the working copy is simply dropped.
        self.done = true;
        Ok(())
    }
}

struct MemStore {
    backing: Backing,
    name: String,
    token: CancelToken,
}

impl MemStore {
    fn read<T>(&self, f: impl FnOnce(&StoreData) -> T) -> Result<T> {
        match &self.backing {
            Backing::Snapshot(map) => match map.get(&self.name) {
                Some(data) => Ok(f(data)),
                None => Err(self.missing()),
            },
            Backing::Working(map) => match map.lock().get(&self.name) {
                Some(data) => Ok(f(data)),
                None => Err(self.missing()),
            },
        }
    }

    fn write<T>(&self, f: impl FnOnce(&mut StoreData) -> T) -> Result<T> {
        let Backing::Working(map) = &self.backing else {
            return Err(VellumError::ReadOnly);
        };
        match map.lock().get_mut(&self.name) {
            Some(data) => Ok(f(data)),
            None => Err(self.missing()),
        }
    }

    fn missing(&self) -> VellumError {
        VellumError::NoSuchStore {
            name: self.name.clone(),
        }
    }
}

impl Store for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.token.check()?;
        self.read(|data| data.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.token.check()?;
        self.write(|data| {
            data.insert(key.to_vec(), value.to_vec());
        })
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.token.check()?;
        self.write(|data| data.remove(key))?
            .map(|_| ())
            .ok_or(VellumError::KeyNotFound)
    }

    fn scan(
        &self,
        range: KeyRange,
        reverse: bool,
    ) -> Result<Box<dyn Iterator<Item = Result<KeyValue>> + Send>> {
        self.token.check()?;
        let mut entries: Vec<KeyValue> = if range.is_empty_range() {
            Vec::new()
        } else {
            self.read(|data| {
                data.range((range.start.clone(), range.end.clone()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })?
        };
        if reverse {
            entries.reverse();
        }
        let token = self.token.clone();
        Ok(Box::new(entries.into_iter().map(move |kv| {
            token.check()?;
            Ok(kv)
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_all(store: &dyn Store, pairs: &[(&[u8], &[u8])]) {
        for (k, v) in pairs {
            store.put(k, v).unwrap();
        }
    }

    fn collect(store: &dyn Store, range: KeyRange, reverse: bool) -> Vec<Vec<u8>> {
        store
            .scan(range, reverse)
            .unwrap()
            .map(|r| r.unwrap().0)
            .collect()
    }

    #[test]
    fn writes_visible_after_commit_only() {
        let engine = MemoryEngine::new();
        let mut tx = engine.begin(CancelToken::new(), true).unwrap();
        let store = tx.create_store("s").unwrap();
        store.put(b"k", b"v").unwrap();

        // Not visible before the commit returns.
        let reader = engine.begin(CancelToken::new(), false).unwrap();
        assert!(reader.store("s").is_err());

        tx.commit().unwrap();
        let reader = engine.begin(CancelToken::new(), false).unwrap();
        assert_eq!(reader.store("s").unwrap().get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn rollback_discards_writes() {
        let engine = MemoryEngine::new();
        let mut tx = engine.begin(CancelToken::new(), true).unwrap();
        tx.create_store("s").unwrap();
        tx.rollback().unwrap();
        // Idempotent double rollback.
        tx.rollback().unwrap();

        let reader = engine.begin(CancelToken::new(), false).unwrap();
        assert!(reader.store("s").is_err());
    }

    #[test]
    fn commit_twice_is_an_error() {
        let engine = MemoryEngine::new();
        let mut tx = engine.begin(CancelToken::new(), true).unwrap();
        tx.commit().unwrap();
        assert!(matches!(tx.commit(), Err(VellumError::TransactionDone)));
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let engine = MemoryEngine::new();
        let mut setup = engine.begin(CancelToken::new(), true).unwrap();
        setup.create_store("s").unwrap().put(b"k", b"old").unwrap();
        setup.commit().unwrap();

        let reader = engine.begin(CancelToken::new(), false).unwrap();
        let reader_store = reader.store("s").unwrap();

        let mut writer = engine.begin(CancelToken::new(), true).unwrap();
        writer.store("s").unwrap().put(b"k", b"new").unwrap();
        writer.commit().unwrap();

        // The old snapshot is unchanged.
        assert_eq!(reader_store.get(b"k").unwrap(), Some(b"old".to_vec()));
        let fresh = engine.begin(CancelToken::new(), false).unwrap();
        assert_eq!(
            fresh.store("s").unwrap().get(b"k").unwrap(),
            Some(b"new".to_vec())
        );
    }

    #[test]
    fn read_only_transaction_rejects_writes() {
        let engine = MemoryEngine::new();
        let mut setup = engine.begin(CancelToken::new(), true).unwrap();
        setup.create_store("s").unwrap();
        setup.commit().unwrap();

        let reader = engine.begin(CancelToken::new(), false).unwrap();
        assert!(matches!(
            reader.create_store("t"),
            Err(VellumError::ReadOnly)
        ));
        let store = reader.store("s").unwrap();
        assert!(matches!(store.put(b"k", b"v"), Err(VellumError::ReadOnly)));
        assert!(matches!(store.delete(b"k"), Err(VellumError::ReadOnly)));
    }

    #[test]
    fn delete_missing_key_is_not_found() {
        let engine = MemoryEngine::new();
        let mut tx = engine.begin(CancelToken::new(), true).unwrap();
        let store = tx.create_store("s").unwrap();
        assert!(matches!(store.delete(b"k"), Err(VellumError::KeyNotFound)));
        tx.rollback().unwrap();
    }

    #[test]
    fn scan_respects_range_and_direction() {
        let engine = MemoryEngine::new();
        let mut tx = engine.begin(CancelToken::new(), true).unwrap();
        let store = tx.create_store("s").unwrap();
        put_all(
            store.as_ref(),
            &[
                (b"a".as_slice(), b"1".as_slice()),
                (b"b".as_slice(), b"2".as_slice()),
                (b"c".as_slice(), b"3".as_slice()),
                (b"d".as_slice(), b"4".as_slice()),
            ],
        );

        assert_eq!(
            collect(store.as_ref(), KeyRange::all(), false),
            vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]
        );
        assert_eq!(
            collect(store.as_ref(), KeyRange::all(), true),
            vec![b"d".to_vec(), b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]
        );
        assert_eq!(
            collect(store.as_ref(), KeyRange::at_least(b"b".to_vec()), false),
            vec![b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]
        );
        assert_eq!(
            collect(store.as_ref(), KeyRange::at_most(b"b".to_vec()), false),
            vec![b"a".to_vec(), b"b".to_vec()]
        );
        tx.rollback().unwrap();
    }

    #[test]
    fn prefix_scan_stops_at_prefix_boundary() {
        let engine = MemoryEngine::new();
        let mut tx = engine.begin(CancelToken::new(), true).unwrap();
        let store = tx.create_store("s").unwrap();
        put_all(
            store.as_ref(),
            &[
                (b"ab".as_slice(), b"1".as_slice()),
                (b"ab\x00".as_slice(), b"2".as_slice()),
                (b"ac".as_slice(), b"3".as_slice()),
            ],
        );
        assert_eq!(
            collect(store.as_ref(), KeyRange::prefix(b"ab".to_vec()), false),
            vec![b"ab".to_vec(), b"ab\x00".to_vec()]
        );
        tx.rollback().unwrap();
    }

    #[test]
    fn canceled_token_stops_operations() {
        let engine = MemoryEngine::new();
        let token = CancelToken::new();
        let mut tx = engine.begin(token.clone(), true).unwrap();
        let store = tx.create_store("s").unwrap();
        store.put(b"k", b"v").unwrap();

        let mut iter = store.scan(KeyRange::all(), false).unwrap();
        token.cancel();
        assert!(matches!(iter.next(), Some(Err(VellumError::Canceled))));
        assert!(matches!(store.get(b"k"), Err(VellumError::Canceled)));
        tx.rollback().unwrap();
    }

    #[test]
    fn begin_after_close_fails() {
        let engine = MemoryEngine::new();
        engine.close().unwrap();
        assert!(engine.begin(CancelToken::new(), false).is_err());
    }
}
