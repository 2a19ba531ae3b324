//! Table handles: document storage plus synchronous index maintenance.
//!
//! A row's document key is either the order-preserving encoding of its
//! primary-key value or the encoding of a per-table sequence value, so a full
//! scan yields rows in insertion order for sequence-keyed tables.

use vellum_codec::{decode_document, encode_document, encode_key};
use vellum_engine::{KeyRange, Store};
use vellum_error::{Result, VellumError};
use vellum_types::{Document, Value};

use crate::catalog::{IndexInfo, TableInfo};
use crate::transaction::Transaction;

/// A handle on one table within a transaction.
pub struct Table<'tx> {
    tx: &'tx Transaction,
    info: TableInfo,
    store: Box<dyn Store>,
    indexes: Vec<(IndexInfo, Box<dyn Store>)>,
}

/// A handle on one index within a transaction: the index store plus the
/// table it points into.
pub struct IndexHandle {
    pub info: IndexInfo,
    pub store: Box<dyn Store>,
}

impl<'tx> Table<'tx> {
    pub(crate) fn new(
        tx: &'tx Transaction,
        info: TableInfo,
        store: Box<dyn Store>,
        indexes: Vec<(IndexInfo, Box<dyn Store>)>,
    ) -> Self {
        Self {
            tx,
            info,
            store,
            indexes,
        }
    }

    /// The table definition.
    pub fn info(&self) -> &TableInfo {
        &self.info
    }

    /// Compute the document key for `doc`: the encoded primary-key value, or
    /// the next value of the table's sequence.
    fn document_key(&self, doc: &Document) -> Result<Vec<u8>> {
        if let Some(pk) = &self.info.primary_key {
            return match doc.get_path(pk) {
                Some(value) if !value.is_null() => Ok(encode_key(value)),
                _ => Err(VellumError::type_error(format!(
                    "document is missing the primary key {pk}"
                ))),
            };
        }
        let seq_name = self.info.docid_seq.as_deref().ok_or_else(|| {
            VellumError::internal("table has neither a primary key nor a sequence")
        })?;
        let snapshot = self.tx.catalog_overlay();
        let seq = snapshot.sequence(seq_name)?.clone();
        let seq_store = self.tx.raw_store(crate::catalog::SEQ_STORE)?;
        let n = seq.next(seq_store.as_ref())?;
        Ok(encode_key(&Value::Int(n)))
    }

    /// Insert a document, returning its key.
    ///
    /// Fails with `DuplicateKey` when the key is already present, and
    /// maintains every index of the table within the same transaction.
    pub fn insert(&self, doc: &Document) -> Result<Vec<u8>> {
        self.tx.require_writable()?;
        let key = self.document_key(doc)?;
        if self.store.get(&key)?.is_some() {
            return Err(VellumError::DuplicateKey);
        }
        self.store.put(&key, &encode_document(doc))?;
        for (info, store) in &self.indexes {
            index_put(info, store.as_ref(), doc, &key)?;
        }
        Ok(key)
    }

    /// Replace the document stored under `key`.
    pub fn replace(&self, key: &[u8], doc: &Document) -> Result<()> {
        self.tx.require_writable()?;
        let old_bytes = self
            .store
            .get(key)?
            .ok_or(VellumError::DocumentNotFound)?;
        let old = decode_document(&old_bytes)?;
        for (info, store) in &self.indexes {
            index_del(info, store.as_ref(), &old, key)?;
        }
        self.store.put(key, &encode_document(doc))?;
        for (info, store) in &self.indexes {
            index_put(info, store.as_ref(), doc, key)?;
        }
        Ok(())
    }

    /// Delete the document stored under `key`.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.tx.require_writable()?;
        let old_bytes = self
            .store
            .get(key)?
            .ok_or(VellumError::DocumentNotFound)?;
        let old = decode_document(&old_bytes)?;
        for (info, store) in &self.indexes {
            index_del(info, store.as_ref(), &old, key)?;
        }
        self.store.delete(key)
    }

    /// Fetch the document stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Document>> {
        match self.store.get(key)? {
            Some(bytes) => Ok(Some(decode_document(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Iterate stored rows in key order (reversed when `reverse`), decoding
    /// each document.
    pub fn iter(
        &self,
        range: KeyRange,
        reverse: bool,
    ) -> Result<impl Iterator<Item = Result<(Vec<u8>, Document)>>> {
        let scan = self.store.scan(range, reverse)?;
        Ok(scan.map(|entry| {
            let (key, bytes) = entry?;
            Ok((key, decode_document(&bytes)?))
        }))
    }
}

/// Write the index entry for `doc` under `key`. Documents without the indexed
/// path are not indexed; an explicit Null is.
pub(crate) fn index_put(
    info: &IndexInfo,
    store: &dyn Store,
    doc: &Document,
    key: &[u8],
) -> Result<()> {
    let Some(value) = doc.get_path(&info.path) else {
        return Ok(());
    };
    let encoded = encode_key(value);
    if info.unique {
        if store.get(&encoded)?.is_some() {
            return Err(VellumError::DuplicateKey);
        }
        store.put(&encoded, key)
    } else {
        let mut composite = encoded;
        composite.extend_from_slice(key);
        store.put(&composite, key)
    }
}

/// Remove the index entry `doc` had under `key`. Lenient about entries that
/// are already gone.
pub(crate) fn index_del(
    info: &IndexInfo,
    store: &dyn Store,
    doc: &Document,
    key: &[u8],
) -> Result<()> {
    let Some(value) = doc.get_path(&info.path) else {
        return Ok(());
    };
    let mut encoded = encode_key(value);
    if !info.unique {
        encoded.extend_from_slice(key);
    }
    match store.delete(&encoded) {
        Ok(()) | Err(VellumError::KeyNotFound) => Ok(()),
        Err(err) => Err(err),
    }
}
