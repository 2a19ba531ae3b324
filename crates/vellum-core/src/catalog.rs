//! The catalog: the in-memory authoritative schema.
//!
//! The committed state lives behind the [`Catalog`]; every transaction works
//! on a copy-on-write overlay of it ([`CatalogState`]), persisted as records
//! in the reserved catalog store and swapped in atomically at commit. A
//! rollback simply drops the overlay.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use vellum_codec::{decode_document, encode_document};
use vellum_engine::{EngineTx, KeyRange};
use vellum_error::{Result, VellumError};
use vellum_types::{Document, Path, PathStep, Value};

use crate::sequence::{decode_watermark, Sequence};

/// Store holding one record per catalog object.
pub const CATALOG_STORE: &str = "__vellum_catalog";
/// Store holding persisted sequence watermarks, keyed by sequence name.
pub const SEQ_STORE: &str = "__vellum_seq";

/// Definition of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub name: String,
    /// Stable numeric id; the row store is named `t<id>`.
    pub id: u64,
    /// User-declared primary-key path, if any.
    pub primary_key: Option<Path>,
    /// Name of the per-table document-key sequence (tables without a
    /// primary key).
    pub docid_seq: Option<String>,
}

impl TableInfo {
    /// Name of the engine store holding this table's rows.
    pub fn store_name(&self) -> String {
        format!("t{}", self.id)
    }
}

/// Definition of a secondary index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub name: String,
    /// Stable numeric id; the index store is named `i<id>`.
    pub id: u64,
    pub table: String,
    pub path: Path,
    pub unique: bool,
}

impl IndexInfo {
    /// Name of the engine store holding this index's entries.
    pub fn store_name(&self) -> String {
        format!("i{}", self.id)
    }
}

/// A complete snapshot of the schema.
#[derive(Debug, Clone, Default)]
pub struct CatalogState {
    tables: HashMap<String, TableInfo>,
    indexes: HashMap<String, IndexInfo>,
    sequences: HashMap<String, Arc<Sequence>>,
    next_id: u64,
}

impl CatalogState {
    /// Look up a table definition.
    pub fn table(&self, name: &str) -> Result<&TableInfo> {
        self.tables.get(name).ok_or_else(|| VellumError::NoSuchTable {
            name: name.to_owned(),
        })
    }

    /// Look up an index definition.
    pub fn index(&self, name: &str) -> Result<&IndexInfo> {
        self.indexes.get(name).ok_or_else(|| VellumError::NoSuchIndex {
            name: name.to_owned(),
        })
    }

    /// Look up a sequence.
    pub fn sequence(&self, name: &str) -> Result<&Arc<Sequence>> {
        self.sequences
            .get(name)
            .ok_or_else(|| VellumError::NoSuchSequence {
                name: name.to_owned(),
            })
    }

    /// All indexes declared on `table`, sorted by name so that index
    /// selection is deterministic.
    pub fn indexes_of(&self, table: &str) -> Vec<&IndexInfo> {
        let mut indexes: Vec<_> = self
            .indexes
            .values()
            .filter(|idx| idx.table == table)
            .collect();
        indexes.sort_by(|a, b| a.name.cmp(&b.name));
        indexes
    }

    /// Names of all sequences, sorted.
    pub fn sequence_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.sequences.keys().cloned().collect();
        names.sort();
        names
    }

    /// All sequences (used at close to release cached ranges).
    pub fn sequences(&self) -> impl Iterator<Item = &Arc<Sequence>> {
        self.sequences.values()
    }

    /// Allocate the next object id.
    pub(crate) fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn insert_table(&mut self, info: TableInfo) -> Result<()> {
        if self.tables.contains_key(&info.name) {
            return Err(VellumError::TableExists { name: info.name });
        }
        self.tables.insert(info.name.clone(), info);
        Ok(())
    }

    pub(crate) fn remove_table(&mut self, name: &str) -> Result<TableInfo> {
        self.tables
            .remove(name)
            .ok_or_else(|| VellumError::NoSuchTable {
                name: name.to_owned(),
            })
    }

    pub(crate) fn insert_index(&mut self, info: IndexInfo) -> Result<()> {
        if self.indexes.contains_key(&info.name) {
            return Err(VellumError::IndexExists { name: info.name });
        }
        self.indexes.insert(info.name.clone(), info);
        Ok(())
    }

    pub(crate) fn remove_index(&mut self, name: &str) -> Result<IndexInfo> {
        self.indexes
            .remove(name)
            .ok_or_else(|| VellumError::NoSuchIndex {
                name: name.to_owned(),
            })
    }

    pub(crate) fn insert_sequence(&mut self, seq: Arc<Sequence>) -> Result<()> {
        if self.sequences.contains_key(seq.name()) {
            return Err(VellumError::SequenceExists {
                name: seq.name().to_owned(),
            });
        }
        self.sequences.insert(seq.name().to_owned(), seq);
        Ok(())
    }

    pub(crate) fn remove_sequence(&mut self, name: &str) -> Result<Arc<Sequence>> {
        self.sequences
            .remove(name)
            .ok_or_else(|| VellumError::NoSuchSequence {
                name: name.to_owned(),
            })
    }
}

/// The shared committed catalog.
#[derive(Debug, Default)]
pub struct Catalog {
    state: RwLock<Arc<CatalogState>>,
}

impl Catalog {
    /// The committed schema snapshot.
    pub fn snapshot(&self) -> Arc<CatalogState> {
        Arc::clone(&self.state.read())
    }

    /// Swap in a new committed state. Called at transaction commit while the
    /// database write lock is held.
    pub fn install(&self, state: CatalogState) {
        *self.state.write() = Arc::new(state);
    }
}

// ---------------------------------------------------------------------------
// Persistence: catalog records
// ---------------------------------------------------------------------------

fn record_key(kind: &str, name: &str) -> Vec<u8> {
    format!("{kind}/{name}").into_bytes()
}

/// A path persists as an array of field names and indexes.
fn path_to_value(path: &Path) -> Value {
    Value::Array(
        path.steps()
            .iter()
            .map(|step| match step {
                PathStep::Field(name) => Value::Text(name.clone()),
                PathStep::Index(idx) => Value::Int(*idx as i64),
            })
            .collect(),
    )
}

fn value_to_path(value: &Value) -> Result<Path> {
    let Value::Array(steps) = value else {
        return Err(VellumError::corrupted("catalog path is not an array"));
    };
    let mut out = Vec::with_capacity(steps.len());
    for step in steps {
        match step {
            Value::Text(name) => out.push(PathStep::Field(name.clone())),
            Value::Int(idx) if *idx >= 0 => out.push(PathStep::Index(*idx as usize)),
            other => {
                return Err(VellumError::corrupted(format!(
                    "invalid catalog path step: {other}"
                )))
            }
        }
    }
    if out.is_empty() {
        return Err(VellumError::corrupted("catalog path is empty"));
    }
    Ok(Path::new(out))
}

pub(crate) fn table_record(info: &TableInfo) -> (Vec<u8>, Vec<u8>) {
    let mut doc = Document::new();
    doc.set("type", "table");
    doc.set("name", info.name.as_str());
    doc.set("id", info.id as i64);
    match &info.primary_key {
        Some(path) => doc.set("primary_key", path_to_value(path)),
        None => doc.set("primary_key", Value::Null),
    }
    match &info.docid_seq {
        Some(name) => doc.set("docid_seq", name.as_str()),
        None => doc.set("docid_seq", Value::Null),
    }
    (record_key("table", &info.name), encode_document(&doc))
}

pub(crate) fn index_record(info: &IndexInfo) -> (Vec<u8>, Vec<u8>) {
    let mut doc = Document::new();
    doc.set("type", "index");
    doc.set("name", info.name.as_str());
    doc.set("id", info.id as i64);
    doc.set("table", info.table.as_str());
    doc.set("path", path_to_value(&info.path));
    doc.set("unique", info.unique);
    (record_key("index", &info.name), encode_document(&doc))
}

pub(crate) fn sequence_record(name: &str) -> (Vec<u8>, Vec<u8>) {
    let mut doc = Document::new();
    doc.set("type", "sequence");
    doc.set("name", name);
    (record_key("sequence", name), encode_document(&doc))
}

pub(crate) fn table_record_key(name: &str) -> Vec<u8> {
    record_key("table", name)
}

pub(crate) fn index_record_key(name: &str) -> Vec<u8> {
    record_key("index", name)
}

pub(crate) fn sequence_record_key(name: &str) -> Vec<u8> {
    record_key("sequence", name)
}

fn get_text(doc: &Document, field: &str) -> Result<String> {
    match doc.get(field) {
        Some(Value::Text(s)) => Ok(s.clone()),
        _ => Err(VellumError::corrupted(format!(
            "catalog record is missing text field {field}"
        ))),
    }
}

fn get_id(doc: &Document, field: &str) -> Result<u64> {
    match doc.get(field) {
        Some(Value::Int(v)) if *v >= 0 => Ok(*v as u64),
        _ => Err(VellumError::corrupted(format!(
            "catalog record is missing id field {field}"
        ))),
    }
}

/// Rebuild the complete catalog from the reserved stores. Idempotent: the
/// result depends only on the stored records.
pub fn load(engine_tx: &dyn EngineTx) -> Result<CatalogState> {
    let catalog_store = engine_tx.store(CATALOG_STORE)?;
    let seq_store = engine_tx.store(SEQ_STORE)?;

    let mut state = CatalogState::default();
    for entry in catalog_store.scan(KeyRange::all(), false)? {
        let (_, bytes) = entry?;
        let doc = decode_document(&bytes)?;
        match doc.get("type").and_then(Value::as_text) {
            Some("table") => {
                let info = TableInfo {
                    name: get_text(&doc, "name")?,
                    id: get_id(&doc, "id")?,
                    primary_key: match doc.get("primary_key") {
                        Some(Value::Null) | None => None,
                        Some(v) => Some(value_to_path(v)?),
                    },
                    docid_seq: match doc.get("docid_seq") {
                        Some(Value::Text(s)) => Some(s.clone()),
                        _ => None,
                    },
                };
                state.next_id = state.next_id.max(info.id);
                state.tables.insert(info.name.clone(), info);
            }
            Some("index") => {
                let info = IndexInfo {
                    name: get_text(&doc, "name")?,
                    id: get_id(&doc, "id")?,
                    table: get_text(&doc, "table")?,
                    path: value_to_path(doc.get("path").unwrap_or(&Value::Null))?,
                    unique: matches!(doc.get("unique"), Some(Value::Bool(true))),
                };
                state.next_id = state.next_id.max(info.id);
                state.indexes.insert(info.name.clone(), info);
            }
            Some("sequence") => {
                let name = get_text(&doc, "name")?;
                let watermark = match seq_store.get(name.as_bytes())? {
                    Some(bytes) => decode_watermark(&bytes)?,
                    None => 0,
                };
                state
                    .sequences
                    .insert(name.clone(), Arc::new(Sequence::new(name, watermark)));
            }
            other => {
                return Err(VellumError::corrupted(format!(
                    "unknown catalog record type: {other:?}"
                )))
            }
        }
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_engine::{CancelToken, Engine, MemoryEngine};

    fn sample_table() -> TableInfo {
        TableInfo {
            name: "users".to_owned(),
            id: 3,
            primary_key: Some(Path::field("profile").with_field("id").with_index(0)),
            docid_seq: None,
        }
    }

    #[test]
    fn store_names_derive_from_ids() {
        assert_eq!(sample_table().store_name(), "t3");
        let idx = IndexInfo {
            name: "i".to_owned(),
            id: 9,
            table: "users".to_owned(),
            path: Path::field("a"),
            unique: false,
        };
        assert_eq!(idx.store_name(), "i9");
    }

    #[test]
    fn load_rebuilds_records() {
        let engine = MemoryEngine::new();
        let mut tx = engine.begin(CancelToken::new(), true).unwrap();
        let catalog_store = tx.create_store(CATALOG_STORE).unwrap();
        tx.create_store(SEQ_STORE).unwrap();

        let table = sample_table();
        let (k, v) = table_record(&table);
        catalog_store.put(&k, &v).unwrap();

        let index = IndexInfo {
            name: "idx_a".to_owned(),
            id: 7,
            table: "users".to_owned(),
            path: Path::field("a").with_field("b"),
            unique: true,
        };
        let (k, v) = index_record(&index);
        catalog_store.put(&k, &v).unwrap();

        let (k, v) = sequence_record("seq1");
        catalog_store.put(&k, &v).unwrap();

        let state = load(tx.as_ref()).unwrap();
        assert_eq!(state.table("users").unwrap(), &table);
        assert_eq!(state.index("idx_a").unwrap(), &index);
        assert!(state.sequence("seq1").is_ok());
        // next_id resumes above the largest persisted id.
        assert_eq!(state.clone().allocate_id(), 8);

        // Idempotent: loading again yields the same state.
        let again = load(tx.as_ref()).unwrap();
        assert_eq!(again.table("users").unwrap(), &table);
        tx.rollback().unwrap();
    }

    #[test]
    fn missing_objects_are_not_found() {
        let state = CatalogState::default();
        assert!(matches!(
            state.table("nope"),
            Err(VellumError::NoSuchTable { .. })
        ));
        assert!(matches!(
            state.index("nope"),
            Err(VellumError::NoSuchIndex { .. })
        ));
        assert!(matches!(
            state.sequence("nope"),
            Err(VellumError::NoSuchSequence { .. })
        ));
    }

    #[test]
    fn duplicate_insertions_collide() {
        let mut state = CatalogState::default();
        state.insert_table(sample_table()).unwrap();
        assert!(matches!(
            state.insert_table(sample_table()),
            Err(VellumError::TableExists { .. })
        ));
    }

    #[test]
    fn indexes_of_is_sorted() {
        let mut state = CatalogState::default();
        for name in ["zeta", "alpha", "mid"] {
            let id = state.allocate_id();
            state
                .insert_index(IndexInfo {
                    name: name.to_owned(),
                    id,
                    table: "t".to_owned(),
                    path: Path::field("x"),
                    unique: false,
                })
                .unwrap();
        }
        let names: Vec<_> = state.indexes_of("t").iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
        assert!(state.indexes_of("other").is_empty());
    }
}
