//! The shared reference table, keyed by centralizer.
//!
//! Each centralizer owns a table `object id -> encoded bytes` plus a reverse index from a content
//! digest to candidate ids. Equal values encode to equal bytes, so the digest index (with a byte
//! comparison on collision) answers "has an equal value already been assigned an id?".
//!
//! Tables are created and torn down explicitly with
//! [`register_centralizer`](SharedReferenceStore::register_centralizer) and
//! [`release_centralizer`](SharedReferenceStore::release_centralizer); nothing is evicted
//! behind the caller's back.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hasher;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::{debug, trace};
use twox_hash::XxHash64;
use uuid::Uuid;

use crate::api::GraphCodec;
use crate::error::{CodecError, Result};

const DIGEST_SEED: u64 = 0;

fn digest(bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(DIGEST_SEED);
    hasher.write(bytes);
    hasher.finish()
}

#[derive(Debug, Default)]
struct CentralizerTable {
    entries: HashMap<Uuid, Vec<u8>>,
    by_digest: HashMap<u64, Vec<Uuid>>,
}

impl CentralizerTable {
    fn lookup(&self, bytes: &[u8]) -> Option<Uuid> {
        self.by_digest.get(&digest(bytes))?.iter().copied().find(|id| {
            self.entries
                .get(id)
                .is_some_and(|stored| stored.as_slice() == bytes)
        })
    }

    fn insert(&mut self, id: Uuid, bytes: Vec<u8>) {
        self.by_digest.entry(digest(&bytes)).or_default().push(id);
        self.entries.insert(id, bytes);
    }
}

/// Process-level (but injectable) registry of centralizer tables.
///
/// The store is `Send + Sync`: the map of tables sits behind an `RwLock` and each table behind
/// its own `Mutex`, so boxes under different centralizers never contend.
#[derive(Debug)]
pub struct SharedReferenceStore {
    codec: GraphCodec,
    tables: RwLock<HashMap<Uuid, Arc<Mutex<CentralizerTable>>>>,
}

impl SharedReferenceStore {
    /// Creates an empty store; `codec` encodes and decodes the values boxes hold.
    pub fn new(codec: GraphCodec) -> Self {
        Self {
            codec,
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// The codec used for stored values.
    pub fn codec(&self) -> &GraphCodec {
        &self.codec
    }

    /// Creates an empty table for `centralizer`. Returns `false` if it already existed.
    pub fn register_centralizer(&self, centralizer: Uuid) -> bool {
        let mut tables = self.tables.write().unwrap_or_else(|p| p.into_inner());
        if tables.contains_key(&centralizer) {
            return false;
        }
        tables.insert(centralizer, Arc::default());
        debug!(%centralizer, "registered centralizer");
        true
    }

    /// Drops the table of `centralizer` and every value in it. Returns `false` if there was none.
    ///
    /// Boxes that already resolved keep their cached values; unresolved ones will fail with
    /// [`CodecError::MissingCentralizerTable`].
    pub fn release_centralizer(&self, centralizer: Uuid) -> bool {
        let removed = self
            .tables
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&centralizer);
        if let Some(table) = &removed {
            let entries = lock(table).entries.len();
            debug!(%centralizer, entries, "released centralizer");
        }
        removed.is_some()
    }

    /// Whether `centralizer` has a table.
    pub fn contains(&self, centralizer: Uuid) -> bool {
        self.tables
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(&centralizer)
    }

    /// Number of distinct values shared under `centralizer`.
    pub fn entry_count(&self, centralizer: Uuid) -> Result<usize> {
        let table = self.table(centralizer)?;
        let count = lock(&table).entries.len();
        Ok(count)
    }

    /// Returns the id of a value equal to `bytes`, adding it to the table if it is new.
    ///
    /// # Errors
    /// [`CodecError::MissingCentralizerTable`] if the centralizer was never registered.
    pub fn intern(&self, centralizer: Uuid, bytes: Vec<u8>) -> Result<Uuid> {
        let table = self.table(centralizer)?;
        let mut table = lock(&table);
        if let Some(existing) = table.lookup(&bytes) {
            trace!(%centralizer, id = %existing, "shared value reused");
            return Ok(existing);
        }
        let id = Uuid::new_v4();
        trace!(%centralizer, %id, len = bytes.len(), "shared value added");
        table.insert(id, bytes);
        Ok(id)
    }

    /// Encoded bytes stored under `object_id`, or `None` if the table has no such entry.
    ///
    /// # Errors
    /// [`CodecError::MissingCentralizerTable`] if the centralizer was never registered.
    pub fn resolve(&self, centralizer: Uuid, object_id: Uuid) -> Result<Option<Vec<u8>>> {
        let table = self.table(centralizer)?;
        let bytes = lock(&table).entries.get(&object_id).cloned();
        Ok(bytes)
    }

    /// Serializes the table of `centralizer` so it can be persisted next to its documents.
    pub fn export_table(&self, centralizer: Uuid) -> Result<Vec<u8>> {
        let table = self.table(centralizer)?;
        let entries: BTreeMap<Uuid, Vec<u8>> = lock(&table)
            .entries
            .iter()
            .map(|(id, bytes)| (*id, bytes.clone()))
            .collect();
        bincode::serde::encode_to_vec(&entries, bincode::config::standard())
            .map_err(|e| CodecError::Serialization(e.to_string()))
    }

    /// Merges a table produced by [`export_table`](Self::export_table) into `centralizer`,
    /// registering it if needed. Returns the number of entries added.
    ///
    /// # Errors
    /// [`CodecError::Serialization`] for undecodable input, [`CodecError::Usage`] if an id is
    /// already bound to different bytes (an id never changes its value once written).
    pub fn import_table(&self, centralizer: Uuid, bytes: &[u8]) -> Result<usize> {
        let (entries, _): (BTreeMap<Uuid, Vec<u8>>, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| CodecError::Serialization(e.to_string()))?;

        self.register_centralizer(centralizer);
        let table = self.table(centralizer)?;
        let mut table = lock(&table);

        if let Some(id) = entries.iter().find_map(|(id, bytes)| {
            table
                .entries
                .get(id)
                .filter(|existing| *existing != bytes)
                .map(|_| *id)
        }) {
            return Err(CodecError::Usage(format!(
                "shared id {id} is already bound to a different value under {centralizer}"
            )));
        }

        let mut added = 0;
        for (id, bytes) in entries {
            if !table.entries.contains_key(&id) {
                table.insert(id, bytes);
                added += 1;
            }
        }
        debug!(%centralizer, added, "imported shared table");
        Ok(added)
    }

    fn table(&self, centralizer: Uuid) -> Result<Arc<Mutex<CentralizerTable>>> {
        self.tables
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&centralizer)
            .cloned()
            .ok_or(CodecError::MissingCentralizerTable(centralizer))
    }
}

fn lock(table: &Mutex<CentralizerTable>) -> MutexGuard<'_, CentralizerTable> {
    table.lock().unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::TypeCatalog;

    fn store() -> SharedReferenceStore {
        SharedReferenceStore::new(GraphCodec::new(TypeCatalog::new()))
    }

    #[test]
    fn equal_bytes_share_one_id() {
        let store = store();
        let c = Uuid::new_v4();
        assert!(store.register_centralizer(c));
        assert!(!store.register_centralizer(c));

        let a = store.intern(c, b"payload".to_vec()).unwrap();
        let b = store.intern(c, b"payload".to_vec()).unwrap();
        let other = store.intern(c, b"different".to_vec()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, other);
        assert_eq!(store.entry_count(c).unwrap(), 2);
        assert_eq!(store.resolve(c, a).unwrap().as_deref(), Some(&b"payload"[..]));
        assert_eq!(store.resolve(c, Uuid::new_v4()).unwrap(), None);
    }

    #[test]
    fn unregistered_centralizers_are_errors() {
        let store = store();
        let c = Uuid::new_v4();
        assert!(matches!(
            store.intern(c, vec![1]),
            Err(CodecError::MissingCentralizerTable(id)) if id == c
        ));
        store.register_centralizer(c);
        assert!(store.release_centralizer(c));
        assert!(!store.contains(c));
        assert!(store.resolve(c, Uuid::nil()).is_err());
    }

    #[test]
    fn tables_survive_export_and_import() {
        let source = store();
        let c = Uuid::new_v4();
        source.register_centralizer(c);
        let id = source.intern(c, b"shared".to_vec()).unwrap();
        let exported = source.export_table(c).unwrap();

        let target = store();
        assert_eq!(target.import_table(c, &exported).unwrap(), 1);
        assert_eq!(target.import_table(c, &exported).unwrap(), 0);
        assert_eq!(target.intern(c, b"shared".to_vec()).unwrap(), id);
    }

    #[test]
    fn conflicting_imports_are_rejected() {
        let source = store();
        let c = Uuid::new_v4();
        source.register_centralizer(c);
        let id = source.intern(c, b"one".to_vec()).unwrap();

        let mut forged = BTreeMap::new();
        forged.insert(id, b"two".to_vec());
        let bytes = bincode::serde::encode_to_vec(&forged, bincode::config::standard()).unwrap();
        assert!(matches!(source.import_table(c, &bytes), Err(CodecError::Usage(_))));
    }
}
