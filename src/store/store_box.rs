use uuid::Uuid;

use super::Storable;
use super::shared::SharedReferenceStore;
use crate::bytes::{fuse, read_framed};
use crate::error::{CodecError, Result};

const HAS_CENTRALIZER: u8 = 0b01;
const HAS_STORED: u8 = 0b10;

#[derive(Debug, Default)]
enum Cache<T> {
    #[default]
    Unresolved,
    Resolved(T),
}

/// A lazily decoded value, stored inline or shared through a centralizer.
///
/// ```rust
/// use graphcodec::{GraphCodec, SharedReferenceStore, StoreBox, TypeCatalog};
/// use uuid::Uuid;
///
/// let store = SharedReferenceStore::new(GraphCodec::new(TypeCatalog::new()));
/// let centralizer = Uuid::new_v4();
/// store.register_centralizer(centralizer);
///
/// let mut a = StoreBox::<String>::centralized(centralizer);
/// let mut b = StoreBox::<String>::centralized(centralizer);
/// a.set(&store, "shared text".to_string())?;
/// b.set(&store, "shared text".to_string())?;
///
/// assert_eq!(a.stored_bytes(), b.stored_bytes());
/// assert_eq!(store.entry_count(centralizer)?, 1);
/// # Ok::<(), graphcodec::CodecError>(())
/// ```
#[derive(Debug)]
pub struct StoreBox<T: Storable> {
    centralizer: Option<Uuid>,
    /// Inline encoding, or the 16-byte shared id when centralized.
    stored: Option<Vec<u8>>,
    cache: Cache<T>,
}

impl<T: Storable> Default for StoreBox<T> {
    fn default() -> Self {
        Self::new()
    }
}

// Clones re-resolve against the shared table instead of inheriting the cache.
impl<T: Storable> Clone for StoreBox<T> {
    fn clone(&self) -> Self {
        Self {
            centralizer: self.centralizer,
            stored: self.stored.clone(),
            cache: Cache::Unresolved,
        }
    }
}

impl<T: Storable> StoreBox<T> {
    /// An empty, uncentralized box. Reads yield `T::default()`.
    pub fn new() -> Self {
        Self {
            centralizer: None,
            stored: None,
            cache: Cache::Unresolved,
        }
    }

    /// An empty box under `centralizer`.
    pub fn centralized(centralizer: Uuid) -> Self {
        Self {
            centralizer: Some(centralizer),
            ..Self::new()
        }
    }

    /// Rebuilds a box from what a record persisted. Nothing is decoded until the first read.
    pub fn from_parts(centralizer: Option<Uuid>, stored: Option<Vec<u8>>) -> Self {
        Self {
            centralizer,
            stored,
            cache: Cache::Unresolved,
        }
    }

    /// Splits the box into its persisted parts.
    pub fn into_parts(self) -> (Option<Uuid>, Option<Vec<u8>>) {
        (self.centralizer, self.stored)
    }

    /// The centralizer, if any.
    pub fn centralizer(&self) -> Option<Uuid> {
        self.centralizer
    }

    /// Whether reads and writes go through the shared table.
    pub fn is_centralized(&self) -> bool {
        self.centralizer.is_some() && !T::VALUE_TYPE
    }

    /// Whether the value has been decoded and cached.
    pub fn is_resolved(&self) -> bool {
        matches!(self.cache, Cache::Resolved(_))
    }

    /// The persisted bytes: inline encoding or shared id.
    pub fn stored_bytes(&self) -> Option<&[u8]> {
        self.stored.as_deref()
    }

    /// Associates the box with `centralizer`, moving a value it already holds into the shared
    /// table. Value-typed boxes record the id but keep storing inline.
    ///
    /// # Errors
    /// [`CodecError::Usage`] if the box is already under a different centralizer.
    pub fn centralize(&mut self, store: &SharedReferenceStore, centralizer: Uuid) -> Result<()> {
        match self.centralizer {
            Some(current) if current == centralizer => return Ok(()),
            Some(current) => {
                return Err(CodecError::Usage(format!(
                    "box is already centralized under {current}"
                )));
            }
            None => {}
        }
        if T::VALUE_TYPE || self.stored.is_none() {
            self.centralizer = Some(centralizer);
            return Ok(());
        }
        let value = self.get(store)?.clone();
        self.centralizer = Some(centralizer);
        self.set(store, value)
    }

    /// Stores `value`, sharing it through the centralizer when the box has one.
    ///
    /// An equal value already in the centralizer's table is reused, so boxes holding equal
    /// values converge on one entry.
    pub fn set(&mut self, store: &SharedReferenceStore, value: T) -> Result<()> {
        let codec = store.codec();
        self.stored = match self.centralizer {
            Some(centralizer) if !T::VALUE_TYPE => {
                if value.is_null() {
                    None
                } else {
                    let id = store.intern(centralizer, value.store(codec)?)?;
                    Some(id.as_bytes().to_vec())
                }
            }
            _ => Some(value.store(codec)?),
        };
        self.cache = Cache::Resolved(value);
        Ok(())
    }

    /// Returns the value, decoding and caching it on first access.
    ///
    /// # Errors
    /// [`CodecError::MissingCentralizerTable`] if the box is centralized under a centralizer the
    /// store does not know. An id missing from a known table reads as `T::default()`.
    pub fn get(&mut self, store: &SharedReferenceStore) -> Result<&T> {
        if let Cache::Unresolved = self.cache {
            let value = self.resolve(store)?;
            self.cache = Cache::Resolved(value);
        }
        match &self.cache {
            Cache::Resolved(value) => Ok(value),
            Cache::Unresolved => Err(CodecError::InternalConsistency(
                "store box cache was not filled".into(),
            )),
        }
    }

    fn resolve(&self, store: &SharedReferenceStore) -> Result<T> {
        let codec = store.codec();
        let Some(stored) = &self.stored else {
            return Ok(T::default());
        };
        match self.centralizer {
            Some(centralizer) if !T::VALUE_TYPE => {
                let id = Uuid::from_slice(stored)
                    .map_err(|e| CodecError::Format(format!("bad shared id: {e}")))?;
                match store.resolve(centralizer, id)? {
                    Some(bytes) => T::restore(&bytes, codec),
                    None => Ok(T::default()),
                }
            }
            _ => T::restore(stored, codec),
        }
    }

    /// Serializes the persisted parts as `[flags u8][centralizer 16B?][framed stored?]`.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut flags = 0;
        let mut parts: Vec<Vec<u8>> = Vec::with_capacity(3);
        parts.push(Vec::new());
        if let Some(centralizer) = self.centralizer {
            flags |= HAS_CENTRALIZER;
            parts.push(centralizer.as_bytes().to_vec());
        }
        if let Some(stored) = &self.stored {
            flags |= HAS_STORED;
            parts.push(fuse(&[stored], true)?);
        }
        parts[0].push(flags);
        fuse(&parts, false)
    }

    /// Reverses [`to_bytes`](Self::to_bytes). The result is unresolved.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some((&flags, mut rest)) = bytes.split_first() else {
            return Err(CodecError::Format("empty store box record".into()));
        };
        let centralizer = if flags & HAS_CENTRALIZER != 0 {
            let (raw, tail) = rest
                .split_at_checked(16)
                .ok_or_else(|| CodecError::Format("truncated centralizer id".into()))?;
            rest = tail;
            Some(Uuid::from_slice(raw).map_err(|e| CodecError::Format(e.to_string()))?)
        } else {
            None
        };
        let stored = if flags & HAS_STORED != 0 {
            let (payload, used) = read_framed(rest, 0)?;
            let payload = payload.to_vec();
            rest = &rest[used..];
            Some(payload)
        } else {
            None
        };
        if !rest.is_empty() {
            return Err(CodecError::Format(format!(
                "{} trailing bytes after store box record",
                rest.len()
            )));
        }
        Ok(Self::from_parts(centralizer, stored))
    }
}
