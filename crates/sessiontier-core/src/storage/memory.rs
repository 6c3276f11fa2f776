//! In-process remote storage.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use super::{SessionCodec, SessionStorage};
use crate::error::StorageError;
use crate::session::{SessionData, StoredSession};

/// Encoded snapshots kept in a map.
///
/// The backend can be switched offline to exercise the orchestrator's
/// failure handling.
#[derive(Debug)]
pub struct MemorySessionStorage {
    name: String,
    capacity: u64,
    codec: SessionCodec,
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    offline: AtomicBool,
}

impl MemorySessionStorage {
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self::with_codec(capacity, SessionCodec::default())
    }

    #[must_use]
    pub fn with_codec(capacity: u64, codec: SessionCodec) -> Self {
        Self {
            name: "memory".to_string(),
            capacity,
            codec,
            entries: RwLock::new(BTreeMap::new()),
            offline: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make every operation fail with [`StorageError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Bytes currently stored.
    #[must_use]
    pub fn used(&self) -> u64 {
        self.entries.read().values().map(|b| b.len() as u64).sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    fn check_online(&self) -> Result<(), StorageError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable {
                backend: self.name.clone(),
                reason: "backend offline".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl SessionStorage for MemorySessionStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn store(&self, data: &SessionData) -> Result<(), StorageError> {
        self.check_online()?;
        let bytes = self.codec.encode(data)?;
        self.entries.write().insert(data.id.clone(), bytes);
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<(), StorageError> {
        self.check_online()?;
        self.entries.write().remove(id);
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<SessionData>, StorageError> {
        self.check_online()?;
        let entries = self.entries.read();
        entries
            .get(id)
            .map(|bytes| self.codec.decode(bytes))
            .transpose()
    }

    fn stored(&self) -> Result<Vec<StoredSession>, StorageError> {
        self.check_online()?;
        Ok(self
            .entries
            .read()
            .iter()
            .map(|(id, bytes)| StoredSession {
                id: id.clone(),
                remote_size: bytes.len() as u64,
            })
            .collect())
    }

    fn capacity(&self) -> Result<u64, StorageError> {
        self.check_online()?;
        Ok(self.capacity)
    }

    fn codec(&self) -> &SessionCodec {
        &self.codec
    }
}
