//! Remote session storage.
//!
//! The orchestrator only talks to remote storage through [`SessionStorage`].
//! Two reference backends ship with the crate: [`MemorySessionStorage`] for
//! tests and single-process use, and [`FileSessionStorage`] which keeps one
//! encoded file per session in a directory.

pub mod codec;
pub mod file;
pub mod memory;

pub use codec::{
    JsonSerializer, NoCompressor, SessionCodec, SessionSerializer, StreamCompressor,
    ZstdCompressor,
};
pub use file::FileSessionStorage;
pub use memory::MemorySessionStorage;

use crate::error::StorageError;
use crate::session::{SessionData, StoredSession};

/// Contract every remote backend implements.
pub trait SessionStorage: Send + Sync {
    /// Name used as the storage key in the optimization snapshot.
    fn name(&self) -> &str;

    /// Store or overwrite a snapshot.
    fn store(&self, data: &SessionData) -> Result<(), StorageError>;

    /// Remove a snapshot. Removing an unknown id succeeds.
    fn remove(&self, id: &str) -> Result<(), StorageError>;

    fn load(&self, id: &str) -> Result<Option<SessionData>, StorageError>;

    /// Catalogue of everything currently stored.
    fn stored(&self) -> Result<Vec<StoredSession>, StorageError>;

    /// Total capacity, bytes.
    fn capacity(&self) -> Result<u64, StorageError>;

    fn codec(&self) -> &SessionCodec;
}

/// Reject ids that are empty, contain path separators or characters outside
/// `[A-Za-z0-9._-]`, or consist only of dots.
pub(crate) fn validate_id(id: &str) -> Result<(), StorageError> {
    let safe = !id.is_empty()
        && id.len() <= 255
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        && !id.bytes().all(|b| b == b'.');
    if safe {
        Ok(())
    } else {
        Err(StorageError::InvalidId(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_validation() {
        for ok in ["abc", "A-1_b.c", "0123456789abcdef", ".hidden"] {
            assert!(validate_id(ok).is_ok(), "{ok}");
        }
        for bad in ["", ".", "..", "a/b", "a\\b", "a b", "ü", &"x".repeat(256)] {
            assert!(
                matches!(validate_id(bad), Err(StorageError::InvalidId(_))),
                "{bad}"
            );
        }
    }
}
