//! Directory-backed remote storage.
//!
//! Every session is one `<id>.session` file holding the codec's bytes.
//! Writes go through a temporary file and a rename so that a concurrent
//! `stored()` never sees a half-written snapshot.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{SessionCodec, SessionStorage, validate_id};
use crate::error::StorageError;
use crate::session::{SessionData, StoredSession};

const EXTENSION: &str = "session";

#[derive(Debug)]
pub struct FileSessionStorage {
    name: String,
    dir: PathBuf,
    codec: SessionCodec,
    capacity_cap: Option<u64>,
}

impl FileSessionStorage {
    /// Open (and create if needed) a storage directory.
    pub fn open(dir: impl Into<PathBuf>, codec: SessionCodec) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "opened file session storage");
        Ok(Self {
            name: "file".to_string(),
            dir,
            codec,
            capacity_cap: None,
        })
    }

    /// Report at most `cap` bytes of capacity.
    #[must_use]
    pub fn with_capacity_cap(mut self, cap: u64) -> Self {
        self.capacity_cap = Some(cap);
        self
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StorageError> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{id}.{EXTENSION}")))
    }
}

impl SessionStorage for FileSessionStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn store(&self, data: &SessionData) -> Result<(), StorageError> {
        let path = self.path_for(&data.id)?;
        let bytes = self.codec.encode(data)?;
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<(), StorageError> {
        let path = self.path_for(id)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn load(&self, id: &str) -> Result<Option<SessionData>, StorageError> {
        let path = self.path_for(id)?;
        match fs::read(path) {
            Ok(bytes) => self.codec.decode(&bytes).map(Some),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn stored(&self) -> Result<Vec<StoredSession>, StorageError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_id(id).is_err() {
                warn!(path = %path.display(), "skipping stored file with unsafe name");
                continue;
            }
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                // removed between read_dir and stat
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            entries.push(StoredSession {
                id: id.to_string(),
                remote_size: metadata.len(),
            });
        }
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }

    fn capacity(&self) -> Result<u64, StorageError> {
        let total = fs2::total_space(&self.dir).map_err(|err| StorageError::Unavailable {
            backend: self.name.clone(),
            reason: err.to_string(),
        })?;
        Ok(self.capacity_cap.map_or(total, |cap| cap.min(total)))
    }

    fn codec(&self) -> &SessionCodec {
        &self.codec
    }
}
