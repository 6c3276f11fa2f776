//! Serialization and compression of session snapshots.
//!
//! A [`SessionCodec`] pairs a [`SessionSerializer`] with a
//! [`StreamCompressor`]; bytes on the wire are `compress(serialize(snapshot))`.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::error::StorageError;
use crate::session::{SessionData, StoredSession};

/// Converts snapshots and catalogues to and from byte streams.
pub trait SessionSerializer: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn write_snapshot(&self, data: &SessionData, out: &mut dyn Write) -> Result<(), StorageError>;

    fn read_snapshot(&self, input: &mut dyn Read) -> Result<SessionData, StorageError>;

    fn write_catalogue(
        &self,
        entries: &[StoredSession],
        out: &mut dyn Write,
    ) -> Result<(), StorageError>;

    fn read_catalogue(&self, input: &mut dyn Read) -> Result<Vec<StoredSession>, StorageError>;
}

/// Wraps byte streams in a compression layer.
pub trait StreamCompressor: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn compress<'a>(&self, out: Box<dyn Write + 'a>) -> io::Result<Box<dyn Write + 'a>>;

    fn decompress<'a>(&self, input: Box<dyn Read + 'a>) -> io::Result<Box<dyn Read + 'a>>;
}

/// JSON via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl SessionSerializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn write_snapshot(&self, data: &SessionData, out: &mut dyn Write) -> Result<(), StorageError> {
        serde_json::to_writer(out, data).map_err(|e| StorageError::Codec(e.to_string()))
    }

    fn read_snapshot(&self, input: &mut dyn Read) -> Result<SessionData, StorageError> {
        serde_json::from_reader(input).map_err(|e| StorageError::Codec(e.to_string()))
    }

    fn write_catalogue(
        &self,
        entries: &[StoredSession],
        out: &mut dyn Write,
    ) -> Result<(), StorageError> {
        serde_json::to_writer(out, entries).map_err(|e| StorageError::Codec(e.to_string()))
    }

    fn read_catalogue(&self, input: &mut dyn Read) -> Result<Vec<StoredSession>, StorageError> {
        serde_json::from_reader(input).map_err(|e| StorageError::Codec(e.to_string()))
    }
}

/// Passthrough.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompressor;

impl StreamCompressor for NoCompressor {
    fn name(&self) -> &'static str {
        "none"
    }

    fn compress<'a>(&self, out: Box<dyn Write + 'a>) -> io::Result<Box<dyn Write + 'a>> {
        Ok(out)
    }

    fn decompress<'a>(&self, input: Box<dyn Read + 'a>) -> io::Result<Box<dyn Read + 'a>> {
        Ok(input)
    }
}

/// zstd frames; the frame is finished when the writer is dropped.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    #[must_use]
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::new(3)
    }
}

impl StreamCompressor for ZstdCompressor {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compress<'a>(&self, out: Box<dyn Write + 'a>) -> io::Result<Box<dyn Write + 'a>> {
        let encoder = zstd::stream::write::Encoder::new(out, self.level)?;
        Ok(Box::new(encoder.auto_finish()))
    }

    fn decompress<'a>(&self, input: Box<dyn Read + 'a>) -> io::Result<Box<dyn Read + 'a>> {
        Ok(Box::new(zstd::stream::read::Decoder::new(input)?))
    }
}

/// Serializer plus compressor used by a storage backend.
#[derive(Debug, Clone)]
pub struct SessionCodec {
    serializer: Arc<dyn SessionSerializer>,
    compressor: Arc<dyn StreamCompressor>,
}

impl Default for SessionCodec {
    fn default() -> Self {
        Self::new(Arc::new(JsonSerializer), Arc::new(NoCompressor))
    }
}

impl SessionCodec {
    #[must_use]
    pub fn new(
        serializer: Arc<dyn SessionSerializer>,
        compressor: Arc<dyn StreamCompressor>,
    ) -> Self {
        Self {
            serializer,
            compressor,
        }
    }

    /// JSON compressed with zstd.
    #[must_use]
    pub fn compressed() -> Self {
        Self::new(Arc::new(JsonSerializer), Arc::new(ZstdCompressor::default()))
    }

    #[must_use]
    pub fn serializer(&self) -> &dyn SessionSerializer {
        self.serializer.as_ref()
    }

    #[must_use]
    pub fn compressor(&self) -> &dyn StreamCompressor {
        self.compressor.as_ref()
    }

    pub fn encode(&self, data: &SessionData) -> Result<Vec<u8>, StorageError> {
        let mut buf = Vec::new();
        {
            let mut writer = self.compressor.compress(Box::new(&mut buf))?;
            self.serializer.write_snapshot(data, writer.as_mut())?;
            writer.flush()?;
        }
        Ok(buf)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<SessionData, StorageError> {
        let mut reader = self.compressor.decompress(Box::new(bytes))?;
        self.serializer.read_snapshot(reader.as_mut())
    }

    pub fn encode_catalogue(&self, entries: &[StoredSession]) -> Result<Vec<u8>, StorageError> {
        let mut buf = Vec::new();
        {
            let mut writer = self.compressor.compress(Box::new(&mut buf))?;
            self.serializer.write_catalogue(entries, writer.as_mut())?;
            writer.flush()?;
        }
        Ok(buf)
    }

    pub fn decode_catalogue(&self, bytes: &[u8]) -> Result<Vec<StoredSession>, StorageError> {
        let mut reader = self.compressor.decompress(Box::new(bytes))?;
        self.serializer.read_catalogue(reader.as_mut())
    }
}
