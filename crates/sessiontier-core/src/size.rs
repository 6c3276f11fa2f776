//! Size estimation of sessions.

use std::io::{self, Write};

use crate::error::StorageError;
use crate::session::SessionData;
use crate::storage::SessionCodec;

/// Measures how many bytes a session occupies locally and remotely.
pub trait SizeEvaluator: Send + Sync {
    /// Footprint in local memory.
    fn evaluate_local(&self, data: &SessionData) -> Result<u64, StorageError>;

    /// Bytes the session takes once encoded with `codec`.
    fn evaluate_remote(&self, data: &SessionData, codec: &SessionCodec)
    -> Result<u64, StorageError>;
}

/// Write sink that only counts.
#[derive(Debug, Default)]
struct CountingWriter {
    written: u64,
}

impl Write for CountingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Local size is the uncompressed serialized length plus a fixed per-session
/// overhead; remote size is the exact encoded length.
#[derive(Debug, Clone, Copy)]
pub struct SerializingSizeEvaluator {
    overhead: u64,
}

impl SerializingSizeEvaluator {
    /// Bookkeeping bytes charged to every resident session.
    pub const DEFAULT_OVERHEAD: u64 = 256;

    #[must_use]
    pub fn new(overhead: u64) -> Self {
        Self { overhead }
    }
}

impl Default for SerializingSizeEvaluator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_OVERHEAD)
    }
}

impl SizeEvaluator for SerializingSizeEvaluator {
    fn evaluate_local(&self, data: &SessionData) -> Result<u64, StorageError> {
        let mut counter = CountingWriter::default();
        serde_json::to_writer(&mut counter, data)
            .map_err(|e| StorageError::Codec(e.to_string()))?;
        Ok(counter.written + self.overhead)
    }

    fn evaluate_remote(
        &self,
        data: &SessionData,
        codec: &SessionCodec,
    ) -> Result<u64, StorageError> {
        Ok(codec.encode(data)?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn data(payload: usize) -> SessionData {
        SessionData {
            id: "s".to_string(),
            created_ms: 0,
            requests: 0,
            max_inactive_secs: 0,
            attributes: BTreeMap::from([("blob".to_string(), json!("a".repeat(payload)))]),
        }
    }

    #[test]
    fn local_size_grows_with_attributes() {
        let eval = SerializingSizeEvaluator::default();
        let small = eval.evaluate_local(&data(10)).unwrap();
        let large = eval.evaluate_local(&data(1010)).unwrap();
        assert_eq!(large - small, 1000);
        assert!(small > SerializingSizeEvaluator::DEFAULT_OVERHEAD);
    }

    #[test]
    fn remote_size_matches_encoding() {
        let eval = SerializingSizeEvaluator::new(0);
        let codec = SessionCodec::default();
        let sample = data(100);
        assert_eq!(
            eval.evaluate_remote(&sample, &codec).unwrap(),
            codec.encode(&sample).unwrap().len() as u64
        );
        // uncompressed JSON: local equals remote without overhead
        assert_eq!(
            eval.evaluate_local(&sample).unwrap(),
            eval.evaluate_remote(&sample, &codec).unwrap()
        );
        let zstd = SessionCodec::compressed();
        assert!(eval.evaluate_remote(&data(5000), &zstd).unwrap() < 5000);
    }
}
