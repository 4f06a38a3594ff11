use std::collections::HashSet;
use std::io::{Cursor, Seek, SeekFrom};
use std::sync::{Arc, OnceLock};

use protocol::BlockInfo;

use crate::error::BlocksError;
use crate::split::split_into_blocks;
use crate::{DataSource, ReadSeek};

/// A [`DataSource`] backed by an in-memory byte buffer.
///
/// Restartable and random-access by construction; callers that need a
/// streaming, non-seekable source spill to disk first via
/// [`crate::OnDiskSource`] instead (spec.md §4.E step 1).
#[derive(Clone, Debug)]
pub struct InMemorySource {
    bytes: Arc<[u8]>,
    blocks: Arc<OnceLock<Vec<BlockInfo>>>,
    hashes: Arc<OnceLock<HashSet<String>>>,
    content_hash: Arc<OnceLock<String>>,
}

impl InMemorySource {
    /// Wraps `bytes` as a data source.
    #[must_use]
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
            blocks: Arc::new(OnceLock::new()),
            hashes: Arc::new(OnceLock::new()),
            content_hash: Arc::new(OnceLock::new()),
        }
    }
}

impl DataSource for InMemorySource {
    fn open(&self) -> Result<Box<dyn ReadSeek>, BlocksError> {
        Ok(Box::new(Cursor::new(Arc::clone(&self.bytes))))
    }

    fn size(&self) -> Result<u64, BlocksError> {
        Ok(self.bytes.len() as u64)
    }

    fn blocks(&self) -> Result<Vec<BlockInfo>, BlocksError> {
        if let Some(cached) = self.blocks.get() {
            return Ok(cached.clone());
        }
        let (computed, _size) = split_into_blocks(Cursor::new(Arc::clone(&self.bytes)))?;
        let _ = self.blocks.set(computed.clone());
        Ok(computed)
    }

    fn hashes(&self) -> Result<HashSet<String>, BlocksError> {
        if let Some(cached) = self.hashes.get() {
            return Ok(cached.clone());
        }
        let computed: HashSet<String> = self
            .blocks()?
            .iter()
            .map(|block| checksums::hex_lower(&block.hash))
            .collect();
        let _ = self.hashes.set(computed.clone());
        Ok(computed)
    }

    fn content_hash(&self) -> Result<String, BlocksError> {
        if let Some(cached) = self.content_hash.get() {
            return Ok(cached.clone());
        }
        let blocks = self.blocks()?;
        let computed = checksums::content_hash(blocks.iter().map(|b| &b.hash));
        let _ = self.content_hash.set(computed.clone());
        Ok(computed)
    }

    fn block(
        &self,
        offset: u64,
        size: u32,
        expected_hex_hash: &str,
    ) -> Result<Vec<u8>, BlocksError> {
        let mut reader = self.open()?;
        reader
            .seek(SeekFrom::Start(offset))
            .map_err(|source| BlocksError::Io {
                action: "seek to offset",
                path: "<memory>".into(),
                source,
            })?;

        let mut buffer = vec![0u8; size as usize];
        read_exact_or_short(&mut reader, &mut buffer)?;

        let actual = checksums::hex_lower(&checksums::Sha256::digest(&buffer));
        if actual != expected_hex_hash {
            tracing::warn!(offset, size, expected = expected_hex_hash, actual = %actual, "block hash mismatch");
            return Err(BlocksError::HashMismatch {
                offset,
                size,
                expected: expected_hex_hash.to_string(),
                actual,
            });
        }
        Ok(buffer)
    }
}

fn read_exact_or_short(
    reader: &mut Box<dyn ReadSeek>,
    buffer: &mut [u8],
) -> Result<(), BlocksError> {
    use std::io::Read;
    let mut total = 0;
    while total < buffer.len() {
        match reader.read(&mut buffer[total..]) {
            Ok(0) => {
                return Err(BlocksError::ShortRead {
                    action: "read block",
                    expected: buffer.len(),
                    actual: total,
                })
            }
            Ok(n) => total += n,
            Err(source) => {
                return Err(BlocksError::Io {
                    action: "read block",
                    path: "<memory>".into(),
                    source,
                })
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_round_trip_reconstructs_original_bytes() {
        let data: Vec<u8> = (0..=255u8).cycle().take(300_000).collect();
        let source = InMemorySource::new(data.clone());
        let blocks = source.blocks().unwrap();

        let mut reconstructed = Vec::with_capacity(data.len());
        for block in &blocks {
            let hex_hash = checksums::hex_lower(&block.hash);
            let bytes = source.block(block.offset, block.size, &hex_hash).unwrap();
            reconstructed.extend_from_slice(&bytes);
        }
        assert_eq!(reconstructed, data);
    }

    #[test]
    fn block_with_wrong_hash_is_invariant_violation() {
        let source = InMemorySource::new(vec![1u8; 10]);
        let err = source.block(0, 10, "0000").unwrap_err();
        assert!(matches!(err, BlocksError::HashMismatch { .. }));
    }

    #[test]
    fn materialized_fields_are_stable_across_calls() {
        let source = InMemorySource::new(vec![9u8; 5000]);
        let first = source.content_hash().unwrap();
        let second = source.content_hash().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_source_has_empty_blocks_and_zero_size() {
        let source = InMemorySource::new(Vec::new());
        assert_eq!(source.size().unwrap(), 0);
        assert!(source.blocks().unwrap().is_empty());
    }
}
