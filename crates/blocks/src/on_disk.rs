use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use protocol::BlockInfo;

use crate::error::BlocksError;
use crate::split::split_into_blocks;
use crate::{DataSource, ReadSeek};

/// A [`DataSource`] backed by a file on disk.
///
/// `size()` is satisfied from filesystem metadata without reading the
/// file; `blocks()` (and anything derived from it) requires one full read.
#[derive(Clone, Debug)]
pub struct OnDiskSource {
    path: PathBuf,
    size: OnceLock<u64>,
    blocks: OnceLock<Vec<BlockInfo>>,
    hashes: OnceLock<HashSet<String>>,
    content_hash: OnceLock<String>,
}

impl OnDiskSource {
    /// Points a data source at `path`. Does not touch the filesystem yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            size: OnceLock::new(),
            blocks: OnceLock::new(),
            hashes: OnceLock::new(),
            content_hash: OnceLock::new(),
        }
    }

    /// The path this source reads from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataSource for OnDiskSource {
    fn open(&self) -> Result<Box<dyn ReadSeek>, BlocksError> {
        let file = File::open(&self.path).map_err(|source| BlocksError::Io {
            action: "open",
            path: self.path.clone(),
            source,
        })?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn size(&self) -> Result<u64, BlocksError> {
        if let Some(cached) = self.size.get() {
            return Ok(*cached);
        }
        let metadata = std::fs::metadata(&self.path).map_err(|source| BlocksError::Io {
            action: "stat",
            path: self.path.clone(),
            source,
        })?;
        let len = metadata.len();
        let _ = self.size.set(len);
        Ok(len)
    }

    fn blocks(&self) -> Result<Vec<BlockInfo>, BlocksError> {
        if let Some(cached) = self.blocks.get() {
            return Ok(cached.clone());
        }
        let reader = self.open()?;
        let (computed, size) = split_into_blocks(reader)?;
        let _ = self.blocks.set(computed.clone());
        let _ = self.size.set(size);
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
                path: self.path.clone(),
                source,
            })?;

        let mut buffer = vec![0u8; size as usize];
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
                        path: self.path.clone(),
                        source,
                    })
                }
            }
        }

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
