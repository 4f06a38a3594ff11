use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by [`crate::DataSource`] operations.
#[derive(Debug, Error)]
pub enum BlocksError {
    /// Opening or reading the underlying stream failed.
    #[error("failed to {action} {path}: {source}")]
    Io {
        /// What was being attempted, for diagnostics (e.g. "open", "read").
        action: &'static str,
        /// Path of the source, or `"<memory>"` for in-memory sources.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A read returned fewer bytes than requested (short read/EOF).
    #[error("short read during {action}: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// What was being attempted (e.g. "skip to offset", "read block").
        action: &'static str,
        /// Bytes expected.
        expected: usize,
        /// Bytes actually read.
        actual: usize,
    },

    /// `DataSource::block` computed a digest that does not match the
    /// caller-supplied expected hash. Fatal: the source changed under us.
    #[error(
        "block hash mismatch at offset {offset} size {size}: expected {expected}, got {actual}"
    )]
    HashMismatch {
        /// Offset of the block that failed verification.
        offset: u64,
        /// Size of the block that failed verification.
        size: u32,
        /// Hash the caller expected.
        expected: String,
        /// Hash actually computed from the read bytes.
        actual: String,
    },

    /// A request asked for a block larger than `BLOCK_SIZE`.
    #[error("requested block size {requested} exceeds BLOCK_SIZE ({limit})")]
    BlockSizeOutOfRange {
        /// Size requested by the caller.
        requested: u32,
        /// The fixed `BLOCK_SIZE` limit.
        limit: u32,
    },
}
