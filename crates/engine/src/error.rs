use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced synchronously, before any wire traffic, per spec.md §7
/// ("Precondition") plus every other engine-local failure class.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The caller asked for something the channel or arguments cannot
    /// support: an unshared folder, a mismatched `(folder, path)` pair, a
    /// request outside `BLOCK_SIZE`, or a double `close()`.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A local I/O or invariant failure surfaced by the `blocks` crate:
    /// temp-file creation, stream read, or a block-hash mismatch.
    #[error(transparent)]
    DataSource(#[from] blocks::BlocksError),

    /// A `Response` (or `IndexUpdate`) write to the remote peer failed.
    #[error("wire write failed: {0}")]
    Wire(String),

    /// The `DataSource` had nothing to return for a requested hash.
    #[error("no data available for requested block")]
    MissingData,

    /// A background task (e.g. a blocking read) was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskFailed(String),

    /// A wait was interrupted by `close()` rather than by a normal
    /// progress/completion event.
    #[error("wait interrupted by shutdown")]
    Interrupted,
}

/// The error surfaced to an [`crate::upload::UploadObserver`] waiter.
///
/// Wraps a shared [`EngineError`] behind an `Arc` so the single captured
/// `upload_error` (spec.md §3 -- "at most one error") can be handed to
/// every waiter without requiring `EngineError` itself to implement
/// `Clone`, which would be awkward for the I/O variants it wraps.
#[derive(Debug, Clone)]
pub struct UploadError(pub(crate) Arc<EngineError>);

impl UploadError {
    pub(crate) fn new(error: EngineError) -> Self {
        Self(Arc::new(error))
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl StdError for UploadError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.0.as_ref())
    }
}
