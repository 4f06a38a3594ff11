#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `engine` implements the outbound half of the block exchange protocol
//! (spec.md §4): given a shared [`collab::MessageChannel`] to one remote
//! device, it announces files, directories, and deletions via
//! `IndexUpdate`, serves the `Request`s that follow from the announced
//! block list, and tracks each upload's progress to a confirmed
//! completion.
//!
//! # Design
//!
//! [`Engine`] is the entry point: one instance is built per remote device
//! and reused across every upload to that peer. `push_file` returns an
//! [`upload::UploadObserver`] whose lifetime spans exactly one file's
//! request-serving window; `push_dir`/`push_delete` return a
//! [`metadata_ops::MetadataObserver`] since metadata announcements carry
//! no block traffic to observe. Every collaborator this engine depends on
//! -- the channel, the sequencer, the local index, temp storage, the
//! device configuration, and the clock -- is an object-safe trait in
//! [`collab`], so callers can wire in their own transport, persistence,
//! and identity layers without this crate knowing about any of them.
//!
//! # Invariants
//!
//! - At most one error is captured per upload; the first writer wins
//!   (spec.md §3).
//! - Version vectors are append-only: a device's prior counters are never
//!   merged or dropped (spec.md §3, §4.B).
//! - `close()` on an [`upload::UploadObserver`] is callable exactly once.

mod announce;
pub mod collab;
pub mod error;
pub mod metadata_ops;
mod request_server;
mod state;
pub mod upload;

use std::sync::Arc;

use protocol::{Counter, FileRecord};

use crate::announce::IndexUpdateEmitter;
use crate::collab::{Clock, Configuration, IndexStore, MessageChannel, Sequencer, SystemClock, TempFileProvider};
pub use crate::error::{EngineError, UploadError};
pub use crate::metadata_ops::MetadataObserver;
pub use crate::upload::{UploadInput, UploadObserver};

/// The outbound block-exchange engine for one remote device.
///
/// Construct one per peer connection with [`Engine::new`] and call
/// [`Engine::push_file`], [`Engine::push_dir`], or [`Engine::push_delete`]
/// for each local change that needs announcing to that peer.
pub struct Engine {
    channel: Arc<dyn MessageChannel>,
    index_store: Option<Arc<dyn IndexStore>>,
    temp_files: Arc<dyn TempFileProvider>,
    configuration: Arc<dyn Configuration>,
    sequencer: Arc<dyn Sequencer>,
    clock: Arc<dyn Clock>,
    release_channel_on_close: bool,
}

impl Engine {
    /// Builds an engine with a real wall clock. `index_store` is optional:
    /// without it, completion can only be driven externally (spec.md §9
    /// Open Question 1) and announced records are not persisted locally.
    #[must_use]
    pub fn new(
        channel: Arc<dyn MessageChannel>,
        index_store: Option<Arc<dyn IndexStore>>,
        temp_files: Arc<dyn TempFileProvider>,
        configuration: Arc<dyn Configuration>,
        sequencer: Arc<dyn Sequencer>,
    ) -> Self {
        Self {
            channel,
            index_store,
            temp_files,
            configuration,
            sequencer,
            clock: Arc::new(SystemClock),
            release_channel_on_close: false,
        }
    }

    /// Overrides the clock, for deterministic `modified_s`/`modified_ns`
    /// in tests.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// When set, an [`UploadObserver::close`] also closes the underlying
    /// channel. Off by default, since a channel is usually shared across
    /// many concurrent uploads to the same peer.
    #[must_use]
    pub fn with_channel_released_on_close(mut self, release: bool) -> Self {
        self.release_channel_on_close = release;
        self
    }

    fn emitter(&self) -> IndexUpdateEmitter {
        IndexUpdateEmitter {
            channel: Arc::clone(&self.channel),
            configuration: Arc::clone(&self.configuration),
            sequencer: Arc::clone(&self.sequencer),
            clock: Arc::clone(&self.clock),
        }
    }

    /// Announces and serves one file (spec.md §4.E).
    ///
    /// # Errors
    /// Returns [`EngineError::Precondition`] if the peer does not share
    /// `folder`, or a [`EngineError::DataSource`]/[`EngineError::TaskFailed`]
    /// if materializing the input fails.
    pub async fn push_file(
        &self,
        folder: impl Into<String>,
        path: impl Into<String>,
        input: UploadInput,
        previous_version: Option<Vec<Counter>>,
    ) -> Result<Arc<UploadObserver>, EngineError> {
        let outcome = upload::push_file(
            Arc::clone(&self.channel),
            self.index_store.clone(),
            Arc::clone(&self.temp_files),
            self.emitter(),
            folder.into(),
            path.into(),
            input,
            previous_version,
            self.release_channel_on_close,
        )
        .await?;

        tokio::spawn(async move {
            if let Err(wire_error) = outcome.index_update_write.await {
                tracing::warn!(error = %wire_error, "index update write failed");
            }
        });

        Ok(outcome.observer)
    }

    /// Announces a directory (spec.md §4.E).
    ///
    /// # Errors
    /// Returns [`EngineError::Precondition`] if the peer does not share
    /// `folder`.
    pub async fn push_dir(
        &self,
        folder: impl AsRef<str>,
        path: impl AsRef<str>,
    ) -> Result<MetadataObserver, EngineError> {
        metadata_ops::push_dir(
            self.emitter(),
            self.index_store.clone(),
            folder.as_ref(),
            path.as_ref(),
        )
        .await
    }

    /// Announces `previous_record`'s deletion, carrying its version history
    /// forward (spec.md §4.E, §4.F).
    ///
    /// # Errors
    /// Returns [`EngineError::Precondition`] if the peer does not share
    /// `folder`.
    pub async fn push_delete(
        &self,
        folder: impl AsRef<str>,
        path: impl AsRef<str>,
        previous_record: &FileRecord,
    ) -> Result<MetadataObserver, EngineError> {
        metadata_ops::push_delete(
            self.emitter(),
            self.index_store.clone(),
            folder.as_ref(),
            path.as_ref(),
            previous_record,
        )
        .await
    }
}
