//! Abstract collaborator interfaces (spec.md §6): the message channel, the
//! sequencer, the index store, the temp-file provider, and the device
//! configuration. The framing/transport, device-identity cryptography, and
//! directory scanning that sit behind these traits are out of scope for
//! this engine and live in separate crates outside this workspace.

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use protocol::{FileRecord, IndexUpdate, Request, Response};

/// A message this engine enqueues onto the shared channel.
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundMessage {
    /// A file, directory, or deletion announcement.
    IndexUpdate(IndexUpdate),
    /// A reply to a previously received [`Request`].
    Response(Response),
}

/// Error produced by a failed wire write.
#[derive(Debug, Clone)]
pub struct WireError(
    /// Human-readable description of the wire failure.
    pub String,
);

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for WireError {}

/// A future resolving when a send has reached (or failed to reach) the
/// wire. Obtaining this handle from [`MessageChannel::send`] must never
/// itself block on the wire (spec.md §5, suspension point 1).
pub type CompletionHandle = Pin<Box<dyn Future<Output = Result<(), WireError>> + Send>>;

/// Opaque token identifying one subscription, returned by `subscribe_*`
/// and required to `unsubscribe_*`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(
    /// Opaque subscription identifier, unique per channel/index store.
    pub u64,
);

/// Receives inbound [`Request`] messages dispatched by a [`MessageChannel`].
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handles one inbound request. Implementations that perform blocking
    /// I/O must offload it (e.g. via `tokio::task::spawn_blocking`) rather
    /// than block the caller, which is typically a shared dispatch task.
    async fn handle(&self, request: Request);
}

/// The framed, authenticated channel to one remote device.
///
/// Implementations must be thread-safe and preserve FIFO delivery order
/// per peer (spec.md §5, Ordering).
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Enqueues `message` for transmission, returning immediately with a
    /// handle that resolves once the write completes or fails.
    fn send(&self, message: OutboundMessage) -> CompletionHandle;

    /// Registers `handler` to receive every inbound `Request`. Multiple
    /// handlers may be registered concurrently; each decides independently
    /// whether a request is scoped to it.
    fn subscribe_requests(&self, handler: Arc<dyn RequestHandler>) -> SubscriptionId;

    /// Removes a previously registered request handler.
    fn unsubscribe_requests(&self, id: SubscriptionId);

    /// True when this channel's peer has the given folder in common.
    fn has_folder(&self, folder: &str) -> bool;

    /// Shuts the channel down. Typically only called when an
    /// [`crate::upload::UploadObserver`] was constructed to release it.
    async fn close(&self);
}

/// Allocates monotonically increasing per-device sequence numbers.
pub trait Sequencer: Send + Sync {
    /// Returns a value strictly greater than any previously returned value
    /// for this device within the folder.
    fn next_sequence(&self) -> u64;
}

/// An index record acquired from the remote peer's echoed index.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexRecordAcquired {
    /// Folder the acquired records belong to.
    pub folder: String,
    /// The newly acquired records.
    pub new_records: Vec<FileRecord>,
}

/// Receives [`IndexRecordAcquired`] events from an [`IndexStore`].
#[async_trait]
pub trait IndexRecordHandler: Send + Sync {
    /// Handles one acquisition event.
    async fn handle(&self, event: IndexRecordAcquired);
}

/// The local index store tracking file metadata and version vectors.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Persists `record` locally so future local views agree with what the
    /// remote has been told.
    fn push_record(&self, folder: &str, record: FileRecord);

    /// Registers `handler` to receive acquisition events for records
    /// received from the remote.
    fn subscribe_acquired(&self, handler: Arc<dyn IndexRecordHandler>) -> SubscriptionId;

    /// Removes a previously registered acquisition handler.
    fn unsubscribe_acquired(&self, id: SubscriptionId);
}

/// Supplies a fresh path for spilling a non-seekable byte stream to disk.
pub trait TempFileProvider: Send + Sync {
    /// Creates (but need not open) a new temporary file and returns its
    /// path.
    fn create_temp_file(&self) -> std::io::Result<PathBuf>;
}

/// Device identity as seen by this engine.
pub trait Configuration: Send + Sync {
    /// Raw bytes of the local device's identity, used to derive the
    /// version-vector counter id (spec.md §3, §4.B).
    fn local_device_id(&self) -> Vec<u8>;
}

/// Wall-clock source, abstracted so tests can pin `modified_s`/`modified_ns`.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// [`Clock`] backed by `std::time::SystemTime`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis() as i64)
            .unwrap_or(0)
    }
}
