//! In-memory fakes for the collaborator traits in `engine::collab`, used by
//! that crate's own unit tests and by end-to-end scenario tests.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use engine::collab::{
    Clock, CompletionHandle, Configuration, IndexRecordAcquired, IndexRecordHandler, IndexStore,
    MessageChannel, OutboundMessage, RequestHandler, Sequencer, SubscriptionId, TempFileProvider,
    WireError,
};
use protocol::{FileRecord, Request, Response};

struct ChannelState {
    responses: Vec<Response>,
    index_updates: Vec<protocol::IndexUpdate>,
    folders: HashSet<String>,
    request_handlers: Vec<(u64, Arc<dyn RequestHandler>)>,
    next_subscription: u64,
    closed: bool,
    pending_response_failures: u32,
}

/// A [`MessageChannel`] that records everything sent and dispatches
/// inbound requests synchronously to every subscribed handler, preserving
/// subscription order.
pub struct InMemoryChannel {
    state: Mutex<ChannelState>,
}

impl InMemoryChannel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChannelState {
                responses: Vec::new(),
                index_updates: Vec::new(),
                folders: HashSet::new(),
                request_handlers: Vec::new(),
                next_subscription: 1,
                closed: false,
                pending_response_failures: 0,
            }),
        }
    }

    /// Declares `folder` shared, so `has_folder` and precondition checks
    /// against it succeed.
    pub fn add_folder(&self, folder: impl Into<String>) {
        self.state.lock().expect("channel mutex poisoned").folders.insert(folder.into());
    }

    /// Makes the next `Response` send fail its completion handle; does not
    /// affect `IndexUpdate` sends.
    pub fn fail_next_response(&self) {
        self.state.lock().expect("channel mutex poisoned").pending_response_failures += 1;
    }

    /// Every `Response` sent so far, in send order.
    #[must_use]
    pub fn sent_responses(&self) -> Vec<Response> {
        self.state.lock().expect("channel mutex poisoned").responses.clone()
    }

    /// Every `IndexUpdate` sent so far, in send order.
    #[must_use]
    pub fn sent_index_updates(&self) -> Vec<protocol::IndexUpdate> {
        self.state.lock().expect("channel mutex poisoned").index_updates.clone()
    }

    /// Delivers `request` to every currently subscribed handler, in
    /// subscription order, awaiting each in turn.
    pub async fn deliver(&self, request: Request) {
        let handlers: Vec<Arc<dyn RequestHandler>> = {
            let guard = self.state.lock().expect("channel mutex poisoned");
            guard.request_handlers.iter().map(|(_, handler)| Arc::clone(handler)).collect()
        };
        for handler in handlers {
            handler.handle(request.clone()).await;
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().expect("channel mutex poisoned").closed
    }
}

impl Default for InMemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageChannel for InMemoryChannel {
    fn send(&self, message: OutboundMessage) -> CompletionHandle {
        let result = {
            let mut guard = self.state.lock().expect("channel mutex poisoned");
            match message {
                OutboundMessage::Response(response) => {
                    if guard.pending_response_failures > 0 {
                        guard.pending_response_failures -= 1;
                        Err(WireError("simulated wire failure".to_string()))
                    } else {
                        guard.responses.push(response);
                        Ok(())
                    }
                }
                OutboundMessage::IndexUpdate(update) => {
                    guard.index_updates.push(update);
                    Ok(())
                }
            }
        };
        Box::pin(async move { result })
    }

    fn subscribe_requests(&self, handler: Arc<dyn RequestHandler>) -> SubscriptionId {
        let mut guard = self.state.lock().expect("channel mutex poisoned");
        let id = guard.next_subscription;
        guard.next_subscription += 1;
        guard.request_handlers.push((id, handler));
        SubscriptionId(id)
    }

    fn unsubscribe_requests(&self, id: SubscriptionId) {
        let mut guard = self.state.lock().expect("channel mutex poisoned");
        guard.request_handlers.retain(|(existing, _)| *existing != id.0);
    }

    fn has_folder(&self, folder: &str) -> bool {
        self.state.lock().expect("channel mutex poisoned").folders.contains(folder)
    }

    async fn close(&self) {
        self.state.lock().expect("channel mutex poisoned").closed = true;
    }
}

/// A [`Sequencer`] backed by an atomic counter, seeded with a starting
/// value so tests can assert on exact sequence numbers.
pub struct CountingSequencer {
    next: AtomicU64,
}

impl CountingSequencer {
    #[must_use]
    pub fn starting_at(first: u64) -> Self {
        Self { next: AtomicU64::new(first) }
    }
}

impl Sequencer for CountingSequencer {
    fn next_sequence(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

/// A [`Clock`] pinned to a fixed millisecond value.
pub struct FixedClock {
    millis: i64,
}

impl FixedClock {
    #[must_use]
    pub fn new(millis: i64) -> Self {
        Self { millis }
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.millis
    }
}

/// A [`Configuration`] carrying a fixed device id.
pub struct InMemoryConfiguration {
    device_id: Vec<u8>,
}

impl InMemoryConfiguration {
    #[must_use]
    pub fn new(device_id: Vec<u8>) -> Self {
        Self { device_id }
    }
}

impl Configuration for InMemoryConfiguration {
    fn local_device_id(&self) -> Vec<u8> {
        self.device_id.clone()
    }
}

struct IndexStoreState {
    records: Vec<(String, FileRecord)>,
    acquired_handlers: Vec<(u64, Arc<dyn IndexRecordHandler>)>,
    next_subscription: u64,
}

/// An [`IndexStore`] that records every pushed record and dispatches
/// acquisition events synchronously to every subscribed handler.
pub struct RecordingIndexStore {
    state: Mutex<IndexStoreState>,
}

impl RecordingIndexStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(IndexStoreState {
                records: Vec::new(),
                acquired_handlers: Vec::new(),
                next_subscription: 1,
            }),
        }
    }

    /// Every record pushed so far, paired with its folder.
    #[must_use]
    pub fn pushed_records(&self) -> Vec<(String, FileRecord)> {
        self.state.lock().expect("index store mutex poisoned").records.clone()
    }

    /// Simulates the remote peer's index echoing `new_records` back,
    /// notifying every subscribed [`IndexRecordHandler`].
    pub async fn acquire(&self, folder: impl Into<String>, new_records: Vec<FileRecord>) {
        let folder = folder.into();
        let handlers: Vec<Arc<dyn IndexRecordHandler>> = {
            let guard = self.state.lock().expect("index store mutex poisoned");
            guard.acquired_handlers.iter().map(|(_, handler)| Arc::clone(handler)).collect()
        };
        let event = IndexRecordAcquired { folder, new_records };
        for handler in handlers {
            handler.handle(event.clone()).await;
        }
    }
}

impl Default for RecordingIndexStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexStore for RecordingIndexStore {
    fn push_record(&self, folder: &str, record: FileRecord) {
        self.state
            .lock()
            .expect("index store mutex poisoned")
            .records
            .push((folder.to_string(), record));
    }

    fn subscribe_acquired(&self, handler: Arc<dyn IndexRecordHandler>) -> SubscriptionId {
        let mut guard = self.state.lock().expect("index store mutex poisoned");
        let id = guard.next_subscription;
        guard.next_subscription += 1;
        guard.acquired_handlers.push((id, handler));
        SubscriptionId(id)
    }

    fn unsubscribe_acquired(&self, id: SubscriptionId) {
        let mut guard = self.state.lock().expect("index store mutex poisoned");
        guard.acquired_handlers.retain(|(existing, _)| *existing != id.0);
    }
}

/// A [`TempFileProvider`] backed by a real [`tempfile::TempDir`], so tests
/// that spill streams to disk exercise real filesystem I/O without leaking
/// files past the test.
pub struct TempDirProvider {
    dir: tempfile::TempDir,
    next: AtomicU64,
}

impl TempDirProvider {
    /// # Errors
    /// Returns an error if the backing temp directory cannot be created.
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
            next: AtomicU64::new(0),
        })
    }
}

impl TempFileProvider for TempDirProvider {
    fn create_temp_file(&self) -> std::io::Result<PathBuf> {
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        Ok(self.dir.path().join(format!("spill-{index}")))
    }
}
