//! Upload Coordinator (spec.md §4.E).

use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use blocks::{DataSource, InMemorySource, OnDiskSource};
use protocol::{BlockInfo, Counter};

use crate::collab::{
    CompletionHandle, IndexRecordAcquired, IndexRecordHandler, IndexStore, MessageChannel,
    SubscriptionId,
};
use crate::error::{EngineError, UploadError};
use crate::request_server::{InFlight, RequestServerHandler};
use crate::state::SharedState;

/// How the caller hands bytes to [`crate::Engine::push_file`].
pub enum UploadInput {
    /// Already-materialized, random-access bytes.
    Bytes(Vec<u8>),
    /// A path already on disk.
    File(PathBuf),
    /// A non-seekable byte stream; spilled to a temp file before use
    /// (spec.md §4.E step 1) so the resulting `DataSource` is restartable.
    Stream(Box<dyn Read + Send>),
}

pub(crate) fn spill_to_path(path: &std::path::Path, reader: &mut dyn Read) -> Result<(), EngineError> {
    use std::io::Write;
    let mut file = std::fs::File::create(path).map_err(|source| {
        EngineError::DataSource(blocks::BlocksError::Io {
            action: "create temp file",
            path: path.to_path_buf(),
            source,
        })
    })?;
    let mut buffer = [0u8; 65536];
    loop {
        let read = reader.read(&mut buffer).map_err(|source| {
            EngineError::DataSource(blocks::BlocksError::Io {
                action: "read source stream",
                path: path.to_path_buf(),
                source,
            })
        })?;
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read]).map_err(|source| {
            EngineError::DataSource(blocks::BlocksError::Io {
                action: "write temp file",
                path: path.to_path_buf(),
                source,
            })
        })?;
    }
    Ok(())
}

struct CompletionWatcher {
    path: String,
    content_hash: String,
    state: Arc<SharedState>,
}

#[async_trait::async_trait]
impl IndexRecordHandler for CompletionWatcher {
    async fn handle(&self, event: IndexRecordAcquired) {
        for record in &event.new_records {
            if record.name != self.path {
                continue;
            }
            let candidate = checksums::content_hash(record.blocks.iter().map(|b| &b.hash));
            if candidate == self.content_hash {
                tracing::debug!(path = %self.path, "completion confirmed by remote index echo");
                self.state.complete();
                return;
            }
        }
    }
}

/// The upload observer returned by `push_file`: progress, completion, and
/// scoped-release lifecycle (spec.md §4.E).
pub struct UploadObserver {
    folder: String,
    path: String,
    state: Arc<SharedState>,
    total_blocks: usize,
    record: protocol::FileRecord,
    channel: Arc<dyn MessageChannel>,
    index_store: Option<Arc<dyn IndexStore>>,
    request_subscription: Mutex<Option<SubscriptionId>>,
    index_subscription: Mutex<Option<SubscriptionId>>,
    in_flight: Arc<InFlight>,
    closed: AtomicBool,
    release_channel_on_close: bool,
    _spilled_path: Option<PathBuf>,
}

impl UploadObserver {
    /// Current progress in `[0, 1]`. `1.0` once `completed()`, or always
    /// when the file has no blocks (spec.md §4.E, §8 S1).
    #[must_use]
    pub fn progress(&self) -> f64 {
        self.state.progress(self.total_blocks)
    }

    /// Human-readable `"<pct>% <sent>/<total>"`, one decimal place.
    #[must_use]
    pub fn progress_message(&self) -> String {
        let percent = self.progress() * 100.0;
        format!("{:.1}% {}/{}", percent, self.state.sent_count(), self.total_blocks)
    }

    /// Whether the upload has reached a confirmed-complete state.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.state.is_completed()
    }

    /// The announced record this upload transmitted.
    #[must_use]
    pub fn record(&self) -> &protocol::FileRecord {
        &self.record
    }

    /// Blocks until any progress event fires, surfacing a captured error
    /// or the current progress.
    pub async fn wait_for_progress_update(&self) -> Result<f64, UploadError> {
        self.state.wait_for_progress_update(self.total_blocks).await
    }

    /// Loops [`Self::wait_for_progress_update`] until [`Self::completed`]
    /// is true.
    pub async fn wait_for_complete(&self) -> Result<(), UploadError> {
        while !self.completed() {
            self.wait_for_progress_update().await?;
        }
        Ok(())
    }

    /// Same as [`Self::wait_for_complete`], but gives up with
    /// [`EngineError::Interrupted`] after `timeout` -- the "robust"
    /// completion model spec.md §9 Open Question 1 recommends when
    /// completion depends on a remote echo that may never arrive.
    pub async fn wait_for_complete_with_timeout(
        &self,
        timeout: Duration,
    ) -> Result<(), UploadError> {
        match tokio::time::timeout(timeout, self.wait_for_complete()).await {
            Ok(result) => result,
            Err(_elapsed) => Err(UploadError::new(EngineError::Interrupted)),
        }
    }

    /// Unsubscribes both handlers, drains in-flight response workers, and
    /// persists the announced record locally. Callable exactly once; a
    /// second call is a usage error, not a silent no-op (spec.md §4.E).
    pub async fn close(&self) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(EngineError::Precondition(
                "upload observer already closed".to_string(),
            ));
        }

        self.state.shutdown();

        if let Some(id) = self
            .request_subscription
            .lock()
            .expect("subscription mutex poisoned")
            .take()
        {
            self.channel.unsubscribe_requests(id);
        }
        if let Some(id) = self
            .index_subscription
            .lock()
            .expect("subscription mutex poisoned")
            .take()
        {
            if let Some(store) = &self.index_store {
                store.unsubscribe_acquired(id);
            }
        }

        self.in_flight.drain().await;

        if let Some(store) = &self.index_store {
            store.push_record(&self.folder, self.record.clone());
        }

        if self.release_channel_on_close {
            self.channel.close().await;
        }

        tracing::info!(folder = %self.folder, path = %self.path, "upload closed");
        Ok(())
    }
}

pub(crate) struct PushFileOutcome {
    pub(crate) observer: Arc<UploadObserver>,
    pub(crate) index_update_write: CompletionHandle,
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn push_file(
    channel: Arc<dyn MessageChannel>,
    index_store: Option<Arc<dyn IndexStore>>,
    temp_files: Arc<dyn crate::collab::TempFileProvider>,
    emitter: crate::announce::IndexUpdateEmitter,
    folder: String,
    path: String,
    input: UploadInput,
    previous_version: Option<Vec<Counter>>,
    release_channel_on_close: bool,
) -> Result<PushFileOutcome, EngineError> {
    if !channel.has_folder(&folder) {
        return Err(EngineError::Precondition(format!(
            "remote peer does not share folder '{folder}'"
        )));
    }

    // Step 1: materialize a restartable, random-access DataSource.
    let (source, spilled_path): (Arc<dyn DataSource>, Option<PathBuf>) = match input {
        UploadInput::Bytes(bytes) => (Arc::new(InMemorySource::new(bytes)), None),
        UploadInput::File(file_path) => (Arc::new(OnDiskSource::new(file_path)), None),
        UploadInput::Stream(mut reader) => {
            let temp_path = temp_files.create_temp_file().map_err(|source| {
                EngineError::DataSource(blocks::BlocksError::Io {
                    action: "create temp file",
                    path: PathBuf::from("<temp>"),
                    source,
                })
            })?;
            let path_for_blocking = temp_path.clone();
            tokio::task::spawn_blocking(move || spill_to_path(&path_for_blocking, &mut reader))
                .await
                .map_err(|join_error| EngineError::TaskFailed(join_error.to_string()))??;
            (Arc::new(OnDiskSource::new(temp_path.clone())), Some(temp_path))
        }
    };

    let blocking_source = Arc::clone(&source);
    let blocks: Vec<BlockInfo> = tokio::task::spawn_blocking(move || blocking_source.blocks())
        .await
        .map_err(|join_error| EngineError::TaskFailed(join_error.to_string()))??;
    let size = {
        let blocking_source = Arc::clone(&source);
        tokio::task::spawn_blocking(move || blocking_source.size())
            .await
            .map_err(|join_error| EngineError::TaskFailed(join_error.to_string()))??
    };

    let state = Arc::new(SharedState::new());
    let in_flight = Arc::new(InFlight::new());

    // Step 2: subscribe the request handler, and, if attached, the
    // remote-echo completion watcher.
    let request_handler = Arc::new(RequestServerHandler {
        folder: folder.clone(),
        path: path.clone(),
        source: Arc::clone(&source),
        state: Arc::clone(&state),
        channel: Arc::clone(&channel),
        in_flight: Arc::clone(&in_flight),
    });
    let request_subscription = channel.subscribe_requests(request_handler);

    let index_subscription = if let Some(store) = &index_store {
        let blocking_source = Arc::clone(&source);
        let content_hash = tokio::task::spawn_blocking(move || blocking_source.content_hash())
            .await
            .map_err(|join_error| EngineError::TaskFailed(join_error.to_string()))??;
        let watcher = Arc::new(CompletionWatcher {
            path: path.clone(),
            content_hash,
            state: Arc::clone(&state),
        });
        Some(store.subscribe_acquired(watcher))
    } else {
        None
    };

    // Step 3: transmit the IndexUpdate. Do not wait for its write here.
    let (write_future, record) = emitter.emit_file(
        &folder,
        &path,
        size,
        blocks.clone(),
        previous_version.as_deref(),
    );

    let observer = Arc::new(UploadObserver {
        folder,
        path,
        state,
        total_blocks: blocks.len(),
        record,
        channel,
        index_store,
        request_subscription: Mutex::new(Some(request_subscription)),
        index_subscription: Mutex::new(index_subscription),
        in_flight,
        closed: AtomicBool::new(false),
        release_channel_on_close,
        _spilled_path: spilled_path,
    });

    Ok(PushFileOutcome {
        observer,
        index_update_write: write_future,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announce::IndexUpdateEmitter;
    use test_support::{
        CountingSequencer, FixedClock, InMemoryChannel, InMemoryConfiguration, TempDirProvider,
    };

    fn emitter(channel: Arc<dyn MessageChannel>) -> crate::announce::IndexUpdateEmitter {
        IndexUpdateEmitter {
            channel,
            configuration: Arc::new(InMemoryConfiguration::new(b"device-a".to_vec())),
            sequencer: Arc::new(CountingSequencer::starting_at(1)),
            clock: Arc::new(FixedClock::new(1_000_000)),
        }
    }

    async fn push(
        channel: Arc<InMemoryChannel>,
        data: Vec<u8>,
    ) -> Arc<UploadObserver> {
        let outcome = push_file(
            channel.clone(),
            None,
            Arc::new(TempDirProvider::new().unwrap()),
            emitter(channel),
            "f".to_string(),
            "a.bin".to_string(),
            UploadInput::Bytes(data),
            None,
            false,
        )
        .await
        .unwrap();
        outcome.observer
    }

    #[tokio::test]
    async fn progress_message_formats_percentage_and_counts() {
        let channel = Arc::new(InMemoryChannel::new());
        channel.add_folder("f");
        let observer = push(channel, vec![0u8; 300_000]).await;

        assert_eq!(observer.progress_message(), "0.0% 0/3");
        observer.state.mark_sent("x".to_string());
        assert_eq!(observer.progress_message(), "33.3% 1/3");
    }

    #[tokio::test]
    async fn wait_for_complete_with_timeout_surfaces_interrupted_after_close() {
        let channel = Arc::new(InMemoryChannel::new());
        channel.add_folder("f");
        let observer = push(channel, vec![0u8; 1024]).await;
        assert!(!observer.completed());

        let waiter_observer = Arc::clone(&observer);
        let waiter = tokio::spawn(async move {
            waiter_observer
                .wait_for_complete_with_timeout(Duration::from_secs(5))
                .await
        });
        tokio::task::yield_now().await;

        observer.close().await.unwrap();

        let result = waiter.await.unwrap();
        assert!(matches!(
            result,
            Err(upload_error) if matches!(upload_error.0.as_ref(), EngineError::Interrupted)
        ));
    }

    #[tokio::test]
    async fn wait_for_complete_with_timeout_elapses_when_never_closed() {
        let channel = Arc::new(InMemoryChannel::new());
        channel.add_folder("f");
        let observer = push(channel, vec![0u8; 1024]).await;

        let result = observer
            .wait_for_complete_with_timeout(Duration::from_millis(20))
            .await;
        assert!(matches!(
            result,
            Err(upload_error) if matches!(upload_error.0.as_ref(), EngineError::Interrupted)
        ));
        observer.close().await.unwrap();
    }
}
