//! Directory and deletion announcements (spec.md §4.E, push_dir/push_delete).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use protocol::FileRecord;

use crate::announce::IndexUpdateEmitter;
use crate::collab::{CompletionHandle, IndexStore};
use crate::error::EngineError;

/// The result of `push_dir`/`push_delete`: the announced record plus the
/// underlying wire write's lifecycle. Unlike `push_file`, metadata
/// announcements have no block traffic to observe, so `completed()`
/// reflects only the `IndexUpdate` write future, and `close()` persists the
/// record locally only once that write has resolved (spec.md §4.F).
pub struct MetadataObserver {
    record: FileRecord,
    folder: String,
    index_store: Option<Arc<dyn IndexStore>>,
    completed: Arc<AtomicBool>,
    write_task: Mutex<Option<JoinHandle<Result<(), EngineError>>>>,
    closed: AtomicBool,
}

impl MetadataObserver {
    fn new(
        folder: String,
        record: FileRecord,
        write: CompletionHandle,
        index_store: Option<Arc<dyn IndexStore>>,
    ) -> Self {
        let completed = Arc::new(AtomicBool::new(false));
        let task_completed = Arc::clone(&completed);
        let write_task = tokio::spawn(async move {
            let result = write
                .await
                .map_err(|wire_error| EngineError::Wire(wire_error.to_string()));
            task_completed.store(true, Ordering::SeqCst);
            result
        });
        Self {
            record,
            folder,
            index_store,
            completed,
            write_task: Mutex::new(Some(write_task)),
            closed: AtomicBool::new(false),
        }
    }

    /// The announced record.
    #[must_use]
    pub fn record(&self) -> &FileRecord {
        &self.record
    }

    /// True once the underlying `IndexUpdate` write has resolved, whether
    /// it succeeded or failed.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Awaits the `IndexUpdate` wire write, surfacing a write failure.
    /// Callable more than once; only the first call observes the task's
    /// result, later calls resolve immediately.
    pub async fn wait_for_write(&self) -> Result<(), EngineError> {
        let task = self.write_task.lock().expect("metadata observer mutex poisoned").take();
        match task {
            Some(task) => task.await.map_err(|join_error| EngineError::TaskFailed(join_error.to_string()))?,
            None => Ok(()),
        }
    }

    /// Awaits the write, then -- if an index store is attached and the
    /// write succeeded -- persists the announced record locally so future
    /// local views agree with what the remote has been told. Callable
    /// exactly once.
    pub async fn close(&self) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(EngineError::Precondition(
                "metadata observer already closed".to_string(),
            ));
        }
        self.wait_for_write().await?;
        if let Some(store) = &self.index_store {
            store.push_record(&self.folder, self.record.clone());
        }
        Ok(())
    }
}

pub(crate) async fn push_dir(
    emitter: IndexUpdateEmitter,
    index_store: Option<Arc<dyn IndexStore>>,
    folder: &str,
    path: &str,
) -> Result<MetadataObserver, EngineError> {
    if !emitter.channel.has_folder(folder) {
        return Err(EngineError::Precondition(format!(
            "remote peer does not share folder '{folder}'"
        )));
    }
    let (write, record) = emitter.emit_directory(folder, path);
    Ok(MetadataObserver::new(folder.to_string(), record, write, index_store))
}

/// Deletes `previous_record`: emits `type = previous_record.file_type,
/// deleted = true`, carrying its version history forward through §4.B.
pub(crate) async fn push_delete(
    emitter: IndexUpdateEmitter,
    index_store: Option<Arc<dyn IndexStore>>,
    folder: &str,
    path: &str,
    previous_record: &FileRecord,
) -> Result<MetadataObserver, EngineError> {
    if !emitter.channel.has_folder(folder) {
        return Err(EngineError::Precondition(format!(
            "remote peer does not share folder '{folder}'"
        )));
    }
    let (write, record) = emitter.emit_deletion(
        folder,
        path,
        previous_record.file_type,
        &previous_record.version,
    );
    Ok(MetadataObserver::new(folder.to_string(), record, write, index_store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::FileType;
    use test_support::{
        CountingSequencer, FixedClock, InMemoryChannel, InMemoryConfiguration, RecordingIndexStore,
    };

    fn emitter(channel: Arc<InMemoryChannel>) -> IndexUpdateEmitter {
        IndexUpdateEmitter {
            channel,
            configuration: Arc::new(InMemoryConfiguration::new(b"device-a".to_vec())),
            sequencer: Arc::new(CountingSequencer::starting_at(1)),
            clock: Arc::new(FixedClock::new(1_000_000)),
        }
    }

    #[tokio::test]
    async fn push_dir_rejects_unshared_folder() {
        let channel = Arc::new(InMemoryChannel::new());
        let result = push_dir(emitter(channel), None, "unshared", "dir").await;
        assert!(matches!(result, Err(EngineError::Precondition(_))));
    }

    #[tokio::test]
    async fn push_dir_announces_and_writes() {
        let channel = Arc::new(InMemoryChannel::new());
        channel.add_folder("f");
        let observer = push_dir(emitter(channel), None, "f", "dir").await.unwrap();
        assert_eq!(observer.record().file_type, FileType::Directory);
        assert!(!observer.completed());
        observer.wait_for_write().await.unwrap();
        assert!(observer.completed());
        assert_eq!(observer.record().name, "dir");
    }

    #[tokio::test]
    async fn push_delete_marks_deleted_and_carries_version() {
        use protocol::Counter;

        let channel = Arc::new(InMemoryChannel::new());
        channel.add_folder("f");
        let previous_record = FileRecord::new_file(
            "f",
            "a.txt",
            10,
            0,
            0,
            vec![Counter { id: 1, value: 3 }],
            3,
            vec![],
        );
        let observer = push_delete(emitter(channel), None, "f", "a.txt", &previous_record)
            .await
            .unwrap();
        assert!(observer.record().deleted);
        assert_eq!(observer.record().version.len(), 2);
        assert_eq!(observer.record().file_type, FileType::File);
    }

    #[tokio::test]
    async fn push_dir_then_push_delete_yields_version_vector_of_length_two() {
        let channel = Arc::new(InMemoryChannel::new());
        channel.add_folder("f");

        let dir_observer = push_dir(emitter(channel.clone()), None, "f", "d").await.unwrap();
        dir_observer.wait_for_write().await.unwrap();
        let announced = dir_observer.record().clone();

        let delete_observer = push_delete(emitter(channel), None, "f", "d", &announced)
            .await
            .unwrap();
        assert!(delete_observer.record().deleted);
        assert_eq!(delete_observer.record().version.len(), 2);
    }

    #[tokio::test]
    async fn close_persists_record_only_after_write_resolves() {
        let channel = Arc::new(InMemoryChannel::new());
        channel.add_folder("f");
        let index_store = Arc::new(RecordingIndexStore::new());

        let observer = push_dir(
            emitter(channel),
            Some(index_store.clone() as Arc<dyn crate::collab::IndexStore>),
            "f",
            "d",
        )
        .await
        .unwrap();
        assert!(index_store.pushed_records().is_empty());

        observer.close().await.unwrap();
        assert!(observer.completed());
        let pushed = index_store.pushed_records();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].0, "f");
        assert_eq!(pushed[0].1.name, "d");
    }

    #[tokio::test]
    async fn close_is_callable_exactly_once() {
        let channel = Arc::new(InMemoryChannel::new());
        channel.add_folder("f");
        let observer = push_dir(emitter(channel), None, "f", "d").await.unwrap();
        observer.close().await.unwrap();
        assert!(matches!(observer.close().await, Err(EngineError::Precondition(_))));
    }
}
