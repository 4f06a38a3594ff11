//! `UploadState` (spec.md §3): the mutable state shared between the
//! request server, the index-echo watcher, and the observer for the
//! lifetime of a single `push_file` call.

use std::sync::Mutex;

use rustc_hash::FxHashSet;
use tokio::sync::Notify;

use crate::error::{EngineError, UploadError};

struct Inner {
    sent_blocks: FxHashSet<String>,
    error: Option<UploadError>,
    completed: bool,
}

/// Shared, concurrently mutated upload state plus its wait/notify point.
///
/// `error` is single-assignment (first writer wins); `completed` is
/// monotone false -> true. Every mutation happens under `inner`'s mutex and
/// is followed by a `notify_waiters()` call so no wakeup is lost (spec.md
/// §5, "progress_condition must be notified under the same mutex").
pub(crate) struct SharedState {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                sent_blocks: FxHashSet::default(),
                error: None,
                completed: false,
            }),
            notify: Notify::new(),
        }
    }

    pub(crate) fn mark_sent(&self, hex_hash: String) {
        let mut guard = self.inner.lock().expect("upload state mutex poisoned");
        guard.sent_blocks.insert(hex_hash);
        drop(guard);
        self.notify.notify_waiters();
    }

    pub(crate) fn set_error(&self, error: EngineError) {
        let mut guard = self.inner.lock().expect("upload state mutex poisoned");
        if guard.error.is_none() {
            guard.error = Some(UploadError::new(error));
        }
        drop(guard);
        self.notify.notify_waiters();
    }

    pub(crate) fn complete(&self) {
        let mut guard = self.inner.lock().expect("upload state mutex poisoned");
        guard.completed = true;
        drop(guard);
        self.notify.notify_waiters();
    }

    /// Called by `close()`. If the upload had not already reached a
    /// terminal state (`completed`, or an error already captured), captures
    /// `EngineError::Interrupted` so every parked or future waiter observes
    /// the close as a wait failure rather than a silent success (spec.md
    /// §5: "the interruption is surfaced as a wait failure"). Always wakes
    /// every current waiter.
    pub(crate) fn shutdown(&self) {
        let mut guard = self.inner.lock().expect("upload state mutex poisoned");
        if !guard.completed && guard.error.is_none() {
            guard.error = Some(UploadError::new(EngineError::Interrupted));
        }
        drop(guard);
        self.notify.notify_waiters();
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.inner.lock().expect("upload state mutex poisoned").completed
    }

    pub(crate) fn has_error(&self) -> bool {
        self.inner.lock().expect("upload state mutex poisoned").error.is_some()
    }

    pub(crate) fn sent_count(&self) -> usize {
        self.inner.lock().expect("upload state mutex poisoned").sent_blocks.len()
    }

    pub(crate) fn progress(&self, total_blocks: usize) -> f64 {
        let guard = self.inner.lock().expect("upload state mutex poisoned");
        if guard.completed || total_blocks == 0 {
            1.0
        } else {
            guard.sent_blocks.len() as f64 / total_blocks as f64
        }
    }

    /// Blocks until any event fires (a sent block, a completion, an
    /// error, or a shutdown wake), then surfaces the captured error if
    /// one was set, or the current progress otherwise.
    pub(crate) async fn wait_for_progress_update(
        &self,
        total_blocks: usize,
    ) -> Result<f64, UploadError> {
        let notified = self.notify.notified();
        notified.await;

        let guard = self.inner.lock().expect("upload state mutex poisoned");
        if let Some(error) = guard.error.clone() {
            return Err(error);
        }
        let progress = if guard.completed || total_blocks == 0 {
            1.0
        } else {
            guard.sent_blocks.len() as f64 / total_blocks as f64
        };
        Ok(progress)
    }
}
