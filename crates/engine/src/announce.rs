//! Index Update Emitter (spec.md §4.C).

use std::sync::Arc;

use protocol::{
    build_vector, BlockInfo, Counter, FileRecord, FileType, IndexUpdate,
};

use crate::collab::{Clock, CompletionHandle, Configuration, MessageChannel, OutboundMessage, Sequencer};

/// Builds and transmits `IndexUpdate` messages, allocating one sequence
/// number (shared between `FileRecord::sequence` and the new version
/// vector counter) per call.
pub(crate) struct IndexUpdateEmitter {
    pub(crate) channel: Arc<dyn MessageChannel>,
    pub(crate) configuration: Arc<dyn Configuration>,
    pub(crate) sequencer: Arc<dyn Sequencer>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl IndexUpdateEmitter {
    fn modified_now(&self) -> (i64, i32) {
        let now_ms = self.clock.now_millis();
        let modified_s = now_ms.div_euclid(1000);
        let modified_ns = (now_ms.rem_euclid(1000) as i32) * 1_000_000;
        (modified_s, modified_ns)
    }

    fn allocate_version(&self, previous: Option<&[Counter]>) -> (u64, protocol::VersionVector) {
        let sequence = self.sequencer.next_sequence();
        let device_id = self.configuration.local_device_id();
        let version = build_vector(previous, &device_id, sequence);
        (sequence, version)
    }

    fn send_update(&self, folder: &str, record: FileRecord) -> (CompletionHandle, FileRecord) {
        let update = IndexUpdate {
            folder: folder.to_string(),
            files: vec![record.clone()],
        };
        let handle = self.channel.send(OutboundMessage::IndexUpdate(update));
        (handle, record)
    }

    /// Emits a new-file announcement with its full block list.
    pub(crate) fn emit_file(
        &self,
        folder: &str,
        path: &str,
        size: u64,
        blocks: Vec<BlockInfo>,
        previous_version: Option<&[Counter]>,
    ) -> (CompletionHandle, FileRecord) {
        let (modified_s, modified_ns) = self.modified_now();
        let (sequence, version) = self.allocate_version(previous_version);
        let record = FileRecord::new_file(
            folder, path, size, modified_s, modified_ns, version, sequence, blocks,
        );
        self.send_update(folder, record)
    }

    /// Emits a directory-creation announcement: no blocks, no previous
    /// version.
    pub(crate) fn emit_directory(
        &self,
        folder: &str,
        path: &str,
    ) -> (CompletionHandle, FileRecord) {
        let (modified_s, modified_ns) = self.modified_now();
        let (sequence, version) = self.allocate_version(None);
        let record =
            FileRecord::new_directory(folder, path, modified_s, modified_ns, version, sequence);
        self.send_update(folder, record)
    }

    /// Emits a deletion announcement, carrying the prior version history
    /// forward through the version-vector builder.
    pub(crate) fn emit_deletion(
        &self,
        folder: &str,
        path: &str,
        file_type: FileType,
        previous_version: &[Counter],
    ) -> (CompletionHandle, FileRecord) {
        let (modified_s, modified_ns) = self.modified_now();
        let (sequence, version) = self.allocate_version(Some(previous_version));
        let record = FileRecord::new_deletion(
            folder, path, file_type, modified_s, modified_ns, version, sequence,
        );
        self.send_update(folder, record)
    }
}
