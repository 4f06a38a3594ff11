//! Wire-level message and record types.

use crate::version::VersionVector;

/// A single content-addressed block of a file.
///
/// Identity is `hash`; ordering within a file is offset-ascending and
/// contiguous (see spec.md §3, §8 property 1).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    /// Byte offset of this block within the file.
    pub offset: u64,
    /// Number of bytes in this block. At most `BLOCK_SIZE`; only the last
    /// block of a file may be smaller.
    pub size: u32,
    /// SHA-256 digest of the block's bytes.
    pub hash: [u8; 32],
}

/// Distinguishes a regular file from a directory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileType {
    /// A regular file with an associated block list.
    File,
    /// A directory entry; never carries blocks.
    Directory,
}

/// The announced unit of a single file, directory, or deletion.
///
/// Field semantics follow spec.md §3 and §6 exactly: `blocks` is empty for
/// `Directory` and for deletions, `no_permissions` is always `true` because
/// this engine does not track POSIX modes.
#[derive(Clone, Debug, PartialEq)]
pub struct FileRecord {
    /// Folder identifier the file belongs to.
    pub folder: String,
    /// Relative path of the file within the folder.
    pub name: String,
    /// File or directory.
    pub file_type: FileType,
    /// Total size in bytes. Meaningful for `File` only.
    pub size: u64,
    /// Modification time, whole seconds since the Unix epoch.
    pub modified_s: i64,
    /// Modification time, nanosecond remainder (millisecond-resolution
    /// clock sources only ever populate the millisecond sub-component).
    pub modified_ns: i32,
    /// True when this record announces a deletion.
    pub deleted: bool,
    /// Always `true`: this engine never tracks POSIX permissions.
    pub no_permissions: bool,
    /// Causal version history for this record.
    pub version: VersionVector,
    /// Per-device, per-folder sequence number. Shares its value with
    /// `version`'s newly appended counter (spec.md §4.C).
    pub sequence: u64,
    /// Ordered, offset-ascending block list. Empty for `Directory` and for
    /// deletions.
    pub blocks: Vec<BlockInfo>,
}

impl FileRecord {
    /// Builds the `FileRecord` for a brand-new file announcement.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new_file(
        folder: impl Into<String>,
        name: impl Into<String>,
        size: u64,
        modified_s: i64,
        modified_ns: i32,
        version: VersionVector,
        sequence: u64,
        blocks: Vec<BlockInfo>,
    ) -> Self {
        Self {
            folder: folder.into(),
            name: name.into(),
            file_type: FileType::File,
            size,
            modified_s,
            modified_ns,
            deleted: false,
            no_permissions: true,
            version,
            sequence,
            blocks,
        }
    }

    /// Builds the `FileRecord` for a directory announcement: no blocks, no
    /// size, not deleted.
    #[must_use]
    pub fn new_directory(
        folder: impl Into<String>,
        name: impl Into<String>,
        modified_s: i64,
        modified_ns: i32,
        version: VersionVector,
        sequence: u64,
    ) -> Self {
        Self {
            folder: folder.into(),
            name: name.into(),
            file_type: FileType::Directory,
            size: 0,
            modified_s,
            modified_ns,
            deleted: false,
            no_permissions: true,
            version,
            sequence,
            blocks: Vec::new(),
        }
    }

    /// Builds the `FileRecord` describing a deletion: same `file_type` as
    /// the record being superseded, `deleted = true`, no blocks.
    #[must_use]
    pub fn new_deletion(
        folder: impl Into<String>,
        name: impl Into<String>,
        file_type: FileType,
        modified_s: i64,
        modified_ns: i32,
        version: VersionVector,
        sequence: u64,
    ) -> Self {
        Self {
            folder: folder.into(),
            name: name.into(),
            file_type,
            size: 0,
            modified_s,
            modified_ns,
            deleted: true,
            no_permissions: true,
            version,
            sequence,
            blocks: Vec::new(),
        }
    }
}

/// Announces one or more file records to a peer.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexUpdate {
    /// Folder the announced files belong to.
    pub folder: String,
    /// The announced records. This engine always sends exactly one.
    pub files: Vec<FileRecord>,
}

/// A block request received from a remote peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    /// Request identifier; echoed back in the matching `Response`.
    pub id: i32,
    /// Folder the requested file belongs to.
    pub folder: String,
    /// Relative path of the requested file.
    pub name: String,
    /// Byte offset of the requested block.
    pub offset: i64,
    /// Size in bytes of the requested block.
    pub size: i32,
    /// SHA-256 digest the remote expects the returned bytes to hash to.
    pub hash: Vec<u8>,
}

impl Request {
    /// True when this request is scoped to the given upload
    /// (`folder`, `path`) pair, per spec.md §4.D.
    #[must_use]
    pub fn matches(&self, folder: &str, path: &str) -> bool {
        self.folder == folder && self.name == path
    }
}

/// Status code carried by a [`Response`]. The engine only ever sends
/// `NoError`; other variants exist for wire completeness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    /// The requested block was served successfully.
    NoError,
    /// The requested block was not available (unused by this engine).
    NoSuchFile,
    /// The requested block's invariant could not be upheld (unused by this
    /// engine; a hash mismatch is surfaced as a local error instead).
    InvalidData,
}

/// A reply to a single [`Request`].
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    /// Matches the originating `Request::id`.
    pub id: i32,
    /// Always `NoError` for responses this engine produces.
    pub code: ResponseCode,
    /// The requested block's bytes.
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_matches_scopes_on_folder_and_name() {
        let request = Request {
            id: 1,
            folder: "photos".to_string(),
            name: "a/b.jpg".to_string(),
            offset: 0,
            size: 4,
            hash: vec![],
        };
        assert!(request.matches("photos", "a/b.jpg"));
        assert!(!request.matches("photos", "a/c.jpg"));
        assert!(!request.matches("other", "a/b.jpg"));
    }

    #[test]
    fn new_directory_has_no_blocks_and_zero_size() {
        let record = FileRecord::new_directory("f", "dir", 0, 0, vec![], 1);
        assert_eq!(record.file_type, FileType::Directory);
        assert!(record.blocks.is_empty());
        assert_eq!(record.size, 0);
        assert!(!record.deleted);
        assert!(record.no_permissions);
    }

    #[test]
    fn new_deletion_preserves_prior_file_type() {
        let record =
            FileRecord::new_deletion("f", "path", FileType::File, 0, 0, vec![], 12);
        assert!(record.deleted);
        assert_eq!(record.file_type, FileType::File);
        assert!(record.blocks.is_empty());
    }
}
