#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `protocol` defines the handful of Block Exchange Protocol (BEP) wire
//! types this engine actually emits or handles: `IndexUpdate`, `Request`,
//! `Response`, and the `FileInfo`/`Vector`/`Counter` values carried inside
//! an `IndexUpdate`. The actual protobuf framing, TLS transport, and device
//! authentication live outside this workspace -- see spec.md §1 -- so these
//! types are plain Rust values a framing layer serialises, not generated
//! protobuf bindings.
//!
//! # Design
//!
//! [`message`] holds the wire-level structs. [`version`] holds the pure,
//! deterministic version-vector merge policy described in spec.md §4.B,
//! plus the device-id projection used to pick a vector's new counter id.
//!
//! # Invariants
//!
//! - [`version::build_vector`] never reorders or deduplicates; it always
//!   copies the previous counters verbatim and appends exactly one new
//!   counter, even if a counter for the same device id already appears
//!   earlier in the list (spec.md §3, bit-compatibility note).
//! - `BLOCK_SIZE` is fixed at 128 KiB; every `BlockInfo::size` other than
//!   the final block of a file is exactly `BLOCK_SIZE`.

pub mod message;
pub mod version;

/// Fixed block size used to partition every file: 128 KiB.
pub const BLOCK_SIZE: u32 = 131_072;

pub use message::{
    BlockInfo, FileRecord, FileType, IndexUpdate, Request, Response, ResponseCode,
};
pub use version::{build_vector, projected_device_id, Counter, VersionVector};
