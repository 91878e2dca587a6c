//! Cross-platform file-system primitives with a crash-safe core.
//!
//! The heart of the crate is atomic file publication: after any crash,
//! power loss, or abandoned operation, a destination path holds either
//! its complete new content or its prior content, never a torn file.
//! [`atomic::write_atomic`] covers the single-span case,
//! [`streaming::write_stream`] the chunked case, both over one
//! temp-file/sync/rename/directory-sync protocol with per-platform
//! rename and durability selection.
//!
//! Around it: [`dir`] iterates and walks directories while preserving
//! kernel-raw names ([`name::Name`]) so undecodable entries stay
//! referable, [`parent`] verifies or creates destination directories,
//! [`meta`] maps `stat` to a product type, and [`ops`] wraps the small
//! single-syscall collaborators.

pub mod atomic;
pub mod dir;
pub mod error;
pub mod meta;
pub mod name;
pub mod ops;
pub mod parent;
pub mod resolve;
pub mod streaming;

mod sys;

pub use atomic::{write_atomic, AtomicWriteOptions, CommitPhase, Durability, OverwriteStrategy};
pub use dir::{
    walk, DirEntry, EntryLocation, ReadDir, UndecodablePolicy, Walk, WalkEntry, WalkOptions,
};
pub use error::{DirError, MetadataOp, OpError, OsCode, ParentError, WalkError, WriteError};
pub use meta::{file_identity, metadata, symlink_metadata, FileId, FileKind, FileTime, Metadata};
pub use name::{DecodeError, Name};
pub use parent::verify_directory;
pub use streaming::{
    write_stream, AtomicCommitOptions, CommitMode, DirectOptions, DirectStrategy,
    StreamingWriteOptions, StreamingWriter,
};
