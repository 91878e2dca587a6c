//! File metadata as a product type mapped from `stat` / file information.

use std::path::Path;

use crate::error::{OpError, OsCode};
use crate::sys;

/// Coarse classification of a filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    File,
    Directory,
    SymbolicLink,
    /// Sockets, FIFOs, devices, and Windows reparse points that are not
    /// plain symlinks.
    Other,
}

/// A file timestamp: seconds and nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTime {
    pub seconds: i64,
    pub nanos: u32,
}

/// Identity of a filesystem object: the `(device, inode)` pair on POSIX,
/// `(volume serial, file index)` on Windows.
///
/// Two paths with equal identity refer to the same underlying object.
/// Used by the walk's symlink-cycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    pub device: u64,
    pub inode: u64,
}

/// File attributes.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub kind: FileKind,
    /// Content length in bytes.
    pub len: u64,
    /// POSIX mode bits including the file-type bits; on Windows the raw
    /// file attribute flags.
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub id: FileId,
    pub atime: FileTime,
    pub mtime: FileTime,
    pub ctime: FileTime,
}

impl Metadata {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::SymbolicLink
    }

    /// The permission bits alone (mode & 07777). Zero on Windows.
    pub fn permissions(&self) -> u32 {
        #[cfg(unix)]
        {
            self.mode & 0o7777
        }
        #[cfg(windows)]
        {
            0
        }
    }
}

/// Reads metadata, following symlinks (`stat`).
pub fn metadata(path: impl AsRef<Path>) -> Result<Metadata, OpError> {
    let path = path.as_ref();
    sys::file_metadata(path, true).map_err(|code| stat_error(path, code))
}

/// Reads metadata of the object itself, without following a final
/// symlink (`lstat`).
pub fn symlink_metadata(path: impl AsRef<Path>) -> Result<Metadata, OpError> {
    let path = path.as_ref();
    sys::file_metadata(path, false).map_err(|code| stat_error(path, code))
}

/// The `(device, inode)` identity of the object the path resolves to.
pub fn file_identity(path: impl AsRef<Path>) -> Result<FileId, OpError> {
    metadata(path).map(|meta| meta.id)
}

fn stat_error(path: &Path, code: OsCode) -> OpError {
    OpError::Stat { path: path.to_path_buf(), code }
}
