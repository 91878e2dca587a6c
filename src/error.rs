//! Typed errors for every surface of the crate, grouped by publish phase.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::name::Name;

/// Platform error code captured at the failing syscall.
///
/// POSIX `errno` values and Windows `GetLastError()` values occupy
/// different numbering spaces, so the origin is kept in the tag rather
/// than collapsed into a bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsCode {
    /// A POSIX `errno` value.
    Errno(i32),
    /// A Windows `GetLastError()` value.
    Windows(u32),
}

impl OsCode {
    /// Captures the calling thread's current platform error code.
    pub(crate) fn last() -> Self {
        #[cfg(unix)]
        {
            OsCode::Errno(io::Error::last_os_error().raw_os_error().unwrap_or(0))
        }
        #[cfg(windows)]
        {
            OsCode::Windows(io::Error::last_os_error().raw_os_error().unwrap_or(0) as u32)
        }
    }

    /// Extracts the code carried by an [`io::Error`], when it has one.
    pub(crate) fn from_io(err: &io::Error) -> Self {
        match err.raw_os_error() {
            #[cfg(unix)]
            Some(code) => OsCode::Errno(code),
            #[cfg(windows)]
            Some(code) => OsCode::Windows(code as u32),
            None => {
                #[cfg(unix)]
                {
                    OsCode::Errno(libc::EIO)
                }
                #[cfg(windows)]
                {
                    OsCode::Windows(windows_sys::Win32::Foundation::ERROR_GEN_FAILURE)
                }
            }
        }
    }

    /// The raw numeric value, regardless of origin.
    pub fn raw(&self) -> i64 {
        match *self {
            OsCode::Errno(code) => i64::from(code),
            OsCode::Windows(code) => i64::from(code),
        }
    }

    /// The `errno` value, if this code came from a POSIX syscall.
    pub fn errno(&self) -> Option<i32> {
        match *self {
            OsCode::Errno(code) => Some(code),
            OsCode::Windows(_) => None,
        }
    }

    /// Whether this code means "the path does not exist".
    pub(crate) fn is_not_found(&self) -> bool {
        #[cfg(unix)]
        {
            *self == OsCode::Errno(libc::ENOENT)
        }
        #[cfg(windows)]
        {
            use windows_sys::Win32::Foundation::{ERROR_FILE_NOT_FOUND, ERROR_PATH_NOT_FOUND};
            matches!(
                *self,
                OsCode::Windows(ERROR_FILE_NOT_FOUND) | OsCode::Windows(ERROR_PATH_NOT_FOUND)
            )
        }
    }

    /// Whether this code means "the path already exists".
    pub(crate) fn is_already_exists(&self) -> bool {
        #[cfg(unix)]
        {
            *self == OsCode::Errno(libc::EEXIST)
        }
        #[cfg(windows)]
        {
            use windows_sys::Win32::Foundation::{ERROR_ALREADY_EXISTS, ERROR_FILE_EXISTS};
            matches!(
                *self,
                OsCode::Windows(ERROR_ALREADY_EXISTS) | OsCode::Windows(ERROR_FILE_EXISTS)
            )
        }
    }

    /// Whether this code means "source and destination are on different
    /// filesystems".
    pub(crate) fn is_cross_device(&self) -> bool {
        #[cfg(unix)]
        {
            *self == OsCode::Errno(libc::EXDEV)
        }
        #[cfg(windows)]
        {
            use windows_sys::Win32::Foundation::ERROR_NOT_SAME_DEVICE;
            *self == OsCode::Windows(ERROR_NOT_SAME_DEVICE)
        }
    }

    /// Human-readable message from `strerror` / `FormatMessageW`.
    pub fn message(&self) -> String {
        let raw = match *self {
            OsCode::Errno(code) => code,
            OsCode::Windows(code) => code as i32,
        };
        io::Error::from_raw_os_error(raw).to_string()
    }
}

impl std::fmt::Display for OsCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            OsCode::Errno(code) => write!(f, "errno {code} ({})", self.message()),
            OsCode::Windows(code) => write!(f, "win32 error {code} ({})", self.message()),
        }
    }
}

/// The metadata-preservation operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataOp {
    Permissions,
    Ownership,
    Timestamps,
    ExtendedAttributes,
    Acls,
}

impl std::fmt::Display for MetadataOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MetadataOp::Permissions => "permissions",
            MetadataOp::Ownership => "ownership",
            MetadataOp::Timestamps => "timestamps",
            MetadataOp::ExtendedAttributes => "extended attributes",
            MetadataOp::Acls => "ACLs",
        };
        f.write_str(name)
    }
}

/// Parent-directory verification errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParentError {
    /// The directory (or a component leading to it) denied access.
    #[error("access denied to parent directory '{}': {code}", .path.display())]
    AccessDenied { path: PathBuf, code: OsCode },
    /// The path exists but names something other than a directory.
    #[error("'{}' exists but is not a directory", .path.display())]
    NotADirectory { path: PathBuf },
    /// The directory does not exist and intermediate creation was not
    /// requested.
    #[error("parent directory '{}' does not exist", .path.display())]
    Missing { path: PathBuf },
    /// The stat call failed with a code that maps to no dedicated kind.
    #[error("cannot stat parent directory '{}': {code}", .path.display())]
    StatFailed { path: PathBuf, code: OsCode },
    /// The path is syntactically invalid for the platform
    /// (Windows `ERROR_INVALID_NAME` and friends).
    #[error("invalid parent directory path '{}': {code}", .path.display())]
    InvalidPath { path: PathBuf, code: OsCode },
    /// A network share component in the path could not be found (Windows).
    #[error("network path '{}' not found: {code}", .path.display())]
    NetworkPathNotFound { path: PathBuf, code: OsCode },
    /// Creating the directory (or one of its ancestors) failed.
    #[error("cannot create parent directory '{}': {code}", .path.display())]
    CreationFailed { path: PathBuf, code: OsCode },
}

/// Failures of atomic and streaming publication.
///
/// Every kind except [`WriteError::DirectorySyncFailedAfterCommit`] is
/// pre-publish: the destination path is untouched and any temp file has
/// been removed. `DirectorySyncFailedAfterCommit` means the rename already
/// succeeded; the destination holds the complete new content but the
/// rename itself may not survive a power loss.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The destination's parent directory failed verification.
    #[error("parent check failed: {0}")]
    Parent(#[from] ParentError),
    /// The pre-write stat of the destination failed with an unexpected
    /// code (plain "does not exist" is not an error).
    #[error("cannot stat destination '{}': {code}", .path.display())]
    DestinationStatFailed { path: PathBuf, code: OsCode },
    /// The destination names a directory; a file will not clobber it.
    #[error("destination '{}' is a directory", .path.display())]
    DestinationIsDirectory { path: PathBuf },
    /// No exclusive temp file could be created next to the destination.
    #[error("cannot create temporary file in '{}': {code}", .dir.display())]
    TempFileCreationFailed { dir: PathBuf, code: OsCode },
    /// A write to the temp file (or to the destination, in direct
    /// streaming mode) failed after `written` of `expected` bytes.
    #[error("write to '{}' failed after {written} of {expected} bytes: {code}", .path.display())]
    WriteFailed {
        path: PathBuf,
        written: u64,
        expected: u64,
        code: OsCode,
    },
    /// Syncing file content to stable storage failed.
    #[error("cannot sync '{}': {code}", .path.display())]
    SyncFailed { path: PathBuf, code: OsCode },
    /// Closing the written file failed. The close is never retried on
    /// `EINTR`; the descriptor state is undefined after the first attempt.
    #[error("cannot close '{}': {code}", .path.display())]
    CloseFailed { path: PathBuf, code: OsCode },
    /// Copying one class of metadata from the old destination onto the
    /// temp file failed. Raised before the rename, so the destination is
    /// untouched.
    #[error("cannot preserve {op} for '{}': {code}", .path.display())]
    MetadataPreservationFailed {
        path: PathBuf,
        op: MetadataOp,
        code: OsCode,
    },
    /// The publishing rename failed.
    #[error("cannot rename '{}' into '{}': {code}", .from.display(), .to.display())]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        code: OsCode,
    },
    /// No-clobber publication found the destination already present.
    #[error("destination '{}' already exists", .path.display())]
    DestinationExists { path: PathBuf },
    /// Syncing the containing directory failed where no publishing
    /// rename was involved (direct streaming mode). The atomic protocols
    /// never produce this after their rename.
    #[error("cannot sync directory '{}': {code}", .dir.display())]
    DirectorySyncFailed { dir: PathBuf, code: OsCode },
    /// The rename succeeded but the subsequent directory sync failed.
    /// The file is published and must not be deleted; its directory entry
    /// may not survive a crash. Do not retry.
    #[error("'{}' was published but the directory sync failed: {code}", .path.display())]
    DirectorySyncFailedAfterCommit { path: PathBuf, code: OsCode },
    /// The platform random source failed while generating a temp-file
    /// name token.
    #[error("cannot generate random temp-file token: {code}")]
    RandomGenerationFailed { code: OsCode },
    /// The requested option requires platform support that is absent.
    #[error("'{operation}' is not supported on this platform")]
    PlatformIncompatible { operation: &'static str },
}

impl WriteError {
    /// Whether the destination was already published when this error was
    /// raised. A published destination holds the complete new content.
    pub fn published(&self) -> bool {
        matches!(self, WriteError::DirectorySyncFailedAfterCommit { .. })
    }
}

/// Directory iteration errors.
#[derive(Debug, Error)]
pub enum DirError {
    /// Opening the directory handle failed.
    #[error("cannot open directory '{}': {code}", .path.display())]
    Open { path: PathBuf, code: OsCode },
    /// Reading the next entry failed.
    #[error("cannot read directory '{}': {code}", .path.display())]
    Read { path: PathBuf, code: OsCode },
}

/// Recursive walk errors.
#[derive(Debug, Error)]
pub enum WalkError {
    /// An underlying directory open or read failed.
    #[error(transparent)]
    Dir(#[from] DirError),
    /// An entry's name could not be decoded and the walk's policy is
    /// [`crate::dir::UndecodablePolicy::Stop`]. The raw name is preserved
    /// so callers can log a hex dump.
    #[error("undecodable entry {name:?} in '{parent}'", parent = .parent.display())]
    Undecodable { parent: PathBuf, name: Name },
}

/// Errors of the thin single-syscall collaborators in [`crate::ops`].
#[derive(Debug, Error)]
pub enum OpError {
    #[error("cannot remove '{}': {code}", .path.display())]
    Remove { path: PathBuf, code: OsCode },
    #[error("cannot link '{}' to '{}': {code}", .original.display(), .link.display())]
    Link {
        original: PathBuf,
        link: PathBuf,
        code: OsCode,
    },
    #[error("cannot create symlink '{}' -> '{}': {code}", .link.display(), .target.display())]
    Symlink {
        target: PathBuf,
        link: PathBuf,
        code: OsCode,
    },
    #[error("cannot read symlink '{}': {code}", .path.display())]
    ReadLink { path: PathBuf, code: OsCode },
    #[error("cannot copy '{}' to '{}': {code}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        code: OsCode,
    },
    #[error("cannot move '{}' to '{}': {code}", .from.display(), .to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        code: OsCode,
    },
    #[error("cannot stat '{}': {code}", .path.display())]
    Stat { path: PathBuf, code: OsCode },
}
