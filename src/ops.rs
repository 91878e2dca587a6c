//! Thin single-syscall collaborators: remove, link, symlink, copy, move.
//!
//! Each wrapper translates the platform error into a typed [`OpError`]
//! and nothing more. The one internal recovery is cross-device moves:
//! `rename` failing with `EXDEV` falls back to copy-and-delete.

use std::path::{Path, PathBuf};

use crate::error::{OpError, OsCode};
use crate::meta;
use crate::sys;

/// Removes a file or symlink (`unlink` / `DeleteFileW`).
pub fn remove_file(path: impl AsRef<Path>) -> Result<(), OpError> {
    let path = path.as_ref();
    sys::unlink(path).map_err(|code| OpError::Remove { path: path.to_path_buf(), code })
}

/// Removes an empty directory (`rmdir` / `RemoveDirectoryW`).
pub fn remove_dir(path: impl AsRef<Path>) -> Result<(), OpError> {
    let path = path.as_ref();
    sys::remove_dir(path).map_err(|code| OpError::Remove { path: path.to_path_buf(), code })
}

/// Creates a hard link at `link` to `original`.
pub fn hard_link(original: impl AsRef<Path>, link: impl AsRef<Path>) -> Result<(), OpError> {
    let original = original.as_ref();
    let link = link.as_ref();
    sys::hard_link(original, link).map_err(|code| OpError::Link {
        original: original.to_path_buf(),
        link: link.to_path_buf(),
        code,
    })
}

/// Creates a symbolic link at `link` pointing to `target`.
pub fn symlink(target: impl AsRef<Path>, link: impl AsRef<Path>) -> Result<(), OpError> {
    let target = target.as_ref();
    let link = link.as_ref();
    sys::symlink(target, link).map_err(|code| OpError::Symlink {
        target: target.to_path_buf(),
        link: link.to_path_buf(),
        code,
    })
}

/// Reads the target a symlink points to.
pub fn read_link(path: impl AsRef<Path>) -> Result<PathBuf, OpError> {
    let path = path.as_ref();
    sys::read_link(path).map_err(|code| OpError::ReadLink { path: path.to_path_buf(), code })
}

/// Copies `from` to `to`.
///
/// With `follow_symlinks = false` and a symlink source, the link itself
/// is replicated (`readlink` + `symlink`) instead of its target's
/// content.
pub fn copy_file(
    from: impl AsRef<Path>,
    to: impl AsRef<Path>,
    follow_symlinks: bool,
) -> Result<(), OpError> {
    let from = from.as_ref();
    let to = to.as_ref();

    if !follow_symlinks {
        let source = meta::symlink_metadata(from)?;
        if source.is_symlink() {
            let target = read_link(from)?;
            return symlink(&target, to);
        }
    }

    std::fs::copy(from, to).map(|_| ()).map_err(|err| OpError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        code: OsCode::from_io(&err),
    })
}

/// Moves `from` to `to`, replacing an existing destination.
///
/// A plain rename where possible; across filesystems (`EXDEV`) the move
/// degrades to copy-and-delete, replicating a symlink source as a link.
pub fn move_file(from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<(), OpError> {
    let from = from.as_ref();
    let to = to.as_ref();

    match sys::rename_replace(from, to) {
        Ok(()) => Ok(()),
        Err(code) if code.is_cross_device() => {
            tracing::debug!(
                from = %from.display(),
                to = %to.display(),
                "cross-device move, copying instead"
            );
            copy_file(from, to, false).map_err(|err| match err {
                OpError::Copy { from, to, code } => OpError::Move { from, to, code },
                other => other,
            })?;
            remove_file(from)
        }
        Err(code) => {
            Err(OpError::Move { from: from.to_path_buf(), to: to.to_path_buf(), code })
        }
    }
}
