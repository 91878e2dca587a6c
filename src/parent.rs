//! Parent-directory verification and idempotent intermediate creation.

use std::path::Path;

use crate::error::{OsCode, ParentError};
use crate::sys;

/// Verifies that `path` names an existing directory.
///
/// Reached via `stat` on POSIX, so a final-component symlink pointing at
/// a directory passes. With `create_intermediates`, a missing directory
/// and all missing ancestors are created; only "does not exist" triggers
/// creation; `ELOOP`, `EIO`, `ENAMETOOLONG`, and every other failure is
/// terminal, because creating directories cannot repair those.
pub fn verify_directory(path: &Path, create_intermediates: bool) -> Result<(), ParentError> {
    match sys::file_metadata(path, true) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ParentError::NotADirectory { path: path.to_path_buf() }),
        Err(code) if code.is_not_found() => {
            if create_intermediates {
                create_recursive(path)
            } else {
                Err(ParentError::Missing { path: path.to_path_buf() })
            }
        }
        Err(code) => Err(classify_stat_error(path, code)),
    }
}

fn classify_stat_error(path: &Path, code: OsCode) -> ParentError {
    let path = path.to_path_buf();
    #[cfg(unix)]
    {
        match code {
            OsCode::Errno(libc::EACCES) => ParentError::AccessDenied { path, code },
            OsCode::Errno(libc::ENOTDIR) => ParentError::NotADirectory { path },
            _ => ParentError::StatFailed { path, code },
        }
    }
    #[cfg(windows)]
    {
        use windows_sys::Win32::Foundation::{
            ERROR_ACCESS_DENIED, ERROR_BAD_NETPATH, ERROR_BAD_NET_NAME, ERROR_BAD_PATHNAME,
            ERROR_INVALID_DRIVE, ERROR_INVALID_NAME,
        };
        match code {
            OsCode::Windows(ERROR_ACCESS_DENIED) => ParentError::AccessDenied { path, code },
            OsCode::Windows(ERROR_INVALID_NAME)
            | OsCode::Windows(ERROR_BAD_PATHNAME)
            | OsCode::Windows(ERROR_INVALID_DRIVE) => ParentError::InvalidPath { path, code },
            OsCode::Windows(ERROR_BAD_NETPATH) | OsCode::Windows(ERROR_BAD_NET_NAME) => {
                ParentError::NetworkPathNotFound { path, code }
            }
            _ => ParentError::StatFailed { path, code },
        }
    }
}

fn create_recursive(path: &Path) -> Result<(), ParentError> {
    match sys::make_dir(path, 0o777) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "created intermediate directory");
            Ok(())
        }
        Err(code) if code.is_already_exists() => confirm_directory(path),
        Err(code) if code.is_not_found() => {
            let Some(parent) = path.parent() else {
                return Err(ParentError::CreationFailed { path: path.to_path_buf(), code });
            };
            create_recursive(parent)?;
            match sys::make_dir(path, 0o777) {
                Ok(()) => Ok(()),
                // Another actor creating the directory between our mkdir
                // calls is success, not a conflict.
                Err(code) if code.is_already_exists() => confirm_directory(path),
                Err(code) => Err(ParentError::CreationFailed { path: path.to_path_buf(), code }),
            }
        }
        Err(code) => Err(ParentError::CreationFailed { path: path.to_path_buf(), code }),
    }
}

fn confirm_directory(path: &Path) -> Result<(), ParentError> {
    match sys::file_metadata(path, true) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ParentError::NotADirectory { path: path.to_path_buf() }),
        Err(code) => Err(classify_stat_error(path, code)),
    }
}
