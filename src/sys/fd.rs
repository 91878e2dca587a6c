//! Owned file descriptors with consume-on-close semantics.

use crate::error::OsCode;

#[cfg(unix)]
type Raw = libc::c_int;
#[cfg(windows)]
type Raw = windows_sys::Win32::Foundation::HANDLE;

#[cfg(unix)]
const INVALID: Raw = -1;
#[cfg(windows)]
const INVALID: Raw = windows_sys::Win32::Foundation::INVALID_HANDLE_VALUE;

/// An owned kernel file handle.
///
/// Exactly one `FileDesc` owns a given descriptor. [`FileDesc::close`]
/// consumes the value and invalidates the internal handle *before*
/// issuing the close syscall, so the descriptor number can never be
/// closed twice, not even if the close itself fails. `close()` is never
/// retried on `EINTR`: the descriptor state after an interrupted close is
/// undefined, and a concurrent thread may already have been assigned the
/// same number.
#[derive(Debug)]
pub(crate) struct FileDesc {
    raw: Raw,
}

impl FileDesc {
    pub(crate) fn new(raw: Raw) -> FileDesc {
        FileDesc { raw }
    }

    pub(crate) fn raw(&self) -> Raw {
        self.raw
    }

    /// Closes the descriptor, reporting failure without ever retrying.
    pub(crate) fn close(mut self) -> Result<(), OsCode> {
        let raw = std::mem::replace(&mut self.raw, INVALID);
        close_raw(raw)
    }
}

impl Drop for FileDesc {
    fn drop(&mut self) {
        if self.raw != INVALID {
            let _ = close_raw(std::mem::replace(&mut self.raw, INVALID));
        }
    }
}

fn close_raw(raw: Raw) -> Result<(), OsCode> {
    #[cfg(unix)]
    {
        // Single attempt. See the type-level comment for why EINTR is not
        // retried here.
        if unsafe { libc::close(raw) } == 0 {
            Ok(())
        } else {
            Err(OsCode::last())
        }
    }
    #[cfg(windows)]
    {
        if unsafe { windows_sys::Win32::Foundation::CloseHandle(raw) } != 0 {
            Ok(())
        } else {
            Err(OsCode::last())
        }
    }
}
