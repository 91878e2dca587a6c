//! Win32 syscall layer.
//!
//! Counterpart of `sys::unix` over `windows-sys`. There is no `EINTR` on
//! Windows; the discipline here is instead the `GetLastError` ordering
//! rule: the error code is read immediately after the failing call, with
//! no intervening API calls.

use std::os::windows::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use windows_sys::Win32::Foundation::{
    GetLastError, ERROR_ALREADY_EXISTS, ERROR_FILE_EXISTS, ERROR_NO_MORE_FILES, FILETIME, HANDLE,
    INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Security::Cryptography::{
    BCryptGenRandom, BCRYPT_USE_SYSTEM_PREFERRED_RNG,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateDirectoryW, CreateFileW, CreateHardLinkW, CreateSymbolicLinkW, DeleteFileW, FindClose,
    FindFirstFileW, FindNextFileW, FlushFileBuffers, GetFileInformationByHandle, MoveFileExW,
    RemoveDirectoryW, SetFileInformationByHandle, WriteFile, BY_HANDLE_FILE_INFORMATION,
    CREATE_ALWAYS, CREATE_NEW, FILE_ATTRIBUTE_DIRECTORY, FILE_ATTRIBUTE_REPARSE_POINT,
    FILE_ATTRIBUTE_TEMPORARY, FILE_BASIC_INFO, FILE_FLAG_BACKUP_SEMANTICS,
    FILE_FLAG_OPEN_REPARSE_POINT, FILE_GENERIC_READ, FILE_GENERIC_WRITE, FILE_READ_ATTRIBUTES,
    FILE_SHARE_DELETE, FILE_SHARE_READ, FILE_SHARE_WRITE, FileBasicInfo, MOVEFILE_REPLACE_EXISTING,
    MOVEFILE_WRITE_THROUGH, OPEN_EXISTING, WIN32_FIND_DATAW,
    SYMBOLIC_LINK_FLAG_ALLOW_UNPRIVILEGED_CREATE,
};

use crate::error::OsCode;
use crate::meta::{FileId, FileKind, FileTime, Metadata};
use crate::name::Name;

use super::{FileDesc, NoClobber, WriteFailure};

/// 100ns intervals between 1601-01-01 and the Unix epoch.
const FILETIME_UNIX_DIFF: i64 = 116_444_736_000_000_000;

fn wide(path: &Path) -> Result<Vec<u16>, OsCode> {
    let mut units: Vec<u16> = path.as_os_str().encode_wide().collect();
    if units.contains(&0) {
        return Err(OsCode::Windows(windows_sys::Win32::Foundation::ERROR_INVALID_NAME));
    }
    units.push(0);
    Ok(units)
}

fn filetime_to_file_time(ft: &FILETIME) -> FileTime {
    let intervals = ((ft.dwHighDateTime as i64) << 32) | ft.dwLowDateTime as i64;
    let unix = intervals - FILETIME_UNIX_DIFF;
    FileTime { seconds: unix.div_euclid(10_000_000), nanos: (unix.rem_euclid(10_000_000) * 100) as u32 }
}

fn file_time_to_intervals(t: FileTime) -> i64 {
    t.seconds * 10_000_000 + i64::from(t.nanos / 100) + FILETIME_UNIX_DIFF
}

fn kind_from_attributes(attrs: u32) -> FileKind {
    // Reparse points cover symlinks, junctions, mount points, and cloud
    // placeholders; they are classified conservatively.
    if attrs & FILE_ATTRIBUTE_REPARSE_POINT != 0 {
        FileKind::Other
    } else if attrs & FILE_ATTRIBUTE_DIRECTORY != 0 {
        FileKind::Directory
    } else {
        FileKind::File
    }
}

pub(crate) fn file_metadata(path: &Path, follow: bool) -> Result<Metadata, OsCode> {
    let w = wide(path)?;
    let mut flags = FILE_FLAG_BACKUP_SEMANTICS;
    if !follow {
        flags |= FILE_FLAG_OPEN_REPARSE_POINT;
    }
    let handle = unsafe {
        CreateFileW(
            w.as_ptr(),
            FILE_READ_ATTRIBUTES,
            FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
            std::ptr::null(),
            OPEN_EXISTING,
            flags,
            0,
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        return Err(OsCode::last());
    }
    let handle = FileDesc::new(handle);

    let mut info: BY_HANDLE_FILE_INFORMATION = unsafe { std::mem::zeroed() };
    if unsafe { GetFileInformationByHandle(handle.raw(), &mut info) } == 0 {
        return Err(OsCode::last());
    }
    let _ = handle.close();

    Ok(Metadata {
        kind: kind_from_attributes(info.dwFileAttributes),
        len: (u64::from(info.nFileSizeHigh) << 32) | u64::from(info.nFileSizeLow),
        mode: info.dwFileAttributes,
        nlink: u64::from(info.nNumberOfLinks),
        uid: 0,
        gid: 0,
        id: FileId {
            device: u64::from(info.dwVolumeSerialNumber),
            inode: (u64::from(info.nFileIndexHigh) << 32) | u64::from(info.nFileIndexLow),
        },
        atime: filetime_to_file_time(&info.ftLastAccessTime),
        mtime: filetime_to_file_time(&info.ftLastWriteTime),
        ctime: filetime_to_file_time(&info.ftCreationTime),
    })
}

/// Creates a file that must not already exist. No share-write: nothing
/// else may scribble on the temp file while it is being filled.
pub(crate) fn create_exclusive(path: &Path, _mode: u32) -> Result<FileDesc, OsCode> {
    let w = wide(path)?;
    let handle = unsafe {
        CreateFileW(
            w.as_ptr(),
            FILE_GENERIC_READ | FILE_GENERIC_WRITE,
            FILE_SHARE_READ,
            std::ptr::null(),
            CREATE_NEW,
            FILE_ATTRIBUTE_TEMPORARY,
            0,
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        return Err(OsCode::last());
    }
    Ok(FileDesc::new(handle))
}

pub(crate) fn open_direct(path: &Path, create_new: bool) -> Result<FileDesc, OsCode> {
    let w = wide(path)?;
    let disposition = if create_new { CREATE_NEW } else { CREATE_ALWAYS };
    let handle = unsafe {
        CreateFileW(
            w.as_ptr(),
            FILE_GENERIC_WRITE,
            FILE_SHARE_READ,
            std::ptr::null(),
            disposition,
            0,
            0,
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        return Err(OsCode::last());
    }
    Ok(FileDesc::new(handle))
}

pub(crate) fn write_all(fd: &FileDesc, bytes: &[u8]) -> Result<(), WriteFailure> {
    let mut written = 0usize;
    while written < bytes.len() {
        let remaining = &bytes[written..];
        let span = remaining.len().min(u32::MAX as usize) as u32;
        let mut chunk_written: u32 = 0;
        let ok = unsafe {
            WriteFile(
                fd.raw(),
                remaining.as_ptr(),
                span,
                &mut chunk_written,
                std::ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(WriteFailure { written: written as u64, code: OsCode::last() });
        }
        if chunk_written == 0 {
            return Err(WriteFailure {
                written: written as u64,
                code: OsCode::Windows(windows_sys::Win32::Foundation::ERROR_WRITE_FAULT),
            });
        }
        written += chunk_written as usize;
    }
    Ok(())
}

pub(crate) fn sync_full(fd: &FileDesc) -> Result<(), OsCode> {
    if unsafe { FlushFileBuffers(fd.raw()) } != 0 {
        Ok(())
    } else {
        Err(OsCode::last())
    }
}

pub(crate) fn sync_data(fd: &FileDesc) -> Result<(), OsCode> {
    // Windows has no data-only flush; FlushFileBuffers covers both.
    sync_full(fd)
}

pub(crate) fn sync_directory(path: &Path) -> Result<(), OsCode> {
    let w = wide(path)?;
    let handle = unsafe {
        CreateFileW(
            w.as_ptr(),
            FILE_GENERIC_WRITE,
            FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
            std::ptr::null(),
            OPEN_EXISTING,
            FILE_FLAG_BACKUP_SEMANTICS,
            0,
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        return Err(OsCode::last());
    }
    let handle = FileDesc::new(handle);
    let synced = sync_full(&handle);
    if let Err(code) = handle.close() {
        tracing::warn!(path = %path.display(), %code, "closing directory handle failed");
    }
    synced
}

pub(crate) fn rename_replace(from: &Path, to: &Path) -> Result<(), OsCode> {
    let from_w = wide(from)?;
    let to_w = wide(to)?;
    let ok = unsafe {
        MoveFileExW(from_w.as_ptr(), to_w.as_ptr(), MOVEFILE_REPLACE_EXISTING | MOVEFILE_WRITE_THROUGH)
    };
    if ok != 0 {
        Ok(())
    } else {
        Err(OsCode::last())
    }
}

/// `MoveFileExW` without the replace flag. `ERROR_ALREADY_EXISTS` and
/// `ERROR_FILE_EXISTS` mean the destination is present;
/// `ERROR_ACCESS_DENIED` is deliberately *not* mapped to "exists"; it
/// is too ambiguous and would mask real permission failures.
pub(crate) fn rename_noclobber(from: &Path, to: &Path) -> Result<NoClobber, OsCode> {
    let from_w = wide(from)?;
    let to_w = wide(to)?;
    let ok = unsafe { MoveFileExW(from_w.as_ptr(), to_w.as_ptr(), MOVEFILE_WRITE_THROUGH) };
    if ok != 0 {
        return Ok(NoClobber::Renamed);
    }
    match unsafe { GetLastError() } {
        ERROR_ALREADY_EXISTS | ERROR_FILE_EXISTS => Ok(NoClobber::Exists),
        code => Err(OsCode::Windows(code)),
    }
}

pub(crate) fn unlink(path: &Path) -> Result<(), OsCode> {
    let w = wide(path)?;
    if unsafe { DeleteFileW(w.as_ptr()) } != 0 {
        Ok(())
    } else {
        Err(OsCode::last())
    }
}

pub(crate) fn remove_dir(path: &Path) -> Result<(), OsCode> {
    let w = wide(path)?;
    if unsafe { RemoveDirectoryW(w.as_ptr()) } != 0 {
        Ok(())
    } else {
        Err(OsCode::last())
    }
}

pub(crate) fn make_dir(path: &Path, _mode: u32) -> Result<(), OsCode> {
    let w = wide(path)?;
    if unsafe { CreateDirectoryW(w.as_ptr(), std::ptr::null()) } != 0 {
        Ok(())
    } else {
        Err(OsCode::last())
    }
}

pub(crate) fn hard_link(original: &Path, link: &Path) -> Result<(), OsCode> {
    let original_w = wide(original)?;
    let link_w = wide(link)?;
    if unsafe { CreateHardLinkW(link_w.as_ptr(), original_w.as_ptr(), std::ptr::null()) } != 0 {
        Ok(())
    } else {
        Err(OsCode::last())
    }
}

pub(crate) fn symlink(target: &Path, link: &Path) -> Result<(), OsCode> {
    let target_w = wide(target)?;
    let link_w = wide(link)?;
    let ok = unsafe {
        CreateSymbolicLinkW(
            link_w.as_ptr(),
            target_w.as_ptr(),
            SYMBOLIC_LINK_FLAG_ALLOW_UNPRIVILEGED_CREATE,
        )
    };
    if ok != 0 {
        Ok(())
    } else {
        Err(OsCode::last())
    }
}

pub(crate) fn read_link(path: &Path) -> Result<PathBuf, OsCode> {
    std::fs::read_link(path).map_err(|e| OsCode::from_io(&e))
}

pub(crate) fn random_bytes(buf: &mut [u8]) -> Result<(), OsCode> {
    let status = unsafe {
        BCryptGenRandom(0, buf.as_mut_ptr(), buf.len() as u32, BCRYPT_USE_SYSTEM_PREFERRED_RNG)
    };
    if status == 0 {
        Ok(())
    } else {
        Err(OsCode::Windows(status as u32))
    }
}

/// Restores attribute flags and timestamps (including creation time)
/// from remembered metadata onto the open temp handle. `None` times and
/// zero attributes are left unchanged, per `FILE_BASIC_INFO` semantics.
pub(crate) fn set_basic_info(
    fd: &FileDesc,
    attributes: u32,
    atime: Option<FileTime>,
    mtime: Option<FileTime>,
    creation: Option<FileTime>,
) -> Result<(), OsCode> {
    let intervals = |t: Option<FileTime>| t.map(file_time_to_intervals).unwrap_or(0);
    let info = FILE_BASIC_INFO {
        CreationTime: intervals(creation),
        LastAccessTime: intervals(atime),
        LastWriteTime: intervals(mtime),
        ChangeTime: 0,
        FileAttributes: attributes,
    };
    let ok = unsafe {
        SetFileInformationByHandle(
            fd.raw(),
            FileBasicInfo,
            &info as *const FILE_BASIC_INFO as *const core::ffi::c_void,
            std::mem::size_of::<FILE_BASIC_INFO>() as u32,
        )
    };
    if ok != 0 {
        Ok(())
    } else {
        Err(OsCode::last())
    }
}

/// Preallocation is not attempted on Windows; `SetFileValidData` needs a
/// privilege the caller rarely holds.
pub(crate) fn preallocate(_fd: &FileDesc, expected_size: u64) {
    tracing::debug!(expected_size, "preallocation hint ignored on this platform");
}

pub(crate) fn copy_xattrs(_src: &Path, _fd: &FileDesc) -> Result<(), OsCode> {
    tracing::debug!("alternate data streams are not preserved");
    Ok(())
}

/// An open `FindFirstFileW` enumeration.
///
/// The find handle is owned here; dropping closes it. The first entry is
/// produced by `FindFirstFileW` itself and is held back until the first
/// `read`.
pub(crate) struct RawDir {
    handle: HANDLE,
    pending: Option<RawEntry>,
    done: bool,
}

pub(crate) struct RawEntry {
    pub(crate) name: Name,
    pub(crate) kind: Option<FileKind>,
}

fn entry_from_find_data(data: &WIN32_FIND_DATAW) -> RawEntry {
    // Snapshot the name and attributes into owned values before any
    // further Find call can overwrite the buffer.
    let name = Name::from_nul_terminated(&data.cFileName);
    let kind = Some(kind_from_attributes(data.dwFileAttributes));
    RawEntry { name, kind }
}

impl RawDir {
    pub(crate) fn open(path: &Path) -> Result<RawDir, OsCode> {
        let pattern = path.join("*");
        let w = wide(&pattern)?;
        let mut data: WIN32_FIND_DATAW = unsafe { std::mem::zeroed() };
        let handle = unsafe { FindFirstFileW(w.as_ptr(), &mut data) };
        if handle == INVALID_HANDLE_VALUE {
            return Err(OsCode::last());
        }
        Ok(RawDir { handle, pending: Some(entry_from_find_data(&data)), done: false })
    }

    pub(crate) fn read(&mut self) -> Result<Option<RawEntry>, OsCode> {
        if let Some(entry) = self.pending.take() {
            return Ok(Some(entry));
        }
        if self.done {
            return Ok(None);
        }
        let mut data: WIN32_FIND_DATAW = unsafe { std::mem::zeroed() };
        let ok = unsafe { FindNextFileW(self.handle, &mut data) };
        if ok == 0 {
            // GetLastError must be read before any other API call.
            let code = unsafe { GetLastError() };
            self.done = true;
            return match code {
                ERROR_NO_MORE_FILES => Ok(None),
                code => Err(OsCode::Windows(code)),
            };
        }
        Ok(Some(entry_from_find_data(&data)))
    }
}

impl Drop for RawDir {
    fn drop(&mut self) {
        unsafe {
            FindClose(self.handle);
        }
    }
}
