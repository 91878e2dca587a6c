//! POSIX syscall layer.
//!
//! Every wrapper here applies the crate's `EINTR` discipline: `open`,
//! `read`, `write`, `fsync`, `fdatasync`, and `getrandom` retry on
//! `EINTR`; `close` and `fcntl` never do. All failures are reported as
//! raw [`OsCode`] values; classification into the public error taxonomy
//! happens in the callers.

use std::ffi::{CString, OsString};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use crate::error::OsCode;
use crate::meta::{FileId, FileKind, FileTime, Metadata};
use crate::name::Name;

use super::{FileDesc, NoClobber, WriteFailure};

#[cfg(any(target_os = "linux", target_os = "android"))]
use libc::{dirent64 as dirent, readdir64 as readdir};
#[cfg(not(any(target_os = "linux", target_os = "android")))]
use libc::{dirent, readdir};

pub(crate) fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

fn clear_errno() {
    unsafe { *errno_ptr() = 0 }
}

// Location of the thread-local errno differs per libc.
unsafe fn errno_ptr() -> *mut libc::c_int {
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "emscripten"))]
    {
        libc::__errno_location()
    }
    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "dragonfly"
    ))]
    {
        libc::__error()
    }
    #[cfg(any(target_os = "netbsd", target_os = "openbsd"))]
    {
        libc::__errno()
    }
}

fn cstr(path: &Path) -> Result<CString, OsCode> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| OsCode::Errno(libc::EINVAL))
}

/// `stat`/`lstat` mapped into the crate's [`Metadata`] product type.
pub(crate) fn file_metadata(path: &Path, follow: bool) -> Result<Metadata, OsCode> {
    let c = cstr(path)?;
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    let ret = loop {
        let ret = if follow {
            unsafe { libc::stat(c.as_ptr(), &mut st) }
        } else {
            unsafe { libc::lstat(c.as_ptr(), &mut st) }
        };
        if ret == -1 && errno() == libc::EINTR {
            continue;
        }
        break ret;
    };
    if ret == -1 {
        return Err(OsCode::last());
    }
    Ok(metadata_from_stat(&st))
}

fn metadata_from_stat(st: &libc::stat) -> Metadata {
    let mode = st.st_mode as u32;
    let kind = match mode & (libc::S_IFMT as u32) {
        m if m == libc::S_IFREG as u32 => FileKind::File,
        m if m == libc::S_IFDIR as u32 => FileKind::Directory,
        m if m == libc::S_IFLNK as u32 => FileKind::SymbolicLink,
        _ => FileKind::Other,
    };
    Metadata {
        kind,
        len: st.st_size.max(0) as u64,
        mode,
        nlink: st.st_nlink as u64,
        uid: st.st_uid,
        gid: st.st_gid,
        id: FileId { device: st.st_dev as u64, inode: st.st_ino as u64 },
        atime: FileTime { seconds: st.st_atime as i64, nanos: st.st_atime_nsec as u32 },
        mtime: FileTime { seconds: st.st_mtime as i64, nanos: st.st_mtime_nsec as u32 },
        ctime: FileTime { seconds: st.st_ctime as i64, nanos: st.st_ctime_nsec as u32 },
    }
}

fn open_retry(c: &CString, flags: libc::c_int, mode: libc::mode_t) -> Result<FileDesc, OsCode> {
    loop {
        let fd = unsafe { libc::open(c.as_ptr(), flags, libc::c_uint::from(mode)) };
        if fd >= 0 {
            return Ok(FileDesc::new(fd));
        }
        if errno() == libc::EINTR {
            continue;
        }
        return Err(OsCode::last());
    }
}

/// Creates a file that must not already exist, owner read/write only.
pub(crate) fn create_exclusive(path: &Path, mode: u32) -> Result<FileDesc, OsCode> {
    let c = cstr(path)?;
    open_retry(
        &c,
        libc::O_CREAT | libc::O_EXCL | libc::O_RDWR | libc::O_CLOEXEC,
        mode as libc::mode_t,
    )
}

/// Opens a destination for direct streaming. `create_new` maps to
/// `O_EXCL` (fail if present); otherwise the file is created or
/// truncated.
pub(crate) fn open_direct(path: &Path, create_new: bool) -> Result<FileDesc, OsCode> {
    let c = cstr(path)?;
    let disposition = if create_new { libc::O_EXCL } else { libc::O_TRUNC };
    open_retry(
        &c,
        libc::O_CREAT | disposition | libc::O_WRONLY | libc::O_CLOEXEC,
        0o666 as libc::mode_t,
    )
}

fn open_dir_handle(path: &Path) -> Result<FileDesc, OsCode> {
    let c = cstr(path)?;
    open_retry(&c, libc::O_RDONLY | libc::O_DIRECTORY | libc::O_CLOEXEC, 0)
}

/// Writes the whole span, looping on short writes and retrying
/// `EINTR`/`EAGAIN`.
pub(crate) fn write_all(fd: &FileDesc, bytes: &[u8]) -> Result<(), WriteFailure> {
    let mut written = 0usize;
    while written < bytes.len() {
        let remaining = &bytes[written..];
        let ret = unsafe {
            libc::write(fd.raw(), remaining.as_ptr() as *const libc::c_void, remaining.len())
        };
        if ret >= 0 {
            if ret == 0 {
                // A zero-length result for a non-empty span will not make
                // progress; surface it rather than spin.
                return Err(WriteFailure {
                    written: written as u64,
                    code: OsCode::Errno(libc::EIO),
                });
            }
            written += ret as usize;
            continue;
        }
        match errno() {
            libc::EINTR | libc::EAGAIN => continue,
            _ => {
                return Err(WriteFailure { written: written as u64, code: OsCode::last() });
            }
        }
    }
    Ok(())
}

fn fsync_retry(fd: &FileDesc) -> Result<(), OsCode> {
    loop {
        if unsafe { libc::fsync(fd.raw()) } == 0 {
            return Ok(());
        }
        if errno() == libc::EINTR {
            continue;
        }
        return Err(OsCode::last());
    }
}

/// Full durability sync for file content and metadata.
///
/// Darwin's `fsync` does not force the drive cache; `F_FULLFSYNC` does.
/// The `fcntl` is attempted once (not idempotent under `EINTR`) and falls
/// back to plain `fsync` where the filesystem rejects it.
pub(crate) fn sync_full(fd: &FileDesc) -> Result<(), OsCode> {
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        if unsafe { libc::fcntl(fd.raw(), libc::F_FULLFSYNC) } == 0 {
            return Ok(());
        }
        tracing::debug!(errno = errno(), "F_FULLFSYNC rejected, falling back to fsync");
        fsync_retry(fd)
    }
    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    {
        fsync_retry(fd)
    }
}

/// Data-only sync: content reaches stable storage, metadata may not.
pub(crate) fn sync_data(fd: &FileDesc) -> Result<(), OsCode> {
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        if unsafe { libc::fcntl(fd.raw(), libc::F_BARRIERFSYNC) } == 0 {
            return Ok(());
        }
        tracing::debug!(errno = errno(), "F_BARRIERFSYNC rejected, falling back to fsync");
        fsync_retry(fd)
    }
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        loop {
            if unsafe { libc::fdatasync(fd.raw()) } == 0 {
                return Ok(());
            }
            if errno() == libc::EINTR {
                continue;
            }
            return Err(OsCode::last());
        }
    }
    #[cfg(not(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "linux",
        target_os = "android"
    )))]
    {
        fsync_retry(fd)
    }
}

/// Syncs a directory so a rename performed inside it is persisted.
pub(crate) fn sync_directory(path: &Path) -> Result<(), OsCode> {
    let dir = open_dir_handle(path)?;
    let synced = sync_full(&dir);
    // A failed close of a read-only directory handle cannot unpersist the
    // rename; the sync result is what matters.
    if let Err(code) = dir.close() {
        tracing::warn!(path = %path.display(), %code, "closing directory handle failed");
    }
    synced
}

/// Atomically replaces `to` with `from`.
pub(crate) fn rename_replace(from: &Path, to: &Path) -> Result<(), OsCode> {
    let from_c = cstr(from)?;
    let to_c = cstr(to)?;
    if unsafe { libc::rename(from_c.as_ptr(), to_c.as_ptr()) } == 0 {
        Ok(())
    } else {
        Err(OsCode::last())
    }
}

/// Publishes `from` at `to` only if `to` does not exist.
///
/// Linux: `renameat2(RENAME_NOREPLACE)` with feature-detection
/// fall-through; `EPERM` is ambiguous (some filesystems reject the flag
/// with it) so the hard-link fallback is tried and, if that also fails,
/// the original `EPERM` is surfaced. Darwin: `renamex_np(RENAME_EXCL)`.
/// Elsewhere: the `link`+`unlink` fallback directly.
pub(crate) fn rename_noclobber(from: &Path, to: &Path) -> Result<NoClobber, OsCode> {
    let from_c = cstr(from)?;
    let to_c = cstr(to)?;

    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        let ret = unsafe {
            libc::syscall(
                libc::SYS_renameat2,
                libc::AT_FDCWD,
                from_c.as_ptr(),
                libc::AT_FDCWD,
                to_c.as_ptr(),
                libc::RENAME_NOREPLACE,
            )
        };
        if ret == 0 {
            return Ok(NoClobber::Renamed);
        }
        match errno() {
            libc::EEXIST => return Ok(NoClobber::Exists),
            libc::ENOSYS | libc::EINVAL | libc::ENOTSUP => {
                tracing::debug!(errno = errno(), "renameat2 unavailable, using link fallback");
            }
            libc::EPERM => {
                // Could be the flag being rejected or a real permission
                // failure; only the fallback can tell.
                tracing::debug!("renameat2 returned EPERM, probing with link fallback");
                return match link_noclobber(&from_c, &to_c) {
                    Ok(outcome) => Ok(outcome),
                    Err(_) => Err(OsCode::Errno(libc::EPERM)),
                };
            }
            _ => return Err(OsCode::last()),
        }
        link_noclobber(&from_c, &to_c)
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        let ret = unsafe { libc::renamex_np(from_c.as_ptr(), to_c.as_ptr(), libc::RENAME_EXCL) };
        if ret == 0 {
            return Ok(NoClobber::Renamed);
        }
        match errno() {
            libc::EEXIST => Ok(NoClobber::Exists),
            libc::ENOTSUP => {
                tracing::debug!("renamex_np unsupported by filesystem, using link fallback");
                link_noclobber(&from_c, &to_c)
            }
            _ => Err(OsCode::last()),
        }
    }

    #[cfg(not(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios"
    )))]
    {
        link_noclobber(&from_c, &to_c)
    }
}

/// `link` is atomic and fails with `EEXIST` when the destination exists;
/// the leftover source link is removed best-effort afterwards.
fn link_noclobber(from: &CString, to: &CString) -> Result<NoClobber, OsCode> {
    if unsafe { libc::link(from.as_ptr(), to.as_ptr()) } == 0 {
        if unsafe { libc::unlink(from.as_ptr()) } != 0 {
            tracing::warn!(errno = errno(), "cannot unlink temp after link publication");
        }
        return Ok(NoClobber::Renamed);
    }
    match errno() {
        libc::EEXIST => Ok(NoClobber::Exists),
        _ => Err(OsCode::last()),
    }
}

pub(crate) fn unlink(path: &Path) -> Result<(), OsCode> {
    let c = cstr(path)?;
    if unsafe { libc::unlink(c.as_ptr()) } == 0 {
        Ok(())
    } else {
        Err(OsCode::last())
    }
}

pub(crate) fn remove_dir(path: &Path) -> Result<(), OsCode> {
    let c = cstr(path)?;
    if unsafe { libc::rmdir(c.as_ptr()) } == 0 {
        Ok(())
    } else {
        Err(OsCode::last())
    }
}

pub(crate) fn make_dir(path: &Path, mode: u32) -> Result<(), OsCode> {
    let c = cstr(path)?;
    if unsafe { libc::mkdir(c.as_ptr(), mode as libc::mode_t) } == 0 {
        Ok(())
    } else {
        Err(OsCode::last())
    }
}

pub(crate) fn hard_link(original: &Path, link: &Path) -> Result<(), OsCode> {
    let original_c = cstr(original)?;
    let link_c = cstr(link)?;
    if unsafe { libc::link(original_c.as_ptr(), link_c.as_ptr()) } == 0 {
        Ok(())
    } else {
        Err(OsCode::last())
    }
}

pub(crate) fn symlink(target: &Path, link: &Path) -> Result<(), OsCode> {
    let target_c = cstr(target)?;
    let link_c = cstr(link)?;
    if unsafe { libc::symlink(target_c.as_ptr(), link_c.as_ptr()) } == 0 {
        Ok(())
    } else {
        Err(OsCode::last())
    }
}

pub(crate) fn read_link(path: &Path) -> Result<PathBuf, OsCode> {
    let c = cstr(path)?;
    let mut capacity = 256usize;
    loop {
        let mut buf = vec![0u8; capacity];
        let ret = unsafe {
            libc::readlink(c.as_ptr(), buf.as_mut_ptr() as *mut libc::c_char, buf.len())
        };
        if ret < 0 {
            if errno() == libc::EINTR {
                continue;
            }
            return Err(OsCode::last());
        }
        let len = ret as usize;
        if len == capacity {
            // Possibly truncated; retry with a larger buffer.
            capacity *= 2;
            continue;
        }
        buf.truncate(len);
        return Ok(PathBuf::from(OsString::from_vec(buf)));
    }
}

/// Fills `buf` from the platform random source.
pub(crate) fn random_bytes(buf: &mut [u8]) -> Result<(), OsCode> {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        let mut filled = 0usize;
        while filled < buf.len() {
            let remaining = &mut buf[filled..];
            let ret = unsafe {
                libc::getrandom(remaining.as_mut_ptr() as *mut libc::c_void, remaining.len(), 0)
            };
            if ret < 0 {
                if errno() == libc::EINTR {
                    continue;
                }
                return Err(OsCode::last());
            }
            filled += ret as usize;
        }
        Ok(())
    }
    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "dragonfly",
        target_os = "netbsd",
        target_os = "openbsd"
    ))]
    {
        // arc4random_buf cannot fail.
        unsafe { libc::arc4random_buf(buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        Ok(())
    }
    #[cfg(not(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "dragonfly",
        target_os = "netbsd",
        target_os = "openbsd"
    )))]
    {
        let urandom = open_retry(
            &cstr(Path::new("/dev/urandom"))?,
            libc::O_RDONLY | libc::O_CLOEXEC,
            0,
        )?;
        let mut filled = 0usize;
        while filled < buf.len() {
            let remaining = &mut buf[filled..];
            let ret = unsafe {
                libc::read(urandom.raw(), remaining.as_mut_ptr() as *mut libc::c_void, remaining.len())
            };
            if ret <= 0 {
                if ret < 0 && errno() == libc::EINTR {
                    continue;
                }
                return Err(OsCode::last());
            }
            filled += ret as usize;
        }
        let _ = urandom.close();
        Ok(())
    }
}

pub(crate) fn set_permissions(fd: &FileDesc, mode: u32) -> Result<(), OsCode> {
    if unsafe { libc::fchmod(fd.raw(), (mode & 0o7777) as libc::mode_t) } == 0 {
        Ok(())
    } else {
        Err(OsCode::last())
    }
}

pub(crate) fn set_ownership(fd: &FileDesc, uid: u32, gid: u32) -> Result<(), OsCode> {
    if unsafe { libc::fchown(fd.raw(), uid as libc::uid_t, gid as libc::gid_t) } == 0 {
        Ok(())
    } else {
        Err(OsCode::last())
    }
}

pub(crate) fn set_times(fd: &FileDesc, atime: FileTime, mtime: FileTime) -> Result<(), OsCode> {
    let mut times: [libc::timespec; 2] = unsafe { std::mem::zeroed() };
    times[0].tv_sec = atime.seconds as libc::time_t;
    times[0].tv_nsec = atime.nanos as _;
    times[1].tv_sec = mtime.seconds as libc::time_t;
    times[1].tv_nsec = mtime.nanos as _;
    if unsafe { libc::futimens(fd.raw(), times.as_ptr()) } == 0 {
        Ok(())
    } else {
        Err(OsCode::last())
    }
}

/// Copies extended attributes from the file at `src` onto the open temp
/// descriptor. Attributes the destination filesystem rejects with
/// `ENOTSUP` and attributes that vanish mid-copy are skipped.
#[cfg(any(target_os = "linux", target_os = "android", target_os = "macos", target_os = "ios"))]
pub(crate) fn copy_xattrs(src: &Path, fd: &FileDesc) -> Result<(), OsCode> {
    let c = cstr(src)?;

    let list_len = xattr_list(&c, std::ptr::null_mut(), 0)?;
    if list_len == 0 {
        return Ok(());
    }
    let mut names = vec![0u8; list_len];
    let list_len = xattr_list(&c, names.as_mut_ptr() as *mut libc::c_char, names.len())?;
    names.truncate(list_len);

    for raw_name in names.split(|&b| b == 0).filter(|n| !n.is_empty()) {
        let name = CString::new(raw_name).map_err(|_| OsCode::Errno(libc::EINVAL))?;

        let value_len = match xattr_get(&c, &name, std::ptr::null_mut(), 0) {
            Ok(len) => len,
            Err(code) if xattr_vanished(code) => continue,
            Err(code) => return Err(code),
        };
        let mut value = vec![0u8; value_len];
        let value_len = match xattr_get(&c, &name, value.as_mut_ptr() as *mut libc::c_void, value.len()) {
            Ok(len) => len,
            Err(code) if xattr_vanished(code) => continue,
            Err(code) => return Err(code),
        };
        value.truncate(value_len);

        match xattr_set(fd, &name, &value) {
            Ok(()) => {}
            Err(OsCode::Errno(libc::ENOTSUP)) => {
                tracing::debug!(
                    attribute = %name.to_string_lossy(),
                    "destination filesystem does not support this xattr, skipping"
                );
            }
            Err(code) => return Err(code),
        }
    }
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos", target_os = "ios")))]
pub(crate) fn copy_xattrs(_src: &Path, _fd: &FileDesc) -> Result<(), OsCode> {
    tracing::debug!("extended attributes are not preserved on this platform");
    Ok(())
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "macos", target_os = "ios"))]
fn xattr_vanished(code: OsCode) -> bool {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    let gone = code == OsCode::Errno(libc::ENODATA);
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    let gone = code == OsCode::Errno(libc::ENOATTR);
    gone
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn xattr_list(path: &CString, buf: *mut libc::c_char, len: usize) -> Result<usize, OsCode> {
    let ret = unsafe { libc::listxattr(path.as_ptr(), buf, len) };
    if ret < 0 {
        match errno() {
            libc::ENOTSUP => Ok(0),
            _ => Err(OsCode::last()),
        }
    } else {
        Ok(ret as usize)
    }
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn xattr_list(path: &CString, buf: *mut libc::c_char, len: usize) -> Result<usize, OsCode> {
    let ret = unsafe { libc::listxattr(path.as_ptr(), buf, len, 0) };
    if ret < 0 {
        match errno() {
            libc::ENOTSUP => Ok(0),
            _ => Err(OsCode::last()),
        }
    } else {
        Ok(ret as usize)
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn xattr_get(
    path: &CString,
    name: &CString,
    buf: *mut libc::c_void,
    len: usize,
) -> Result<usize, OsCode> {
    let ret = unsafe { libc::getxattr(path.as_ptr(), name.as_ptr(), buf, len) };
    if ret < 0 {
        Err(OsCode::last())
    } else {
        Ok(ret as usize)
    }
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn xattr_get(
    path: &CString,
    name: &CString,
    buf: *mut libc::c_void,
    len: usize,
) -> Result<usize, OsCode> {
    let ret = unsafe { libc::getxattr(path.as_ptr(), name.as_ptr(), buf, len, 0, 0) };
    if ret < 0 {
        Err(OsCode::last())
    } else {
        Ok(ret as usize)
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn xattr_set(fd: &FileDesc, name: &CString, value: &[u8]) -> Result<(), OsCode> {
    let ret = unsafe {
        libc::fsetxattr(
            fd.raw(),
            name.as_ptr(),
            value.as_ptr() as *const libc::c_void,
            value.len(),
            0,
        )
    };
    if ret == 0 {
        Ok(())
    } else {
        Err(OsCode::last())
    }
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn xattr_set(fd: &FileDesc, name: &CString, value: &[u8]) -> Result<(), OsCode> {
    let ret = unsafe {
        libc::fsetxattr(
            fd.raw(),
            name.as_ptr(),
            value.as_ptr() as *const libc::c_void,
            value.len(),
            0,
            0,
        )
    };
    if ret == 0 {
        Ok(())
    } else {
        Err(OsCode::last())
    }
}

/// Best-effort preallocation from a size hint. Never changes EOF and
/// never fails the write: preallocation is an optimization only.
pub(crate) fn preallocate(fd: &FileDesc, expected_size: u64) {
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        let mut store = libc::fstore_t {
            fst_flags: libc::F_ALLOCATECONTIG,
            fst_posmode: libc::F_PEOFPOSMODE,
            fst_offset: 0,
            fst_length: expected_size as libc::off_t,
            fst_bytesalloc: 0,
        };
        if unsafe { libc::fcntl(fd.raw(), libc::F_PREALLOCATE, &mut store) } == -1 {
            // Contiguous space may be unavailable; any space will do.
            store.fst_flags = libc::F_ALLOCATEALL;
            if unsafe { libc::fcntl(fd.raw(), libc::F_PREALLOCATE, &mut store) } == -1 {
                tracing::debug!(errno = errno(), expected_size, "preallocation rejected");
            }
        }
    }
    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    {
        let _ = (fd, expected_size);
    }
}

/// An open kernel directory stream.
///
/// Owns the `DIR*`; dropping closes it. The raw pointer keeps the type
/// `!Send`/`!Sync`, matching the handle's thread affinity.
pub(crate) struct RawDir {
    dir: NonNull<libc::DIR>,
}

/// One entry as the kernel reported it: the raw name and the `d_type`
/// hint (`None` when the filesystem reported `DT_UNKNOWN`).
pub(crate) struct RawEntry {
    pub(crate) name: Name,
    pub(crate) kind: Option<FileKind>,
}

impl RawDir {
    pub(crate) fn open(path: &Path) -> Result<RawDir, OsCode> {
        let c = cstr(path)?;
        loop {
            let ptr = unsafe { libc::opendir(c.as_ptr()) };
            match NonNull::new(ptr) {
                Some(dir) => return Ok(RawDir { dir }),
                None => {
                    if errno() == libc::EINTR {
                        continue;
                    }
                    return Err(OsCode::last());
                }
            }
        }
    }

    /// Reads the next entry. `Ok(None)` is end-of-directory; `.` and
    /// `..` are *not* filtered here.
    pub(crate) fn read(&mut self) -> Result<Option<RawEntry>, OsCode> {
        loop {
            // readdir reports errors only through errno, so it must be
            // cleared to distinguish "end" from "failed".
            clear_errno();
            let ent: *mut dirent = unsafe { readdir(self.dir.as_ptr()) };
            if ent.is_null() {
                return match errno() {
                    0 => Ok(None),
                    libc::EINTR => continue,
                    code => Err(OsCode::Errno(code)),
                };
            }
            // The dirent buffer is only valid until the next readdir;
            // copy the name out immediately.
            let name = unsafe {
                let d_name = std::ptr::addr_of!((*ent).d_name);
                let len = (*d_name).len();
                let bytes = std::slice::from_raw_parts((*d_name).as_ptr() as *const u8, len);
                Name::from_nul_terminated(bytes)
            };
            let kind = unsafe { kind_from_d_type((*ent).d_type) };
            return Ok(Some(RawEntry { name, kind }));
        }
    }
}

impl Drop for RawDir {
    fn drop(&mut self) {
        unsafe {
            libc::closedir(self.dir.as_ptr());
        }
    }
}

fn kind_from_d_type(d_type: u8) -> Option<FileKind> {
    match d_type {
        libc::DT_REG => Some(FileKind::File),
        libc::DT_DIR => Some(FileKind::Directory),
        libc::DT_LNK => Some(FileKind::SymbolicLink),
        libc::DT_UNKNOWN => None,
        _ => Some(FileKind::Other),
    }
}
