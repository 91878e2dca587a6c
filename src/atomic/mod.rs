//! Single-shot atomic file publication.
//!
//! [`write_atomic`] writes a byte span into a temp file next to the
//! destination, syncs it per the requested durability, optionally copies
//! the old destination's metadata onto it, and renames it into place.
//! After any failure before the rename the destination is untouched and
//! the temp file is gone; after the rename the destination is never
//! deleted, whatever happens next.

mod metadata;
mod phase;

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::error::{OsCode, WriteError};
use crate::meta::Metadata;
use crate::parent;
use crate::resolve;
use crate::sys::{self, FileDesc, NoClobber};

pub use phase::CommitPhase;

/// How an existing destination is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwriteStrategy {
    /// Atomically replace whatever is at the destination.
    #[default]
    ReplaceExisting,
    /// Fail with [`WriteError::DestinationExists`] if the destination
    /// exists.
    NoClobber,
}

/// How hard to push the new content toward stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Durability {
    /// Sync file content *and* the containing directory, so both the
    /// data and the rename survive power loss. `F_FULLFSYNC` on Darwin.
    #[default]
    Full,
    /// Sync file content only; the directory entry may be lost on
    /// crash. `F_BARRIERFSYNC` on Darwin, `fdatasync` on Linux.
    DataOnly,
    /// No syncing. The kernel writes back on its own schedule.
    None,
}

/// Options for [`write_atomic`].
#[derive(Debug, Clone, Default)]
pub struct AtomicWriteOptions {
    pub strategy: OverwriteStrategy,
    pub durability: Durability,
    /// Copy the old destination's permission bits onto the new file.
    pub preserve_permissions: bool,
    /// Copy the old destination's uid/gid onto the new file. Without
    /// `strict_ownership`, failures (typically `EPERM` for non-root
    /// callers) are expected and silently skipped.
    pub preserve_ownership: bool,
    /// Make ownership-preservation failures fatal.
    pub strict_ownership: bool,
    /// Copy atime and mtime (and creation time, on Windows).
    pub preserve_timestamps: bool,
    /// Copy extended attributes.
    pub preserve_xattrs: bool,
    /// Copy ACLs. No shim is available; requesting this fails with
    /// [`WriteError::PlatformIncompatible`].
    pub preserve_acls: bool,
    /// Create the destination's parent directories if missing.
    pub create_intermediates: bool,
}

/// Random token length in bytes; hex-doubled in the temp file name.
const TEMP_TOKEN_LEN: usize = 12;

/// How many `EEXIST` collisions to tolerate before giving up.
const TEMP_CREATE_ATTEMPTS: u32 = 64;

pub(crate) enum TempTag {
    Atomic,
    Streaming,
}

impl TempTag {
    fn as_str(&self) -> &'static str {
        match self {
            TempTag::Atomic => "atomic",
            TempTag::Streaming => "streaming",
        }
    }
}

/// Publishes `bytes` at `path` with all-or-nothing semantics.
///
/// On success the destination contains exactly `bytes`. On any
/// pre-publish error the destination's previous content (or absence) is
/// intact. The one post-publish error, returned with the file already
/// in place, is [`WriteError::DirectorySyncFailedAfterCommit`].
pub fn write_atomic(
    bytes: &[u8],
    path: impl AsRef<Path>,
    options: &AtomicWriteOptions,
) -> Result<(), WriteError> {
    let destination = resolve::resolve(path.as_ref());
    let Some((dir, basename)) = resolve::split_destination(&destination) else {
        return Err(WriteError::DestinationIsDirectory { path: destination });
    };

    parent::verify_directory(&dir, options.create_intermediates)?;

    let existing = stat_destination(&destination)?;
    if let Some(meta) = &existing {
        if meta.is_dir() {
            return Err(WriteError::DestinationIsDirectory { path: destination });
        }
    }

    let (temp_path, fd) = create_temp(&dir, &basename, TempTag::Atomic)?;
    let mut temp = PendingTemp::new(temp_path);
    temp.advance(CommitPhase::Writing);
    tracing::trace!(temp = %temp.path.display(), dest = %destination.display(), "temp file created");

    sys::write_all(&fd, bytes).map_err(|failure| WriteError::WriteFailed {
        path: temp.path.clone(),
        written: failure.written,
        expected: bytes.len() as u64,
        code: failure.code,
    })?;

    sync_file(&fd, &temp.path, options.durability)?;
    temp.advance(CommitPhase::SyncedFile);

    if let Some(source) = &existing {
        metadata::apply(source, &destination, &fd, options)?;
    }

    fd.close()
        .map_err(|code| WriteError::CloseFailed { path: temp.path.clone(), code })?;
    temp.advance(CommitPhase::Closed);

    match options.strategy {
        OverwriteStrategy::ReplaceExisting => {
            sys::rename_replace(&temp.path, &destination).map_err(|code| {
                WriteError::RenameFailed {
                    from: temp.path.clone(),
                    to: destination.clone(),
                    code,
                }
            })?;
        }
        OverwriteStrategy::NoClobber => {
            match sys::rename_noclobber(&temp.path, &destination) {
                Ok(NoClobber::Renamed) => {}
                Ok(NoClobber::Exists) => {
                    return Err(WriteError::DestinationExists { path: destination });
                }
                Err(code) => {
                    return Err(WriteError::RenameFailed {
                        from: temp.path.clone(),
                        to: destination.clone(),
                        code,
                    });
                }
            }
        }
    }
    temp.advance(CommitPhase::RenamedPublished);
    tracing::debug!(dest = %destination.display(), "published");

    if matches!(options.durability, Durability::Full) {
        temp.advance(CommitPhase::DirectorySyncAttempted);
        sys::sync_directory(&dir).map_err(|code| WriteError::DirectorySyncFailedAfterCommit {
            path: destination.clone(),
            code,
        })?;
        temp.advance(CommitPhase::SyncedDirectory);
    }

    Ok(())
}

fn stat_destination(destination: &Path) -> Result<Option<Metadata>, WriteError> {
    match sys::file_metadata(destination, false) {
        Ok(meta) => Ok(Some(meta)),
        Err(code) if code.is_not_found() => Ok(None),
        Err(code) => {
            Err(WriteError::DestinationStatFailed { path: destination.to_path_buf(), code })
        }
    }
}

fn sync_file(fd: &FileDesc, temp_path: &Path, durability: Durability) -> Result<(), WriteError> {
    let outcome = match durability {
        Durability::Full => sys::sync_full(fd),
        Durability::DataOnly => sys::sync_data(fd),
        Durability::None => return Ok(()),
    };
    outcome.map_err(|code| WriteError::SyncFailed { path: temp_path.to_path_buf(), code })
}

/// A temp path that removes itself unless the publish reached
/// [`CommitPhase::RenamedPublished`].
///
/// The descriptor is *not* held here: [`FileDesc`] closes itself when
/// dropped, which is exactly the epilogue's "close if phase < Closed"
/// rule, so early returns need no extra bookkeeping.
pub(crate) struct PendingTemp {
    pub(crate) path: PathBuf,
    phase: CommitPhase,
}

impl PendingTemp {
    pub(crate) fn new(path: PathBuf) -> PendingTemp {
        PendingTemp { path, phase: CommitPhase::Pending }
    }

    /// Monotonic phase update; the protocol never moves backwards.
    pub(crate) fn advance(&mut self, next: CommitPhase) {
        debug_assert!(next >= self.phase, "phase must not regress: {:?} -> {next:?}", self.phase);
        self.phase = next;
    }

    pub(crate) fn phase(&self) -> CommitPhase {
        self.phase
    }
}

impl Drop for PendingTemp {
    fn drop(&mut self) {
        // Once published, the path belongs to the destination's
        // directory entry history; it must never be unlinked from here.
        if self.phase.published() {
            return;
        }
        match sys::unlink(&self.path) {
            Ok(()) => {}
            Err(code) if code.is_not_found() => {}
            Err(code) => {
                tracing::warn!(path = %self.path.display(), %code, "cannot remove temp file");
            }
        }
    }
}

/// Creates an exclusive temp file next to the destination, retrying with
/// a fresh random token on each collision.
///
/// The temp file lives in the destination's own directory: rename is
/// only atomic within one filesystem.
pub(crate) fn create_temp(
    dir: &Path,
    basename: &OsStr,
    tag: TempTag,
) -> Result<(PathBuf, FileDesc), WriteError> {
    let mut last_code = None;
    for _ in 0..TEMP_CREATE_ATTEMPTS {
        let token = random_token()?;
        let path = dir.join(temp_name(basename, &tag, &token));
        match sys::create_exclusive(&path, 0o600) {
            Ok(fd) => return Ok((path, fd)),
            Err(code) if code.is_already_exists() => {
                last_code = Some(code);
                continue;
            }
            Err(code) => {
                return Err(WriteError::TempFileCreationFailed { dir: dir.to_path_buf(), code })
            }
        }
    }
    // 64 collisions against 96 random bits is not chance; surface the
    // last EEXIST rather than spinning forever.
    Err(WriteError::TempFileCreationFailed {
        dir: dir.to_path_buf(),
        code: last_code.unwrap_or(OsCode::last()),
    })
}

fn random_token() -> Result<String, WriteError> {
    let mut buf = [0u8; TEMP_TOKEN_LEN];
    sys::random_bytes(&mut buf).map_err(|code| WriteError::RandomGenerationFailed { code })?;
    Ok(hex::encode(buf))
}

#[cfg(unix)]
fn temp_name(basename: &OsStr, tag: &TempTag, token: &str) -> OsString {
    let mut name = OsString::from(".");
    name.push(basename);
    name.push(format!(".{}.{}.{token}.tmp", tag.as_str(), std::process::id()));
    name
}

#[cfg(windows)]
fn temp_name(basename: &OsStr, tag: &TempTag, token: &str) -> OsString {
    let mut name = OsString::from(basename);
    name.push(format!(".{}.{token}.tmp", tag.as_str()));
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(path: &Path) -> Vec<u8> {
        std::fs::read(path).expect("read destination")
    }

    fn temp_leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .expect("list dir")
            .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp"))
            .collect()
    }

    #[test]
    fn creates_a_new_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("a");

        write_atomic(&[0x48, 0x69], &dest, &AtomicWriteOptions::default()).expect("write");

        assert_eq!(read(&dest), vec![0x48, 0x69]);
        assert!(temp_leftovers(dir.path()).is_empty());
    }

    #[test]
    fn replaces_existing_content() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("b");
        std::fs::write(&dest, [0x01, 0x02, 0x03]).expect("seed destination");

        write_atomic(&[0xff], &dest, &AtomicWriteOptions::default()).expect("write");

        assert_eq!(read(&dest), vec![0xff]);
    }

    #[test]
    fn empty_span_writes_an_empty_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("empty");

        write_atomic(&[], &dest, &AtomicWriteOptions::default()).expect("write");

        assert_eq!(read(&dest), Vec::<u8>::new());
    }

    #[test]
    fn no_clobber_refuses_existing_destination() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("c");
        std::fs::write(&dest, [0x00]).expect("seed destination");

        let options =
            AtomicWriteOptions { strategy: OverwriteStrategy::NoClobber, ..Default::default() };
        let err = write_atomic(&[0x11], &dest, &options).expect_err("no-clobber fails");

        match err {
            WriteError::DestinationExists { path } => assert_eq!(path, dest),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(read(&dest), vec![0x00]);
        assert!(temp_leftovers(dir.path()).is_empty());
    }

    #[test]
    fn no_clobber_succeeds_on_fresh_destination() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("fresh");

        let options =
            AtomicWriteOptions { strategy: OverwriteStrategy::NoClobber, ..Default::default() };
        write_atomic(&[0x11], &dest, &options).expect("write");

        assert_eq!(read(&dest), vec![0x11]);
    }

    #[test]
    fn missing_parent_is_a_parent_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("no/such/dir/file");

        let err = write_atomic(b"x", &dest, &AtomicWriteOptions::default())
            .expect_err("missing parent fails");
        assert!(matches!(err, WriteError::Parent(_)));
    }

    #[test]
    fn create_intermediates_builds_the_parent_chain() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("deep/er/file");

        let options = AtomicWriteOptions { create_intermediates: true, ..Default::default() };
        write_atomic(b"x", &dest, &options).expect("write");

        assert_eq!(read(&dest), b"x");
    }

    #[test]
    fn refuses_to_clobber_a_directory() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("taken");
        std::fs::create_dir(&dest).expect("create fixture dir");

        let err = write_atomic(b"x", &dest, &AtomicWriteOptions::default())
            .expect_err("directory destination fails");
        assert!(matches!(err, WriteError::DestinationIsDirectory { .. }));
        assert!(dest.is_dir());
    }

    #[test]
    fn sequential_writes_leave_the_last_content() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("seq");

        write_atomic(b"x", &dest, &AtomicWriteOptions::default()).expect("first write");
        write_atomic(b"y", &dest, &AtomicWriteOptions::default()).expect("second write");

        assert_eq!(read(&dest), b"y");
    }

    #[test]
    fn durability_modes_all_publish() {
        let dir = tempfile::tempdir().expect("create temp dir");
        for (index, durability) in
            [Durability::Full, Durability::DataOnly, Durability::None].into_iter().enumerate()
        {
            let dest = dir.path().join(format!("d{index}"));
            let options = AtomicWriteOptions { durability, ..Default::default() };
            write_atomic(b"payload", &dest, &options).expect("write");
            assert_eq!(read(&dest), b"payload");
        }
        assert!(temp_leftovers(dir.path()).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn temp_file_name_shape() {
        let name = temp_name(OsStr::new("config.json"), &TempTag::Atomic, "abcdef");
        let name = name.to_string_lossy().into_owned();
        assert!(name.starts_with(".config.json.atomic."), "{name}");
        assert!(name.ends_with(".abcdef.tmp"), "{name}");
    }

    #[test]
    fn random_tokens_differ() {
        let a = random_token().expect("token");
        let b = random_token().expect("token");
        assert_eq!(a.len(), TEMP_TOKEN_LEN * 2);
        assert_ne!(a, b);
    }

    #[test]
    fn pending_temp_removes_file_before_publish() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("t.tmp");
        std::fs::write(&path, b"x").expect("seed temp");

        let mut temp = PendingTemp::new(path.clone());
        temp.advance(CommitPhase::Writing);
        drop(temp);

        assert!(!path.exists());
    }

    #[test]
    fn pending_temp_keeps_destination_after_publish() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("published");
        std::fs::write(&path, b"x").expect("seed file");

        let mut temp = PendingTemp::new(path.clone());
        temp.advance(CommitPhase::RenamedPublished);
        assert!(temp.phase().published());
        drop(temp);

        assert!(path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn preserves_permissions_on_request() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("modes");
        std::fs::write(&dest, b"old").expect("seed destination");
        std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(0o640))
            .expect("chmod fixture");

        let options = AtomicWriteOptions { preserve_permissions: true, ..Default::default() };
        write_atomic(b"new", &dest, &options).expect("write");

        let mode = std::fs::metadata(&dest).expect("stat").permissions().mode() & 0o7777;
        assert_eq!(mode, 0o640);
    }

    #[cfg(unix)]
    #[test]
    fn preserves_timestamps_on_request() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("times");
        std::fs::write(&dest, b"old").expect("seed destination");
        let before = crate::meta::symlink_metadata(&dest).expect("stat fixture");

        std::thread::sleep(std::time::Duration::from_millis(20));
        let options = AtomicWriteOptions { preserve_timestamps: true, ..Default::default() };
        write_atomic(b"new", &dest, &options).expect("write");

        let after = crate::meta::symlink_metadata(&dest).expect("stat result");
        assert_eq!(after.mtime, before.mtime);
    }

    #[test]
    fn acl_preservation_is_rejected_as_unsupported() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("acl");
        std::fs::write(&dest, b"old").expect("seed destination");

        let options = AtomicWriteOptions { preserve_acls: true, ..Default::default() };
        let err = write_atomic(b"new", &dest, &options).expect_err("acl preservation fails");
        assert!(matches!(err, WriteError::PlatformIncompatible { .. }));
        // Pre-publish failure: old content intact, no temp leftovers.
        assert_eq!(read(&dest), b"old");
        assert!(temp_leftovers(dir.path()).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn non_strict_ownership_preservation_is_best_effort() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("owned");
        std::fs::write(&dest, b"old").expect("seed destination");

        let options = AtomicWriteOptions { preserve_ownership: true, ..Default::default() };
        write_atomic(b"new", &dest, &options).expect("write");
        assert_eq!(read(&dest), b"new");
    }
}
