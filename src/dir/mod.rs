//! Single-step directory iteration with raw-name fidelity.
//!
//! [`ReadDir`] owns the kernel directory handle and yields one
//! [`DirEntry`] per underlying entry, in the order the OS produces them.
//! `.` and `..` are skipped by raw-byte comparison. Names that decode
//! and validate as a path component get an [`EntryLocation::Absolute`]
//! with the joined path; every other name is preserved raw with an
//! [`EntryLocation::Relative`] so it can still be reported and compared.

pub mod walk;

use std::path::{Path, PathBuf};

use crate::error::{DirError, OsCode};
use crate::meta::FileKind;
use crate::name::Name;
use crate::sys;

pub use walk::{walk, UndecodablePolicy, Walk, WalkEntry, WalkOptions};

/// Where an entry sits, depending on whether its name survived decoding.
#[derive(Debug, Clone)]
pub enum EntryLocation {
    /// The name decoded and validated; `path` is `parent` joined with it.
    Absolute { parent: PathBuf, path: PathBuf },
    /// The name could not become a path component; only the parent is
    /// known.
    Relative { parent: PathBuf },
}

/// One directory entry: raw name, location, and kind.
#[derive(Debug, Clone)]
pub struct DirEntry {
    name: Name,
    location: EntryLocation,
    kind: FileKind,
}

impl DirEntry {
    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn location(&self) -> &EntryLocation {
        &self.location
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// The full path, when the name decoded to a valid component.
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            EntryLocation::Absolute { path, .. } => Some(path),
            EntryLocation::Relative { .. } => None,
        }
    }

    /// The containing directory; always known.
    pub fn parent(&self) -> &Path {
        match &self.location {
            EntryLocation::Absolute { parent, .. } | EntryLocation::Relative { parent } => parent,
        }
    }
}

/// An open directory iteration.
///
/// Owns the kernel handle until dropped; not sharable across threads.
pub struct ReadDir {
    raw: sys::RawDir,
    parent: PathBuf,
}

impl std::fmt::Debug for ReadDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadDir").field("parent", &self.parent).finish()
    }
}

impl ReadDir {
    /// Opens `path` for iteration.
    pub fn open(path: impl AsRef<Path>) -> Result<ReadDir, DirError> {
        let parent = path.as_ref().to_path_buf();
        let raw = sys::RawDir::open(&parent)
            .map_err(|code| DirError::Open { path: parent.clone(), code })?;
        Ok(ReadDir { raw, parent })
    }

    fn read_error(&self, code: OsCode) -> DirError {
        DirError::Read { path: self.parent.clone(), code }
    }

    fn next_entry(&mut self) -> Result<Option<DirEntry>, DirError> {
        loop {
            let Some(raw) = self.raw.read().map_err(|code| self.read_error(code))? else {
                return Ok(None);
            };
            if raw.name.is_dot_or_dot_dot() {
                continue;
            }

            let location = match raw.name.to_component() {
                Some(component) => EntryLocation::Absolute {
                    parent: self.parent.clone(),
                    path: self.parent.join(component),
                },
                None => EntryLocation::Relative { parent: self.parent.clone() },
            };

            let kind = match raw.kind {
                Some(kind) => kind,
                None => resolve_unknown_kind(&location),
            };

            return Ok(Some(DirEntry { name: raw.name, location, kind }));
        }
    }
}

impl Iterator for ReadDir {
    type Item = Result<DirEntry, DirError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

/// Fallback for filesystems that report `DT_UNKNOWN` (Linux/Musl): one
/// `lstat` on the constructed path. Undecodable names have no path to
/// stat and classify as [`FileKind::Other`]; so do entries that vanish
/// between the readdir and the lstat.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn resolve_unknown_kind(location: &EntryLocation) -> FileKind {
    match location {
        EntryLocation::Absolute { path, .. } => match sys::file_metadata(path, false) {
            Ok(meta) => meta.kind,
            Err(code) => {
                tracing::debug!(path = %path.display(), %code, "lstat for d_type fallback failed");
                FileKind::Other
            }
        },
        EntryLocation::Relative { .. } => FileKind::Other,
    }
}

/// Darwin and the BSDs populate `d_type` unconditionally; Windows always
/// carries attributes. Anything still unknown is `Other`.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn resolve_unknown_kind(_location: &EntryLocation) -> FileKind {
    FileKind::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(dir: &Path) -> Vec<String> {
        let mut collected: Vec<String> = ReadDir::open(dir)
            .expect("open dir")
            .map(|entry| entry.expect("read entry").name().decode_lossy())
            .collect();
        collected.sort();
        collected
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let entries: Vec<_> = ReadDir::open(dir.path()).expect("open dir").collect();
        assert!(entries.is_empty());
    }

    #[test]
    fn dot_and_dot_dot_are_never_emitted() {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::write(dir.path().join("a"), b"").expect("write fixture file");
        std::fs::create_dir(dir.path().join("sub")).expect("create fixture dir");
        assert_eq!(names(dir.path()), vec!["a".to_owned(), "sub".to_owned()]);
    }

    #[test]
    fn kinds_are_classified() {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::write(dir.path().join("f"), b"").expect("write fixture file");
        std::fs::create_dir(dir.path().join("d")).expect("create fixture dir");

        for entry in ReadDir::open(dir.path()).expect("open dir") {
            let entry = entry.expect("read entry");
            match entry.name().decode().expect("ascii name").as_str() {
                "f" => assert_eq!(entry.kind(), FileKind::File),
                "d" => assert_eq!(entry.kind(), FileKind::Directory),
                other => panic!("unexpected entry {other}"),
            }
            assert!(entry.path().is_some());
            assert_eq!(entry.parent(), dir.path());
        }
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_followed_for_kind() {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir(dir.path().join("real")).expect("create fixture dir");
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link"))
            .expect("create symlink");

        for entry in ReadDir::open(dir.path()).expect("open dir") {
            let entry = entry.expect("read entry");
            if entry.name().decode().as_deref() == Some("link") {
                assert_eq!(entry.kind(), FileKind::SymbolicLink);
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn undecodable_name_is_preserved_and_relative() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().expect("create temp dir");
        let raw = [0xff_u8, 0xfe];
        let weird = dir.path().join(OsStr::from_bytes(&raw));
        std::fs::write(&weird, b"x").expect("write undecodable fixture");

        let entries: Vec<_> = ReadDir::open(dir.path())
            .expect("open dir")
            .map(|entry| entry.expect("read entry"))
            .collect();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.name().as_bytes(), &raw);
        assert!(entry.path().is_none());
        assert_eq!(entry.parent(), dir.path());
        assert_eq!(entry.kind(), FileKind::File);
    }

    #[test]
    fn missing_directory_fails_to_open() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let err = ReadDir::open(dir.path().join("absent")).expect_err("open fails");
        match err {
            DirError::Open { .. } => {}
            other => panic!("unexpected error: {other}"),
        }
    }
}
