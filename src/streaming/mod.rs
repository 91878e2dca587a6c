//! Streaming file publication: a chunk sequence instead of one span.
//!
//! Carries the same crash-safety envelope as [`crate::atomic`] when the
//! commit mode is atomic, with bounded memory: each chunk goes straight
//! to the descriptor, nothing is buffered across chunk boundaries.
//! Direct mode writes into the destination itself and offers no
//! atomicity on crash.
//!
//! [`write_stream`] drives the whole sequence; [`StreamingWriter`] is
//! the multi-phase form for callers that need abort points between
//! chunks (`open` / `write_chunk` / `commit` / `cleanup`).

use std::path::{Path, PathBuf};

use crate::atomic::{create_temp, CommitPhase, Durability, OverwriteStrategy, PendingTemp, TempTag};
use crate::error::WriteError;
use crate::parent;
use crate::resolve;
use crate::sys::{self, FileDesc, NoClobber};

/// How direct mode opens the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirectStrategy {
    /// Fail with [`WriteError::DestinationExists`] if the destination
    /// exists.
    Create,
    /// Create the destination or truncate what is there.
    #[default]
    Truncate,
}

/// Options for an atomic streaming commit.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicCommitOptions {
    pub strategy: OverwriteStrategy,
    pub durability: Durability,
}

/// Options for a direct (in-place) streaming commit.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectOptions {
    pub strategy: DirectStrategy,
    pub durability: Durability,
    /// Total size hint; enables `F_PREALLOCATE` on Darwin. Never changes
    /// the file length; EOF stays at the bytes actually written.
    pub expected_size: Option<u64>,
}

/// Commit mode of a streaming write.
#[derive(Debug, Clone, Copy)]
pub enum CommitMode {
    /// Temp file + rename, like [`crate::atomic::write_atomic`].
    Atomic(AtomicCommitOptions),
    /// Write straight into the destination.
    Direct(DirectOptions),
}

impl Default for CommitMode {
    fn default() -> Self {
        CommitMode::Atomic(AtomicCommitOptions::default())
    }
}

/// Options for [`write_stream`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamingWriteOptions {
    pub commit: CommitMode,
    pub create_intermediates: bool,
}

/// Writes every chunk of `chunks` to `path` and commits.
///
/// Each chunk is written as one contiguous region in order. With an
/// atomic commit the destination appears with the complete content or
/// not at all.
pub fn write_stream<I>(
    chunks: I,
    path: impl AsRef<Path>,
    options: &StreamingWriteOptions,
) -> Result<(), WriteError>
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    let mut writer = StreamingWriter::open(path, options)?;
    for chunk in chunks {
        writer.write_chunk(chunk.as_ref())?;
    }
    writer.commit()
}

/// An in-progress streaming write.
///
/// Dropping an uncommitted writer closes the descriptor and, in atomic
/// mode, removes the temp file; the destination is untouched. In direct
/// mode an aborted write leaves whatever was already written, because direct
/// mode has no crash envelope.
pub struct StreamingWriter {
    fd: FileDesc,
    destination: PathBuf,
    dir: PathBuf,
    /// Present in atomic mode: the temp path and its removal guard.
    temp: Option<PendingTemp>,
    durability: Durability,
    /// Rename strategy for the atomic commit; unused in direct mode.
    strategy: OverwriteStrategy,
    phase: CommitPhase,
    written: u64,
}

impl StreamingWriter {
    /// Resolves the destination, verifies (or creates) its parent, and
    /// opens the file the chunks will go into.
    pub fn open(
        path: impl AsRef<Path>,
        options: &StreamingWriteOptions,
    ) -> Result<StreamingWriter, WriteError> {
        let destination = resolve::resolve(path.as_ref());
        let Some((dir, basename)) = resolve::split_destination(&destination) else {
            return Err(WriteError::DestinationIsDirectory { path: destination });
        };

        parent::verify_directory(&dir, options.create_intermediates)?;

        let (fd, temp, durability, strategy) = match options.commit {
            CommitMode::Atomic(atomic) => {
                let (temp_path, fd) = create_temp(&dir, &basename, TempTag::Streaming)?;
                tracing::trace!(
                    temp = %temp_path.display(),
                    dest = %destination.display(),
                    "streaming temp file created"
                );
                (fd, Some(PendingTemp::new(temp_path)), atomic.durability, atomic.strategy)
            }
            CommitMode::Direct(direct) => {
                let create_new = direct.strategy == DirectStrategy::Create;
                let fd = match sys::open_direct(&destination, create_new) {
                    Ok(fd) => fd,
                    Err(code) if create_new && code.is_already_exists() => {
                        return Err(WriteError::DestinationExists { path: destination });
                    }
                    Err(code) => {
                        return Err(WriteError::TempFileCreationFailed { dir, code });
                    }
                };
                if let Some(expected) = direct.expected_size {
                    sys::preallocate(&fd, expected);
                }
                (fd, None, direct.durability, OverwriteStrategy::default())
            }
        };

        let mut writer = StreamingWriter {
            fd,
            destination,
            dir,
            temp,
            durability,
            strategy,
            phase: CommitPhase::Pending,
            written: 0,
        };
        writer.advance(CommitPhase::Writing);
        Ok(writer)
    }

    /// Appends one chunk.
    pub fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), WriteError> {
        let expected = self.written + chunk.len() as u64;
        match sys::write_all(&self.fd, chunk) {
            Ok(()) => {
                self.written = expected;
                Ok(())
            }
            Err(failure) => Err(WriteError::WriteFailed {
                path: self.current_path().to_path_buf(),
                written: self.written + failure.written,
                expected,
                code: failure.code,
            }),
        }
    }

    /// Syncs, closes, and (in atomic mode) renames into place, then
    /// syncs the directory when durability is [`Durability::Full`].
    pub fn commit(mut self) -> Result<(), WriteError> {
        let sync = match self.durability {
            Durability::Full => Some(sys::sync_full(&self.fd)),
            Durability::DataOnly => Some(sys::sync_data(&self.fd)),
            Durability::None => None,
        };
        if let Some(outcome) = sync {
            outcome.map_err(|code| WriteError::SyncFailed {
                path: self.current_path().to_path_buf(),
                code,
            })?;
        }
        self.advance(CommitPhase::SyncedFile);

        // No Drop on the writer itself, so the fields move out cleanly;
        // the temp guard stays armed across the rename.
        let StreamingWriter { fd, destination, dir, mut temp, durability, strategy, .. } = self;

        let close_path = match &temp {
            Some(temp) => temp.path.clone(),
            None => destination.clone(),
        };
        fd.close().map_err(|code| WriteError::CloseFailed { path: close_path, code })?;

        if let Some(pending) = temp.as_mut() {
            pending.advance(CommitPhase::Closed);
            match strategy {
                OverwriteStrategy::ReplaceExisting => {
                    sys::rename_replace(&pending.path, &destination).map_err(|code| {
                        WriteError::RenameFailed {
                            from: pending.path.clone(),
                            to: destination.clone(),
                            code,
                        }
                    })?;
                }
                OverwriteStrategy::NoClobber => match sys::rename_noclobber(&pending.path, &destination)
                {
                    Ok(NoClobber::Renamed) => {}
                    Ok(NoClobber::Exists) => {
                        return Err(WriteError::DestinationExists { path: destination });
                    }
                    Err(code) => {
                        return Err(WriteError::RenameFailed {
                            from: pending.path.clone(),
                            to: destination.clone(),
                            code,
                        });
                    }
                },
            }
            pending.advance(CommitPhase::RenamedPublished);
            tracing::debug!(dest = %destination.display(), "streaming publish complete");
        }

        if matches!(durability, Durability::Full) {
            match temp.as_mut() {
                Some(pending) => {
                    pending.advance(CommitPhase::DirectorySyncAttempted);
                    sys::sync_directory(&dir).map_err(|code| {
                        WriteError::DirectorySyncFailedAfterCommit {
                            path: destination.clone(),
                            code,
                        }
                    })?;
                    pending.advance(CommitPhase::SyncedDirectory);
                }
                // Direct mode: no rename happened, so a directory-sync
                // failure is not an after-commit condition.
                None => {
                    sys::sync_directory(&dir)
                        .map_err(|code| WriteError::DirectorySyncFailed { dir: dir.clone(), code })?;
                }
            }
        }

        Ok(())
    }

    /// Abandons the write: closes the descriptor and removes the temp
    /// file (atomic mode). For use on failure paths of multi-phase
    /// callers; dropping the writer has the same effect.
    pub fn cleanup(self) {
        tracing::trace!(dest = %self.destination.display(), "streaming write abandoned");
        drop(self);
    }

    /// The path bytes are currently going to: the temp file in atomic
    /// mode, the destination in direct mode.
    pub fn current_path(&self) -> &Path {
        match &self.temp {
            Some(temp) => &temp.path,
            None => &self.destination,
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn is_atomic(&self) -> bool {
        self.temp.is_some()
    }

    pub fn phase(&self) -> CommitPhase {
        self.phase
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    fn advance(&mut self, next: CommitPhase) {
        self.phase = next;
        if let Some(temp) = self.temp.as_mut() {
            temp.advance(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(path: &Path) -> Vec<u8> {
        std::fs::read(path).expect("read destination")
    }

    fn temp_leftovers(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .expect("list dir")
            .filter(|e| {
                e.as_ref()
                    .expect("dir entry")
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".tmp")
            })
            .count()
    }

    #[test]
    fn atomic_stream_concatenates_chunks() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("d");

        let chunks: [&[u8]; 2] = [&[0xaa, 0xbb], &[0xcc]];
        write_stream(chunks, &dest, &StreamingWriteOptions::default()).expect("stream");

        assert_eq!(read(&dest), vec![0xaa, 0xbb, 0xcc]);
        assert_eq!(temp_leftovers(dir.path()), 0);
    }

    #[test]
    fn empty_chunk_sequence_writes_an_empty_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("empty");

        let chunks: [&[u8]; 0] = [];
        write_stream(chunks, &dest, &StreamingWriteOptions::default()).expect("stream");

        assert_eq!(read(&dest), Vec::<u8>::new());
    }

    #[test]
    fn abandoned_atomic_writer_leaves_no_trace() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("gone");

        let mut writer =
            StreamingWriter::open(&dest, &StreamingWriteOptions::default()).expect("open");
        writer.write_chunk(b"partial").expect("write chunk");
        assert!(writer.is_atomic());
        writer.cleanup();

        assert!(!dest.exists());
        assert_eq!(temp_leftovers(dir.path()), 0);
    }

    #[test]
    fn atomic_commit_replaces_previous_content() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("swap");
        std::fs::write(&dest, b"before").expect("seed destination");

        write_stream([b"after".as_slice()], &dest, &StreamingWriteOptions::default())
            .expect("stream");
        assert_eq!(read(&dest), b"after");
    }

    #[test]
    fn atomic_no_clobber_refuses_existing() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("held");
        std::fs::write(&dest, b"keep").expect("seed destination");

        let options = StreamingWriteOptions {
            commit: CommitMode::Atomic(AtomicCommitOptions {
                strategy: OverwriteStrategy::NoClobber,
                durability: Durability::default(),
            }),
            create_intermediates: false,
        };
        let err = write_stream([b"new".as_slice()], &dest, &options).expect_err("noclobber");
        assert!(matches!(err, WriteError::DestinationExists { .. }));
        assert_eq!(read(&dest), b"keep");
        assert_eq!(temp_leftovers(dir.path()), 0);
    }

    #[test]
    fn direct_create_fails_on_existing_destination() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("direct");
        std::fs::write(&dest, b"occupied").expect("seed destination");

        let options = StreamingWriteOptions {
            commit: CommitMode::Direct(DirectOptions {
                strategy: DirectStrategy::Create,
                ..Default::default()
            }),
            create_intermediates: false,
        };
        let err = write_stream([b"x".as_slice()], &dest, &options).expect_err("create");
        assert!(matches!(err, WriteError::DestinationExists { .. }));
        assert_eq!(read(&dest), b"occupied");
    }

    #[test]
    fn direct_truncate_overwrites_in_place() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("trunc");
        std::fs::write(&dest, b"a much longer previous content").expect("seed destination");

        let options = StreamingWriteOptions {
            commit: CommitMode::Direct(DirectOptions::default()),
            create_intermediates: false,
        };
        write_stream([b"tiny".as_slice()], &dest, &options).expect("stream");
        assert_eq!(read(&dest), b"tiny");
    }

    #[test]
    fn direct_mode_writes_into_destination_immediately() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("live");

        let options = StreamingWriteOptions {
            commit: CommitMode::Direct(DirectOptions::default()),
            create_intermediates: false,
        };
        let mut writer = StreamingWriter::open(&dest, &options).expect("open");
        assert!(!writer.is_atomic());
        assert_eq!(writer.current_path(), writer.destination());
        writer.write_chunk(b"abc").expect("write chunk");
        assert_eq!(writer.bytes_written(), 3);
        writer.commit().expect("commit");

        assert_eq!(read(&dest), b"abc");
    }

    #[test]
    fn expected_size_hint_does_not_change_eof() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("hinted");

        let options = StreamingWriteOptions {
            commit: CommitMode::Direct(DirectOptions {
                expected_size: Some(1 << 20),
                ..Default::default()
            }),
            create_intermediates: false,
        };
        write_stream([b"only this".as_slice()], &dest, &options).expect("stream");

        assert_eq!(read(&dest), b"only this");
        assert_eq!(std::fs::metadata(&dest).expect("stat").len(), 9);
    }

    #[test]
    fn multi_phase_atomic_flow() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("phased");

        let mut writer =
            StreamingWriter::open(&dest, &StreamingWriteOptions::default()).expect("open");
        assert_eq!(writer.phase(), CommitPhase::Writing);
        assert!(!dest.exists(), "destination must not appear before commit");

        writer.write_chunk(b"one").expect("chunk 1");
        writer.write_chunk(b"two").expect("chunk 2");
        writer.commit().expect("commit");

        assert_eq!(read(&dest), b"onetwo");
        assert_eq!(temp_leftovers(dir.path()), 0);
    }

    #[test]
    fn create_intermediates_applies_to_streaming() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let dest = dir.path().join("a/b/streamed");

        let options =
            StreamingWriteOptions { create_intermediates: true, ..Default::default() };
        write_stream([b"deep".as_slice()], &dest, &options).expect("stream");
        assert_eq!(read(&dest), b"deep");
    }
}
