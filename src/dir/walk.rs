//! Recursive, depth-first, pre-order directory walk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::WalkError;
use crate::meta::{FileId, FileKind};
use crate::sys;

use super::{DirEntry, EntryLocation, ReadDir};

/// What to do with an entry whose name cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UndecodablePolicy {
    /// Drop the entry and do not descend.
    #[default]
    Skip,
    /// Yield the entry with its relative location; there is no path to
    /// descend into.
    Emit,
    /// Terminate the walk with [`WalkError::Undecodable`].
    Stop,
}

/// Walk configuration.
#[derive(Debug, Clone, Copy)]
pub struct WalkOptions {
    /// Deepest directory level to list, inclusive. Direct children of
    /// the root are depth 0. `None` is unbounded.
    pub max_depth: Option<usize>,
    /// Descend through symlinks whose target is a directory. Cycle
    /// safety comes from `(device, inode)` tracking while this is on.
    pub follow_symlinks: bool,
    /// Yield entries whose name starts with a dot.
    pub include_hidden: bool,
    pub on_undecodable: UndecodablePolicy,
}

impl Default for WalkOptions {
    fn default() -> Self {
        WalkOptions {
            max_depth: None,
            follow_symlinks: false,
            include_hidden: true,
            on_undecodable: UndecodablePolicy::default(),
        }
    }
}

/// An entry yielded by [`walk`], tagged with its depth.
#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub entry: DirEntry,
    /// Depth of the entry: 0 for direct children of the root.
    pub depth: usize,
}

/// Walks `root` depth-first, directories before their children, entries
/// within one directory in OS order.
pub fn walk(root: impl AsRef<Path>, options: WalkOptions) -> Walk {
    Walk {
        options,
        start: Some(root.as_ref().to_path_buf()),
        pending: None,
        stack: Vec::new(),
        visited: HashSet::new(),
        stopped: false,
    }
}

struct Frame {
    iter: ReadDir,
    depth: usize,
}

/// Iterator state of a recursive walk. Created by [`walk`].
pub struct Walk {
    options: WalkOptions,
    start: Option<PathBuf>,
    /// A directory to open before reading further entries; kept apart so
    /// the directory's own entry is yielded before its open can fail.
    pending: Option<(PathBuf, usize)>,
    stack: Vec<Frame>,
    /// Identities of directories already entered; consulted only when
    /// following symlinks.
    visited: HashSet<FileId>,
    stopped: bool,
}

impl Walk {
    fn open_frame(&mut self, path: &Path, depth: usize) -> Result<(), WalkError> {
        let iter = ReadDir::open(path)?;
        self.stack.push(Frame { iter, depth });
        Ok(())
    }

    /// Whether to descend into the directory the entry names, and the
    /// path to descend into.
    fn descend_target(&mut self, entry: &DirEntry, child_depth: usize) -> Option<PathBuf> {
        if let Some(max) = self.options.max_depth {
            if child_depth > max {
                return None;
            }
        }
        let path = entry.path()?;
        match entry.kind() {
            FileKind::Directory => {}
            FileKind::SymbolicLink if self.options.follow_symlinks => {}
            _ => return None,
        }
        if self.options.follow_symlinks {
            // One stat per candidate: settles both whether a symlink's
            // target is a directory and the identity for cycle tracking.
            // A dangling link is simply not descended.
            let meta = match sys::file_metadata(path, true) {
                Ok(meta) => meta,
                Err(code) => {
                    tracing::debug!(path = %path.display(), %code, "descend target stat failed");
                    return None;
                }
            };
            if !meta.is_dir() {
                return None;
            }
            if !self.visited.insert(meta.id) {
                tracing::debug!(path = %path.display(), "directory already visited, skipping");
                return None;
            }
        }
        Some(path.to_path_buf())
    }
}

impl Iterator for Walk {
    type Item = Result<WalkEntry, WalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stopped {
            return None;
        }

        if let Some(root) = self.start.take() {
            if self.options.follow_symlinks {
                if let Ok(meta) = sys::file_metadata(&root, true) {
                    self.visited.insert(meta.id);
                }
            }
            if let Err(err) = self.open_frame(&root, 0) {
                self.stopped = true;
                return Some(Err(err));
            }
        }

        loop {
            if let Some((path, depth)) = self.pending.take() {
                if let Err(err) = self.open_frame(&path, depth) {
                    return Some(Err(err));
                }
            }

            let frame = self.stack.last_mut()?;
            let depth = frame.depth;
            let entry = match frame.iter.next() {
                None => {
                    self.stack.pop();
                    continue;
                }
                Some(Err(err)) => return Some(Err(err.into())),
                Some(Ok(entry)) => entry,
            };

            if !self.options.include_hidden && entry.name().is_hidden_by_dot_prefix() {
                continue;
            }

            if matches!(entry.location(), EntryLocation::Relative { .. }) {
                match self.options.on_undecodable {
                    UndecodablePolicy::Skip => continue,
                    UndecodablePolicy::Emit => {
                        return Some(Ok(WalkEntry { entry, depth }));
                    }
                    UndecodablePolicy::Stop => {
                        self.stopped = true;
                        return Some(Err(WalkError::Undecodable {
                            parent: entry.parent().to_path_buf(),
                            name: entry.name().clone(),
                        }));
                    }
                }
            }

            if let Some(target) = self.descend_target(&entry, depth + 1) {
                self.pending = Some((target, depth + 1));
            }
            return Some(Ok(WalkEntry { entry, depth }));
        }
    }
}
