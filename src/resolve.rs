//! Destination path resolution: home expansion, absolutization, and the
//! parent/basename split the publish protocol works with.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Expands `~` / `~/...`, makes the path absolute against the current
/// working directory when possible, and strips trailing separators
/// (except at the filesystem root).
pub fn resolve(path: &Path) -> PathBuf {
    let expanded = expand_home(path);
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        match env::current_dir() {
            Ok(cwd) => cwd.join(&expanded),
            // The path stays relative; every syscall resolves it against
            // the same cwd we failed to read.
            Err(_) => expanded,
        }
    };
    strip_trailing_separators(&absolute)
}

/// Splits a resolved destination into its containing directory and final
/// component. `None` when the path has no final component (the root).
pub(crate) fn split_destination(path: &Path) -> Option<(PathBuf, OsString)> {
    let name = path.file_name()?.to_os_string();
    let parent = match path.parent() {
        Some(p) if p.as_os_str().is_empty() => PathBuf::from("."),
        Some(p) => p.to_path_buf(),
        None => return None,
    };
    Some((parent, name))
}

/// Expands a leading `~` to the user's home directory.
///
/// Both a bare `~` and a `~/...` prefix are recognized; `~user` forms are
/// not. Paths that are not valid UTF-8 are returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    let Some(text) = path.to_str() else {
        return path.to_path_buf();
    };
    if text == "~" {
        return home_dir().unwrap_or_else(|| path.to_path_buf());
    }
    let rest = text.strip_prefix("~/");
    #[cfg(windows)]
    let rest = rest.or_else(|| text.strip_prefix("~\\"));
    match (rest, home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(unix)]
    {
        env::var_os("HOME").map(PathBuf::from)
    }
    #[cfg(windows)]
    {
        env::var_os("USERPROFILE").map(PathBuf::from)
    }
}

/// Drops trailing separators. `Path::components` already normalizes them
/// away; the root keeps its single separator.
fn strip_trailing_separators(path: &Path) -> PathBuf {
    path.components().as_path().to_path_buf()
}
