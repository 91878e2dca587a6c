//! Compile-time platform dispatch for the syscall layer.
//!
//! A single cross-platform surface is exported; each platform module
//! implements it against its own kernel interface. Shared protocol logic
//! (phase tracking, retry discipline, error classification) lives above
//! this layer and never touches a raw syscall directly.

mod fd;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub(crate) use unix::*;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub(crate) use windows::*;

pub(crate) use fd::FileDesc;

/// Outcome of a no-clobber rename attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NoClobber {
    /// The temp file now lives at the destination.
    Renamed,
    /// The destination already existed; nothing was moved.
    Exists,
}

/// A failed bulk write: how far it got and why it stopped.
#[derive(Debug)]
pub(crate) struct WriteFailure {
    pub(crate) written: u64,
    pub(crate) code: crate::error::OsCode,
}
