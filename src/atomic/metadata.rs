//! Copying the old destination's metadata onto the temp file.
//!
//! Runs strictly before the rename: a preservation failure leaves the
//! destination untouched. Everything operates on the open temp
//! descriptor, never on paths, so a concurrent rename in the directory
//! cannot redirect the effect.

use std::path::Path;

use crate::error::{MetadataOp, WriteError};
use crate::meta::Metadata;
use crate::sys::{self, FileDesc};

use super::AtomicWriteOptions;

pub(super) fn apply(
    source: &Metadata,
    destination: &Path,
    fd: &FileDesc,
    options: &AtomicWriteOptions,
) -> Result<(), WriteError> {
    if options.preserve_acls {
        return Err(WriteError::PlatformIncompatible { operation: "ACL preservation" });
    }

    #[cfg(unix)]
    {
        if options.preserve_permissions {
            sys::set_permissions(fd, source.mode)
                .map_err(|code| failed(destination, MetadataOp::Permissions, code))?;
        }

        if options.preserve_ownership {
            match sys::set_ownership(fd, source.uid, source.gid) {
                Ok(()) => {}
                Err(code) if !options.strict_ownership => {
                    // Non-root callers cannot chown to foreign owners;
                    // without strict mode that is expected and skipped.
                    tracing::debug!(
                        dest = %destination.display(),
                        %code,
                        "ownership not preserved"
                    );
                }
                Err(code) => {
                    return Err(failed(destination, MetadataOp::Ownership, code));
                }
            }
        }

        if options.preserve_timestamps {
            sys::set_times(fd, source.atime, source.mtime)
                .map_err(|code| failed(destination, MetadataOp::Timestamps, code))?;
        }

        if options.preserve_xattrs {
            sys::copy_xattrs(destination, fd)
                .map_err(|code| failed(destination, MetadataOp::ExtendedAttributes, code))?;
        }
    }

    #[cfg(windows)]
    {
        if options.preserve_ownership && options.strict_ownership {
            return Err(WriteError::PlatformIncompatible {
                operation: "strict ownership preservation",
            });
        }

        if options.preserve_permissions || options.preserve_timestamps {
            // Zero attributes / absent times are left unchanged.
            let attributes = if options.preserve_permissions { source.mode } else { 0 };
            let (atime, mtime, creation) = if options.preserve_timestamps {
                (Some(source.atime), Some(source.mtime), Some(source.ctime))
            } else {
                (None, None, None)
            };
            let op = if options.preserve_timestamps {
                MetadataOp::Timestamps
            } else {
                MetadataOp::Permissions
            };
            sys::set_basic_info(fd, attributes, atime, mtime, creation)
                .map_err(|code| failed(destination, op, code))?;
        }

        if options.preserve_xattrs {
            sys::copy_xattrs(destination, fd)
                .map_err(|code| failed(destination, MetadataOp::ExtendedAttributes, code))?;
        }
    }

    Ok(())
}

fn failed(destination: &Path, op: MetadataOp, code: crate::error::OsCode) -> WriteError {
    WriteError::MetadataPreservationFailed { path: destination.to_path_buf(), op, code }
}
