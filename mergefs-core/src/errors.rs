// MergeError :: the error taxonomy from spec.md §7, expressed as first-class Rust variants
// instead of bare errno integers. Converts to libc::c_int at the Dispatcher/FUSE boundary
// (the Error Mapper component, spec.md §2.5), mirroring how modcrab::error::AppError wraps
// io::Error with #[from] and a final passthrough variant.

use std::io;

use thiserror::Error;

/// The error taxonomy from spec.md §7.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Path absent in every root, or a link/rename constraint violation.
    #[error("path not found in any backing root")]
    NotFound,

    /// A participating root refused the operation.
    #[error("a participating root denied access")]
    AccessDenied,

    /// The target of link/symlink/create-of-directory already exists.
    #[error("target already exists")]
    FileExists,

    #[error("path component is not a directory")]
    NotADirectory,

    #[error("path refers to a directory where a file was expected")]
    IsADirectory,

    #[error("operation not permitted")]
    PermissionError,

    /// Passthrough for any other POSIX errno surfaced by a backing syscall.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl MergeError {
    /// Maps this error to the errno value reported to the kernel bridge.
    pub fn errno(&self) -> libc::c_int {
        match self {
            MergeError::NotFound => libc::ENOENT,
            MergeError::AccessDenied => libc::EACCES,
            MergeError::FileExists => libc::EEXIST,
            MergeError::NotADirectory => libc::ENOTDIR,
            MergeError::IsADirectory => libc::EISDIR,
            MergeError::PermissionError => libc::EPERM,
            MergeError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

impl From<nix::Error> for MergeError {
    fn from(e: nix::Error) -> Self {
        MergeError::Io(io::Error::from_raw_os_error(e as i32))
    }
}

impl From<MergeError> for libc::c_int {
    fn from(e: MergeError) -> Self {
        e.errno()
    }
}

/// Converts a raw `nix` syscall failure straight into the errno fuse_mt expects as a reply.
pub fn nix_errno(e: nix::Error) -> libc::c_int {
    e as i32
}

/// Converts an `io::Error` into the errno fuse_mt expects, falling back to `EIO` for errors
/// that don't carry a raw OS error code (e.g. ones synthesized from an `io::ErrorKind`).
pub fn io_errno(e: io::Error) -> libc::c_int {
    e.raw_os_error().unwrap_or(libc::EIO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_errno() {
        assert_eq!(MergeError::NotFound.errno(), libc::ENOENT);
        assert_eq!(MergeError::AccessDenied.errno(), libc::EACCES);
        assert_eq!(MergeError::FileExists.errno(), libc::EEXIST);
    }

    #[test]
    fn io_passthrough_keeps_raw_errno() {
        let err = MergeError::Io(io::Error::from_raw_os_error(libc::ENOTEMPTY));
        assert_eq!(err.errno(), libc::ENOTEMPTY);
    }
}
