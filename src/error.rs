//! Error types for the bind filesystem core.
//!
//! Every host failure is converted into a [`BindError`] and from there into
//! exactly one errno for the transport. Nothing here retries.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type BindResult<T> = Result<T, BindError>;

#[derive(Error, Debug)]
pub enum BindError {
    #[error("source is not an existing directory: {path}: {source}")]
    Confinement {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("no such file or directory")]
    NotFound,

    #[error("file exists")]
    AlreadyExists,

    #[error("directory not empty")]
    NotEmpty,

    #[error("is a directory")]
    IsADirectory,

    #[error("not a directory")]
    NotADirectory,

    #[error("no space left on device")]
    NoSpace,

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("bad file handle: {0}")]
    BadHandle(u64),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(io::Error),
}

impl BindError {
    /// The errno handed back to the kernel for this error.
    pub fn errno(&self) -> i32 {
        match self {
            BindError::Confinement { .. } => libc::ENOTDIR,
            BindError::PermissionDenied(_) => libc::EACCES,
            BindError::NotFound => libc::ENOENT,
            BindError::AlreadyExists => libc::EEXIST,
            BindError::NotEmpty => libc::ENOTEMPTY,
            BindError::IsADirectory => libc::EISDIR,
            BindError::NotADirectory => libc::ENOTDIR,
            BindError::NoSpace => libc::ENOSPC,
            BindError::Unsupported(_) => libc::ENOTSUP,
            BindError::BadHandle(_) => libc::EBADF,
            BindError::InvalidArgument(_) => libc::EINVAL,
            BindError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

impl From<io::Error> for BindError {
    fn from(e: io::Error) -> Self {
        match e.raw_os_error() {
            Some(libc::EACCES) => BindError::PermissionDenied(e.to_string()),
            Some(libc::ENOENT) => BindError::NotFound,
            Some(libc::EEXIST) => BindError::AlreadyExists,
            Some(libc::ENOTEMPTY) => BindError::NotEmpty,
            Some(libc::EISDIR) => BindError::IsADirectory,
            Some(libc::ENOTDIR) => BindError::NotADirectory,
            Some(libc::ENOSPC) => BindError::NoSpace,
            _ => BindError::Io(e),
        }
    }
}

impl From<rustix::io::Errno> for BindError {
    fn from(e: rustix::io::Errno) -> Self {
        io::Error::from(e).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_errors_translate_one_to_one() {
        let cases = [
            libc::EACCES,
            libc::ENOENT,
            libc::EEXIST,
            libc::ENOTEMPTY,
            libc::EISDIR,
            libc::ENOTDIR,
            libc::ENOSPC,
            libc::EXDEV,
            libc::ELOOP,
            libc::EPERM,
        ];
        for errno in cases {
            let err = BindError::from(io::Error::from_raw_os_error(errno));
            assert_eq!(err.errno(), errno, "errno {} did not survive translation", errno);
        }
    }

    #[test]
    fn test_named_variants() {
        assert!(matches!(
            BindError::from(io::Error::from_raw_os_error(libc::ENOENT)),
            BindError::NotFound
        ));
        assert!(matches!(
            BindError::from(io::Error::from_raw_os_error(libc::EACCES)),
            BindError::PermissionDenied(_)
        ));
    }

    #[test]
    fn test_syscall_errno_translates() {
        let err = BindError::from(rustix::io::Errno::NOENT);
        assert!(matches!(err, BindError::NotFound));
        assert_eq!(BindError::from(rustix::io::Errno::XDEV).errno(), libc::EXDEV);
        assert_eq!(BindError::from(rustix::io::Errno::LOOP).errno(), libc::ELOOP);
    }

    #[test]
    fn test_error_without_errno_is_eio() {
        let err = BindError::from(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(err.errno(), libc::EIO);
        assert_eq!(BindError::Unsupported("getxattr").errno(), libc::ENOTSUP);
        assert_eq!(BindError::BadHandle(7).errno(), libc::EBADF);
    }
}
