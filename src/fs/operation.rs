//! The call vocabulary of the dispatcher.
//!
//! Every filesystem verb is one variant of [`Operation`], carrying the
//! transport path(s) exactly as received. [`BindFs::call`] rewrites them
//! before any handler runs.
//!
//! [`BindFs::call`]: crate::fs::BindFs::call

use crate::fs::attributes::{Attributes, DirEntry, FsStats};
use crate::fs::file_handles::FileHandle;
use crate::error::{BindError, BindResult};
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::time::SystemTime;

/// Timestamp argument of utimens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetTime {
    Now,
    Omit,
    At(SystemTime),
}

#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    Access { path: &'a Path, mode: i32 },
    Create { path: &'a Path, mode: u32, flags: i32 },
    Open { path: &'a Path, flags: i32 },
    Read { path: &'a Path, fh: FileHandle, size: u32, offset: u64 },
    Write { path: &'a Path, fh: FileHandle, data: &'a [u8], offset: u64 },
    Flush { path: &'a Path, fh: FileHandle },
    Fsync { path: &'a Path, fh: FileHandle, datasync: bool },
    Release { path: &'a Path, fh: FileHandle },
    /// `fh` is set when the transport stats an open file.
    Getattr { path: &'a Path, fh: Option<FileHandle> },
    Statfs { path: &'a Path },
    Readdir { path: &'a Path },
    Rename { old: &'a Path, new: &'a Path, flags: u32 },
    /// `link` is the new name, `target` the existing entry.
    Link { link: &'a Path, target: &'a Path },
    /// `link` is the new name, `target` the link content (not rewritten).
    Symlink { link: &'a Path, target: &'a Path },
    Truncate { path: &'a Path, length: u64, fh: Option<FileHandle> },
    Unlink { path: &'a Path },
    Rmdir { path: &'a Path },
    Mkdir { path: &'a Path, mode: u32 },
    Mknod { path: &'a Path, mode: u32, rdev: u64 },
    Chmod { path: &'a Path, mode: u32 },
    Chown { path: &'a Path, uid: Option<u32>, gid: Option<u32> },
    Utimens { path: &'a Path, atime: SetTime, mtime: SetTime },
    Readlink { path: &'a Path },
    Getxattr { path: &'a Path, name: &'a OsStr },
    Listxattr { path: &'a Path },
    Setxattr { path: &'a Path, name: &'a OsStr, value: &'a [u8] },
    Removexattr { path: &'a Path, name: &'a OsStr },
}

impl Operation<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Access { .. } => "access",
            Operation::Create { .. } => "create",
            Operation::Open { .. } => "open",
            Operation::Read { .. } => "read",
            Operation::Write { .. } => "write",
            Operation::Flush { .. } => "flush",
            Operation::Fsync { .. } => "fsync",
            Operation::Release { .. } => "release",
            Operation::Getattr { .. } => "getattr",
            Operation::Statfs { .. } => "statfs",
            Operation::Readdir { .. } => "readdir",
            Operation::Rename { .. } => "rename",
            Operation::Link { .. } => "link",
            Operation::Symlink { .. } => "symlink",
            Operation::Truncate { .. } => "truncate",
            Operation::Unlink { .. } => "unlink",
            Operation::Rmdir { .. } => "rmdir",
            Operation::Mkdir { .. } => "mkdir",
            Operation::Mknod { .. } => "mknod",
            Operation::Chmod { .. } => "chmod",
            Operation::Chown { .. } => "chown",
            Operation::Utimens { .. } => "utimens",
            Operation::Readlink { .. } => "readlink",
            Operation::Getxattr { .. } => "getxattr",
            Operation::Listxattr { .. } => "listxattr",
            Operation::Setxattr { .. } => "setxattr",
            Operation::Removexattr { .. } => "removexattr",
        }
    }

    /// The primary transport path of the call.
    pub fn path(&self) -> &Path {
        match *self {
            Operation::Access { path, .. }
            | Operation::Create { path, .. }
            | Operation::Open { path, .. }
            | Operation::Read { path, .. }
            | Operation::Write { path, .. }
            | Operation::Flush { path, .. }
            | Operation::Fsync { path, .. }
            | Operation::Release { path, .. }
            | Operation::Getattr { path, .. }
            | Operation::Statfs { path }
            | Operation::Readdir { path }
            | Operation::Truncate { path, .. }
            | Operation::Unlink { path }
            | Operation::Rmdir { path }
            | Operation::Mkdir { path, .. }
            | Operation::Mknod { path, .. }
            | Operation::Chmod { path, .. }
            | Operation::Chown { path, .. }
            | Operation::Utimens { path, .. }
            | Operation::Readlink { path }
            | Operation::Getxattr { path, .. }
            | Operation::Listxattr { path }
            | Operation::Setxattr { path, .. }
            | Operation::Removexattr { path, .. } => path,
            Operation::Rename { old, .. } => old,
            Operation::Link { link, .. } | Operation::Symlink { link, .. } => link,
        }
    }
}

/// Success value of a call.
#[derive(Debug)]
pub enum Reply {
    Empty,
    Handle(FileHandle),
    Data(Vec<u8>),
    Written(usize),
    Attr(Attributes),
    Statfs(FsStats),
    Entries(Vec<DirEntry>),
    Link(OsString),
}

impl Reply {
    fn kind(&self) -> &'static str {
        match self {
            Reply::Empty => "empty",
            Reply::Handle(_) => "handle",
            Reply::Data(_) => "data",
            Reply::Written(_) => "written",
            Reply::Attr(_) => "attr",
            Reply::Statfs(_) => "statfs",
            Reply::Entries(_) => "entries",
            Reply::Link(_) => "link",
        }
    }

    fn mismatch(self, expected: &str) -> BindError {
        BindError::InvalidArgument(format!("expected {} reply, got {}", expected, self.kind()))
    }

    pub fn into_empty(self) -> BindResult<()> {
        match self {
            Reply::Empty => Ok(()),
            other => Err(other.mismatch("empty")),
        }
    }

    pub fn into_handle(self) -> BindResult<FileHandle> {
        match self {
            Reply::Handle(fh) => Ok(fh),
            other => Err(other.mismatch("handle")),
        }
    }

    pub fn into_data(self) -> BindResult<Vec<u8>> {
        match self {
            Reply::Data(data) => Ok(data),
            other => Err(other.mismatch("data")),
        }
    }

    pub fn into_written(self) -> BindResult<usize> {
        match self {
            Reply::Written(n) => Ok(n),
            other => Err(other.mismatch("written")),
        }
    }

    pub fn into_attr(self) -> BindResult<Attributes> {
        match self {
            Reply::Attr(attr) => Ok(attr),
            other => Err(other.mismatch("attr")),
        }
    }

    pub fn into_statfs(self) -> BindResult<FsStats> {
        match self {
            Reply::Statfs(stats) => Ok(stats),
            other => Err(other.mismatch("statfs")),
        }
    }

    pub fn into_entries(self) -> BindResult<Vec<DirEntry>> {
        match self {
            Reply::Entries(entries) => Ok(entries),
            other => Err(other.mismatch("entries")),
        }
    }

    pub fn into_link(self) -> BindResult<OsString> {
        match self {
            Reply::Link(target) => Ok(target),
            other => Err(other.mismatch("link")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_path() {
        let op = Operation::Rename {
            old: Path::new("/a"),
            new: Path::new("/b"),
            flags: 0,
        };
        assert_eq!(op.name(), "rename");
        assert_eq!(op.path(), Path::new("/a"));

        let op = Operation::Link {
            link: Path::new("/new"),
            target: Path::new("/old"),
        };
        assert_eq!(op.path(), Path::new("/new"));
    }

    #[test]
    fn test_reply_mismatch_is_an_error() {
        assert_eq!(Reply::Written(3).into_written().unwrap(), 3);
        assert!(Reply::Empty.into_data().is_err());
    }
}
