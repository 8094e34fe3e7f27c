//! Bind filesystem core
//!
//! [`BindFs`] is the operation dispatcher: every call enters through
//! [`BindFs::call`], which rewrites the transport path(s) into root-relative
//! form and forwards to the matching handler. The typed methods below are
//! thin wrappers that build the [`Operation`] and unwrap the [`Reply`].

pub mod attributes;
pub mod file_handles;
mod handlers;
pub mod operation;
pub mod root;

pub use attributes::{Attributes, DirEntry, FileKind, FsStats};
pub use file_handles::{FileHandle, FileHandleManager};
pub use operation::{Operation, Reply, SetTime};
pub use root::{BoundRoot, RootPath};

use crate::error::{BindError, BindResult};
use log::debug;
use std::ffi::{OsStr, OsString};
use std::path::Path;

/// Pass-through filesystem confined beneath a bound root
pub struct BindFs {
    root: BoundRoot,
    file_handle_manager: FileHandleManager,
}

impl BindFs {
    pub fn new(root: BoundRoot) -> Self {
        Self {
            root,
            file_handle_manager: FileHandleManager::new(),
        }
    }

    /// Bind `source` and build the filesystem on top of it.
    pub fn bind<P: AsRef<Path>>(source: P) -> BindResult<Self> {
        Ok(Self::new(BoundRoot::bind(source)?))
    }

    pub fn root(&self) -> &BoundRoot {
        &self.root
    }

    pub fn file_handles(&self) -> &FileHandleManager {
        &self.file_handle_manager
    }

    /// Single entry point for every verb.
    pub fn call(&self, op: Operation<'_>) -> BindResult<Reply> {
        let path = RootPath::from_call(op.path());
        debug!(
            "call: {}, path: {}",
            op.name(),
            self.root.display_path(&path).display()
        );

        let result = match op {
            Operation::Access { mode, .. } => self.handle_access(&path, mode),
            Operation::Create { mode, flags, .. } => self.handle_create(&path, mode, flags),
            Operation::Open { flags, .. } => self.handle_open(&path, flags),
            Operation::Read { fh, size, offset, .. } => self.handle_read(fh, size, offset),
            Operation::Write { fh, data, offset, .. } => self.handle_write(fh, data, offset),
            Operation::Flush { fh, .. } => self.handle_flush(fh),
            Operation::Fsync { fh, datasync, .. } => self.handle_fsync(fh, datasync),
            Operation::Release { fh, .. } => self.handle_release(fh),
            Operation::Getattr { fh, .. } => self.handle_getattr(&path, fh),
            Operation::Statfs { .. } => self.handle_statfs(&path),
            Operation::Readdir { .. } => self.handle_readdir(&path),
            Operation::Rename { new, flags, .. } => {
                self.handle_rename(&path, &RootPath::from_call(new), flags)
            }
            Operation::Link { target, .. } => {
                self.handle_link(&path, &RootPath::from_call(target))
            }
            Operation::Symlink { target, .. } => self.handle_symlink(&path, target.as_os_str()),
            Operation::Truncate { length, fh, .. } => self.handle_truncate(&path, length, fh),
            Operation::Unlink { .. } => self.handle_unlink(&path),
            Operation::Rmdir { .. } => self.handle_rmdir(&path),
            Operation::Mkdir { mode, .. } => self.handle_mkdir(&path, mode),
            Operation::Mknod { mode, rdev, .. } => self.handle_mknod(&path, mode, rdev),
            Operation::Chmod { mode, .. } => self.handle_chmod(&path, mode),
            Operation::Chown { uid, gid, .. } => self.handle_chown(&path, uid, gid),
            Operation::Utimens { atime, mtime, .. } => self.handle_utimens(&path, atime, mtime),
            Operation::Readlink { .. } => self.handle_readlink(&path),
            Operation::Getxattr { .. }
            | Operation::Listxattr { .. }
            | Operation::Setxattr { .. }
            | Operation::Removexattr { .. } => Err(BindError::Unsupported("extended attributes")),
        };

        if let Err(e) = &result {
            debug!("{} {} failed: {}", op.name(), path, e);
        }
        result
    }

    pub fn access(&self, path: impl AsRef<Path>, mode: i32) -> BindResult<()> {
        self.call(Operation::Access { path: path.as_ref(), mode })?
            .into_empty()
    }

    pub fn create(&self, path: impl AsRef<Path>, mode: u32, flags: i32) -> BindResult<FileHandle> {
        self.call(Operation::Create { path: path.as_ref(), mode, flags })?
            .into_handle()
    }

    pub fn open(&self, path: impl AsRef<Path>, flags: i32) -> BindResult<FileHandle> {
        self.call(Operation::Open { path: path.as_ref(), flags })?
            .into_handle()
    }

    pub fn read(
        &self,
        path: impl AsRef<Path>,
        fh: FileHandle,
        size: u32,
        offset: u64,
    ) -> BindResult<Vec<u8>> {
        self.call(Operation::Read { path: path.as_ref(), fh, size, offset })?
            .into_data()
    }

    pub fn write(
        &self,
        path: impl AsRef<Path>,
        fh: FileHandle,
        data: &[u8],
        offset: u64,
    ) -> BindResult<usize> {
        self.call(Operation::Write { path: path.as_ref(), fh, data, offset })?
            .into_written()
    }

    pub fn flush(&self, path: impl AsRef<Path>, fh: FileHandle) -> BindResult<()> {
        self.call(Operation::Flush { path: path.as_ref(), fh })?
            .into_empty()
    }

    pub fn fsync(&self, path: impl AsRef<Path>, fh: FileHandle, datasync: bool) -> BindResult<()> {
        self.call(Operation::Fsync { path: path.as_ref(), fh, datasync })?
            .into_empty()
    }

    pub fn release(&self, path: impl AsRef<Path>, fh: FileHandle) -> BindResult<()> {
        self.call(Operation::Release { path: path.as_ref(), fh })?
            .into_empty()
    }

    pub fn getattr(&self, path: impl AsRef<Path>) -> BindResult<Attributes> {
        self.call(Operation::Getattr { path: path.as_ref(), fh: None })?
            .into_attr()
    }

    /// Attributes of an open file, answered from its handle.
    pub fn fgetattr(&self, path: impl AsRef<Path>, fh: FileHandle) -> BindResult<Attributes> {
        self.call(Operation::Getattr { path: path.as_ref(), fh: Some(fh) })?
            .into_attr()
    }

    pub fn statfs(&self, path: impl AsRef<Path>) -> BindResult<FsStats> {
        self.call(Operation::Statfs { path: path.as_ref() })?
            .into_statfs()
    }

    pub fn readdir(&self, path: impl AsRef<Path>) -> BindResult<Vec<DirEntry>> {
        self.call(Operation::Readdir { path: path.as_ref() })?
            .into_entries()
    }

    pub fn rename(&self, old: impl AsRef<Path>, new: impl AsRef<Path>, flags: u32) -> BindResult<()> {
        self.call(Operation::Rename { old: old.as_ref(), new: new.as_ref(), flags })?
            .into_empty()
    }

    /// Hard link: `link` is created and refers to the existing `target`.
    pub fn link(&self, link: impl AsRef<Path>, target: impl AsRef<Path>) -> BindResult<()> {
        self.call(Operation::Link { link: link.as_ref(), target: target.as_ref() })?
            .into_empty()
    }

    /// Symbolic link: `link` is created with content `target`.
    pub fn symlink(&self, link: impl AsRef<Path>, target: impl AsRef<Path>) -> BindResult<()> {
        self.call(Operation::Symlink { link: link.as_ref(), target: target.as_ref() })?
            .into_empty()
    }

    pub fn truncate(
        &self,
        path: impl AsRef<Path>,
        length: u64,
        fh: Option<FileHandle>,
    ) -> BindResult<()> {
        self.call(Operation::Truncate { path: path.as_ref(), length, fh })?
            .into_empty()
    }

    pub fn unlink(&self, path: impl AsRef<Path>) -> BindResult<()> {
        self.call(Operation::Unlink { path: path.as_ref() })?
            .into_empty()
    }

    pub fn rmdir(&self, path: impl AsRef<Path>) -> BindResult<()> {
        self.call(Operation::Rmdir { path: path.as_ref() })?
            .into_empty()
    }

    pub fn mkdir(&self, path: impl AsRef<Path>, mode: u32) -> BindResult<()> {
        self.call(Operation::Mkdir { path: path.as_ref(), mode })?
            .into_empty()
    }

    pub fn mknod(&self, path: impl AsRef<Path>, mode: u32, rdev: u64) -> BindResult<()> {
        self.call(Operation::Mknod { path: path.as_ref(), mode, rdev })?
            .into_empty()
    }

    pub fn chmod(&self, path: impl AsRef<Path>, mode: u32) -> BindResult<()> {
        self.call(Operation::Chmod { path: path.as_ref(), mode })?
            .into_empty()
    }

    pub fn chown(&self, path: impl AsRef<Path>, uid: Option<u32>, gid: Option<u32>) -> BindResult<()> {
        self.call(Operation::Chown { path: path.as_ref(), uid, gid })?
            .into_empty()
    }

    pub fn utimens(&self, path: impl AsRef<Path>, atime: SetTime, mtime: SetTime) -> BindResult<()> {
        self.call(Operation::Utimens { path: path.as_ref(), atime, mtime })?
            .into_empty()
    }

    pub fn readlink(&self, path: impl AsRef<Path>) -> BindResult<OsString> {
        self.call(Operation::Readlink { path: path.as_ref() })?
            .into_link()
    }

    pub fn getxattr(&self, path: impl AsRef<Path>, name: &OsStr) -> BindResult<Vec<u8>> {
        self.call(Operation::Getxattr { path: path.as_ref(), name })?
            .into_data()
    }

    pub fn listxattr(&self, path: impl AsRef<Path>) -> BindResult<Vec<u8>> {
        self.call(Operation::Listxattr { path: path.as_ref() })?
            .into_data()
    }

    pub fn setxattr(&self, path: impl AsRef<Path>, name: &OsStr, value: &[u8]) -> BindResult<()> {
        self.call(Operation::Setxattr { path: path.as_ref(), name, value })?
            .into_empty()
    }

    pub fn removexattr(&self, path: impl AsRef<Path>, name: &OsStr) -> BindResult<()> {
        self.call(Operation::Removexattr { path: path.as_ref(), name })?
            .into_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, BindFs) {
        let dir = TempDir::new().unwrap();
        let fs = BindFs::bind(dir.path()).unwrap();
        (dir, fs)
    }

    #[test]
    fn test_call_rewrites_every_path() {
        let (dir, fs) = setup();
        std::fs::write(dir.path().join("f"), b"abc").unwrap();

        let attr = fs
            .call(Operation::Getattr { path: Path::new("/../../f"), fh: None })
            .unwrap()
            .into_attr()
            .unwrap();
        assert_eq!(attr.size, 3);
    }

    #[test]
    fn test_root_is_addressable() {
        let (_dir, fs) = setup();
        let attr = fs.getattr("/").unwrap();
        assert_eq!(attr.kind(), FileKind::Directory);
        assert!(fs.statfs("/").unwrap().name_max > 0);
    }

    #[test]
    fn test_handle_verbs_survive_unlink() {
        let (_dir, fs) = setup();
        let fh = fs.create("/gone", 0o644, libc::O_RDWR).unwrap();
        fs.unlink("/gone").unwrap();

        fs.write("/gone", fh, b"still here", 0).unwrap();
        assert_eq!(fs.read("/gone", fh, 64, 0).unwrap(), b"still here");
        assert_eq!(fs.fgetattr("/gone", fh).unwrap().size, 10);
        assert_eq!(fs.getattr("/gone").unwrap_err().errno(), libc::ENOENT);
        fs.release("/gone", fh).unwrap();
    }

    #[test]
    fn test_rename_flags_rejected() {
        let (dir, fs) = setup();
        std::fs::write(dir.path().join("a"), b"").unwrap();
        let err = fs.rename("/a", "/b", 1).unwrap_err();
        assert_eq!(err.errno(), libc::EINVAL);
        assert!(dir.path().join("a").exists());
    }
}
