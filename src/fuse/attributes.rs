//! File attribute conversion for FUSE filesystem

use crate::fs::{Attributes, FileKind};
use fuser::{FileAttr, FileType};

/// Preferred I/O size reported to the kernel
const BLOCK_SIZE: u32 = 4096;

/// Attribute manager for the FUSE filesystem
pub struct AttributeManager;

impl AttributeManager {
    /// Convert the getattr projection to a FUSE FileAttr
    pub fn to_file_attr(attr: &Attributes, ino: u64) -> FileAttr {
        FileAttr {
            ino,
            size: attr.size,
            blocks: attr.size.div_ceil(512), // 512-byte blocks
            atime: attr.atime,
            mtime: attr.mtime,
            ctime: attr.ctime,
            crtime: attr.ctime,
            kind: Self::file_type(attr.kind()),
            perm: attr.perm(),
            nlink: attr.nlink.min(u32::MAX as u64) as u32,
            uid: attr.uid,
            gid: attr.gid,
            rdev: 0,
            flags: 0,
            blksize: BLOCK_SIZE,
        }
    }

    pub fn file_type(kind: FileKind) -> FileType {
        match kind {
            FileKind::Directory => FileType::Directory,
            FileKind::RegularFile => FileType::RegularFile,
            FileKind::Symlink => FileType::Symlink,
            FileKind::NamedPipe => FileType::NamedPipe,
            FileKind::CharDevice => FileType::CharDevice,
            FileKind::BlockDevice => FileType::BlockDevice,
            FileKind::Socket => FileType::Socket,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn attributes(mode: u32, size: u64) -> Attributes {
        let t = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        Attributes {
            atime: t,
            ctime: t,
            gid: 100,
            mode,
            mtime: t,
            nlink: 1,
            size,
            uid: 1000,
        }
    }

    #[test]
    fn test_regular_file_attr() {
        let attr = AttributeManager::to_file_attr(&attributes(libc::S_IFREG | 0o640, 1025), 7);
        assert_eq!(attr.ino, 7);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.perm, 0o640);
        assert_eq!(attr.size, 1025);
        assert_eq!(attr.blocks, 3);
        assert_eq!((attr.uid, attr.gid), (1000, 100));
    }

    #[test]
    fn test_directory_attr_keeps_sticky_bit() {
        let attr = AttributeManager::to_file_attr(&attributes(libc::S_IFDIR | 0o1777, 0), 1);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.perm, 0o1777);
        assert_eq!(attr.blocks, 0);
    }
}
