//! Attribute and statistics projections of host `stat`/`statvfs` results.

use rustix::fs::{FileType, Stat, StatVfs};
use std::ffi::OsString;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Kind of a filesystem object, from `st_mode` or a directory entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    RegularFile,
    Symlink,
    NamedPipe,
    CharDevice,
    BlockDevice,
    Socket,
}

impl FileKind {
    pub fn from_mode(mode: u32) -> Self {
        Self::from_file_type(FileType::from_raw_mode(mode as _)).unwrap_or(FileKind::RegularFile)
    }

    /// `None` for an unknown directory entry type; the caller has to stat instead.
    pub fn from_file_type(file_type: FileType) -> Option<Self> {
        match file_type {
            FileType::Directory => Some(FileKind::Directory),
            FileType::RegularFile => Some(FileKind::RegularFile),
            FileType::Symlink => Some(FileKind::Symlink),
            FileType::Fifo => Some(FileKind::NamedPipe),
            FileType::CharacterDevice => Some(FileKind::CharDevice),
            FileType::BlockDevice => Some(FileKind::BlockDevice),
            FileType::Socket => Some(FileKind::Socket),
            _ => None,
        }
    }
}

/// The getattr projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes {
    pub atime: SystemTime,
    pub ctime: SystemTime,
    pub gid: u32,
    pub mode: u32,
    pub mtime: SystemTime,
    pub nlink: u64,
    pub size: u64,
    pub uid: u32,
}

impl Attributes {
    pub fn from_stat(st: &Stat) -> Self {
        Self {
            atime: system_time(st.st_atime as i64, st.st_atime_nsec as i64),
            ctime: system_time(st.st_ctime as i64, st.st_ctime_nsec as i64),
            gid: st.st_gid as u32,
            mode: st.st_mode as u32,
            mtime: system_time(st.st_mtime as i64, st.st_mtime_nsec as i64),
            nlink: st.st_nlink as u64,
            size: st.st_size as u64,
            uid: st.st_uid as u32,
        }
    }

    pub fn kind(&self) -> FileKind {
        FileKind::from_mode(self.mode)
    }

    /// Permission bits including setuid/setgid/sticky.
    pub fn perm(&self) -> u16 {
        (self.mode & 0o7777) as u16
    }
}

/// The statfs projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub blocks_available: u64,
    pub blocks_free: u64,
    pub blocks: u64,
    pub block_size: u64,
    pub files_available: u64,
    pub files_free: u64,
    pub files: u64,
    pub flags: u64,
    pub fragment_size: u64,
    pub name_max: u64,
}

impl FsStats {
    pub fn from_statvfs(st: &StatVfs) -> Self {
        Self {
            blocks_available: st.f_bavail,
            blocks_free: st.f_bfree,
            blocks: st.f_blocks,
            block_size: st.f_bsize,
            files_available: st.f_favail,
            files_free: st.f_ffree,
            files: st.f_files,
            flags: st.f_flag.bits(),
            fragment_size: st.f_frsize,
            name_max: st.f_namemax,
        }
    }
}

/// One listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: OsString,
    pub kind: FileKind,
}

impl DirEntry {
    pub fn new<N: Into<OsString>>(name: N, kind: FileKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

fn system_time(secs: i64, nsecs: i64) -> SystemTime {
    let nsecs = nsecs.clamp(0, 999_999_999) as u32;
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nsecs)
    } else {
        UNIX_EPOCH - Duration::new(secs.unsigned_abs(), 0) + Duration::new(0, nsecs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_mode() {
        assert_eq!(FileKind::from_mode(libc::S_IFDIR | 0o755), FileKind::Directory);
        assert_eq!(FileKind::from_mode(libc::S_IFREG | 0o644), FileKind::RegularFile);
        assert_eq!(FileKind::from_mode(libc::S_IFLNK | 0o777), FileKind::Symlink);
        assert_eq!(FileKind::from_mode(libc::S_IFIFO | 0o600), FileKind::NamedPipe);
    }

    #[test]
    fn test_unknown_dirent_type() {
        assert_eq!(FileKind::from_file_type(FileType::Unknown), None);
        assert_eq!(FileKind::from_file_type(FileType::Directory), Some(FileKind::Directory));
    }

    #[test]
    fn test_system_time_handles_pre_epoch() {
        assert_eq!(system_time(0, 0), UNIX_EPOCH);
        assert_eq!(system_time(10, 5), UNIX_EPOCH + Duration::new(10, 5));
        assert_eq!(system_time(-10, 0), UNIX_EPOCH - Duration::from_secs(10));
    }
}
