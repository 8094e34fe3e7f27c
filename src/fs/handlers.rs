//! Per-verb handlers. Each one receives an already rewritten [`RootPath`]
//! and reissues the call against the host relative to the bound root.

use crate::error::{BindError, BindResult};
use crate::fs::BindFs;
use crate::fs::attributes::{Attributes, DirEntry, FileKind, FsStats};
use crate::fs::file_handles::FileHandle;
use crate::fs::operation::{Reply, SetTime};
use crate::fs::root::{RootPath, cstring};
use rustix::fs::{
    Access, AtFlags, Dir, FileType, Gid, Mode, OFlags, Timespec, Timestamps, UTIME_NOW,
    UTIME_OMIT, Uid,
};
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::os::fd::AsRawFd;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::time::UNIX_EPOCH;

impl BindFs {
    pub(super) fn handle_access(&self, path: &RootPath, mode: i32) -> BindResult<Reply> {
        let loc = self.root().locate(path)?;
        let access = Access::from_bits_retain(mode as u32);
        rustix::fs::accessat(loc.dir(), loc.name(), access, AtFlags::SYMLINK_NOFOLLOW)
            .map_err(|e| BindError::PermissionDenied(format!("{}: {}", path, e)))?;
        Ok(Reply::Empty)
    }

    pub(super) fn handle_create(&self, path: &RootPath, mode: u32, flags: i32) -> BindResult<Reply> {
        let flags = OFlags::from_bits_retain(flags as u32);
        let access = if flags & OFlags::ACCMODE == OFlags::RDWR {
            OFlags::RDWR
        } else {
            OFlags::WRONLY
        };
        let open_flags = access | OFlags::CREATE | OFlags::TRUNC | (flags & OFlags::EXCL);

        let loc = self.root().locate(path)?;
        let file = File::from(loc.open(open_flags, Mode::from_raw_mode(mode as _))?);
        Ok(Reply::Handle(self.file_handles().insert(file)))
    }

    pub(super) fn handle_open(&self, path: &RootPath, flags: i32) -> BindResult<Reply> {
        let loc = self.root().locate(path)?;
        let flags = OFlags::from_bits_retain(flags as u32);
        let file = File::from(loc.open(flags, Mode::empty())?);
        Ok(Reply::Handle(self.file_handles().insert(file)))
    }

    pub(super) fn handle_read(&self, fh: FileHandle, size: u32, offset: u64) -> BindResult<Reply> {
        self.file_handles()
            .read_from_handle(fh, offset, size)
            .map(Reply::Data)
    }

    pub(super) fn handle_write(&self, fh: FileHandle, data: &[u8], offset: u64) -> BindResult<Reply> {
        self.file_handles()
            .write_to_handle(fh, offset, data)
            .map(Reply::Written)
    }

    pub(super) fn handle_flush(&self, fh: FileHandle) -> BindResult<Reply> {
        self.file_handles().get(fh)?.sync_all()?;
        Ok(Reply::Empty)
    }

    pub(super) fn handle_fsync(&self, fh: FileHandle, datasync: bool) -> BindResult<Reply> {
        let file = self.file_handles().get(fh)?;
        if datasync {
            file.sync_data()?;
        } else {
            file.sync_all()?;
        }
        Ok(Reply::Empty)
    }

    pub(super) fn handle_release(&self, fh: FileHandle) -> BindResult<Reply> {
        self.file_handles().close_file_handle(fh)?;
        Ok(Reply::Empty)
    }

    /// Stat through the open handle when one is given, so an unlinked but
    /// still open file keeps answering.
    pub(super) fn handle_getattr(&self, path: &RootPath, fh: Option<FileHandle>) -> BindResult<Reply> {
        let st = match fh {
            Some(fh) => rustix::fs::fstat(&*self.file_handles().get(fh)?)?,
            None => {
                let loc = self.root().locate(path)?;
                rustix::fs::statat(loc.dir(), loc.name(), AtFlags::SYMLINK_NOFOLLOW)?
            }
        };
        Ok(Reply::Attr(Attributes::from_stat(&st)))
    }

    pub(super) fn handle_statfs(&self, path: &RootPath) -> BindResult<Reply> {
        let loc = self.root().locate(path)?;
        let fd = loc.open(OFlags::PATH, Mode::empty())?;
        let st = rustix::fs::fstatvfs(&fd)?;
        Ok(Reply::Statfs(FsStats::from_statvfs(&st)))
    }

    pub(super) fn handle_readdir(&self, path: &RootPath) -> BindResult<Reply> {
        let loc = self.root().locate(path)?;
        let listing = loc.open(OFlags::RDONLY | OFlags::DIRECTORY, Mode::empty())?;

        let mut entries = vec![
            DirEntry::new(".", FileKind::Directory),
            DirEntry::new("..", FileKind::Directory),
        ];
        for entry in Dir::read_from(&listing)? {
            let entry = entry?;
            let raw = entry.file_name();
            if raw == c"." || raw == c".." {
                continue;
            }
            let kind = match FileKind::from_file_type(entry.file_type()) {
                Some(kind) => kind,
                None => {
                    let st = rustix::fs::statat(&listing, raw, AtFlags::SYMLINK_NOFOLLOW)?;
                    FileKind::from_mode(st.st_mode as u32)
                }
            };
            let name = OsStr::from_bytes(raw.to_bytes()).to_os_string();
            entries.push(DirEntry { name, kind });
        }
        Ok(Reply::Entries(entries))
    }

    pub(super) fn handle_rename(&self, old: &RootPath, new: &RootPath, flags: u32) -> BindResult<Reply> {
        if flags != 0 {
            return Err(BindError::InvalidArgument(format!("rename flags {:#x}", flags)));
        }
        let from = self.root().locate(old)?;
        let to = self.root().locate(new)?;
        rustix::fs::renameat(from.dir(), from.name(), to.dir(), to.name())?;
        Ok(Reply::Empty)
    }

    pub(super) fn handle_link(&self, link: &RootPath, target: &RootPath) -> BindResult<Reply> {
        let existing = self.root().locate(target)?;
        let new = self.root().locate(link)?;
        rustix::fs::linkat(
            existing.dir(),
            existing.name(),
            new.dir(),
            new.name(),
            AtFlags::empty(),
        )?;
        Ok(Reply::Empty)
    }

    pub(super) fn handle_symlink(&self, link: &RootPath, target: &OsStr) -> BindResult<Reply> {
        let content = cstring(target)?;
        let new = self.root().locate(link)?;
        rustix::fs::symlinkat(&content, new.dir(), new.name())?;
        Ok(Reply::Empty)
    }

    pub(super) fn handle_truncate(
        &self,
        path: &RootPath,
        length: u64,
        fh: Option<FileHandle>,
    ) -> BindResult<Reply> {
        match fh {
            Some(fh) => self.file_handles().get(fh)?.set_len(length)?,
            None => {
                let loc = self.root().locate(path)?;
                File::from(loc.open(OFlags::RDWR, Mode::empty())?).set_len(length)?;
            }
        }
        Ok(Reply::Empty)
    }

    pub(super) fn handle_unlink(&self, path: &RootPath) -> BindResult<Reply> {
        let loc = self.root().locate(path)?;
        rustix::fs::unlinkat(loc.dir(), loc.name(), AtFlags::empty())?;
        Ok(Reply::Empty)
    }

    pub(super) fn handle_rmdir(&self, path: &RootPath) -> BindResult<Reply> {
        let loc = self.root().locate(path)?;
        rustix::fs::unlinkat(loc.dir(), loc.name(), AtFlags::REMOVEDIR)?;
        Ok(Reply::Empty)
    }

    pub(super) fn handle_mkdir(&self, path: &RootPath, mode: u32) -> BindResult<Reply> {
        let loc = self.root().locate(path)?;
        rustix::fs::mkdirat(loc.dir(), loc.name(), Mode::from_raw_mode(mode as _))?;
        Ok(Reply::Empty)
    }

    pub(super) fn handle_mknod(&self, path: &RootPath, mode: u32, rdev: u64) -> BindResult<Reply> {
        let loc = self.root().locate(path)?;
        rustix::fs::mknodat(
            loc.dir(),
            loc.name(),
            FileType::from_raw_mode(mode as _),
            Mode::from_raw_mode(mode as _),
            rdev,
        )?;
        Ok(Reply::Empty)
    }

    pub(super) fn handle_chmod(&self, path: &RootPath, mode: u32) -> BindResult<Reply> {
        let loc = self.root().locate(path)?;
        // Pin the inode first; the name may be swapped for a symlink at any time
        let pinned = loc.open(OFlags::PATH, Mode::empty())?;
        let st = rustix::fs::fstat(&pinned)?;
        if FileKind::from_mode(st.st_mode as u32) == FileKind::Symlink {
            return Err(BindError::Unsupported("chmod on a symbolic link"));
        }
        // fchmod rejects O_PATH descriptors; the magic link reaches the same inode
        let by_fd = format!("/proc/self/fd/{}", pinned.as_raw_fd());
        rustix::fs::chmodat(
            rustix::fs::CWD,
            by_fd.as_str(),
            Mode::from_raw_mode(mode as _),
            AtFlags::empty(),
        )?;
        Ok(Reply::Empty)
    }

    pub(super) fn handle_chown(
        &self,
        path: &RootPath,
        uid: Option<u32>,
        gid: Option<u32>,
    ) -> BindResult<Reply> {
        let loc = self.root().locate(path)?;
        rustix::fs::chownat(
            loc.dir(),
            loc.name(),
            uid.map(Uid::from_raw),
            gid.map(Gid::from_raw),
            AtFlags::SYMLINK_NOFOLLOW,
        )?;
        Ok(Reply::Empty)
    }

    pub(super) fn handle_utimens(
        &self,
        path: &RootPath,
        atime: SetTime,
        mtime: SetTime,
    ) -> BindResult<Reply> {
        let loc = self.root().locate(path)?;
        let times = Timestamps {
            last_access: timespec(atime),
            last_modification: timespec(mtime),
        };
        rustix::fs::utimensat(loc.dir(), loc.name(), &times, AtFlags::SYMLINK_NOFOLLOW)?;
        Ok(Reply::Empty)
    }

    pub(super) fn handle_readlink(&self, path: &RootPath) -> BindResult<Reply> {
        let loc = self.root().locate(path)?;
        let target = rustix::fs::readlinkat(loc.dir(), loc.name(), Vec::new())?;
        Ok(Reply::Link(OsString::from_vec(target.into_bytes())))
    }
}

fn timespec(time: SetTime) -> Timespec {
    let (secs, nsecs) = match time {
        SetTime::Now => (0, UTIME_NOW as i64),
        SetTime::Omit => (0, UTIME_OMIT as i64),
        SetTime::At(at) => match at.duration_since(UNIX_EPOCH) {
            Ok(d) => (d.as_secs() as i64, d.subsec_nanos() as i64),
            Err(e) => {
                let d = e.duration();
                match d.subsec_nanos() {
                    0 => (-(d.as_secs() as i64), 0),
                    n => (-(d.as_secs() as i64) - 1, 1_000_000_000 - n as i64),
                }
            }
        },
    };
    Timespec {
        tv_sec: secs,
        tv_nsec: nsecs as _,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timespec_special_values() {
        assert_eq!(timespec(SetTime::Now).tv_nsec, UTIME_NOW);
        assert_eq!(timespec(SetTime::Omit).tv_nsec, UTIME_OMIT);
    }

    #[test]
    fn test_timespec_explicit_instants() {
        let ts = timespec(SetTime::At(UNIX_EPOCH + Duration::new(42, 7)));
        assert_eq!((ts.tv_sec as i64, ts.tv_nsec as i64), (42, 7));

        let ts = timespec(SetTime::At(UNIX_EPOCH - Duration::new(1, 500_000_000)));
        assert_eq!((ts.tv_sec as i64, ts.tv_nsec as i64), (-2, 500_000_000));
    }
}
