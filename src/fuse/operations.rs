//! FUSE operation handlers
//!
//! Every kernel request is translated to a mount path and handed to the
//! path-based core. Verbs that move file data run on the blocking pool and
//! reply from there, so a slow transfer does not stall the session loop.

use crate::error::BindResult;
use crate::fs::{Attributes, FileHandle, SetTime};
use crate::fuse::attributes::AttributeManager;
use crate::fuse::filesystem::BindFuse;
use fuser::{
    FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use libc::c_int;
use log::{debug, info};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Reported for listed children the kernel has not looked up yet
const UNKNOWN_INO: u64 = u64::MAX;

fn set_time(time: Option<TimeOrNow>) -> SetTime {
    match time {
        Some(TimeOrNow::SpecificTime(t)) => SetTime::At(t),
        Some(TimeOrNow::Now) => SetTime::Now,
        None => SetTime::Omit,
    }
}

fn offset(offset: i64) -> Result<u64, c_int> {
    u64::try_from(offset).map_err(|_| libc::EINVAL)
}

impl BindFuse {
    /// Path used for handle verbs; only informational once the file is open.
    fn handle_path(&self, ino: u64) -> PathBuf {
        self.inodes.path(ino).unwrap_or_default()
    }

    fn offload<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.runtime.spawn_blocking(job);
    }

    fn reply_entry(&self, path: PathBuf, reply: ReplyEntry) {
        match self.entry_for(path) {
            Ok(attr) => reply.entry(&self.ttl, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }
}

impl Filesystem for BindFuse {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        info!("FUSE session started for {}", self.fs.root().source().display());
        Ok(())
    }

    fn destroy(&mut self) {
        info!(
            "FUSE session ended ({} handles still open)",
            self.fs.file_handles().open_count()
        );
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!("LOOKUP: parent={}, name={:?}", parent, name);
        match self.child_path(parent, name) {
            Ok(path) => self.reply_entry(path, reply),
            Err(errno) => reply.error(errno),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        self.inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, fh: Option<u64>, reply: ReplyAttr) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let result = match fh {
            Some(fh) => self.fs.fgetattr(&path, FileHandle::from_raw(fh)),
            None => self.fs.getattr(&path),
        };
        match result {
            Ok(attr) => reply.attr(&self.ttl, &AttributeManager::to_file_attr(&attr, ino)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!("SETATTR: ino={}, mode={:?}, size={:?}", ino, mode, size);
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };

        let result = (|| -> BindResult<Attributes> {
            if let Some(mode) = mode {
                self.fs.chmod(&path, mode & 0o7777)?;
            }
            if uid.is_some() || gid.is_some() {
                self.fs.chown(&path, uid, gid)?;
            }
            if let Some(size) = size {
                self.fs.truncate(&path, size, fh.map(FileHandle::from_raw))?;
            }
            if atime.is_some() || mtime.is_some() {
                self.fs.utimens(&path, set_time(atime), set_time(mtime))?;
            }
            self.fs.getattr(&path)
        })();

        match result {
            Ok(attr) => reply.attr(&self.ttl, &AttributeManager::to_file_attr(&attr, ino)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.fs.readlink(&path) {
            Ok(target) => reply.data(target.as_encoded_bytes()),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        debug!("MKNOD: parent={}, name={:?}, mode={:o}", parent, name, mode);
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.fs.mknod(&path, mode, rdev as u64) {
            Ok(()) => self.reply_entry(path, reply),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        debug!("MKDIR: parent={}, name={:?}", parent, name);
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.fs.mkdir(&path, mode) {
            Ok(()) => self.reply_entry(path, reply),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("UNLINK: parent={}, name={:?}", parent, name);
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.fs.unlink(&path) {
            Ok(()) => {
                self.inodes.detach(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("RMDIR: parent={}, name={:?}", parent, name);
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.fs.rmdir(&path) {
            Ok(()) => {
                self.inodes.detach(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        debug!("SYMLINK: parent={}, name={:?} -> {:?}", parent, link_name, target);
        let path = match self.child_path(parent, link_name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.fs.symlink(&path, target) {
            Ok(()) => self.reply_entry(path, reply),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        debug!(
            "RENAME: parent={}, name={:?}, newparent={}, newname={:?}",
            parent, name, newparent, newname
        );
        let paths = self
            .child_path(parent, name)
            .and_then(|old| Ok((old, self.child_path(newparent, newname)?)));
        let (old, new) = match paths {
            Ok(paths) => paths,
            Err(errno) => return reply.error(errno),
        };
        match self.fs.rename(&old, &new, flags) {
            Ok(()) => {
                self.inodes.rename(&old, &new);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        debug!("LINK: ino={}, newparent={}, newname={:?}", ino, newparent, newname);
        let paths = self
            .path_of(ino)
            .and_then(|existing| Ok((existing, self.child_path(newparent, newname)?)));
        let (existing, path) = match paths {
            Ok(paths) => paths,
            Err(errno) => return reply.error(errno),
        };
        match self.fs.link(&path, &existing) {
            Ok(()) => self.reply_entry(path, reply),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!("OPEN: ino={}, flags={:#o}", ino, flags);
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.fs.open(&path, flags) {
            Ok(fh) => {
                debug!("OPENED: fh={}", fh.as_raw());
                reply.opened(fh.as_raw(), 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let offset = match self::offset(offset) {
            Ok(offset) => offset,
            Err(errno) => return reply.error(errno),
        };
        let fs = self.fs.clone();
        let path = self.handle_path(ino);
        self.offload(move || {
            match fs.read(&path, FileHandle::from_raw(fh), size, offset) {
                Ok(data) => reply.data(&data),
                Err(e) => reply.error(e.errno()),
            }
        });
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let offset = match self::offset(offset) {
            Ok(offset) => offset,
            Err(errno) => return reply.error(errno),
        };
        let fs = self.fs.clone();
        let path = self.handle_path(ino);
        let data = data.to_vec();
        self.offload(move || {
            match fs.write(&path, FileHandle::from_raw(fh), &data, offset) {
                Ok(written) => reply.written(written as u32),
                Err(e) => reply.error(e.errno()),
            }
        });
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        let fs = self.fs.clone();
        let path = self.handle_path(ino);
        self.offload(move || match fs.flush(&path, FileHandle::from_raw(fh)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        });
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        debug!("RELEASE: fh={}", fh);
        let fs = self.fs.clone();
        let path = self.handle_path(ino);
        self.offload(move || match fs.release(&path, FileHandle::from_raw(fh)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        });
    }

    fn fsync(&mut self, _req: &Request<'_>, ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        let fs = self.fs.clone();
        let path = self.handle_path(ino);
        self.offload(move || {
            match fs.fsync(&path, FileHandle::from_raw(fh), datasync) {
                Ok(()) => reply.ok(),
                Err(e) => reply.error(e.errno()),
            }
        });
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("READDIR: ino={}, offset={}", ino, offset);
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let entries = match self.fs.readdir(&path) {
            Ok(entries) => entries,
            Err(e) => return reply.error(e.errno()),
        };

        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, entry) in entries.into_iter().enumerate().skip(skip) {
            let entry_ino = match entry.name.to_str() {
                Some(".") => ino,
                Some("..") => self.parent_ino(&path),
                _ => self
                    .inodes
                    .ino_of(&path.join(&entry.name))
                    .unwrap_or(UNKNOWN_INO),
            };
            let kind: FileType = AttributeManager::file_type(entry.kind);
            if reply.add(entry_ino, (i + 1) as i64, kind, &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        let path = self.inodes.path(ino).unwrap_or_else(|| PathBuf::from("/"));
        match self.fs.statfs(&path) {
            Ok(st) => reply.statfs(
                st.blocks,
                st.blocks_free,
                st.blocks_available,
                st.files,
                st.files_free,
                st.block_size as u32,
                st.name_max as u32,
                st.fragment_size as u32,
            ),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn setxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.fs.setxattr(&path, name, value) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getxattr(&mut self, _req: &Request<'_>, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.fs.getxattr(&path, name) {
            Ok(value) => reply_xattr(value, size, reply),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn listxattr(&mut self, _req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.fs.listxattr(&path) {
            Ok(names) => reply_xattr(names, size, reply),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn removexattr(&mut self, _req: &Request<'_>, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.fs.removexattr(&path, name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.fs.access(&path, mask) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        debug!("CREATE: parent={}, name={:?}, mode={:o}", parent, name, mode);
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let fh = match self.fs.create(&path, mode, flags) {
            Ok(fh) => fh,
            Err(e) => return reply.error(e.errno()),
        };
        match self.fs.fgetattr(&path, fh) {
            Ok(attr) => {
                let attr = self.register(path, &attr);
                reply.created(&self.ttl, &attr, 0, fh.as_raw(), 0);
            }
            Err(e) => {
                // The kernel never sees this handle
                self.discard_handle(&path, fh);
                reply.error(e.errno());
            }
        }
    }
}

fn reply_xattr(value: Vec<u8>, size: u32, reply: ReplyXattr) {
    if size == 0 {
        reply.size(value.len() as u32);
    } else if value.len() > size as usize {
        reply.error(libc::ERANGE);
    } else {
        reply.data(&value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_set_time_from_kernel() {
        let at = UNIX_EPOCH + Duration::from_secs(5);
        assert_eq!(set_time(Some(TimeOrNow::SpecificTime(at))), SetTime::At(at));
        assert_eq!(set_time(Some(TimeOrNow::Now)), SetTime::Now);
        assert_eq!(set_time(None), SetTime::Omit);
    }

    #[test]
    fn test_negative_offset_rejected() {
        assert_eq!(offset(-1), Err(libc::EINVAL));
        assert_eq!(offset(4096), Ok(4096));
    }
}
