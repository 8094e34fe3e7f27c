//! File handle management for the bind filesystem

use crate::error::{BindError, BindResult};
use log::debug;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque handle returned by open/create, valid until release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(u64);

impl FileHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// Open files keyed by handle, plus the lock that makes seek+transfer atomic.
pub struct FileHandleManager {
    open_handles: RwLock<HashMap<u64, Arc<File>>>,
    next_handle_id: AtomicU64,
    io_lock: Mutex<()>,
}

impl Default for FileHandleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FileHandleManager {
    pub fn new() -> Self {
        Self {
            open_handles: RwLock::new(HashMap::new()),
            next_handle_id: AtomicU64::new(1),
            io_lock: Mutex::new(()),
        }
    }

    /// Take ownership of an open file and hand out a new handle for it.
    pub fn insert(&self, file: File) -> FileHandle {
        let id = self.next_handle_id.fetch_add(1, Ordering::Relaxed);
        self.open_handles.write().insert(id, Arc::new(file));
        debug!("📂 Created file handle {}", id);
        FileHandle(id)
    }

    pub fn get(&self, fh: FileHandle) -> BindResult<Arc<File>> {
        self.open_handles
            .read()
            .get(&fh.0)
            .cloned()
            .ok_or(BindError::BadHandle(fh.0))
    }

    /// Close a file handle. The file is closed once no transfer holds it.
    pub fn close_file_handle(&self, fh: FileHandle) -> BindResult<()> {
        match self.open_handles.write().remove(&fh.0) {
            Some(file) => {
                drop(file);
                debug!("📂 Closed file handle {}", fh.0);
                Ok(())
            }
            None => Err(BindError::BadHandle(fh.0)),
        }
    }

    /// Read up to `size` bytes at `offset`. Short only at end of file.
    pub fn read_from_handle(&self, fh: FileHandle, offset: u64, size: u32) -> BindResult<Vec<u8>> {
        let file = self.get(fh)?;
        let mut buffer = vec![0u8; size as usize];
        let mut filled = 0;

        let _guard = self.io_lock.lock();
        (&*file).seek(SeekFrom::Start(offset))?;
        while filled < buffer.len() {
            match (&*file).read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        buffer.truncate(filled);
        Ok(buffer)
    }

    /// Write all of `data` at `offset`.
    pub fn write_to_handle(&self, fh: FileHandle, offset: u64, data: &[u8]) -> BindResult<usize> {
        let file = self.get(fh)?;

        let _guard = self.io_lock.lock();
        (&*file).seek(SeekFrom::Start(offset))?;
        (&*file).write_all(data)?;
        Ok(data.len())
    }

    pub fn open_count(&self) -> usize {
        self.open_handles.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempfile;

    #[test]
    fn test_handles_are_unique() {
        let manager = FileHandleManager::new();
        let a = manager.insert(tempfile().unwrap());
        let b = manager.insert(tempfile().unwrap());
        assert_ne!(a, b);
        assert_eq!(manager.open_count(), 2);
    }

    #[test]
    fn test_released_handle_is_rejected() {
        let manager = FileHandleManager::new();
        let fh = manager.insert(tempfile().unwrap());
        manager.close_file_handle(fh).unwrap();

        assert!(matches!(manager.get(fh), Err(BindError::BadHandle(_))));
        assert!(matches!(
            manager.read_from_handle(fh, 0, 1),
            Err(BindError::BadHandle(_))
        ));
        assert!(matches!(manager.close_file_handle(fh), Err(BindError::BadHandle(_))));
    }

    #[test]
    fn test_read_past_end_is_short() {
        let manager = FileHandleManager::new();
        let fh = manager.insert(tempfile().unwrap());
        manager.write_to_handle(fh, 0, b"hello").unwrap();

        assert_eq!(manager.read_from_handle(fh, 3, 100).unwrap(), b"lo");
        assert!(manager.read_from_handle(fh, 10, 4).unwrap().is_empty());
    }

    #[test]
    fn test_write_at_offset_extends_with_hole() {
        let manager = FileHandleManager::new();
        let fh = manager.insert(tempfile().unwrap());
        manager.write_to_handle(fh, 4, b"xy").unwrap();

        assert_eq!(manager.read_from_handle(fh, 0, 6).unwrap(), b"\0\0\0\0xy");
    }
}
