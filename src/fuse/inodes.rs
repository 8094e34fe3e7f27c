//! Inode bookkeeping for the FUSE adapter.
//!
//! The kernel talks in inode numbers, the core in mount paths. Entries are
//! created on lookup-like replies and dropped when the kernel forgets them.

use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const ROOT_INO: u64 = 1;

#[derive(Debug)]
struct InodeEntry {
    path: PathBuf,
    lookups: u64,
}

#[derive(Debug)]
struct Inner {
    by_ino: HashMap<u64, InodeEntry>,
    by_path: HashMap<PathBuf, u64>,
    next_inode: u64,
}

#[derive(Debug)]
pub struct InodeTable {
    inner: Mutex<Inner>,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    pub fn new() -> Self {
        let root = PathBuf::from("/");
        let mut by_ino = HashMap::new();
        by_ino.insert(
            ROOT_INO,
            InodeEntry {
                path: root.clone(),
                lookups: 1,
            },
        );
        let mut by_path = HashMap::new();
        by_path.insert(root, ROOT_INO);

        Self {
            inner: Mutex::new(Inner {
                by_ino,
                by_path,
                next_inode: 2, // 1 is reserved for root
            }),
        }
    }

    pub fn path(&self, ino: u64) -> Option<PathBuf> {
        self.inner.lock().by_ino.get(&ino).map(|e| e.path.clone())
    }

    pub fn ino_of(&self, path: &Path) -> Option<u64> {
        self.inner.lock().by_path.get(path).copied()
    }

    /// Register one kernel reference to `path` and return its inode.
    pub fn lookup(&self, path: PathBuf) -> u64 {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if let Some(&ino) = inner.by_path.get(&path) {
            if let Some(entry) = inner.by_ino.get_mut(&ino) {
                entry.lookups += 1;
            }
            return ino;
        }

        let ino = inner.next_inode;
        inner.next_inode += 1;
        inner.by_path.insert(path.clone(), ino);
        inner.by_ino.insert(ino, InodeEntry { path, lookups: 1 });
        ino
    }

    /// Drop `nlookup` kernel references; the inode goes away at zero.
    pub fn forget(&self, ino: u64, nlookup: u64) {
        if ino == ROOT_INO {
            return;
        }
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(entry) = inner.by_ino.get_mut(&ino) else {
            return;
        };
        entry.lookups = entry.lookups.saturating_sub(nlookup);
        if entry.lookups > 0 {
            return;
        }

        if let Some(entry) = inner.by_ino.remove(&ino) {
            if inner.by_path.get(&entry.path) == Some(&ino) {
                inner.by_path.remove(&entry.path);
            }
            debug!("Forgot inode {} ({})", ino, entry.path.display());
        }
    }

    /// The name no longer refers to this inode (unlink/rmdir).
    pub fn detach(&self, path: &Path) {
        self.inner.lock().by_path.remove(path);
    }

    /// Move `old` and everything below it to `new`.
    pub fn rename(&self, old: &Path, new: &Path) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.by_path.remove(new);

        let moved: Vec<(u64, PathBuf)> = inner
            .by_ino
            .iter()
            .filter_map(|(&ino, entry)| {
                entry
                    .path
                    .strip_prefix(old)
                    .ok()
                    .map(|rest| (ino, rest.to_path_buf()))
            })
            .collect();

        for (ino, rest) in moved {
            let new_path = if rest.as_os_str().is_empty() {
                new.to_path_buf()
            } else {
                new.join(rest)
            };
            if let Some(entry) = inner.by_ino.get_mut(&ino) {
                let old_path = std::mem::replace(&mut entry.path, new_path.clone());
                if inner.by_path.get(&old_path) == Some(&ino) {
                    inner.by_path.remove(&old_path);
                }
                inner.by_path.insert(new_path, ino);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_ino.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_is_preallocated() {
        let table = InodeTable::new();
        assert_eq!(table.path(ROOT_INO), Some(PathBuf::from("/")));
        assert_eq!(table.ino_of(Path::new("/")), Some(ROOT_INO));
        table.forget(ROOT_INO, 100);
        assert_eq!(table.path(ROOT_INO), Some(PathBuf::from("/")));
    }

    #[test]
    fn test_lookup_reuses_inode_until_forgotten() {
        let table = InodeTable::new();
        let a = table.lookup(PathBuf::from("/a"));
        assert_eq!(table.lookup(PathBuf::from("/a")), a);

        table.forget(a, 1);
        assert_eq!(table.path(a), Some(PathBuf::from("/a")));
        table.forget(a, 1);
        assert_eq!(table.path(a), None);
        assert_eq!(table.ino_of(Path::new("/a")), None);
    }

    #[test]
    fn test_rename_moves_descendants() {
        let table = InodeTable::new();
        let dir = table.lookup(PathBuf::from("/dir"));
        let file = table.lookup(PathBuf::from("/dir/sub/file"));
        let other = table.lookup(PathBuf::from("/dirt"));

        table.rename(Path::new("/dir"), Path::new("/moved"));

        assert_eq!(table.path(dir), Some(PathBuf::from("/moved")));
        assert_eq!(table.path(file), Some(PathBuf::from("/moved/sub/file")));
        assert_eq!(table.path(other), Some(PathBuf::from("/dirt")));
        assert_eq!(table.ino_of(Path::new("/dir")), None);
        assert_eq!(table.ino_of(Path::new("/moved/sub/file")), Some(file));
    }

    #[test]
    fn test_detached_name_gets_fresh_inode() {
        let table = InodeTable::new();
        let first = table.lookup(PathBuf::from("/f"));
        table.detach(Path::new("/f"));
        let second = table.lookup(PathBuf::from("/f"));
        assert_ne!(first, second);
        assert_eq!(table.path(first), Some(PathBuf::from("/f")));
    }
}
