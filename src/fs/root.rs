//! Root binding and path confinement.
//!
//! A [`BoundRoot`] owns an fd on the source directory. Transport paths are
//! rewritten lexically into a [`RootPath`] and only ever resolved relative to
//! that fd, one component at a time, never following symlinks on the way.

use crate::error::{BindError, BindResult};
use log::info;
use rustix::fs::{Mode, OFlags, openat};
use std::ffi::{CStr, CString, OsStr, OsString};
use std::fmt;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};

/// Flags for walking intermediate directories.
const WALK_FLAGS: OFlags = OFlags::PATH
    .union(OFlags::DIRECTORY)
    .union(OFlags::NOFOLLOW)
    .union(OFlags::CLOEXEC);

/// Convert a path component for the C side. Interior NULs are rejected.
pub(crate) fn cstring(name: &OsStr) -> BindResult<CString> {
    CString::new(name.as_bytes())
        .map_err(|_| BindError::InvalidArgument(format!("{:?} contains a NUL byte", name)))
}

/// Open reference to the source directory.
#[derive(Debug)]
pub struct BoundRoot {
    fd: OwnedFd,
    source: PathBuf,
}

impl BoundRoot {
    /// Open `source`, which must be an existing directory.
    pub fn bind<P: AsRef<Path>>(source: P) -> BindResult<Self> {
        let source = source.as_ref().to_path_buf();
        let fd = openat(
            rustix::fs::CWD,
            &source,
            OFlags::RDONLY | OFlags::DIRECTORY | OFlags::CLOEXEC,
            Mode::empty(),
        )
        .map_err(|e| BindError::Confinement {
            path: source.clone(),
            source: e.into(),
        })?;

        info!("Bound source directory {}", source.display());
        Ok(Self { fd, source })
    }

    /// Source path as given at bind time. Used for log output only.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Real path of `path`, for display.
    pub fn display_path(&self, path: &RootPath) -> PathBuf {
        path.components
            .iter()
            .fold(self.source.clone(), |acc, c| acc.join(c))
    }

    /// Resolve the parent directory of `path` beneath the root.
    ///
    /// Intermediate components are opened with `O_NOFOLLOW`, so a symlink in
    /// any non-final position fails instead of leading out of the root.
    pub(crate) fn locate(&self, path: &RootPath) -> BindResult<Location<'_>> {
        let Some((last, parents)) = path.components.split_last() else {
            return Ok(Location {
                root: self.fd.as_fd(),
                parent: None,
                name: c".".to_owned(),
            });
        };

        let mut parent: Option<OwnedFd> = None;
        for component in parents {
            let name = cstring(component)?;
            let next = match &parent {
                Some(dir) => openat(dir, &name, WALK_FLAGS, Mode::empty())?,
                None => openat(&self.fd, &name, WALK_FLAGS, Mode::empty())?,
            };
            parent = Some(next);
        }

        Ok(Location {
            root: self.fd.as_fd(),
            parent,
            name: cstring(last)?,
        })
    }
}

impl AsFd for BoundRoot {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

/// A resolved parent directory plus the final name inside it.
pub(crate) struct Location<'r> {
    root: BorrowedFd<'r>,
    parent: Option<OwnedFd>,
    name: CString,
}

impl Location<'_> {
    pub fn dir(&self) -> BorrowedFd<'_> {
        match &self.parent {
            Some(fd) => fd.as_fd(),
            None => self.root,
        }
    }

    pub fn name(&self) -> &CStr {
        &self.name
    }

    /// Open the final component itself. `O_NOFOLLOW` is always added.
    pub fn open(&self, flags: OFlags, mode: Mode) -> rustix::io::Result<OwnedFd> {
        openat(
            self.dir(),
            self.name(),
            flags | OFlags::NOFOLLOW | OFlags::CLOEXEC,
            mode,
        )
    }
}

/// A transport path rewritten relative to the bound root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RootPath {
    components: Vec<OsString>,
}

impl RootPath {
    /// Rewrite a mount-relative absolute path.
    ///
    /// `.` and empty components vanish, `..` pops and is clamped at the root.
    pub fn from_call<P: AsRef<Path>>(path: P) -> Self {
        let mut components = Vec::new();
        for component in path.as_ref().components() {
            match component {
                Component::Normal(name) => components.push(name.to_os_string()),
                Component::ParentDir => {
                    components.pop();
                }
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        Self { components }
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> impl Iterator<Item = &OsStr> {
        self.components.iter().map(|c| c.as_os_str())
    }
}

impl fmt::Display for RootPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".")?;
        for component in &self.components {
            write!(f, "/{}", component.to_string_lossy())?;
        }
        Ok(())
    }
}
