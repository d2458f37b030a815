//! The trusted anchor for all resolution: an owned directory descriptor.
//!
//! A [`Root`] is the only legal starting point for resolving untrusted
//! paths. Resolution is always anchored at the descriptor itself — never at
//! the path string the root was opened from — so renaming or replacing the
//! directory after open cannot redirect lookups.

use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::path::Path;

use saferoot_common::error::{Result, SaferootError};

use crate::handle::Handle;
use crate::resolver::Strategy;
use crate::utils::to_cstring;
use crate::syscalls;

/// An owned handle to a trusted base directory.
///
/// Safe to share by reference across threads: the descriptor is only ever
/// used as a read-only lookup anchor and is never reassigned.
#[derive(Debug)]
pub struct Root {
    fd: OwnedFd,
    strategy: Strategy,
}

impl Root {
    /// Opens `path` as a resolution root.
    ///
    /// The resolution strategy (kernel fast path or component walk) is
    /// probed and fixed here, once, rather than per lookup.
    ///
    /// # Errors
    ///
    /// Fails with `NotADirectory` if `path` is not a directory, and with
    /// `NotFound`/`PermissionDenied` mapped from the underlying OS error
    /// otherwise.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let cpath = to_cstring(path.as_os_str())?;
        let fd = syscalls::open(&cpath, libc::O_PATH | libc::O_DIRECTORY)
            .map_err(|errno| SaferootError::from_lookup_errno(errno as i32, path))?;

        let strategy = Strategy::detect();
        tracing::debug!(root = %path.display(), ?strategy, "opened resolution root");
        Ok(Self { fd, strategy })
    }

    /// Adopts an already open directory descriptor as a resolution root.
    ///
    /// # Errors
    ///
    /// Fails with `NotADirectory` if the descriptor does not refer to a
    /// directory.
    pub fn from_fd(fd: OwnedFd) -> Result<Self> {
        verify_directory(fd.as_fd())?;
        Ok(Self {
            fd,
            strategy: Strategy::detect(),
        })
    }

    /// Borrows this root as a [`RootRef`].
    #[must_use]
    pub fn as_ref(&self) -> RootRef<'_> {
        RootRef {
            fd: self.fd.as_fd(),
            strategy: self.strategy,
        }
    }

    /// Resolves an untrusted `path` inside this root, following a trailing
    /// symlink like the kernel would.
    ///
    /// Absolute paths and `..` components that would climb past the root
    /// are clamped at the root boundary, chroot-style. The returned
    /// [`Handle`] refers to the object found at resolution time and is
    /// guaranteed to be inside the root.
    ///
    /// # Errors
    ///
    /// See the crate-level error taxonomy; notably `RaceDetected` when
    /// concurrent mutation prevented a verified result.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<Handle> {
        self.as_ref().resolve(path)
    }

    /// Like [`resolve`](Self::resolve), but a trailing symlink is not
    /// followed: the returned handle refers to the symlink object itself.
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve).
    pub fn resolve_nofollow(&self, path: impl AsRef<Path>) -> Result<Handle> {
        self.as_ref().resolve_nofollow(path)
    }
}

impl AsFd for Root {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl From<Root> for OwnedFd {
    fn from(root: Root) -> Self {
        root.fd
    }
}

/// A borrowed view over a root descriptor owned elsewhere, typically by a
/// caller on the other side of the C ABI.
#[derive(Debug, Clone, Copy)]
pub struct RootRef<'fd> {
    fd: BorrowedFd<'fd>,
    strategy: Strategy,
}

impl<'fd> RootRef<'fd> {
    /// Wraps a borrowed directory descriptor, probing the resolution
    /// strategy (cached process-wide after the first call).
    #[must_use]
    pub fn from_fd(fd: BorrowedFd<'fd>) -> Self {
        Self {
            fd,
            strategy: Strategy::detect(),
        }
    }

    /// See [`Root::resolve`].
    ///
    /// # Errors
    ///
    /// See [`Root::resolve`].
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<Handle> {
        let fd = self.strategy.resolve(self.fd, path.as_ref(), false)?;
        Handle::from_fd(fd)
    }

    /// See [`Root::resolve_nofollow`].
    ///
    /// # Errors
    ///
    /// See [`Root::resolve`].
    pub fn resolve_nofollow(&self, path: impl AsRef<Path>) -> Result<Handle> {
        let fd = self.strategy.resolve(self.fd, path.as_ref(), true)?;
        Handle::from_fd(fd)
    }
}

impl AsFd for RootRef<'_> {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd
    }
}

/// Rejects descriptors that do not refer to a directory.
fn verify_directory(fd: BorrowedFd<'_>) -> Result<()> {
    let st = syscalls::fstat(fd).map_err(|errno| SaferootError::Os {
        operation: "fstat of root candidate",
        source: std::io::Error::from_raw_os_error(errno as i32),
    })?;
    if (st.st_mode & libc::S_IFMT) != libc::S_IFDIR {
        return Err(SaferootError::NotADirectory {
            path: "<fd>".into(),
        });
    }
    Ok(())
}
