//! Location-only handles to resolved filesystem objects, and the reopen
//! protocol that upgrades them to I/O-capable files.
//!
//! A [`Handle`] wraps an `O_PATH` descriptor: the object has been *located*
//! under its root but cannot be read or written through the handle itself.
//! That distinction is enforced by the type system — the only way to do I/O
//! on a resolved object is [`Handle::reopen`], which re-derives a descriptor
//! from the handle's own identity and verifies it still refers to the same
//! device and inode.

use std::fmt;
use std::fs::File;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use nix::fcntl::OFlag;
use saferoot_common::error::{Result, SaferootError};

use crate::{procfs, syscalls};

/// Snapshot of a filesystem object's identity, taken at resolution time.
///
/// Paths can be invalidated by renames at any moment; the device and inode
/// pair is the only stable way to say "the same object".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    /// Device the object lives on.
    pub device: u64,
    /// Inode number on that device.
    pub inode: u64,
}

impl FileIdentity {
    /// Captures the identity of the object behind `fd`.
    pub fn from_fd(fd: BorrowedFd<'_>) -> Result<Self> {
        let st = syscalls::fstat(fd).map_err(|errno| SaferootError::Os {
            operation: "fstat for identity capture",
            source: std::io::Error::from_raw_os_error(errno as i32),
        })?;
        Ok(Self {
            device: st.st_dev,
            inode: st.st_ino,
        })
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev={} ino={}", self.device, self.inode)
    }
}

/// An owned, location-only reference to a filesystem object resolved inside
/// a [`Root`](crate::Root).
///
/// Produced only by resolution; consumed by [`reopen`](Self::reopen) or by
/// dropping. Once resolved, the object is identified by descriptor and
/// identity, never by its original path string.
#[derive(Debug)]
pub struct Handle {
    fd: OwnedFd,
    identity: FileIdentity,
}

impl Handle {
    /// Wraps a freshly resolved `O_PATH` descriptor, capturing its identity.
    pub(crate) fn from_fd(fd: OwnedFd) -> Result<Self> {
        let identity = FileIdentity::from_fd(fd.as_fd())?;
        Ok(Self { fd, identity })
    }

    /// Returns the identity captured when this handle was resolved.
    #[must_use]
    pub fn identity(&self) -> FileIdentity {
        self.identity
    }

    /// Upgrades this handle to an I/O-capable [`File`] opened with `flags`.
    ///
    /// The new descriptor is derived from the handle itself through its
    /// `/proc/self/fd` magic-link — not from any path — and its identity is
    /// verified against the snapshot taken at resolution time. A mismatch
    /// means procfs itself was tampered with and fails with
    /// [`RaceDetected`](saferoot_common::error::ErrorKind::RaceDetected)
    /// rather than handing back a different object.
    ///
    /// `O_NOFOLLOW` is stripped: the magic-link must be followed, and the
    /// target object is already pinned by the handle's descriptor.
    ///
    /// # Errors
    ///
    /// Fails if the open itself fails (e.g. write access to a read-only
    /// filesystem) or if the reopened identity does not match.
    pub fn reopen(&self, flags: OFlag) -> Result<File> {
        reopen_verified(self.fd.as_fd(), self.identity, flags)
    }

    /// Borrows this handle as a [`HandleRef`].
    #[must_use]
    pub fn as_ref(&self) -> HandleRef<'_> {
        HandleRef {
            fd: self.fd.as_fd(),
        }
    }
}

impl AsFd for Handle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl From<Handle> for OwnedFd {
    fn from(handle: Handle) -> Self {
        handle.fd
    }
}

/// A borrowed view over a handle descriptor owned elsewhere, typically by a
/// caller on the other side of the C ABI.
#[derive(Debug, Clone, Copy)]
pub struct HandleRef<'fd> {
    fd: BorrowedFd<'fd>,
}

impl<'fd> HandleRef<'fd> {
    /// Wraps a borrowed descriptor previously produced by resolution.
    #[must_use]
    pub fn from_fd(fd: BorrowedFd<'fd>) -> Self {
        Self { fd }
    }

    /// Same as [`Handle::reopen`], capturing the identity from the borrowed
    /// descriptor at call time.
    ///
    /// # Errors
    ///
    /// See [`Handle::reopen`].
    pub fn reopen(&self, flags: OFlag) -> Result<File> {
        let identity = FileIdentity::from_fd(self.fd)?;
        reopen_verified(self.fd, identity, flags)
    }
}

impl AsFd for HandleRef<'_> {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd
    }
}

/// Shared reopen implementation: magic-link open, then identity check.
fn reopen_verified(fd: BorrowedFd<'_>, identity: FileIdentity, flags: OFlag) -> Result<File> {
    let flags = (flags | OFlag::O_CLOEXEC) - OFlag::O_NOFOLLOW;
    let newfd = procfs::reopen_fd(fd, flags.bits())?;

    let reopened = FileIdentity::from_fd(newfd.as_fd())?;
    if reopened != identity {
        return Err(SaferootError::RaceDetected {
            message: format!(
                "reopened object ({reopened}) does not match resolved object ({identity})"
            ),
        });
    }
    Ok(File::from(newfd))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    use std::fs;
    use std::io::{Read, Seek, SeekFrom, Write};

    use crate::Root;

    #[test]
    fn reopen_read_sees_file_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("file"), b"hello").expect("write");

        let root = Root::open(dir.path()).expect("open root");
        let handle = root.resolve("file").expect("resolve");
        let mut file = handle.reopen(OFlag::O_RDONLY).expect("reopen");

        let mut contents = String::new();
        let _ = file.read_to_string(&mut contents).expect("read");
        assert_eq!(contents, "hello");
    }

    #[test]
    fn reopen_write_then_read_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("file"), b"").expect("create");

        let root = Root::open(dir.path()).expect("open root");
        let handle = root.resolve("file").expect("resolve");

        let mut writer = handle.reopen(OFlag::O_WRONLY).expect("reopen write");
        writer.write_all(b"payload").expect("write");
        drop(writer);

        let mut reader = handle.reopen(OFlag::O_RDONLY).expect("reopen read");
        let mut contents = Vec::new();
        let _ = reader.read_to_end(&mut contents).expect("read");
        assert_eq!(contents, b"payload");
    }

    #[test]
    fn reopen_identity_matches_handle_identity() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("file"), b"x").expect("write");

        let root = Root::open(dir.path()).expect("open root");
        let handle = root.resolve("file").expect("resolve");
        let file = handle.reopen(OFlag::O_RDONLY).expect("reopen");

        let reopened = FileIdentity::from_fd(file.as_fd()).expect("identity");
        assert_eq!(reopened, handle.identity());
    }

    #[test]
    fn reopen_survives_rename_of_original_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("file"), b"original").expect("write");

        let root = Root::open(dir.path()).expect("open root");
        let handle = root.resolve("file").expect("resolve");

        // The path now names a different object; the handle must keep
        // referring to the object it resolved.
        fs::rename(dir.path().join("file"), dir.path().join("moved")).expect("rename");
        fs::write(dir.path().join("file"), b"impostor").expect("write impostor");

        let mut file = handle.reopen(OFlag::O_RDONLY).expect("reopen");
        let mut contents = String::new();
        let _ = file.read_to_string(&mut contents).expect("read");
        assert_eq!(contents, "original");
    }

    #[test]
    fn nofollow_flag_is_stripped_on_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("file"), b"data").expect("write");

        let root = Root::open(dir.path()).expect("open root");
        let handle = root.resolve("file").expect("resolve");

        // Would fail with ELOOP if O_NOFOLLOW were passed to the magic-link
        // open.
        let mut file = handle
            .reopen(OFlag::O_RDONLY | OFlag::O_NOFOLLOW)
            .expect("reopen with O_NOFOLLOW");
        let mut contents = String::new();
        let _ = file.read_to_string(&mut contents).expect("read");
        assert_eq!(contents, "data");
    }

    #[test]
    fn handle_ref_reopen_matches_owned_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("file"), b"abc").expect("write");

        let root = Root::open(dir.path()).expect("open root");
        let handle = root.resolve("file").expect("resolve");

        let mut file = handle.as_ref().reopen(OFlag::O_RDONLY).expect("ref reopen");
        let mut contents = String::new();
        let _ = file.read_to_string(&mut contents).expect("read");
        assert_eq!(contents, "abc");

        let mut seekable = handle.reopen(OFlag::O_RDONLY).expect("owned reopen");
        let _ = seekable.seek(SeekFrom::Start(1)).expect("seek");
        let mut rest = String::new();
        let _ = seekable.read_to_string(&mut rest).expect("read rest");
        assert_eq!(rest, "bc");
    }
}
