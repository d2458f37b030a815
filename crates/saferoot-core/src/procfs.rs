//! Verified access to the `/proc/self/fd` magic-link directory.
//!
//! The component-walk resolver and the reopen protocol both depend on the
//! kernel's own view of what a descriptor refers to, read through the
//! self-referential `/proc/self/fd/<n>` magic-links. Trusting an unverified
//! `/proc` would let an attacker who controls the mount table shadow those
//! links, so the directory descriptor is opened once per process and its
//! filesystem type is checked against `PROC_SUPER_MAGIC` before use.

use std::ffi::CString;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::sync::OnceLock;

use saferoot_common::constants::PROC_SELF_FD;
use saferoot_common::error::{Result, SaferootError};

use crate::syscalls;

static PROC_FD_DIR: OnceLock<OwnedFd> = OnceLock::new();

/// Returns the process-wide verified `/proc/self/fd` directory descriptor.
fn proc_fd_dir() -> Result<BorrowedFd<'static>> {
    if let Some(fd) = PROC_FD_DIR.get() {
        return Ok(fd.as_fd());
    }

    let path = CString::new(PROC_SELF_FD).map_err(|_| SaferootError::InvalidArgument {
        message: "procfs path contains a NUL byte".into(),
    })?;
    let fd = syscalls::open(&path, libc::O_PATH | libc::O_DIRECTORY)
        .map_err(|errno| SaferootError::from_lookup_errno(errno as i32, PROC_SELF_FD))?;

    // Refuse to use a /proc that is not actually procfs. A bind mount
    // shadowing /proc would let an attacker feed us fake magic-links.
    let fs = syscalls::fstatfs(fd.as_fd()).map_err(|errno| SaferootError::Os {
        operation: "fstatfs of /proc/self/fd",
        source: std::io::Error::from_raw_os_error(errno as i32),
    })?;
    if fs.f_type as i64 != libc::PROC_SUPER_MAGIC as i64 {
        return Err(SaferootError::RaceDetected {
            message: "/proc/self/fd is not on procfs".into(),
        });
    }

    // Another thread may have won the race to initialise; its descriptor is
    // equivalent, so ours is simply dropped.
    Ok(PROC_FD_DIR.get_or_init(|| fd).as_fd())
}

/// Returns the kernel's view of the path behind `fd`, read through the
/// verified procfs handle.
///
/// The result is only usable for string comparison against an expected
/// location: the kernel reports `"/"` or a non-absolute marker when it
/// considers the descriptor unreachable, and appends `" (deleted)"` when the
/// object was unlinked. Both cases mean the walk can no longer be verified
/// and are surfaced as [`RaceDetected`](SaferootError::RaceDetected).
pub fn fd_kernel_path(fd: BorrowedFd<'_>) -> Result<PathBuf> {
    let name = CString::new(fd.as_raw_fd().to_string()).map_err(|_| {
        SaferootError::InvalidArgument {
            message: "fd number contains a NUL byte".into(),
        }
    })?;
    let path = syscalls::readlinkat(proc_fd_dir()?, &name).map_err(|errno| SaferootError::Os {
        operation: "readlink of /proc/self/fd entry",
        source: std::io::Error::from_raw_os_error(errno as i32),
    })?;

    let bytes = path.as_os_str().as_bytes();
    if !bytes.starts_with(b"/") {
        return Err(SaferootError::RaceDetected {
            message: format!("kernel reports non-filesystem path {}", path.display()),
        });
    }
    if bytes.ends_with(b" (deleted)") {
        return Err(SaferootError::RaceDetected {
            message: format!("kernel reports deleted path {}", path.display()),
        });
    }
    Ok(path)
}

/// Reopens the object behind `fd` with `flags` by opening its own
/// `/proc/self/fd/<n>` magic-link.
///
/// This derives the new descriptor from the descriptor's identity, never
/// from a path string, which is what makes the reopen protocol immune to
/// rename/replace races on the original path.
pub fn reopen_fd(fd: BorrowedFd<'_>, flags: libc::c_int) -> Result<OwnedFd> {
    let name = CString::new(fd.as_raw_fd().to_string()).map_err(|_| {
        SaferootError::InvalidArgument {
            message: "fd number contains a NUL byte".into(),
        }
    })?;
    syscalls::openat(proc_fd_dir()?, &name, flags).map_err(|errno| match errno as i32 {
        libc::ENOENT | libc::EBADF => SaferootError::InvalidArgument {
            message: "cannot reopen: descriptor is not open in this process".into(),
        },
        errno => SaferootError::Os {
            operation: "reopen through /proc/self/fd",
            source: std::io::Error::from_raw_os_error(errno),
        },
    })
}
