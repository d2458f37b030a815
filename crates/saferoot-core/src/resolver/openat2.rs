//! Kernel fast-path resolution through `openat2(2)`.
//!
//! `RESOLVE_IN_ROOT` gives exactly the containment semantics the resolver
//! promises: absolute paths and `..` are clamped at the root, symlinks are
//! expanded inside the root, and the whole lookup is atomic with respect to
//! concurrent renames. When the kernel detects a rename race it fails the
//! call with `EAGAIN`, which is retried here up to a small bound.

use std::os::fd::{BorrowedFd, OwnedFd};
use std::path::Path;
use std::sync::OnceLock;

use nix::errno::Errno;
use saferoot_common::constants::MAX_KERNEL_RETRIES;
use saferoot_common::error::{Result, SaferootError};

use crate::syscalls::{self, OpenHow};
use crate::utils::to_cstring;

/// Resolve flags enforced on every fast-path lookup.
///
/// `RESOLVE_NO_MAGICLINKS` is included because a magic-link inside the root
/// can point anywhere in the filesystem, which would defeat containment.
const RESOLVE_FLAGS: u64 = libc::RESOLVE_IN_ROOT | libc::RESOLVE_NO_MAGICLINKS;

static KERNEL_SUPPORT: OnceLock<bool> = OnceLock::new();

/// Probes once per process whether the running kernel supports `openat2(2)`.
///
/// A seccomp filter returning `EPERM` is treated the same as an old kernel,
/// since the fallback resolver works in both situations.
pub fn supported() -> bool {
    *KERNEL_SUPPORT.get_or_init(|| {
        let how = OpenHow {
            flags: (libc::O_PATH | libc::O_CLOEXEC) as u64,
            ..Default::default()
        };
        let cwd = at_fdcwd();
        match syscalls::openat2(cwd, c".", &how) {
            Ok(_) => true,
            Err(Errno::ENOSYS | Errno::EPERM) => false,
            // The syscall exists; other failures are per-call conditions.
            Err(_) => true,
        }
    })
}

/// Resolves `path` inside `root` with a single atomic kernel lookup.
pub fn resolve(root: BorrowedFd<'_>, path: &Path, no_follow_trailing: bool) -> Result<OwnedFd> {
    let cpath = to_cstring(path.as_os_str())?;

    let mut oflags = libc::O_PATH | libc::O_CLOEXEC;
    if no_follow_trailing {
        oflags |= libc::O_NOFOLLOW;
    }
    let how = OpenHow {
        flags: oflags as u64,
        resolve: RESOLVE_FLAGS,
        ..Default::default()
    };

    for attempt in 0..MAX_KERNEL_RETRIES {
        match syscalls::openat2(root, &cpath, &how) {
            Ok(fd) => return Ok(fd),
            // The kernel detected a concurrent rename or mount change and
            // aborted the lookup; reissue it.
            Err(Errno::EAGAIN) => {
                tracing::debug!(attempt, path = %path.display(), "kernel lookup raced, retrying");
            }
            Err(errno) => return Err(map_errno(errno, path)),
        }
    }
    Err(SaferootError::RaceDetected {
        message: format!(
            "kernel lookup of {} kept racing after {MAX_KERNEL_RETRIES} attempts",
            path.display()
        ),
    })
}

/// Maps an `openat2(2)` errno into the error taxonomy.
fn map_errno(errno: Errno, path: &Path) -> SaferootError {
    match errno {
        // The kernel is too old or rejects our open_how layout; callers
        // demote to the component-walk resolver on this kind.
        Errno::ENOSYS | Errno::E2BIG => SaferootError::Unsupported {
            feature: "openat2 with RESOLVE_IN_ROOT",
        },
        Errno::EINVAL => SaferootError::Unsupported {
            feature: "openat2 resolve flags",
        },
        // EXDEV is how openat2 reports a blocked escape through a
        // magic-link or mount boundary.
        errno => SaferootError::from_lookup_errno(errno as i32, path),
    }
}

/// `AT_FDCWD` as a borrowed descriptor, only used as a lookup anchor for the
/// capability probe.
#[allow(unsafe_code)]
fn at_fdcwd() -> BorrowedFd<'static> {
    // SAFETY: AT_FDCWD is a reserved sentinel the kernel accepts anywhere a
    // directory descriptor is expected; it is never closed.
    unsafe { BorrowedFd::borrow_raw(libc::AT_FDCWD) }
}
