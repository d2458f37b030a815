//! Resolution strategies and the capability-based choice between them.
//!
//! Two backends implement the same containment contract: the kernel
//! fast path ([`openat2`]) and the userspace component walk ([`walk`]).
//! Which one a [`Root`](crate::Root) uses is decided by a single capability
//! probe the first time a root is opened, not by conditionals scattered
//! through the lookup code.

mod openat2;
mod walk;

use std::os::fd::{BorrowedFd, OwnedFd};
use std::path::Path;

use saferoot_common::error::{ErrorKind, Result, SaferootError};

/// The resolution backend selected for a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Atomic in-kernel lookup with `openat2(RESOLVE_IN_ROOT)`.
    KernelOpenat2,
    /// Userspace component walk with procfs re-verification.
    ComponentWalk,
}

impl Strategy {
    /// Probes the running kernel and returns the preferred strategy.
    ///
    /// The probe runs once per process; subsequent calls are free.
    #[must_use]
    pub fn detect() -> Self {
        if openat2::supported() {
            Self::KernelOpenat2
        } else {
            Self::ComponentWalk
        }
    }

    /// Resolves `path` inside `root` with this strategy, returning a bare
    /// `O_PATH` descriptor for the resolved object.
    pub(crate) fn resolve(
        self,
        root: BorrowedFd<'_>,
        path: &Path,
        no_follow_trailing: bool,
    ) -> Result<OwnedFd> {
        if path.as_os_str().is_empty() {
            return Err(SaferootError::InvalidArgument {
                message: "path is empty".into(),
            });
        }

        match self {
            Self::KernelOpenat2 => {
                match openat2::resolve(root, path, no_follow_trailing) {
                    // The probe said openat2 works, but this call was
                    // rejected (seccomp installed since, unknown flag on an
                    // unusual kernel). The walk gives the same guarantees.
                    Err(err) if err.kind() == ErrorKind::Unsupported => {
                        tracing::debug!(
                            path = %path.display(),
                            "kernel fast path unavailable, falling back to component walk"
                        );
                        walk::resolve(root, path, no_follow_trailing)
                    }
                    other => other,
                }
            }
            Self::ComponentWalk => walk::resolve(root, path, no_follow_trailing),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    use std::fs;
    use std::os::fd::AsFd;

    #[test]
    fn empty_path_is_invalid_argument() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = fs::File::open(dir.path()).expect("open root");

        for strategy in [Strategy::KernelOpenat2, Strategy::ComponentWalk] {
            let err = strategy
                .resolve(root.as_fd(), Path::new(""), false)
                .expect_err("empty path must fail");
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn both_strategies_agree_on_identity() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("d")).expect("mkdir");
        fs::write(dir.path().join("d/f"), b"x").expect("write");
        let root = fs::File::open(dir.path()).expect("open root");

        let walk_fd = Strategy::ComponentWalk
            .resolve(root.as_fd(), Path::new("d/../d/f"), false)
            .expect("walk resolve");
        let walk_st = crate::syscalls::fstat(walk_fd.as_fd()).expect("fstat");

        // KernelOpenat2 silently falls back on kernels without openat2, so
        // this holds everywhere.
        let fast_fd = Strategy::KernelOpenat2
            .resolve(root.as_fd(), Path::new("d/../d/f"), false)
            .expect("fast resolve");
        let fast_st = crate::syscalls::fstat(fast_fd.as_fd()).expect("fstat");

        assert_eq!(
            (walk_st.st_dev, walk_st.st_ino),
            (fast_st.st_dev, fast_st.st_ino)
        );
    }
}
