//! Userspace emulation of root-contained resolution, for kernels without
//! `openat2(2)`.
//!
//! The walk consumes one component at a time starting from the root
//! descriptor, opening each with `O_PATH | O_NOFOLLOW` so that a component
//! is never followed implicitly. Symlink targets are spliced back into the
//! queue of remaining components, `..` is handled lexically against the
//! expected in-root position and clamped at the root boundary, and every
//! step that could have been influenced by a concurrent rename is
//! re-verified against the kernel's own view of the descriptor through
//! `/proc/self/fd`.
//!
//! Walking *down* a directory tree is race-free by construction (each
//! `openat` is anchored at a descriptor the attacker cannot retarget), so
//! the expensive re-check is only needed after `..` steps and once at the
//! end of the walk. A failed check means something moved underneath the
//! walk; the whole walk is restarted from the root a bounded number of
//! times before the race is reported to the caller.

use std::collections::VecDeque;
use std::ffi::{OsStr, OsString};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use saferoot_common::constants::{MAX_RACE_RETRIES, MAX_SYMLINK_TRAVERSALS};
use saferoot_common::error::{ErrorKind, Result, SaferootError};

use crate::syscalls;
use crate::utils::to_cstring;

/// Resolves `path` inside `root` by walking it component by component,
/// restarting on detected races up to [`MAX_RACE_RETRIES`] times.
pub fn resolve(root: BorrowedFd<'_>, path: &Path, no_follow_trailing: bool) -> Result<OwnedFd> {
    let mut last_race = None;
    for attempt in 0..MAX_RACE_RETRIES {
        match walk(root, path, no_follow_trailing) {
            Err(err) if err.kind() == ErrorKind::RaceDetected => {
                tracing::debug!(attempt, path = %path.display(), %err, "walk raced, restarting");
                last_race = Some(err);
            }
            other => return other,
        }
    }
    Err(last_race.unwrap_or_else(|| SaferootError::RaceDetected {
        message: format!(
            "lookup of {} kept racing after {MAX_RACE_RETRIES} attempts",
            path.display()
        ),
    }))
}

/// A single attempt at walking `path` from `root`.
fn walk(root: BorrowedFd<'_>, path: &Path, no_follow_trailing: bool) -> Result<OwnedFd> {
    // The root's kernel-reported location is captured up front; every
    // containment check below compares against this snapshot and also
    // verifies the root has not itself been moved.
    let root_location = crate::procfs::fd_kernel_path(root)?;

    let mut current = dup_root(root, path)?;
    // Position of `current` relative to the root, tracked lexically. This
    // only ever contains non-symlink components that were actually opened,
    // which is what makes lexical `..` handling sound.
    let mut expected = PathBuf::from("/");

    let mut remaining = raw_components(path);
    let mut symlink_traversals = 0usize;

    while let Some(part) = remaining.pop_front() {
        let part = match part.as_bytes() {
            // Empty components come from leading, doubled, or trailing
            // slashes. Opening "." keeps the errno behaviour right when the
            // current position is not a directory.
            b"" | b"." => OsString::from("."),
            b".." => {
                if expected.pop() {
                    part
                } else {
                    // Already at the root: ".." is clamped, not an error.
                    current = dup_root(root, path)?;
                    continue;
                }
            }
            bytes => {
                // Components are produced by splitting on '/', so this can
                // only trip if the queue was corrupted. Never walk it.
                if bytes.contains(&b'/') {
                    return Err(SaferootError::RaceDetected {
                        message: "path component contains a '/'".into(),
                    });
                }
                expected.push(&part);
                part
            }
        };

        let cpart = to_cstring(&part)?;
        let next = syscalls::openat(
            current.as_fd(),
            &cpart,
            libc::O_PATH | libc::O_NOFOLLOW,
        )
        .map_err(|errno| SaferootError::from_lookup_errno(errno as i32, path))?;

        // Walking down cannot escape, but ".." can race with a rename of
        // one of our ancestors. Verify the new position immediately.
        if part.as_bytes() == b".." {
            check_position(next.as_fd(), root, &root_location, &expected)?;
        }

        let st = syscalls::fstat(next.as_fd()).map_err(|errno| SaferootError::Os {
            operation: "fstat of next component",
            source: std::io::Error::from_raw_os_error(errno as i32),
        })?;
        if (st.st_mode & libc::S_IFMT) != libc::S_IFLNK {
            current = next;
            continue;
        }

        // Trailing symlink in no-follow mode: the link object itself is the
        // result.
        if no_follow_trailing && remaining.is_empty() {
            current = next;
            break;
        }

        symlink_traversals += 1;
        if symlink_traversals > MAX_SYMLINK_TRAVERSALS {
            return Err(SaferootError::TooManySymlinks {
                path: path.to_path_buf(),
            });
        }

        let target = syscalls::readlink_fd(next.as_fd())
            .map_err(|errno| SaferootError::from_lookup_errno(errno as i32, path))?;
        tracing::trace!(
            link = %part.to_string_lossy(),
            target = %target.display(),
            "expanding symlink"
        );

        // An absolute symlink on a magic-link filesystem is almost
        // certainly a kernel-generated jump target which userspace cannot
        // re-resolve faithfully. Refuse it, matching RESOLVE_NO_MAGICLINKS.
        if target.is_absolute() && on_magiclink_filesystem(next.as_fd())? {
            return Err(SaferootError::TooManySymlinks {
                path: path.to_path_buf(),
            });
        }

        // The link name itself is not part of the resolved position.
        let _ = expected.pop();

        // Splice the target's components in front of the remaining walk.
        let target_components = raw_components(&target);
        for component in target_components.into_iter().rev() {
            remaining.push_front(component);
        }

        // Absolute targets restart from the root boundary, exactly like a
        // chroot would treat them.
        if target.is_absolute() {
            current = dup_root(root, path)?;
            expected = PathBuf::from("/");
        }
    }

    // Final containment verification: the kernel must agree that where we
    // ended up is the expected location under the unmoved root.
    check_position(current.as_fd(), root, &root_location, &expected)?;
    Ok(current)
}

/// Compares the kernel-reported location of `fd` against the expected
/// position under the root, and re-checks that the root has not moved.
///
/// Any mismatch is a detected race: the walk's lexical bookkeeping can only
/// diverge from the kernel's view if a rename or mount happened mid-walk.
fn check_position(
    fd: BorrowedFd<'_>,
    root: BorrowedFd<'_>,
    root_location: &Path,
    expected: &Path,
) -> Result<()> {
    let actual = crate::procfs::fd_kernel_path(fd)?;

    let relative = expected.strip_prefix("/").unwrap_or(expected);
    let full = if relative.as_os_str().is_empty() {
        root_location.to_path_buf()
    } else {
        root_location.join(relative)
    };

    if actual != full {
        return Err(SaferootError::RaceDetected {
            message: format!(
                "descriptor is at {} but the walk expected {}",
                actual.display(),
                full.display()
            ),
        });
    }

    // A moved root invalidates every comparison made against its original
    // location, so it is re-read on each check.
    let root_now = crate::procfs::fd_kernel_path(root)?;
    if root_now != root_location {
        return Err(SaferootError::RaceDetected {
            message: "root directory moved during lookup".into(),
        });
    }
    Ok(())
}

/// Duplicates the root descriptor as a fresh walk position.
fn dup_root(root: BorrowedFd<'_>, path: &Path) -> Result<OwnedFd> {
    syscalls::dup_cloexec(root)
        .map_err(|errno| SaferootError::from_lookup_errno(errno as i32, path))
}

/// Whether the object behind `fd` lives on a filesystem that hosts
/// kernel-generated magic-links.
fn on_magiclink_filesystem(fd: BorrowedFd<'_>) -> Result<bool> {
    let fs = syscalls::fstatfs(fd).map_err(|errno| SaferootError::Os {
        operation: "fstatfs of symlink component",
        source: std::io::Error::from_raw_os_error(errno as i32),
    })?;
    Ok(fs.f_type as i64 == libc::PROC_SUPER_MAGIC as i64)
}

/// Splits a path into raw components on `/`, preserving empty and dot
/// components so the walk reproduces kernel errno behaviour for trailing
/// slashes on non-directories.
fn raw_components(path: &Path) -> VecDeque<OsString> {
    path.as_os_str()
        .as_bytes()
        .split(|b| *b == b'/')
        .map(|bytes| OsStr::from_bytes(bytes).to_os_string())
        .collect()
}
