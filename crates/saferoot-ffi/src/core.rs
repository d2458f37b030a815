//! The `saferoot_*` extern functions.
//!
//! Return convention: non-negative values are file descriptors owned by the
//! caller (release with `close(2)`); negative values are keys for
//! [`saferoot_errorinfo`]. The convention is bit-exact — callers branch on
//! the sign alone.

use std::ffi::{c_char, c_int};
use std::os::fd::{IntoRawFd, OwnedFd};

use saferoot_common::error::Result;
use saferoot_core::{HandleRef, OFlag, Root, RootRef};

use crate::error::{self, saferoot_error_t};
use crate::util;

/// Folds a descriptor-producing result into the integer convention,
/// parking any error in the record table.
fn fd_return(result: Result<OwnedFd>) -> c_int {
    match result {
        Ok(fd) => fd.into_raw_fd(),
        Err(err) => error::store(&err),
    }
}

/// Opens `path` as a resolution root.
///
/// Returns an `O_PATH` directory descriptor owned by the caller, or a
/// negative error key.
///
/// # Safety
///
/// `path` must be NULL or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn saferoot_open_root(path: *const c_char) -> c_int {
    fd_return((|| {
        // SAFETY: the caller guarantees path validity.
        let path = unsafe { util::parse_path(path) }?;
        Root::open(path).map(OwnedFd::from)
    })())
}

/// Resolves `path` inside the root referred to by `root_fd`, following a
/// trailing symlink.
///
/// Returns an `O_PATH` handle descriptor owned by the caller, or a negative
/// error key. The handle grants no I/O; pass it to [`saferoot_reopen`].
///
/// # Safety
///
/// `root_fd`, when non-negative, must be an open directory descriptor
/// (typically from [`saferoot_open_root`]) that stays open for the duration
/// of the call; `path` must be NULL or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn saferoot_resolve(root_fd: c_int, path: *const c_char) -> c_int {
    // SAFETY: forwarded caller guarantees.
    unsafe { resolve_common(root_fd, path, false) }
}

/// Like [`saferoot_resolve`], but a trailing symlink is not followed: the
/// returned handle refers to the symlink object itself.
///
/// # Safety
///
/// See [`saferoot_resolve`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn saferoot_resolve_nofollow(root_fd: c_int, path: *const c_char) -> c_int {
    // SAFETY: forwarded caller guarantees.
    unsafe { resolve_common(root_fd, path, true) }
}

unsafe fn resolve_common(root_fd: c_int, path: *const c_char, no_follow: bool) -> c_int {
    fd_return((|| {
        // SAFETY: the caller guarantees both argument contracts.
        let root = unsafe { util::borrow_fd(root_fd) }?;
        // SAFETY: see above.
        let path = unsafe { util::parse_path(path) }?;

        let root = RootRef::from_fd(root);
        let handle = if no_follow {
            root.resolve_nofollow(path)?
        } else {
            root.resolve(path)?
        };
        Ok(OwnedFd::from(handle))
    })())
}

/// Upgrades a handle descriptor to an I/O-capable descriptor opened with
/// `flags` (`O_RDONLY`, `O_WRONLY`, `O_RDWR`, `O_APPEND`, ...).
///
/// The new descriptor is derived from the handle's identity, never from a
/// path, and the identity is re-verified after the open; a mismatch is
/// reported as a `RaceDetected` error rather than handing back a different
/// object.
///
/// # Safety
///
/// `handle_fd`, when non-negative, must be an open descriptor previously
/// returned by `saferoot_resolve`/`saferoot_resolve_nofollow` that stays
/// open for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn saferoot_reopen(handle_fd: c_int, flags: c_int) -> c_int {
    fd_return((|| {
        // SAFETY: the caller guarantees the descriptor contract.
        let fd = unsafe { util::borrow_fd(handle_fd) }?;
        let handle = HandleRef::from_fd(fd);
        let file = handle.reopen(OFlag::from_bits_retain(flags))?;
        Ok(OwnedFd::from(file))
    })())
}

/// Fetches the error record for a negative return value.
///
/// Returns NULL for unknown keys (never allocated, already freed, or
/// non-negative). The record is not consumed; it stays valid until
/// [`saferoot_errorinfo_free`] is called with the same key.
#[unsafe(no_mangle)]
pub extern "C" fn saferoot_errorinfo(errid: c_int) -> *const saferoot_error_t {
    error::lookup(errid)
}

/// Releases the error record for `errid`.
///
/// Unknown keys are ignored, so freeing twice is harmless. After this call
/// the key is invalid and pointers previously obtained from
/// [`saferoot_errorinfo`] for it must not be dereferenced.
#[unsafe(no_mangle)]
pub extern "C" fn saferoot_errorinfo_free(errid: c_int) {
    error::release(errid);
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    use std::ffi::{CStr, CString};
    use std::fs;
    use std::os::fd::FromRawFd;

    fn cstr(s: &str) -> CString {
        CString::new(s).expect("cstring")
    }

    fn errorinfo_kind(key: c_int) -> String {
        let record = saferoot_errorinfo(key);
        assert!(!record.is_null(), "expected an error record for {key}");
        // SAFETY: the record and its label stay live until freed below.
        let kind = unsafe { CStr::from_ptr((*record).kind) };
        let kind = kind.to_str().expect("utf8").to_owned();
        saferoot_errorinfo_free(key);
        kind
    }

    /// Takes ownership of a descriptor returned over the ABI so the test
    /// closes it.
    fn owned(fd: c_int) -> OwnedFd {
        assert!(fd >= 0, "expected a descriptor, got error key {fd}");
        // SAFETY: the ABI contract transfers ownership of `fd` to us.
        unsafe { OwnedFd::from_raw_fd(fd) }
    }

    #[test]
    fn full_resolution_pipeline_over_the_abi() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("data")).expect("mkdir");
        fs::write(dir.path().join("data/file"), b"via ffi").expect("write");

        let root_path = cstr(dir.path().to_str().expect("utf8 tempdir"));
        // SAFETY: valid NUL-terminated path.
        let root = unsafe { saferoot_open_root(root_path.as_ptr()) };
        let root = owned(root);

        let rel = cstr("data/../data/file");
        // SAFETY: root is an open directory descriptor; rel is valid.
        let handle = unsafe {
            saferoot_resolve(std::os::fd::AsRawFd::as_raw_fd(&root), rel.as_ptr())
        };
        let handle = owned(handle);

        // SAFETY: handle is an open handle descriptor.
        let fd = unsafe {
            saferoot_reopen(std::os::fd::AsRawFd::as_raw_fd(&handle), libc::O_RDONLY)
        };
        let file = std::fs::File::from(owned(fd));
        let contents = std::io::read_to_string(file).expect("read");
        assert_eq!(contents, "via ffi");
    }

    #[test]
    fn null_path_yields_invalid_argument_record() {
        // SAFETY: NULL is explicitly allowed and must be rejected cleanly.
        let ret = unsafe { saferoot_open_root(std::ptr::null()) };
        assert!(ret < 0);
        assert_eq!(errorinfo_kind(ret), "InvalidArgument");
    }

    #[test]
    fn negative_root_fd_yields_invalid_argument_record() {
        let rel = cstr("x");
        // SAFETY: rel is valid; -1 must be rejected before use.
        let ret = unsafe { saferoot_resolve(-1, rel.as_ptr()) };
        assert!(ret < 0);
        assert_eq!(errorinfo_kind(ret), "InvalidArgument");
    }

    #[test]
    fn missing_path_yields_not_found_record_with_errno() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root_path = cstr(dir.path().to_str().expect("utf8 tempdir"));
        // SAFETY: valid NUL-terminated path.
        let root = unsafe { saferoot_open_root(root_path.as_ptr()) };
        let root = owned(root);

        let rel = cstr("does/not/exist");
        // SAFETY: root is open; rel is valid.
        let ret = unsafe {
            saferoot_resolve(std::os::fd::AsRawFd::as_raw_fd(&root), rel.as_ptr())
        };
        assert!(ret < 0);

        let record = saferoot_errorinfo(ret);
        assert!(!record.is_null());
        // SAFETY: record is live until freed below.
        let errno = unsafe { (*record).saved_errno };
        assert_eq!(errno, libc::ENOENT);
        saferoot_errorinfo_free(ret);
        assert!(saferoot_errorinfo(ret).is_null());
    }

    #[test]
    fn freed_key_cannot_be_looked_up_again() {
        // SAFETY: NULL is rejected cleanly.
        let ret = unsafe { saferoot_open_root(std::ptr::null()) };
        assert!(!saferoot_errorinfo(ret).is_null());
        saferoot_errorinfo_free(ret);
        assert!(saferoot_errorinfo(ret).is_null());
        // Double free must be harmless.
        saferoot_errorinfo_free(ret);
    }
}
