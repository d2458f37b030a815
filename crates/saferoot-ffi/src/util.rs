//! Validation helpers for values crossing the C boundary.

use std::ffi::{c_char, c_int, CStr, OsStr};
use std::os::fd::BorrowedFd;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use saferoot_common::error::{Result, SaferootError};

/// Borrows a C string as a path, rejecting NULL.
///
/// # Safety
///
/// `path`, when non-NULL, must point to a valid NUL-terminated string that
/// outlives the returned reference.
pub(crate) unsafe fn parse_path<'a>(path: *const c_char) -> Result<&'a Path> {
    if path.is_null() {
        return Err(SaferootError::InvalidArgument {
            message: "path must not be NULL".into(),
        });
    }
    // SAFETY: the caller guarantees path is a valid NUL-terminated string.
    let bytes = unsafe { CStr::from_ptr(path) }.to_bytes();
    Ok(OsStr::from_bytes(bytes).as_ref())
}

/// Borrows a caller-supplied descriptor value, rejecting negatives.
///
/// C callers can pass any integer where a descriptor is expected; a
/// negative value (for example an unchecked error return fed straight back
/// in) must be rejected before it is treated as a descriptor.
///
/// # Safety
///
/// A non-negative `fd` must be an open descriptor that stays open for the
/// returned lifetime.
pub(crate) unsafe fn borrow_fd<'a>(fd: c_int) -> Result<BorrowedFd<'a>> {
    if fd < 0 {
        return Err(SaferootError::InvalidArgument {
            message: format!("descriptor argument must not be negative (got {fd})"),
        });
    }
    // SAFETY: the value is non-negative and the caller guarantees it is an
    // open descriptor for the duration of 'a.
    Ok(unsafe { BorrowedFd::borrow_raw(fd) })
}
