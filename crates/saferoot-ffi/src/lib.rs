//! # saferoot-ffi
//!
//! C ABI for the saferoot resolver.
//!
//! Every function communicates through plain integers so the surface works
//! from any language with C FFI: non-negative return values are file
//! descriptors owned by the caller, and any negative return value is a key
//! into the error-record table, resolved with [`saferoot_errorinfo`] and
//! released with [`saferoot_errorinfo_free`].
//!
//! ```c
//! int root = saferoot_open_root("/srv/sandbox");
//! int handle = saferoot_resolve(root, "data/../etc/passwd");
//! int fd = saferoot_reopen(handle, O_RDONLY);
//! if (fd < 0) {
//!     const saferoot_error_t *err = saferoot_errorinfo(fd);
//!     fprintf(stderr, "%s: %s (errno=%d)\n", err->kind, err->description,
//!             err->saved_errno);
//!     saferoot_errorinfo_free(fd);
//! }
//! ```
//!
//! [`saferoot_errorinfo`]: core::saferoot_errorinfo
//! [`saferoot_errorinfo_free`]: core::saferoot_errorinfo_free

// This crate exists to interact with C callers, so FFI-related unsafe code
// is expected here.
#![allow(unsafe_code)]

/// Extern function surface.
pub mod core;

/// The keyed error-record table behind the integer return convention.
pub mod error;

mod util;

pub use error::saferoot_error_t;
