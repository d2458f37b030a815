//! Small internal helpers shared by the resolver modules.

use std::ffi::{CString, OsStr};
use std::os::unix::ffi::OsStrExt;

use saferoot_common::error::{Result, SaferootError};

/// Converts caller-supplied path material into a C string, rejecting
/// embedded NUL bytes rather than truncating at them.
pub fn to_cstring(s: &OsStr) -> Result<CString> {
    CString::new(s.as_bytes()).map_err(|_| SaferootError::InvalidArgument {
        message: "path contains an embedded NUL byte".into(),
    })
}
