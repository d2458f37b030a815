//! Thin wrappers over the raw syscalls the resolver depends on.
//!
//! Everything here returns [`Errno`] rather than the workspace error type;
//! the callers decide how a given errno maps into the error taxonomy. All
//! unsafe FFI is confined to this module.

#![allow(unsafe_code)]

use std::ffi::CStr;
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStringExt;
use std::path::PathBuf;

use libc::{c_int, c_uint};
use nix::errno::Errno;

/// Argument block for `openat2(2)`, matching `struct open_how` from
/// `linux/openat2.h`. The kernel requires unused fields to be zero.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct OpenHow {
    /// `O_*` flags.
    pub flags: u64,
    /// Mode for `O_CREAT`/`O_TMPFILE`, zero otherwise.
    pub mode: u64,
    /// `RESOLVE_*` flags.
    pub resolve: u64,
}

/// `open(2)` restricted to non-creating flags.
pub fn open(path: &CStr, flags: c_int) -> Result<OwnedFd, Errno> {
    // SAFETY: path is a valid NUL-terminated string and no O_CREAT mode
    // argument is needed for the flags we pass.
    let fd = unsafe { libc::open(path.as_ptr(), flags | libc::O_CLOEXEC) };
    // SAFETY: on success open returns a freshly allocated descriptor that
    // nothing else owns.
    Errno::result(fd).map(|fd| unsafe { OwnedFd::from_raw_fd(fd) })
}

/// `openat(2)` relative to `dirfd`.
pub fn openat(dirfd: BorrowedFd<'_>, path: &CStr, flags: c_int) -> Result<OwnedFd, Errno> {
    // SAFETY: dirfd is a live descriptor for the duration of the call and
    // path is a valid NUL-terminated string.
    let fd = unsafe {
        libc::openat(
            dirfd.as_raw_fd(),
            path.as_ptr(),
            flags | libc::O_CLOEXEC,
            0 as c_uint,
        )
    };
    // SAFETY: on success openat returns a freshly allocated descriptor.
    Errno::result(fd).map(|fd| unsafe { OwnedFd::from_raw_fd(fd) })
}

/// `openat2(2)` relative to `dirfd`.
///
/// Issued through `syscall(2)` because glibc does not wrap `openat2`.
pub fn openat2(dirfd: BorrowedFd<'_>, path: &CStr, how: &OpenHow) -> Result<OwnedFd, Errno> {
    // SAFETY: dirfd is live, path is NUL-terminated, and `how` is a
    // correctly sized and zero-padded struct open_how.
    let fd = unsafe {
        libc::syscall(
            libc::SYS_openat2,
            dirfd.as_raw_fd(),
            path.as_ptr(),
            std::ptr::from_ref(how),
            size_of::<OpenHow>(),
        )
    };
    // SAFETY: on success openat2 returns a freshly allocated descriptor.
    Errno::result(fd).map(|fd| unsafe { OwnedFd::from_raw_fd(fd as RawFd) })
}

/// `readlinkat(2)` with an empty path, reading the target of the symlink
/// the descriptor itself refers to.
pub fn readlink_fd(fd: BorrowedFd<'_>) -> Result<PathBuf, Errno> {
    readlinkat(fd, c"")
}

/// `readlinkat(2)` relative to `dirfd`.
///
/// Grows the buffer until the target fits, so arbitrarily long targets are
/// read without truncation.
pub fn readlinkat(dirfd: BorrowedFd<'_>, path: &CStr) -> Result<PathBuf, Errno> {
    let mut capacity = 256usize;
    loop {
        let mut buf = vec![0u8; capacity];
        // SAFETY: dirfd is live, path is NUL-terminated, and buf is writable
        // for capacity bytes.
        let len = unsafe {
            libc::readlinkat(
                dirfd.as_raw_fd(),
                path.as_ptr(),
                buf.as_mut_ptr().cast(),
                capacity,
            )
        };
        let len = Errno::result(len)? as usize;
        if len < capacity {
            buf.truncate(len);
            return Ok(PathBuf::from(std::ffi::OsString::from_vec(buf)));
        }
        // Target may have been truncated; retry with more room.
        capacity *= 2;
    }
}

/// `fstat(2)`.
pub fn fstat(fd: BorrowedFd<'_>) -> Result<libc::stat, Errno> {
    let mut st = MaybeUninit::<libc::stat>::uninit();
    // SAFETY: fd is live and st points to a writable stat buffer.
    let res = unsafe { libc::fstat(fd.as_raw_fd(), st.as_mut_ptr()) };
    // SAFETY: fstat fully initialises the buffer on success.
    Errno::result(res).map(|_| unsafe { st.assume_init() })
}

/// `fstatfs(2)`. Works on `O_PATH` descriptors.
pub fn fstatfs(fd: BorrowedFd<'_>) -> Result<libc::statfs, Errno> {
    let mut fs = MaybeUninit::<libc::statfs>::uninit();
    // SAFETY: fd is live and fs points to a writable statfs buffer.
    let res = unsafe { libc::fstatfs(fd.as_raw_fd(), fs.as_mut_ptr()) };
    // SAFETY: fstatfs fully initialises the buffer on success.
    Errno::result(res).map(|_| unsafe { fs.assume_init() })
}

/// `fcntl(F_DUPFD_CLOEXEC)`, duplicating a descriptor without inheriting it
/// across exec.
pub fn dup_cloexec(fd: BorrowedFd<'_>) -> Result<OwnedFd, Errno> {
    // SAFETY: fd is a live descriptor.
    let new = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_DUPFD_CLOEXEC, 0) };
    // SAFETY: on success fcntl returns a freshly allocated descriptor.
    Errno::result(new).map(|fd| unsafe { OwnedFd::from_raw_fd(fd) })
}
