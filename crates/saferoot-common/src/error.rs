//! Unified error types for the saferoot workspace.
//!
//! Every fallible operation in the resolver core returns [`SaferootError`].
//! The C ABI surface flattens these into an [`ErrorKind`] label plus an
//! optional errno value, so both accessors are defined here alongside the
//! error type itself.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum SaferootError {
    /// A path component does not exist.
    #[error("no such file or directory: {path}")]
    NotFound {
        /// The untrusted path being resolved.
        path: PathBuf,
    },

    /// A non-final path component (or a root candidate) is not a directory.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// The untrusted path being resolved.
        path: PathBuf,
    },

    /// The caller lacks permission to traverse or open a component.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// The untrusted path being resolved.
        path: PathBuf,
    },

    /// Symlink expansion exceeded the configured bound, or the kernel
    /// reported a symlink loop.
    #[error("too many levels of symbolic links: {path}")]
    TooManySymlinks {
        /// The untrusted path being resolved.
        path: PathBuf,
    },

    /// A concurrent rename, mount, or unlink moved the filesystem under the
    /// resolver and the result could no longer be verified as in-root.
    #[error("filesystem race detected: {message}")]
    RaceDetected {
        /// Description of the failed verification.
        message: String,
    },

    /// The caller supplied an argument the resolver cannot act on, such as
    /// an empty path or a path with an embedded NUL byte.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// A required kernel capability is missing and no fallback applies.
    #[error("{feature} is not supported by this kernel")]
    Unsupported {
        /// Name of the missing capability.
        feature: &'static str,
    },

    /// An underlying OS call failed in a way that has no dedicated category.
    #[error("{operation} failed: {source}")]
    Os {
        /// The operation that failed.
        operation: &'static str,
        /// Underlying OS error.
        source: io::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, SaferootError>;

/// Coarse error category, stable across the C ABI boundary.
///
/// Similar in concept to [`std::io::ErrorKind`]: callers that need to branch
/// on failure modes should match on this rather than on error strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A path component does not exist.
    NotFound,
    /// A non-final component is not a directory.
    NotADirectory,
    /// Permission denied while traversing or opening.
    PermissionDenied,
    /// Symlink loop or expansion bound exceeded.
    TooManySymlinks,
    /// Containment verification failed due to concurrent mutation.
    RaceDetected,
    /// Malformed caller input.
    InvalidArgument,
    /// Required kernel capability missing.
    Unsupported,
    /// Unmapped OS failure, carrying the raw errno when known.
    OsError(Option<i32>),
}

impl SaferootError {
    /// Returns the [`ErrorKind`] of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::NotADirectory { .. } => ErrorKind::NotADirectory,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::TooManySymlinks { .. } => ErrorKind::TooManySymlinks,
            Self::RaceDetected { .. } => ErrorKind::RaceDetected,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::Os { source, .. } => ErrorKind::OsError(source.raw_os_error()),
        }
    }

    /// Returns the errno value this error maps to, if any.
    #[must_use]
    pub fn os_errno(&self) -> Option<i32> {
        self.kind().errno()
    }

    /// Shorthand for [`ErrorKind::can_retry`] on this error's kind.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.kind().can_retry()
    }

    /// Maps an errno from a lookup-related syscall (`open`, `openat`,
    /// `readlinkat`, `fstat`) into the error taxonomy.
    ///
    /// `path` is the untrusted path the lookup was resolving, recorded for
    /// diagnostics only — it is never used to retry the lookup.
    #[must_use]
    pub fn from_lookup_errno(errno: i32, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match errno {
            libc::ENOENT => Self::NotFound { path },
            libc::ENOTDIR => Self::NotADirectory { path },
            libc::EACCES | libc::EPERM => Self::PermissionDenied { path },
            libc::ELOOP | libc::EMLINK => Self::TooManySymlinks { path },
            libc::EXDEV => Self::RaceDetected {
                message: format!("lookup of {} crossed the root boundary", path.display()),
            },
            libc::EINVAL => Self::InvalidArgument {
                message: format!("lookup of {} rejected by the kernel", path.display()),
            },
            errno => Self::Os {
                operation: "path lookup",
                source: io::Error::from_raw_os_error(errno),
            },
        }
    }
}

impl ErrorKind {
    /// Returns a C-like errno for this kind.
    ///
    /// Pure-Rust failures are mapped to the closest errno value so that C
    /// callers can treat every error uniformly.
    #[must_use]
    pub fn errno(self) -> Option<i32> {
        match self {
            Self::NotFound => Some(libc::ENOENT),
            Self::NotADirectory => Some(libc::ENOTDIR),
            Self::PermissionDenied => Some(libc::EACCES),
            Self::TooManySymlinks => Some(libc::ELOOP),
            Self::RaceDetected => Some(libc::EXDEV),
            Self::InvalidArgument => Some(libc::EINVAL),
            Self::Unsupported => Some(libc::ENOSYS),
            Self::OsError(errno) => errno,
        }
    }

    /// Returns the stable label for this kind, used as the `kind` string in
    /// the C ABI error record.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::NotADirectory => "NotADirectory",
            Self::PermissionDenied => "PermissionDenied",
            Self::TooManySymlinks => "TooManySymlinks",
            Self::RaceDetected => "RaceDetected",
            Self::InvalidArgument => "InvalidArgument",
            Self::Unsupported => "Unsupported",
            Self::OsError(_) => "OsError",
        }
    }

    /// Indicates whether the error was transient and the operation might
    /// succeed if reissued by the caller.
    #[must_use]
    pub fn can_retry(self) -> bool {
        matches!(
            self.errno(),
            Some(libc::EAGAIN) | Some(libc::EINTR)
        )
    }
}
