//! # saferoot-core
//!
//! Race-free resolution of untrusted paths inside a trusted directory.
//!
//! A [`Root`] is an owned descriptor for a trusted base directory;
//! [`Root::resolve`] turns an attacker-influenced relative path into a
//! [`Handle`] that is guaranteed to refer to an object inside that root,
//! even in the presence of symlinks, `..` traversal, and concurrent renames.
//! A [`Handle`] is location-only; [`Handle::reopen`] upgrades it to a usable
//! [`std::fs::File`] with identity re-verification, closing the remaining
//! TOCTOU window between locating an object and operating on it.
//!
//! ```no_run
//! use nix::fcntl::OFlag;
//! use saferoot_core::Root;
//!
//! # fn main() -> saferoot_common::error::Result<()> {
//! let root = Root::open("/srv/sandbox")?;
//! let handle = root.resolve("data/../config/app.toml")?;
//! let file = handle.reopen(OFlag::O_RDONLY)?;
//! # Ok(())
//! # }
//! ```
//!
//! Two resolution backends implement the same containment contract: a
//! single atomic `openat2(RESOLVE_IN_ROOT)` call on kernels that support it
//! (Linux 5.6+), and a userspace component walk with `/proc/self/fd`
//! re-verification everywhere else. The backend is chosen by one capability
//! probe at root-open time.

mod handle;
mod root;

pub use handle::{FileIdentity, Handle, HandleRef};
pub use root::{Root, RootRef};

pub mod resolver;

// Internally used helpers.
mod procfs;
mod syscalls;
mod utils;

// Re-exported so callers can name open flags without importing nix
// themselves.
pub use nix::fcntl::OFlag;
