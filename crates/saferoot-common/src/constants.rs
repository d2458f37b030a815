//! Policy constants for path resolution.
//!
//! These bounds have no single canonical value; they are chosen
//! conservatively and documented here so that callers can reason about
//! worst-case behaviour.

/// Maximum number of symlink expansions permitted during a single resolution.
///
/// Matches the kernel's own `MAXSYMLINKS` ceiling of 40. Exceeding this bound
/// surfaces as [`ErrorKind::TooManySymlinks`](crate::error::ErrorKind), never
/// as a hang.
pub const MAX_SYMLINK_TRAVERSALS: usize = 40;

/// Maximum number of times a component walk is restarted from the root after
/// a detected rename/mount race before the race is surfaced to the caller.
///
/// Races are expected to be rare and transient; a bounded restart keeps the
/// resolver latency finite even under a persistent attacker.
pub const MAX_RACE_RETRIES: usize = 8;

/// Maximum number of times a kernel fast-path lookup returning `EAGAIN`
/// (the kernel's own race-detection signal) is reissued before the race is
/// surfaced to the caller.
pub const MAX_KERNEL_RETRIES: usize = 4;

/// Directory of self-referential file descriptor magic-links, used both for
/// lookup re-verification and for the reopen protocol.
pub const PROC_SELF_FD: &str = "/proc/self/fd";
