//! The error-record table behind the negative-integer return convention.
//!
//! Rich errors cannot cross an ABI that only passes `int`s, so each failure
//! is parked in a process-global table and represented to the caller by a
//! unique negative key. The caller fetches the record with
//! [`lookup`] (exposed as `saferoot_errorinfo`) as many times as it likes
//! and then releases it by key. Keys are allocated from a monotonically
//! increasing counter and are never reused while their record is live, so
//! a stale key can never alias a newer error.

use std::collections::HashMap;
use std::ffi::{c_char, c_int, CString};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{LazyLock, Mutex};

use saferoot_common::error::SaferootError;

/// C-visible error record.
///
/// All pointers remain valid until the record's key is passed to
/// `saferoot_errorinfo_free`; the caller must not hold on to them past that
/// point.
#[repr(C)]
#[derive(Debug)]
#[allow(non_camel_case_types)]
pub struct saferoot_error_t {
    /// Stable error-category label, one of the
    /// [`ErrorKind::name`](saferoot_common::error::ErrorKind::name) strings.
    pub kind: *const c_char,
    /// The errno value this error maps to, or 0 when none applies.
    pub saved_errno: c_int,
    /// Human-readable description of the failure.
    pub description: *const c_char,
    /// Nonzero when the failure was transient and the operation may succeed
    /// if the caller reissues it.
    pub can_retry: c_int,
}

/// A table entry: the C view plus the allocations backing its strings.
#[derive(Debug)]
struct StoredError {
    view: saferoot_error_t,
    // Own the buffers `view.kind` and `view.description` point into.
    _kind: CString,
    _description: CString,
}

// SAFETY: the raw pointers in `view` only ever reference the entry's own
// CString heap buffers (stable across moves), and the table hands out shared
// references only.
unsafe impl Send for StoredError {}
// SAFETY: see above; StoredError is never mutated after insertion.
unsafe impl Sync for StoredError {}

static ERROR_TABLE: LazyLock<Mutex<HashMap<c_int, Box<StoredError>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

static NEXT_ERROR_ID: AtomicI32 = AtomicI32::new(1);

/// Parks `err` in the table and returns its negative key.
pub(crate) fn store(err: &SaferootError) -> c_int {
    let kind = err.kind();
    // The label table lives in ErrorKind::name; re-encoding it here keeps
    // one source of truth for the ABI strings.
    let label = CString::new(kind.name()).unwrap_or_else(|_| CString::from(c"OsError"));
    let description =
        CString::new(err.to_string()).unwrap_or_else(|_| CString::from(c"<description contained NUL>"));
    let entry = Box::new(StoredError {
        view: saferoot_error_t {
            kind: label.as_ptr(),
            saved_errno: kind.errno().unwrap_or(0),
            description: description.as_ptr(),
            can_retry: c_int::from(kind.can_retry()),
        },
        _kind: label,
        _description: description,
    });

    let mut table = match ERROR_TABLE.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    loop {
        let id = NEXT_ERROR_ID.fetch_add(1, Ordering::Relaxed);
        if id <= 0 {
            // Counter wrapped after ~2^31 errors; restart and let the
            // liveness check below skip any key still in use.
            NEXT_ERROR_ID.store(1, Ordering::Relaxed);
            continue;
        }
        let key = -id;
        if table.contains_key(&key) {
            continue;
        }
        let _ = table.insert(key, entry);
        return key;
    }
}

/// Returns a pointer to the record for `key`, or NULL if the key is unknown
/// (never allocated, already freed, or not negative).
///
/// The record is not removed; repeated lookups of the same live key return
/// the same pointer.
pub(crate) fn lookup(key: c_int) -> *const saferoot_error_t {
    if key >= 0 {
        return std::ptr::null();
    }
    let table = match ERROR_TABLE.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    table
        .get(&key)
        .map_or(std::ptr::null(), |entry| std::ptr::from_ref(&entry.view))
}

/// Releases the record for `key`. Unknown keys (including keys already
/// freed) are ignored, so double-free is a harmless no-op.
pub(crate) fn release(key: c_int) {
    let mut table = match ERROR_TABLE.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let _ = table.remove(&key);
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    use std::ffi::CStr;

    fn sample_error() -> SaferootError {
        SaferootError::NotFound {
            path: "a/b".into(),
        }
    }

    #[test]
    fn store_returns_negative_keys() {
        let key = store(&sample_error());
        assert!(key < 0);
        release(key);
    }

    #[test]
    fn lookup_returns_record_until_freed() {
        let key = store(&sample_error());

        let record = lookup(key);
        assert!(!record.is_null());
        // SAFETY: the record is live until release below.
        let (kind, errno) = unsafe { ((*record).kind, (*record).saved_errno) };
        // SAFETY: kind points into the live record's NUL-terminated label.
        let kind = unsafe { CStr::from_ptr(kind) };
        assert_eq!(kind.to_str().expect("utf8"), "NotFound");
        assert_eq!(errno, libc::ENOENT);

        // Lookup does not consume the record.
        assert!(!lookup(key).is_null());

        release(key);
        assert!(lookup(key).is_null());
    }

    #[test]
    fn record_fields_are_derived_from_the_error_kind() {
        let err = sample_error();
        let key = store(&err);

        let record = lookup(key);
        assert!(!record.is_null());
        // SAFETY: the record is live until release below.
        let (kind, retry) = unsafe { ((*record).kind, (*record).can_retry) };
        // SAFETY: kind points into the record's own NUL-terminated label.
        let kind = unsafe { CStr::from_ptr(kind) };
        assert_eq!(kind.to_str().expect("utf8"), err.kind().name());
        assert_eq!(retry, c_int::from(err.kind().can_retry()));

        release(key);
    }

    #[test]
    fn double_free_is_a_no_op() {
        let key = store(&sample_error());
        release(key);
        release(key);
        assert!(lookup(key).is_null());
    }

    #[test]
    fn unknown_and_non_negative_keys_lookup_as_null() {
        assert!(lookup(0).is_null());
        assert!(lookup(7).is_null());
        assert!(lookup(c_int::MIN).is_null());
    }

    #[test]
    fn concurrent_stores_never_share_keys() {
        let keys: Vec<c_int> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| (0..64).map(|_| store(&sample_error())).collect::<Vec<_>>())
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().expect("thread"))
                .collect()
        });

        let mut unique = keys.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), keys.len(), "error keys must be unique");
        for key in keys {
            assert!(key < 0);
            release(key);
        }
    }

    #[test]
    fn description_survives_table_growth() {
        let key = store(&sample_error());
        let before = lookup(key);

        // Force rehashes; boxed entries must keep their addresses.
        let bulk: Vec<c_int> = (0..512).map(|_| store(&sample_error())).collect();

        let after = lookup(key);
        assert_eq!(before, after);
        // SAFETY: record for `key` is still live.
        let description = unsafe { CStr::from_ptr((*after).description) };
        assert!(description.to_str().expect("utf8").contains("a/b"));

        release(key);
        for key in bulk {
            release(key);
        }
    }
}
