//! The process-wide log registry.
//!
//! The engine registers its logger at the start of an invocation and must
//! unregister it on every exit path — normal completion, a
//! `BuildRetrievalError` short-circuit, or an unexpected fault. Unregistering
//! twice must be harmless, because the happy path unregisters inside
//! `report_logs` and the outer cleanup step unregisters again as a guard.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn registered() -> &'static Mutex<std::collections::HashSet<u64>> {
    static REGISTERED: OnceLock<Mutex<std::collections::HashSet<u64>>> = OnceLock::new();
    REGISTERED.get_or_init(|| Mutex::new(std::collections::HashSet::new()))
}

fn dumps() -> &'static Mutex<Vec<(String, Vec<u8>)>> {
    static DUMPS: OnceLock<Mutex<Vec<(String, Vec<u8>)>>> = OnceLock::new();
    DUMPS.get_or_init(|| Mutex::new(Vec::new()))
}

/// A handle to a registered logger. Obtained from [`register`]; passed to
/// [`unregister`] on every exit path.
#[derive(Debug)]
pub struct LoggerHandle(u64);

/// Register a new logger with the process-wide registry.
pub fn register() -> LoggerHandle {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    registered().lock().unwrap().insert(id);
    tracing::debug!(logger_id = id, "registered logger");
    LoggerHandle(id)
}

/// Unregister a logger. Idempotent: unregistering a handle that is already
/// gone is a no-op and returns `false`, never a panic.
pub fn unregister(handle: &LoggerHandle) -> bool {
    let removed = registered().lock().unwrap().remove(&handle.0);
    if removed {
        tracing::debug!(logger_id = handle.0, "unregistered logger");
    }
    removed
}

/// `true` iff `handle` is still registered. Exposed for tests asserting
/// idempotent unregistration.
pub fn is_registered(handle: &LoggerHandle) -> bool {
    registered().lock().unwrap().contains(&handle.0)
}

/// Dump a named blob of log content to the global sink (stand-in for a real
/// log-collection backend, out of scope for this crate).
pub fn dump_to_global(name: &str, data: &[u8]) {
    tracing::info!(log_name = name, bytes = data.len(), "dumping log to global registry");
    dumps().lock().unwrap().push((name.to_string(), data.to_vec()));
}

/// A snapshot of everything dumped so far. Intended for tests.
pub fn dumps_snapshot() -> Vec<(String, Vec<u8>)> {
    dumps().lock().unwrap().clone()
}

/// Clear the dump history. Intended for test isolation between cases that
/// each assert on `dumps_snapshot`.
pub fn clear_dumps() {
    dumps().lock().unwrap().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregister_is_idempotent() {
        let handle = register();
        assert!(is_registered(&handle));
        assert!(unregister(&handle));
        assert!(!is_registered(&handle));
        // Second unregister: harmless, reports nothing removed.
        assert!(!unregister(&handle));
    }
}
