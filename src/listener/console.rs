//! A human-readable reference listener: one line per event to a `Write`
//! sink. Exercises the listener contract end-to-end without requiring a
//! real terminal.

use super::{InvocationListener, LogDataKind, TestId};
use crate::build_info::BuildInfo;
use crate::errors::InvocationFailureCause;
use std::fmt;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

/// Writes one line per event to `W`, guarded by a mutex so the listener can
/// be shared behind an `Arc` across forwarders and shard threads.
pub struct ConsoleListener<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> ConsoleListener<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    fn line(&self, message: fmt::Arguments<'_>) {
        let mut out = self.out.lock().unwrap();
        // A write failure here has nowhere better to go; losing a console
        // line is not worth aborting the invocation over.
        let _ = writeln!(out, "{message}");
    }
}

impl<W> fmt::Debug for ConsoleListener<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleListener").finish_non_exhaustive()
    }
}

impl<W: Write + Send> InvocationListener for ConsoleListener<W> {
    fn invocation_started(&self, build: &BuildInfo) {
        self.line(format_args!("invocation started: build {build}"));
    }

    fn invocation_failed(&self, cause: &InvocationFailureCause) {
        self.line(format_args!("invocation failed: {cause}"));
    }

    fn invocation_ended(&self, elapsed: Duration) {
        self.line(format_args!("invocation ended: {} ms", elapsed.as_millis()));
    }

    fn test_run_started(&self, run_name: &str) {
        self.line(format_args!("run started: {run_name}"));
    }

    fn test_started(&self, test_id: &TestId) {
        self.line(format_args!("test started: {test_id}"));
    }

    fn test_failed(&self, test_id: &TestId, trace: &str) {
        self.line(format_args!("test failed: {test_id}\n{trace}"));
    }

    fn test_ended(&self, test_id: &TestId) {
        self.line(format_args!("test ended: {test_id}"));
    }

    fn test_run_ended(&self, elapsed: Duration) {
        self.line(format_args!("run ended: {} ms", elapsed.as_millis()));
    }

    fn test_log(&self, name: &str, kind: LogDataKind, data: &[u8]) {
        self.line(format_args!(
            "log `{name}` ({kind:?}, {len} bytes)",
            len = data.len()
        ));
    }

    fn test_run_failed(&self, message: &str) {
        self.line(format_args!("run failed: {message}"));
    }

    fn test_run_stopped(&self, elapsed: Duration) {
        self.line(format_args!("run stopped: {} ms", elapsed.as_millis()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_one_line_per_event() {
        let buf: Vec<u8> = Vec::new();
        let listener = ConsoleListener::new(buf);
        listener.invocation_started(&BuildInfo::new("suite", "17"));
        listener.invocation_ended(Duration::from_millis(42));
        let out = listener.out.into_inner().unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("suite:17"));
        assert!(text.contains("42 ms"));
    }
}
