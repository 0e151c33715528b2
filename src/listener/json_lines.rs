//! A machine-readable reference listener: one newline-delimited JSON object
//! per event, the structured counterpart to [`super::ConsoleListener`].

use super::{InvocationListener, LogDataKind, TestId};
use crate::build_info::BuildInfo;
use crate::errors::InvocationFailureCause;
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum JsonEvent<'a> {
    InvocationStarted { build_tag: &'a str, build_id: &'a str },
    InvocationFailed { cause: String },
    InvocationEnded { elapsed_ms: u128 },
    TestRunStarted { run_name: &'a str },
    TestStarted { test_id: String },
    TestFailed { test_id: String, trace: &'a str },
    TestEnded { test_id: String },
    TestRunEnded { elapsed_ms: u128 },
    TestLog { name: &'a str, kind: &'static str, bytes: usize },
    TestRunFailed { message: &'a str },
    TestRunStopped { elapsed_ms: u128 },
}

/// Serializes each event as one line of JSON to `W`.
pub struct JsonLinesListener<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesListener<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    fn emit(&self, event: &JsonEvent<'_>) {
        let mut out = self.out.lock().unwrap();
        if let Ok(line) = serde_json::to_string(event) {
            let _ = writeln!(out, "{line}");
        }
    }
}

impl<W> fmt::Debug for JsonLinesListener<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLinesListener").finish_non_exhaustive()
    }
}

impl<W: Write + Send> InvocationListener for JsonLinesListener<W> {
    fn invocation_started(&self, build: &BuildInfo) {
        self.emit(&JsonEvent::InvocationStarted {
            build_tag: build.test_tag(),
            build_id: build.build_id(),
        });
    }

    fn invocation_failed(&self, cause: &InvocationFailureCause) {
        self.emit(&JsonEvent::InvocationFailed { cause: cause.to_string() });
    }

    fn invocation_ended(&self, elapsed: Duration) {
        self.emit(&JsonEvent::InvocationEnded { elapsed_ms: elapsed.as_millis() });
    }

    fn test_run_started(&self, run_name: &str) {
        self.emit(&JsonEvent::TestRunStarted { run_name });
    }

    fn test_started(&self, test_id: &TestId) {
        self.emit(&JsonEvent::TestStarted { test_id: test_id.to_string() });
    }

    fn test_failed(&self, test_id: &TestId, trace: &str) {
        self.emit(&JsonEvent::TestFailed { test_id: test_id.to_string(), trace });
    }

    fn test_ended(&self, test_id: &TestId) {
        self.emit(&JsonEvent::TestEnded { test_id: test_id.to_string() });
    }

    fn test_run_ended(&self, elapsed: Duration) {
        self.emit(&JsonEvent::TestRunEnded { elapsed_ms: elapsed.as_millis() });
    }

    fn test_log(&self, name: &str, kind: LogDataKind, data: &[u8]) {
        let kind = match kind {
            LogDataKind::Text => "text",
            LogDataKind::Binary => "binary",
        };
        self.emit(&JsonEvent::TestLog { name, kind, bytes: data.len() });
    }

    fn test_run_failed(&self, message: &str) {
        self.emit(&JsonEvent::TestRunFailed { message });
    }

    fn test_run_stopped(&self, elapsed: Duration) {
        self.emit(&JsonEvent::TestRunStopped { elapsed_ms: elapsed.as_millis() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_one_json_object_per_line() {
        let buf: Vec<u8> = Vec::new();
        let listener = JsonLinesListener::new(buf);
        listener.invocation_started(&BuildInfo::new("suite", "17"));
        listener.test_started(&TestId::new("com.example.Suite", "test_one"));
        listener.invocation_ended(Duration::from_millis(5));
        let out = listener.out.into_inner().unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in &lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("event").is_some());
        }
    }
}
