//! The result forwarder (C1) and its resume specialisation.
//!
//! A forwarder holds an ordered list of downstream listeners and dispatches
//! every event to each of them in turn. A panic from one listener is caught,
//! logged, and does not suppress delivery to its neighbours or propagate
//! into the engine.

use super::{InvocationListener, LogDataKind, TestId};
use crate::build_info::BuildInfo;
use crate::errors::{InvocationFailureCause, UnexpectedFault};
use std::sync::Arc;
use std::time::Duration;

/// Calls `$method` on every listener in `$self.listeners`, catching and
/// logging any panic so one bad listener can't block its neighbours.
macro_rules! forward_to_all {
    ($self:ident, $method:ident($($arg:expr),*)) => {
        for listener in &$self.listeners {
            let listener = listener.as_ref();
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.$method($($arg),*)
            }));
            if let Err(payload) = result {
                let fault = UnexpectedFault::from_panic(payload);
                tracing::warn!(
                    hook = stringify!($method),
                    error = %fault,
                    "listener fault during fan-out; continuing with remaining listeners"
                );
            }
        }
    };
}

/// Fan-out of listener events to a list of downstream listeners (C1).
#[derive(Debug, Clone, Default)]
pub struct ResultForwarder {
    listeners: Vec<Arc<dyn InvocationListener>>,
}

impl ResultForwarder {
    pub fn new(listeners: Vec<Arc<dyn InvocationListener>>) -> Self {
        Self { listeners }
    }

    pub fn listeners(&self) -> &[Arc<dyn InvocationListener>] {
        &self.listeners
    }
}

impl InvocationListener for ResultForwarder {
    fn invocation_started(&self, build: &BuildInfo) {
        forward_to_all!(self, invocation_started(build));
    }

    fn invocation_failed(&self, cause: &InvocationFailureCause) {
        forward_to_all!(self, invocation_failed(cause));
    }

    fn invocation_ended(&self, elapsed: Duration) {
        forward_to_all!(self, invocation_ended(elapsed));
    }

    fn test_run_started(&self, run_name: &str) {
        forward_to_all!(self, test_run_started(run_name));
    }

    fn test_started(&self, test_id: &TestId) {
        forward_to_all!(self, test_started(test_id));
    }

    fn test_failed(&self, test_id: &TestId, trace: &str) {
        forward_to_all!(self, test_failed(test_id, trace));
    }

    fn test_ended(&self, test_id: &TestId) {
        forward_to_all!(self, test_ended(test_id));
    }

    fn test_run_ended(&self, elapsed: Duration) {
        forward_to_all!(self, test_run_ended(elapsed));
    }

    fn test_log(&self, name: &str, kind: LogDataKind, data: &[u8]) {
        forward_to_all!(self, test_log(name, kind, data));
    }

    fn test_run_failed(&self, message: &str) {
        forward_to_all!(self, test_run_failed(message));
    }

    fn test_run_stopped(&self, elapsed: Duration) {
        forward_to_all!(self, test_run_stopped(elapsed));
    }
}

/// Wraps a [`ResultForwarder`], suppressing `invocation_started` (the
/// original attempt already delivered it) and offsetting `invocation_ended`
/// by the elapsed time of the attempt that failed before the resume.
#[derive(Debug)]
pub struct ResumeForwarder {
    inner: ResultForwarder,
    elapsed_before: Duration,
}

impl ResumeForwarder {
    pub fn new(listeners: Vec<Arc<dyn InvocationListener>>, elapsed_before: Duration) -> Self {
        Self {
            inner: ResultForwarder::new(listeners),
            elapsed_before,
        }
    }
}

impl InvocationListener for ResumeForwarder {
    fn invocation_started(&self, _build: &BuildInfo) {
        // Suppressed: the original attempt already delivered this.
    }

    fn invocation_failed(&self, cause: &InvocationFailureCause) {
        self.inner.invocation_failed(cause);
    }

    fn invocation_ended(&self, elapsed: Duration) {
        self.inner.invocation_ended(self.elapsed_before + elapsed);
    }

    fn test_run_started(&self, run_name: &str) {
        self.inner.test_run_started(run_name);
    }

    fn test_started(&self, test_id: &TestId) {
        self.inner.test_started(test_id);
    }

    fn test_failed(&self, test_id: &TestId, trace: &str) {
        self.inner.test_failed(test_id, trace);
    }

    fn test_ended(&self, test_id: &TestId) {
        self.inner.test_ended(test_id);
    }

    fn test_run_ended(&self, elapsed: Duration) {
        self.inner.test_run_ended(elapsed);
    }

    fn test_log(&self, name: &str, kind: LogDataKind, data: &[u8]) {
        self.inner.test_log(name, kind, data);
    }

    fn test_run_failed(&self, message: &str) {
        self.inner.test_run_failed(message);
    }

    fn test_run_stopped(&self, elapsed: Duration) {
        self.inner.test_run_stopped(elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl InvocationListener for Recorder {
        fn invocation_started(&self, build: &BuildInfo) {
            self.events.lock().unwrap().push(format!("started({build})"));
        }
        fn invocation_ended(&self, elapsed: Duration) {
            self.events
                .lock()
                .unwrap()
                .push(format!("ended({})", elapsed.as_millis()));
        }
    }

    #[derive(Debug)]
    struct Panicker;

    impl InvocationListener for Panicker {
        fn invocation_started(&self, _build: &BuildInfo) {
            panic!("boom");
        }
    }

    #[test]
    fn forwarder_delivers_to_every_listener_in_order() {
        let recorder = Arc::new(Recorder::default());
        let forwarder = ResultForwarder::new(vec![recorder.clone()]);
        let build = BuildInfo::new("suite", "17");
        forwarder.invocation_started(&build);
        forwarder.invocation_ended(Duration::from_millis(5));
        let events = recorder.events.lock().unwrap();
        assert_eq!(*events, vec!["started(suite:17)".to_string(), "ended(5)".to_string()]);
    }

    #[test]
    fn a_panicking_listener_does_not_block_its_neighbours() {
        let recorder = Arc::new(Recorder::default());
        let forwarder = ResultForwarder::new(vec![Arc::new(Panicker), recorder.clone()]);
        let build = BuildInfo::new("suite", "17");
        forwarder.invocation_started(&build);
        assert_eq!(recorder.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn resume_forwarder_suppresses_start_and_sums_elapsed() {
        let recorder = Arc::new(Recorder::default());
        let forwarder = ResumeForwarder::new(vec![recorder.clone()], Duration::from_millis(100));
        let build = BuildInfo::new("suite", "17");
        forwarder.invocation_started(&build);
        forwarder.invocation_ended(Duration::from_millis(50));
        let events = recorder.events.lock().unwrap();
        assert_eq!(*events, vec!["ended(150)".to_string()]);
    }
}
