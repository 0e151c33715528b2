//! The name-mangling proxy (C6): a listener that rewrites identifiers
//! passing through it before handing events to a single downstream
//! listener, leaving everything else untouched.

use super::{InvocationListener, LogDataKind, TestId};
use crate::build_info::BuildInfo;
use crate::errors::InvocationFailureCause;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The three overridable rewrite hooks, identity by default.
///
/// Implementations must return a new value rather than mutate the one
/// they're given.
pub trait Mangler: fmt::Debug + Send + Sync {
    fn mangle_test_id(&self, test_id: &TestId) -> TestId {
        test_id.clone()
    }

    fn mangle_run_name(&self, run_name: &str) -> String {
        run_name.to_string()
    }

    fn mangle_build_info(&self, build: &BuildInfo) -> BuildInfo {
        build.clone()
    }
}

/// Interposes a [`Mangler`] transparently on every event that carries a
/// [`TestId`], run name, or [`BuildInfo`], then forwards to `downstream`.
/// All other events pass through unchanged.
#[derive(Debug, Clone)]
pub struct NameManglingProxy {
    downstream: Arc<dyn InvocationListener>,
    mangler: Arc<dyn Mangler>,
}

impl NameManglingProxy {
    pub fn new(downstream: Arc<dyn InvocationListener>, mangler: Arc<dyn Mangler>) -> Self {
        Self { downstream, mangler }
    }
}

impl InvocationListener for NameManglingProxy {
    fn invocation_started(&self, build: &BuildInfo) {
        let mangled = self.mangler.mangle_build_info(build);
        self.downstream.invocation_started(&mangled);
    }

    fn invocation_failed(&self, cause: &InvocationFailureCause) {
        self.downstream.invocation_failed(cause);
    }

    fn invocation_ended(&self, elapsed: Duration) {
        self.downstream.invocation_ended(elapsed);
    }

    fn test_run_started(&self, run_name: &str) {
        let mangled = self.mangler.mangle_run_name(run_name);
        self.downstream.test_run_started(&mangled);
    }

    fn test_started(&self, test_id: &TestId) {
        let mangled = self.mangler.mangle_test_id(test_id);
        self.downstream.test_started(&mangled);
    }

    fn test_failed(&self, test_id: &TestId, trace: &str) {
        let mangled = self.mangler.mangle_test_id(test_id);
        self.downstream.test_failed(&mangled, trace);
    }

    fn test_ended(&self, test_id: &TestId) {
        let mangled = self.mangler.mangle_test_id(test_id);
        self.downstream.test_ended(&mangled);
    }

    fn test_run_ended(&self, elapsed: Duration) {
        self.downstream.test_run_ended(elapsed);
    }

    fn test_log(&self, name: &str, kind: LogDataKind, data: &[u8]) {
        self.downstream.test_log(name, kind, data);
    }

    fn test_run_failed(&self, message: &str) {
        self.downstream.test_run_failed(message);
    }

    fn test_run_stopped(&self, elapsed: Duration) {
        self.downstream.test_run_stopped(elapsed);
    }
}
