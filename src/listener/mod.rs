//! The listener contract (§3 / §4.1) and the small set of concrete
//! listeners the engine ships or relies on internally.
//!
//! [`InvocationListener`] is deliberately a plain trait with no required
//! methods (every hook defaults to a no-op): a listener interested only in
//! `invocation_ended`, say, shouldn't have to stub out the other ten hooks.
//! The strict ordering the contract promises — at most one
//! `invocation_started`/`invocation_ended` pair, any number of per-test
//! events in between — is enforced by the engine and the forwarder family,
//! not by this trait.

mod console;
mod forwarder;
mod json_lines;
mod mangling;
mod shard;

pub use console::ConsoleListener;
pub use forwarder::{ResultForwarder, ResumeForwarder};
pub use json_lines::JsonLinesListener;
pub use mangling::NameManglingProxy;
pub use shard::{ShardAggregator, ShardListener};

use crate::build_info::BuildInfo;
use crate::errors::InvocationFailureCause;
use std::fmt;
use std::time::Duration;

/// Canonical log name for the host-side log.
pub const HOST_LOG: &str = "host_log";
/// Canonical log name for the device logcat.
pub const DEVICE_LOGCAT: &str = "device_logcat";
/// Canonical log name for the bugreport attached on a `BuildError`.
pub const BUILD_ERROR_BUGREPORT: &str = "build_error_bugreport";

/// The kind of data carried by a `test_log` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogDataKind {
    Text,
    Binary,
}

/// A test's identity: a class/suite name plus a method/case name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TestId {
    pub class_name: smol_str::SmolStr,
    pub test_name: smol_str::SmolStr,
}

impl TestId {
    pub fn new(class_name: impl Into<smol_str::SmolStr>, test_name: impl Into<smol_str::SmolStr>) -> Self {
        Self {
            class_name: class_name.into(),
            test_name: test_name.into(),
        }
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class_name, self.test_name)
    }
}

/// The event sequence sink every invocation reports to.
///
/// All hooks default to a no-op; implement only the ones you need. A
/// listener is expected to be cheap and non-blocking relative to shard
/// progress (see [`ShardAggregator`]), and is always invoked through `&self`
/// so it can be shared behind an `Arc` across shard/resume forwarders.
pub trait InvocationListener: fmt::Debug + Send + Sync {
    fn invocation_started(&self, _build: &BuildInfo) {}
    fn invocation_failed(&self, _cause: &InvocationFailureCause) {}
    fn invocation_ended(&self, _elapsed: Duration) {}

    fn test_run_started(&self, _run_name: &str) {}
    fn test_started(&self, _test_id: &TestId) {}
    fn test_failed(&self, _test_id: &TestId, _trace: &str) {}
    fn test_ended(&self, _test_id: &TestId) {}
    fn test_run_ended(&self, _elapsed: Duration) {}
    fn test_log(&self, _name: &str, _kind: LogDataKind, _data: &[u8]) {}
    fn test_run_failed(&self, _message: &str) {}
    fn test_run_stopped(&self, _elapsed: Duration) {}
}
