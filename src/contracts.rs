//! The external collaborator contracts the engine drives: build providers,
//! target preparers, remote tests (and their optional capabilities), and
//! the rescheduler. Concrete implementations are always pluggable; this
//! module specifies only the interfaces (§6).

use crate::build_info::BuildInfo;
use crate::config::Configuration;
use crate::device::Device;
use crate::errors::{BuildRetrievalError, PerformError};
use crate::listener::InvocationListener;
use std::fmt;
use std::sync::Arc;

/// Supplies the build under test.
///
/// `&self` methods: a provider is shared behind an `Arc<Mutex<_>>` in
/// [`Configuration`] so the engine can swap in an [`ExistingBuildProvider`]
/// pass-through for shard children and resumed attempts while the original
/// provider is still being cleaned up.
pub trait BuildProvider: fmt::Debug + Send {
    /// Fetch a build. `Ok(None)` means there is nothing to test this round;
    /// that is not an error.
    fn get_build(&mut self) -> Result<Option<BuildInfo>, BuildRetrievalError>;

    /// Tell the provider the build was never meaningfully exercised (see
    /// the `build_not_tested` rule in the error handling design) so it may
    /// be recycled. No-op by default.
    fn build_not_tested(&mut self, _build: &BuildInfo) {}

    /// Release any resources the provider holds for `build`. No-op by
    /// default.
    fn clean_up(&mut self, _build: &BuildInfo) {}
}

/// Serves a preconstructed build and delegates `clean_up`/`build_not_tested`
/// to the wrapped provider.
///
/// Used by the engine when handing a shard or resumed attempt a build it
/// already fetched, so that only the original provider ever sees
/// `get_build`'s side effects.
#[derive(Debug)]
pub struct ExistingBuildProvider {
    build: Option<BuildInfo>,
    delegate: Arc<std::sync::Mutex<dyn BuildProvider>>,
}

impl ExistingBuildProvider {
    pub fn new(build: BuildInfo, delegate: Arc<std::sync::Mutex<dyn BuildProvider>>) -> Self {
        Self {
            build: Some(build),
            delegate,
        }
    }
}

impl BuildProvider for ExistingBuildProvider {
    fn get_build(&mut self) -> Result<Option<BuildInfo>, BuildRetrievalError> {
        Ok(self.build.take())
    }

    fn build_not_tested(&mut self, build: &BuildInfo) {
        self.delegate.lock().unwrap().build_not_tested(build);
    }

    fn clean_up(&mut self, build: &BuildInfo) {
        self.delegate.lock().unwrap().clean_up(build);
    }
}

/// Prepares the target device for a build before tests run.
pub trait TargetPreparer: fmt::Debug + Send + Sync {
    fn set_up(&self, device: &Arc<dyn Device>, build: &BuildInfo) -> Result<(), PerformError>;
}

/// A test that can accept an injected build before the invocation decides
/// whether to shard.
pub trait BuildReceiver: fmt::Debug + Send {
    fn add_build(&mut self, build: BuildInfo);
}

/// A test that wants the device handed to it before it runs.
pub trait DeviceTest: fmt::Debug + Send {
    fn set_device(&mut self, device: Arc<dyn Device>);
}

/// A test that may split itself into independent children.
pub trait Shardable: fmt::Debug + Send {
    /// Split into shard children. An empty return means "do not shard this
    /// test"; the original is kept in place.
    fn split(&mut self) -> Vec<Box<dyn RemoteTest>>;
}

/// A test that can report whether it has enough internal progress state to
/// be resumed after a device loss.
pub trait Resumable: fmt::Debug + Send {
    fn is_resumable(&self) -> bool;
}

/// A test that can be run against a device, and may optionally implement
/// any combination of [`BuildReceiver`], [`DeviceTest`], [`Shardable`], and
/// [`Resumable`].
///
/// Capabilities are probed via the `as_*_mut` methods rather than modeled
/// as a capability enum or an inheritance hierarchy, so a test opts into
/// exactly the subset it needs.
pub trait RemoteTest: fmt::Debug + Send {
    fn run(&mut self, listener: &dyn InvocationListener) -> Result<(), PerformError>;

    fn as_build_receiver_mut(&mut self) -> Option<&mut dyn BuildReceiver> {
        None
    }

    fn as_device_test_mut(&mut self) -> Option<&mut dyn DeviceTest> {
        None
    }

    fn as_shardable_mut(&mut self) -> Option<&mut dyn Shardable> {
        None
    }

    fn as_resumable_mut(&mut self) -> Option<&mut dyn Resumable> {
        None
    }
}

/// Accepts a configuration and places it on a worker, returning `false` if
/// it refuses (e.g. shutdown in progress).
///
/// The caller must observe the return value and clean up the orphaned
/// build when it is `false`.
pub trait Rescheduler: fmt::Debug + Send + Sync {
    fn schedule_config(&self, config: Configuration) -> bool;
}
