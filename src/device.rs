//! Device contracts.
//!
//! Device acquisition, recovery, and telemetry are external collaborators
//! (see [SPEC_FULL.md] §1); this module only specifies the interfaces the
//! engine itself calls.

use crate::config::DeviceOptions;
use std::fmt;

/// A device under test.
///
/// Methods take `&self`, not `&mut self`: a real device is a handle to a
/// remote peripheral reached over some command channel (adb-like), which is
/// naturally synchronized on the far side. This lets the engine share one
/// device handle with every `DeviceTest`-capable test without fighting the
/// borrow checker.
pub trait Device: fmt::Debug + Send + Sync {
    /// The device's serial number, stamped onto the build under test.
    fn serial(&self) -> &str;

    /// Apply the invocation's device options (installed before any
    /// preparer runs).
    fn set_options(&self, options: &DeviceOptions);

    /// Install the invocation's recovery strategy.
    fn set_recovery(&self, recovery: std::sync::Arc<dyn DeviceRecovery>);
}

/// A device recovery strategy, installed on the device before test
/// execution begins.
///
/// Recovery, like device acquisition, is entirely out of scope for this
/// crate: this trait exists only so [`crate::config::Configuration`] has
/// somewhere to carry a recovery strategy through to [`Device::set_recovery`].
pub trait DeviceRecovery: fmt::Debug + Send + Sync {
    /// A human-readable name, for status/log messages.
    fn name(&self) -> &str {
        "default"
    }
}

/// A recovery strategy that declines to do anything, suitable as a default
/// and for tests.
#[derive(Debug, Default)]
pub struct NoOpRecovery;

impl DeviceRecovery for NoOpRecovery {
    fn name(&self) -> &str {
        "no-op"
    }
}
