//! The invocation engine (C3): `InvocationEngine::invoke` drives one
//! invocation from build fetch through cleanup.

use super::Resumer;
use crate::build_info::BuildInfo;
use crate::config::Configuration;
use crate::contracts::{BuildProvider, ExistingBuildProvider, Rescheduler};
use crate::device::Device;
use crate::errors::{InvocationFailureCause, PerformError, UnexpectedFault};
use crate::listener::{
    InvocationListener, LogDataKind, ShardAggregator, ShardListener, BUILD_ERROR_BUGREPORT, HOST_LOG,
};
use crate::log_registry::{self, LoggerHandle};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// The engine's per-call context: elapsed time, whether the invocation ended
/// by resuming, and a free-form status string external monitors can read
/// concurrently with the invocation in progress via [`Invocation::status`]
/// or `to_string()`.
///
/// Construct one with [`Invocation::new`] before calling
/// [`InvocationEngine::invoke`], and keep a clone (behind an `Arc`, if a
/// separate thread wants to observe it) if you need live status while the
/// invocation runs on the calling thread.
#[derive(Debug)]
pub struct Invocation {
    status: Mutex<String>,
    elapsed: Mutex<Duration>,
    resumed: AtomicBool,
}

impl Default for Invocation {
    fn default() -> Self {
        Self {
            status: Mutex::new("(not invoked)".to_string()),
            elapsed: Mutex::new(Duration::ZERO),
            resumed: AtomicBool::new(false),
        }
    }
}

impl Invocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> String {
        self.status.lock().unwrap().clone()
    }

    pub fn elapsed_time(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed.load(Ordering::Relaxed)
    }

    fn set_status(&self, status: impl Into<String>) {
        *self.status.lock().unwrap() = status.into();
    }

    fn record_elapsed(&self, elapsed: Duration, resumed: bool) {
        *self.elapsed.lock().unwrap() = elapsed;
        self.resumed.store(resumed, Ordering::Relaxed);
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status())
    }
}

/// Drives one invocation's lifecycle. Stateless: every invocation owns its
/// own logger registration, build, device, and log output, so multiple
/// engines may run concurrently in the same process with no shared mutable
/// state between them.
#[derive(Debug, Default)]
pub struct InvocationEngine;

impl InvocationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Runs to completion on the calling thread. Returns `Ok(())` for every
    /// outcome the engine itself resolves (no build, a `BuildRetrievalError`,
    /// a handled `BuildError`/`TargetSetupError`, or a device loss that was
    /// successfully resumed) and `Err` only for a device loss with no resume
    /// scheduled or an unexpected fault — both of which the caller must see,
    /// per §7's rethrow rule.
    pub fn invoke(
        &self,
        invocation: &Invocation,
        device: Arc<dyn Device>,
        mut config: Configuration,
        rescheduler: Arc<dyn Rescheduler>,
    ) -> Result<(), PerformError> {
        invocation.set_status("fetching build");

        if let Err(io_err) = config.log_output.init() {
            tracing::error!(error = %io_err, "failed to initialise log output; aborting invocation");
            let contents = config.log_output.contents();
            log_registry::dump_to_global(config.log_output.name(), &contents);
            return Ok(());
        }
        let logger = log_registry::register();

        let build = match config.build_provider.lock().unwrap().get_build() {
            Ok(None) => {
                invocation.set_status("(no build to test)");
                log_registry::unregister(&logger);
                config.log_output.close();
                return Ok(());
            }
            Ok(Some(build)) => build,
            Err(e) => {
                let synthetic_build = e.build_info.clone_for_new_invocation();
                let cause = InvocationFailureCause::BuildRetrieval(e);
                config.forwarder().invocation_started(&synthetic_build);
                config.forwarder().invocation_failed(&cause);
                report_logs(&mut config, &logger);
                config.forwarder().invocation_ended(Duration::ZERO);
                config.log_output.close();
                return Ok(());
            }
        };

        for test in config.tests.iter_mut() {
            if let Some(receiver) = test.as_build_receiver_mut() {
                receiver.add_build(build.clone_for_new_invocation());
            }
        }

        if try_shard(invocation, &mut config, &build, &rescheduler) {
            log_registry::unregister(&logger);
            config.log_output.close();
            return Ok(());
        }

        device.set_recovery(config.device_recovery.clone());
        let result = perform_invocation(invocation, &device, build, &mut config, &rescheduler, &logger);

        log_registry::unregister(&logger);
        config.log_output.close();

        result.map(|_resumed| ())
    }
}

/// §4.3.1: walk the test list, splitting every `Shardable` test that
/// produces children. If nothing split, restore the list unchanged and
/// report "not sharded". Otherwise fan the invocation out across a fresh
/// `ShardAggregator` and submit one child configuration per shard.
fn try_shard(invocation: &Invocation, config: &mut Configuration, build: &BuildInfo, rescheduler: &Arc<dyn Rescheduler>) -> bool {
    let original_tests = std::mem::take(&mut config.tests);
    let mut shard_tests = Vec::with_capacity(original_tests.len());
    let mut any_split = false;
    for mut test in original_tests {
        if let Some(shardable) = test.as_shardable_mut() {
            let children = shardable.split();
            if !children.is_empty() {
                any_split = true;
                shard_tests.extend(children);
                continue;
            }
        }
        shard_tests.push(test);
    }

    if !any_split {
        config.tests = shard_tests;
        return false;
    }

    invocation.set_status("sharding");
    let shard_count = shard_tests.len();
    let aggregator = ShardAggregator::new(config.listeners.clone(), shard_count);
    // Mark the invocation started now, using the original build; any real
    // shard's own `shard_started` call below is then a harmless no-op.
    aggregator.shard_started(build);

    for test in shard_tests {
        let child_build = build.clone_for_new_invocation();
        let existing_provider: Arc<Mutex<dyn BuildProvider>> = Arc::new(Mutex::new(ExistingBuildProvider::new(
            child_build.clone_for_new_invocation(),
            config.build_provider.clone(),
        )));
        let shard_listener: Arc<dyn InvocationListener> = Arc::new(ShardListener::new(aggregator.clone()));
        let shard_config = config.fork_for_shard(test, existing_provider, shard_listener);
        if !rescheduler.schedule_config(shard_config) {
            tracing::warn!("rescheduler refused a shard configuration; cleaning up its build");
            config.build_provider.lock().unwrap().clean_up(&child_build);
        }
    }

    config.build_provider.lock().unwrap().clean_up(build);
    true
}

/// §4.3.2: stamp the device serial, announce the start, run preparers and
/// tests, and route whatever comes back through the error-handling table in
/// §7. Returns `Ok(resumed)` on every path the engine itself resolves, or
/// `Err` for the two causes that must propagate to `invoke`'s caller.
fn perform_invocation(
    invocation: &Invocation,
    device: &Arc<dyn Device>,
    mut build: BuildInfo,
    config: &mut Configuration,
    rescheduler: &Arc<dyn Rescheduler>,
    logger: &LoggerHandle,
) -> Result<bool, PerformError> {
    let stopwatch = crate::time::stopwatch();
    build.set_device_serial(device.serial());
    start_invocation(invocation, config, &build);

    let outcome = attempt(device, &build, config);

    let mut resumed = false;
    let mut rethrow = None;
    match outcome {
        Ok(()) => {}
        Err(PerformError::Build(e)) => {
            let bugreport = config.log_output.contents();
            config.forwarder().test_log(BUILD_ERROR_BUGREPORT, LogDataKind::Text, &bugreport);
            report_failure(config, &build, &InvocationFailureCause::Build(e));
        }
        Err(PerformError::TargetSetup(e)) => {
            report_failure(config, &build, &InvocationFailureCause::TargetSetup(e));
        }
        Err(PerformError::DeviceNotAvailable(e)) => {
            let elapsed_before = stopwatch.snapshot().elapsed;
            resumed = Resumer::try_resume(config, &build, rescheduler, elapsed_before);
            let cause = InvocationFailureCause::DeviceNotAvailable(e);
            if !resumed {
                report_failure(config, &build, &cause);
            }
            rethrow = Some(rethrowable(cause));
        }
        Err(PerformError::Unexpected(e)) => {
            let cause = InvocationFailureCause::Unexpected(e);
            report_failure(config, &build, &cause);
            rethrow = Some(rethrowable(cause));
        }
    }

    invocation.set_status("done running tests");
    report_logs(config, logger);
    let elapsed = stopwatch.snapshot().elapsed;
    invocation.record_elapsed(elapsed, resumed);
    if !resumed {
        config.forwarder().invocation_ended(elapsed);
    }
    config.build_provider.lock().unwrap().clean_up(&build);

    match rethrow {
        Some(err) => Err(err),
        None => Ok(resumed),
    }
}

/// The two rethrow-eligible causes converted back to the narrower
/// `PerformError` so `perform_invocation` can propagate them to its caller.
fn rethrowable(cause: InvocationFailureCause) -> PerformError {
    match cause {
        InvocationFailureCause::DeviceNotAvailable(e) => PerformError::DeviceNotAvailable(e),
        InvocationFailureCause::Unexpected(e) => PerformError::Unexpected(e),
        _ => unreachable!("only device-loss and unexpected faults are rethrown"),
    }
}

fn start_invocation(invocation: &Invocation, config: &Configuration, build: &BuildInfo) {
    invocation.set_status(format!("running {} on build {}", build.test_tag(), build.build_id()));
    tracing::info!(build = %build, "starting invocation");
    config.forwarder().invocation_started(build);
}

/// The `try`/`except` body of §4.3.2's pseudocode: set device options, run
/// preparers in order, then run the tests. The first `PerformError` from
/// either stops the sequence.
fn attempt(device: &Arc<dyn Device>, build: &BuildInfo, config: &mut Configuration) -> Result<(), PerformError> {
    device.set_options(&config.device_options);
    for preparer in &config.target_preparers {
        call_guarded(|| preparer.set_up(device, build))?;
    }
    run_tests(device, config)
}

/// §4.3.4: give the device to every `DeviceTest`-capable test, then run each
/// test against one forwarder shared across the whole list.
fn run_tests(device: &Arc<dyn Device>, config: &mut Configuration) -> Result<(), PerformError> {
    let forwarder = config.forwarder();
    for test in config.tests.iter_mut() {
        if let Some(device_test) = test.as_device_test_mut() {
            device_test.set_device(device.clone());
        }
        call_guarded(|| test.run(&forwarder))?;
    }
    Ok(())
}

/// `report_failure(e)`: fan `invocation_failed` out to every listener, and
/// unless `cause` is a `BuildError`, tell the build provider the build was
/// never meaningfully tested.
fn report_failure(config: &Configuration, build: &BuildInfo, cause: &InvocationFailureCause) {
    config.forwarder().invocation_failed(cause);
    if !cause.is_build_error() {
        config.build_provider.lock().unwrap().build_not_tested(build);
    }
}

/// Forwards the host log to listeners, dumps it to the global registry, and
/// unregisters the logger. Called once from the happy/failure path inside
/// `perform_invocation` and once from the `BuildRetrievalError` short-circuit
/// in `invoke`; `invoke`'s own final cleanup unregisters again, which is
/// always safe because unregistration is idempotent.
fn report_logs(config: &mut Configuration, logger: &LoggerHandle) {
    let contents = config.log_output.contents();
    config.forwarder().test_log(HOST_LOG, LogDataKind::Text, &contents);
    log_registry::dump_to_global(config.log_output.name(), &contents);
    log_registry::unregister(logger);
}

/// Calls `f`, catching any panic and turning it into an
/// [`UnexpectedFault`](crate::errors::UnexpectedFault) rather than letting it
/// unwind into the engine.
fn call_guarded<F: FnOnce() -> Result<(), PerformError>>(f: F) -> Result<(), PerformError> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(PerformError::Unexpected(UnexpectedFault::from_panic(payload))),
    }
}
