//! End-to-end scenarios for the invocation engine: happy path, a build
//! refused by a preparer, device loss with a successful resume, and a
//! two-test sharded run. Each test wires up minimal fake collaborators
//! (build provider, device, rescheduler, tests, preparers) and asserts the
//! listener-visible contract rather than internal state.

use invocation_engine::build_info::BuildInfo;
use invocation_engine::config::{Configuration, DeviceOptions};
use invocation_engine::contracts::{BuildProvider, RemoteTest, Resumable, Rescheduler, Shardable, TargetPreparer};
use invocation_engine::device::{Device, DeviceRecovery};
use invocation_engine::engine::{Invocation, InvocationEngine};
use invocation_engine::errors::{BuildError, BuildRetrievalError, DeviceNotAvailableError, InvocationFailureCause, PerformError};
use invocation_engine::listener::{InvocationListener, LogDataKind, BUILD_ERROR_BUGREPORT};
use pretty_assertions::assert_eq;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Surfaces the engine's `tracing` spans/events on test failure, the same
/// way nextest's own integration tests make their subject's logging
/// visible under `cargo test -- --nocapture`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[derive(Debug, Default)]
struct FakeBuildProvider {
    build: Option<BuildInfo>,
    not_tested_calls: usize,
    clean_up_calls: usize,
}

impl FakeBuildProvider {
    fn with_build(build: BuildInfo) -> Self {
        Self {
            build: Some(build),
            ..Default::default()
        }
    }
}

impl BuildProvider for FakeBuildProvider {
    fn get_build(&mut self) -> Result<Option<BuildInfo>, BuildRetrievalError> {
        Ok(self.build.take())
    }

    fn build_not_tested(&mut self, _build: &BuildInfo) {
        self.not_tested_calls += 1;
    }

    fn clean_up(&mut self, _build: &BuildInfo) {
        self.clean_up_calls += 1;
    }
}

#[derive(Debug)]
struct FakeDevice {
    serial: String,
}

impl FakeDevice {
    fn new(serial: impl Into<String>) -> Self {
        Self { serial: serial.into() }
    }
}

impl Device for FakeDevice {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn set_options(&self, _options: &DeviceOptions) {}

    fn set_recovery(&self, _recovery: Arc<dyn DeviceRecovery>) {}
}

#[derive(Debug, Default)]
struct NoOpRescheduler;

impl Rescheduler for NoOpRescheduler {
    fn schedule_config(&self, _config: Configuration) -> bool {
        true
    }
}

/// Runs every scheduled config on its own thread through a fresh engine and
/// `Invocation`, standing in for a real rescheduler's worker pool. Tests
/// call `join_all` after the top-level `invoke` returns to wait for
/// everything it spawned.
struct SpawningRescheduler {
    device: Arc<dyn Device>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
    scheduled: AtomicUsize,
}

impl SpawningRescheduler {
    fn new(device: Arc<dyn Device>) -> Self {
        Self {
            device,
            handles: Mutex::new(Vec::new()),
            scheduled: AtomicUsize::new(0),
        }
    }

    fn join_all(&self) {
        let mut handles = self.handles.lock().unwrap();
        for handle in handles.drain(..) {
            handle.join().unwrap();
        }
    }
}

impl fmt::Debug for SpawningRescheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawningRescheduler").finish_non_exhaustive()
    }
}

impl Rescheduler for SpawningRescheduler {
    fn schedule_config(&self, config: Configuration) -> bool {
        self.scheduled.fetch_add(1, Ordering::SeqCst);
        let device = self.device.clone();
        let handle = thread::spawn(move || {
            let engine = InvocationEngine::new();
            let invocation = Invocation::new();
            let inner_rescheduler: Arc<dyn Rescheduler> = Arc::new(NoOpRescheduler);
            let _ = engine.invoke(&invocation, device, config, inner_rescheduler);
        });
        self.handles.lock().unwrap().push(handle);
        true
    }
}

#[derive(Debug, Default)]
struct Recorder {
    starts: Mutex<usize>,
    faileds: Mutex<usize>,
    ends: Mutex<Vec<Duration>>,
    logs: Mutex<Vec<String>>,
}

impl InvocationListener for Recorder {
    fn invocation_started(&self, _build: &BuildInfo) {
        *self.starts.lock().unwrap() += 1;
    }

    fn invocation_failed(&self, _cause: &InvocationFailureCause) {
        *self.faileds.lock().unwrap() += 1;
    }

    fn invocation_ended(&self, elapsed: Duration) {
        self.ends.lock().unwrap().push(elapsed);
    }

    fn test_log(&self, name: &str, _kind: LogDataKind, _data: &[u8]) {
        self.logs.lock().unwrap().push(name.to_string());
    }
}

#[derive(Debug)]
struct SimpleTest {
    ran: Arc<AtomicBool>,
}

impl RemoteTest for SimpleTest {
    fn run(&mut self, _listener: &dyn InvocationListener) -> Result<(), PerformError> {
        self.ran.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
struct FailingPreparer;

impl TargetPreparer for FailingPreparer {
    fn set_up(&self, _device: &Arc<dyn Device>, _build: &BuildInfo) -> Result<(), PerformError> {
        Err(PerformError::Build(BuildError::new("refused by preparer")))
    }
}

/// Fails with `DeviceNotAvailable` exactly once, then succeeds, so the
/// object that survives into the resumed attempt (the engine hands over
/// the *same* `Box<dyn RemoteTest>`, not a clone) reports real progress.
#[derive(Debug)]
struct ResumableTest {
    fail_once: Arc<AtomicBool>,
}

impl RemoteTest for ResumableTest {
    fn run(&mut self, _listener: &dyn InvocationListener) -> Result<(), PerformError> {
        thread::sleep(Duration::from_millis(15));
        if self.fail_once.swap(false, Ordering::SeqCst) {
            Err(PerformError::DeviceNotAvailable(DeviceNotAvailableError::new("ABCD1234")))
        } else {
            Ok(())
        }
    }

    fn as_resumable_mut(&mut self) -> Option<&mut dyn Resumable> {
        Some(self)
    }
}

impl Resumable for ResumableTest {
    fn is_resumable(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct SplittingTest {
    count: usize,
}

impl RemoteTest for SplittingTest {
    fn run(&mut self, _listener: &dyn InvocationListener) -> Result<(), PerformError> {
        unreachable!("a test that split is never run directly")
    }

    fn as_shardable_mut(&mut self) -> Option<&mut dyn Shardable> {
        Some(self)
    }
}

impl Shardable for SplittingTest {
    fn split(&mut self) -> Vec<Box<dyn RemoteTest>> {
        (0..self.count).map(|_| Box::new(LeafTest) as Box<dyn RemoteTest>).collect()
    }
}

#[derive(Debug)]
struct LeafTest;

impl RemoteTest for LeafTest {
    fn run(&mut self, _listener: &dyn InvocationListener) -> Result<(), PerformError> {
        thread::sleep(Duration::from_millis(5));
        Ok(())
    }
}

#[test]
fn happy_path_reports_start_and_end_without_build_not_tested() {
    init_tracing();
    let build = BuildInfo::new("suite", "17");
    let provider = Arc::new(Mutex::new(FakeBuildProvider::with_build(build)));
    let ran = Arc::new(AtomicBool::new(false));
    let test: Box<dyn RemoteTest> = Box::new(SimpleTest { ran: ran.clone() });
    let recorder = Arc::new(Recorder::default());
    let config = Configuration::new(provider.clone(), vec![test]).with_listeners(vec![recorder.clone()]);
    let engine = InvocationEngine::new();
    let invocation = Invocation::new();
    let device: Arc<dyn Device> = Arc::new(FakeDevice::new("ABCD1234"));
    let rescheduler: Arc<dyn Rescheduler> = Arc::new(NoOpRescheduler);

    engine.invoke(&invocation, device, config, rescheduler).unwrap();

    assert!(ran.load(Ordering::SeqCst));
    assert_eq!(*recorder.starts.lock().unwrap(), 1);
    assert_eq!(*recorder.faileds.lock().unwrap(), 0);
    assert_eq!(recorder.ends.lock().unwrap().len(), 1);
    let provider = provider.lock().unwrap();
    assert_eq!(provider.not_tested_calls, 0);
    assert_eq!(provider.clean_up_calls, 1);
}

#[test]
fn build_error_attaches_bugreport_and_skips_build_not_tested() {
    init_tracing();
    let build = BuildInfo::new("suite", "17");
    let provider = Arc::new(Mutex::new(FakeBuildProvider::with_build(build)));
    let test: Box<dyn RemoteTest> = Box::new(SimpleTest {
        ran: Arc::new(AtomicBool::new(false)),
    });
    let recorder = Arc::new(Recorder::default());
    let config = Configuration::new(provider.clone(), vec![test])
        .with_target_preparers(vec![Arc::new(FailingPreparer)])
        .with_listeners(vec![recorder.clone()]);
    let engine = InvocationEngine::new();
    let invocation = Invocation::new();
    let device: Arc<dyn Device> = Arc::new(FakeDevice::new("ABCD1234"));
    let rescheduler: Arc<dyn Rescheduler> = Arc::new(NoOpRescheduler);

    engine.invoke(&invocation, device, config, rescheduler).unwrap();

    assert_eq!(*recorder.starts.lock().unwrap(), 1);
    assert_eq!(*recorder.faileds.lock().unwrap(), 1);
    assert_eq!(recorder.ends.lock().unwrap().len(), 1);
    assert!(recorder.logs.lock().unwrap().contains(&BUILD_ERROR_BUGREPORT.to_string()));
    let provider = provider.lock().unwrap();
    assert_eq!(provider.not_tested_calls, 0, "a BuildError means the build was exercised, not untested");
    assert_eq!(provider.clean_up_calls, 1);
}

#[test]
fn device_loss_resumes_once_and_sums_elapsed_time() {
    init_tracing();
    let build = BuildInfo::new("suite", "17");
    let provider = Arc::new(Mutex::new(FakeBuildProvider::with_build(build)));
    let test: Box<dyn RemoteTest> = Box::new(ResumableTest {
        fail_once: Arc::new(AtomicBool::new(true)),
    });
    let recorder = Arc::new(Recorder::default());
    let config = Configuration::new(provider.clone(), vec![test]).with_listeners(vec![recorder.clone()]);
    let engine = InvocationEngine::new();
    let invocation = Invocation::new();
    let device: Arc<dyn Device> = Arc::new(FakeDevice::new("ABCD1234"));
    let rescheduler = Arc::new(SpawningRescheduler::new(device.clone()));
    let rescheduler_dyn: Arc<dyn Rescheduler> = rescheduler.clone();

    let result = engine.invoke(&invocation, device, config, rescheduler_dyn);
    assert!(result.is_err(), "device loss on the first attempt must reach the caller");
    assert_eq!(*recorder.starts.lock().unwrap(), 1, "only one invocation_started across the whole resume");
    assert_eq!(*recorder.faileds.lock().unwrap(), 0, "a successfully scheduled resume suppresses invocation_failed");
    assert!(recorder.ends.lock().unwrap().is_empty(), "invocation_ended is deferred to the resumed attempt");

    rescheduler.join_all();

    let ends = recorder.ends.lock().unwrap();
    assert_eq!(ends.len(), 1, "exactly one terminal invocation_ended for the whole resumed invocation");
    assert!(ends[0] >= Duration::from_millis(25), "elapsed sums the failed attempt and the resumed one");
    assert_eq!(
        provider.lock().unwrap().not_tested_calls,
        0,
        "a scheduled resume must not report build_not_tested"
    );
}

#[test]
fn sharding_joins_shard_results_into_one_logical_invocation() {
    init_tracing();
    let build = BuildInfo::new("suite", "17");
    let provider = Arc::new(Mutex::new(FakeBuildProvider::with_build(build)));
    let tests: Vec<Box<dyn RemoteTest>> = vec![Box::new(SplittingTest { count: 3 }), Box::new(SplittingTest { count: 2 })];
    let recorder = Arc::new(Recorder::default());
    let config = Configuration::new(provider.clone(), tests).with_listeners(vec![recorder.clone()]);
    let engine = InvocationEngine::new();
    let invocation = Invocation::new();
    let device: Arc<dyn Device> = Arc::new(FakeDevice::new("ABCD1234"));
    let rescheduler = Arc::new(SpawningRescheduler::new(device.clone()));
    let rescheduler_dyn: Arc<dyn Rescheduler> = rescheduler.clone();

    engine.invoke(&invocation, device, config, rescheduler_dyn).unwrap();
    rescheduler.join_all();

    assert_eq!(
        rescheduler.scheduled.load(Ordering::SeqCst),
        5,
        "two splits of 3 and 2 children produce five shard configs"
    );
    assert_eq!(*recorder.starts.lock().unwrap(), 1, "only the first shard's start reaches the downstream listener");
    let ends = recorder.ends.lock().unwrap();
    assert_eq!(ends.len(), 1, "invocation_ended fires once, after the last of the five shards reports in");
    assert!(ends[0] >= Duration::from_millis(25), "elapsed is the sum across all five shard children");
}
