//! The invocation configuration (§3): the build provider, target preparers,
//! tests, listeners, log output, device recovery, and the typed-plus-passthrough
//! option bags that parameterize a single invocation attempt.

use crate::contracts::{BuildProvider, RemoteTest, TargetPreparer};
use crate::device::DeviceRecovery;
use crate::listener::InvocationListener;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Where a test's log output goes. Implementations are expected to be cheap
/// to construct fresh: [`clone_box`] returns an independent, empty resource
/// rather than a copy of accumulated content, mirroring the way a shard
/// child or a resumed attempt gets its own log rather than inheriting the
/// parent's.
///
/// [`clone_box`]: LogOutput::clone_box
pub trait LogOutput: fmt::Debug + Send {
    /// A human-readable name, used when reporting this output to listeners
    /// and when dumping it to the global log registry.
    fn name(&self) -> &str;

    /// Prepare the output for writing. Called once, before any `append`.
    fn init(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn append(&mut self, data: &[u8]);

    /// Everything written so far. Used to report the log to listeners and
    /// to dump a build-error bugreport.
    fn contents(&self) -> Vec<u8>;

    /// Release any resources. Further `append` calls are silently dropped.
    fn close(&mut self);

    fn clone_box(&self) -> Box<dyn LogOutput>;
}

impl Clone for Box<dyn LogOutput> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// An in-memory [`LogOutput`], sufficient as the default and for tests.
#[derive(Debug, Default)]
pub struct InMemoryLogOutput {
    name: String,
    buffer: Vec<u8>,
    closed: bool,
}

impl InMemoryLogOutput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buffer: Vec::new(),
            closed: false,
        }
    }
}

impl LogOutput for InMemoryLogOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn append(&mut self, data: &[u8]) {
        if !self.closed {
            self.buffer.extend_from_slice(data);
        }
    }

    fn contents(&self) -> Vec<u8> {
        self.buffer.clone()
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn clone_box(&self) -> Box<dyn LogOutput> {
        Box::new(InMemoryLogOutput::new(self.name.clone()))
    }
}

/// Typed core fields plus a passthrough bag for device-specific knobs that
/// have no first-class representation here.
#[derive(Clone, Debug, Default)]
pub struct DeviceOptions {
    pub boot_timeout: Option<Duration>,
    pub extra: BTreeMap<String, String>,
}

/// Typed core fields plus a passthrough bag for invocation-wide knobs, such
/// as a sharding hint honored by [`Shardable`](crate::contracts::Shardable)
/// tests.
#[derive(Clone, Debug, Default)]
pub struct CommandOptions {
    pub shard_count_hint: Option<usize>,
    pub invocation_timeout: Option<Duration>,
    pub extra: BTreeMap<String, String>,
}

/// Everything the engine needs to run one invocation attempt.
///
/// Not `Clone`: a `Configuration` is either driven to completion by the
/// engine or consumed into shard/resume children via [`fork_for_shard`] and
/// [`fork_for_resume`], never duplicated wholesale, since `tests` is a
/// `Vec<Box<dyn RemoteTest>>` with no meaningful shared-copy semantics.
///
/// [`fork_for_shard`]: Configuration::fork_for_shard
/// [`fork_for_resume`]: Configuration::fork_for_resume
#[derive(Debug)]
pub struct Configuration {
    pub build_provider: Arc<Mutex<dyn BuildProvider>>,
    pub target_preparers: Vec<Arc<dyn TargetPreparer>>,
    pub tests: Vec<Box<dyn RemoteTest>>,
    pub listeners: Vec<Arc<dyn InvocationListener>>,
    pub log_output: Box<dyn LogOutput>,
    pub device_recovery: Arc<dyn DeviceRecovery>,
    pub device_options: DeviceOptions,
    pub command_options: CommandOptions,
}

impl Configuration {
    /// Construct a configuration with the minimum a caller must supply;
    /// everything else defaults (no preparers, no listeners, an in-memory
    /// log named `"invocation"`, and [`NoOpRecovery`](crate::device::NoOpRecovery)).
    pub fn new(build_provider: Arc<Mutex<dyn BuildProvider>>, tests: Vec<Box<dyn RemoteTest>>) -> Self {
        Self {
            build_provider,
            target_preparers: Vec::new(),
            tests,
            listeners: Vec::new(),
            log_output: Box::new(InMemoryLogOutput::new("invocation")),
            device_recovery: Arc::new(crate::device::NoOpRecovery),
            device_options: DeviceOptions::default(),
            command_options: CommandOptions::default(),
        }
    }

    pub fn with_target_preparers(mut self, preparers: Vec<Arc<dyn TargetPreparer>>) -> Self {
        self.target_preparers = preparers;
        self
    }

    pub fn with_listeners(mut self, listeners: Vec<Arc<dyn InvocationListener>>) -> Self {
        self.listeners = listeners;
        self
    }

    pub fn with_log_output(mut self, log_output: Box<dyn LogOutput>) -> Self {
        self.log_output = log_output;
        self
    }

    pub fn with_device_recovery(mut self, device_recovery: Arc<dyn DeviceRecovery>) -> Self {
        self.device_recovery = device_recovery;
        self
    }

    pub fn with_device_options(mut self, device_options: DeviceOptions) -> Self {
        self.device_options = device_options;
        self
    }

    pub fn with_command_options(mut self, command_options: CommandOptions) -> Self {
        self.command_options = command_options;
        self
    }

    /// Build a one-test child configuration for a shard, sharing the
    /// original's preparers, log shape, device recovery, and options but
    /// getting its own build provider (typically an
    /// [`ExistingBuildProvider`](crate::contracts::ExistingBuildProvider)
    /// serving the already-fetched build) and its own single listener
    /// (typically a `ShardListener` fanning into the shared aggregator).
    pub fn fork_for_shard(
        &self,
        test: Box<dyn RemoteTest>,
        build_provider: Arc<Mutex<dyn BuildProvider>>,
        listener: Arc<dyn InvocationListener>,
    ) -> Configuration {
        Configuration {
            build_provider,
            target_preparers: self.target_preparers.clone(),
            tests: vec![test],
            listeners: vec![listener],
            log_output: self.log_output.clone_box(),
            device_recovery: self.device_recovery.clone(),
            device_options: self.device_options.clone(),
            command_options: self.command_options.clone(),
        }
    }

    /// Build a resumed attempt carrying the *entire* original test list
    /// forward (unlike sharding, which narrows to one test). `tests` is
    /// taken by the caller via [`std::mem::take`] from the original
    /// configuration's `tests` field before calling this, since
    /// `Box<dyn RemoteTest>` has no meaningful shared-copy semantics and the
    /// original configuration is done with its tests once a resume is
    /// underway.
    pub fn fork_for_resume(
        &self,
        tests: Vec<Box<dyn RemoteTest>>,
        build_provider: Arc<Mutex<dyn BuildProvider>>,
        listener: Arc<dyn InvocationListener>,
    ) -> Configuration {
        Configuration {
            build_provider,
            target_preparers: self.target_preparers.clone(),
            tests,
            listeners: vec![listener],
            log_output: self.log_output.clone_box(),
            device_recovery: self.device_recovery.clone(),
            device_options: self.device_options.clone(),
            command_options: self.command_options.clone(),
        }
    }

    /// A fresh fan-out over this configuration's listener list (§4.3.4:
    /// "a fresh Result Forwarder over the configuration's listener list").
    pub fn forwarder(&self) -> crate::listener::ResultForwarder {
        crate::listener::ResultForwarder::new(self.listeners.clone())
    }
}
