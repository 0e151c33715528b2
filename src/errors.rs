//! Error taxonomy for the invocation engine.
//!
//! Each failure domain gets its own type, following the "one focused error
//! per call site" shape used throughout this crate rather than a single
//! stringly-typed error. [`InvocationFailureCause`] is the union the engine
//! actually hands to listeners; [`PerformError`] is the narrower union a
//! preparer or test can raise during [`crate::engine::InvocationEngine::invoke`].

use crate::build_info::BuildInfo;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The build provider could not produce a build at all.
///
/// Carries whatever partial [`BuildInfo`] the provider managed to construct
/// before failing, so listeners can still report *something* identifiable.
#[derive(Debug, Error)]
#[error("failed to retrieve build for `{}`", build_info.test_tag())]
pub struct BuildRetrievalError {
    pub build_info: BuildInfo,
    #[source]
    pub source: Option<BoxError>,
}

impl BuildRetrievalError {
    pub fn new(build_info: BuildInfo, source: impl Into<BoxError>) -> Self {
        Self {
            build_info,
            source: Some(source.into()),
        }
    }
}

/// A preparer or test refused the build under test.
///
/// This is the "expected" kind of test-setup failure: the build itself was
/// exercised, it just didn't pass muster. It does **not** cause
/// `build_not_tested` to be signalled.
#[derive(Debug, Error)]
#[error("build error: {message}")]
pub struct BuildError {
    pub message: String,
    #[source]
    pub source: Option<BoxError>,
}

impl BuildError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }
}

/// The target environment could not be prepared for testing.
#[derive(Debug, Error)]
#[error("target setup error: {message}")]
pub struct TargetSetupError {
    pub message: String,
    #[source]
    pub source: Option<BoxError>,
}

impl TargetSetupError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }
}

/// The device was lost mid-invocation.
#[derive(Debug, Error)]
#[error("device `{device_serial}` is no longer available")]
pub struct DeviceNotAvailableError {
    pub device_serial: String,
    #[source]
    pub source: Option<BoxError>,
}

impl DeviceNotAvailableError {
    pub fn new(device_serial: impl Into<String>) -> Self {
        Self {
            device_serial: device_serial.into(),
            source: None,
        }
    }
}

/// A programmer error or other fault that isn't part of the normal taxonomy.
///
/// Preparers, tests, and listeners are all external collaborators; this
/// variant is how their panics and unmodeled errors surface to the engine
/// without widening every other error type.
#[derive(Debug, Error)]
#[error("unexpected fault: {message}")]
pub struct UnexpectedFault {
    pub message: String,
    #[source]
    pub source: Option<BoxError>,
}

impl UnexpectedFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Build an `UnexpectedFault` out of a caught panic payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with non-string payload".to_string()
        };
        Self::new(message)
    }
}

/// The union of faults a preparer or test's `run`/`set_up` may raise.
///
/// Deliberately narrower than [`InvocationFailureCause`]: build retrieval
/// can only fail during the engine's own build-fetch step, never from
/// inside a preparer or test.
#[derive(Debug, Error)]
pub enum PerformError {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    TargetSetup(#[from] TargetSetupError),
    #[error(transparent)]
    DeviceNotAvailable(#[from] DeviceNotAvailableError),
    #[error(transparent)]
    Unexpected(#[from] UnexpectedFault),
}

/// The cause reported to listeners via `invocation_failed`.
#[derive(Debug, Error)]
pub enum InvocationFailureCause {
    #[error(transparent)]
    BuildRetrieval(#[from] BuildRetrievalError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    TargetSetup(#[from] TargetSetupError),
    #[error(transparent)]
    DeviceNotAvailable(#[from] DeviceNotAvailableError),
    #[error(transparent)]
    Unexpected(#[from] UnexpectedFault),
}

impl InvocationFailureCause {
    /// Whether `build_not_tested` must be suppressed for this cause.
    ///
    /// Only a [`BuildError`] exercises the build without exonerating it;
    /// every other cause means the build was never meaningfully tested.
    pub fn is_build_error(&self) -> bool {
        matches!(self, InvocationFailureCause::Build(_))
    }
}

impl From<PerformError> for InvocationFailureCause {
    fn from(err: PerformError) -> Self {
        match err {
            PerformError::Build(e) => InvocationFailureCause::Build(e),
            PerformError::TargetSetup(e) => InvocationFailureCause::TargetSetup(e),
            PerformError::DeviceNotAvailable(e) => InvocationFailureCause::DeviceNotAvailable(e),
            PerformError::Unexpected(e) => InvocationFailureCause::Unexpected(e),
        }
    }
}

/// A malformed command file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigurationError {
    #[error("{path}:{line}: unterminated quoted string")]
    UnterminatedQuote { path: String, line: usize },

    #[error("{path}:{line}: trailing unescaped backslash")]
    TrailingBackslash { path: String, line: usize },

    #[error("{path}:{line}: MACRO `{name}` has an empty replacement list")]
    EmptyMacroBody { path: String, line: usize, name: String },

    #[error("{path}:{line}: invalid macro name `{name}`")]
    InvalidMacroName { path: String, line: usize, name: String },

    #[error("{path}: LONG MACRO `{name}` starting at line {line} was never closed with END MACRO")]
    UnterminatedLongMacro { path: String, line: usize, name: String },

    #[error("{path}:{line}: call to unknown macro `{name}()`")]
    UnknownMacro { path: String, line: usize, name: String },

    #[error("{path}:{line}: END MACRO with no matching LONG MACRO")]
    UnmatchedEndMacro { path: String, line: usize },

    #[error("{path}:{line}: INCLUDE requires exactly one path argument")]
    MalformedInclude { path: String, line: usize },

    #[error("could not resolve or open `{path}`")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

