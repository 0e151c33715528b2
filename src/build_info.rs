//! The [`BuildInfo`] data model: opaque build identity plus attributes.

use std::collections::BTreeMap;
use std::fmt;

/// Sentinel used when a build was fetched without an id.
///
/// Distinguishes "build fetched without an id" from a build that is
/// genuinely named `"unknown"` by its provider.
pub const UNKNOWN_BUILD_ID: &str = "(unknown build id)";

/// Opaque build identity plus key/value attributes.
///
/// `device_serial` is mutated exactly once, by the engine, immediately
/// before an invocation starts (see
/// [`crate::engine::InvocationEngine::invoke`]); every other field is set at
/// construction and is read-only for the rest of the build's lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildInfo {
    test_tag: String,
    build_id: String,
    device_serial: Option<String>,
    attributes: BTreeMap<String, String>,
}

impl BuildInfo {
    /// Construct a build with a known id.
    pub fn new(test_tag: impl Into<String>, build_id: impl Into<String>) -> Self {
        Self {
            test_tag: test_tag.into(),
            build_id: build_id.into(),
            device_serial: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Construct a build fetched without an id, stamped with
    /// [`UNKNOWN_BUILD_ID`].
    pub fn unidentified(test_tag: impl Into<String>) -> Self {
        Self::new(test_tag, UNKNOWN_BUILD_ID)
    }

    pub fn test_tag(&self) -> &str {
        &self.test_tag
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    /// `true` iff this build was fetched without an id.
    pub fn has_unknown_build_id(&self) -> bool {
        self.build_id == UNKNOWN_BUILD_ID
    }

    pub fn device_serial(&self) -> Option<&str> {
        self.device_serial.as_deref()
    }

    /// Stamp the device serial. Called exactly once, by the engine, before
    /// an invocation starts running against `device`.
    pub(crate) fn set_device_serial(&mut self, serial: impl Into<String>) {
        self.device_serial = Some(serial.into());
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Produce an independent value-copy of this build, safe to own in a
    /// different invocation (e.g. a shard child or a resumed attempt).
    pub fn clone_for_new_invocation(&self) -> Self {
        self.clone()
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.test_tag, self.build_id)
    }
}
