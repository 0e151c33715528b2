//! Invocation engine for a device-based test harness.
//!
//! [`engine::InvocationEngine`] drives one invocation's lifecycle: fetch a
//! build, inject it into tests, shard if any test splits, otherwise prepare
//! the target and run tests, then report and clean up — rescheduling shard
//! children and resumed attempts through a [`contracts::Rescheduler`] rather
//! than running them itself. [`command_file`] is the second independent
//! algorithm in this crate: a macro/include-aware parser that feeds a
//! scheduler (out of scope here) the argument vectors an invocation is
//! eventually built from.
//!
//! Device acquisition/recovery, concrete build providers, target preparers,
//! remote tests, and the command scheduler are all external collaborators;
//! this crate specifies and drives only their contracts (see
//! [`contracts`] and [`device`]).

pub mod build_info;
pub mod command_file;
pub mod config;
pub mod contracts;
pub mod device;
pub mod engine;
pub mod errors;
pub mod listener;
pub mod log_registry;
mod time;

pub use build_info::BuildInfo;
pub use config::Configuration;
pub use engine::{Invocation, InvocationEngine};
