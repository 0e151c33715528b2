//! Stopwatch for tracking how long an invocation takes.
//!
//! Invocations need to track a start time and a duration. For that we use a
//! combination of a wall-clock timestamp (for display) and a monotonic
//! `Instant` (for the actual elapsed-time arithmetic that feeds
//! `invocation_ended` and shard/resume summation).

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

pub(crate) fn stopwatch() -> StopwatchStart {
    StopwatchStart::new()
}

/// A running stopwatch, started at construction.
#[derive(Clone, Debug)]
pub(crate) struct StopwatchStart {
    start_time: DateTime<Local>,
    instant: Instant,
}

impl StopwatchStart {
    fn new() -> Self {
        Self {
            // These two syscalls happen imperceptibly close to each other,
            // which is good enough for our purposes.
            start_time: Local::now(),
            instant: Instant::now(),
        }
    }

    pub(crate) fn snapshot(&self) -> StopwatchSnapshot {
        StopwatchSnapshot {
            start_time: self.start_time,
            elapsed: self.instant.elapsed(),
        }
    }
}

/// A snapshot of the state of the stopwatch.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StopwatchSnapshot {
    /// The time at which the stopwatch was started.
    #[allow(dead_code)]
    pub(crate) start_time: DateTime<Local>,

    /// The amount of elapsed time since the stopwatch was started.
    pub(crate) elapsed: Duration,
}
