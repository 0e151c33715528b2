//! The shard aggregator (C2) and the per-shard listener (C1 specialisation)
//! that feeds it.

use super::forwarder::ResultForwarder;
use super::{InvocationListener, LogDataKind, TestId};
use crate::build_info::BuildInfo;
use crate::errors::InvocationFailureCause;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct AggregatorState {
    started_emitted: bool,
    ended_count: usize,
    elapsed_sum: Duration,
}

/// Joins `shard_count` sub-invocations into one logical invocation for a
/// shared set of downstream listeners.
///
/// Written concurrently by one thread per shard; [`AggregatorState`] lives
/// behind a mutex. Listener fan-out happens while the lock for the relevant
/// transition (start, end) is *not* held — only the counters are protected —
/// so a slow downstream listener cannot block other shards from recording
/// their completion.
#[derive(Debug)]
pub struct ShardAggregator {
    listeners: ResultForwarder,
    shard_count: usize,
    state: Mutex<AggregatorState>,
}

impl ShardAggregator {
    /// `shard_count` must be the total number of shard children (splits
    /// plus any tests that declined to split), never zero.
    pub fn new(listeners: Vec<Arc<dyn InvocationListener>>, shard_count: usize) -> Arc<Self> {
        assert!(shard_count > 0, "a sharded invocation must have at least one shard");
        Arc::new(Self {
            listeners: ResultForwarder::new(listeners),
            shard_count,
            state: Mutex::new(AggregatorState::default()),
        })
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    /// The first shard to call this forwards `invocation_started`;
    /// subsequent calls are dropped.
    pub(crate) fn shard_started(&self, build: &BuildInfo) {
        {
            let mut state = self.state.lock().unwrap();
            if state.started_emitted {
                return;
            }
            state.started_emitted = true;
        }
        self.listeners.invocation_started(build);
    }

    /// Forwarded immediately; downstream decides what a per-shard failure
    /// means for the run as a whole.
    pub(crate) fn shard_failed(&self, cause: &InvocationFailureCause) {
        self.listeners.invocation_failed(cause);
    }

    /// Accumulates elapsed time and shard count; forwards
    /// `invocation_ended(sum)` once every shard has reported in.
    pub(crate) fn shard_ended(&self, elapsed: Duration) {
        let total = {
            let mut state = self.state.lock().unwrap();
            state.ended_count += 1;
            state.elapsed_sum += elapsed;
            (state.ended_count >= self.shard_count).then_some(state.elapsed_sum)
        };
        if let Some(total) = total {
            self.listeners.invocation_ended(total);
        }
    }

    /// Per-test events pass straight through; ordering within a shard is
    /// preserved by the single-thread-per-shard execution model, but
    /// ordering across shards is not guaranteed.
    pub(crate) fn passthrough(&self) -> &ResultForwarder {
        &self.listeners
    }
}

/// The listener a shard's own engine reports to; forwards start/end/failure
/// through the shared [`ShardAggregator`] and everything else straight to
/// its downstream listeners.
#[derive(Debug, Clone)]
pub struct ShardListener {
    aggregator: Arc<ShardAggregator>,
}

impl ShardListener {
    pub fn new(aggregator: Arc<ShardAggregator>) -> Self {
        Self { aggregator }
    }
}

impl InvocationListener for ShardListener {
    fn invocation_started(&self, build: &BuildInfo) {
        self.aggregator.shard_started(build);
    }

    fn invocation_failed(&self, cause: &InvocationFailureCause) {
        self.aggregator.shard_failed(cause);
    }

    fn invocation_ended(&self, elapsed: Duration) {
        self.aggregator.shard_ended(elapsed);
    }

    fn test_run_started(&self, run_name: &str) {
        self.aggregator.passthrough().test_run_started(run_name);
    }

    fn test_started(&self, test_id: &TestId) {
        self.aggregator.passthrough().test_started(test_id);
    }

    fn test_failed(&self, test_id: &TestId, trace: &str) {
        self.aggregator.passthrough().test_failed(test_id, trace);
    }

    fn test_ended(&self, test_id: &TestId) {
        self.aggregator.passthrough().test_ended(test_id);
    }

    fn test_run_ended(&self, elapsed: Duration) {
        self.aggregator.passthrough().test_run_ended(elapsed);
    }

    fn test_log(&self, name: &str, kind: LogDataKind, data: &[u8]) {
        self.aggregator.passthrough().test_log(name, kind, data);
    }

    fn test_run_failed(&self, message: &str) {
        self.aggregator.passthrough().test_run_failed(message);
    }

    fn test_run_stopped(&self, elapsed: Duration) {
        self.aggregator.passthrough().test_run_stopped(elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::thread;

    #[derive(Debug, Default)]
    struct Recorder {
        starts: StdMutex<usize>,
        ends: StdMutex<Vec<Duration>>,
    }

    impl InvocationListener for Recorder {
        fn invocation_started(&self, _build: &BuildInfo) {
            *self.starts.lock().unwrap() += 1;
        }
        fn invocation_ended(&self, elapsed: Duration) {
            self.ends.lock().unwrap().push(elapsed);
        }
    }

    #[test]
    fn only_first_shard_start_is_forwarded() {
        let recorder = Arc::new(Recorder::default());
        let aggregator = ShardAggregator::new(vec![recorder.clone()], 3);
        let build = BuildInfo::new("suite", "1");
        for _ in 0..3 {
            aggregator.shard_started(&build);
        }
        assert_eq!(*recorder.starts.lock().unwrap(), 1);
    }

    #[test]
    fn ended_fires_once_with_summed_elapsed() {
        let recorder = Arc::new(Recorder::default());
        let aggregator = ShardAggregator::new(vec![recorder.clone()], 3);
        aggregator.shard_ended(Duration::from_millis(10));
        aggregator.shard_ended(Duration::from_millis(20));
        assert!(recorder.ends.lock().unwrap().is_empty());
        aggregator.shard_ended(Duration::from_millis(30));
        assert_eq!(*recorder.ends.lock().unwrap(), vec![Duration::from_millis(60)]);
    }

    #[test]
    fn concurrent_shards_still_sum_to_total() {
        let recorder = Arc::new(Recorder::default());
        let aggregator = ShardAggregator::new(vec![recorder.clone()], 5);
        let handles: Vec<_> = (0..5)
            .map(|i| {
                let aggregator = aggregator.clone();
                thread::spawn(move || aggregator.shard_ended(Duration::from_millis(i * 10)))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*recorder.ends.lock().unwrap(), vec![Duration::from_millis(100)]);
    }
}
