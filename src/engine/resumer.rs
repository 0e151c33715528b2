//! The resumer (C4): given a failed invocation holding a resumable test,
//! builds a continuation configuration and hands it to the rescheduler.

use crate::build_info::BuildInfo;
use crate::config::Configuration;
use crate::contracts::{BuildProvider, ExistingBuildProvider, Rescheduler};
use crate::listener::{InvocationListener, ResumeForwarder};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) struct Resumer;

impl Resumer {
    /// Scans `config.tests` in order for the first test that is both
    /// `Resumable` and currently reports `is_resumable() == true`; per the
    /// spec's recorded open-question decision, the scan stops at the first
    /// match even if later tests are also resumable — one resume per failed
    /// invocation, not a search for the "best" candidate.
    ///
    /// Returns `true` iff a resume was actually scheduled.
    pub(crate) fn try_resume(
        config: &mut Configuration,
        build: &BuildInfo,
        rescheduler: &Arc<dyn Rescheduler>,
        elapsed_before: Duration,
    ) -> bool {
        let found = config
            .tests
            .iter_mut()
            .any(|test| test.as_resumable_mut().map(|r| r.is_resumable()).unwrap_or(false));
        if !found {
            return false;
        }

        let tests = std::mem::take(&mut config.tests);
        let child_build = build.clone_for_new_invocation();
        let existing_provider: Arc<Mutex<dyn BuildProvider>> = Arc::new(Mutex::new(
            ExistingBuildProvider::new(child_build.clone_for_new_invocation(), config.build_provider.clone()),
        ));
        let resume_listener: Arc<dyn InvocationListener> =
            Arc::new(ResumeForwarder::new(config.listeners.clone(), elapsed_before));

        let resumed_config = config.fork_for_resume(tests, existing_provider, resume_listener);

        if rescheduler.schedule_config(resumed_config) {
            tracing::info!("invocation resumed after device loss");
            true
        } else {
            tracing::warn!("rescheduler refused the resumed configuration; cleaning up its build");
            config.build_provider.lock().unwrap().clean_up(&child_build);
            false
        }
    }
}
