// Copyright (c) The baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    abort::{AbortController, AbortSignal},
    errors::Aborted,
    tree::TestSuite,
};
use future_queue::StreamExt as _;
use futures::prelude::*;
use regex::Regex;
use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
};
use tracing::{debug, warn};

/// Runs bounded-parallelism sweeps over pending suites.
///
/// A sweep pulls suites off the given iterable and starts each one's `exec`
/// until `max_parallel` are in flight, then starts more as executions
/// settle. Suites failing the suite filter are skipped immediately and never
/// executed. Per-suite failures are already recorded in the tree by `exec`
/// and do not stop the sweep.
///
/// A manager is reusable, last call wins: a fresh `exec` call aborts any
/// sweep still in flight before starting its own.
#[derive(Debug)]
pub struct TestRunManager {
    max_parallel: AtomicUsize,
    state: Mutex<ManagerState>,
}

#[derive(Debug, Default)]
struct ManagerState {
    current: Option<Arc<AbortController>>,
}

impl TestRunManager {
    /// Creates a manager with `max_parallel` set to the host parallelism
    /// hint.
    pub fn new() -> Self {
        let max_parallel = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self {
            max_parallel: AtomicUsize::new(max_parallel),
            state: Mutex::new(ManagerState::default()),
        }
    }

    /// The number of suites allowed to execute simultaneously.
    pub fn max_parallel(&self) -> usize {
        self.max_parallel.load(Ordering::Relaxed)
    }

    /// Sets the parallelism bound for subsequent sweeps. Clamped to at
    /// least 1.
    pub fn set_max_parallel(&self, max_parallel: usize) {
        self.max_parallel
            .store(max_parallel.max(1), Ordering::Relaxed);
    }

    /// Aborts the sweep currently in flight, if any.
    ///
    /// Suites not yet started are skipped rather than started; suites
    /// mid-execution transition to `skipped` as soon as their executor
    /// observes the signal. The sweep's `exec` call then rejects with the
    /// abort value.
    pub fn abort(&self, reason: Option<&str>) {
        let state = self.lock_state();
        if let Some(controller) = &state.current {
            controller.abort(reason);
        }
    }

    /// Executes every suite in `suites`, at most `max_parallel` at a time.
    ///
    /// Suites whose URL fails `filter_suites` are `skip`ped synchronously
    /// and never enter the queue. `filter_tests` is passed through to every
    /// suite's conductor. Returns `Err` with the abort value if this sweep's
    /// signal fired -- through [`abort`](Self::abort) or by being superseded
    /// by a later `exec` call.
    pub async fn exec(
        &self,
        suites: impl IntoIterator<Item = TestSuite>,
        filter_suites: Option<&Regex>,
        filter_tests: Option<&Regex>,
    ) -> Result<(), Aborted> {
        let signal = self.begin_sweep();

        // Apply the suite filter up front: mismatches never execute.
        let mut selected = Vec::new();
        for suite in suites {
            let url = suite.url();
            if filter_suites.is_none_or(|filter| filter.is_match(&url)) {
                selected.push(suite);
            } else {
                debug!(suite = %url, "suite filtered out, skipping");
                if let Err(error) = suite.skip() {
                    warn!(suite = %url, %error, "filtered suite was not pending");
                }
            }
        }

        let max_parallel = self.max_parallel();
        debug!(
            suites = selected.len(),
            max_parallel, "starting suite sweep"
        );

        futures::stream::iter(selected.into_iter().map(|suite| {
            let signal = signal.clone();
            let filter_tests = filter_tests.cloned();
            (1, move |_cx| async move {
                Self::run_one(suite, filter_tests, signal).await;
            })
        }))
        .future_queue(max_parallel)
        .collect::<()>()
        .await;

        match signal.aborted() {
            Some(aborted) => Err(aborted),
            None => Ok(()),
        }
    }

    /// Installs a fresh abort controller, cancelling the previous sweep.
    fn begin_sweep(&self) -> AbortSignal {
        let mut state = self.lock_state();
        if let Some(previous) = state.current.take() {
            previous.abort(Some("superseded by a new exec call"));
        }
        let controller = Arc::new(AbortController::new());
        let signal = controller.signal();
        state.current = Some(controller);
        signal
    }

    async fn run_one(suite: TestSuite, filter_tests: Option<Regex>, signal: AbortSignal) {
        if signal.is_aborted() {
            // The sweep was cancelled before this suite's turn came up:
            // skip it rather than start it.
            if let Err(error) = suite.skip() {
                debug!(suite = %suite.url(), %error, "suite not skippable after abort");
            }
            return;
        }
        match suite.exec(filter_tests.as_ref(), Some(signal)).await {
            Ok(()) => {}
            Err(error) => {
                // Suite-level failures are recorded in the tree by exec;
                // aborts settle the sweep result after the queue drains.
                debug!(suite = %suite.url(), %error, "suite exec did not complete");
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TestRunManager {
    fn default() -> Self {
        Self::new()
    }
}
