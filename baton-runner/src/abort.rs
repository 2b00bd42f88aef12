// Copyright (c) The baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cooperative cancellation for sweeps and suite executions.
//!
//! A [`TestRunManager`](crate::runner::TestRunManager) sweep and every suite
//! execution it starts share one abort pair. Cancellation is advisory: a
//! conductor may ignore the signal entirely, so the orchestrator's own state
//! transitions never wait on remote acknowledgement -- an aborted suite is
//! `skipped` the moment its executor observes the signal, and stray reports
//! arriving later are rejected by the suite's state guard.

use crate::errors::Aborted;
use tokio::sync::watch;

/// Owner side of an abort pair.
#[derive(Debug)]
pub struct AbortController {
    tx: watch::Sender<Option<Aborted>>,
}

impl AbortController {
    /// Creates a controller with no abort requested.
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(None),
        }
    }

    /// Returns a signal observing this controller.
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Requests cancellation. The first call wins; later calls are no-ops.
    pub fn abort(&self, reason: Option<&str>) {
        self.tx.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(Aborted {
                reason: reason.map(str::to_owned),
            });
            true
        });
    }

    /// Returns true if [`abort`](Self::abort) has been called.
    pub fn is_aborted(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of an abort pair. Cheap to clone; every clone observes the
/// same controller.
#[derive(Clone, Debug)]
pub struct AbortSignal {
    rx: watch::Receiver<Option<Aborted>>,
}

impl AbortSignal {
    /// Returns true if the controller has aborted.
    pub fn is_aborted(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Returns the abort value, if the controller has aborted.
    pub fn aborted(&self) -> Option<Aborted> {
        self.rx.borrow().clone()
    }

    /// Resolves once the controller aborts.
    ///
    /// Stays pending forever if the controller is dropped without aborting,
    /// so `select!` callers fall through to their other branches.
    pub async fn triggered(&mut self) -> Aborted {
        if let Ok(value) = self.rx.wait_for(Option::is_some).await {
            return value.clone().expect("wait_for guarantees Some");
        }
        std::future::pending().await
    }
}
