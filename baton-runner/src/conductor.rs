// Copyright (c) The baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The conductor seam: external drivers that execute suites remotely.
//!
//! Concrete conductors live outside this crate -- one might spawn a browser
//! tab, another a subprocess -- and speak some transport (the reference
//! setup POSTs one JSON [`SuiteMessage`](baton_metadata::SuiteMessage) per
//! event) back into the reporter. This module only defines the contract the
//! orchestrator consumes.

use crate::{abort::AbortSignal, errors::ConductorError, tree::SuiteReporter};
use futures::future::BoxFuture;
use regex::Regex;
use smol_str::SmolStr;

/// An external driver that executes one suite's code in a concrete
/// environment and reports structured events back.
///
/// Implementations typically serialize `suite_url`, `filter` and a
/// coverage-variable name into a script executed in the target environment,
/// relay that environment's test-framework events into the reporter (see
/// [`SuiteReporter::handle_message`]), and resolve once the remote side
/// signals completion or the process/page exits. The reporter callbacks may
/// be invoked asynchronously, in any order and interleaving, zero or more
/// times each.
///
/// `signal` is advisory: implementations should stop driving the remote
/// side when it fires, but the orchestrator does not depend on it -- an
/// aborted suite is marked skipped regardless, and reports the remote side
/// produces afterwards are rejected by the suite's state guard.
pub trait TestConductor: Send + Sync {
    /// The conductor's registry name, unique within one run (`"chromium"`,
    /// `"node"`, ...).
    fn name(&self) -> &str;

    /// Drives one suite execution to completion.
    ///
    /// Rejecting here is the transport/process failure path: the caller
    /// converts the error into a suite-level error report rather than
    /// propagating it.
    fn run_test_suite(
        &self,
        reporter: SuiteReporter,
        suite_url: SmolStr,
        filter: Option<Regex>,
        signal: Option<AbortSignal>,
    ) -> BoxFuture<'_, Result<(), ConductorError>>;
}
