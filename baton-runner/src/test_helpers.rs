// Copyright (c) The baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted conductors for exercising the protocol without real processes.

use crate::{
    abort::AbortSignal,
    conductor::TestConductor,
    errors::ConductorError,
    tree::SuiteReporter,
};
use baton_metadata::SuiteMessage;
use futures::future::BoxFuture;
use regex::Regex;
use smol_str::SmolStr;
use std::sync::Arc;

/// A conductor driven by a closure. The closure receives everything
/// `run_test_suite` does and returns the future to run.
pub(crate) struct FnConductor<F> {
    name: &'static str,
    run: F,
}

impl<F> FnConductor<F>
where
    F: Fn(
            SuiteReporter,
            SmolStr,
            Option<Regex>,
            Option<AbortSignal>,
        ) -> BoxFuture<'static, Result<(), ConductorError>>
        + Send
        + Sync,
{
    pub(crate) fn new(name: &'static str, run: F) -> Arc<Self> {
        Arc::new(Self { name, run })
    }
}

impl<F> TestConductor for FnConductor<F>
where
    F: Fn(
            SuiteReporter,
            SmolStr,
            Option<Regex>,
            Option<AbortSignal>,
        ) -> BoxFuture<'static, Result<(), ConductorError>>
        + Send
        + Sync,
{
    fn name(&self) -> &str {
        self.name
    }

    fn run_test_suite(
        &self,
        reporter: SuiteReporter,
        suite_url: SmolStr,
        filter: Option<Regex>,
        signal: Option<AbortSignal>,
    ) -> BoxFuture<'_, Result<(), ConductorError>> {
        (self.run)(reporter, suite_url, filter, signal)
    }
}

/// A conductor that applies a fixed list of wire messages and resolves.
pub(crate) struct ScriptedConductor {
    name: &'static str,
    script: Vec<SuiteMessage>,
}

impl ScriptedConductor {
    pub(crate) fn new(name: &'static str, script: Vec<SuiteMessage>) -> Arc<Self> {
        Arc::new(Self { name, script })
    }
}

impl TestConductor for ScriptedConductor {
    fn name(&self) -> &str {
        self.name
    }

    fn run_test_suite(
        &self,
        reporter: SuiteReporter,
        _suite_url: SmolStr,
        _filter: Option<Regex>,
        _signal: Option<AbortSignal>,
    ) -> BoxFuture<'_, Result<(), ConductorError>> {
        let script = self.script.clone();
        Box::pin(async move {
            for message in script {
                reporter.handle_message(message)?;
            }
            Ok(())
        })
    }
}

/// A conductor whose execution never settles on its own; abort tests hang
/// suites on it.
pub(crate) struct StalledConductor {
    name: &'static str,
}

impl StalledConductor {
    pub(crate) fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self { name })
    }
}

impl TestConductor for StalledConductor {
    fn name(&self) -> &str {
        self.name
    }

    fn run_test_suite(
        &self,
        _reporter: SuiteReporter,
        _suite_url: SmolStr,
        _filter: Option<Regex>,
        _signal: Option<AbortSignal>,
    ) -> BoxFuture<'_, Result<(), ConductorError>> {
        Box::pin(std::future::pending())
    }
}

/// A conductor that rejects immediately with a transport error.
pub(crate) struct FailingConductor {
    name: &'static str,
    message: &'static str,
}

impl FailingConductor {
    pub(crate) fn new(name: &'static str, message: &'static str) -> Arc<Self> {
        Arc::new(Self { name, message })
    }
}

impl TestConductor for FailingConductor {
    fn name(&self) -> &str {
        self.name
    }

    fn run_test_suite(
        &self,
        _reporter: SuiteReporter,
        _suite_url: SmolStr,
        _filter: Option<Regex>,
        _signal: Option<AbortSignal>,
    ) -> BoxFuture<'_, Result<(), ConductorError>> {
        let message = self.message;
        Box::pin(async move { Err(ConductorError::Transport(message.to_owned())) })
    }
}
