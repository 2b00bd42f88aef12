// Copyright (c) The baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by baton.
//!
//! Two of the three failure families of the system live here: contract
//! violations (a conductor or caller drove the tree outside its documented
//! protocol) and transport-level abort/conductor failures. The third family
//! -- remote test failures -- is data, not errors: it is recorded into the
//! tree as [`TestError`](crate::tree::TestError) values and surfaced through
//! indices and events, never through `Err`.

use crate::tree::{NodeKind, SuiteState};
use thiserror::Error;

/// An error that occurred while building a
/// [`TestRunStack`](crate::tree::TestRunStack).
#[derive(Clone, Debug, Error)]
pub enum RunStackBuildError {
    /// Two conductors share a registry name.
    #[error("duplicate conductor name `{name}`")]
    DuplicateConductorName {
        /// The offending name.
        name: String,
    },

    /// The same suite URL was listed twice.
    #[error("duplicate suite url `{url}`")]
    DuplicateSuiteUrl {
        /// The offending URL.
        url: String,
    },
}

/// A suite was driven outside its current state.
///
/// Suite state is monotonic (`pending -> skipped`, or `pending -> running ->
/// done`); `exec`, `skip` and the reporter callbacks are only legal in the
/// states they document.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
#[error("suite is {actual}, expected {expected}")]
pub struct StateError {
    /// The state the operation requires.
    pub expected: SuiteState,
    /// The state the suite is actually in.
    pub actual: SuiteState,
}

/// A reporter callback violated the conductor protocol.
///
/// These indicate bugs in a conductor implementation (or a remote test
/// framework gone rogue); they are surfaced to the conductor synchronously
/// and are not recorded into the tree.
#[derive(Clone, Debug, Error)]
pub enum ReportError {
    /// The suite was not in the state the callback requires.
    #[error(transparent)]
    State(#[from] StateError),

    /// A `schedule` report redeclared a node id already used in this suite
    /// execution.
    #[error("node id {id} was already declared in this suite execution")]
    DuplicateNodeId {
        /// The redeclared id.
        id: u64,
    },

    /// A report referenced a node id never declared by a `schedule` report.
    #[error("unknown node id {id}")]
    UnknownNodeId {
        /// The unresolved id.
        id: u64,
    },

    /// A report targeted a node of the wrong kind: a `result` against a
    /// group, or an `error` against a test function.
    #[error("node id {id} is a {actual} and cannot accept a {operation} report")]
    NodeKindMismatch {
        /// The targeted id.
        id: u64,
        /// The kind of the node the id resolves to.
        actual: NodeKind,
        /// The report operation that was attempted.
        operation: &'static str,
    },

    /// A second `result` report arrived for a function instance that already
    /// has one. Results are one-shot.
    #[error("node id {id} already has a result")]
    ResultAlreadySet {
        /// The targeted id.
        id: u64,
    },
}

/// The abort value produced when a sweep or suite execution is cancelled
/// through its [`AbortController`](crate::abort::AbortController).
///
/// `exec` rejects with this value itself (not a wrapper) so callers can tell
/// deliberate cancellation apart from suite failure.
#[derive(Clone, Debug, Default, Error)]
#[error("aborted{}", .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
pub struct Aborted {
    /// The reason passed to `abort`, if any.
    pub reason: Option<String>,
}

/// An error returned by [`TestSuite::exec`](crate::tree::TestSuite::exec).
#[derive(Clone, Debug, Error)]
pub enum ExecError {
    /// `exec` was called on a suite that is not pending.
    #[error(transparent)]
    State(#[from] StateError),

    /// The abort signal fired during execution; the suite is now skipped.
    #[error(transparent)]
    Aborted(#[from] Aborted),
}

/// An error produced by a conductor while driving a remote suite execution.
///
/// Rejections of this kind are caught at the suite boundary and converted
/// into a suite-level error report; they never propagate out of `exec`.
#[derive(Clone, Debug, Error)]
pub enum ConductorError {
    /// The transport to the remote environment failed.
    #[error("conductor transport failed: {0}")]
    Transport(String),

    /// The remote process or page exited abnormally.
    #[error("remote execution failed: {0}")]
    Process(String),

    /// A reporter callback rejected one of the conductor's reports.
    #[error(transparent)]
    Report(#[from] ReportError),
}
