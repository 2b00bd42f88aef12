// Copyright (c) The baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed events observable at any node of the run tree.
//!
//! Events originate at an Instance node and are delivered to that node's
//! subscribers, its owning Stack's subscribers, and every ancestor's
//! subscribers on both chains. An observer therefore subscribes once at
//! whichever granularity it renders -- a single test function, a suite, or
//! the whole run -- and sees the same leaf events either way.

use crate::tree::{TestError, TestNodeRef, TestResult};
use chrono::{DateTime, FixedOffset, Local};

/// An event raised by a node in the run tree.
#[derive(Clone, Debug)]
pub struct TestEvent {
    /// The time at which the event was generated, including the offset from
    /// UTC.
    pub timestamp: DateTime<FixedOffset>,

    /// The node that originated the event at the leaf.
    pub node: TestNodeRef,

    /// The kind of event.
    pub kind: TestEventKind,
}

impl TestEvent {
    pub(crate) fn new(node: TestNodeRef, kind: TestEventKind) -> Self {
        Self {
            timestamp: Local::now().fixed_offset(),
            node,
            kind,
        }
    }
}

/// The kind of a [`TestEvent`].
#[derive(Clone, Debug)]
pub enum TestEventKind {
    /// A pending suite was skipped: it failed the suite filter, or its sweep
    /// was aborted before (or while) it ran.
    Skip,

    /// A suite began executing.
    Start,

    /// A suite finished executing.
    Done,

    /// A `schedule` report materialized new nodes under a suite.
    Schedule,

    /// The remote side of a suite signalled completion.
    Complete,

    /// An error was attached to a suite or group.
    Error {
        /// The reported error.
        error: TestError,
    },

    /// A test function's result was recorded.
    Result {
        /// The recorded result.
        result: TestResult,
    },
}

impl TestEventKind {
    /// A short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Start => "start",
            Self::Done => "done",
            Self::Schedule => "schedule",
            Self::Complete => "complete",
            Self::Error { .. } => "error",
            Self::Result { .. } => "result",
        }
    }
}
