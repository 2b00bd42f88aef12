// Copyright (c) The baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Incrementally-maintained aggregate indices.
//!
//! Every node that can have descendants owns an index. Whenever a leaf-level
//! fact changes -- a result is set, an error is attached, a suite changes
//! state -- the owning node pushes itself into the matching facet of every
//! ancestor's index, on both the instance chain and the stack chain. Facets
//! are sets rather than counters so a re-fired update is idempotent and
//! every count query is a `len()` with no double-counting risk.
//!
//! Membership granularity differs by facet. Instance-side facets hold
//! instance ids. Stack-side `tests` and result facets hold function *stack*
//! ids, so a test counts once across conductors and the `MIXED` relocation
//! has a natural home; stack-side `errors` and `suites` facets hold
//! *instance* ids, because state and errors are per-conductor facts and a
//! run-level error count must see each conductor's failure separately.

use crate::tree::{suite::SuiteState, InstanceId, StackId};
use baton_metadata::ResultKind;
use std::collections::BTreeSet;
use std::fmt;

/// The aggregated outcome of a test function across conductors.
///
/// `None` at the function stack until every instance that exists for it has
/// reported; then the common kind if all instances agree, else
/// [`Mixed`](Self::Mixed).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum AggregateResult {
    /// Every instance reported the same kind.
    Kind(ResultKind),

    /// Instances disagree on the outcome.
    Mixed,
}

impl fmt::Display for AggregateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kind(kind) => kind.fmt(f),
            Self::Mixed => f.write_str("MIXED"),
        }
    }
}

/// Result-keyed membership sets. Disjoint: a member is in at most one set.
#[derive(Clone, Debug)]
pub(crate) struct ResultSets<T> {
    success: BTreeSet<T>,
    fail: BTreeSet<T>,
    timeout: BTreeSet<T>,
    skipped: BTreeSet<T>,
}

impl<T> Default for ResultSets<T> {
    fn default() -> Self {
        Self {
            success: BTreeSet::new(),
            fail: BTreeSet::new(),
            timeout: BTreeSet::new(),
            skipped: BTreeSet::new(),
        }
    }
}

impl<T: Ord> ResultSets<T> {
    pub(crate) fn set_mut(&mut self, kind: ResultKind) -> &mut BTreeSet<T> {
        match kind {
            ResultKind::Success => &mut self.success,
            ResultKind::Fail => &mut self.fail,
            ResultKind::Timeout => &mut self.timeout,
            ResultKind::Skipped => &mut self.skipped,
        }
    }

    pub(crate) fn count(&self, kind: ResultKind) -> usize {
        match kind {
            ResultKind::Success => self.success.len(),
            ResultKind::Fail => self.fail.len(),
            ResultKind::Timeout => self.timeout.len(),
            ResultKind::Skipped => self.skipped.len(),
        }
    }

    pub(crate) fn remove_everywhere(&mut self, value: &T) {
        self.success.remove(value);
        self.fail.remove(value);
        self.timeout.remove(value);
        self.skipped.remove(value);
    }
}

/// Suite-state-keyed membership sets. Exists at the run / run-stack level
/// only. Disjoint: a suite instance is in exactly one set.
#[derive(Clone, Debug, Default)]
pub(crate) struct SuiteSets {
    pending: BTreeSet<InstanceId>,
    skipped: BTreeSet<InstanceId>,
    running: BTreeSet<InstanceId>,
    done: BTreeSet<InstanceId>,
}

impl SuiteSets {
    fn set_mut(&mut self, state: SuiteState) -> &mut BTreeSet<InstanceId> {
        match state {
            SuiteState::Pending => &mut self.pending,
            SuiteState::Skipped => &mut self.skipped,
            SuiteState::Running => &mut self.running,
            SuiteState::Done => &mut self.done,
        }
    }

    pub(crate) fn count(&self, state: SuiteState) -> usize {
        match state {
            SuiteState::Pending => self.pending.len(),
            SuiteState::Skipped => self.skipped.len(),
            SuiteState::Running => self.running.len(),
            SuiteState::Done => self.done.len(),
        }
    }

    pub(crate) fn insert(&mut self, suite: InstanceId, state: SuiteState) {
        self.set_mut(state).insert(suite);
    }

    pub(crate) fn transition(&mut self, suite: InstanceId, from: SuiteState, to: SuiteState) {
        self.set_mut(from).remove(&suite);
        self.set_mut(to).insert(suite);
    }
}

/// Index attached to an Instance node.
#[derive(Clone, Debug, Default)]
pub(crate) struct InstanceIndex {
    /// Descendant suite/group instances carrying at least one error.
    pub(crate) errors: BTreeSet<InstanceId>,
    /// Descendant test function instances.
    pub(crate) tests: BTreeSet<InstanceId>,
    /// Descendant function instances keyed by their reported result.
    pub(crate) results: ResultSets<InstanceId>,
    /// Suite instances keyed by state; present on the run instance only.
    pub(crate) suites: Option<SuiteSets>,
}

/// Index attached to a Stack node.
#[derive(Clone, Debug, Default)]
pub(crate) struct StackIndex {
    /// Descendant suite/group instances (any conductor) carrying >= 1 error.
    pub(crate) errors: BTreeSet<InstanceId>,
    /// Descendant test function stacks.
    pub(crate) tests: BTreeSet<StackId>,
    /// Descendant function stacks keyed by their aggregated result.
    pub(crate) results: ResultSets<StackId>,
    /// Descendant function stacks whose conductors disagree.
    pub(crate) mixed: BTreeSet<StackId>,
    /// Suite instances keyed by state; present on the run stack only.
    pub(crate) suites: Option<SuiteSets>,
}

impl StackIndex {
    /// Moves `stack` into the set matching `to`, removing it from whichever
    /// set it was in before. `None` leaves it in no set (not all instances
    /// have reported yet).
    pub(crate) fn relocate_result(&mut self, stack: StackId, to: Option<AggregateResult>) {
        self.results.remove_everywhere(&stack);
        self.mixed.remove(&stack);
        match to {
            Some(AggregateResult::Kind(kind)) => {
                self.results.set_mut(kind).insert(stack);
            }
            Some(AggregateResult::Mixed) => {
                self.mixed.insert(stack);
            }
            None => {}
        }
    }
}
