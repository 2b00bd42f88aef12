// Copyright (c) The baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Suites: the per-conductor execution state machine and the
//! conductor-protocol consumer.

use crate::{
    abort::AbortSignal,
    errors::{ExecError, ReportError, StateError},
    events::TestEventKind,
    tree::{
        lock_tree, InstanceId, InstancePayload, NodeKind, StackId, StackPayload, TestFunction,
        TestFunctionStack, TestGroup, TestGroupStack, TreeRef, TreeState,
    },
};
use baton_metadata::{ErrorPayload, HookSpec, ReportedNode, ResultKind, ResultPayload, SuiteMessage};
use smol_str::SmolStr;
use std::{collections::HashMap, fmt, time::Duration};
use tracing::{debug, warn};

/// Execution state of one suite instance.
///
/// State is monotonic: `pending -> skipped`, or `pending -> running ->
/// done`. No other transition is legal.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SuiteState {
    /// Not yet started.
    Pending,

    /// Never ran, and never will: filtered out, or aborted.
    Skipped,

    /// The conductor is executing the suite remotely.
    Running,

    /// Execution settled, successfully or not.
    Done,
}

impl SuiteState {
    /// The string used in error messages and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Skipped => "skipped",
            Self::Running => "running",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for SuiteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error reported against a suite or group, or coerced from a transport
/// failure at the suite boundary.
///
/// This is data, not a Rust error: remote test failures are expected
/// outcomes, recorded into the tree and surfaced through indices and
/// events.
#[derive(Clone, Debug)]
pub struct TestError {
    /// Human-readable message.
    pub message: String,

    /// Remote stack trace, if one was captured.
    pub stack: Option<String>,

    /// The lifecycle hook the error was raised in, if any.
    pub hook: Option<HookSpec>,
}

impl TestError {
    pub(crate) fn from_payload(payload: ErrorPayload, hook: Option<HookSpec>) -> Self {
        Self {
            message: payload.message().to_owned(),
            stack: payload.stack().map(str::to_owned),
            hook,
        }
    }

    /// Coerces an arbitrary failure (a conductor rejection, an abort) into
    /// the data-carrying error shape recorded in the tree.
    pub fn from_unhandled(error: &dyn fmt::Display) -> Self {
        Self {
            message: error.to_string(),
            stack: None,
            hook: None,
        }
    }
}

/// A recorded result for one test function instance.
#[derive(Clone, Debug)]
pub struct TestResult {
    /// The outcome kind.
    pub kind: ResultKind,

    /// Failure detail for fail/timeout outcomes.
    pub error: Option<TestError>,

    /// Wall-clock duration reported by the conductor.
    pub duration: Option<Duration>,
}

impl TestResult {
    pub(crate) fn from_payload(payload: ResultPayload) -> Self {
        Self {
            kind: payload.kind,
            error: payload.error.map(|error| TestError::from_payload(error, None)),
            duration: payload
                .duration
                .filter(|ms| ms.is_finite() && *ms >= 0.0)
                .map(|ms| Duration::from_secs_f64(ms / 1000.0)),
        }
    }
}

/// Per-suite-instance mutable data.
pub(crate) struct SuiteData {
    pub(crate) state: SuiteState,
    pub(crate) errors: Vec<TestError>,
    /// Conductor-assigned report ids declared so far in this execution.
    pub(crate) node_ids: HashMap<u64, InstanceId>,
    /// Occurrence counters for ident assignment: how many times this
    /// execution has declared a (parent, kind, title) so far.
    pub(crate) occurrence: HashMap<(InstanceId, NodeKind, SmolStr), u32>,
    pub(crate) coverage: Option<serde_json::Value>,
}

impl SuiteData {
    pub(crate) fn new() -> Self {
        Self {
            state: SuiteState::Pending,
            errors: Vec::new(),
            node_ids: HashMap::new(),
            occurrence: HashMap::new(),
            coverage: None,
        }
    }
}

impl TreeState {
    pub(crate) fn suite_data(&self, suite: InstanceId) -> &SuiteData {
        match &self.instance(suite).payload {
            InstancePayload::Suite(data) => data,
            _ => unreachable!("instance {suite:?} is not a suite"),
        }
    }

    pub(crate) fn suite_data_mut(&mut self, suite: InstanceId) -> &mut SuiteData {
        match &mut self.instance_mut(suite).payload {
            InstancePayload::Suite(data) => data,
            _ => unreachable!("instance {suite:?} is not a suite"),
        }
    }

    /// Rejects any operation attempted outside the state it documents.
    pub(crate) fn assert_suite_state(
        &self,
        suite: InstanceId,
        expected: SuiteState,
    ) -> Result<(), StateError> {
        let actual = self.suite_data(suite).state;
        if actual == expected {
            Ok(())
        } else {
            Err(StateError { expected, actual })
        }
    }

    /// Transitions a suite from `from` to `to`, moves it between the
    /// run-level suite facets, and dispatches the matching event.
    pub(crate) fn transition_suite(
        &mut self,
        tree: &TreeRef,
        suite: InstanceId,
        from: SuiteState,
        to: SuiteState,
    ) -> Result<(), StateError> {
        self.assert_suite_state(suite, from)?;
        self.suite_data_mut(suite).state = to;

        let run_instance = self.instance(suite).run_instance;
        if let Some(sets) = self.instance_mut(run_instance).index.suites.as_mut() {
            sets.transition(suite, from, to);
        }
        let root = self.root();
        if let Some(sets) = self.stack_mut(root).index.suites.as_mut() {
            sets.transition(suite, from, to);
        }

        let kind = match to {
            SuiteState::Skipped => TestEventKind::Skip,
            SuiteState::Running => TestEventKind::Start,
            SuiteState::Done => TestEventKind::Done,
            SuiteState::Pending => unreachable!("no transition leads back to pending"),
        };
        self.dispatch(tree, suite, kind);
        Ok(())
    }
}

/// The conductor-independent identity of one test file within a run.
#[derive(Clone)]
pub struct TestSuiteStack {
    pub(crate) tree: TreeRef,
    pub(crate) id: StackId,
}

stack_handle_impls!(TestSuiteStack, TestSuite);

impl TestSuiteStack {
    /// The test file URL identifying this suite within the run.
    pub fn url(&self) -> SmolStr {
        let state = lock_tree(&self.tree);
        match &state.stack(self.id).payload {
            StackPayload::Suite { url } => url.clone(),
            _ => unreachable!("suite stack payload is a suite"),
        }
    }

    /// Direct child group stacks, in first-report order.
    pub fn group_stacks(&self) -> Vec<TestGroupStack> {
        let state = lock_tree(&self.tree);
        state
            .stack(self.id)
            .children
            .iter()
            .filter(|(ident, _)| ident.kind() == NodeKind::Group)
            .map(|(_, &id)| TestGroupStack::from_parts(self.tree.clone(), id))
            .collect()
    }

    /// Direct child function stacks, in first-report order.
    pub fn function_stacks(&self) -> Vec<TestFunctionStack> {
        let state = lock_tree(&self.tree);
        state
            .stack(self.id)
            .children
            .iter()
            .filter(|(ident, _)| ident.kind() == NodeKind::Function)
            .map(|(_, &id)| TestFunctionStack::from_parts(self.tree.clone(), id))
            .collect()
    }
}

/// One conductor's execution of a suite.
#[derive(Clone)]
pub struct TestSuite {
    pub(crate) tree: TreeRef,
    pub(crate) id: InstanceId,
}

instance_handle_impls!(TestSuite, TestSuiteStack);

impl TestSuite {
    /// The test file URL identifying this suite within the run.
    pub fn url(&self) -> SmolStr {
        self.stack().url()
    }

    /// The suite's current execution state.
    pub fn state(&self) -> SuiteState {
        lock_tree(&self.tree).suite_data(self.id).state
    }

    /// Errors reported against the suite itself (not its groups), in report
    /// order.
    pub fn errors(&self) -> Vec<TestError> {
        lock_tree(&self.tree).suite_data(self.id).errors.clone()
    }

    /// Coverage data recorded by the `complete` report, if any.
    pub fn coverage(&self) -> Option<serde_json::Value> {
        lock_tree(&self.tree).suite_data(self.id).coverage.clone()
    }

    /// Direct child group instances, in report order.
    pub fn groups(&self) -> Vec<TestGroup> {
        let state = lock_tree(&self.tree);
        state
            .instance(self.id)
            .children
            .iter()
            .filter(|(ident, _)| ident.kind() == NodeKind::Group)
            .map(|(_, &id)| TestGroup::from_parts(self.tree.clone(), id))
            .collect()
    }

    /// Direct child function instances, in report order.
    pub fn functions(&self) -> Vec<TestFunction> {
        let state = lock_tree(&self.tree);
        state
            .instance(self.id)
            .children
            .iter()
            .filter(|(ident, _)| ident.kind() == NodeKind::Function)
            .map(|(_, &id)| TestFunction::from_parts(self.tree.clone(), id))
            .collect()
    }

    /// The reporter feeding this suite execution's reports into the tree.
    ///
    /// Handed to the conductor by [`exec`](Self::exec); exposed for driving
    /// the protocol directly in tests and custom transports. All callbacks
    /// are state-guarded.
    pub fn reporter(&self) -> SuiteReporter {
        SuiteReporter {
            tree: self.tree.clone(),
            suite: self.id,
        }
    }

    /// Marks a pending suite as skipped: it never ran and never will.
    ///
    /// Dispatches `skip`. Calling this in any state but `pending` is a
    /// contract violation.
    pub fn skip(&self) -> Result<(), StateError> {
        let mut state = lock_tree(&self.tree);
        state.transition_suite(&self.tree, self.id, SuiteState::Pending, SuiteState::Skipped)
    }

    /// Executes this suite remotely through its conductor.
    ///
    /// Asserts `pending` and transitions to `running` (dispatching `start`),
    /// then delegates to the conductor, which invokes the reporter callbacks
    /// asynchronously as the remote side makes progress. On settlement the
    /// suite transitions to `done` (dispatching `done`) -- including when
    /// the conductor rejects, in which case the rejection is recorded as a
    /// suite-level error first. Abort is the one exception: an aborted suite
    /// transitions to `skipped` instead, discarding partial-result
    /// semantics, and `exec` returns the abort value itself so callers can
    /// tell deliberate cancellation apart from suite failure.
    pub async fn exec(
        &self,
        filter: Option<&regex::Regex>,
        signal: Option<AbortSignal>,
    ) -> Result<(), ExecError> {
        // A signal that fired before we started: never start, mirroring the
        // scheduler's not-yet-started path.
        if let Some(signal) = &signal {
            if let Some(aborted) = signal.aborted() {
                self.skip()?;
                return Err(ExecError::Aborted(aborted));
            }
        }

        let (conductor, url) = {
            let mut state = lock_tree(&self.tree);
            state.assert_suite_state(self.id, SuiteState::Pending)?;
            let conductor = state.conductor_of(self.id).clone();
            let url = match &state.stack(state.instance(self.id).stack).payload {
                StackPayload::Suite { url } => url.clone(),
                _ => unreachable!("suite instance owned by a suite stack"),
            };
            state.transition_suite(
                &self.tree,
                self.id,
                SuiteState::Pending,
                SuiteState::Running,
            )?;
            (conductor, url)
        };

        debug!(
            suite = %url,
            conductor = conductor.name(),
            "starting suite execution"
        );

        let reporter = self.reporter();
        let run = conductor.run_test_suite(reporter, url.clone(), filter.cloned(), signal.clone());

        let settled = match signal {
            Some(mut signal) => {
                tokio::select! {
                    res = run => Ok(res),
                    aborted = signal.triggered() => Err(aborted),
                }
            }
            None => Ok(run.await),
        };

        match settled {
            Err(aborted) => {
                // Dropping the conductor future above stopped our side;
                // whatever the remote side still does, its stray reports now
                // fail the state guard.
                warn!(suite = %url, %aborted, "suite execution aborted");
                let mut state = lock_tree(&self.tree);
                state.transition_suite(
                    &self.tree,
                    self.id,
                    SuiteState::Running,
                    SuiteState::Skipped,
                )?;
                Err(ExecError::Aborted(aborted))
            }
            Ok(outcome) => {
                let mut state = lock_tree(&self.tree);
                if let Err(error) = outcome {
                    debug!(suite = %url, %error, "conductor rejected; recording suite error");
                    state.attach_error(&self.tree, self.id, TestError::from_unhandled(&error));
                }
                state.transition_suite(
                    &self.tree,
                    self.id,
                    SuiteState::Running,
                    SuiteState::Done,
                )?;
                Ok(())
            }
        }
    }
}

/// Callbacks a conductor uses to feed one suite execution's reports into the
/// tree.
///
/// Every callback re-validates the suite's current state: reports arriving
/// before `exec`, or after the suite settles (including after an abort), are
/// rejected with [`ReportError::State`].
///
/// Node identity is defined by first-sight order: within one execution, the
/// k-th declaration of a given (kind, title) under a parent binds to the
/// stack child with ordinal k, creating it if no conductor has declared it
/// yet. Conductors must therefore report equivalent children in the same
/// order to share identity across conductors.
#[derive(Clone)]
pub struct SuiteReporter {
    tree: TreeRef,
    suite: InstanceId,
}

impl SuiteReporter {
    /// Materializes newly-declared nodes under this suite.
    ///
    /// Each node becomes a group or function Stack+Instance pair under the
    /// matching parent: the enclosing declaration, or the suite itself for
    /// top-level nodes. An existing Stack is reused when its ident matches
    /// at that tree position. Redeclaring an `id` already used in this
    /// execution is a contract violation.
    pub fn schedule(&self, nodes: &[ReportedNode]) -> Result<(), ReportError> {
        let mut state = lock_tree(&self.tree);
        state.assert_suite_state(self.suite, SuiteState::Running)?;
        state.apply_schedule(self.suite, nodes)?;
        state.dispatch(&self.tree, self.suite, TestEventKind::Schedule);
        Ok(())
    }

    /// Attaches an error to the group identified by `node_id`, or to the
    /// suite itself when absent. Only groups and the suite accept errors;
    /// targeting a test function is a contract violation.
    pub fn error(
        &self,
        node_id: Option<u64>,
        error: ErrorPayload,
        hook: Option<HookSpec>,
    ) -> Result<(), ReportError> {
        let mut state = lock_tree(&self.tree);
        state.assert_suite_state(self.suite, SuiteState::Running)?;
        let target = match node_id {
            None => self.suite,
            Some(id) => {
                let target = state.lookup_node(self.suite, id)?;
                if state.instance(target).payload.is_function() {
                    return Err(ReportError::NodeKindMismatch {
                        id,
                        actual: NodeKind::Function,
                        operation: "error",
                    });
                }
                target
            }
        };
        state.attach_error(&self.tree, target, TestError::from_payload(error, hook));
        Ok(())
    }

    /// Records the one-shot result of the test function identified by
    /// `node_id`. Only test functions accept results; a second result for
    /// the same function is a contract violation.
    pub fn result(&self, node_id: u64, result: ResultPayload) -> Result<(), ReportError> {
        let mut state = lock_tree(&self.tree);
        state.assert_suite_state(self.suite, SuiteState::Running)?;
        let target = state.lookup_node(self.suite, node_id)?;
        if !state.instance(target).payload.is_function() {
            return Err(ReportError::NodeKindMismatch {
                id: node_id,
                actual: state.instance(target).payload.kind(),
                operation: "result",
            });
        }
        state.record_result(&self.tree, target, node_id, TestResult::from_payload(result))
    }

    /// Records optional coverage data and dispatches `complete`.
    pub fn complete(&self, coverage: Option<serde_json::Value>) -> Result<(), ReportError> {
        let mut state = lock_tree(&self.tree);
        state.assert_suite_state(self.suite, SuiteState::Running)?;
        if let Some(coverage) = coverage {
            state.suite_data_mut(self.suite).coverage = Some(coverage);
        }
        state.dispatch(&self.tree, self.suite, TestEventKind::Complete);
        Ok(())
    }

    /// Decodes one wire message into the matching callback. This is the glue
    /// an HTTP-transport conductor calls for every JSON event it receives.
    pub fn handle_message(&self, message: SuiteMessage) -> Result<(), ReportError> {
        match message {
            SuiteMessage::Schedule { nodes } => self.schedule(&nodes),
            SuiteMessage::Error {
                node_id,
                error,
                hook,
            } => self.error(node_id, error, hook),
            SuiteMessage::Result { node_id, result } => self.result(node_id, result),
            SuiteMessage::Complete { coverage } => self.complete(coverage),
        }
    }
}

impl fmt::Debug for SuiteReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuiteReporter")
            .field("suite", &self.suite)
            .finish()
    }
}

impl InstancePayload {
    pub(crate) fn is_function(&self) -> bool {
        matches!(self, InstancePayload::Function { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        abort::AbortController,
        conductor::TestConductor,
        errors::Aborted,
        test_helpers::{FailingConductor, FnConductor, ScriptedConductor, StalledConductor},
        tree::{AggregateResult, TestRunStack},
    };
    use baton_metadata::{ErrorPayload, ReportedNode, ResultKind, ResultPayload, SuiteMessage};
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    const URL: &str = "tests/suite.js";

    fn single_run(conductor: Arc<dyn TestConductor>) -> (TestRunStack, TestSuite) {
        let run = TestRunStack::create(vec![conductor], [URL]).expect("run builds");
        let suite = run.suites().into_iter().next().expect("one suite");
        (run, suite)
    }

    fn full_script() -> Vec<SuiteMessage> {
        vec![
            SuiteMessage::Schedule {
                nodes: vec![
                    ReportedNode::group(
                        1,
                        "parsing",
                        vec![
                            ReportedNode::function(2, "accepts empty input"),
                            ReportedNode::function(3, "rejects bad escapes"),
                        ],
                    ),
                    ReportedNode::function(4, "top level smoke"),
                ],
            },
            SuiteMessage::Result {
                node_id: 2,
                result: ResultPayload {
                    kind: ResultKind::Success,
                    error: None,
                    duration: Some(12.5),
                },
            },
            SuiteMessage::Result {
                node_id: 3,
                result: ResultPayload {
                    kind: ResultKind::Fail,
                    error: Some(ErrorPayload::Message("expected 2, got 3".into())),
                    duration: None,
                },
            },
            SuiteMessage::Result {
                node_id: 4,
                result: ResultPayload::new(ResultKind::Success),
            },
            SuiteMessage::Complete {
                coverage: Some(serde_json::json!({"lines": 10})),
            },
        ]
    }

    #[tokio::test]
    async fn exec_applies_reported_protocol() {
        let (run, suite) = single_run(ScriptedConductor::new("node", full_script()));
        suite.exec(None, None).await.expect("exec settles");

        assert_eq!(suite.state(), SuiteState::Done);
        assert_eq!(suite.coverage(), Some(serde_json::json!({"lines": 10})));

        let stats = run.stats();
        assert_eq!(stats.tests, 3);
        assert_eq!(stats.passed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.suites_done, 1);
        assert!(!stats.is_success(), "a failed test fails the run");

        let stack = suite.stack();
        assert_eq!(stack.test_count(), 3);
        assert_eq!(stack.result_count(ResultKind::Success), 2);
        assert_eq!(stack.result_count(ResultKind::Fail), 1);

        // The reported duration survives the millisecond conversion.
        let parsing = suite.groups().into_iter().next().expect("group exists");
        let functions = parsing.functions();
        let result = functions[0].result().expect("result recorded");
        assert_eq!(result.kind, ResultKind::Success);
        assert_eq!(result.duration.expect("duration").as_micros(), 12_500);

        let result = functions[1].result().expect("result recorded");
        assert_eq!(
            result.error.as_ref().expect("failure detail").message,
            "expected 2, got 3"
        );
    }

    #[tokio::test]
    async fn events_bubble_to_all_levels() {
        let (run, suite) = single_run(ScriptedConductor::new("node", full_script()));
        let mut at_run_stack = run.subscribe();
        let mut at_suite_stack = suite.stack().subscribe();
        let mut at_suite = suite.subscribe();

        suite.exec(None, None).await.expect("exec settles");

        let expected = [
            "start", "schedule", "result", "result", "result", "complete", "done",
        ];
        for rx in [&mut at_run_stack, &mut at_suite_stack, &mut at_suite] {
            let mut seen = Vec::new();
            while let Ok(event) = rx.try_recv() {
                seen.push(event.kind.name());
            }
            assert_eq!(seen, expected);
        }
    }

    #[tokio::test]
    async fn event_payload_names_originating_leaf() {
        let (run, suite) = single_run(ScriptedConductor::new("node", full_script()));
        let mut events = run.subscribe();
        suite.exec(None, None).await.expect("exec settles");

        let start = events.try_recv().expect("start event");
        assert!(matches!(start.kind, TestEventKind::Start));
        assert_eq!(start.node.as_suite().expect("suite node"), suite);

        let _schedule = events.try_recv().expect("schedule event");
        let result = events.try_recv().expect("result event");
        let function = result.node.as_function().expect("function node");
        assert_eq!(function.title(), "accepts empty input");
        assert_eq!(function.ident().to_string(), "TestFunction:accepts empty input:1");
    }

    #[tokio::test]
    async fn reporter_guards_state_before_and_after() {
        let (_run, suite) = single_run(ScriptedConductor::new("node", Vec::new()));
        let reporter = suite.reporter();

        // Before exec: the suite is still pending.
        let error = reporter
            .schedule(&[ReportedNode::function(1, "early")])
            .expect_err("pending suite rejects reports");
        assert!(error.to_string().contains("pending"));
        assert!(matches!(
            error,
            ReportError::State(StateError {
                expected: SuiteState::Running,
                actual: SuiteState::Pending,
            })
        ));

        suite.exec(None, None).await.expect("exec settles");

        // After done: reports are equally rejected.
        let error = reporter
            .complete(None)
            .expect_err("done suite rejects reports");
        assert!(error.to_string().contains("done"));
    }

    #[tokio::test]
    async fn schedule_disambiguates_duplicate_titles() {
        let script = vec![SuiteMessage::Schedule {
            nodes: vec![
                ReportedNode::function(1, "Foo"),
                ReportedNode::group(2, "Foo", vec![]),
                ReportedNode::group(3, "Foo", vec![]),
                ReportedNode::function(4, "Foo"),
            ],
        }];
        let (_run, suite) = single_run(ScriptedConductor::new("node", script));
        suite.exec(None, None).await.expect("exec settles");

        let idents: Vec<String> = suite
            .stack()
            .children()
            .iter()
            .map(|node| node.ident().to_string())
            .collect();
        assert_eq!(
            idents,
            [
                "TestFunction:Foo:1",
                "TestGroup:Foo:1",
                "TestGroup:Foo:2",
                "TestFunction:Foo:2",
            ]
        );
    }

    #[tokio::test]
    async fn identity_is_stable_across_conductors() {
        let script = || {
            vec![SuiteMessage::Schedule {
                nodes: vec![
                    ReportedNode::function(1, "A"),
                    ReportedNode::function(2, "A"),
                ],
            }]
        };
        let run = TestRunStack::create(
            vec![
                ScriptedConductor::new("chromium", script()),
                ScriptedConductor::new("node", script()),
            ],
            [URL],
        )
        .expect("run builds");

        for suite in run.suites() {
            suite.exec(None, None).await.expect("exec settles");
        }

        let stack = run.suite_stack(URL).expect("stack");
        let functions = stack.function_stacks();
        assert_eq!(functions.len(), 2, "one stack per ident");
        for function in &functions {
            assert_eq!(function.instances().len(), 2, "two instances per stack");
        }
        assert_eq!(stack.test_count(), 2);

        // Per-conductor views still count their own realizations.
        let chromium = run.instance("chromium").expect("instance");
        assert_eq!(chromium.test_count(), 2);
    }

    #[tokio::test]
    async fn mixed_result_aggregation() {
        let script = |kind: ResultKind| {
            vec![
                SuiteMessage::Schedule {
                    nodes: vec![ReportedNode::function(1, "shared")],
                },
                SuiteMessage::Result {
                    node_id: 1,
                    result: ResultPayload::new(kind),
                },
            ]
        };
        let run = TestRunStack::create(
            vec![
                ScriptedConductor::new("chromium", script(ResultKind::Success)),
                ScriptedConductor::new("node", script(ResultKind::Fail)),
            ],
            [URL],
        )
        .expect("run builds");
        let suites = run.suites();

        suites[0].exec(None, None).await.expect("exec settles");
        let stack = run.suite_stack(URL).expect("stack");
        let function = stack.function_stacks().into_iter().next().expect("function");
        assert_eq!(
            function.result_type(),
            Some(AggregateResult::Kind(ResultKind::Success)),
            "a single reported instance aggregates to its own kind"
        );

        suites[1].exec(None, None).await.expect("exec settles");
        assert_eq!(function.result_type(), Some(AggregateResult::Mixed));

        let stats = run.stats();
        assert_eq!(stats.mixed, 1);
        assert_eq!(stats.passed, 0, "a mixed function is in no result set");
        assert_eq!(stats.failed, 0);
        assert_eq!(stack.mixed_count(), 1);

        // Instance-level views keep the per-conductor outcomes.
        assert_eq!(run.instance("chromium").expect("instance").stats().passed, 1);
        assert_eq!(run.instance("node").expect("instance").stats().failed, 1);
    }

    #[tokio::test]
    async fn aggregate_is_undefined_until_every_instance_reports() {
        let reporting = vec![
            SuiteMessage::Schedule {
                nodes: vec![ReportedNode::function(1, "shared")],
            },
            SuiteMessage::Result {
                node_id: 1,
                result: ResultPayload::new(ResultKind::Success),
            },
        ];
        let silent = vec![SuiteMessage::Schedule {
            nodes: vec![ReportedNode::function(1, "shared")],
        }];
        let run = TestRunStack::create(
            vec![
                ScriptedConductor::new("chromium", reporting),
                ScriptedConductor::new("node", silent),
            ],
            [URL],
        )
        .expect("run builds");

        for suite in run.suites() {
            suite.exec(None, None).await.expect("exec settles");
        }

        let stack = run.suite_stack(URL).expect("stack");
        let function = stack.function_stacks().into_iter().next().expect("function");
        assert_eq!(function.result_type(), None);
        assert_eq!(run.stats().passed, 0);
        // The conductor that did report still counts at its own level.
        assert_eq!(run.instance("chromium").expect("instance").stats().passed, 1);
    }

    #[tokio::test]
    async fn reporter_rejects_protocol_violations() {
        let outcome: Arc<Mutex<Vec<ReportError>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = outcome.clone();
        let conductor = FnConductor::new("node", move |reporter, _url, _filter, _signal| {
            let sink = sink.clone();
            Box::pin(async move {
                reporter.schedule(&[ReportedNode::group(
                    1,
                    "outer",
                    vec![ReportedNode::function(2, "leaf")],
                )])?;

                let mut seen = sink.lock().unwrap();
                // A result against a group.
                seen.push(
                    reporter
                        .result(1, ResultPayload::new(ResultKind::Success))
                        .expect_err("group rejects results"),
                );
                // An error against a function.
                seen.push(
                    reporter
                        .error(Some(2), ErrorPayload::Message("nope".into()), None)
                        .expect_err("function rejects errors"),
                );
                // An id that was never declared.
                seen.push(
                    reporter
                        .result(99, ResultPayload::new(ResultKind::Success))
                        .expect_err("unknown id rejected"),
                );
                // A second result for the same function.
                reporter.result(2, ResultPayload::new(ResultKind::Success))?;
                seen.push(
                    reporter
                        .result(2, ResultPayload::new(ResultKind::Fail))
                        .expect_err("results are one-shot"),
                );
                // A redeclared id.
                seen.push(
                    reporter
                        .schedule(&[ReportedNode::function(2, "again")])
                        .expect_err("duplicate id rejected"),
                );
                Ok(())
            })
        });
        let (run, suite) = single_run(conductor);
        suite.exec(None, None).await.expect("exec settles");

        let seen = outcome.lock().unwrap();
        assert!(matches!(
            seen[0],
            ReportError::NodeKindMismatch {
                id: 1,
                actual: NodeKind::Group,
                operation: "result",
            }
        ));
        assert!(matches!(
            seen[1],
            ReportError::NodeKindMismatch {
                id: 2,
                actual: NodeKind::Function,
                operation: "error",
            }
        ));
        assert!(matches!(seen[2], ReportError::UnknownNodeId { id: 99 }));
        assert!(matches!(seen[3], ReportError::ResultAlreadySet { id: 2 }));
        assert!(matches!(seen[4], ReportError::DuplicateNodeId { id: 2 }));

        // The one successful result is recorded exactly once.
        assert_eq!(run.stats().passed, 1);
    }

    #[tokio::test]
    async fn conductor_report_rejection_becomes_suite_error() {
        // A conductor that propagates a reporter rejection out of its own
        // future: the failure lands as a suite-level error, and the suite
        // still settles as done.
        let script = vec![
            SuiteMessage::Schedule {
                nodes: vec![ReportedNode::function(1, "a")],
            },
            SuiteMessage::Schedule {
                nodes: vec![ReportedNode::function(1, "b")],
            },
        ];
        let (run, suite) = single_run(ScriptedConductor::new("node", script));
        suite.exec(None, None).await.expect("exec settles");

        assert_eq!(suite.state(), SuiteState::Done);
        let errors = suite.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("already declared"));
        assert_eq!(run.stats().errors, 1);
    }

    #[tokio::test]
    async fn conductor_transport_failure_is_recorded_not_raised() {
        let (run, suite) = single_run(FailingConductor::new("node", "ws closed"));
        let mut events = run.subscribe();

        suite.exec(None, None).await.expect("exec settles despite failure");

        assert_eq!(suite.state(), SuiteState::Done);
        let errors = suite.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("ws closed"));
        assert_eq!(run.stats().errors, 1);

        let kinds: Vec<&str> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|event| event.kind.name())
            .collect();
        assert_eq!(kinds, ["start", "error", "done"]);
    }

    #[tokio::test]
    async fn repeated_errors_keep_index_idempotent() {
        let conductor = FnConductor::new("node", |reporter, _url, _filter, _signal| {
            Box::pin(async move {
                reporter.schedule(&[ReportedNode::group(1, "flaky hooks", vec![])])?;
                reporter.error(Some(1), ErrorPayload::Message("first".into()), None)?;
                reporter.error(Some(1), ErrorPayload::Message("second".into()), None)?;
                Ok(())
            })
        });
        let (run, suite) = single_run(conductor);
        suite.exec(None, None).await.expect("exec settles");

        // Two errors on one group: the group appears once in every ancestor
        // index, while its own error list keeps both.
        assert_eq!(suite.error_count(), 1);
        assert_eq!(run.stats().errors, 1);
        let group = suite.groups().into_iter().next().expect("group");
        assert_eq!(group.errors().len(), 2);
        assert_eq!(group.errors()[1].message, "second");
    }

    #[tokio::test]
    async fn hook_metadata_is_preserved() {
        let conductor = FnConductor::new("node", |reporter, _url, _filter, _signal| {
            Box::pin(async move {
                reporter.error(
                    None,
                    ErrorPayload::Detail {
                        message: "teardown blew up".into(),
                        stack: Some("at teardown.js:7".into()),
                    },
                    Some(baton_metadata::HookSpec {
                        kind: "afterEach".into(),
                        index: 0,
                        name: Some("cleanup".into()),
                        cleanup: true,
                    }),
                )?;
                Ok(())
            })
        });
        let (_run, suite) = single_run(conductor);
        suite.exec(None, None).await.expect("exec settles");

        let errors = suite.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].stack.as_deref(), Some("at teardown.js:7"));
        let hook = errors[0].hook.as_ref().expect("hook recorded");
        assert_eq!(hook.kind, "afterEach");
        assert!(hook.cleanup);
    }

    #[tokio::test]
    async fn skip_transitions_and_dispatches() {
        let (run, suite) = single_run(StalledConductor::new("node"));
        let mut events = run.subscribe();

        suite.skip().expect("pending suite skips");
        assert_eq!(suite.state(), SuiteState::Skipped);
        assert_eq!(run.suite_count(SuiteState::Skipped), 1);

        let event = events.try_recv().expect("skip event");
        assert!(matches!(event.kind, TestEventKind::Skip));

        let error = suite.skip().expect_err("skip is not re-entrant");
        assert_eq!(error.actual, SuiteState::Skipped);
    }

    #[tokio::test]
    async fn exec_rejects_non_pending_suite() {
        let (_run, suite) = single_run(ScriptedConductor::new("node", Vec::new()));
        suite.exec(None, None).await.expect("first exec settles");

        let error = suite.exec(None, None).await.expect_err("second exec rejected");
        assert!(matches!(
            error,
            ExecError::State(StateError {
                expected: SuiteState::Pending,
                actual: SuiteState::Done,
            })
        ));
    }

    #[tokio::test]
    async fn abort_mid_exec_skips_and_guards_stray_reports() {
        let slot: Arc<Mutex<Option<SuiteReporter>>> = Arc::new(Mutex::new(None));
        let stash = slot.clone();
        let conductor = FnConductor::new("node", move |reporter, _url, _filter, _signal| {
            *stash.lock().unwrap() = Some(reporter);
            Box::pin(std::future::pending())
        });
        let (run, suite) = single_run(conductor);
        let controller = AbortController::new();
        let signal = controller.signal();

        let exec_suite = suite.clone();
        let task = tokio::spawn(async move { exec_suite.exec(None, Some(signal)).await });
        while slot.lock().unwrap().is_none() {
            tokio::task::yield_now().await;
        }
        assert_eq!(suite.state(), SuiteState::Running);

        controller.abort(Some("operator stop"));
        let result = task.await.expect("exec task completes");
        let Err(ExecError::Aborted(aborted)) = result else {
            panic!("expected abort rejection, got {result:?}");
        };
        assert_eq!(aborted.reason.as_deref(), Some("operator stop"));
        assert_eq!(suite.state(), SuiteState::Skipped);
        assert_eq!(run.suite_count(SuiteState::Skipped), 1);

        // The remote side is not guaranteed to have stopped; anything it
        // still reports must hit the state guard.
        let reporter = slot.lock().unwrap().take().expect("reporter stashed");
        let error = reporter
            .result(1, ResultPayload::new(ResultKind::Success))
            .expect_err("stray report rejected");
        assert!(matches!(
            error,
            ReportError::State(StateError {
                actual: SuiteState::Skipped,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn pre_aborted_signal_skips_without_starting() {
        let executed: Arc<Mutex<bool>> = Arc::new(Mutex::new(false));
        let touched = executed.clone();
        let conductor = FnConductor::new("node", move |_reporter, _url, _filter, _signal| {
            *touched.lock().unwrap() = true;
            Box::pin(async { Ok(()) })
        });
        let (_run, suite) = single_run(conductor);
        let controller = AbortController::new();
        controller.abort(None);

        let error = suite
            .exec(None, Some(controller.signal()))
            .await
            .expect_err("aborted before start");
        assert!(matches!(error, ExecError::Aborted(Aborted { .. })));
        assert_eq!(suite.state(), SuiteState::Skipped);
        assert!(!*executed.lock().unwrap(), "conductor never invoked");
    }
}
