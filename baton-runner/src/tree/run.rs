// Copyright (c) The baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run construction: building the tree from a conductor x test-file matrix.

use crate::{
    conductor::TestConductor,
    errors::RunStackBuildError,
    tree::{
        index::{InstanceIndex, StackIndex, SuiteSets},
        lock_tree,
        suite::{SuiteData, SuiteState},
        InstanceData, InstancePayload, NodeIdent, NodeKind, StackData, StackId, StackPayload,
        TestSuite, TestSuiteStack, TreeRef, TreeState,
    },
};
use baton_metadata::ResultKind;
use newtype_uuid::{TypedUuid, TypedUuidKind, TypedUuidTag};
use smol_str::SmolStr;
use std::sync::{Arc, Mutex};

/// Marker kind for [`RunId`].
pub enum RunIdKind {}

impl TypedUuidKind for RunIdKind {
    fn tag() -> TypedUuidTag {
        const TAG: TypedUuidTag = TypedUuidTag::new("baton-run");
        TAG
    }
}

/// Unique identifier for one orchestration invocation.
pub type RunId = TypedUuid<RunIdKind>;

/// The root Stack node: one per orchestration invocation.
///
/// Created over N conductors and M suite URLs, producing M
/// [`TestSuiteStack`]s shared by N x M [`TestSuite`] instances. The run
/// stack owns all node data; every other handle borrows it by reference
/// counting, so clones are cheap and the tree lives as long as any handle
/// does.
#[derive(Clone)]
pub struct TestRunStack {
    pub(crate) tree: TreeRef,
    pub(crate) id: StackId,
}

stack_handle_impls!(TestRunStack, TestRunInstance);

/// One conductor's realization of the run.
#[derive(Clone)]
pub struct TestRunInstance {
    pub(crate) tree: TreeRef,
    pub(crate) id: crate::tree::InstanceId,
}

instance_handle_impls!(TestRunInstance, TestRunStack);

impl TestRunStack {
    /// Builds the run tree over `conductors` x `suite_urls`.
    ///
    /// Every suite instance starts `pending`. Conductor names and suite URLs
    /// must each be unique within the run.
    pub fn create<I, S>(
        conductors: Vec<Arc<dyn TestConductor>>,
        suite_urls: I,
    ) -> Result<Self, RunStackBuildError>
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        let mut seen_names = Vec::new();
        for conductor in &conductors {
            let name = conductor.name();
            if seen_names.contains(&name) {
                return Err(RunStackBuildError::DuplicateConductorName {
                    name: name.to_owned(),
                });
            }
            seen_names.push(name);
        }

        let conductor_count = conductors.len();
        let mut state = TreeState::new(RunId::new_v4(), conductors);

        let root = state.alloc_stack(StackData {
            ident: NodeIdent::new(NodeKind::Run, "run", 1),
            parent: None,
            children: Default::default(),
            instances: Default::default(),
            next_ordinals: Default::default(),
            index: StackIndex {
                suites: Some(SuiteSets::default()),
                ..Default::default()
            },
            payload: StackPayload::Run,
        });

        let mut run_instances = Vec::with_capacity(conductor_count);
        for conductor in 0..conductor_count {
            let id = state.next_instance_id();
            let run_instance = state.alloc_instance(InstanceData {
                stack: root,
                parent: None,
                run_instance: id,
                conductor,
                children: Default::default(),
                index: InstanceIndex {
                    suites: Some(SuiteSets::default()),
                    ..Default::default()
                },
                payload: InstancePayload::Run,
            });
            state.stack_mut(root).instances.insert(run_instance, run_instance);
            run_instances.push(run_instance);
        }

        for url in suite_urls {
            let url = url.into();
            let ident = NodeIdent::new(NodeKind::Suite, url.clone(), 1);
            if state.stack(root).children.contains_key(&ident) {
                return Err(RunStackBuildError::DuplicateSuiteUrl {
                    url: url.to_string(),
                });
            }
            let suite_stack = state.alloc_stack(StackData {
                ident: ident.clone(),
                parent: Some(root),
                children: Default::default(),
                instances: Default::default(),
                next_ordinals: Default::default(),
                index: StackIndex::default(),
                payload: StackPayload::Suite { url: url.clone() },
            });
            state
                .stack_mut(root)
                .children
                .insert(ident.clone(), suite_stack);

            for &run_instance in &run_instances {
                let conductor = state.instance(run_instance).conductor;
                let suite_instance = state.alloc_instance(InstanceData {
                    stack: suite_stack,
                    parent: Some(run_instance),
                    run_instance,
                    conductor,
                    children: Default::default(),
                    index: InstanceIndex::default(),
                    payload: InstancePayload::Suite(SuiteData::new()),
                });
                state
                    .stack_mut(suite_stack)
                    .instances
                    .insert(run_instance, suite_instance);
                state
                    .instance_mut(run_instance)
                    .children
                    .insert(ident.clone(), suite_instance);

                // Seed the run-level suite facets: every suite starts
                // pending.
                if let Some(sets) = state.instance_mut(run_instance).index.suites.as_mut() {
                    sets.insert(suite_instance, SuiteState::Pending);
                }
                if let Some(sets) = state.stack_mut(root).index.suites.as_mut() {
                    sets.insert(suite_instance, SuiteState::Pending);
                }
            }
        }

        Ok(Self {
            tree: Arc::new(Mutex::new(state)),
            id: root,
        })
    }

    /// The unique id of this run.
    pub fn run_id(&self) -> RunId {
        lock_tree(&self.tree).run_id()
    }

    /// Looks up a run instance by conductor name.
    pub fn instance(&self, conductor: &str) -> Option<TestRunInstance> {
        let state = lock_tree(&self.tree);
        let id = state
            .stack(self.id)
            .instances
            .values()
            .find(|&&id| state.conductors[state.instance(id).conductor].name() == conductor)
            .copied()?;
        Some(TestRunInstance::from_parts(self.tree.clone(), id))
    }

    /// The suite stacks of this run, in declaration order.
    pub fn suite_stacks(&self) -> Vec<TestSuiteStack> {
        let state = lock_tree(&self.tree);
        state
            .stack(self.id)
            .children
            .values()
            .map(|&id| TestSuiteStack::from_parts(self.tree.clone(), id))
            .collect()
    }

    /// Looks up a suite stack by URL.
    pub fn suite_stack(&self, url: &str) -> Option<TestSuiteStack> {
        let state = lock_tree(&self.tree);
        let ident = NodeIdent::new(NodeKind::Suite, url, 1);
        let id = state.stack(self.id).children.get(&ident).copied()?;
        Some(TestSuiteStack::from_parts(self.tree.clone(), id))
    }

    /// Every suite instance of the run, conductor-major: all of the first
    /// conductor's suites, then the next conductor's, and so on. This is the
    /// natural input to [`TestRunManager::exec`](crate::runner::TestRunManager::exec).
    pub fn suites(&self) -> Vec<TestSuite> {
        let state = lock_tree(&self.tree);
        let mut out = Vec::new();
        for &run_instance in state.stack(self.id).instances.values() {
            for &suite in state.instance(run_instance).children.values() {
                out.push(TestSuite::from_parts(self.tree.clone(), suite));
            }
        }
        out
    }

    /// Number of suite instances currently in `state`.
    pub fn suite_count(&self, state: SuiteState) -> usize {
        let tree = lock_tree(&self.tree);
        tree.stack(self.id)
            .index
            .suites
            .as_ref()
            .map_or(0, |sets| sets.count(state))
    }

    /// A copyable snapshot of this run's aggregate counts, derived from the
    /// index sets.
    pub fn stats(&self) -> RunStats {
        let state = lock_tree(&self.tree);
        let index = &state.stack(self.id).index;
        let suites = index.suites.as_ref();
        RunStats {
            tests: index.tests.len(),
            passed: index.results.count(ResultKind::Success),
            failed: index.results.count(ResultKind::Fail),
            timed_out: index.results.count(ResultKind::Timeout),
            skipped: index.results.count(ResultKind::Skipped),
            mixed: index.mixed.len(),
            errors: index.errors.len(),
            suites_pending: suites.map_or(0, |sets| sets.count(SuiteState::Pending)),
            suites_skipped: suites.map_or(0, |sets| sets.count(SuiteState::Skipped)),
            suites_running: suites.map_or(0, |sets| sets.count(SuiteState::Running)),
            suites_done: suites.map_or(0, |sets| sets.count(SuiteState::Done)),
        }
    }
}

impl TestRunInstance {
    /// This conductor's suite instances, in declaration order.
    pub fn suites(&self) -> Vec<TestSuite> {
        let state = lock_tree(&self.tree);
        state
            .instance(self.id)
            .children
            .values()
            .map(|&id| TestSuite::from_parts(self.tree.clone(), id))
            .collect()
    }

    /// Looks up this conductor's instance of the suite at `url`.
    pub fn suite(&self, url: &str) -> Option<TestSuite> {
        let state = lock_tree(&self.tree);
        let ident = NodeIdent::new(NodeKind::Suite, url, 1);
        let id = state.instance(self.id).children.get(&ident).copied()?;
        Some(TestSuite::from_parts(self.tree.clone(), id))
    }

    /// Number of this conductor's suite instances currently in `state`.
    pub fn suite_count(&self, state: SuiteState) -> usize {
        let tree = lock_tree(&self.tree);
        tree.instance(self.id)
            .index
            .suites
            .as_ref()
            .map_or(0, |sets| sets.count(state))
    }

    /// A copyable snapshot of this conductor's aggregate counts.
    pub fn stats(&self) -> RunStats {
        let state = lock_tree(&self.tree);
        let index = &state.instance(self.id).index;
        let suites = index.suites.as_ref();
        RunStats {
            tests: index.tests.len(),
            passed: index.results.count(ResultKind::Success),
            failed: index.results.count(ResultKind::Fail),
            timed_out: index.results.count(ResultKind::Timeout),
            skipped: index.results.count(ResultKind::Skipped),
            mixed: 0,
            errors: index.errors.len(),
            suites_pending: suites.map_or(0, |sets| sets.count(SuiteState::Pending)),
            suites_skipped: suites.map_or(0, |sets| sets.count(SuiteState::Skipped)),
            suites_running: suites.map_or(0, |sets| sets.count(SuiteState::Running)),
            suites_done: suites.map_or(0, |sets| sets.count(SuiteState::Done)),
        }
    }
}

/// Statistics for a run, derived from the aggregate indices.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RunStats {
    /// Test functions discovered so far: distinct identities at the run
    /// stack, per-conductor realizations at a run instance.
    pub tests: usize,

    /// Tests whose (aggregated) result is success.
    pub passed: usize,

    /// Tests whose (aggregated) result is fail.
    pub failed: usize,

    /// Tests whose (aggregated) result is timeout.
    pub timed_out: usize,

    /// Tests whose (aggregated) result is skipped.
    pub skipped: usize,

    /// Tests whose conductors disagree on the outcome. Always zero at the
    /// instance level.
    pub mixed: usize,

    /// Suite/group nodes carrying at least one error.
    pub errors: usize,

    /// Suite instances not yet started.
    pub suites_pending: usize,

    /// Suite instances skipped by a filter or an abort.
    pub suites_skipped: usize,

    /// Suite instances currently executing.
    pub suites_running: usize,

    /// Suite instances that finished executing.
    pub suites_done: usize,
}

impl RunStats {
    /// True if every suite settled and nothing failed, timed out, diverged
    /// across conductors, or errored.
    pub fn is_success(&self) -> bool {
        self.suites_pending == 0
            && self.suites_running == 0
            && self.failed == 0
            && self.timed_out == 0
            && self.mixed == 0
            && self.errors == 0
    }
}
