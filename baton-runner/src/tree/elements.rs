// Copyright (c) The baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Groups and test functions: the dynamically-reported element layer.
//!
//! Unlike runs and suites, which are created up front from the conductor x
//! file matrix, groups and functions come into existence the first time a
//! `schedule` report declares them for some conductor. They are never
//! destroyed within a run's lifetime.

use crate::{
    errors::ReportError,
    tree::{
        index::{InstanceIndex, StackIndex},
        lock_tree, AggregateResult, InstanceData, InstanceId, InstancePayload, NodeIdent, NodeKind,
        StackData, StackId, StackPayload, TestError, TestResult, TreeRef, TreeState,
    },
};
use baton_metadata::ReportedNode;

impl TreeState {
    /// Resolves a conductor-assigned report id to the node it declared.
    pub(crate) fn lookup_node(
        &self,
        suite: InstanceId,
        id: u64,
    ) -> Result<InstanceId, ReportError> {
        self.suite_data(suite)
            .node_ids
            .get(&id)
            .copied()
            .ok_or(ReportError::UnknownNodeId { id })
    }

    /// Materializes one `schedule` report's nodes under `suite`.
    pub(crate) fn apply_schedule(
        &mut self,
        suite: InstanceId,
        nodes: &[ReportedNode],
    ) -> Result<(), ReportError> {
        for node in nodes {
            self.materialize(suite, suite, node)?;
        }
        Ok(())
    }

    /// Creates the Stack+Instance pair for one declared node (recursively
    /// for its children), reusing an existing Stack whose ident matches at
    /// this tree position.
    fn materialize(
        &mut self,
        suite: InstanceId,
        parent: InstanceId,
        node: &ReportedNode,
    ) -> Result<(), ReportError> {
        let kind = if node.is_group() {
            NodeKind::Group
        } else {
            NodeKind::Function
        };

        if self.suite_data(suite).node_ids.contains_key(&node.id) {
            return Err(ReportError::DuplicateNodeId { id: node.id });
        }

        // The k-th sighting of this (kind, title) under `parent` within this
        // suite execution binds to the stack child with ordinal k. This is
        // what reconciles equal-ordered reports from different conductors
        // into one identity.
        let occurrence = {
            let counter = self
                .suite_data_mut(suite)
                .occurrence
                .entry((parent, kind, node.title.clone()))
                .or_insert(0);
            *counter += 1;
            *counter
        };

        let parent_stack = self.instance(parent).stack;
        let ident = NodeIdent::new(kind, node.title.clone(), occurrence);
        let existing = self.stack(parent_stack).children.get(&ident).copied();
        let stack = match existing {
            Some(existing) => existing,
            None => {
                // First sight of this identity anywhere: allocate, then
                // register into the parent's child map (two-phase, so the
                // ordinal-disambiguated ident exists before the node is
                // discoverable).
                let stack = self.alloc_stack(StackData {
                    ident: ident.clone(),
                    parent: Some(parent_stack),
                    children: Default::default(),
                    instances: Default::default(),
                    next_ordinals: Default::default(),
                    index: StackIndex::default(),
                    payload: match kind {
                        NodeKind::Group => StackPayload::Group,
                        NodeKind::Function => StackPayload::Function { aggregate: None },
                        _ => unreachable!("scheduled nodes are groups or functions"),
                    },
                });
                self.stack_mut(parent_stack)
                    .children
                    .insert(ident.clone(), stack);
                let next = self
                    .stack_mut(parent_stack)
                    .next_ordinals
                    .entry((kind, node.title.clone()))
                    .or_insert(1);
                *next = (*next).max(occurrence + 1);
                stack
            }
        };

        let run_instance = self.instance(parent).run_instance;
        let conductor = self.instance(parent).conductor;
        let instance = self.alloc_instance(InstanceData {
            stack,
            parent: Some(parent),
            run_instance,
            conductor,
            children: Default::default(),
            index: InstanceIndex::default(),
            payload: match kind {
                NodeKind::Group => InstancePayload::Group { errors: Vec::new() },
                NodeKind::Function => InstancePayload::Function { result: None },
                _ => unreachable!(),
            },
        });
        self.instance_mut(parent)
            .children
            .insert(ident.clone(), instance);
        self.stack_mut(stack).instances.insert(run_instance, instance);
        self.suite_data_mut(suite).node_ids.insert(node.id, instance);

        if kind == NodeKind::Function {
            self.note_function_created(instance);
            // A fresh instance with no result can regress the stack's
            // aggregate back to undefined.
            self.recompute_function_aggregate(stack);
        }

        if let Some(children) = &node.children {
            for child in children {
                self.materialize(suite, instance, child)?;
            }
        }
        Ok(())
    }
}

/// The cross-conductor identity of a group of tests.
#[derive(Clone)]
pub struct TestGroupStack {
    pub(crate) tree: TreeRef,
    pub(crate) id: StackId,
}

stack_handle_impls!(TestGroupStack, TestGroup);

impl TestGroupStack {
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

/// One conductor's realization of a group.
#[derive(Clone)]
pub struct TestGroup {
    pub(crate) tree: TreeRef,
    pub(crate) id: InstanceId,
}

instance_handle_impls!(TestGroup, TestGroupStack);

impl TestGroup {
    /// Errors reported against this group, in report order.
    pub fn errors(&self) -> Vec<TestError> {
        let state = lock_tree(&self.tree);
        match &state.instance(self.id).payload {
            InstancePayload::Group { errors } => errors.clone(),
            _ => unreachable!("group handle points at a group instance"),
        }
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
}

/// The cross-conductor identity of a single test function. Always a leaf.
#[derive(Clone)]
pub struct TestFunctionStack {
    pub(crate) tree: TreeRef,
    pub(crate) id: StackId,
}

stack_handle_impls!(TestFunctionStack, TestFunction);

impl TestFunctionStack {
    /// The aggregated result across this function's instances.
    ///
    /// `None` until every instance that exists has reported; then the common
    /// kind if all agree, else [`AggregateResult::Mixed`].
    pub fn result_type(&self) -> Option<AggregateResult> {
        let state = lock_tree(&self.tree);
        match &state.stack(self.id).payload {
            StackPayload::Function { aggregate } => *aggregate,
            _ => unreachable!("function stack handle points at a function stack"),
        }
    }
}

/// One conductor's run of a test function.
#[derive(Clone)]
pub struct TestFunction {
    pub(crate) tree: TreeRef,
    pub(crate) id: InstanceId,
}

instance_handle_impls!(TestFunction, TestFunctionStack);

impl TestFunction {
    /// The result reported for this instance, if any yet.
    pub fn result(&self) -> Option<TestResult> {
        let state = lock_tree(&self.tree);
        match &state.instance(self.id).payload {
            InstancePayload::Function { result } => result.clone(),
            _ => unreachable!("function handle points at a function instance"),
        }
    }
}
