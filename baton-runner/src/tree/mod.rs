// Copyright (c) The baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dual stack/instance run tree.
//!
//! Every test element exists at two levels. A *Stack* node represents the
//! element's identity independent of which conductor reports it -- "the
//! group titled `parsing` inside suite X" -- matched by tree position and
//! ident across all conductors that report an equivalent structure. An
//! *Instance* node is one concrete realization of that identity for one
//! conductor, holding that conductor's result and error data. Each Instance
//! has exactly one owning Stack; each Stack maps run instances to the
//! Instances realizing it, populated lazily as conductors report matching
//! nodes.
//!
//! All node data lives in append-only arenas owned by the run; the public
//! node types are cheap cloneable handles into them. A run's tree only ever
//! grows -- nodes are never destroyed within a run's lifetime.

use crate::{
    conductor::TestConductor,
    errors::ReportError,
    events::{TestEvent, TestEventKind},
};
use debug_ignore::DebugIgnore;
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Identifies a Stack node within its run tree.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StackId(u32);

impl StackId {
    #[cfg(test)]
    pub(crate) fn new_for_tests(value: u32) -> Self {
        Self(value)
    }
}

/// Identifies an Instance node within its run tree.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct InstanceId(u32);

impl InstanceId {
    #[cfg(test)]
    pub(crate) fn new_for_tests(value: u32) -> Self {
        Self(value)
    }
}

/// Either side of the stack/instance duality.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum NodeKey {
    /// A Stack node.
    Stack(StackId),
    /// An Instance node.
    Instance(InstanceId),
}

pub(crate) type TreeRef = Arc<Mutex<TreeState>>;

/// Locks the tree, recovering from poisoning: the tree's invariants are
/// maintained per-mutation, so a panicked observer thread does not corrupt
/// it.
pub(crate) fn lock_tree(tree: &TreeRef) -> MutexGuard<'_, TreeState> {
    tree.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Generates the methods shared by every Stack-side handle.
macro_rules! stack_handle_impls {
    ($ty:ident, $inst:ident) => {
        impl $ty {
            pub(crate) fn from_parts(
                tree: crate::tree::TreeRef,
                id: crate::tree::StackId,
            ) -> Self {
                Self { tree, id }
            }

            /// A generic handle to this node.
            pub fn as_node(&self) -> crate::tree::TestNodeRef {
                crate::tree::TestNodeRef::new(
                    self.tree.clone(),
                    crate::tree::NodeKey::Stack(self.id),
                )
            }

            /// The node's within-parent identity.
            pub fn ident(&self) -> crate::tree::NodeIdent {
                crate::tree::lock_tree(&self.tree).stack(self.id).ident.clone()
            }

            /// The node's title as first reported.
            pub fn title(&self) -> smol_str::SmolStr {
                crate::tree::lock_tree(&self.tree)
                    .stack(self.id)
                    .ident
                    .title_smol()
            }

            /// Subscribes to events raised at or below this node.
            pub fn subscribe(&self) -> tokio::sync::mpsc::UnboundedReceiver<crate::events::TestEvent> {
                crate::tree::lock_tree(&self.tree).subscribe(crate::tree::NodeKey::Stack(self.id))
            }

            /// Walks the Stack ancestor chain, nearest first.
            pub fn ancestors(&self, include_self: bool) -> crate::tree::Ancestors {
                crate::tree::TestNodeRef::new(
                    self.tree.clone(),
                    crate::tree::NodeKey::Stack(self.id),
                )
                .ancestors(include_self)
            }

            /// Direct children as generic handles, in first-report order.
            pub fn children(&self) -> Vec<crate::tree::TestNodeRef> {
                let state = crate::tree::lock_tree(&self.tree);
                state
                    .stack(self.id)
                    .children
                    .values()
                    .map(|&id| {
                        crate::tree::TestNodeRef::new(
                            self.tree.clone(),
                            crate::tree::NodeKey::Stack(id),
                        )
                    })
                    .collect()
            }

            /// The instances realizing this identity, one per conductor that
            /// has reported it, in first-report order.
            pub fn instances(&self) -> Vec<$inst> {
                let state = crate::tree::lock_tree(&self.tree);
                state
                    .stack(self.id)
                    .instances
                    .values()
                    .map(|&id| $inst::from_parts(self.tree.clone(), id))
                    .collect()
            }

            /// Number of descendant suite/group instances carrying at least
            /// one error.
            pub fn error_count(&self) -> usize {
                crate::tree::lock_tree(&self.tree).stack(self.id).index.errors.len()
            }

            /// Number of distinct descendant test functions.
            pub fn test_count(&self) -> usize {
                crate::tree::lock_tree(&self.tree).stack(self.id).index.tests.len()
            }

            /// Number of descendant test functions whose aggregated result is
            /// `kind`.
            pub fn result_count(&self, kind: baton_metadata::ResultKind) -> usize {
                crate::tree::lock_tree(&self.tree)
                    .stack(self.id)
                    .index
                    .results
                    .count(kind)
            }

            /// Number of descendant test functions whose conductors disagree
            /// on the outcome.
            pub fn mixed_count(&self) -> usize {
                crate::tree::lock_tree(&self.tree).stack(self.id).index.mixed.len()
            }
        }

        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field("id", &self.id)
                    .field("ident", &self.ident().to_string())
                    .finish()
            }
        }

        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                std::sync::Arc::ptr_eq(&self.tree, &other.tree) && self.id == other.id
            }
        }

        impl Eq for $ty {}
    };
}

/// Generates the methods shared by every Instance-side handle.
macro_rules! instance_handle_impls {
    ($ty:ident, $stack:ident) => {
        impl $ty {
            pub(crate) fn from_parts(
                tree: crate::tree::TreeRef,
                id: crate::tree::InstanceId,
            ) -> Self {
                Self { tree, id }
            }

            /// A generic handle to this node.
            pub fn as_node(&self) -> crate::tree::TestNodeRef {
                crate::tree::TestNodeRef::new(
                    self.tree.clone(),
                    crate::tree::NodeKey::Instance(self.id),
                )
            }

            /// The node's within-parent identity (shared with its Stack).
            pub fn ident(&self) -> crate::tree::NodeIdent {
                let state = crate::tree::lock_tree(&self.tree);
                let stack = state.instance(self.id).stack;
                state.stack(stack).ident.clone()
            }

            /// The node's title as first reported.
            pub fn title(&self) -> smol_str::SmolStr {
                self.ident().title_smol()
            }

            /// The Stack node owning this instance.
            pub fn stack(&self) -> $stack {
                let stack = crate::tree::lock_tree(&self.tree).instance(self.id).stack;
                $stack::from_parts(self.tree.clone(), stack)
            }

            /// The name of the conductor this instance belongs to.
            pub fn conductor_name(&self) -> String {
                let state = crate::tree::lock_tree(&self.tree);
                let conductor = state.instance(self.id).conductor;
                state.conductors[conductor].name().to_owned()
            }

            /// Direct children as generic handles, in report order.
            pub fn children(&self) -> Vec<crate::tree::TestNodeRef> {
                let state = crate::tree::lock_tree(&self.tree);
                state
                    .instance(self.id)
                    .children
                    .values()
                    .map(|&id| {
                        crate::tree::TestNodeRef::new(
                            self.tree.clone(),
                            crate::tree::NodeKey::Instance(id),
                        )
                    })
                    .collect()
            }

            /// Subscribes to events raised at or below this node.
            pub fn subscribe(&self) -> tokio::sync::mpsc::UnboundedReceiver<crate::events::TestEvent> {
                crate::tree::lock_tree(&self.tree)
                    .subscribe(crate::tree::NodeKey::Instance(self.id))
            }

            /// Walks the Instance ancestor chain, nearest first.
            pub fn ancestors(&self, include_self: bool) -> crate::tree::Ancestors {
                crate::tree::TestNodeRef::new(
                    self.tree.clone(),
                    crate::tree::NodeKey::Instance(self.id),
                )
                .ancestors(include_self)
            }

            /// Number of descendant suite/group instances carrying at least
            /// one error.
            pub fn error_count(&self) -> usize {
                crate::tree::lock_tree(&self.tree)
                    .instance(self.id)
                    .index
                    .errors
                    .len()
            }

            /// Number of descendant test function instances.
            pub fn test_count(&self) -> usize {
                crate::tree::lock_tree(&self.tree)
                    .instance(self.id)
                    .index
                    .tests
                    .len()
            }

            /// Number of descendant function instances that reported `kind`.
            pub fn result_count(&self, kind: baton_metadata::ResultKind) -> usize {
                crate::tree::lock_tree(&self.tree)
                    .instance(self.id)
                    .index
                    .results
                    .count(kind)
            }
        }

        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field("id", &self.id)
                    .field("ident", &self.ident().to_string())
                    .finish()
            }
        }

        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                std::sync::Arc::ptr_eq(&self.tree, &other.tree) && self.id == other.id
            }
        }

        impl Eq for $ty {}
    };
}

mod elements;
mod ident;
mod index;
mod run;
mod suite;

pub use elements::{TestFunction, TestFunctionStack, TestGroup, TestGroupStack};
pub use ident::{NodeIdent, NodeKind};
pub use index::AggregateResult;
pub use run::{RunId, RunIdKind, RunStats, TestRunInstance, TestRunStack};
pub use suite::{SuiteReporter, SuiteState, TestError, TestResult, TestSuite, TestSuiteStack};

use index::{InstanceIndex, StackIndex};
use suite::SuiteData;

/// All node data for one run, owned by the [`TestRunStack`] value and shared
/// by reference with every handle.
pub(crate) struct TreeState {
    run_id: RunId,
    root: StackId,
    conductors: Vec<Arc<dyn TestConductor>>,
    stacks: Vec<StackData>,
    instances: Vec<InstanceData>,
    subscribers: HashMap<NodeKey, Vec<mpsc::UnboundedSender<TestEvent>>>,
}

pub(crate) struct StackData {
    pub(crate) ident: NodeIdent,
    pub(crate) parent: Option<StackId>,
    /// Children keyed by ident, in first-report order.
    pub(crate) children: IndexMap<NodeIdent, StackId>,
    /// Realizations of this identity, keyed by owning run instance.
    pub(crate) instances: IndexMap<InstanceId, InstanceId>,
    /// Next ordinal per (kind, title) among children, consulted once at
    /// stack-creation time.
    pub(crate) next_ordinals: HashMap<(NodeKind, SmolStr), u32>,
    pub(crate) index: StackIndex,
    pub(crate) payload: StackPayload,
}

pub(crate) enum StackPayload {
    Run,
    Suite { url: SmolStr },
    Group,
    Function { aggregate: Option<AggregateResult> },
}

impl StackPayload {
    fn kind(&self) -> NodeKind {
        match self {
            Self::Run => NodeKind::Run,
            Self::Suite { .. } => NodeKind::Suite,
            Self::Group => NodeKind::Group,
            Self::Function { .. } => NodeKind::Function,
        }
    }
}

pub(crate) struct InstanceData {
    pub(crate) stack: StackId,
    pub(crate) parent: Option<InstanceId>,
    /// Root of this instance chain; itself, for a run instance.
    pub(crate) run_instance: InstanceId,
    /// Index into `TreeState::conductors`.
    pub(crate) conductor: usize,
    /// Children keyed by ident, in first-report order.
    pub(crate) children: IndexMap<NodeIdent, InstanceId>,
    pub(crate) index: InstanceIndex,
    pub(crate) payload: InstancePayload,
}

pub(crate) enum InstancePayload {
    Run,
    Suite(SuiteData),
    Group { errors: Vec<TestError> },
    Function { result: Option<TestResult> },
}

impl InstancePayload {
    fn kind(&self) -> NodeKind {
        match self {
            Self::Run => NodeKind::Run,
            Self::Suite(_) => NodeKind::Suite,
            Self::Group { .. } => NodeKind::Group,
            Self::Function { .. } => NodeKind::Function,
        }
    }
}

impl TreeState {
    pub(crate) fn new(run_id: RunId, conductors: Vec<Arc<dyn TestConductor>>) -> Self {
        Self {
            run_id,
            root: StackId(0),
            conductors,
            stacks: Vec::new(),
            instances: Vec::new(),
            subscribers: HashMap::new(),
        }
    }

    pub(crate) fn run_id(&self) -> RunId {
        self.run_id
    }

    pub(crate) fn root(&self) -> StackId {
        self.root
    }

    pub(crate) fn stack(&self, id: StackId) -> &StackData {
        &self.stacks[id.0 as usize]
    }

    pub(crate) fn stack_mut(&mut self, id: StackId) -> &mut StackData {
        &mut self.stacks[id.0 as usize]
    }

    pub(crate) fn instance(&self, id: InstanceId) -> &InstanceData {
        &self.instances[id.0 as usize]
    }

    pub(crate) fn instance_mut(&mut self, id: InstanceId) -> &mut InstanceData {
        &mut self.instances[id.0 as usize]
    }

    /// Allocates a node value. Registration into parent/stack maps is the
    /// caller's second phase, so a node can consult its fully-built identity
    /// before becoming discoverable.
    pub(crate) fn alloc_stack(&mut self, data: StackData) -> StackId {
        let id = StackId(u32::try_from(self.stacks.len()).expect("stack arena fits in u32"));
        self.stacks.push(data);
        id
    }

    pub(crate) fn alloc_instance(&mut self, data: InstanceData) -> InstanceId {
        let id =
            InstanceId(u32::try_from(self.instances.len()).expect("instance arena fits in u32"));
        self.instances.push(data);
        id
    }

    pub(crate) fn next_instance_id(&self) -> InstanceId {
        InstanceId(u32::try_from(self.instances.len()).expect("instance arena fits in u32"))
    }

    pub(crate) fn conductor_of(&self, instance: InstanceId) -> &Arc<dyn TestConductor> {
        &self.conductors[self.instance(instance).conductor]
    }

    /// Ancestors of a stack node, nearest first, excluding `id` unless
    /// `include_self`.
    pub(crate) fn stack_ancestors(&self, id: StackId, include_self: bool) -> Vec<StackId> {
        let mut out = Vec::new();
        if include_self {
            out.push(id);
        }
        let mut cursor = self.stack(id).parent;
        while let Some(current) = cursor {
            out.push(current);
            cursor = self.stack(current).parent;
        }
        out
    }

    /// Ancestors of an instance node, nearest first, excluding `id` unless
    /// `include_self`.
    pub(crate) fn instance_ancestors(&self, id: InstanceId, include_self: bool) -> Vec<InstanceId> {
        let mut out = Vec::new();
        if include_self {
            out.push(id);
        }
        let mut cursor = self.instance(id).parent;
        while let Some(current) = cursor {
            out.push(current);
            cursor = self.instance(current).parent;
        }
        out
    }

    pub(crate) fn kind_of(&self, key: NodeKey) -> NodeKind {
        match key {
            NodeKey::Stack(id) => self.stack(id).payload.kind(),
            NodeKey::Instance(id) => self.instance(id).payload.kind(),
        }
    }

    pub(crate) fn ident_of(&self, key: NodeKey) -> NodeIdent {
        match key {
            NodeKey::Stack(id) => self.stack(id).ident.clone(),
            NodeKey::Instance(id) => self.stack(self.instance(id).stack).ident.clone(),
        }
    }

    pub(crate) fn subscribe(&mut self, key: NodeKey) -> UnboundedReceiver<TestEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.entry(key).or_default().push(tx);
        rx
    }

    /// Raises `kind` at `origin` and delivers it to the origin instance, its
    /// owning stack, and every ancestor on both chains.
    ///
    /// The stack notification is an explicit second call rather than part of
    /// a shared hierarchy, keeping the two chains decoupled.
    pub(crate) fn dispatch(&mut self, tree: &TreeRef, origin: InstanceId, kind: TestEventKind) {
        let origin_stack = self.instance(origin).stack;
        let mut targets = vec![NodeKey::Instance(origin), NodeKey::Stack(origin_stack)];
        targets.extend(
            self.instance_ancestors(origin, false)
                .into_iter()
                .map(NodeKey::Instance),
        );
        targets.extend(
            self.stack_ancestors(origin_stack, false)
                .into_iter()
                .map(NodeKey::Stack),
        );

        let event = TestEvent::new(
            TestNodeRef::new(tree.clone(), NodeKey::Instance(origin)),
            kind,
        );
        for key in targets {
            if let Some(senders) = self.subscribers.get_mut(&key) {
                senders.retain(|tx| tx.send(event.clone()).is_ok());
            }
        }
    }

    // ---
    // Index maintenance
    // ---

    /// Records a newly-materialized test function in the `tests` facet of
    /// every ancestor on both chains.
    pub(crate) fn note_function_created(&mut self, func: InstanceId) {
        let stack = self.instance(func).stack;
        for ancestor in self.instance_ancestors(func, false) {
            self.instance_mut(ancestor).index.tests.insert(func);
        }
        for ancestor in self.stack_ancestors(stack, false) {
            self.stack_mut(ancestor).index.tests.insert(stack);
        }
    }

    /// Appends `error` to `target`'s error list and marks `target` in the
    /// `errors` facet of every ancestor on both chains. `target` must be a
    /// suite or group instance.
    pub(crate) fn attach_error(&mut self, tree: &TreeRef, target: InstanceId, error: TestError) {
        match &mut self.instance_mut(target).payload {
            InstancePayload::Suite(data) => data.errors.push(error.clone()),
            InstancePayload::Group { errors } => errors.push(error.clone()),
            InstancePayload::Run | InstancePayload::Function { .. } => {
                unreachable!("errors only attach to suite or group instances")
            }
        }

        let stack = self.instance(target).stack;
        for ancestor in self.instance_ancestors(target, false) {
            self.instance_mut(ancestor).index.errors.insert(target);
        }
        for ancestor in self.stack_ancestors(stack, false) {
            self.stack_mut(ancestor).index.errors.insert(target);
        }

        self.dispatch(tree, target, TestEventKind::Error { error });
    }

    /// Sets the one-shot result on a function instance, updates the result
    /// facets on the instance chain, and re-aggregates the owning function
    /// stack.
    pub(crate) fn record_result(
        &mut self,
        tree: &TreeRef,
        func: InstanceId,
        node_id: u64,
        result: TestResult,
    ) -> Result<(), ReportError> {
        match &mut self.instance_mut(func).payload {
            InstancePayload::Function { result: slot } => {
                if slot.is_some() {
                    return Err(ReportError::ResultAlreadySet { id: node_id });
                }
                *slot = Some(result.clone());
            }
            _ => unreachable!("record_result targets function instances"),
        }

        let kind = result.kind;
        for ancestor in self.instance_ancestors(func, false) {
            self.instance_mut(ancestor)
                .index
                .results
                .set_mut(kind)
                .insert(func);
        }

        let stack = self.instance(func).stack;
        self.recompute_function_aggregate(stack);

        self.dispatch(tree, func, TestEventKind::Result { result });
        Ok(())
    }

    /// Recomputes a function stack's aggregated result by scanning only its
    /// own instance mapping, then relocates the stack inside every stack
    /// ancestor's result facets if the aggregate changed.
    pub(crate) fn recompute_function_aggregate(&mut self, stack: StackId) {
        let mut aggregate: Option<AggregateResult> = None;
        for &instance in self.stack(stack).instances.values() {
            let InstancePayload::Function { result } = &self.instance(instance).payload else {
                unreachable!("function stack instances are function instances")
            };
            let Some(result) = result else {
                // Undefined until every instance that exists has reported.
                aggregate = None;
                break;
            };
            aggregate = match aggregate {
                None => Some(AggregateResult::Kind(result.kind)),
                Some(AggregateResult::Kind(kind)) if kind == result.kind => {
                    Some(AggregateResult::Kind(kind))
                }
                Some(_) => Some(AggregateResult::Mixed),
            };
        }
        if self.stack(stack).instances.is_empty() {
            aggregate = None;
        }

        let previous = match &self.stack(stack).payload {
            StackPayload::Function { aggregate } => *aggregate,
            _ => unreachable!("recompute_function_aggregate targets function stacks"),
        };
        if previous == aggregate {
            return;
        }

        match &mut self.stack_mut(stack).payload {
            StackPayload::Function {
                aggregate: stored, ..
            } => *stored = aggregate,
            _ => unreachable!(),
        }
        for ancestor in self.stack_ancestors(stack, false) {
            self.stack_mut(ancestor)
                .index
                .relocate_result(stack, aggregate);
        }
    }
}

/// A handle to any node in a run tree, Stack or Instance.
///
/// This is the generic form carried in event payloads; typed handles
/// ([`TestSuite`], [`TestFunctionStack`], ...) offer the same navigation
/// with kind-specific accessors.
#[derive(Clone)]
pub struct TestNodeRef {
    tree: DebugIgnore<TreeRef>,
    key: NodeKey,
}

impl TestNodeRef {
    pub(crate) fn new(tree: TreeRef, key: NodeKey) -> Self {
        Self {
            tree: DebugIgnore(tree),
            key,
        }
    }

    /// The node's key within its run tree.
    pub fn key(&self) -> NodeKey {
        self.key
    }

    /// True if this is a Stack-side handle.
    pub fn is_stack(&self) -> bool {
        matches!(self.key, NodeKey::Stack(_))
    }

    /// The node's kind.
    pub fn kind(&self) -> NodeKind {
        lock_tree(&self.tree).kind_of(self.key)
    }

    /// The node's within-parent identity.
    pub fn ident(&self) -> NodeIdent {
        lock_tree(&self.tree).ident_of(self.key)
    }

    /// The node's title as first reported.
    pub fn title(&self) -> SmolStr {
        self.ident().title_smol()
    }

    /// Walks the node's ancestor chain, nearest first. The sequence is lazy
    /// and finite, stays within one chain (Stack or Instance, never mixed),
    /// and can be restarted by calling this again.
    pub fn ancestors(&self, include_self: bool) -> Ancestors {
        let start = if include_self {
            Some(self.key)
        } else {
            let state = lock_tree(&self.tree);
            match self.key {
                NodeKey::Stack(id) => state.stack(id).parent.map(NodeKey::Stack),
                NodeKey::Instance(id) => state.instance(id).parent.map(NodeKey::Instance),
            }
        };
        Ancestors {
            tree: self.tree.0.clone(),
            next: start,
        }
    }

    /// Subscribes to events raised at or below this node.
    pub fn subscribe(&self) -> UnboundedReceiver<TestEvent> {
        lock_tree(&self.tree).subscribe(self.key)
    }

    /// Downcast to a suite instance handle.
    pub fn as_suite(&self) -> Option<TestSuite> {
        match (self.key, self.kind()) {
            (NodeKey::Instance(id), NodeKind::Suite) => {
                Some(TestSuite::from_parts(self.tree.0.clone(), id))
            }
            _ => None,
        }
    }

    /// Downcast to a group instance handle.
    pub fn as_group(&self) -> Option<TestGroup> {
        match (self.key, self.kind()) {
            (NodeKey::Instance(id), NodeKind::Group) => {
                Some(TestGroup::from_parts(self.tree.0.clone(), id))
            }
            _ => None,
        }
    }

    /// Downcast to a function instance handle.
    pub fn as_function(&self) -> Option<TestFunction> {
        match (self.key, self.kind()) {
            (NodeKey::Instance(id), NodeKind::Function) => {
                Some(TestFunction::from_parts(self.tree.0.clone(), id))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for TestNodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestNodeRef")
            .field("key", &self.key)
            .field("ident", &self.ident().to_string())
            .finish()
    }
}

impl PartialEq for TestNodeRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tree, &other.tree) && self.key == other.key
    }
}

impl Eq for TestNodeRef {}

/// Lazy iterator over a node's ancestor chain. Returned by `ancestors` on
/// every handle type.
#[derive(Clone)]
pub struct Ancestors {
    tree: TreeRef,
    next: Option<NodeKey>,
}

impl Iterator for Ancestors {
    type Item = TestNodeRef;

    fn next(&mut self) -> Option<TestNodeRef> {
        let key = self.next?;
        {
            let state = lock_tree(&self.tree);
            self.next = match key {
                NodeKey::Stack(id) => state.stack(id).parent.map(NodeKey::Stack),
                NodeKey::Instance(id) => state.instance(id).parent.map(NodeKey::Instance),
            };
        }
        Some(TestNodeRef::new(self.tree.clone(), key))
    }
}
