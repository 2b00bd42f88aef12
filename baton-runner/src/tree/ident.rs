// Copyright (c) The baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Node identity: kinds and ordinal-disambiguated idents.

use smol_str::SmolStr;
use std::fmt;

/// The kind of a node in the run tree.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum NodeKind {
    /// The run root: one per orchestration invocation.
    Run,

    /// A test suite: one per test file URL.
    Suite,

    /// A group of tests, dynamically reported.
    Group,

    /// A single test function, dynamically reported. Always a leaf.
    Function,
}

impl NodeKind {
    /// The string used in idents and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Run => "TestRun",
            Self::Suite => "TestSuite",
            Self::Group => "TestGroup",
            Self::Function => "TestFunction",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The within-parent identity key of a node: kind, title, and a
/// disambiguating ordinal.
///
/// The first node of a given kind and title under a parent gets ordinal 1;
/// each further same-kind same-title sibling gets the next ordinal, in the
/// order the nodes are first reported. Idents are what reconcile different
/// conductors' reports into a single Stack node: conductors reporting
/// equivalent trees in the same order resolve to the same idents.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeIdent {
    kind: NodeKind,
    title: SmolStr,
    ordinal: u32,
}

impl NodeIdent {
    pub(crate) fn new(kind: NodeKind, title: impl Into<SmolStr>, ordinal: u32) -> Self {
        Self {
            kind,
            title: title.into(),
            ordinal,
        }
    }

    /// The node kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// The title as first reported.
    pub fn title(&self) -> &str {
        &self.title
    }

    pub(crate) fn title_smol(&self) -> SmolStr {
        self.title.clone()
    }

    /// The disambiguating ordinal, 1-based.
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }
}

impl fmt::Display for NodeIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.title, self.ordinal)
    }
}
