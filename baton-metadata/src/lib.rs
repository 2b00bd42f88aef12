// Copyright (c) The baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured wire types for the baton conductor reporting protocol.
//!
//! A conductor executes a test suite's code in some concrete environment (a
//! browser tab, a server runtime) and relays that environment's
//! test-framework events back to the orchestrator, typically as one JSON
//! message per event. This crate defines those message shapes so conductor
//! implementations can depend on them without pulling in the runner itself.
//!
//! The reference transport is an HTTP POST of one JSON object per event; any
//! transport works as long as it preserves the per-suite ordering of
//! [`SuiteMessage::Schedule`] reports, since node identity is derived from
//! first-sight order.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

/// The outcome of a single test function run, as reported by a conductor.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    /// The test passed.
    Success,

    /// The test failed an assertion or threw.
    Fail,

    /// The test exceeded its time budget.
    Timeout,

    /// The test was skipped by the remote framework.
    Skipped,
}

impl ResultKind {
    /// All variants, in wire order.
    pub const ALL: &'static [Self] = &[Self::Success, Self::Fail, Self::Timeout, Self::Skipped];

    /// Returns the string used on the wire and in log output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Fail => "fail",
            Self::Timeout => "timeout",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A test element declared by a [`SuiteMessage::Schedule`] report.
///
/// A node carrying `children` (even an empty list) declares a group; a node
/// without declares a test function. `id` is assigned by the conductor and
/// is scoped to one suite execution: redeclaring an id within the same
/// execution is a protocol violation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReportedNode {
    /// Numeric id assigned by the conductor, unique within one suite
    /// execution.
    pub id: u64,

    /// The element's title as declared in the test source.
    pub title: SmolStr,

    /// Child declarations. Present (possibly empty) for groups, absent for
    /// test functions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ReportedNode>>,
}

impl ReportedNode {
    /// Declares a test function.
    pub fn function(id: u64, title: impl Into<SmolStr>) -> Self {
        Self {
            id,
            title: title.into(),
            children: None,
        }
    }

    /// Declares a group with the given children.
    pub fn group(id: u64, title: impl Into<SmolStr>, children: Vec<ReportedNode>) -> Self {
        Self {
            id,
            title: title.into(),
            children: Some(children),
        }
    }

    /// Returns true if this node declares a group.
    pub fn is_group(&self) -> bool {
        self.children.is_some()
    }
}

/// Wire form of an error reported against a suite or group.
///
/// Conductors forward whatever the remote framework produced: either a bare
/// message string or a structured error with a stack trace.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorPayload {
    /// A bare message string.
    Message(SmolStr),

    /// A structured error with an optional stack trace.
    Detail {
        /// The error message.
        message: SmolStr,
        /// The remote stack trace, if one was captured.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },
}

impl ErrorPayload {
    /// The error message, whichever form it arrived in.
    pub fn message(&self) -> &str {
        match self {
            Self::Message(message) => message,
            Self::Detail { message, .. } => message,
        }
    }

    /// The remote stack trace, if one was captured.
    pub fn stack(&self) -> Option<&str> {
        match self {
            Self::Message(_) => None,
            Self::Detail { stack, .. } => stack.as_deref(),
        }
    }
}

/// Describes the lifecycle hook an error was raised in.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HookSpec {
    /// The hook kind as named by the remote framework (`beforeEach`,
    /// `after`, ...). Kept as a string: the orchestrator does not interpret
    /// it, only records it.
    #[serde(rename = "type")]
    pub kind: SmolStr,

    /// Zero-based position among hooks of this kind on the node.
    pub index: u32,

    /// The hook's display name, if the framework assigns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<SmolStr>,

    /// True if the error came from the hook's cleanup callback rather than
    /// the hook body.
    #[serde(default, skip_serializing_if = "is_false")]
    pub cleanup: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Result payload of a [`SuiteMessage::Result`] message.
///
/// The outcome kind lives under `result.type` on the wire; the message's own
/// `type` field is the message tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    /// The outcome kind.
    #[serde(rename = "type")]
    pub kind: ResultKind,

    /// Failure detail for `fail` and `timeout` outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,

    /// Wall-clock duration of the run, in fractional milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl ResultPayload {
    /// A payload with just an outcome kind.
    pub fn new(kind: ResultKind) -> Self {
        Self {
            kind,
            error: None,
            duration: None,
        }
    }
}

/// One conductor-to-orchestrator message.
///
/// Callbacks may arrive in any order and interleaving, zero or more times
/// each; the orchestrator validates every message against the suite's
/// current state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum SuiteMessage {
    /// Declares newly-discovered nodes, recursively.
    Schedule {
        /// The declared nodes. Top-level entries attach to the suite itself.
        nodes: Vec<ReportedNode>,
    },

    /// Attaches an error to a previously-declared group, or to the suite
    /// itself when `node_id` is absent.
    Error {
        /// Target node id; the suite itself if absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_id: Option<u64>,
        /// The reported error.
        error: ErrorPayload,
        /// The lifecycle hook the error was raised in, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hook: Option<HookSpec>,
    },

    /// Records a test function's one-shot result.
    Result {
        /// Target node id; must refer to a test function.
        node_id: u64,
        /// The recorded outcome.
        result: ResultPayload,
    },

    /// Signals that the remote side is done, optionally carrying coverage
    /// data.
    Complete {
        /// Opaque coverage payload, forwarded as-is.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        coverage: Option<serde_json::Value>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ResultKind::Success, "success")]
    #[test_case(ResultKind::Fail, "fail")]
    #[test_case(ResultKind::Timeout, "timeout")]
    #[test_case(ResultKind::Skipped, "skipped")]
    fn result_kind_wire_form(kind: ResultKind, expected: &str) {
        assert_eq!(kind.as_str(), expected);
        let json = serde_json::to_string(&kind).expect("serializable");
        assert_eq!(json, format!("\"{expected}\""));
    }

    #[test]
    fn schedule_round_trip() {
        let message = SuiteMessage::Schedule {
            nodes: vec![ReportedNode::group(
                1,
                "parsing",
                vec![
                    ReportedNode::function(2, "accepts empty input"),
                    ReportedNode::group(3, "errors", vec![]),
                ],
            )],
        };
        let json = serde_json::to_value(&message).expect("serializable");
        assert_eq!(json["type"], "schedule");
        assert_eq!(json["nodes"][0]["children"][0]["id"], 2);
        // A function must not serialize a `children` key at all.
        assert!(json["nodes"][0]["children"][0].get("children").is_none());
        let back: SuiteMessage = serde_json::from_value(json).expect("deserializable");
        assert_eq!(back, message);
    }

    #[test]
    fn error_message_accepts_bare_string() {
        let raw = r#"{"type":"error","nodeId":4,"error":"boom"}"#;
        let message: SuiteMessage = serde_json::from_str(raw).expect("deserializable");
        let SuiteMessage::Error {
            node_id,
            error,
            hook,
        } = &message
        else {
            panic!("expected error message, got {message:?}");
        };
        assert_eq!(*node_id, Some(4));
        assert_eq!(error.message(), "boom");
        assert_eq!(error.stack(), None);
        assert!(hook.is_none());
    }

    #[test]
    fn error_message_accepts_detail_and_hook() {
        let raw = r#"{
            "type": "error",
            "error": {"message": "hook blew up", "stack": "at setup.js:3"},
            "hook": {"type": "beforeEach", "index": 1, "name": "login", "cleanup": true}
        }"#;
        let message: SuiteMessage = serde_json::from_str(raw).expect("deserializable");
        let SuiteMessage::Error {
            node_id,
            error,
            hook,
        } = message
        else {
            panic!("expected error message");
        };
        assert_eq!(node_id, None);
        assert_eq!(error.stack(), Some("at setup.js:3"));
        let hook = hook.expect("hook present");
        assert_eq!(hook.kind, "beforeEach");
        assert_eq!(hook.index, 1);
        assert_eq!(hook.name.as_deref(), Some("login"));
        assert!(hook.cleanup);
    }

    #[test]
    fn result_round_trip() {
        let message = SuiteMessage::Result {
            node_id: 7,
            result: ResultPayload {
                kind: ResultKind::Fail,
                error: Some(ErrorPayload::Message("expected 2, got 3".into())),
                duration: Some(12.5),
            },
        };
        let json = serde_json::to_value(&message).expect("serializable");
        assert_eq!(json["type"], "result");
        assert_eq!(json["nodeId"], 7);
        assert_eq!(json["result"]["type"], "fail");
        assert_eq!(json["result"]["duration"], 12.5);
        let back: SuiteMessage = serde_json::from_value(json).expect("deserializable");
        assert_eq!(back, message);
    }

    #[test]
    fn complete_omits_absent_coverage() {
        let message = SuiteMessage::Complete { coverage: None };
        let json = serde_json::to_string(&message).expect("serializable");
        assert_eq!(json, r#"{"type":"complete"}"#);

        let with_coverage = SuiteMessage::Complete {
            coverage: Some(serde_json::json!({"lines": 42})),
        };
        let json = serde_json::to_value(&with_coverage).expect("serializable");
        assert_eq!(json["coverage"]["lines"], 42);
    }
}
