// Copyright (c) The baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core orchestration for baton.
//!
//! baton runs the same logical list of test files against multiple
//! independent execution environments ("conductors" -- e.g. a browser engine
//! and a server runtime), collects results and errors reported
//! asynchronously and out-of-order from each conductor, and presents a
//! single aggregated view of test identity, state and outcome across all of
//! them.
//!
//! The centerpiece is the dual run tree in [`tree`]: every test element
//! exists once as a *Stack* node (its identity independent of which
//! conductor reports it) and once per conductor as an *Instance* node (one
//! concrete realization with that conductor's data). Incremental set-based
//! indices keep error, test and result counts queryable at every level of
//! the tree, and the scheduler in [`runner`] drives suite execution with a
//! parallelism bound and cooperative cancellation.

pub mod abort;
pub mod conductor;
pub mod errors;
pub mod events;
pub mod runner;
pub mod tree;

#[cfg(test)]
mod test_helpers;
