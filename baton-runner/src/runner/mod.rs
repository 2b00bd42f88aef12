// Copyright (c) The baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The scheduler: bounded-parallelism sweeps over pending suites with
//! cooperative cancellation.

mod imp;

pub use imp::TestRunManager;
