// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for [pytriage](https://crates.io/crates/pytriage): classifying pytest logs
//! and JUnit reports, and replaying tests one at a time.
//!
//! The pieces, leaves first:
//!
//! * [`identity`]: the `(module, class, method)` triple every result is keyed by.
//! * [`classify`]: refining pass/fail into hardware and backend compiler failures.
//! * [`scanner`]: a streaming state machine over pytest text logs.
//! * [`junit`]: the same taxonomy over JUnit XML reports, written out as summary lists.
//! * [`suite`]: loading lists of tests in several formats.
//! * [`replay`]: running each test of a suite in its own process.

pub mod classify;
pub mod config;
pub mod errors;
pub mod helpers;
pub mod identity;
pub mod junit;
pub mod replay;
pub mod scanner;
pub mod suite;
