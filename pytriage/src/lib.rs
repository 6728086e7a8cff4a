// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Triage pytest logs and JUnit reports, and replay tests one at a time.
//!
//! `pytriage` sorts test results into hardware failures, backend compiler failures and ordinary
//! failures by looking at the output each test produced, and writes the results out as lists that
//! can be fed back into it to replay just the failing tests.
//!
//! The core logic lives in [`pytriage_runner`]. This crate only provides the command line.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputContext, OutputWriter};
