// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Metadata shared between `pytriage` and its consumers.
//!
//! Currently this contains the documented process exit codes, see [`TriageExitCode`].

mod exit_codes;

pub use exit_codes::*;
