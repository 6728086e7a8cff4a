// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `pytriage` failures.
///
/// `pytriage` invocations may fail for a variety of reasons. This structure documents the exit
/// codes that may occur in case of expected failures.
///
/// Failures of the tests being triaged or replayed are *not* failures of `pytriage`: they are the
/// information being collected, and never change the exit code.
pub enum TriageExitCode {}

impl TriageExitCode {
    /// No errors occurred and pytriage exited normally.
    pub const OK: i32 = 0;

    /// An input file (log, JUnit report or suite file) was missing, unreadable or malformed.
    pub const INPUT_ERROR: i32 = 1;

    /// A user issue happened while setting up a pytriage invocation, for example an invalid
    /// configuration file or an unknown profile.
    pub const SETUP_ERROR: i32 = 96;

    /// Writing reports, summaries, transcripts, or data to stdout or stderr produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}
