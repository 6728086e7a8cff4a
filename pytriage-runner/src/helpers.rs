// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for pytriage-runner.

use std::process::ExitStatus;

/// Utilities for pluralizing various words based on count.
pub mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "iteration" if `count` is 1, otherwise "iterations".
    pub fn iterations_str(count: usize) -> &'static str {
        if count == 1 {
            "iteration"
        } else {
            "iterations"
        }
    }
}

/// Returns the exit code of a process, with termination by a signal mapped to the negated signal
/// number.
///
/// A status with neither a code nor a signal maps to -1.
pub fn signed_exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    -1
}

/// Turns a test name into a single file name component by replacing path separators with `.`.
///
/// Parametrized test ids such as `test_x[a/b]` may contain `/`.
pub(crate) fn file_name_component(name: &str) -> String {
    name.replace(['/', '\\'], ".")
}

// "exited with"/"aborted with"
pub(crate) fn display_exit_code(exit_code: i32) -> String {
    if exit_code >= 0 {
        return format!("exited with exit code {exit_code}");
    }

    let signal = -exit_code;
    match signal_str(signal) {
        Some(s) => format!("aborted with signal {signal} (SIG{s})"),
        None => format!("aborted with signal {signal}"),
    }
}

pub(crate) fn signal_str(signal: i32) -> Option<&'static str> {
    // These signal numbers are the same on at least Linux, macOS, FreeBSD and illumos.
    match signal {
        1 => Some("HUP"),
        2 => Some("INT"),
        3 => Some("QUIT"),
        4 => Some("ILL"),
        5 => Some("TRAP"),
        6 => Some("ABRT"),
        7 => Some("BUS"),
        8 => Some("FPE"),
        9 => Some("KILL"),
        11 => Some("SEGV"),
        13 => Some("PIPE"),
        14 => Some("ALRM"),
        15 => Some("TERM"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, "exited with exit code 0")]
    #[test_case(1, "exited with exit code 1")]
    #[test_case(-11, "aborted with signal 11 (SIGSEGV)")]
    #[test_case(-6, "aborted with signal 6 (SIGABRT)")]
    #[test_case(-42, "aborted with signal 42")]
    fn display_exit_codes(exit_code: i32, expected: &str) {
        assert_eq!(display_exit_code(exit_code), expected);
    }

    #[test_case("test_add", "test_add" ; "plain")]
    #[test_case("test_x[a/b]", "test_x[a.b]" ; "slash")]
    #[test_case("a.C.test_x[c:\\tmp]", "a.C.test_x[c:.tmp]" ; "backslash")]
    fn file_name_components(name: &str, expected: &str) {
        assert_eq!(file_name_component(name), expected);
    }

    #[test_case(1, "test", "iteration")]
    #[test_case(2, "tests", "iterations")]
    #[test_case(0, "tests", "iterations")]
    fn plurals(count: usize, tests: &str, iterations: &str) {
        assert_eq!(plural::tests_str(count), tests);
        assert_eq!(plural::iterations_str(count), iterations);
    }

    #[cfg(unix)]
    #[test]
    fn signed_exit_code_from_signal() {
        use std::os::unix::process::ExitStatusExt;

        // Raw wait statuses: the low 7 bits hold the signal, the next byte the exit code.
        assert_eq!(signed_exit_code(ExitStatus::from_raw(9)), -9);
        assert_eq!(signed_exit_code(ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(signed_exit_code(ExitStatus::from_raw(0)), 0);
    }
}
