// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test status taxonomy and keyword-based reclassification.
//!
//! pytest only knows whether a test passed or failed. When triaging GPU test runs, it also matters
//! *why* a test failed: a segfault in the driver is a different bug from a failed assertion, and
//! a backend compiler crash is different again. [`StatusClassifier`] looks at the output a test
//! produced and refines the coarse status accordingly.

use crate::errors::KeywordSetBuildError;
use aho_corasick::AhoCorasick;
use std::fmt;

/// Hardware failure keywords used when none are configured.
pub const DEFAULT_HW_KEYWORDS: &[&str] = &["core dump", "hardware exception", "segmentation fault"];

/// Backend compiler (inductor) failure keywords used when none are configured.
///
/// Keywords are matched as substrings, so single common words make poor keywords.
pub const DEFAULT_INDUCTOR_KEYWORDS: &[&str] = &["triton compilation"];

/// The status of a single test after classification.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum TestStatus {
    /// The test passed and its output matched no keyword.
    Passed,

    /// The test failed and its output matched no keyword.
    Failed,

    /// The test failed in an expected way.
    Xfail,

    /// The test was skipped.
    Skipped,

    /// The test failed (or never finished) and its output matched a hardware keyword.
    HwFail,

    /// The test failed (or never finished) and its output matched a backend compiler keyword.
    InductorFailed,

    /// The test passed, but its output matched a hardware keyword.
    Warning,

    /// The test passed, but its output matched a backend compiler keyword.
    InductorWarning,

    /// No status line was seen for the test before the log moved on or ended.
    ///
    /// This typically means the test process crashed before pytest could report on it.
    Unresolved,
}

impl TestStatus {
    /// Parses a status token as printed by pytest: `PASSED`, `FAILED`, `XFAIL` or `SKIPPED`.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "PASSED" => Some(Self::Passed),
            "FAILED" => Some(Self::Failed),
            "XFAIL" => Some(Self::Xfail),
            "SKIPPED" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Returns the spelling used in reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Xfail => "XFAIL",
            Self::Skipped => "SKIPPED",
            Self::HwFail => "HWFAILED",
            Self::InductorFailed => "INDUCTOR_FAILED",
            Self::Warning => "WARNING",
            Self::InductorWarning => "INDUCTOR_WARNING",
            Self::Unresolved => "UNRESOLVED",
        }
    }

    /// Returns the directory kind that output for this status is saved under, if any.
    pub fn output_bucket(self) -> Option<OutputBucket> {
        match self {
            Self::HwFail | Self::Warning => Some(OutputBucket::Hardware),
            Self::InductorFailed | Self::InductorWarning => Some(OutputBucket::Inductor),
            Self::Failed => Some(OutputBucket::Failures),
            Self::Passed | Self::Xfail | Self::Skipped | Self::Unresolved => None,
        }
    }

    /// Returns true if this status indicates a problem worth looking at.
    pub fn is_problem(self) -> bool {
        !matches!(self, Self::Passed | Self::Xfail | Self::Skipped)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the output of a classified test is saved.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputBucket {
    /// Hardware failures and warnings.
    Hardware,

    /// Backend compiler failures and warnings.
    Inductor,

    /// Plain failures.
    Failures,
}

/// A set of keywords matched case-insensitively as substrings.
#[derive(Clone, Debug)]
pub struct KeywordSet {
    keywords: Vec<String>,
    matcher: AhoCorasick,
}

impl KeywordSet {
    /// Builds a keyword set. Keywords are trimmed and lowercased here, once.
    ///
    /// Keywords that are empty after trimming are dropped, since they would match any output.
    pub fn new(
        keywords: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self, KeywordSetBuildError> {
        let keywords: Vec<_> = keywords
            .into_iter()
            .filter_map(|keyword| {
                let keyword = keyword.as_ref().trim();
                (!keyword.is_empty()).then(|| keyword.to_lowercase())
            })
            .collect();
        let matcher =
            AhoCorasick::new(&keywords).map_err(|err| KeywordSetBuildError::new(&keywords, err))?;
        Ok(Self { keywords, matcher })
    }

    /// Returns the lowercased keywords in this set.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Returns true if any keyword occurs in `haystack`, which must already be lowercased.
    pub fn is_match(&self, haystack: &str) -> bool {
        self.matcher.is_match(haystack)
    }
}

/// Refines a coarse pytest status by looking at a test's output.
#[derive(Clone, Debug)]
pub struct StatusClassifier {
    hw: KeywordSet,
    inductor: KeywordSet,
}

impl StatusClassifier {
    /// Creates a classifier from hardware and backend compiler keyword sets.
    pub fn new(hw: KeywordSet, inductor: KeywordSet) -> Self {
        Self { hw, inductor }
    }

    /// Creates a classifier from keyword lists.
    pub fn from_keywords(
        hw: impl IntoIterator<Item = impl AsRef<str>>,
        inductor: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self, KeywordSetBuildError> {
        Ok(Self::new(KeywordSet::new(hw)?, KeywordSet::new(inductor)?))
    }

    /// Returns the hardware keyword set.
    pub fn hw_keywords(&self) -> &KeywordSet {
        &self.hw
    }

    /// Returns the backend compiler keyword set.
    pub fn inductor_keywords(&self) -> &KeywordSet {
        &self.inductor
    }

    /// Classifies a test given its coarse status and its full output, already lowercased.
    ///
    /// Keyword matches override the coarse status:
    ///
    /// * `PASSED` becomes `INDUCTOR_WARNING` on a backend keyword, else `WARNING` on a hardware
    ///   keyword. Backend keywords are checked first here.
    /// * `FAILED` becomes `HWFAILED` on a hardware keyword, else `INDUCTOR_FAILED` on a backend
    ///   keyword. Hardware keywords are checked first here, so they win ties.
    /// * `UNRESOLVED` is promoted exactly like `FAILED`, but stays `UNRESOLVED` without a match.
    /// * Every other status is returned unchanged.
    pub fn classify(&self, coarse: TestStatus, output_lowercased: &str) -> TestStatus {
        match coarse {
            TestStatus::Passed => {
                // Note the reversed precedence compared to the failing branches.
                if self.inductor.is_match(output_lowercased) {
                    TestStatus::InductorWarning
                } else if self.hw.is_match(output_lowercased) {
                    TestStatus::Warning
                } else {
                    TestStatus::Passed
                }
            }
            TestStatus::Failed | TestStatus::Unresolved => {
                if self.hw.is_match(output_lowercased) {
                    TestStatus::HwFail
                } else if self.inductor.is_match(output_lowercased) {
                    TestStatus::InductorFailed
                } else {
                    coarse
                }
            }
            other => other,
        }
    }

    /// Classifies a test given its coarse status and its output lines.
    ///
    /// The lines are joined with newlines and lowercased before matching.
    pub fn classify_lines(&self, coarse: TestStatus, lines: &[String]) -> TestStatus {
        let output = lines.join("\n").to_lowercase();
        self.classify(coarse, &output)
    }
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self::from_keywords(DEFAULT_HW_KEYWORDS, DEFAULT_INDUCTOR_KEYWORDS)
            .expect("default keywords are valid")
    }
}
