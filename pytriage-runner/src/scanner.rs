// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming scanner for pytest text logs.
//!
//! The main structure in this module is [`LogScanner`]. It drives [`ScanState`], an explicit state
//! machine that tracks the test currently being reported on, one line at a time.
//!
//! Logs handed over by QA can be many gigabytes, so the scanner never holds more than the output of
//! the current test. A decision about a test is emitted when the test is *flushed*: when a
//! different test identity appears, or when the log ends. Until then, further status lines for the
//! same test (reruns of flaky tests) replace the earlier status, so the last one wins.

use crate::{
    classify::{OutputBucket, StatusClassifier, TestStatus},
    errors::{KeywordSetBuildError, LogScanError, OutputDirCreateError, WriteReportError},
    helpers::file_name_component,
    identity::TestIdentity,
};
use camino::{Utf8Path, Utf8PathBuf};
use owo_colors::{OwoColorize, Style};
use regex::Regex;
use std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    io::{BufRead, BufReader, Write},
    sync::LazyLock,
};
use tracing::debug;

static STATUS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(PASSED|FAILED|XFAIL|SKIPPED)(\s+\[\d+\.\d+s\])?").expect("status regex is valid")
});

/// Finds a pytest status token anywhere in `line`.
fn find_status_token(line: &str) -> Option<TestStatus> {
    let captures = STATUS_REGEX.captures(line)?;
    TestStatus::from_token(&captures[1])
}

/// The output collected for a single test so far.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestRun {
    identity: TestIdentity,
    output: Vec<String>,
}

impl TestRun {
    fn new(identity: TestIdentity, first_line: &str) -> Self {
        Self {
            identity,
            output: vec![first_line.to_owned()],
        }
    }

    /// Returns the identity of the test.
    pub fn identity(&self) -> &TestIdentity {
        &self.identity
    }

    /// Returns the lines seen for this test, in order.
    pub fn output(&self) -> &[String] {
        &self.output
    }
}

/// The state of the log scanner between two lines.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum ScanState {
    /// No test identity has been seen yet.
    #[default]
    NoActiveTest,

    /// A test identity has been seen, but no status line for it yet.
    TrackingUnresolved(TestRun),

    /// A status line has been matched for the current test.
    TrackingResolved {
        /// The output collected for the test.
        run: TestRun,

        /// The classified status from the most recent status line.
        status: TestStatus,
    },
}

/// The final decision about a test, produced when it is flushed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Decision {
    /// The test and the output collected for it.
    pub run: TestRun,

    /// The classified status.
    pub status: TestStatus,
}

impl ScanState {
    /// Returns the identity of the test being tracked, if any.
    pub fn current_identity(&self) -> Option<&TestIdentity> {
        match self {
            Self::NoActiveTest => None,
            Self::TrackingUnresolved(run) | Self::TrackingResolved { run, .. } => {
                Some(&run.identity)
            }
        }
    }

    /// Consumes a single line, returning the next state and the decision for a test flushed by
    /// this line, if any.
    ///
    /// `line` should already have surrounding whitespace stripped.
    pub fn on_line(self, line: &str, classifier: &StatusClassifier) -> (Self, Option<Decision>) {
        let identity = TestIdentity::parse_pytest(line);
        let token = find_status_token(line);

        match identity {
            Some(identity) if self.current_identity() == Some(&identity) => {
                // Same test: keep collecting, and treat a status token as an update. This is how
                // reruns replace earlier statuses.
                let next = match (self, token) {
                    (Self::TrackingUnresolved(mut run), token) => {
                        run.output.push(line.to_owned());
                        resolve_if(run, token, classifier)
                    }
                    (Self::TrackingResolved { mut run, status }, token) => {
                        run.output.push(line.to_owned());
                        match token {
                            Some(coarse) => {
                                let status = classifier.classify_lines(coarse, &run.output);
                                Self::TrackingResolved { run, status }
                            }
                            None => Self::TrackingResolved { run, status },
                        }
                    }
                    (Self::NoActiveTest, _) => unreachable!("an identity is being tracked"),
                };
                (next, None)
            }
            Some(identity) => {
                let flushed = self.finish(classifier);
                let run = TestRun::new(identity, line);
                (resolve_if(run, token, classifier), flushed)
            }
            None => match self {
                Self::NoActiveTest => (Self::NoActiveTest, None),
                Self::TrackingUnresolved(mut run) => {
                    run.output.push(line.to_owned());
                    (resolve_if(run, token, classifier), None)
                }
                // Once resolved, unrelated lines are no longer collected.
                resolved @ Self::TrackingResolved { .. } => (resolved, None),
            },
        }
    }

    /// Flushes the tracked test at the end of the stream (or before switching tests).
    ///
    /// A test that never saw a status line is classified starting from `UNRESOLVED`.
    pub fn finish(self, classifier: &StatusClassifier) -> Option<Decision> {
        match self {
            Self::NoActiveTest => None,
            Self::TrackingUnresolved(run) => {
                let status = classifier.classify_lines(TestStatus::Unresolved, &run.output);
                Some(Decision { run, status })
            }
            Self::TrackingResolved { run, status } => Some(Decision { run, status }),
        }
    }
}

fn resolve_if(
    run: TestRun,
    token: Option<TestStatus>,
    classifier: &StatusClassifier,
) -> ScanState {
    match token {
        Some(coarse) => {
            let status = classifier.classify_lines(coarse, &run.output);
            ScanState::TrackingResolved { run, status }
        }
        None => ScanState::TrackingUnresolved(run),
    }
}

/// Identity/status combinations that have already been reported.
///
/// Holds at most one entry per identity: the status last reported for it.
#[derive(Clone, Debug, Default)]
pub struct ReportedSet {
    reported: HashMap<TestIdentity, TestStatus>,
}

impl ReportedSet {
    /// Returns true if exactly this status has already been reported for the identity.
    pub fn contains(&self, identity: &TestIdentity, status: TestStatus) -> bool {
        self.reported.get(identity) == Some(&status)
    }

    /// Returns the status last reported for the identity.
    pub fn get(&self, identity: &TestIdentity) -> Option<TestStatus> {
        self.reported.get(identity).copied()
    }

    /// Returns the number of identities reported.
    pub fn len(&self) -> usize {
        self.reported.len()
    }

    /// Returns true if nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.reported.is_empty()
    }

    fn record(&mut self, identity: TestIdentity, status: TestStatus) {
        self.reported.insert(identity, status);
    }
}

/// Which statuses get printed to the result stream.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ReportPolicy {
    /// Report `PASSED` tests.
    pub report_passed: bool,

    /// Report `SKIPPED` and `XFAIL` tests.
    pub report_skipped: bool,
}

impl ReportPolicy {
    /// Returns true if a decision with this status should be printed.
    pub fn should_report(self, status: TestStatus) -> bool {
        match status {
            TestStatus::Passed => self.report_passed,
            TestStatus::Skipped | TestStatus::Xfail => self.report_skipped,
            _ => true,
        }
    }
}

/// Directories that reported test output is saved to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutputDirs {
    /// Directory for `HWFAILED` and `WARNING` outputs.
    pub hw_fails_dir: Utf8PathBuf,

    /// Directory for `INDUCTOR_FAILED` and `INDUCTOR_WARNING` outputs.
    pub inductor_fails_dir: Utf8PathBuf,

    /// Directory for `FAILED` outputs.
    pub failures_dir: Utf8PathBuf,
}

impl OutputDirs {
    /// The default directories, relative to the current directory.
    pub fn new_default() -> Self {
        Self {
            hw_fails_dir: "hw_fails".into(),
            inductor_fails_dir: "inductor_fails".into(),
            failures_dir: "failures".into(),
        }
    }

    /// Places all three directories under `base`.
    pub fn under(base: &Utf8Path) -> Self {
        let Self {
            hw_fails_dir,
            inductor_fails_dir,
            failures_dir,
        } = Self::new_default();
        Self {
            hw_fails_dir: base.join(hw_fails_dir),
            inductor_fails_dir: base.join(inductor_fails_dir),
            failures_dir: base.join(failures_dir),
        }
    }

    fn dir_for(&self, bucket: OutputBucket) -> &Utf8Path {
        match bucket {
            OutputBucket::Hardware => &self.hw_fails_dir,
            OutputBucket::Inductor => &self.inductor_fails_dir,
            OutputBucket::Failures => &self.failures_dir,
        }
    }

    fn create_all(&self) -> Result<(), OutputDirCreateError> {
        for dir in [&self.hw_fails_dir, &self.inductor_fails_dir, &self.failures_dir] {
            std::fs::create_dir_all(dir).map_err(|error| OutputDirCreateError::new(dir, error))?;
        }
        Ok(())
    }

    /// Writes the output of a decision to its bucket, returning the path written.
    ///
    /// Files are named by the bare method name, so tests with the same method name in different
    /// classes or modules overwrite each other.
    fn save(&self, decision: &Decision) -> Result<Option<Utf8PathBuf>, WriteReportError> {
        let Some(bucket) = decision.status.output_bucket() else {
            return Ok(None);
        };
        if decision.run.output.is_empty() {
            return Ok(None);
        }
        let path = self
            .dir_for(bucket)
            .join(format!(
                "{}.out",
                file_name_component(decision.run.identity.method())
            ));
        std::fs::write(&path, decision.run.output.join("\n"))
            .map_err(|error| WriteReportError::OutputFile {
                path: path.clone(),
                error,
            })?;
        debug!("saved output for {} to {path}", decision.run.identity);
        Ok(Some(path))
    }
}

/// Log scanner builder.
#[derive(Debug, Default)]
pub struct LogScannerBuilder {
    policy: ReportPolicy,
    hw_keywords: Option<Vec<String>>,
    inductor_keywords: Option<Vec<String>>,
    output_dirs: Option<OutputDirs>,
}

impl LogScannerBuilder {
    /// Sets whether `PASSED` tests are reported.
    pub fn set_report_passed(&mut self, report_passed: bool) -> &mut Self {
        self.policy.report_passed = report_passed;
        self
    }

    /// Sets whether `SKIPPED` and `XFAIL` tests are reported.
    pub fn set_report_skipped(&mut self, report_skipped: bool) -> &mut Self {
        self.policy.report_skipped = report_skipped;
        self
    }

    /// Sets the hardware failure keywords.
    pub fn set_hw_keywords(
        &mut self,
        keywords: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.hw_keywords = Some(keywords.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the backend compiler failure keywords.
    pub fn set_inductor_keywords(
        &mut self,
        keywords: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.inductor_keywords = Some(keywords.into_iter().map(Into::into).collect());
        self
    }

    /// Enables saving the output of reported failures and warnings to the given directories.
    pub fn set_output_dirs(&mut self, output_dirs: OutputDirs) -> &mut Self {
        self.output_dirs = Some(output_dirs);
        self
    }

    /// Creates a new log scanner, creating output directories if output saving is enabled.
    pub fn build(&self) -> Result<LogScanner, LogScanError> {
        let classifier = match (&self.hw_keywords, &self.inductor_keywords) {
            (None, None) => StatusClassifier::default(),
            (hw, inductor) => build_classifier(hw.as_deref(), inductor.as_deref())?,
        };

        if let Some(output_dirs) = &self.output_dirs {
            output_dirs.create_all()?;
        }

        Ok(LogScanner {
            classifier,
            policy: self.policy,
            output_dirs: self.output_dirs.clone(),
            state: ScanState::NoActiveTest,
            reported: ReportedSet::default(),
            stats: ScanStats::default(),
            styles: Box::default(),
        })
    }
}

fn build_classifier(
    hw: Option<&[String]>,
    inductor: Option<&[String]>,
) -> Result<StatusClassifier, KeywordSetBuildError> {
    use crate::classify::{DEFAULT_HW_KEYWORDS, DEFAULT_INDUCTOR_KEYWORDS};

    let hw: Vec<&str> = match hw {
        Some(keywords) => keywords.iter().map(String::as_str).collect(),
        None => DEFAULT_HW_KEYWORDS.to_vec(),
    };
    let inductor: Vec<&str> = match inductor {
        Some(keywords) => keywords.iter().map(String::as_str).collect(),
        None => DEFAULT_INDUCTOR_KEYWORDS.to_vec(),
    };
    StatusClassifier::from_keywords(hw, inductor)
}

/// Statistics gathered over a scan.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ScanStats {
    /// The number of lines read.
    pub lines: usize,

    /// The number of decisions per status, including ones that were not printed.
    pub decisions: BTreeMap<TestStatus, usize>,

    /// The number of report lines printed.
    pub reported: usize,

    /// The number of output files written.
    pub saved_outputs: usize,
}

impl ScanStats {
    /// Returns the number of decisions with the given status.
    pub fn count(&self, status: TestStatus) -> usize {
        self.decisions.get(&status).copied().unwrap_or(0)
    }

    /// Returns the total number of tests decided on.
    pub fn total(&self) -> usize {
        self.decisions.values().sum()
    }

    /// Returns the number of decisions indicating a problem.
    pub fn problems(&self) -> usize {
        self.decisions
            .iter()
            .filter(|(status, _)| status.is_problem())
            .map(|(_, count)| count)
            .sum()
    }
}

#[derive(Debug, Default)]
struct Styles {
    pass: Style,
    fail: Style,
    warning: Style,
    skip: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.warning = Style::new().yellow().bold();
        self.skip = Style::new().yellow();
    }

    fn for_status(&self, status: TestStatus) -> Style {
        match status {
            TestStatus::Passed => self.pass,
            TestStatus::Failed
            | TestStatus::HwFail
            | TestStatus::InductorFailed
            | TestStatus::Unresolved => self.fail,
            TestStatus::Warning | TestStatus::InductorWarning => self.warning,
            TestStatus::Skipped | TestStatus::Xfail => self.skip,
        }
    }
}

/// Scans a pytest log line by line and reports on every test it finds.
///
/// Created through [`LogScannerBuilder`].
#[derive(Debug)]
pub struct LogScanner {
    classifier: StatusClassifier,
    policy: ReportPolicy,
    output_dirs: Option<OutputDirs>,
    state: ScanState,
    reported: ReportedSet,
    stats: ScanStats,
    styles: Box<Styles>,
}

impl LogScanner {
    /// Colorizes report lines.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    /// Returns the state after the most recent line.
    pub fn state(&self) -> &ScanState {
        &self.state
    }

    /// Returns the identities reported so far.
    pub fn reported(&self) -> &ReportedSet {
        &self.reported
    }

    /// Returns statistics gathered so far.
    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// Scans the log file at `path` to the end, writing reports to `writer`.
    pub fn scan_path(
        &mut self,
        path: &Utf8Path,
        writer: &mut dyn Write,
    ) -> Result<ScanStats, LogScanError> {
        let file = File::open(path).map_err(|error| LogScanError::Open {
            path: path.to_owned(),
            error,
        })?;
        self.scan_reader(BufReader::new(file), writer)
            .map_err(|err| err.with_path(path))
    }

    /// Scans `reader` to the end, writing reports to `writer`.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn scan_reader(
        &mut self,
        mut reader: impl BufRead,
        writer: &mut dyn Write,
    ) -> Result<ScanStats, LogScanError> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|error| LogScanError::Read { path: None, error })?;
            if read == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            self.process_line(&line, writer)?;
        }
        self.finish(writer)?;
        Ok(self.stats.clone())
    }

    /// Processes a single line of the log.
    pub fn process_line(
        &mut self,
        line: &str,
        writer: &mut dyn Write,
    ) -> Result<(), WriteReportError> {
        self.stats.lines += 1;
        let state = std::mem::take(&mut self.state);
        let (next, decision) = state.on_line(line.trim(), &self.classifier);
        self.state = next;
        match decision {
            Some(decision) => self.emit(decision, writer),
            None => Ok(()),
        }
    }

    /// Flushes the test being tracked, if any. Call once the log has ended.
    pub fn finish(&mut self, writer: &mut dyn Write) -> Result<(), WriteReportError> {
        let state = std::mem::take(&mut self.state);
        match state.finish(&self.classifier) {
            Some(decision) => self.emit(decision, writer),
            None => Ok(()),
        }
    }

    fn emit(&mut self, decision: Decision, writer: &mut dyn Write) -> Result<(), WriteReportError> {
        let identity = &decision.run.identity;
        let status = decision.status;
        *self.stats.decisions.entry(status).or_default() += 1;

        if self.reported.contains(identity, status) {
            debug!("{identity} - {status} already reported");
            return Ok(());
        }
        if !self.policy.should_report(status) {
            debug!("{identity} - {status} not reported");
            return Ok(());
        }

        writeln!(
            writer,
            "{identity} - {}",
            status.style(self.styles.for_status(status))
        )
        .map_err(WriteReportError::Io)?;
        self.stats.reported += 1;

        if let Some(output_dirs) = &self.output_dirs {
            if output_dirs.save(&decision)?.is_some() {
                self.stats.saved_outputs += 1;
            }
        }

        self.reported.record(decision.run.identity, status);
        Ok(())
    }
}

impl LogScanError {
    fn with_path(self, path: &Utf8Path) -> Self {
        match self {
            Self::Read { path: None, error } => Self::Read {
                path: Some(path.to_owned()),
                error,
            },
            other => other,
        }
    }
}
