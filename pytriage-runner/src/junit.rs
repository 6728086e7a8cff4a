// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Extracting results from JUnit XML reports produced by `pytest --junitxml`.
//!
//! Unlike the log scanner this works on whole documents: a report is parsed completely before
//! anything is written, so a malformed report leaves the summary files untouched.
//!
//! Summary files are opened in append mode. Processing several reports into the same directory
//! accumulates a combined summary.

use crate::{
    errors::{JunitProcessError, OutputDirCreateError},
    helpers::file_name_component,
};
use camino::{Utf8Path, Utf8PathBuf};
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use std::{
    fs::{File, OpenOptions},
    io::Write,
};
use tracing::debug;

/// The summary file listing every non-xfail test.
pub const TESTS_FILE: &str = "tests.txt";
/// The summary file listing passed tests.
pub const PASSED_FILE: &str = "passed.txt";
/// The summary file listing failed and errored tests.
pub const FAILED_FILE: &str = "failed.txt";
/// The summary file listing skipped tests.
pub const SKIPPED_FILE: &str = "skipped.txt";
/// The directory holding one detail file per failed or errored test.
pub const FAILED_DIR: &str = "failed";

/// The status of a single `<testcase>` node.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum JunitStatus {
    /// No failure, error or skipped child.
    Passed,

    /// A `<failure>` child.
    Failed,

    /// An `<error>` child and no `<failure>` child.
    Error,

    /// A `<skipped>` child whose message does not mention xfail.
    Skipped,

    /// A `<skipped>` child whose message mentions xfail. These are dropped.
    Xfailed,
}

impl JunitStatus {
    /// Returns the spelling used in detail files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Error => "ERROR",
            Self::Skipped => "SKIPPED",
            Self::Xfailed => "XFAILED",
        }
    }
}

/// The message and body of a `<failure>`, `<error>` or `<skipped>` element.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct JunitDetail {
    /// The `message` attribute, or empty.
    pub message: String,

    /// The text content.
    pub text: String,
}

/// A single `<testcase>` node.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct JunitCase {
    /// The `classname` attribute.
    pub classname: String,

    /// The `name` attribute.
    pub name: String,

    /// The first `<failure>` child.
    pub failure: Option<JunitDetail>,

    /// The first `<error>` child.
    pub error: Option<JunitDetail>,

    /// The first `<skipped>` child.
    pub skipped: Option<JunitDetail>,
}

impl JunitCase {
    /// Determines the status of this case.
    pub fn status(&self) -> JunitStatus {
        if self.failure.is_some() {
            JunitStatus::Failed
        } else if self.error.is_some() {
            JunitStatus::Error
        } else if let Some(skipped) = &self.skipped {
            if skipped.message.to_lowercase().contains("xfail") {
                JunitStatus::Xfailed
            } else {
                JunitStatus::Skipped
            }
        } else {
            JunitStatus::Passed
        }
    }

    /// Splits `classname` into its directory, file and class parts.
    pub fn location(&self) -> CaseLocation {
        CaseLocation::from_classname(&self.classname)
    }
}

/// The directory, file and class a test case lives in, derived from its `classname`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CaseLocation {
    /// The directory, dotted or slashed. May be empty.
    pub directory: String,

    /// The file part.
    pub file: String,

    /// The class part. May be empty.
    pub class: String,
}

impl CaseLocation {
    /// Parses a `classname` attribute.
    ///
    /// Two layouts are understood:
    ///
    /// * pytest: `dir/test_file.py::Class`. The class part is optional.
    /// * unittest: `dir.test_file.Class`. The last segment is the class and the one before it the
    ///   file. Everything else is the directory.
    pub fn from_classname(classname: &str) -> Self {
        if classname.contains("::") {
            let mut parts = classname.split("::");
            let file_part = parts.next().unwrap_or_default();
            let class = parts.next().unwrap_or_default().to_owned();
            let (directory, file) = match file_part.rsplit_once('/') {
                Some((directory, file)) => (directory.to_owned(), file.to_owned()),
                None => (String::new(), file_part.to_owned()),
            };
            Self {
                directory,
                file,
                class,
            }
        } else {
            let parts: Vec<_> = classname.split('.').collect();
            let class = parts.last().copied().unwrap_or_default().to_owned();
            let (directory, file) = match parts.len() {
                0 | 1 => (String::new(), String::new()),
                len => (parts[..len - 2].join("."), parts[len - 2].to_owned()),
            };
            Self {
                directory,
                file,
                class,
            }
        }
    }

    /// Returns `directory.file`, or just `file` without a directory.
    pub fn directory_dot_file(&self) -> String {
        if self.directory.is_empty() {
            self.file.clone()
        } else {
            format!("{}.{}", self.directory, self.file)
        }
    }
}

/// Parses every `<testcase>` node of a JUnit XML document, in document order.
///
/// Only the direct `<failure>`, `<error>` and `<skipped>` children of a test case are
/// considered, and only the first of each kind.
pub fn parse_cases(xml: &[u8]) -> Result<Vec<JunitCase>, (u64, quick_xml::Error)> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut cases = Vec::new();
    let mut parser = CaseParser::default();
    // Names of the elements opened but not yet closed, outermost first.
    let mut open = Vec::new();
    let mut root_seen = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|error| (reader.buffer_position() as u64, error))?;
        let res = match event {
            Event::Start(start) => {
                root_seen = true;
                open.push(String::from_utf8_lossy(start.name().as_ref()).into_owned());
                parser.start(&start, false, &mut cases)
            }
            Event::Empty(start) => {
                root_seen = true;
                parser.start(&start, true, &mut cases)
            }
            Event::End(_) => {
                open.pop();
                parser.end(&mut cases);
                Ok(())
            }
            Event::Text(text) => match text.unescape() {
                Ok(text) => {
                    parser.text(&text);
                    Ok(())
                }
                Err(error) => Err(error),
            },
            Event::CData(cdata) => {
                parser.text(&String::from_utf8_lossy(&cdata.into_inner()));
                Ok(())
            }
            Event::Eof => {
                // The reader reports a plain end of input even with elements left open.
                if let Some(name) = open.last() {
                    Err(quick_xml::Error::UnexpectedEof(format!("</{name}>")))
                } else if !root_seen {
                    Err(quick_xml::Error::UnexpectedEof("root element".to_owned()))
                } else {
                    break;
                }
            }
            _ => Ok(()),
        };
        res.map_err(|error| (reader.buffer_position() as u64, error))?;
        buf.clear();
    }

    Ok(cases)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum DetailKind {
    Failure,
    Error,
    Skipped,
}

impl DetailKind {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"failure" => Some(Self::Failure),
            b"error" => Some(Self::Error),
            b"skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct CaseParser {
    current: Option<JunitCase>,
    // Element depth below the current <testcase>.
    depth: usize,
    capture: Option<(DetailKind, JunitDetail)>,
}

impl CaseParser {
    fn start(
        &mut self,
        start: &BytesStart<'_>,
        empty: bool,
        cases: &mut Vec<JunitCase>,
    ) -> Result<(), quick_xml::Error> {
        let name = start.local_name();
        if self.current.is_none() {
            if name.as_ref() == b"testcase" {
                let mut case = JunitCase::default();
                for attr in start.attributes() {
                    let attr = attr?;
                    match attr.key.as_ref() {
                        b"classname" => case.classname = attr.unescape_value()?.into_owned(),
                        b"name" => case.name = attr.unescape_value()?.into_owned(),
                        _ => {}
                    }
                }
                if empty {
                    cases.push(case);
                } else {
                    self.current = Some(case);
                    self.depth = 0;
                }
            }
            return Ok(());
        }

        let direct_child = self.depth == 0;
        if !empty {
            self.depth += 1;
        }
        if !direct_child {
            return Ok(());
        }
        let Some(kind) = DetailKind::from_name(name.as_ref()) else {
            return Ok(());
        };
        let Some(case) = self.current.as_mut() else {
            return Ok(());
        };
        let already_seen = match kind {
            DetailKind::Failure => case.failure.is_some(),
            DetailKind::Error => case.error.is_some(),
            DetailKind::Skipped => case.skipped.is_some(),
        };
        if already_seen {
            return Ok(());
        }

        let mut detail = JunitDetail::default();
        for attr in start.attributes() {
            let attr = attr?;
            if attr.key.as_ref() == b"message" {
                detail.message = attr.unescape_value()?.into_owned();
            }
        }
        if empty {
            store_detail(case, kind, detail);
        } else {
            self.capture = Some((kind, detail));
        }
        Ok(())
    }

    fn end(&mut self, cases: &mut Vec<JunitCase>) {
        if self.current.is_none() {
            return;
        }
        if self.depth == 0 {
            cases.extend(self.current.take());
            return;
        }
        if self.depth == 1 {
            if let (Some(case), Some((kind, detail))) = (self.current.as_mut(), self.capture.take())
            {
                store_detail(case, kind, detail);
            }
        }
        self.depth -= 1;
    }

    fn text(&mut self, text: &str) {
        if let Some((_, detail)) = &mut self.capture {
            detail.text.push_str(text);
        }
    }
}

fn store_detail(case: &mut JunitCase, kind: DetailKind, detail: JunitDetail) {
    let slot = match kind {
        DetailKind::Failure => &mut case.failure,
        DetailKind::Error => &mut case.error,
        DetailKind::Skipped => &mut case.skipped,
    };
    *slot = Some(detail);
}

/// Counts of what a report contributed to the summary files.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct JunitSummary {
    /// Test cases appended to `tests.txt`.
    pub tests: usize,

    /// Test cases appended to `passed.txt`.
    pub passed: usize,

    /// Test cases appended to `failed.txt`, failures and errors together.
    pub failed: usize,

    /// Test cases appended to `skipped.txt`.
    pub skipped: usize,

    /// Xfailed test cases, which are not written anywhere.
    pub xfailed: usize,
}

impl JunitSummary {
    /// Adds another summary to this one.
    pub fn add(&mut self, other: &JunitSummary) {
        self.tests += other.tests;
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.xfailed += other.xfailed;
    }
}

/// Appends JUnit results to summary files in an output directory.
#[derive(Clone, Debug)]
pub struct JunitExtractor {
    output_dir: Utf8PathBuf,
}

impl JunitExtractor {
    /// Creates a new extractor writing into `output_dir`.
    pub fn new(output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Returns the output directory.
    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    /// Returns the directory detail files are written to.
    pub fn failed_dir(&self) -> Utf8PathBuf {
        self.output_dir.join(FAILED_DIR)
    }

    /// Reads, parses and processes the report at `path`.
    pub fn process_path(&self, path: &Utf8Path) -> Result<JunitSummary, JunitProcessError> {
        let xml = std::fs::read(path).map_err(|error| JunitProcessError::Read {
            path: path.to_owned(),
            error,
        })?;
        let cases =
            parse_cases(&xml).map_err(|(position, error)| JunitProcessError::Parse {
                path: path.to_owned(),
                position,
                error,
            })?;
        debug!("parsed {} test cases from {path}", cases.len());
        self.process_cases(&cases)
    }

    /// Appends already parsed test cases to the summary files.
    pub fn process_cases(&self, cases: &[JunitCase]) -> Result<JunitSummary, JunitProcessError> {
        let failed_dir = self.failed_dir();
        std::fs::create_dir_all(&failed_dir)
            .map_err(|error| OutputDirCreateError::new(&failed_dir, error))?;

        let mut tests = self.open_append(TESTS_FILE)?;
        let mut passed = self.open_append(PASSED_FILE)?;
        let mut failed = self.open_append(FAILED_FILE)?;
        let mut skipped = self.open_append(SKIPPED_FILE)?;

        let mut summary = JunitSummary::default();
        for case in cases {
            let status = case.status();
            if status == JunitStatus::Xfailed {
                summary.xfailed += 1;
                continue;
            }

            let location = case.location();
            let line = format_summary_line(&location, &case.name);
            tests.write(&line)?;
            summary.tests += 1;

            match status {
                JunitStatus::Passed => {
                    passed.write(&line)?;
                    summary.passed += 1;
                }
                JunitStatus::Failed | JunitStatus::Error => {
                    failed.write(&line)?;
                    summary.failed += 1;
                    self.write_detail(case, &location, status)?;
                }
                JunitStatus::Skipped => {
                    skipped.write(&line)?;
                    summary.skipped += 1;
                }
                JunitStatus::Xfailed => {}
            }
        }

        Ok(summary)
    }

    fn open_append(&self, name: &str) -> Result<AppendFile, JunitProcessError> {
        let path = self.output_dir.join(name);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|error| JunitProcessError::Write {
                path: path.clone(),
                error,
            })?;
        Ok(AppendFile { path, file })
    }

    fn write_detail(
        &self,
        case: &JunitCase,
        location: &CaseLocation,
        status: JunitStatus,
    ) -> Result<(), JunitProcessError> {
        let directory_dot_file = location.directory_dot_file();
        let file_name = file_name_component(&format!(
            "{directory_dot_file}.{}.{}.out",
            location.class, case.name
        ));
        let path = self.failed_dir().join(file_name);

        let mut contents = format!(
            "Test: {directory_dot_file}::{}::{}\nStatus: {}\n\n",
            location.class,
            case.name,
            status.as_str()
        );
        if let Some(failure) = &case.failure {
            contents.push_str("Failure Details:\n");
            contents.push_str(&failure.message);
            contents.push('\n');
            contents.push_str(&failure.text);
        }
        if let Some(error) = &case.error {
            contents.push_str("Error Details:\n");
            contents.push_str(&error.message);
            contents.push('\n');
            contents.push_str(&error.text);
        }

        std::fs::write(&path, contents).map_err(|error| JunitProcessError::Write {
            path: path.clone(),
            error,
        })?;
        debug!("wrote failure details to {path}");
        Ok(())
    }
}

struct AppendFile {
    path: Utf8PathBuf,
    file: File,
}

impl AppendFile {
    fn write(&mut self, line: &str) -> Result<(), JunitProcessError> {
        writeln!(self.file, "{line}").map_err(|error| JunitProcessError::Write {
            path: self.path.clone(),
            error,
        })
    }
}

fn format_summary_line(location: &CaseLocation, name: &str) -> String {
    format!("{}\t{}\t{}", location.directory_dot_file(), location.class, name)
}
