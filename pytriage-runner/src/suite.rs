// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test suite files: lists of tests to replay.
//!
//! A suite is a nested mapping `{file: {class: [method, ...]}}`, which can be written in any of
//! four formats (see [`SuiteFormat`]). The mapping preserves the order in which files, classes and
//! methods were first seen.

use crate::{
    errors::{SuiteFormatParseError, SuiteLoadError, SuiteLoadErrorKind},
    identity::{TestIdentity, dotted_module_to_path, parse_table_line, strip_comment},
};
use camino::Utf8Path;
use indexmap::IndexMap;
use std::{fmt, io, str::FromStr};
use swrite::{SWrite, swriteln};
use tracing::{debug, warn};

/// The format of a suite file.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum SuiteFormat {
    /// Detect the format from the file name and first line.
    #[default]
    Auto,

    /// A YAML mapping of files to classes to lists of methods.
    Yaml,

    /// One `dotted.module<TAB>Class<TAB>method` per line.
    Table,

    /// One `path/to/file.py::Class::method` per line.
    Pytest,

    /// File paths at column zero, classes indented by less than four spaces, methods indented by
    /// four or more.
    Indent,
}

impl SuiteFormat {
    /// Returns string representations of all known variants.
    pub fn variants() -> &'static [&'static str] {
        &["auto", "yaml", "table", "pytest", "indent"]
    }

    /// Resolves [`SuiteFormat::Auto`] for a file with the given path and contents.
    ///
    /// Detection order: a `.yaml` or `.yml` extension, then a tab in the first line, then `::` in
    /// the first line. Anything else is read as the indentation format. Blank lines and `#`
    /// comment lines are not considered when looking for the first line.
    pub fn resolve(self, path: &Utf8Path, contents: &str) -> Self {
        if self != Self::Auto {
            return self;
        }
        if matches!(path.extension(), Some("yaml" | "yml")) {
            return Self::Yaml;
        }
        let first_line = contents
            .lines()
            .find(|line| {
                let line = line.trim_start();
                !line.is_empty() && !line.starts_with('#')
            })
            .unwrap_or_default();
        if first_line.contains('\t') {
            Self::Table
        } else if first_line.contains("::") {
            Self::Pytest
        } else {
            Self::Indent
        }
    }
}

impl fmt::Display for SuiteFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Yaml => write!(f, "yaml"),
            Self::Table => write!(f, "table"),
            Self::Pytest => write!(f, "pytest"),
            Self::Indent => write!(f, "indent"),
        }
    }
}

impl FromStr for SuiteFormat {
    type Err = SuiteFormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let val = match s {
            "auto" => Self::Auto,
            "yaml" | "yml" => Self::Yaml,
            "table" => Self::Table,
            "pytest" => Self::Pytest,
            "indent" => Self::Indent,
            other => return Err(SuiteFormatParseError::new(other)),
        };
        Ok(val)
    }
}

/// The forms a suite can be converted to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConvertFormat {
    /// `path/to/file.py::Class::method`, suitable for passing to pytest.
    Pytest,

    /// `dotted.module<TAB>Class<TAB>method`.
    Table,
}

type ClassMap = IndexMap<String, Vec<String>>;

/// A loaded test suite.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TestSuiteConfig {
    files: IndexMap<String, ClassMap>,
}

impl TestSuiteConfig {
    /// Creates an empty suite.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a suite file.
    pub fn load(path: &Utf8Path, format: SuiteFormat) -> Result<Self, SuiteLoadError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|error| SuiteLoadError::new(path, SuiteLoadErrorKind::Read(error)))?;
        let format = format.resolve(path, &contents);
        debug!("loading {path} as {format} suite");
        Self::parse(&contents, format).map_err(|kind| SuiteLoadError::new(path, kind))
    }

    /// Parses suite contents in the given format.
    ///
    /// [`SuiteFormat::Auto`] is treated as [`SuiteFormat::Indent`], since there is no file name to
    /// go by. Use [`SuiteFormat::resolve`] first to detect the format.
    pub fn parse(contents: &str, format: SuiteFormat) -> Result<Self, SuiteLoadErrorKind> {
        match format {
            SuiteFormat::Yaml => Self::parse_yaml(contents),
            SuiteFormat::Table => Self::parse_table(contents),
            SuiteFormat::Pytest => Ok(Self::parse_pytest(contents)),
            SuiteFormat::Auto | SuiteFormat::Indent => Ok(Self::parse_indent(contents)),
        }
    }

    fn parse_yaml(contents: &str) -> Result<Self, SuiteLoadErrorKind> {
        if contents.trim().is_empty() {
            return Ok(Self::new());
        }
        let files: IndexMap<String, ClassMap> =
            serde_yaml::from_str(contents).map_err(SuiteLoadErrorKind::Yaml)?;
        Ok(Self { files })
    }

    fn parse_table(contents: &str) -> Result<Self, SuiteLoadErrorKind> {
        let mut suite = Self::new();
        for (idx, line) in contents.lines().enumerate() {
            match parse_table_line(line) {
                Ok(Some(identity)) => suite.insert(identity),
                Ok(None) => {}
                Err(line) => {
                    // The whole load fails even though this reads like a skip.
                    warn!("skipping malformed line: {}", line.content);
                    warn!("(fields must be separated by tabs or spaces)");
                    return Err(SuiteLoadErrorKind::MalformedTableLine {
                        line_number: idx + 1,
                        line,
                    });
                }
            }
        }
        Ok(suite)
    }

    fn parse_pytest(contents: &str) -> Self {
        let mut suite = Self::new();
        for (idx, line) in contents.lines().enumerate() {
            let content = strip_comment(line);
            if content.is_empty() {
                continue;
            }
            match TestIdentity::parse_pytest(content) {
                Some(identity) => suite.insert(identity),
                None => warn!("line {}: skipping malformed line: {content}", idx + 1),
            }
        }
        suite
    }

    fn parse_indent(contents: &str) -> Self {
        let mut suite = Self::new();
        let mut current_file: Option<String> = None;
        let mut current_class: Option<String> = None;

        for (idx, line) in contents.lines().enumerate() {
            let line = line.trim_end();
            let content = line.trim_start();
            if content.is_empty() || content.starts_with('#') {
                continue;
            }

            if !line.starts_with(' ') {
                suite.files.entry(content.to_owned()).or_default();
                current_file = Some(content.to_owned());
                current_class = None;
            } else if line.starts_with("    ") {
                match (&current_file, &current_class) {
                    (Some(file), Some(class)) => {
                        suite.files[file.as_str()][class.as_str()].push(content.to_owned());
                    }
                    _ => warn!("line {}: skipping method without a class: {content}", idx + 1),
                }
            } else {
                match &current_file {
                    Some(file) => {
                        suite.files[file.as_str()]
                            .entry(content.to_owned())
                            .or_default();
                        current_class = Some(content.to_owned());
                    }
                    None => warn!("line {}: skipping class without a file: {content}", idx + 1),
                }
            }
        }
        suite
    }

    /// Adds a test to the suite.
    pub fn insert(&mut self, identity: TestIdentity) {
        self.files
            .entry(identity.module().to_owned())
            .or_default()
            .entry(identity.class().to_owned())
            .or_default()
            .push(identity.method().to_owned());
    }

    /// Returns the files in the suite, with their classes and methods.
    pub fn files(&self) -> &IndexMap<String, IndexMap<String, Vec<String>>> {
        &self.files
    }

    /// Returns the number of test methods in the suite.
    pub fn test_count(&self) -> usize {
        self.files
            .values()
            .flat_map(|classes| classes.values())
            .map(Vec::len)
            .sum()
    }

    /// Returns true if the suite has no test methods.
    pub fn is_empty(&self) -> bool {
        self.test_count() == 0
    }

    /// Returns one identity per test method, in insertion order.
    pub fn generate_commands(&self) -> Vec<TestIdentity> {
        self.files
            .iter()
            .flat_map(|(file, classes)| {
                classes.iter().flat_map(move |(class, methods)| {
                    methods
                        .iter()
                        .map(move |method| TestIdentity::new(file, class, method))
                })
            })
            .collect()
    }

    /// Renders the suite as Markdown: one back-quoted tab-table identifier per test, separated by
    /// blank lines.
    ///
    /// With an issue search URL, each entry is followed by a link searching for the method name.
    pub fn to_markdown(&self, issue_search_url: Option<&str>) -> String {
        let mut out = String::new();
        for identity in self.generate_commands() {
            match issue_search_url {
                Some(url) => swriteln!(
                    out,
                    "`{}` [link]({url}{})",
                    identity.table_display(),
                    identity.method()
                ),
                None => swriteln!(out, "`{}`", identity.table_display()),
            }
            out.push('\n');
        }
        // Entries are separated, not terminated, by blank lines.
        if out.ends_with("\n\n") {
            out.pop();
        }
        out
    }

    /// Writes the suite in another form, one test per line.
    ///
    /// `strip_prefix` removes a leading dotted module prefix such as `test.`, so that lists
    /// produced from JUnit reports run from a repository root can be used inside the test
    /// directory.
    pub fn write_converted(
        &self,
        format: ConvertFormat,
        strip_prefix: Option<&str>,
        writer: &mut dyn io::Write,
    ) -> io::Result<()> {
        for identity in self.generate_commands() {
            let dotted = identity.dotted_module();
            let dotted = match strip_prefix {
                Some(prefix) => dotted.strip_prefix(prefix).unwrap_or(&dotted),
                None => &dotted,
            };
            match format {
                ConvertFormat::Pytest => writeln!(
                    writer,
                    "{}::{}::{}",
                    dotted_module_to_path(dotted),
                    identity.class(),
                    identity.method()
                )?,
                ConvertFormat::Table => writeln!(
                    writer,
                    "{dotted}\t{}\t{}",
                    identity.class(),
                    identity.method()
                )?,
            }
        }
        Ok(())
    }
}

impl FromIterator<TestIdentity> for TestSuiteConfig {
    fn from_iter<T: IntoIterator<Item = TestIdentity>>(iter: T) -> Self {
        let mut suite = Self::new();
        for identity in iter {
            suite.insert(identity);
        }
        suite
    }
}
