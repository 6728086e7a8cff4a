// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test identities: the `(module, class, method)` triple that keys every result map.
//!
//! The main structure in this module is [`TestIdentity`].

use crate::errors::IdentityParseError;
use regex::Regex;
use std::{fmt, str::FromStr, sync::LazyLock};

/// The suffix every test source file carries.
pub const TEST_FILE_SUFFIX: &str = ".py";

static PYTEST_IDENTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:[\w/]+/)?\w+\.py)::([^:\s]+)::([^:\s]+)").expect("identity regex is valid")
});

/// The line formats a test identity can be parsed from.
///
/// The indentation-based suite format is stateful (classes and methods inherit their parent from
/// earlier lines), so it is handled by the suite loader rather than here.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IdentityFormat {
    /// `path/to/test_file.py::Class::method`, optionally followed by more text.
    Pytest,

    /// Three whitespace-separated fields: `dotted.module Class method`.
    Table,
}

/// An immutable `(module, class, method)` triple identifying a single test.
///
/// For identities parsed from pytest output or JUnit reports, `module` is preserved as given. For
/// identities parsed from tab-tables, the dotted module is converted to a path ending in
/// [`TEST_FILE_SUFFIX`].
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TestIdentity {
    module: String,
    class: String,
    method: String,
}

impl TestIdentity {
    /// Creates a new identity from its parts.
    pub fn new(
        module: impl Into<String>,
        class: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            class: class.into(),
            method: method.into(),
        }
    }

    /// Parses an identity out of a line in the given format.
    ///
    /// Returns `None` if the line does not carry an identity. For [`IdentityFormat::Table`], blank
    /// lines, comment lines and lines with the wrong number of fields all return `None`: use
    /// [`parse_table_line`] to tell them apart.
    pub fn parse(line: &str, format: IdentityFormat) -> Option<Self> {
        match format {
            IdentityFormat::Pytest => Self::parse_pytest(line),
            IdentityFormat::Table => parse_table_line(line).ok().flatten(),
        }
    }

    /// Parses a pytest-style `file.py::Class::method` reference at the start of `line`.
    ///
    /// Anything after the method name (a status token, a duration) is ignored.
    pub fn parse_pytest(line: &str) -> Option<Self> {
        let captures = PYTEST_IDENTITY_REGEX.captures(line)?;
        Some(Self::new(&captures[1], &captures[2], &captures[3]))
    }

    /// Returns the module part of the identity.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Returns the class part of the identity.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Returns the method part of the identity.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the module as a dotted module path: `a/b/c.py` becomes `a.b.c`.
    pub fn dotted_module(&self) -> String {
        path_to_dotted_module(&self.module)
    }

    /// Returns a displayer for the tab-table form: `dotted.module<TAB>Class<TAB>method`.
    ///
    /// The output of this is a valid line for the tab-table suite format.
    pub fn table_display(&self) -> TableDisplay<'_> {
        TableDisplay { identity: self }
    }

    /// Returns the dotted `module.Class.method` form used to name transcript files.
    pub fn dotted_name(&self) -> String {
        format!("{}.{}.{}", self.dotted_module(), self.class, self.method)
    }
}

/// Formats the identity in pytest form: `module::class::method`.
impl fmt::Display for TestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.module, self.class, self.method)
    }
}

impl FromStr for TestIdentity {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_pytest(s.trim()).ok_or_else(|| IdentityParseError::new(s))
    }
}

/// Displays a [`TestIdentity`] in tab-table form.
///
/// Returned by [`TestIdentity::table_display`].
#[derive(Clone, Copy, Debug)]
pub struct TableDisplay<'a> {
    identity: &'a TestIdentity,
}

impl fmt::Display for TableDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}",
            self.identity.dotted_module(),
            self.identity.class,
            self.identity.method
        )
    }
}

/// A tab-table line that has content but not exactly three fields.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MalformedTableLine {
    /// The line with comments stripped.
    pub content: String,

    /// The number of whitespace-separated fields found.
    pub field_count: usize,
}

/// Parses a single tab-table line.
///
/// Blank lines and `#` comments (full-line or trailing) produce `Ok(None)`. Fields are separated by
/// any run of whitespace, not only tabs.
pub fn parse_table_line(line: &str) -> Result<Option<TestIdentity>, MalformedTableLine> {
    let content = strip_comment(line);
    if content.is_empty() {
        return Ok(None);
    }

    let fields: Vec<_> = content.split_whitespace().collect();
    match fields.as_slice() {
        [module, class, method] => Ok(Some(TestIdentity::new(
            dotted_module_to_path(module),
            *class,
            *method,
        ))),
        _ => Err(MalformedTableLine {
            content: content.to_owned(),
            field_count: fields.len(),
        }),
    }
}

/// Removes a `#` comment and surrounding whitespace from a line.
pub(crate) fn strip_comment(line: &str) -> &str {
    let line = line.trim();
    match line.split_once('#') {
        Some((before, _)) => before.trim(),
        None => line,
    }
}

/// Converts `a.b.c` to `a/b/c.py`.
pub fn dotted_module_to_path(module: &str) -> String {
    let mut path = module.replace('.', "/");
    path.push_str(TEST_FILE_SUFFIX);
    path
}

/// Converts `a/b/c.py` to `a.b.c`. Modules without the test file suffix are only re-separated.
pub fn path_to_dotted_module(path: &str) -> String {
    path.strip_suffix(TEST_FILE_SUFFIX)
        .unwrap_or(path)
        .replace('/', ".")
}
