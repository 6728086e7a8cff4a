// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by pytriage.

use crate::{identity::MalformedTableLine, suite::SuiteFormat};
use camino::Utf8PathBuf;
use config::ConfigError;
use std::{fmt, io};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse pytriage config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file that failed to parse.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error that occurred.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing the config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// The config sources could not be read or merged.
    #[error(transparent)]
    BuildError(ConfigError),

    /// The merged config could not be deserialized.
    #[error(transparent)]
    DeserializeError(serde_path_to_error::Error<ConfigError>),
}

/// An error which indicates that a profile was requested but not known to pytriage.
#[derive(Clone, Debug, Error)]
#[error("profile `{profile}` not found (known profiles: {})", .all_profiles.join(", "))]
pub struct ProfileNotFound {
    profile: String,
    all_profiles: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        profile: impl Into<String>,
        all_profiles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_profiles: Vec<_> = all_profiles.into_iter().map(|s| s.into()).collect();
        all_profiles.sort_unstable();
        Self {
            profile: profile.into(),
            all_profiles,
        }
    }
}

/// Error returned while parsing a [`TestIdentity`](crate::identity::TestIdentity) from a string.
#[derive(Clone, Debug, Error)]
#[error("`{input}` is not a test reference of the form `path/to/file.py::Class::method`")]
pub struct IdentityParseError {
    input: String,
}

impl IdentityParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// Error returned while parsing a [`SuiteFormat`] value from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for suite format: {input}\n(known values: {})",
    SuiteFormat::variants().join(", "),
)]
pub struct SuiteFormatParseError {
    input: String,
}

impl SuiteFormatParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurs while building a keyword matcher.
#[derive(Clone, Debug, Error)]
#[error("failed to build matcher for keywords [{}]", .keywords.join(", "))]
pub struct KeywordSetBuildError {
    keywords: Vec<String>,
    #[source]
    err: aho_corasick::BuildError,
}

impl KeywordSetBuildError {
    pub(crate) fn new(keywords: &[String], err: aho_corasick::BuildError) -> Self {
        Self {
            keywords: keywords.to_vec(),
            err,
        }
    }
}

/// An error that occurs while creating an output directory.
#[derive(Debug, Error)]
#[error("error creating output directory `{path}`")]
pub struct OutputDirCreateError {
    path: Utf8PathBuf,
    #[source]
    error: io::Error,
}

impl OutputDirCreateError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, error: io::Error) -> Self {
        Self {
            path: path.into(),
            error,
        }
    }
}

/// An error that occurs while writing reports or result files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteReportError {
    /// An error occurred while writing to the report stream.
    #[error("error writing to report output")]
    Io(#[source] io::Error),

    /// An error occurred while writing a per-test output file.
    #[error("error writing output file `{path}`")]
    OutputFile {
        /// The path that was being written.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurs while scanning a pytest log.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LogScanError {
    /// The log file could not be opened.
    #[error("error opening log file `{path}`")]
    Open {
        /// The log file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// An error occurred while reading the log.
    #[error("error reading log{}", DisplayPath(.path.as_ref()))]
    Read {
        /// The log file, if reading from a file.
        path: Option<Utf8PathBuf>,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The configured keywords could not be turned into a matcher.
    #[error(transparent)]
    Keywords(#[from] KeywordSetBuildError),

    /// An output directory could not be created.
    #[error(transparent)]
    OutputDirCreate(#[from] OutputDirCreateError),

    /// A report or saved output could not be written.
    #[error(transparent)]
    Write(#[from] WriteReportError),
}

struct DisplayPath<'a>(Option<&'a Utf8PathBuf>);

impl fmt::Display for DisplayPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(path) => write!(f, " file `{path}`"),
            None => Ok(()),
        }
    }
}

/// An error that occurs while processing a JUnit XML report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JunitProcessError {
    /// The report could not be read.
    #[error("error reading JUnit report `{path}`")]
    Read {
        /// The report file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The report is not well-formed XML.
    #[error("error parsing JUnit report `{path}` at byte {position}")]
    Parse {
        /// The report file.
        path: Utf8PathBuf,

        /// The byte offset the parser had reached.
        position: u64,

        /// The underlying error.
        #[source]
        error: quick_xml::Error,
    },

    /// The output directory could not be created.
    #[error(transparent)]
    OutputDirCreate(#[from] OutputDirCreateError),

    /// A summary or detail file could not be written.
    #[error("error writing `{path}`")]
    Write {
        /// The file being written.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurs while loading a test suite file.
#[derive(Debug, Error)]
#[error("failed to load test suite from `{path}`")]
pub struct SuiteLoadError {
    path: Utf8PathBuf,
    #[source]
    kind: SuiteLoadErrorKind,
}

impl SuiteLoadError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, kind: SuiteLoadErrorKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Returns the suite file that failed to load.
    pub fn path(&self) -> &Utf8PathBuf {
        &self.path
    }

    /// Returns the kind of error that occurred.
    pub fn kind(&self) -> &SuiteLoadErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while loading a test suite file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SuiteLoadErrorKind {
    /// The file could not be read.
    #[error("error reading file")]
    Read(#[source] io::Error),

    /// The file is not a valid YAML suite mapping.
    #[error("error parsing YAML")]
    Yaml(#[source] serde_yaml::Error),

    /// A tab-table line did not have exactly three fields.
    #[error(
        "line {line_number}: expected 3 fields (module, class, method), found {}: `{}`",
        .line.field_count,
        .line.content,
    )]
    MalformedTableLine {
        /// The 1-based line number.
        line_number: usize,

        /// The offending line.
        line: MalformedTableLine,
    },
}

/// An error that occurs while building a replay command template.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CommandTemplateError {
    /// The template has no program.
    #[error("replay command template is empty")]
    Empty,

    /// The template string could not be split into arguments.
    #[error("error splitting replay command `{input}` into arguments")]
    Split {
        /// The template string.
        input: String,

        /// The underlying error.
        #[source]
        error: shell_words::ParseError,
    },

    /// An argument refers to a placeholder that doesn't exist.
    #[error(
        "replay command argument `{arg}` uses unknown placeholder `{{{placeholder}}}` \
         (known placeholders: {{file}}, {{module}}, {{class}}, {{method}})"
    )]
    UnknownPlaceholder {
        /// The argument containing the placeholder.
        arg: String,

        /// The placeholder name, without braces.
        placeholder: String,
    },
}

/// An error that occurs while replaying tests.
///
/// Failures of the replayed commands themselves are results, not errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReplayError {
    /// An output directory could not be created.
    #[error(transparent)]
    OutputDirCreate(#[from] OutputDirCreateError),

    /// A transcript could not be written.
    #[error("error writing transcript `{path}`")]
    WriteTranscript {
        /// The transcript file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The results file could not be written.
    #[error("error writing results file `{path}`")]
    WriteResults {
        /// The results file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: atomicwrites::Error<io::Error>,
    },

    /// Console output could not be written.
    #[error("error writing replay output")]
    Console(#[source] io::Error),
}
