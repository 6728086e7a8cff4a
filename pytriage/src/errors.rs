// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::Utf8PathBuf;
use owo_colors::OwoColorize;
use pytriage_metadata::TriageExitCode;
use pytriage_runner::errors::*;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An expected error: bad input, bad configuration or unwritable output.
///
/// Failures of the tests being triaged are results, not errors, and never show up here.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("current directory is invalid")]
    CurrentDirInvalid {
        #[source]
        err: std::io::Error,
    },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("profile not found")]
    ProfileNotFound {
        #[from]
        err: ProfileNotFound,
    },
    #[error("invalid replay command")]
    CommandTemplateError {
        #[from]
        err: CommandTemplateError,
    },
    #[error("log scan error")]
    LogScanError {
        #[from]
        err: LogScanError,
    },
    #[error("JUnit processing error")]
    JunitProcessError {
        #[from]
        err: JunitProcessError,
    },
    #[error("suite load error")]
    SuiteLoadError {
        #[from]
        err: SuiteLoadError,
    },
    #[error("replay error")]
    ReplayError {
        #[from]
        err: ReplayError,
    },
    #[error("error writing to output")]
    WriteOutput {
        #[source]
        err: std::io::Error,
    },
}

impl ExpectedError {
    pub(crate) fn write_output(err: std::io::Error) -> Self {
        Self::WriteOutput { err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirInvalid { .. }
            | Self::ConfigParseError { .. }
            | Self::ProfileNotFound { .. }
            | Self::CommandTemplateError { .. } => TriageExitCode::SETUP_ERROR,
            Self::LogScanError { err } => match err {
                LogScanError::Open { .. } | LogScanError::Read { .. } => {
                    TriageExitCode::INPUT_ERROR
                }
                LogScanError::Keywords(_) => TriageExitCode::SETUP_ERROR,
                _ => TriageExitCode::WRITE_OUTPUT_ERROR,
            },
            Self::JunitProcessError { err } => match err {
                JunitProcessError::Read { .. } | JunitProcessError::Parse { .. } => {
                    TriageExitCode::INPUT_ERROR
                }
                _ => TriageExitCode::WRITE_OUTPUT_ERROR,
            },
            Self::SuiteLoadError { .. } => TriageExitCode::INPUT_ERROR,
            Self::ReplayError { .. } | Self::WriteOutput { .. } => {
                TriageExitCode::WRITE_OUTPUT_ERROR
            }
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::CurrentDirInvalid { err } => {
                error!("current directory is invalid");
                Some(err as &dyn Error)
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse pytriage config at `{}`",
                    err.config_file().style(styles.bold)
                );
                err.source()
            }
            Self::ProfileNotFound { err } => {
                error!("{err}");
                err.source()
            }
            Self::CommandTemplateError { err } => {
                error!("{err}");
                err.source()
            }
            Self::LogScanError { err } => {
                error!("{err}");
                err.source()
            }
            Self::JunitProcessError { err } => {
                error!("{err}");
                err.source()
            }
            Self::SuiteLoadError { err } => {
                error!(
                    "failed to load test suite from `{}`",
                    err.path().style(styles.bold)
                );
                err.source()
            }
            Self::ReplayError { err } => {
                error!("{err}");
                err.source()
            }
            Self::WriteOutput { err } => {
                error!("error writing to output");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}

/// Returns the current directory as a UTF-8 path.
pub(crate) fn current_dir() -> Result<Utf8PathBuf> {
    let dir = std::env::current_dir().map_err(|err| ExpectedError::CurrentDirInvalid { err })?;
    Utf8PathBuf::try_from(dir).map_err(|err| ExpectedError::CurrentDirInvalid {
        err: err.into_io_error(),
    })
}
