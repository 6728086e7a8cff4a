// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Replaying tests one at a time, each in its own process.
//!
//! Running every test of a suite in isolation attributes crashes to the test that caused them,
//! which a single pytest process cannot do. The main structure in this module is
//! [`ReplayRunner`], created through [`ReplayRunnerBuilder`].
//!
//! Tests are replayed sequentially and without a timeout: a hung command blocks the runner.

use crate::{
    errors::{CommandTemplateError, OutputDirCreateError, ReplayError},
    helpers::{display_exit_code, file_name_component, signed_exit_code},
    identity::TestIdentity,
};
use atomicwrites::{AllowOverwrite, AtomicFile};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::{
    fmt,
    io::{self, BufRead, BufReader, Write},
    num::NonZeroUsize,
    sync::LazyLock,
};
use tracing::{debug, info, warn};

/// The name of the consolidated results file written under the write path.
pub const RESULTS_FILE: &str = "results.txt";

static PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]*)\}").expect("placeholder regex is valid"));

const KNOWN_PLACEHOLDERS: &[&str] = &["file", "module", "class", "method"];

/// A template for the command that replays a single test.
///
/// Each argument may contain the placeholders `{file}` (the test file path), `{module}` (the
/// dotted module), `{class}` and `{method}`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandTemplate {
    argv: Vec<String>,
}

impl CommandTemplate {
    /// Creates a new template from an argument vector. The first argument is the program.
    pub fn new(
        argv: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, CommandTemplateError> {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        if argv.is_empty() {
            return Err(CommandTemplateError::Empty);
        }
        for arg in &argv {
            for captures in PLACEHOLDER_REGEX.captures_iter(arg) {
                let placeholder = &captures[1];
                if !KNOWN_PLACEHOLDERS.contains(&placeholder) {
                    return Err(CommandTemplateError::UnknownPlaceholder {
                        arg: arg.clone(),
                        placeholder: placeholder.to_owned(),
                    });
                }
            }
        }
        Ok(Self { argv })
    }

    /// Parses a template from a shell-quoted command line.
    pub fn parse(input: &str) -> Result<Self, CommandTemplateError> {
        let argv = shell_words::split(input).map_err(|error| CommandTemplateError::Split {
            input: input.to_owned(),
            error,
        })?;
        Self::new(argv)
    }

    /// Returns the template arguments, program first.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Renders the command for a single test.
    pub fn render(&self, identity: &TestIdentity) -> ReplayCommand {
        let dotted_module = identity.dotted_module();
        let mut rendered = self.argv.iter().map(|arg| {
            PLACEHOLDER_REGEX
                .replace_all(arg, |captures: &regex::Captures<'_>| match &captures[1] {
                    "file" => identity.module().to_owned(),
                    "module" => dotted_module.clone(),
                    "class" => identity.class().to_owned(),
                    "method" => identity.method().to_owned(),
                    // Rejected in new().
                    other => format!("{{{other}}}"),
                })
                .into_owned()
        });
        let program = rendered.next().unwrap_or_default();
        ReplayCommand {
            identity: identity.clone(),
            program,
            args: rendered.collect(),
        }
    }
}

impl Default for CommandTemplate {
    fn default() -> Self {
        Self {
            argv: vec![
                "python".to_owned(),
                "{file}".to_owned(),
                "{class}.{method}".to_owned(),
            ],
        }
    }
}

/// A fully rendered command replaying a single test.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReplayCommand {
    /// The test this command replays.
    pub identity: TestIdentity,

    /// The program to run.
    pub program: String,

    /// Arguments to the program.
    pub args: Vec<String>,
}

/// Displays the command shell-quoted.
impl fmt::Display for ReplayCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_words::join(
            std::iter::once(&self.program).chain(&self.args),
        ))
    }
}

/// The output of a finished command.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CapturedOutput {
    /// The exit code, negative if the process was terminated by a signal.
    pub exit_code: i32,

    /// Combined standard output and standard error, one entry per line.
    pub lines: Vec<String>,
}

/// Runs replay commands.
pub trait CommandExecutor {
    /// Runs `command` to completion, calling `on_line` for every line of combined output as it is
    /// produced.
    ///
    /// Returns an error only if the command could not be run at all.
    fn execute(
        &self,
        command: &ReplayCommand,
        cwd: Option<&Utf8Path>,
        on_line: &mut dyn FnMut(&str),
    ) -> io::Result<CapturedOutput>;
}

/// Runs commands as child processes through `duct`, with standard error merged into standard
/// output.
#[derive(Clone, Copy, Debug, Default)]
pub struct DuctExecutor;

impl CommandExecutor for DuctExecutor {
    fn execute(
        &self,
        command: &ReplayCommand,
        cwd: Option<&Utf8Path>,
        on_line: &mut dyn FnMut(&str),
    ) -> io::Result<CapturedOutput> {
        let mut expression = duct::cmd(
            command.program.as_str(),
            command.args.iter().map(|arg| &**arg),
        )
        .stderr_to_stdout()
        .unchecked();
        if let Some(cwd) = cwd {
            expression = expression.dir(cwd.as_std_path());
        }

        debug!("spawning {command}");
        let handle = expression.reader()?;
        let mut reader = BufReader::new(&handle);
        let mut lines = Vec::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end();
            on_line(line);
            lines.push(line.to_owned());
        }

        let output = handle.try_wait()?.ok_or_else(|| {
            io::Error::other(format!("`{command}` closed its output but did not exit"))
        })?;
        Ok(CapturedOutput {
            exit_code: signed_exit_code(output.status),
            lines,
        })
    }
}

/// The result of replaying a single test.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ReplayOutcome {
    /// The process was terminated by a signal.
    HwFail,

    /// The process exited with a non-zero exit code, or could not be run.
    Fail,

    /// The process exited with exit code 0.
    Ok,

    /// The output mentioned that the test was skipped.
    Skip,
}

impl ReplayOutcome {
    /// Classifies a single run by its exit code.
    pub fn from_exit_code(exit_code: i32) -> Self {
        match exit_code {
            0 => Self::Ok,
            code if code > 0 => Self::Fail,
            _ => Self::HwFail,
        }
    }

    /// Returns the spelling used in summaries.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HwFail => "HWFAIL",
            Self::Fail => "FAIL",
            Self::Ok => "OK",
            Self::Skip => "SKIP",
        }
    }

    /// Returns the directory, relative to the write path, that transcripts for this outcome go
    /// to.
    pub fn transcript_dir(self) -> &'static str {
        match self {
            Self::HwFail => "hwfail",
            Self::Fail => "fail",
            Self::Ok | Self::Skip => "success",
        }
    }

    /// Returns the results file section this outcome is listed under, if any.
    ///
    /// Skipped tests are not listed in the results file.
    pub fn results_section(self) -> Option<&'static str> {
        match self {
            Self::HwFail => Some("#HWFAIL"),
            Self::Fail => Some("#FAIL"),
            Self::Ok => Some("#OK"),
            Self::Skip => None,
        }
    }
}

impl fmt::Display for ReplayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true if a line of output shows that the test was skipped.
fn is_skip_line(line: &str) -> bool {
    line.to_lowercase().contains("skipped")
}

/// The replay result of a single test.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReplayResult {
    /// The test.
    pub identity: TestIdentity,

    /// The final outcome.
    pub outcome: ReplayOutcome,

    /// The transcript of the last iteration.
    pub transcript_path: Utf8PathBuf,
}

/// The results of a replay run, in the order tests were replayed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReplaySummary {
    /// Results, one per test.
    pub results: Vec<ReplayResult>,

    /// The results file that was written.
    pub results_path: Utf8PathBuf,
}

impl ReplaySummary {
    /// Returns the number of tests with the given outcome.
    pub fn count(&self, outcome: ReplayOutcome) -> usize {
        self.results
            .iter()
            .filter(|result| result.outcome == outcome)
            .count()
    }

    /// Renders the results file: `#HWFAIL`, `#FAIL` and `#OK` sections of tab-table lines.
    ///
    /// The output is itself a valid tab-table suite, so failing subsets can be replayed again.
    pub fn results_file_contents(&self) -> String {
        let mut out = String::new();
        for (idx, outcome) in [ReplayOutcome::HwFail, ReplayOutcome::Fail, ReplayOutcome::Ok]
            .into_iter()
            .enumerate()
        {
            if idx > 0 {
                out.push('\n');
            }
            if let Some(section) = outcome.results_section() {
                out.push_str(section);
                out.push('\n');
            }
            for result in self.results.iter().filter(|r| r.outcome == outcome) {
                out.push_str(&result.identity.table_display().to_string());
                out.push('\n');
            }
        }
        out
    }
}

/// Replay runner builder.
#[derive(Clone, Debug, Default)]
pub struct ReplayRunnerBuilder {
    template: CommandTemplate,
    repeat: Option<NonZeroUsize>,
    cwd: Option<Utf8PathBuf>,
}

impl ReplayRunnerBuilder {
    /// Sets the command template.
    pub fn set_template(&mut self, template: CommandTemplate) -> &mut Self {
        self.template = template;
        self
    }

    /// Sets the number of times each test is run.
    pub fn set_repeat(&mut self, repeat: NonZeroUsize) -> &mut Self {
        self.repeat = Some(repeat);
        self
    }

    /// Sets the working directory replayed commands are run in.
    pub fn set_cwd(&mut self, cwd: impl Into<Utf8PathBuf>) -> &mut Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Creates a runner that writes transcripts and results under `write_path`, running commands
    /// as child processes.
    pub fn build(&self, write_path: impl Into<Utf8PathBuf>) -> ReplayRunner<DuctExecutor> {
        self.build_with_executor(write_path, DuctExecutor)
    }

    /// Creates a runner with a custom executor.
    pub fn build_with_executor<E: CommandExecutor>(
        &self,
        write_path: impl Into<Utf8PathBuf>,
        executor: E,
    ) -> ReplayRunner<E> {
        ReplayRunner {
            template: self.template.clone(),
            repeat: self.repeat.unwrap_or(NonZeroUsize::MIN),
            cwd: self.cwd.clone(),
            write_path: write_path.into(),
            executor,
        }
    }
}

/// Replays tests sequentially and records their outcomes.
#[derive(Debug)]
pub struct ReplayRunner<E = DuctExecutor> {
    template: CommandTemplate,
    repeat: NonZeroUsize,
    cwd: Option<Utf8PathBuf>,
    write_path: Utf8PathBuf,
    executor: E,
}

impl<E: CommandExecutor> ReplayRunner<E> {
    /// Returns the directory transcripts and results are written under.
    pub fn write_path(&self) -> &Utf8Path {
        &self.write_path
    }

    /// Replays every test in order, echoing output to `console`.
    ///
    /// Failures of replayed commands are recorded as outcomes. Errors are returned only for
    /// problems writing transcripts, results or console output.
    pub fn run(
        &self,
        tests: &[TestIdentity],
        console: &mut dyn Write,
    ) -> Result<ReplaySummary, ReplayError> {
        for outcome in [ReplayOutcome::HwFail, ReplayOutcome::Fail, ReplayOutcome::Ok] {
            let dir = self.write_path.join(outcome.transcript_dir());
            std::fs::create_dir_all(&dir).map_err(|error| OutputDirCreateError::new(&dir, error))?;
        }

        let mut summary = ReplaySummary::default();
        for identity in tests {
            let result = self.replay_one(identity, console)?;
            summary.results.push(result);
        }

        write_test_summary(&summary, console).map_err(ReplayError::Console)?;

        let results_path = self.write_path.join(RESULTS_FILE);
        let contents = summary.results_file_contents();
        AtomicFile::new(&results_path, AllowOverwrite)
            .write(|f| f.write_all(contents.as_bytes()))
            .map_err(|error| ReplayError::WriteResults {
                path: results_path.clone(),
                error,
            })?;
        debug!("wrote {results_path}");
        summary.results_path = results_path;

        Ok(summary)
    }

    fn replay_one(
        &self,
        identity: &TestIdentity,
        console: &mut dyn Write,
    ) -> Result<ReplayResult, ReplayError> {
        let command = self.template.render(identity);
        let repeat = self.repeat.get();

        let mut skip_seen = false;
        let mut last = (ReplayOutcome::Fail, Vec::new());
        for iteration in 1..=repeat {
            let banner = "=".repeat(80);
            writeln!(
                console,
                "\n{banner}\nRunning: {command} (Iteration {iteration}/{repeat})\n{banner}"
            )
            .and_then(|()| console.flush())
            .map_err(ReplayError::Console)?;

            // Flushed per line, so output shows up while the command is still running.
            let mut console_error = None;
            let mut echo = |line: &str| {
                if console_error.is_none()
                    && let Err(error) = writeln!(console, "{line}").and_then(|()| console.flush())
                {
                    console_error = Some(error);
                }
            };
            let res = self
                .executor
                .execute(&command, self.cwd.as_deref(), &mut echo);
            if let Some(error) = console_error {
                return Err(ReplayError::Console(error));
            }

            last = match res {
                Ok(output) => {
                    debug!("{command} {}", display_exit_code(output.exit_code));
                    if output.lines.iter().any(|line| is_skip_line(line)) {
                        skip_seen = true;
                    }
                    (ReplayOutcome::from_exit_code(output.exit_code), output.lines)
                }
                Err(error) => {
                    warn!("error running `{command}`: {error}");
                    (
                        ReplayOutcome::Fail,
                        vec![format!("error running `{command}`: {error}")],
                    )
                }
            };
        }

        let (last_outcome, transcript) = last;
        let outcome = if skip_seen {
            ReplayOutcome::Skip
        } else {
            last_outcome
        };
        info!("{identity}: {outcome}");

        let transcript_path = self
            .write_path
            .join(outcome.transcript_dir())
            .join(format!("{}.txt", file_name_component(&identity.dotted_name())));
        let mut contents = transcript.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }
        std::fs::write(&transcript_path, contents).map_err(|error| {
            ReplayError::WriteTranscript {
                path: transcript_path.clone(),
                error,
            }
        })?;

        Ok(ReplayResult {
            identity: identity.clone(),
            outcome,
            transcript_path,
        })
    }
}

fn write_test_summary(summary: &ReplaySummary, console: &mut dyn Write) -> io::Result<()> {
    writeln!(console, "\n\nTest Summary:")?;
    writeln!(console, "{}", "=".repeat(80))?;
    for result in &summary.results {
        writeln!(
            console,
            "{} # {}",
            result.identity.table_display(),
            result.outcome
        )?;
    }
    Ok(())
}
