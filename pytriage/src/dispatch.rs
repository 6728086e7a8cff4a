// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    errors::{Result, current_dir},
    output::{OutputContext, OutputOpts, OutputWriter, clap_styles},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand, ValueEnum};
use itertools::Itertools;
use pytriage_metadata::TriageExitCode;
use pytriage_runner::{
    config::{TriageConfig, TriageProfile},
    helpers::plural,
    junit::{FAILED_FILE, JunitExtractor, JunitSummary, PASSED_FILE, SKIPPED_FILE, TESTS_FILE},
    replay::{ReplayOutcome, ReplayRunnerBuilder},
    scanner::LogScannerBuilder,
    suite::{ConvertFormat, SuiteFormat, TestSuiteConfig},
};
use std::{io::Write, num::NonZeroUsize};
use tracing::{debug, info};

/// Triage pytest logs and JUnit reports, and replay tests one at a time.
///
/// Test results are sorted into hardware failures, backend compiler failures and ordinary
/// failures based on the output each test produced.
#[derive(Debug, Parser)]
#[command(version, name = "pytriage", styles = clap_styles::style())]
pub struct PytriageApp {
    #[command(flatten)]
    output: OutputOpts,

    #[command(flatten)]
    config_opts: ConfigOpts,

    #[command(subcommand)]
    command: Command,
}

impl PytriageApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the exit code.
    pub fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        let root = current_dir()?;
        let config = self.config_opts.make_config(&root)?;
        let profile = config.profile(self.config_opts.profile_name())?;
        debug!(
            "using profile `{}` with config root {root}",
            self.config_opts.profile_name()
        );

        match self.command {
            Command::ScanLog { log, scan_opts } => {
                scan_opts.exec(&log, &profile, output, output_writer)
            }
            Command::Junit {
                reports,
                output_dir,
            } => exec_junit(&reports, output_dir, output_writer),
            Command::Suite { command } => command.exec(&profile, output_writer),
            Command::Replay {
                suite,
                replay_opts,
            } => replay_opts.exec(&suite, &profile, output_writer),
        }
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "CONFIG OPTIONS")]
struct ConfigOpts {
    /// Config file [default: current-dir/.config/pytriage.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    /// Configuration profile to use
    #[arg(
        long,
        short = 'P',
        global = true,
        value_name = "NAME",
        env = "PYTRIAGE_PROFILE"
    )]
    profile: Option<String>,
}

impl ConfigOpts {
    /// Creates a pytriage config with the given options.
    fn make_config(&self, root: &Utf8Path) -> Result<TriageConfig> {
        Ok(TriageConfig::from_sources(
            root,
            self.config_file.as_deref(),
        )?)
    }

    fn profile_name(&self) -> &str {
        self.profile
            .as_deref()
            .unwrap_or(TriageConfig::DEFAULT_PROFILE)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify the tests in a pytest log
    ///
    /// Reads a pytest log written with `-v`, and prints one `<test> - <STATUS>` line for each
    /// test worth looking at. Failures are refined into hardware failures (HWFAILED) and backend
    /// compiler failures (INDUCTOR_FAILED) by keywords in the output of each test.
    ScanLog {
        /// The pytest log to scan
        #[arg(value_name = "LOG")]
        log: Utf8PathBuf,

        #[command(flatten)]
        scan_opts: ScanLogOpts,
    },

    /// Extract results from JUnit XML reports
    ///
    /// Appends every test case to tests.txt, and to one of passed.txt, failed.txt or
    /// skipped.txt. Failures and errors also get a detail file under failed/. Expected failures
    /// are dropped.
    Junit {
        /// JUnit XML reports, processed in order
        #[arg(value_name = "XML", required = true)]
        reports: Vec<Utf8PathBuf>,

        /// Directory the summary files are appended to
        #[arg(long, value_name = "DIR", default_value = ".")]
        output_dir: Utf8PathBuf,
    },

    /// Work with test suite files
    Suite {
        #[command(subcommand)]
        command: SuiteCommand,
    },

    /// Replay the tests of a suite one process at a time
    ///
    /// Each test is run with the replay command of the profile. Tests killed by a signal are
    /// recorded as HWFAIL, other non-zero exits as FAIL. The outcomes are written to results.txt,
    /// which can itself be replayed.
    Replay {
        /// The suite file listing tests to replay
        #[arg(value_name = "CONFIG")]
        suite: Utf8PathBuf,

        #[command(flatten)]
        replay_opts: ReplayOpts,
    },
}

#[derive(Debug, Args)]
#[command(next_help_heading = "SCAN OPTIONS")]
struct ScanLogOpts {
    /// Also report tests that passed
    #[arg(long)]
    report_passed: bool,

    /// Also report tests that were skipped or expected to fail
    #[arg(long)]
    report_skipped: bool,

    /// Hardware failure keywords, comma-separated [default: from profile]
    #[arg(long, value_name = "KEYWORDS", value_delimiter = ',')]
    hw_keywords: Option<Vec<String>>,

    /// Backend compiler failure keywords, comma-separated [default: from profile]
    #[arg(long, value_name = "KEYWORDS", value_delimiter = ',')]
    inductor_keywords: Option<Vec<String>>,

    /// Save the output of reported failures and warnings
    #[arg(long)]
    save_outputs: bool,

    /// Directory for hardware failure outputs [default: from profile]
    #[arg(long, value_name = "DIR")]
    hw_fails_dir: Option<Utf8PathBuf>,

    /// Directory for backend compiler failure outputs [default: from profile]
    #[arg(long, value_name = "DIR")]
    inductor_fails_dir: Option<Utf8PathBuf>,

    /// Directory for other failure outputs [default: from profile]
    #[arg(long, value_name = "DIR")]
    failures_dir: Option<Utf8PathBuf>,
}

impl ScanLogOpts {
    fn exec(
        self,
        log: &Utf8Path,
        profile: &TriageProfile<'_>,
        output: OutputContext,
        output_writer: &mut OutputWriter,
    ) -> Result<i32> {
        let mut builder = LogScannerBuilder::default();
        builder
            .set_report_passed(self.report_passed || profile.report_passed())
            .set_report_skipped(self.report_skipped || profile.report_skipped())
            .set_hw_keywords(
                self.hw_keywords
                    .unwrap_or_else(|| profile.hw_keywords().to_vec()),
            )
            .set_inductor_keywords(
                self.inductor_keywords
                    .unwrap_or_else(|| profile.inductor_keywords().to_vec()),
            );

        if self.save_outputs || profile.save_outputs() {
            let mut dirs = profile.output_dirs();
            if let Some(dir) = self.hw_fails_dir {
                dirs.hw_fails_dir = dir;
            }
            if let Some(dir) = self.inductor_fails_dir {
                dirs.inductor_fails_dir = dir;
            }
            if let Some(dir) = self.failures_dir {
                dirs.failures_dir = dir;
            }
            builder.set_output_dirs(dirs);
        }

        let mut scanner = builder.build()?;
        if output.colorize_stdout() {
            scanner.colorize();
        }

        let mut writer = output_writer.stdout_writer();
        let stats = scanner.scan_path(log, &mut writer)?;
        writer.flush().map_err(ExpectedError::write_output)?;

        info!(
            "scanned {} {}: {} reported, {} with problems",
            stats.total(),
            plural::tests_str(stats.total()),
            stats.reported,
            stats.problems(),
        );
        if stats.saved_outputs > 0 {
            debug!("saved {} output files", stats.saved_outputs);
        }

        Ok(TriageExitCode::OK)
    }
}

fn exec_junit(
    reports: &[Utf8PathBuf],
    output_dir: Utf8PathBuf,
    output_writer: &mut OutputWriter,
) -> Result<i32> {
    let extractor = JunitExtractor::new(output_dir);
    let mut total = JunitSummary::default();
    for report in reports {
        let summary = extractor.process_path(report)?;
        debug!(
            "{report}: {} {} appended, {} xfailed",
            summary.tests,
            plural::tests_str(summary.tests),
            summary.xfailed
        );
        total.add(&summary);
    }

    let mut writer = output_writer.stdout_writer();
    writeln!(
        writer,
        "Results appended to {} in {} ({} passed, {} failed, {} skipped, {} xfailed)",
        [TESTS_FILE, PASSED_FILE, FAILED_FILE, SKIPPED_FILE].join(", "),
        extractor.output_dir(),
        total.passed,
        total.failed,
        total.skipped,
        total.xfailed,
    )
    .map_err(ExpectedError::write_output)?;
    writer.flush().map_err(ExpectedError::write_output)?;

    Ok(TriageExitCode::OK)
}

#[derive(Debug, Args)]
struct SuiteOpts {
    /// The suite file
    #[arg(value_name = "CONFIG")]
    suite: Utf8PathBuf,

    /// Suite file format
    #[arg(long, value_enum, default_value_t, value_name = "FORMAT")]
    format: SuiteFormatOpt,
}

impl SuiteOpts {
    fn load(&self) -> Result<TestSuiteConfig> {
        let suite = TestSuiteConfig::load(&self.suite, self.format.into())?;
        debug!(
            "loaded {} {} from {}",
            suite.test_count(),
            plural::tests_str(suite.test_count()),
            self.suite
        );
        Ok(suite)
    }
}

#[derive(Debug, Subcommand)]
enum SuiteCommand {
    /// Print the replay command for every test in a suite
    List {
        #[command(flatten)]
        suite_opts: SuiteOpts,
    },

    /// Print a suite as Markdown, one test identifier per paragraph
    Markdown {
        #[command(flatten)]
        suite_opts: SuiteOpts,

        /// Link each test to an issue search for its method name
        #[arg(long)]
        find_issues: bool,
    },

    /// Rewrite a suite in pytest or tab-table form
    Convert {
        #[command(flatten)]
        suite_opts: SuiteOpts,

        /// Output form
        #[arg(long, value_enum, value_name = "FORMAT")]
        to: ConvertFormatOpt,

        /// Dotted module prefix to strip, e.g. `test.`
        #[arg(long, value_name = "PREFIX")]
        strip_prefix: Option<String>,
    },
}

impl SuiteCommand {
    fn exec(self, profile: &TriageProfile<'_>, output_writer: &mut OutputWriter) -> Result<i32> {
        let mut writer = output_writer.stdout_writer();
        match self {
            Self::List { suite_opts } => {
                let template = profile.command_template()?;
                let suite = suite_opts.load()?;
                for identity in suite.generate_commands() {
                    writeln!(writer, "{}", template.render(&identity))
                        .map_err(ExpectedError::write_output)?;
                }
            }
            Self::Markdown {
                suite_opts,
                find_issues,
            } => {
                let suite = suite_opts.load()?;
                let url = find_issues.then(|| profile.issue_search_url());
                write!(writer, "{}", suite.to_markdown(url)).map_err(ExpectedError::write_output)?;
            }
            Self::Convert {
                suite_opts,
                to,
                strip_prefix,
            } => {
                let suite = suite_opts.load()?;
                suite
                    .write_converted(to.into(), strip_prefix.as_deref(), &mut writer)
                    .map_err(ExpectedError::write_output)?;
            }
        }
        writer.flush().map_err(ExpectedError::write_output)?;

        Ok(TriageExitCode::OK)
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "REPLAY OPTIONS")]
struct ReplayOpts {
    /// Suite file format
    #[arg(long, value_enum, default_value_t, value_name = "FORMAT")]
    format: SuiteFormatOpt,

    /// Directory transcripts and results.txt are written to
    #[arg(long, value_name = "DIR", default_value = ".")]
    write_path: Utf8PathBuf,

    /// Number of times to run each test [default: from profile]
    #[arg(long, value_name = "N")]
    repeat: Option<NonZeroUsize>,

    /// Working directory for replayed commands [default: current directory]
    #[arg(long, value_name = "DIR")]
    cwd: Option<Utf8PathBuf>,
}

impl ReplayOpts {
    fn exec(
        self,
        suite_path: &Utf8Path,
        profile: &TriageProfile<'_>,
        output_writer: &mut OutputWriter,
    ) -> Result<i32> {
        let template = profile.command_template()?;
        let suite_opts = SuiteOpts {
            suite: suite_path.to_owned(),
            format: self.format,
        };
        let suite = suite_opts.load()?;
        let tests = suite.generate_commands();

        let repeat = self.repeat.unwrap_or_else(|| profile.replay_repeat());
        let mut builder = ReplayRunnerBuilder::default();
        builder.set_template(template).set_repeat(repeat);
        if let Some(cwd) = self.cwd {
            builder.set_cwd(cwd);
        }
        let runner = builder.build(self.write_path);

        let mut writer = output_writer.stdout_writer();
        let summary = runner.run(&tests, &mut writer)?;
        writer.flush().map_err(ExpectedError::write_output)?;

        let counts = [
            ReplayOutcome::Ok,
            ReplayOutcome::Fail,
            ReplayOutcome::HwFail,
            ReplayOutcome::Skip,
        ]
        .into_iter()
        .map(|outcome| format!("{} {outcome}", summary.count(outcome)))
        .join(", ");
        info!(
            "replayed {} {}, {} {} each ({counts}), results written to {}",
            tests.len(),
            plural::tests_str(tests.len()),
            repeat,
            plural::iterations_str(repeat.get()),
            summary.results_path,
        );

        Ok(TriageExitCode::OK)
    }
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum SuiteFormatOpt {
    /// Detect from the file extension and first line
    #[default]
    Auto,
    /// Nested mapping of file, class and method list
    #[value(alias = "yml")]
    Yaml,
    /// `dotted.module<TAB>Class<TAB>method` lines
    Table,
    /// `path/to/file.py::Class::method` lines
    Pytest,
    /// Files, indented classes and further indented methods
    Indent,
}

impl From<SuiteFormatOpt> for SuiteFormat {
    fn from(opt: SuiteFormatOpt) -> Self {
        match opt {
            SuiteFormatOpt::Auto => Self::Auto,
            SuiteFormatOpt::Yaml => Self::Yaml,
            SuiteFormatOpt::Table => Self::Table,
            SuiteFormatOpt::Pytest => Self::Pytest,
            SuiteFormatOpt::Indent => Self::Indent,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ConvertFormatOpt {
    /// `path/to/file.py::Class::method`
    Pytest,
    /// `dotted.module<TAB>Class<TAB>method`
    Table,
}

impl From<ConvertFormatOpt> for ConvertFormat {
    fn from(opt: ConvertFormatOpt) -> Self {
        match opt {
            ConvertFormatOpt::Pytest => Self::Pytest,
            ConvertFormatOpt::Table => Self::Table,
        }
    }
}
