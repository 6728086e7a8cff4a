// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use pytriage_runner::{
    identity::TestIdentity,
    replay::{CommandTemplate, RESULTS_FILE, ReplayOutcome, ReplayRunnerBuilder},
    suite::{SuiteFormat, TestSuiteConfig},
};
use std::num::NonZeroUsize;

fn fake_test_template() -> CommandTemplate {
    CommandTemplate::new([
        "sh".to_owned(),
        fixture("replay/fake_test.sh").into_string(),
        "{class}".to_owned(),
        "{method}".to_owned(),
    ])
    .expect("template is valid")
}

fn suite() -> TestSuiteConfig {
    ["test_ok", "test_fail", "test_crash", "test_skip"]
        .into_iter()
        .map(|method| TestIdentity::new("test/test_fake.py", "TestFake", method))
        .collect()
}

#[test]
fn replay_child_processes() -> Result<()> {
    test_init();

    let temp_dir = Utf8TempDir::new()?;
    let runner = ReplayRunnerBuilder::default()
        .set_template(fake_test_template())
        .build(temp_dir.path());

    let mut console = Vec::new();
    let summary = runner.run(&suite().generate_commands(), &mut console)?;

    let outcomes: Vec<_> = summary
        .results
        .iter()
        .map(|result| (result.identity.method(), result.outcome))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            ("test_ok", ReplayOutcome::Ok),
            ("test_fail", ReplayOutcome::Fail),
            ("test_crash", ReplayOutcome::HwFail),
            ("test_skip", ReplayOutcome::Skip),
        ]
    );

    assert_eq!(
        std::fs::read_to_string(temp_dir.path().join(RESULTS_FILE))?,
        indoc! {"
            #HWFAIL
            test.test_fake\tTestFake\ttest_crash

            #FAIL
            test.test_fake\tTestFake\ttest_fail

            #OK
            test.test_fake\tTestFake\ttest_ok
        "}
    );

    let fail_transcript = read_lines(
        &temp_dir
            .path()
            .join("fail")
            .join("test.test_fake.TestFake.test_fail.txt"),
    );
    assert_eq!(
        fail_transcript,
        vec!["running TestFake.test_fail", "AssertionError: 1 != 2"],
        "stderr is captured along with stdout"
    );
    assert!(
        temp_dir
            .path()
            .join("hwfail")
            .join("test.test_fake.TestFake.test_crash.txt")
            .is_file()
    );
    assert!(
        temp_dir
            .path()
            .join("success")
            .join("test.test_fake.TestFake.test_skip.txt")
            .is_file()
    );

    let console = String::from_utf8(console)?;
    assert!(console.contains("(Iteration 1/1)"), "{console}");
    assert!(console.contains("Test Summary:"), "{console}");
    assert!(
        console.contains("test.test_fake\tTestFake\ttest_skip # SKIP"),
        "{console}"
    );

    Ok(())
}

#[test]
fn results_file_replays_with_detected_format() -> Result<()> {
    test_init();

    let first_dir = Utf8TempDir::new()?;
    let runner = ReplayRunnerBuilder::default()
        .set_template(fake_test_template())
        .build(first_dir.path());
    runner.run(&suite().generate_commands(), &mut Vec::new())?;

    let results = TestSuiteConfig::load(&first_dir.path().join(RESULTS_FILE), SuiteFormat::Auto)?;
    let tests = results.generate_commands();
    let methods: Vec<_> = tests.iter().map(|identity| identity.method()).collect();
    assert_eq!(methods, ["test_crash", "test_fail", "test_ok"]);

    let second_dir = Utf8TempDir::new()?;
    let runner = ReplayRunnerBuilder::default()
        .set_template(fake_test_template())
        .build(second_dir.path());
    let summary = runner.run(&tests, &mut Vec::new())?;
    assert_eq!(
        std::fs::read_to_string(second_dir.path().join(RESULTS_FILE))?,
        std::fs::read_to_string(first_dir.path().join(RESULTS_FILE))?,
    );
    assert_eq!(summary.results.len(), 3);

    Ok(())
}

#[test]
fn replay_repeats_each_test() -> Result<()> {
    test_init();

    let temp_dir = Utf8TempDir::new()?;
    let runner = ReplayRunnerBuilder::default()
        .set_template(fake_test_template())
        .set_repeat(NonZeroUsize::new(3).expect("3 is non-zero"))
        .build(temp_dir.path());

    let tests = vec![TestIdentity::new("test/test_fake.py", "TestFake", "test_ok")];
    let mut console = Vec::new();
    let summary = runner.run(&tests, &mut console)?;
    assert_eq!(summary.count(ReplayOutcome::Ok), 1);

    let console = String::from_utf8(console)?;
    assert_eq!(console.matches("running TestFake.test_ok").count(), 3);
    assert!(console.contains("(Iteration 3/3)"), "{console}");

    Ok(())
}

#[test]
fn replay_missing_program_is_a_failure() -> Result<()> {
    test_init();

    let temp_dir = Utf8TempDir::new()?;
    let runner = ReplayRunnerBuilder::default()
        .set_template(CommandTemplate::parse(
            "pytriage-this-program-does-not-exist {method}",
        )?)
        .build(temp_dir.path());

    let tests = vec![TestIdentity::new("test/test_fake.py", "TestFake", "test_ok")];
    let summary = runner.run(&tests, &mut Vec::new())?;
    assert_eq!(summary.count(ReplayOutcome::Fail), 1);

    Ok(())
}
