// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::Result;
use pretty_assertions::assert_eq;
use pytriage_runner::{
    errors::JunitProcessError,
    junit::{FAILED_FILE, JunitExtractor, JunitSummary, PASSED_FILE, SKIPPED_FILE, TESTS_FILE},
    suite::{ConvertFormat, SuiteFormat, TestSuiteConfig},
};

#[test]
fn extract_fixture_report() -> Result<()> {
    test_init();

    let temp_dir = Utf8TempDir::new()?;
    let extractor = JunitExtractor::new(temp_dir.path());
    let summary = extractor.process_path(&fixture("junit/report.xml"))?;
    assert_eq!(
        summary,
        JunitSummary {
            tests: 5,
            passed: 2,
            failed: 2,
            skipped: 1,
            xfailed: 1,
        }
    );

    assert_eq!(
        read_lines(&temp_dir.path().join(TESTS_FILE)),
        vec![
            "test.test_ops\tTestCommonCUDA\ttest_add_cuda_float32",
            "test.test_ops\tTestCommonCUDA\ttest_mm_cuda_float32",
            "test.test_ops\tTestCommonCUDA\ttest_setup_cuda",
            "test.test_ops\tTestCommonCUDA\ttest_div_cuda_float32",
            "test.inductor.test_torchinductor\tGPUTests\ttest_sum_cuda",
        ]
    );
    assert_eq!(
        read_lines(&temp_dir.path().join(PASSED_FILE)),
        vec![
            "test.test_ops\tTestCommonCUDA\ttest_add_cuda_float32",
            "test.inductor.test_torchinductor\tGPUTests\ttest_sum_cuda",
        ]
    );
    assert_eq!(
        read_lines(&temp_dir.path().join(FAILED_FILE)),
        vec![
            "test.test_ops\tTestCommonCUDA\ttest_mm_cuda_float32",
            "test.test_ops\tTestCommonCUDA\ttest_setup_cuda",
        ]
    );
    assert_eq!(
        read_lines(&temp_dir.path().join(SKIPPED_FILE)),
        vec!["test.test_ops\tTestCommonCUDA\ttest_div_cuda_float32"]
    );

    let detail = std::fs::read_to_string(
        extractor
            .failed_dir()
            .join("test.test_ops.TestCommonCUDA.test_setup_cuda.out"),
    )?;
    assert!(
        detail.starts_with("Test: test.test_ops::TestCommonCUDA::test_setup_cuda\nStatus: ERROR\n"),
        "unexpected detail header: {detail}"
    );
    assert!(detail.contains("Error Details:\nfailed on setup with \"RuntimeError: HIP error\"\n"));
    assert!(detail.contains("RuntimeError: HIP error: invalid device function"));

    Ok(())
}

#[test]
fn repeated_reports_append() -> Result<()> {
    test_init();

    let temp_dir = Utf8TempDir::new()?;
    let extractor = JunitExtractor::new(temp_dir.path());
    let mut total = JunitSummary::default();
    for _ in 0..2 {
        total.add(&extractor.process_path(&fixture("junit/report.xml"))?);
    }
    assert_eq!(total.tests, 10);
    assert_eq!(total.xfailed, 2);
    assert_eq!(read_lines(&temp_dir.path().join(TESTS_FILE)).len(), 10);

    Ok(())
}

#[test]
fn failed_list_replays_as_suite() -> Result<()> {
    test_init();

    let temp_dir = Utf8TempDir::new()?;
    JunitExtractor::new(temp_dir.path()).process_path(&fixture("junit/report.xml"))?;

    let suite = TestSuiteConfig::load(&temp_dir.path().join(FAILED_FILE), SuiteFormat::Auto)?;
    assert_eq!(suite.test_count(), 2);

    let mut out = Vec::new();
    suite.write_converted(ConvertFormat::Pytest, Some("test."), &mut out)?;
    assert_eq!(
        String::from_utf8(out)?,
        "test_ops.py::TestCommonCUDA::test_mm_cuda_float32\n\
         test_ops.py::TestCommonCUDA::test_setup_cuda\n"
    );

    Ok(())
}

#[test]
fn missing_and_malformed_reports() -> Result<()> {
    test_init();

    let temp_dir = Utf8TempDir::new()?;
    let extractor = JunitExtractor::new(temp_dir.path().join("out"));

    let err = extractor
        .process_path(&temp_dir.path().join("does-not-exist.xml"))
        .unwrap_err();
    assert!(matches!(err, JunitProcessError::Read { .. }), "{err:?}");

    let broken = temp_dir.path().join("broken.xml");
    std::fs::write(&broken, "<testsuite><testcase name=\"a\"></testsuite>")?;
    let err = extractor.process_path(&broken).unwrap_err();
    assert!(matches!(err, JunitProcessError::Parse { .. }), "{err:?}");
    assert!(
        !temp_dir.path().join("out").join(TESTS_FILE).exists(),
        "nothing is written for a report that fails to parse"
    );

    Ok(())
}

#[test]
fn truncated_reports_are_rejected() -> Result<()> {
    test_init();

    let temp_dir = Utf8TempDir::new()?;
    let extractor = JunitExtractor::new(temp_dir.path().join("out"));

    // A report cut off by a crash of the writing process.
    let full = std::fs::read_to_string(fixture("junit/report.xml"))?;
    let cut = full
        .find("<failure")
        .expect("fixture report has a failure");
    let truncated = temp_dir.path().join("truncated.xml");
    std::fs::write(&truncated, &full[..cut + 20])?;
    let err = extractor.process_path(&truncated).unwrap_err();
    assert!(matches!(err, JunitProcessError::Parse { .. }), "{err:?}");

    let empty = temp_dir.path().join("empty.xml");
    std::fs::write(&empty, "")?;
    let err = extractor.process_path(&empty).unwrap_err();
    assert!(matches!(err, JunitProcessError::Parse { .. }), "{err:?}");

    assert!(!temp_dir.path().join("out").join(TESTS_FILE).exists());

    Ok(())
}
