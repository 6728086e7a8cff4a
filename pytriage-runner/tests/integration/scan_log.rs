// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use pytriage_runner::{
    classify::TestStatus,
    config::TriageConfig,
    identity::TestIdentity,
    scanner::{LogScannerBuilder, OutputDirs},
};

#[test]
fn scan_fixture_log_default_policy() -> Result<()> {
    test_init();

    let mut scanner = LogScannerBuilder::default().build()?;
    let mut out = Vec::new();
    let stats = scanner.scan_path(&fixture("logs/rocm-run.log"), &mut out)?;

    assert_eq!(
        String::from_utf8(out)?,
        indoc! {"
            test_ops.py::TestCommonCUDA::test_conv_cuda_float16 - HWFAILED
            test_ops.py::TestCommonCUDA::test_mm_cuda_float32 - FAILED
            test_inductor.py::TestInductorOpInfo::test_sum_cuda - INDUCTOR_FAILED
            test_ops.py::TestCommonCUDA::test_abort_cuda - HWFAILED
        "}
    );

    assert_eq!(stats.total(), 7, "one decision per distinct test");
    assert_eq!(stats.count(TestStatus::Passed), 2);
    assert_eq!(stats.count(TestStatus::HwFail), 2);
    assert_eq!(stats.count(TestStatus::Skipped), 1);
    assert_eq!(stats.problems(), 4);
    assert_eq!(stats.reported, 4);
    assert_eq!(stats.saved_outputs, 0);

    let flaky = TestIdentity::new("test_ops.py", "TestCommonCUDA", "test_flaky_cuda");
    assert_eq!(
        scanner.reported().get(&flaky),
        None,
        "rerun that passed is not reported by default"
    );

    Ok(())
}

#[test]
fn scan_fixture_log_report_all() -> Result<()> {
    test_init();

    let mut scanner = LogScannerBuilder::default()
        .set_report_passed(true)
        .set_report_skipped(true)
        .build()?;
    let mut out = Vec::new();
    scanner.scan_path(&fixture("logs/rocm-run.log"), &mut out)?;

    assert_eq!(
        String::from_utf8(out)?,
        indoc! {"
            test_ops.py::TestCommonCUDA::test_add_cuda_float32 - PASSED
            test_ops.py::TestCommonCUDA::test_conv_cuda_float16 - HWFAILED
            test_ops.py::TestCommonCUDA::test_mm_cuda_float32 - FAILED
            test_inductor.py::TestInductorOpInfo::test_sum_cuda - INDUCTOR_FAILED
            test_ops.py::TestCommonCUDA::test_div_cuda_float32 - SKIPPED
            test_ops.py::TestCommonCUDA::test_flaky_cuda - PASSED
            test_ops.py::TestCommonCUDA::test_abort_cuda - HWFAILED
        "}
    );
    assert_eq!(scanner.reported().len(), 7);

    Ok(())
}

#[test]
fn scan_fixture_log_saves_outputs() -> Result<()> {
    test_init();

    let temp_dir = Utf8TempDir::new()?;
    let dirs = OutputDirs::under(temp_dir.path());
    let mut scanner = LogScannerBuilder::default()
        .set_output_dirs(dirs.clone())
        .build()?;
    let mut out = Vec::new();
    let stats = scanner.scan_path(&fixture("logs/rocm-run.log"), &mut out)?;
    assert_eq!(stats.saved_outputs, 4);

    assert_eq!(
        read_lines(&dirs.hw_fails_dir.join("test_conv_cuda_float16.out")),
        vec![
            "test_ops.py::TestCommonCUDA::test_conv_cuda_float16",
            "HSA_STATUS_ERROR_EXCEPTION: An HSAIL operation resulted in a hardware exception. \
             code: 0x1016",
            "test_ops.py::TestCommonCUDA::test_conv_cuda_float16 FAILED [1.50s]",
        ]
    );
    assert_eq!(
        read_lines(&dirs.hw_fails_dir.join("test_abort_cuda.out")),
        vec![
            "test_ops.py::TestCommonCUDA::test_abort_cuda",
            "Fatal Python error: Aborted",
            "Segmentation fault (core dumped)",
        ]
    );
    assert!(dirs.failures_dir.join("test_mm_cuda_float32.out").is_file());
    assert!(dirs.inductor_fails_dir.join("test_sum_cuda.out").is_file());
    assert!(!dirs.failures_dir.join("test_add_cuda_float32.out").exists());

    Ok(())
}

#[test]
fn scan_with_configured_keywords() -> Result<()> {
    test_init();

    let temp_dir = Utf8TempDir::new()?;
    let config_path = temp_dir.path().join("pytriage.toml");
    std::fs::write(
        &config_path,
        indoc! {r#"
            [profile.ci]
            hw-keywords = ["page not present"]
            inductor-keywords = ["lowering"]
        "#},
    )?;
    let config = TriageConfig::from_sources(temp_dir.path(), Some(config_path.as_path()))?;
    let profile = config.profile("ci")?;

    let mut scanner = LogScannerBuilder::default()
        .set_hw_keywords(profile.hw_keywords())
        .set_inductor_keywords(profile.inductor_keywords())
        .build()?;
    let mut out = Vec::new();
    let log = indoc! {"
        test_ops.py::TestCommonCUDA::test_conv_cuda_float16
        Reason: Page not present or supervisor privilege.
        test_ops.py::TestCommonCUDA::test_conv_cuda_float16 FAILED
        test_ops.py::TestCommonCUDA::test_abort_cuda
        Segmentation fault (core dumped)
        test_ops.py::TestCommonCUDA::test_abort_cuda FAILED
        test_inductor.py::TestInductorOpInfo::test_sum_cuda
        LoweringException: no lowering for aten.sum
        test_inductor.py::TestInductorOpInfo::test_sum_cuda PASSED
    "};
    scanner.scan_reader(log.as_bytes(), &mut out)?;

    assert_eq!(
        String::from_utf8(out)?,
        indoc! {"
            test_ops.py::TestCommonCUDA::test_conv_cuda_float16 - HWFAILED
            test_ops.py::TestCommonCUDA::test_abort_cuda - FAILED
            test_inductor.py::TestInductorOpInfo::test_sum_cuda - INDUCTOR_WARNING
        "}
    );

    Ok(())
}
