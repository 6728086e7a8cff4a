// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::Result;
use pretty_assertions::assert_eq;
use pytriage_runner::{
    errors::SuiteLoadErrorKind,
    identity::TestIdentity,
    suite::{ConvertFormat, SuiteFormat, TestSuiteConfig},
};
use test_case::test_case;

fn expected_tests() -> Vec<TestIdentity> {
    vec![
        TestIdentity::new("test/test_ops.py", "TestCommonCUDA", "test_add_cuda_float32"),
        TestIdentity::new("test/test_ops.py", "TestCommonCUDA", "test_mm_cuda_float32"),
        TestIdentity::new("test/inductor/test_torchinductor.py", "GPUTests", "test_sum_cuda"),
    ]
}

#[test_case("suites/suite.yaml", SuiteFormat::Yaml ; "yaml")]
#[test_case("suites/suite.tsv", SuiteFormat::Table ; "table")]
#[test_case("suites/suite-pytest.txt", SuiteFormat::Pytest ; "pytest")]
#[test_case("suites/suite-indent.txt", SuiteFormat::Indent ; "indent")]
fn load_fixture_suite(relative: &str, format: SuiteFormat) -> Result<()> {
    test_init();

    let path = fixture(relative);
    let contents = std::fs::read_to_string(&path)?;
    assert_eq!(SuiteFormat::Auto.resolve(&path, &contents), format);

    let auto = TestSuiteConfig::load(&path, SuiteFormat::Auto)?;
    let explicit = TestSuiteConfig::load(&path, format)?;
    assert_eq!(auto, explicit);
    assert_eq!(auto.generate_commands(), expected_tests());

    Ok(())
}

#[test]
fn malformed_table_fails_whole_load() {
    test_init();

    let err = TestSuiteConfig::load(&fixture("suites/malformed.tsv"), SuiteFormat::Auto)
        .unwrap_err();
    match err.kind() {
        SuiteLoadErrorKind::MalformedTableLine { line_number, line } => {
            assert_eq!(*line_number, 2);
            assert_eq!(line.field_count, 2);
        }
        other => panic!("unexpected error kind: {other:?}"),
    }
}

#[test]
fn convert_between_forms() -> Result<()> {
    test_init();

    let suite = TestSuiteConfig::load(&fixture("suites/suite.yaml"), SuiteFormat::Auto)?;

    let mut table = Vec::new();
    suite.write_converted(ConvertFormat::Table, None, &mut table)?;
    assert_eq!(
        String::from_utf8(table)?,
        std::fs::read_to_string(fixture("suites/suite.tsv"))?.replace("# inductor\n", "")
    );

    let mut pytest = Vec::new();
    suite.write_converted(ConvertFormat::Pytest, None, &mut pytest)?;
    assert_eq!(
        String::from_utf8(pytest)?,
        std::fs::read_to_string(fixture("suites/suite-pytest.txt"))?.replace("# inductor\n", "")
    );

    Ok(())
}

#[test]
fn markdown_for_fixture_suite() -> Result<()> {
    test_init();

    let suite = TestSuiteConfig::load(&fixture("suites/suite-indent.txt"), SuiteFormat::Auto)?;
    assert_eq!(
        suite.to_markdown(None),
        "`test.test_ops\tTestCommonCUDA\ttest_add_cuda_float32`\n\n\
         `test.test_ops\tTestCommonCUDA\ttest_mm_cuda_float32`\n\n\
         `test.inductor.test_torchinductor\tGPUTests\ttest_sum_cuda`\n"
    );

    Ok(())
}
