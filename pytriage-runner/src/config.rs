// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for pytriage.

use crate::{
    errors::{CommandTemplateError, ConfigParseError, ConfigParseErrorKind, ProfileNotFound},
    replay::CommandTemplate,
    scanner::OutputDirs,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{collections::HashMap, num::NonZeroUsize};
use tracing::debug;

/// Overall configuration for pytriage.
///
/// This is the root data structure for pytriage configuration. Settings are managed through
/// [profiles](TriageProfile), obtained through the [`profile`](Self::profile) method.
#[derive(Clone, Debug)]
pub struct TriageConfig {
    root: Utf8PathBuf,
    inner: TriageConfigImpl,
}

impl TriageConfig {
    /// The default location of the config within the path: `.config/pytriage.toml`, used to read
    /// the config from the given directory.
    pub const CONFIG_PATH: &'static str = ".config/pytriage.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// The name of the default profile.
    pub const DEFAULT_PROFILE: &'static str = "default";

    /// Reads the pytriage config from the given file, or if not specified from
    /// `.config/pytriage.toml` under `root`.
    ///
    /// If no config file is specified and `root` doesn't have `.config/pytriage.toml`, uses the
    /// default config options.
    pub fn from_sources(
        root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let root = root.into();
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };
        debug!("reading config from {config_file}");

        let builder = Self::make_default_config().add_source(source);
        let inner = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(config_file, kind))?;
        Ok(Self { root, inner })
    }

    /// Returns the default pytriage config.
    pub fn default_config(root: impl Into<Utf8PathBuf>) -> Self {
        let config = Self::make_default_config()
            .build()
            .expect("default config is always valid");

        let inner = config
            .try_deserialize()
            .expect("default config is always valid");
        Self {
            root: root.into(),
            inner,
        }
    }

    /// Returns the profile with the given name, or an error if a profile was specified but not
    /// found.
    pub fn profile(&self, name: impl AsRef<str>) -> Result<TriageProfile<'_>, ProfileNotFound> {
        let custom_profile = self.inner.profiles.get(name.as_ref())?;
        Ok(TriageProfile {
            root: &self.root,
            default_profile: &self.inner.profiles.default,
            custom_profile,
        })
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<TriageConfigImpl, ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(ConfigParseErrorKind::BuildError)?;

        serde_path_to_error::deserialize(config).map_err(ConfigParseErrorKind::DeserializeError)
    }
}

/// A configuration profile for pytriage.
///
/// Returned by [`TriageConfig::profile`].
#[derive(Clone, Debug)]
pub struct TriageProfile<'cfg> {
    root: &'cfg Utf8Path,
    default_profile: &'cfg DefaultProfileImpl,
    custom_profile: Option<&'cfg CustomProfileImpl>,
}

impl<'cfg> TriageProfile<'cfg> {
    /// Returns the hardware failure keywords.
    pub fn hw_keywords(&self) -> &'cfg [String] {
        self.custom_profile
            .and_then(|profile| profile.hw_keywords.as_deref())
            .unwrap_or(self.default_profile.hw_keywords.as_slice())
    }

    /// Returns the backend compiler failure keywords.
    pub fn inductor_keywords(&self) -> &'cfg [String] {
        self.custom_profile
            .and_then(|profile| profile.inductor_keywords.as_deref())
            .unwrap_or(self.default_profile.inductor_keywords.as_slice())
    }

    /// Returns true if passed tests are reported when scanning logs.
    pub fn report_passed(&self) -> bool {
        self.custom_profile
            .and_then(|profile| profile.report_passed)
            .unwrap_or(self.default_profile.report_passed)
    }

    /// Returns true if skipped and xfailed tests are reported when scanning logs.
    pub fn report_skipped(&self) -> bool {
        self.custom_profile
            .and_then(|profile| profile.report_skipped)
            .unwrap_or(self.default_profile.report_skipped)
    }

    /// Returns true if outputs of reported failures are saved when scanning logs.
    pub fn save_outputs(&self) -> bool {
        self.custom_profile
            .and_then(|profile| profile.save_outputs)
            .unwrap_or(self.default_profile.save_outputs)
    }

    /// Returns the directories saved outputs go to, resolved against the config root.
    pub fn output_dirs(&self) -> OutputDirs {
        let hw_fails_dir = self
            .custom_profile
            .and_then(|profile| profile.hw_fails_dir.as_deref())
            .unwrap_or(self.default_profile.hw_fails_dir.as_path());
        let inductor_fails_dir = self
            .custom_profile
            .and_then(|profile| profile.inductor_fails_dir.as_deref())
            .unwrap_or(self.default_profile.inductor_fails_dir.as_path());
        let failures_dir = self
            .custom_profile
            .and_then(|profile| profile.failures_dir.as_deref())
            .unwrap_or(self.default_profile.failures_dir.as_path());
        OutputDirs {
            hw_fails_dir: self.root.join(hw_fails_dir),
            inductor_fails_dir: self.root.join(inductor_fails_dir),
            failures_dir: self.root.join(failures_dir),
        }
    }

    /// Returns the raw replay command template.
    pub fn replay_command(&self) -> &'cfg [String] {
        self.custom_profile
            .and_then(|profile| profile.replay_command.as_deref())
            .unwrap_or(self.default_profile.replay_command.as_slice())
    }

    /// Returns the validated replay command template.
    pub fn command_template(&self) -> Result<CommandTemplate, CommandTemplateError> {
        CommandTemplate::new(self.replay_command())
    }

    /// Returns the number of times each test is replayed.
    pub fn replay_repeat(&self) -> NonZeroUsize {
        self.custom_profile
            .and_then(|profile| profile.replay_repeat)
            .unwrap_or(self.default_profile.replay_repeat)
    }

    /// Returns the issue search URL prefix used in Markdown output.
    pub fn issue_search_url(&self) -> &'cfg str {
        self.custom_profile
            .and_then(|profile| profile.issue_search_url.as_deref())
            .unwrap_or(self.default_profile.issue_search_url.as_str())
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TriageConfigImpl {
    #[serde(rename = "profile")]
    profiles: TriageProfilesImpl,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TriageProfilesImpl {
    default: DefaultProfileImpl,
    #[serde(flatten)]
    other: HashMap<String, CustomProfileImpl>,
}

impl TriageProfilesImpl {
    fn get(&self, profile: &str) -> Result<Option<&CustomProfileImpl>, ProfileNotFound> {
        let custom_profile = match profile {
            TriageConfig::DEFAULT_PROFILE => None,
            other => Some(
                self.other
                    .get(other)
                    .ok_or_else(|| ProfileNotFound::new(profile, self.all_profiles()))?,
            ),
        };
        Ok(custom_profile)
    }

    fn all_profiles(&self) -> impl Iterator<Item = &str> {
        self.other
            .keys()
            .map(|key| key.as_str())
            .chain(std::iter::once(TriageConfig::DEFAULT_PROFILE))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultProfileImpl {
    hw_keywords: Vec<String>,
    inductor_keywords: Vec<String>,
    report_passed: bool,
    report_skipped: bool,
    save_outputs: bool,
    hw_fails_dir: Utf8PathBuf,
    inductor_fails_dir: Utf8PathBuf,
    failures_dir: Utf8PathBuf,
    replay_command: Vec<String>,
    replay_repeat: NonZeroUsize,
    issue_search_url: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CustomProfileImpl {
    #[serde(default)]
    hw_keywords: Option<Vec<String>>,
    #[serde(default)]
    inductor_keywords: Option<Vec<String>>,
    #[serde(default)]
    report_passed: Option<bool>,
    #[serde(default)]
    report_skipped: Option<bool>,
    #[serde(default)]
    save_outputs: Option<bool>,
    #[serde(default)]
    hw_fails_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    inductor_fails_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    failures_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    replay_command: Option<Vec<String>>,
    #[serde(default)]
    replay_repeat: Option<NonZeroUsize>,
    #[serde(default)]
    issue_search_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{DEFAULT_HW_KEYWORDS, DEFAULT_INDUCTOR_KEYWORDS};
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use test_case::test_case;

    fn write_config(dir: &Utf8TempDir, contents: &str) -> Utf8PathBuf {
        let path = dir.path().join(TriageConfig::CONFIG_PATH);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn default_config_is_valid() {
        let default_config = TriageConfig::default_config("foo");
        let profile = default_config
            .profile(TriageConfig::DEFAULT_PROFILE)
            .expect("default profile should exist");
        assert_eq!(profile.hw_keywords(), DEFAULT_HW_KEYWORDS);
        assert_eq!(profile.inductor_keywords(), DEFAULT_INDUCTOR_KEYWORDS);
        assert!(!profile.report_passed());
        assert_eq!(profile.replay_repeat().get(), 1);
        assert_eq!(
            profile.command_template().unwrap(),
            CommandTemplate::default()
        );
        assert_eq!(
            profile.output_dirs(),
            OutputDirs::under(Utf8Path::new("foo"))
        );
    }

    #[test_case(
        "",
        "default",
        false,
        1
        ; "empty config uses the defaults"
    )]
    #[test_case(
        indoc! {r#"
            [profile.default]
            report-passed = true
        "#},
        "default",
        true,
        1
        ; "overrides the default profile"
    )]
    #[test_case(
        indoc! {r#"
            [profile.default]
            report-passed = true

            [profile.ci]
            replay-repeat = 3
        "#},
        "ci",
        true,
        3
        ; "custom profile falls back to default values"
    )]
    #[test_case(
        indoc! {r#"
            [profile.ci]
            report-passed = false
            replay-repeat = 5
        "#},
        "ci",
        false,
        5
        ; "custom profile overrides"
    )]
    fn profile_values(config_contents: &str, profile: &str, report_passed: bool, repeat: usize) {
        let dir = Utf8TempDir::new().unwrap();
        write_config(&dir, config_contents);

        let config = TriageConfig::from_sources(dir.path(), None).expect("config is valid");
        let profile = config.profile(profile).expect("profile exists");
        assert_eq!(profile.report_passed(), report_passed);
        assert_eq!(profile.replay_repeat().get(), repeat);
    }

    #[test]
    fn custom_keywords_and_dirs() {
        let dir = Utf8TempDir::new().unwrap();
        write_config(
            &dir,
            indoc! {r#"
                [profile.mi300]
                hw-keywords = ["gpu hang", "memory access fault"]
                hw-fails-dir = "out/hw"
                replay-command = ["pytest", "{file}::{class}::{method}"]
            "#},
        );
        let config = TriageConfig::from_sources(dir.path(), None).unwrap();
        let profile = config.profile("mi300").unwrap();
        assert_eq!(profile.hw_keywords(), ["gpu hang", "memory access fault"]);
        assert_eq!(profile.inductor_keywords(), DEFAULT_INDUCTOR_KEYWORDS);
        assert_eq!(profile.output_dirs().hw_fails_dir, dir.path().join("out/hw"));
        assert_eq!(profile.replay_command(), ["pytest", "{file}::{class}::{method}"]);
    }

    #[test]
    fn unknown_profile() {
        let config = TriageConfig::default_config("foo");
        let err = config.profile("nope").unwrap_err();
        assert_eq!(
            err.to_string(),
            "profile `nope` not found (known profiles: default)"
        );
    }

    #[test]
    fn invalid_values_are_reported_with_paths() {
        let dir = Utf8TempDir::new().unwrap();
        let path = write_config(
            &dir,
            indoc! {r#"
                [profile.default]
                replay-repeat = 0
            "#},
        );
        let err = TriageConfig::from_sources(dir.path(), None).unwrap_err();
        assert_eq!(err.config_file(), &path);
        match err.kind() {
            ConfigParseErrorKind::DeserializeError(err) => {
                assert_eq!(err.path().to_string(), "profile.default.replay-repeat");
            }
            other => panic!("unexpected error kind: {other}"),
        }
    }

    #[test]
    fn explicit_config_file_is_required() {
        let dir = Utf8TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        let err = TriageConfig::from_sources(dir.path(), Some(missing.as_path())).unwrap_err();
        assert!(matches!(err.kind(), ConfigParseErrorKind::BuildError(_)));
    }
}
