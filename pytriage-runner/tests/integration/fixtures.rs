// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Once;

pub(crate) fn fixtures_dir() -> Utf8PathBuf {
    Utf8Path::new(env!("CARGO_MANIFEST_DIR")).join("../fixtures")
}

pub(crate) fn fixture(relative: &str) -> Utf8PathBuf {
    fixtures_dir().join(relative)
}

pub(crate) fn read_lines(path: &Utf8Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("reading {path} failed: {err}"))
        .lines()
        .map(str::to_owned)
        .collect()
}

pub(crate) fn test_init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        color_eyre::install().expect("color-eyre installed once");
    });
}
