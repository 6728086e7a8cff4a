// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

mod fixtures;
mod junit;
#[cfg(unix)]
mod replay;
mod scan_log;
mod suite;
