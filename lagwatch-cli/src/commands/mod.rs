// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

use std::path::Path;

use lagwatch_core::{ConfigLoader, ControllerConfig, LagwatchResult};

pub mod policy;
pub mod run;
pub mod simulate;
pub mod validate;

/// Controller settings from `path`, or the defaults when there is no such file.
pub fn controller_config(path: &str) -> LagwatchResult<ControllerConfig> {
    if Path::new(path).exists() {
        Ok(ConfigLoader::load_file(path)?.controller)
    } else {
        tracing::debug!(config = %path, "No configuration file, using defaults");
        Ok(ControllerConfig::default())
    }
}
