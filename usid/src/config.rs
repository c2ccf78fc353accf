/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Configuration for dataset views.
//!
//! Settings come from defaults, overridden by environment variables.
//! A process-wide instance lives in [`global`]; each view takes a
//! snapshot of it when opened.

use std::env;

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::eval::Evaluation;

/// Evaluation used when a read does not ask for one.
pub const USID_EVALUATION: &str = "USID_EVALUATION";
/// Rows per chunk of a deferred read.
pub const USID_CHUNK_ROWS: &str = "USID_CHUNK_ROWS";
/// Worker threads for deferred reads; 0 uses the backend default.
pub const USID_NUM_THREADS: &str = "USID_NUM_THREADS";

pub const DEFAULT_CHUNK_ROWS: usize = 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub evaluation: Evaluation,
    pub chunk_rows: usize,
    pub num_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            evaluation: Evaluation::Eager,
            chunk_rows: DEFAULT_CHUNK_ROWS,
            num_threads: 0,
        }
    }
}

/// Partial configuration: only the settings that were given.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_rows: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_threads: Option<usize>,
}

/// Load configuration overrides from environment variables.
pub fn from_env() -> Overrides {
    from_vars(|key| env::var(key).ok())
}

/// Load configuration overrides from a variable lookup. Unparsable
/// values are logged and ignored.
pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Overrides {
    let mut overrides = Overrides::default();

    if let Some(val) = lookup(USID_EVALUATION) {
        match val.parse() {
            Ok(evaluation) => overrides.evaluation = Some(evaluation),
            Err(err) => warn!("ignoring {}: {}", USID_EVALUATION, err),
        }
    }
    if let Some(val) = lookup(USID_CHUNK_ROWS) {
        match val.trim().parse::<usize>() {
            Ok(rows) if rows >= 1 => overrides.chunk_rows = Some(rows),
            _ => warn!("ignoring {}={:?}: expected a positive integer", USID_CHUNK_ROWS, val),
        }
    }
    if let Some(val) = lookup(USID_NUM_THREADS) {
        match val.trim().parse::<usize>() {
            Ok(threads) => overrides.num_threads = Some(threads),
            Err(_) => warn!("ignoring {}={:?}: expected an integer", USID_NUM_THREADS, val),
        }
    }

    overrides
}

/// Merge overrides into a configuration, the overrides taking
/// precedence.
pub fn merge(config: &mut Config, overrides: &Overrides) {
    if let Some(evaluation) = overrides.evaluation {
        config.evaluation = evaluation;
    }
    if let Some(chunk_rows) = overrides.chunk_rows {
        config.chunk_rows = chunk_rows.max(1);
    }
    if let Some(num_threads) = overrides.num_threads {
        config.num_threads = num_threads;
    }
}

/// Global configuration functions
pub mod global {
    use std::sync::LazyLock;

    use parking_lot::RwLock;

    use super::*;

    /// Global configuration instance, initialized from environment variables.
    static CONFIG: LazyLock<RwLock<Config>> = LazyLock::new(|| {
        let mut config = Config::default();
        merge(&mut config, &from_env());
        RwLock::new(config)
    });

    /// A snapshot of the global configuration.
    pub fn get() -> Config {
        CONFIG.read().clone()
    }

    /// Apply overrides to the global configuration.
    pub fn set(overrides: &Overrides) {
        merge(&mut CONFIG.write(), overrides);
    }

    /// Reset the global configuration to defaults, ignoring the
    /// environment.
    pub fn reset_to_defaults() {
        *CONFIG.write() = Config::default();
    }
}
