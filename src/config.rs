//   Copyright (c) 2024-2026 Anton Kundenko <singaraiona@gmail.com>
//   All rights reserved.
//
//   Permission is hereby granted, free of charge, to any person obtaining a copy
//   of this software and associated documentation files (the "Software"), to deal
//   in the Software without restriction, including without limitation the rights
//   to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
//   copies of the Software, and to permit persons to whom the Software is
//   furnished to do so, subject to the following conditions:
//
//   The above copyright notice and this permission notice shall be included in all
//   copies or substantial portions of the Software.
//
//   THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
//   IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//   FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//   AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//   LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
//   OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
//   SOFTWARE.

//! Session configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! auto_initialize = false
//!
//! [engine]
//! threads = 4
//! memory_limit = "1GB"
//!
//! [dataset]
//! table = "sales_data"
//! measure_column = "value"
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level configuration of a [`Session`](crate::Session).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Initialize the engine on demand from `load_dataset`/`query` instead of
    /// failing with `NotInitialized`.
    pub auto_initialize: bool,
    pub engine: EngineConfig,
    pub dataset: DatasetConfig,
}

/// How the embedded engine is instantiated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Database file. `None` keeps everything in memory.
    pub database_path: Option<PathBuf>,
    /// Engine worker threads. `None` uses the available parallelism.
    pub threads: Option<usize>,
    /// Engine memory limit in DuckDB notation, e.g. `"512MB"`.
    pub memory_limit: Option<String>,
}

/// Where the dashboard dataset lives inside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetConfig {
    /// Fixed table name, reused across reloads.
    pub table: String,
    /// Name under which the CSV text is registered with the engine.
    pub file_name: String,
    pub date_column: String,
    pub category_column: String,
    /// Numeric column coerced to INTEGER on load.
    pub measure_column: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfig {
            table: "sales_data".into(),
            file_name: "data.csv".into(),
            date_column: "date".into(),
            category_column: "category".into(),
            measure_column: "value".into(),
        }
    }
}

impl SessionConfig {
    /// Load and validate a configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        content.parse()
    }

    /// Check identifiers, file names and engine limits.
    pub fn validate(&self) -> Result<()> {
        let ds = &self.dataset;
        for (what, ident) in [
            ("table", &ds.table),
            ("date_column", &ds.date_column),
            ("category_column", &ds.category_column),
            ("measure_column", &ds.measure_column),
        ] {
            if !is_identifier(ident) {
                return Err(Error::Config(format!(
                    "dataset.{what} must be a plain identifier, got '{ident}'"
                )));
            }
        }

        let file_name = Path::new(&ds.file_name);
        let bare = file_name.file_name().is_some_and(|n| n == file_name.as_os_str());
        if ds.file_name.is_empty() || !bare || ds.file_name.contains('\'') {
            return Err(Error::Config(format!(
                "dataset.file_name must be a bare file name, got '{}'",
                ds.file_name
            )));
        }

        if self.engine.threads == Some(0) {
            return Err(Error::Config("engine.threads must be at least 1".into()));
        }
        if let Some(limit) = &self.engine.memory_limit {
            if limit.trim().is_empty() || limit.contains('\'') {
                return Err(Error::Config(format!(
                    "engine.memory_limit is not a valid size: '{limit}'"
                )));
            }
        }
        Ok(())
    }
}

impl FromStr for SessionConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: SessionConfig =
            toml::from_str(s).map_err(|e| Error::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
