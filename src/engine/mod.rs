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

//! Seam between the session manager and the embedded analytical engine.
//!
//! The session never touches the engine directly. An [`EngineFactory`]
//! resolves which engine variant fits the current environment and
//! instantiates it inside the worker thread; the resulting [`Engine`] and its
//! [`EngineConnection`] never leave that thread, so neither trait requires
//! `Send`.

pub mod duck;

use std::fmt;
use std::path::PathBuf;

use crate::value::QueryOutput;

pub use duck::DuckDbFactory;

/// Failure reported by the engine or by the glue around it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(msg: impl Into<String>) -> Self {
        EngineError(msg.into())
    }
}

impl From<duckdb::Error> for EngineError {
    fn from(err: duckdb::Error) -> Self {
        EngineError(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError(err.to_string())
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Where the engine keeps its tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    Memory,
    File(PathBuf),
}

/// The concrete engine build selected for this environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineVariant {
    pub storage: Storage,
    pub threads: usize,
    pub memory_limit: Option<String>,
}

impl fmt::Display for EngineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.storage {
            Storage::Memory => f.write_str("in-memory")?,
            Storage::File(path) => write!(f, "file {}", path.display())?,
        }
        write!(f, ", {} threads", self.threads)?;
        if let Some(limit) = &self.memory_limit {
            write!(f, ", memory limit {limit}")?;
        }
        Ok(())
    }
}

/// Acquisition strategy for an engine instance.
pub trait EngineFactory: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Pick the engine variant for the current environment.
    fn resolve(&self, config: &crate::config::EngineConfig) -> EngineResult<EngineVariant>;

    /// Instantiate the engine. Called on the worker thread that will own it.
    fn instantiate(&self, variant: &EngineVariant) -> EngineResult<Box<dyn Engine>>;
}

/// An instantiated engine.
pub trait Engine {
    /// Open a connection to this engine's database.
    fn connect(&mut self) -> EngineResult<Box<dyn EngineConnection>>;

    /// Make `text` readable by SQL under `name`. Returns the location to use
    /// in queries. Registering the same name again replaces the content.
    fn register_file_text(&mut self, name: &str, text: &str) -> EngineResult<String>;

    /// Release the engine. Dropping it does the same but swallows errors.
    fn close(self: Box<Self>) -> EngineResult<()> {
        Ok(())
    }
}

/// One logical connection. Calls on it never overlap.
pub trait EngineConnection {
    /// Run statements that return no rows.
    fn execute(&mut self, sql: &str) -> EngineResult<()>;

    /// Run one statement and collect its rows.
    fn query(&mut self, sql: &str) -> EngineResult<QueryOutput>;

    fn close(self: Box<Self>) -> EngineResult<()> {
        Ok(())
    }
}
