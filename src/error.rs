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

//! Error type shared by every session operation.

use thiserror::Error;

/// Errors surfaced to callers of [`Session`](crate::Session).
///
/// Every variant carries a human-readable message only, so the type is cheap
/// to clone. A single initialization outcome is handed to all callers that
/// joined the same attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The engine, its worker or its connection could not be set up.
    #[error("engine initialization failed: {0}")]
    Initialization(String),
    /// CSV registration or table creation failed.
    #[error("failed to load dataset: {0}")]
    Load(String),
    /// An operation that needs a ready connection ran before `initialize()`.
    #[error("engine connection not initialized")]
    NotInitialized,
    /// Malformed SQL or an engine-side execution failure.
    #[error("query failed: {0}")]
    Query(String),
    /// Invalid session configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Caller-supplied input rejected before reaching the engine.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, Error>;
