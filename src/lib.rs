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

//! Embedded analytical engine session for CSV dashboards.
//!
//! A [`Session`] owns one DuckDB instance running on a dedicated worker
//! thread and one connection to it. It loads a CSV dataset into a fixed
//! table, runs SQL against it and hands back rows whose wide integers have
//! been narrowed to plain numbers.
//!
//! ```no_run
//! # async fn demo() -> duckdash::Result<()> {
//! use duckdash::{Session, SessionConfig};
//!
//! let session = Session::new(SessionConfig::default())?;
//! session.initialize_with_progress(|p| eprintln!("engine {p}%")).await?;
//! session.load_dataset("date,category,value\n2023-01-01,Books,3\n").await?;
//! let rows = session.query("SELECT category, SUM(value) AS total FROM sales_data GROUP BY 1").await?;
//! # let _ = rows;
//! session.terminate().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dashboard;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod session;
pub mod sql;
pub mod value;
mod worker;

#[cfg(feature = "server")]
pub mod server {
    pub mod encode;
    pub mod handler;
    pub mod types;
}

pub use config::{DatasetConfig, EngineConfig, SessionConfig};
pub use dashboard::{pivot_time_series, Dashboard, DashboardQueries, DateRange, Snapshot};
pub use dataset::{Column, Dataset};
pub use engine::{DuckDbFactory, Engine, EngineConnection, EngineError, EngineFactory, EngineResult, EngineVariant, Storage};
pub use error::{Error, Result};
pub use session::{ProgressFn, Session, SessionState};
pub use value::{normalize, QueryOutput, Row, RowSet, Value, MAX_SAFE_INTEGER};
