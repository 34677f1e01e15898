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

//! Session manager: the lifecycle of one embedded engine and one connection.
//!
//! A [`Session`] moves through `Uninitialized -> Initializing -> Ready`, or
//! to `Failed` when any setup step breaks. Concurrent `initialize()` callers
//! join the attempt already in flight instead of starting a second engine; a
//! failed attempt is forgotten so the next call starts from scratch.
//!
//! Queries go over the single connection. The worker hosting the engine
//! serves requests one at a time, so the session adds no locking of its own
//! around queries.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, SessionConfig};
use crate::dataset::{self, Dataset};
use crate::engine::{DuckDbFactory, EngineError, EngineFactory, EngineResult};
use crate::error::{Error, Result};
use crate::sql::{self, StatementKind};
use crate::value::{Row, RowSet};
use crate::worker::{ConnectionHandle, EngineHandle};

/// Progress callback. Receives advisory percentages (10, 20, 40, 60, 80, 100).
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

type InitOutcome = Shared<BoxFuture<'static, Result<()>>>;

/// Observable lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::Failed => "failed",
        })
    }
}

enum State {
    Uninitialized,
    Initializing { attempt: u64, outcome: InitOutcome },
    /// The only state holding engine and connection handles.
    Ready(Arc<Live>),
    Failed,
}

struct Slot {
    state: State,
    attempts: u64,
    last_error: Option<String>,
    dataset: Option<Dataset>,
}

struct Inner {
    config: SessionConfig,
    factory: Arc<dyn EngineFactory>,
    slot: Mutex<Slot>,
}

/// Engine worker plus the connection opened inside it.
struct Live {
    engine: EngineHandle,
    connection: ConnectionHandle,
}

impl Live {
    async fn execute(&self, sql: &str) -> EngineResult<()> {
        debug!(sql, "execute");
        self.engine.execute(self.connection, sql).await
    }

    async fn fetch(&self, sql: &str) -> EngineResult<RowSet> {
        debug!(sql, "query");
        let started = Instant::now();
        let output = self.engine.query(self.connection, sql).await?;
        let (rows, narrowing) = output.into_row_set();
        if narrowing.lossy > 0 {
            warn!(
                lossy = narrowing.lossy,
                narrowed = narrowing.narrowed,
                "wide integers exceeded the exact numeric range and lost precision"
            );
        }
        debug!(
            rows = rows.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "query done"
        );
        Ok(rows)
    }
}

/// Handle to one embedded engine session. Clones share the same engine.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("factory", &self.inner.factory.name())
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    /// Session backed by the bundled DuckDB engine.
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_factory(config, Arc::new(DuckDbFactory))
    }

    /// Session backed by a custom engine acquisition strategy.
    pub fn with_factory(config: SessionConfig, factory: Arc<dyn EngineFactory>) -> Result<Self> {
        config.validate()?;
        Ok(Session {
            inner: Arc::new(Inner {
                config,
                factory,
                slot: Mutex::new(Slot {
                    state: State::Uninitialized,
                    attempts: 0,
                    last_error: None,
                    dataset: None,
                }),
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        match self.slot().state {
            State::Uninitialized => SessionState::Uninitialized,
            State::Initializing { .. } => SessionState::Initializing,
            State::Ready(_) => SessionState::Ready,
            State::Failed => SessionState::Failed,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Message of the most recent failed initialization, cleared on success.
    pub fn last_error(&self) -> Option<String> {
        self.slot().last_error.clone()
    }

    /// The dataset produced by the last successful load.
    pub fn dataset(&self) -> Option<Dataset> {
        self.slot().dataset.clone()
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Initialization
    // -----------------------------------------------------------------------

    /// Bring the engine up. Returns immediately when already ready and joins
    /// the in-flight attempt when one is running.
    pub async fn initialize(&self) -> Result<()> {
        self.start(None).await
    }

    /// Like [`initialize`](Self::initialize), reporting progress. Only the
    /// caller that starts an attempt receives progress; callers joining an
    /// attempt in flight just await its outcome.
    pub async fn initialize_with_progress<F>(&self, on_progress: F) -> Result<()>
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        self.start(Some(Arc::new(on_progress))).await
    }

    async fn start(&self, progress: Option<ProgressFn>) -> Result<()> {
        let outcome = {
            let mut slot = self.slot();
            let joined = match &slot.state {
                State::Ready(_) => return Ok(()),
                State::Initializing { outcome, .. } => Some(outcome.clone()),
                State::Uninitialized | State::Failed => None,
            };
            match joined {
                Some(outcome) => {
                    debug!("joining engine initialization in flight");
                    outcome
                }
                None => {
                    slot.attempts += 1;
                    let attempt = slot.attempts;
                    let outcome = bootstrap(Arc::downgrade(&self.inner), attempt, progress)
                        .boxed()
                        .shared();
                    slot.state = State::Initializing {
                        attempt,
                        outcome: outcome.clone(),
                    };
                    outcome
                }
            }
        };
        outcome.await
    }

    /// Ready handles, initializing first when configured to.
    async fn live(&self) -> Result<Arc<Live>> {
        if let Some(live) = self.ready_handles() {
            return Ok(live);
        }
        if !self.inner.config.auto_initialize {
            return Err(Error::NotInitialized);
        }
        self.initialize().await?;
        self.ready_handles().ok_or(Error::NotInitialized)
    }

    fn ready_handles(&self) -> Option<Arc<Live>> {
        match &self.slot().state {
            State::Ready(live) => Some(live.clone()),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Dataset
    // -----------------------------------------------------------------------

    /// Replace the dataset table with the rows of `csv_text`.
    ///
    /// Reloading drops the previous table first, so calling this twice with
    /// the same text yields the same table.
    pub async fn load_dataset(&self, csv_text: &str) -> Result<Dataset> {
        let live = self.live().await?;
        let ds = &self.inner.config.dataset;
        let started = Instant::now();
        let load = |e: EngineError| Error::Load(e.0);

        live.execute(&dataset::drop_table_sql(ds)).await.map_err(load)?;
        // The old table is gone; until the new one exists there is no dataset.
        self.slot().dataset = None;
        let location = live
            .engine
            .register_file_text(&ds.file_name, csv_text)
            .await
            .map_err(load)?;
        live.execute(&dataset::create_table_sql(ds, &location))
            .await
            .map_err(load)?;

        let counted = live.fetch(&dataset::count_sql(ds)).await.map_err(load)?;
        let row_count = dataset::row_count(counted.rows())
            .ok_or_else(|| Error::Load("row count query returned no value".into()))?;
        let described = live.fetch(&dataset::describe_sql(ds)).await.map_err(load)?;

        let loaded = Dataset {
            table: ds.table.clone(),
            row_count,
            columns: dataset::columns(described.rows()),
        };
        info!(
            table = %loaded.table,
            rows = loaded.row_count,
            columns = loaded.columns.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "dataset loaded"
        );
        self.slot().dataset = Some(loaded.clone());
        Ok(loaded)
    }

    /// Read a CSV file and load it with [`load_dataset`](Self::load_dataset).
    pub async fn load_dataset_file(&self, path: impl AsRef<Path>) -> Result<Dataset> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Load(format!("failed to read {}: {e}", path.display())))?;
        self.load_dataset(&text).await
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Run `sql` and return its rows with wide integers narrowed to numbers.
    ///
    /// The SQL text is passed to the engine as is. Callers interpolating
    /// user input must validate it first (see [`crate::dashboard::DateRange`]).
    pub async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        Ok(self.query_set(sql).await?.into_rows())
    }

    /// Like [`query`](Self::query) but keeps the column list, which matters
    /// for empty results.
    pub async fn query_set(&self, sql: &str) -> Result<RowSet> {
        let live = self.live().await?;
        live.fetch(sql).await.map_err(|e| Error::Query(e.0))
    }

    /// Run statements that return no rows.
    pub async fn execute(&self, sql: &str) -> Result<()> {
        let live = self.live().await?;
        live.execute(sql).await.map_err(|e| Error::Query(e.0))
    }

    /// Run a `;`-separated script statement by statement and return the
    /// result of the last one. Commands yield an empty result.
    pub async fn execute_script(&self, script: &str) -> Result<RowSet> {
        let statements = sql::split_statements(script)?;
        if statements.is_empty() {
            return Err(Error::InvalidInput("empty script".into()));
        }
        let mut last = RowSet::new(Vec::new().into(), Vec::new());
        for stmt in &statements {
            last = match sql::classify(stmt) {
                StatementKind::Query => self.query_set(stmt).await?,
                StatementKind::Command => {
                    self.execute(stmt).await?;
                    RowSet::new(Vec::new().into(), Vec::new())
                }
            };
        }
        Ok(last)
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Close the connection, release the engine and return to
    /// `Uninitialized`. A no-op when nothing is open.
    pub async fn terminate(&self) {
        let previous = {
            let mut slot = self.slot();
            slot.dataset = None;
            std::mem::replace(&mut slot.state, State::Uninitialized)
        };
        match previous {
            State::Ready(live) => {
                if let Err(e) = live.engine.close(live.connection).await {
                    warn!(error = %e, "closing engine connection failed");
                }
                if let Err(e) = live.engine.shutdown().await {
                    warn!(error = %e, "releasing engine failed");
                }
                info!("engine released");
            }
            State::Initializing { attempt, .. } => {
                info!(attempt, "terminated during initialization; that engine will be discarded");
            }
            State::Uninitialized | State::Failed => debug!("terminate: no engine to release"),
        }
    }
}

// ---------------------------------------------------------------------------
// Initialization attempt
// ---------------------------------------------------------------------------

fn report(progress: Option<&ProgressFn>, percent: u8) {
    if let Some(f) = progress {
        f(percent);
    }
}

/// One initialization attempt. Holds only a weak reference to the session
/// between steps, so an abandoned attempt does not keep the session alive.
async fn bootstrap(session: Weak<Inner>, attempt: u64, progress: Option<ProgressFn>) -> Result<()> {
    let (factory, engine_config) = match session.upgrade() {
        Some(inner) => (inner.factory.clone(), inner.config.engine.clone()),
        None => return Err(Error::Initialization("session dropped".into())),
    };
    let started = Instant::now();
    report(progress.as_ref(), 10);

    let result = open_engine(factory, &engine_config, progress.as_ref()).await;

    let Some(inner) = session.upgrade() else {
        return Err(Error::Initialization("session dropped".into()));
    };
    let mut slot = inner.slot.lock().unwrap_or_else(PoisonError::into_inner);
    let current = matches!(slot.state, State::Initializing { attempt: a, .. } if a == attempt);
    match result {
        Ok(live) if current => {
            slot.state = State::Ready(Arc::new(live));
            slot.last_error = None;
            drop(slot);
            info!(
                attempt,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "engine ready"
            );
            report(progress.as_ref(), 100);
            Ok(())
        }
        Ok(_discarded) => {
            drop(slot);
            warn!(attempt, "session terminated during initialization; engine discarded");
            Err(Error::Initialization(
                "session terminated during initialization".into(),
            ))
        }
        Err(e) => {
            if current {
                slot.state = State::Failed;
                slot.last_error = Some(e.to_string());
            }
            drop(slot);
            warn!(attempt, error = %e, "engine initialization failed");
            Err(e)
        }
    }
}

async fn open_engine(
    factory: Arc<dyn EngineFactory>,
    config: &EngineConfig,
    progress: Option<&ProgressFn>,
) -> Result<Live> {
    let init = |e: EngineError| Error::Initialization(e.0);

    let variant = factory.resolve(config).map_err(init)?;
    info!(factory = factory.name(), %variant, "engine variant resolved");
    report(progress, 20);

    let engine = EngineHandle::spawn(factory).map_err(init)?;
    report(progress, 40);

    engine.instantiate(variant).await.map_err(init)?;
    report(progress, 60);

    let connection = engine.connect().await.map_err(init)?;
    report(progress, 80);

    Ok(Live { engine, connection })
}
