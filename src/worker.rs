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

//! Worker execution context hosting one engine instance.
//!
//! The engine and its connection live on a dedicated OS thread. Async callers
//! talk to it through a request channel; every request carries a oneshot
//! reply channel. Requests are served strictly in arrival order, which is
//! what serializes queries on the single connection.

use std::sync::mpsc;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::engine::{Engine, EngineConnection, EngineError, EngineFactory, EngineResult, EngineVariant};
use crate::value::QueryOutput;

type Reply<T> = oneshot::Sender<EngineResult<T>>;

enum Request {
    Instantiate {
        variant: EngineVariant,
        reply: Reply<()>,
    },
    Connect {
        reply: Reply<ConnectionHandle>,
    },
    RegisterFileText {
        name: String,
        text: String,
        reply: Reply<String>,
    },
    Execute {
        conn: ConnectionHandle,
        sql: String,
        reply: Reply<()>,
    },
    Query {
        conn: ConnectionHandle,
        sql: String,
        reply: Reply<QueryOutput>,
    },
    Close {
        conn: ConnectionHandle,
        reply: Reply<()>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Identifies the connection opened inside a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionHandle(u64);

/// Send-safe handle to a worker thread and the engine it hosts.
pub(crate) struct EngineHandle {
    tx: mpsc::Sender<Request>,
}

impl EngineHandle {
    /// Start a worker thread. The engine is not instantiated yet.
    ///
    /// The thread is detached. It exits after `shutdown()` or once every
    /// handle is dropped, releasing the engine on its way out.
    pub(crate) fn spawn(factory: Arc<dyn EngineFactory>) -> EngineResult<Self> {
        let (tx, rx) = mpsc::channel::<Request>();
        std::thread::Builder::new()
            .name("duckdash-engine".into())
            .spawn(move || WorkerState::new(factory).run(rx))
            .map_err(|e| EngineError(format!("failed to start engine worker: {e}")))?;
        Ok(EngineHandle { tx })
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> EngineResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| EngineError::new("engine worker stopped"))?;
        rx.await
            .map_err(|_| EngineError::new("engine worker dropped reply"))?
    }

    pub(crate) async fn instantiate(&self, variant: EngineVariant) -> EngineResult<()> {
        self.call(|reply| Request::Instantiate { variant, reply })
            .await
    }

    pub(crate) async fn connect(&self) -> EngineResult<ConnectionHandle> {
        self.call(|reply| Request::Connect { reply }).await
    }

    pub(crate) async fn register_file_text(&self, name: &str, text: &str) -> EngineResult<String> {
        let (name, text) = (name.to_owned(), text.to_owned());
        self.call(|reply| Request::RegisterFileText { name, text, reply })
            .await
    }

    pub(crate) async fn execute(&self, conn: ConnectionHandle, sql: &str) -> EngineResult<()> {
        let sql = sql.to_owned();
        self.call(|reply| Request::Execute { conn, sql, reply })
            .await
    }

    pub(crate) async fn query(&self, conn: ConnectionHandle, sql: &str) -> EngineResult<QueryOutput> {
        let sql = sql.to_owned();
        self.call(|reply| Request::Query { conn, sql, reply })
            .await
    }

    pub(crate) async fn close(&self, conn: ConnectionHandle) -> EngineResult<()> {
        self.call(|reply| Request::Close { conn, reply }).await
    }

    /// Release the engine and stop the worker thread.
    pub(crate) async fn shutdown(&self) -> EngineResult<()> {
        self.call(|reply| Request::Shutdown { reply }).await
    }
}

// ---------------------------------------------------------------------------
// Worker thread
// ---------------------------------------------------------------------------

struct WorkerState {
    factory: Arc<dyn EngineFactory>,
    engine: Option<Box<dyn Engine>>,
    connection: Option<(ConnectionHandle, Box<dyn EngineConnection>)>,
    next_conn: u64,
}

impl WorkerState {
    fn new(factory: Arc<dyn EngineFactory>) -> Self {
        WorkerState {
            factory,
            engine: None,
            connection: None,
            next_conn: 1,
        }
    }

    fn run(mut self, rx: mpsc::Receiver<Request>) {
        while let Ok(req) = rx.recv() {
            // A dropped receiver means the caller gave up; keep serving.
            match req {
                Request::Instantiate { variant, reply } => {
                    let _ = reply.send(self.instantiate(&variant));
                }
                Request::Connect { reply } => {
                    let _ = reply.send(self.connect());
                }
                Request::RegisterFileText { name, text, reply } => {
                    let _ = reply.send(self.engine().and_then(|e| e.register_file_text(&name, &text)));
                }
                Request::Execute { conn, sql, reply } => {
                    let _ = reply.send(self.connection(conn).and_then(|c| c.execute(&sql)));
                }
                Request::Query { conn, sql, reply } => {
                    let _ = reply.send(self.connection(conn).and_then(|c| c.query(&sql)));
                }
                Request::Close { conn, reply } => {
                    let _ = reply.send(self.close(conn));
                }
                Request::Shutdown { reply } => {
                    let _ = reply.send(self.release());
                    return;
                }
            }
        }
        if let Err(e) = self.release() {
            warn!(error = %e, "engine release on worker exit failed");
        }
    }

    fn instantiate(&mut self, variant: &EngineVariant) -> EngineResult<()> {
        if self.engine.is_some() {
            return Err(EngineError::new("engine already instantiated in this worker"));
        }
        debug!(factory = self.factory.name(), %variant, "instantiating engine");
        self.engine = Some(self.factory.instantiate(variant)?);
        Ok(())
    }

    fn connect(&mut self) -> EngineResult<ConnectionHandle> {
        if self.connection.is_some() {
            return Err(EngineError::new("a connection is already open"));
        }
        let conn = self.engine()?.connect()?;
        let handle = ConnectionHandle(self.next_conn);
        self.next_conn += 1;
        self.connection = Some((handle, conn));
        Ok(handle)
    }

    fn engine(&mut self) -> EngineResult<&mut Box<dyn Engine>> {
        self.engine
            .as_mut()
            .ok_or_else(|| EngineError::new("engine not instantiated"))
    }

    fn connection(&mut self, handle: ConnectionHandle) -> EngineResult<&mut Box<dyn EngineConnection>> {
        match &mut self.connection {
            Some((h, conn)) if *h == handle => Ok(conn),
            _ => Err(EngineError::new("connection is closed")),
        }
    }

    fn close(&mut self, handle: ConnectionHandle) -> EngineResult<()> {
        match self.connection.take() {
            Some((h, conn)) if h == handle => conn.close(),
            other => {
                self.connection = other;
                Err(EngineError::new("connection is closed"))
            }
        }
    }

    /// Close whatever is still open: connection first, then the engine.
    fn release(&mut self) -> EngineResult<()> {
        let conn_result = match self.connection.take() {
            Some((_, conn)) => conn.close(),
            None => Ok(()),
        };
        let engine_result = match self.engine.take() {
            Some(engine) => engine.close(),
            None => Ok(()),
        };
        conn_result.and(engine_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::DuckDbFactory;

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        futures::executor::block_on(f)
    }

    fn ready_worker() -> (EngineHandle, ConnectionHandle) {
        let factory: Arc<dyn EngineFactory> = Arc::new(DuckDbFactory);
        let variant = factory
            .resolve(&EngineConfig {
                threads: Some(1),
                ..EngineConfig::default()
            })
            .unwrap();
        let worker = EngineHandle::spawn(factory).unwrap();
        block_on(worker.instantiate(variant)).unwrap();
        let conn = block_on(worker.connect()).unwrap();
        (worker, conn)
    }

    #[test]
    fn serves_queries_in_order() {
        let (worker, conn) = ready_worker();
        block_on(worker.execute(conn, "CREATE TABLE t (x INTEGER)")).unwrap();
        block_on(worker.execute(conn, "INSERT INTO t VALUES (1), (2)")).unwrap();
        let out = block_on(worker.query(conn, "SELECT SUM(x) AS s FROM t")).unwrap();
        assert_eq!(out.columns, ["s"]);
        assert_eq!(out.rows.len(), 1);
    }

    #[test]
    fn only_one_connection_at_a_time() {
        let (worker, _conn) = ready_worker();
        let err = block_on(worker.connect()).unwrap_err();
        assert!(err.0.contains("already open"), "{err}");
    }

    #[test]
    fn closed_connection_rejects_queries() {
        let (worker, conn) = ready_worker();
        block_on(worker.close(conn)).unwrap();
        let err = block_on(worker.query(conn, "SELECT 1")).unwrap_err();
        assert!(err.0.contains("closed"), "{err}");
        assert!(block_on(worker.close(conn)).is_err());
    }

    #[test]
    fn connect_before_instantiate_fails() {
        let worker = EngineHandle::spawn(Arc::new(DuckDbFactory)).unwrap();
        let err = block_on(worker.connect()).unwrap_err();
        assert!(err.0.contains("not instantiated"), "{err}");
    }

    #[test]
    fn shutdown_stops_the_worker() {
        let (worker, conn) = ready_worker();
        block_on(worker.shutdown()).unwrap();
        let err = block_on(worker.query(conn, "SELECT 1")).unwrap_err();
        assert!(err.0.contains("stopped") || err.0.contains("dropped"), "{err}");
    }
}
