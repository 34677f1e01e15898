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

//! Session lifecycle tests against instrumented engine factories.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use chrono::NaiveDate;
use duckdash::{
    DuckDbFactory, Engine, EngineConfig, EngineConnection, EngineError, EngineFactory,
    EngineResult, EngineVariant, Error, QueryOutput, Session, SessionConfig, SessionState, Value,
};

const CSV: &str = "date,category,value\n\
                   2023-01-01,Books,10\n\
                   2023-01-01,Toys,5\n\
                   2023-01-02,Books,7\n";

fn config() -> SessionConfig {
    let mut config = SessionConfig::default();
    config.engine.threads = Some(1);
    config
}

// ---------------------------------------------------------------------------
// Instrumented factories
// ---------------------------------------------------------------------------

/// Counts every call that reaches the engine.
#[derive(Default)]
struct Calls {
    resolves: AtomicUsize,
    instantiations: AtomicUsize,
    statements: AtomicUsize,
}

impl Calls {
    fn total(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
            + self.instantiations.load(Ordering::SeqCst)
            + self.statements.load(Ordering::SeqCst)
    }
}

/// Latch that holds engine instantiation until opened.
#[derive(Default)]
struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cv.wait(open).unwrap();
        }
    }
}

/// DuckDB wrapped with call counting, an optional gate and a number of
/// instantiations to fail before succeeding.
struct TestFactory {
    calls: Arc<Calls>,
    gate: Option<Arc<Gate>>,
    failures_left: AtomicUsize,
}

impl TestFactory {
    fn new() -> Self {
        TestFactory {
            calls: Arc::new(Calls::default()),
            gate: None,
            failures_left: AtomicUsize::new(0),
        }
    }

    fn gated(gate: Arc<Gate>) -> Self {
        TestFactory {
            gate: Some(gate),
            ..Self::new()
        }
    }

    fn failing(times: usize) -> Self {
        TestFactory {
            failures_left: AtomicUsize::new(times),
            ..Self::new()
        }
    }
}

impl EngineFactory for TestFactory {
    fn name(&self) -> &str {
        "test-duckdb"
    }

    fn resolve(&self, config: &EngineConfig) -> EngineResult<EngineVariant> {
        self.calls.resolves.fetch_add(1, Ordering::SeqCst);
        DuckDbFactory.resolve(config)
    }

    fn instantiate(&self, variant: &EngineVariant) -> EngineResult<Box<dyn Engine>> {
        self.calls.instantiations.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(EngineError::new("engine binary unavailable"));
        }
        Ok(Box::new(CountingEngine {
            inner: DuckDbFactory.instantiate(variant)?,
            calls: self.calls.clone(),
        }))
    }
}

struct CountingEngine {
    inner: Box<dyn Engine>,
    calls: Arc<Calls>,
}

impl Engine for CountingEngine {
    fn connect(&mut self) -> EngineResult<Box<dyn EngineConnection>> {
        Ok(Box::new(CountingConnection {
            inner: self.inner.connect()?,
            calls: self.calls.clone(),
        }))
    }

    fn register_file_text(&mut self, name: &str, text: &str) -> EngineResult<String> {
        self.calls.statements.fetch_add(1, Ordering::SeqCst);
        self.inner.register_file_text(name, text)
    }

    fn close(self: Box<Self>) -> EngineResult<()> {
        self.inner.close()
    }
}

struct CountingConnection {
    inner: Box<dyn EngineConnection>,
    calls: Arc<Calls>,
}

impl EngineConnection for CountingConnection {
    fn execute(&mut self, sql: &str) -> EngineResult<()> {
        self.calls.statements.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(sql)
    }

    fn query(&mut self, sql: &str) -> EngineResult<QueryOutput> {
        self.calls.statements.fetch_add(1, Ordering::SeqCst);
        self.inner.query(sql)
    }

    fn close(self: Box<Self>) -> EngineResult<()> {
        self.inner.close()
    }
}

fn session_with(factory: TestFactory) -> (Session, Arc<Calls>) {
    let calls = factory.calls.clone();
    let session = Session::with_factory(config(), Arc::new(factory)).unwrap();
    (session, calls)
}

fn recorder() -> (Arc<Mutex<Vec<u8>>>, impl Fn(u8) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |p| sink.lock().unwrap().push(p))
}

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_scenario() {
    let (session, _) = session_with(TestFactory::new());
    let (progress, on_progress) = recorder();

    session.initialize_with_progress(on_progress).await.unwrap();
    assert_eq!(*progress.lock().unwrap(), vec![10, 20, 40, 60, 80, 100]);
    assert_eq!(session.state(), SessionState::Ready);

    let ds = session.load_dataset(CSV).await.unwrap();
    assert_eq!(ds.table, "sales_data");
    assert_eq!(ds.row_count, 3);
    let names: Vec<&str> = ds.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["date", "category", "value"]);
    assert_eq!(ds.columns[2].data_type, "INTEGER");

    let rows = session
        .query("SELECT category, SUM(value) AS total FROM sales_data GROUP BY category ORDER BY category")
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("category"), Some(&Value::Text("Books".into())));
    assert_eq!(rows[0].get("total"), Some(&Value::Number(17.0)));
    assert_eq!(rows[1].get("total"), Some(&Value::Number(5.0)));

    session.terminate().await;
    assert_eq!(session.state(), SessionState::Uninitialized);
    assert_eq!(session.query("SELECT 1").await, Err(Error::NotInitialized));
}

#[tokio::test]
async fn concurrent_initialize_shares_one_attempt() {
    let gate = Arc::new(Gate::default());
    let (session, calls) = session_with(TestFactory::gated(gate.clone()));
    let (first, on_first) = recorder();
    let (second, on_second) = recorder();

    let (a, b, ()) = tokio::join!(
        session.initialize_with_progress(on_first),
        session.initialize_with_progress(on_second),
        async {
            assert_eq!(session.state(), SessionState::Initializing);
            gate.open();
        }
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(calls.resolves.load(Ordering::SeqCst), 1);
    assert_eq!(calls.instantiations.load(Ordering::SeqCst), 1);
    // Only the caller that started the attempt sees progress.
    assert_eq!(*first.lock().unwrap(), vec![10, 20, 40, 60, 80, 100]);
    assert!(second.lock().unwrap().is_empty());
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn initialize_when_ready_is_a_no_op() {
    let (session, calls) = session_with(TestFactory::new());
    session.initialize().await.unwrap();
    session.initialize().await.unwrap();
    session.clone().initialize().await.unwrap();
    assert_eq!(calls.instantiations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_initialization_resets_for_retry() {
    let (session, calls) = session_with(TestFactory::failing(1));

    let err = session.initialize().await.unwrap_err();
    assert!(matches!(err, Error::Initialization(ref m) if m.contains("unavailable")), "{err}");
    assert_eq!(session.state(), SessionState::Failed);
    assert!(session.last_error().is_some());
    assert_eq!(session.query("SELECT 1").await, Err(Error::NotInitialized));

    session.initialize().await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert!(session.last_error().is_none());
    assert_eq!(calls.instantiations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unresolvable_engine_fails_initialization() {
    let mut config = config();
    config.engine.database_path = Some("/definitely/not/here/dash.duckdb".into());
    let session = Session::new(config).unwrap();
    let err = session.initialize().await.unwrap_err();
    assert!(matches!(err, Error::Initialization(ref m) if m.contains("does not exist")), "{err}");
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn terminate_during_initialization_discards_the_engine() {
    let gate = Arc::new(Gate::default());
    let (session, calls) = session_with(TestFactory::gated(gate.clone()));

    let (result, ()) = tokio::join!(session.initialize(), async {
        assert_eq!(session.state(), SessionState::Initializing);
        session.terminate().await;
        gate.open();
    });
    assert!(matches!(result, Err(Error::Initialization(_))), "{result:?}");
    assert_eq!(session.state(), SessionState::Uninitialized);

    session.initialize().await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(calls.instantiations.load(Ordering::SeqCst), 2);
}

// ---------------------------------------------------------------------------
// Operations before initialization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn operations_before_initialize_touch_no_engine() {
    let (session, calls) = session_with(TestFactory::new());

    assert_eq!(session.query("SELECT 1").await, Err(Error::NotInitialized));
    assert_eq!(session.load_dataset(CSV).await, Err(Error::NotInitialized));
    assert_eq!(session.execute("CREATE TABLE t (x INT)").await, Err(Error::NotInitialized));
    assert!(matches!(
        session.query_set("SELECT 1").await,
        Err(Error::NotInitialized)
    ));
    assert_eq!(calls.total(), 0);
    assert_eq!(session.state(), SessionState::Uninitialized);
}

#[tokio::test]
async fn auto_initialize_starts_the_engine_on_demand() {
    let mut config = config();
    config.auto_initialize = true;
    let session = Session::new(config).unwrap();

    let ds = session.load_dataset(CSV).await.unwrap();
    assert_eq!(ds.row_count, 3);
    assert_eq!(session.state(), SessionState::Ready);
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reloading_replaces_the_table() {
    let (session, _) = session_with(TestFactory::new());
    session.initialize().await.unwrap();

    let first = session.load_dataset(CSV).await.unwrap();
    let second = session.load_dataset(CSV).await.unwrap();
    assert_eq!(first, second);

    let rows = session.query("SELECT COUNT(*) AS n FROM sales_data").await.unwrap();
    assert_eq!(rows[0].get("n"), Some(&Value::Number(3.0)));

    let smaller = session
        .load_dataset("date,category,value\n2023-02-01,Games,1\n")
        .await
        .unwrap();
    assert_eq!(smaller.row_count, 1);
    assert_eq!(session.dataset(), Some(smaller));
}

#[tokio::test]
async fn non_integer_measure_is_a_load_error() {
    let (session, _) = session_with(TestFactory::new());
    session.initialize().await.unwrap();
    let err = session
        .load_dataset("date,category,value\n2023-01-01,Books,lots\n")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Load(_)), "{err}");
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn failed_reload_forgets_the_dropped_table() {
    let (session, _) = session_with(TestFactory::new());
    session.initialize().await.unwrap();
    session
        .load_dataset("date,category,value\n2023-01-01,A,100\n2023-01-01,B,150")
        .await
        .unwrap();
    assert!(session.dataset().is_some());

    let err = session
        .load_dataset("date,category,value\n2023-01-01,A,lots\n")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Load(_)), "{err}");
    assert_eq!(session.dataset(), None);
    assert!(session.query("SELECT COUNT(*) FROM sales_data").await.is_err());

    // A good load afterwards restores the description.
    let ds = session.load_dataset(CSV).await.unwrap();
    assert_eq!(session.dataset(), Some(ds));
}

#[tokio::test]
async fn missing_measure_column_is_a_load_error() {
    let (session, _) = session_with(TestFactory::new());
    session.initialize().await.unwrap();
    let err = session
        .load_dataset("date,category,amount\n2023-01-01,Books,1\n")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Load(_)), "{err}");
}

#[tokio::test]
async fn loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CSV.as_bytes()).unwrap();

    let (session, _) = session_with(TestFactory::new());
    session.initialize().await.unwrap();
    let ds = session.load_dataset_file(file.path()).await.unwrap();
    assert_eq!(ds.row_count, 3);

    let err = session
        .load_dataset_file("/definitely/not/here.csv")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Load(_)), "{err}");
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dates_pass_through_unchanged() {
    let (session, _) = session_with(TestFactory::new());
    session.initialize().await.unwrap();
    session.load_dataset(CSV).await.unwrap();

    let rows = session
        .query("SELECT date FROM sales_data ORDER BY date LIMIT 1")
        .await
        .unwrap();
    assert_eq!(
        rows[0].get("date"),
        Some(&Value::Date(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()))
    );
}

#[tokio::test]
async fn wide_integers_are_narrowed_recursively() {
    let (session, _) = session_with(TestFactory::new());
    session.initialize().await.unwrap();

    let rows = session
        .query(
            "SELECT 42::BIGINT AS b, 7::HUGEINT AS h, [1::BIGINT, 2::BIGINT] AS l, \
             {'n': 3::UBIGINT} AS s, 9007199254740993::BIGINT AS big, \
             [1::BIGINT, 2::BIGINT]::BIGINT[2] AS arr, MAP {'k': 5::BIGINT} AS m",
        )
        .await
        .unwrap();
    let row = &rows[0];
    assert_eq!(row.get("b"), Some(&Value::Number(42.0)));
    assert_eq!(row.get("h"), Some(&Value::Number(7.0)));
    assert_eq!(
        row.get("l"),
        Some(&Value::List(vec![Value::Number(1.0), Value::Number(2.0)]))
    );
    assert_eq!(
        row.get("s"),
        Some(&Value::Object(vec![("n".into(), Value::Number(3.0))]))
    );
    // Beyond 2^53 the nearest double is returned.
    assert_eq!(row.get("big"), Some(&Value::Number(9007199254740992.0)));
    assert_eq!(
        row.get("arr"),
        Some(&Value::List(vec![Value::Number(1.0), Value::Number(2.0)]))
    );
    assert_eq!(
        row.get("m"),
        Some(&Value::Object(vec![("k".into(), Value::Number(5.0))]))
    );
}

#[tokio::test]
async fn query_errors_leave_the_session_usable() {
    let (session, _) = session_with(TestFactory::new());
    session.initialize().await.unwrap();

    let err = session.query("SELECT * FROM missing_table").await.unwrap_err();
    assert!(matches!(err, Error::Query(_)), "{err}");
    let err = session.query("SELEC 1").await.unwrap_err();
    assert!(matches!(err, Error::Query(_)), "{err}");

    let rows = session.query("SELECT 1 AS one").await.unwrap();
    assert_eq!(rows[0].get("one"), Some(&Value::Number(1.0)));
}

#[tokio::test]
async fn empty_results_keep_their_columns() {
    let (session, _) = session_with(TestFactory::new());
    session.initialize().await.unwrap();
    session.load_dataset(CSV).await.unwrap();

    let set = session
        .query_set("SELECT date, value FROM sales_data WHERE value > 1000")
        .await
        .unwrap();
    assert!(set.is_empty());
    assert_eq!(set.columns(), ["date", "value"]);
}

#[tokio::test]
async fn clones_share_one_engine() {
    let (session, calls) = session_with(TestFactory::new());
    let other = session.clone();
    session.initialize().await.unwrap();
    other.execute("CREATE TABLE shared AS SELECT 5 AS v").await.unwrap();
    let rows = session.query("SELECT v FROM shared").await.unwrap();
    assert_eq!(rows[0].get("v"), Some(&Value::Number(5.0)));
    assert_eq!(calls.instantiations.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn terminate_is_idempotent() {
    let (session, _) = session_with(TestFactory::new());
    session.terminate().await;

    session.initialize().await.unwrap();
    session.load_dataset(CSV).await.unwrap();
    session.terminate().await;
    session.terminate().await;

    assert_eq!(session.state(), SessionState::Uninitialized);
    assert!(session.dataset().is_none());
    assert_eq!(session.load_dataset(CSV).await, Err(Error::NotInitialized));
}

#[tokio::test]
async fn restart_after_terminate_gets_a_fresh_database() {
    let (session, calls) = session_with(TestFactory::new());
    session.initialize().await.unwrap();
    session.load_dataset(CSV).await.unwrap();
    session.terminate().await;

    session.initialize().await.unwrap();
    let err = session.query("SELECT * FROM sales_data").await.unwrap_err();
    assert!(matches!(err, Error::Query(_)), "{err}");
    assert_eq!(calls.instantiations.load(Ordering::SeqCst), 2);
}
