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

//! DuckDB backend.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveTime};
use duckdb::types::{TimeUnit, Value as DuckValue};
use duckdb::{Config, Connection};
use tracing::debug;

use super::{Engine, EngineConnection, EngineError, EngineFactory, EngineResult, EngineVariant, Storage};
use crate::config::EngineConfig;
use crate::value::{QueryOutput, Value};

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const UNIX_EPOCH_CE_DAYS: i32 = 719_163;

/// Bundled DuckDB, linked into the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct DuckDbFactory;

impl EngineFactory for DuckDbFactory {
    fn name(&self) -> &str {
        "duckdb"
    }

    fn resolve(&self, config: &EngineConfig) -> EngineResult<EngineVariant> {
        let storage = match &config.database_path {
            None => Storage::Memory,
            Some(path) => {
                let parent = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("."));
                if !parent.is_dir() {
                    return Err(EngineError(format!(
                        "database directory {} does not exist",
                        parent.display()
                    )));
                }
                Storage::File(path.clone())
            }
        };
        let threads = match config.threads {
            Some(n) => n,
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        };
        Ok(EngineVariant {
            storage,
            threads,
            memory_limit: config.memory_limit.clone(),
        })
    }

    fn instantiate(&self, variant: &EngineVariant) -> EngineResult<Box<dyn Engine>> {
        let threads = i64::try_from(variant.threads)
            .map_err(|_| EngineError::new("thread count out of range"))?;
        let mut config = Config::default().threads(threads)?;
        if let Some(limit) = &variant.memory_limit {
            config = config.max_memory(limit)?;
        }
        let db = match &variant.storage {
            Storage::Memory => Connection::open_in_memory_with_flags(config)?,
            Storage::File(path) => Connection::open_with_flags(path, config)?,
        };
        let files = tempfile::Builder::new().prefix("duckdash-").tempdir()?;
        debug!(dir = %files.path().display(), "engine file area ready");
        Ok(Box::new(DuckDbEngine { db, files }))
    }
}

/// A DuckDB database plus the directory backing its registered files.
struct DuckDbEngine {
    db: Connection,
    files: tempfile::TempDir,
}

impl Engine for DuckDbEngine {
    fn connect(&mut self) -> EngineResult<Box<dyn EngineConnection>> {
        let conn = self.db.try_clone()?;
        Ok(Box::new(DuckDbConnection { conn }))
    }

    fn register_file_text(&mut self, name: &str, text: &str) -> EngineResult<String> {
        let path = self.files.path().join(name);
        std::fs::write(&path, text)?;
        path.to_str()
            .map(str::to_owned)
            .ok_or_else(|| EngineError(format!("non UTF-8 path {}", path.display())))
    }

    fn close(self: Box<Self>) -> EngineResult<()> {
        let DuckDbEngine { db, files } = *self;
        db.close().map_err(|(_, e)| EngineError::from(e))?;
        files.close()?;
        Ok(())
    }
}

struct DuckDbConnection {
    conn: Connection,
}

impl EngineConnection for DuckDbConnection {
    fn execute(&mut self, sql: &str) -> EngineResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn query(&mut self, sql: &str) -> EngineResult<QueryOutput> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let columns = rows
            .as_ref()
            .map(|stmt| stmt.column_names())
            .unwrap_or_default();
        let width = columns.len();

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                let v: DuckValue = row.get(i)?;
                values.push(from_duckdb(v));
            }
            out.push(values);
        }
        Ok(QueryOutput { columns, rows: out })
    }

    fn close(self: Box<Self>) -> EngineResult<()> {
        self.conn.close().map_err(|(_, e)| EngineError::from(e))
    }
}

// ---------------------------------------------------------------------------
// Value conversion
// ---------------------------------------------------------------------------

fn to_micros(unit: TimeUnit, v: i64) -> i64 {
    match unit {
        TimeUnit::Second => v.saturating_mul(1_000_000),
        TimeUnit::Millisecond => v.saturating_mul(1_000),
        TimeUnit::Microsecond => v,
        TimeUnit::Nanosecond => v / 1_000,
    }
}

fn date_from_days(days: i32) -> Value {
    days.checked_add(UNIX_EPOCH_CE_DAYS)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .map(Value::Date)
        .unwrap_or(Value::Null)
}

fn time_from_micros(us: i64) -> Value {
    let secs = u32::try_from(us.div_euclid(1_000_000)).ok();
    let nanos = u32::try_from(us.rem_euclid(1_000_000) * 1_000).ok();
    match (secs, nanos) {
        (Some(s), Some(n)) => NaiveTime::from_num_seconds_from_midnight_opt(s, n)
            .map(Value::Time)
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Map an engine value onto [`Value`]. Wide integers stay wide here;
/// narrowing happens in [`crate::value::normalize`].
pub(crate) fn from_duckdb(v: DuckValue) -> Value {
    match v {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(i) => Value::Number(i.into()),
        DuckValue::SmallInt(i) => Value::Number(i.into()),
        DuckValue::Int(i) => Value::Number(i.into()),
        DuckValue::UTinyInt(i) => Value::Number(i.into()),
        DuckValue::USmallInt(i) => Value::Number(i.into()),
        DuckValue::UInt(i) => Value::Number(i.into()),
        DuckValue::BigInt(i) => Value::BigInt(i.into()),
        DuckValue::UBigInt(i) => Value::BigInt(i.into()),
        DuckValue::HugeInt(i) => Value::BigInt(i),
        DuckValue::Float(f) => Value::Number(f.into()),
        DuckValue::Double(f) => Value::Number(f),
        DuckValue::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .map(Value::Number)
            .unwrap_or_else(|_| Value::Text(d.to_string())),
        DuckValue::Text(s) => Value::Text(s),
        DuckValue::Enum(s) => Value::Text(s),
        DuckValue::Blob(b) => Value::Blob(b),
        DuckValue::Date32(days) => date_from_days(days),
        DuckValue::Time64(unit, v) => time_from_micros(to_micros(unit, v)),
        DuckValue::Timestamp(unit, v) => DateTime::from_timestamp_micros(to_micros(unit, v))
            .map(|dt| Value::Timestamp(dt.naive_utc()))
            .unwrap_or(Value::Null),
        DuckValue::Interval {
            months,
            days,
            nanos,
        } => Value::Interval {
            months,
            days,
            nanos,
        },
        DuckValue::List(items) | DuckValue::Array(items) => {
            Value::List(items.into_iter().map(from_duckdb).collect())
        }
        DuckValue::Struct(fields) => Value::Object(
            fields
                .keys()
                .zip(fields.values())
                .map(|(k, v)| (k.clone(), from_duckdb(v.clone())))
                .collect(),
        ),
        // Keys become field names, rendered as text.
        DuckValue::Map(entries) => Value::Object(
            entries
                .keys()
                .zip(entries.values())
                .map(|(k, v)| (from_duckdb(k.clone()).to_string(), from_duckdb(v.clone())))
                .collect(),
        ),
        DuckValue::Union(inner) => from_duckdb(*inner),
        other => Value::Text(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Box<dyn Engine> {
        let factory = DuckDbFactory;
        let variant = factory
            .resolve(&EngineConfig {
                threads: Some(1),
                ..EngineConfig::default()
            })
            .unwrap();
        factory.instantiate(&variant).unwrap()
    }

    #[test]
    fn resolves_in_memory_by_default() {
        let variant = DuckDbFactory.resolve(&EngineConfig::default()).unwrap();
        assert_eq!(variant.storage, Storage::Memory);
        assert!(variant.threads >= 1);
    }

    #[test]
    fn rejects_missing_database_directory() {
        let config = EngineConfig {
            database_path: Some("/definitely/not/here/db.duckdb".into()),
            ..EngineConfig::default()
        };
        let err = DuckDbFactory.resolve(&config).unwrap_err();
        assert!(err.0.contains("does not exist"), "{err}");
    }

    #[test]
    fn opens_file_backed_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            database_path: Some(dir.path().join("dash.duckdb")),
            threads: Some(1),
            ..EngineConfig::default()
        };
        let variant = DuckDbFactory.resolve(&config).unwrap();
        let mut engine = DuckDbFactory.instantiate(&variant).unwrap();
        let mut conn = engine.connect().unwrap();
        conn.execute("CREATE TABLE t AS SELECT 1 AS x").unwrap();
        let out = conn.query("SELECT x FROM t").unwrap();
        assert_eq!(out.rows, vec![vec![Value::Number(1.0)]]);
    }

    #[test]
    fn wide_integers_stay_wide_until_normalized() {
        let mut engine = engine();
        let mut conn = engine.connect().unwrap();
        let out = conn
            .query("SELECT 42::BIGINT AS b, 7::HUGEINT AS h, 3::INTEGER AS i")
            .unwrap();
        assert_eq!(out.columns, ["b", "h", "i"]);
        assert_eq!(
            out.rows[0],
            vec![Value::BigInt(42), Value::BigInt(7), Value::Number(3.0)]
        );
    }

    #[test]
    fn converts_dates_and_timestamps() {
        let mut engine = engine();
        let mut conn = engine.connect().unwrap();
        let out = conn
            .query("SELECT DATE '2023-01-02' AS d, TIMESTAMP '2023-01-02 03:04:05' AS ts")
            .unwrap();
        let d = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        assert_eq!(out.rows[0][0], Value::Date(d));
        assert_eq!(
            out.rows[0][1],
            Value::Timestamp(d.and_hms_opt(3, 4, 5).unwrap())
        );
    }

    #[test]
    fn registered_files_are_readable() {
        let mut engine = engine();
        let location = engine
            .register_file_text("t.csv", "a,b\n1,x\n2,y\n")
            .unwrap();
        let mut conn = engine.connect().unwrap();
        let out = conn
            .query(&format!("SELECT COUNT(*) AS n FROM read_csv_auto('{location}')"))
            .unwrap();
        assert_eq!(out.rows[0][0], Value::BigInt(2));

        engine.register_file_text("t.csv", "a,b\n1,x\n").unwrap();
        let out = conn
            .query(&format!("SELECT COUNT(*) AS n FROM read_csv_auto('{location}')"))
            .unwrap();
        assert_eq!(out.rows[0][0], Value::BigInt(1));
    }

    #[test]
    fn connections_share_one_database() {
        let mut engine = engine();
        let mut a = engine.connect().unwrap();
        let mut b = engine.connect().unwrap();
        a.execute("CREATE TABLE shared AS SELECT 5 AS v").unwrap();
        let out = b.query("SELECT v FROM shared").unwrap();
        assert_eq!(out.rows[0][0], Value::Number(5.0));
        a.close().unwrap();
        b.close().unwrap();
        engine.close().unwrap();
    }

    #[test]
    fn day_offsets_round_trip_to_calendar_dates() {
        assert_eq!(
            date_from_days(0),
            Value::Date(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap())
        );
        assert_eq!(
            date_from_days(-1),
            Value::Date(NaiveDate::from_ymd_opt(1969, 12, 31).unwrap())
        );
        assert_eq!(
            time_from_micros(3_723_000_001),
            Value::Time(NaiveTime::from_hms_micro_opt(1, 2, 3, 1).unwrap())
        );
    }

    #[test]
    fn arrays_and_maps_keep_their_structure() {
        let mut engine = engine();
        let mut conn = engine.connect().unwrap();
        let out = conn
            .query(
                "SELECT [1::BIGINT, 2::BIGINT]::BIGINT[2] AS arr, \
                 MAP {'k': 5::BIGINT} AS m",
            )
            .unwrap();
        assert_eq!(
            out.rows[0],
            vec![
                Value::List(vec![Value::BigInt(1), Value::BigInt(2)]),
                Value::Object(vec![("k".into(), Value::BigInt(5))]),
            ]
        );
    }
}
