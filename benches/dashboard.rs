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

//! Dashboard benchmark suite (criterion).
//!
//! Generates a year of daily rows per category in memory, so no external
//! data is needed. `DUCKDASH_BENCH_CATEGORIES` overrides the category count.

use std::fmt::Write;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use criterion::{criterion_group, criterion_main, Criterion, SamplingMode};
use futures::executor::block_on;

use duckdash::{normalize, Dashboard, DateRange, Session, SessionConfig, Value};

fn categories() -> usize {
    std::env::var("DUCKDASH_BENCH_CATEGORIES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(12)
}

fn synthetic_csv(days: u64, categories: usize) -> String {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    let mut csv = String::from("date,category,value\n");
    for d in 0..days {
        let date = start + Days::new(d);
        for c in 0..categories {
            let value = 100 + (d as usize * 37 + c * 53) % 900;
            let _ = writeln!(csv, "{},cat_{c:02},{value}", date.format("%Y-%m-%d"));
        }
    }
    csv
}

fn setup() -> Session {
    let session = Session::new(SessionConfig::default()).unwrap();
    block_on(session.initialize()).unwrap();
    session
}

fn bench_load(c: &mut Criterion) {
    let session = setup();
    let csv = synthetic_csv(365, categories());

    let mut group = c.benchmark_group("load");
    group.sample_size(10);
    group.sampling_mode(SamplingMode::Flat);
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(2));

    group.bench_function("load_dataset", |b| {
        b.iter(|| block_on(session.load_dataset(&csv)).unwrap())
    });
    group.finish();
    block_on(session.terminate());
}

fn bench_dashboard(c: &mut Criterion) {
    let session = setup();
    block_on(session.load_dataset(&synthetic_csv(365, categories()))).unwrap();
    let dashboard = Dashboard::new(session.clone());
    let march = DateRange::parse("2023-03-01", "2023-03-31").unwrap();

    let mut group = c.benchmark_group("dashboard");
    group.sample_size(20);
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(2));

    group.bench_function("snapshot_full", |b| {
        b.iter(|| block_on(dashboard.snapshot(None)).unwrap())
    });
    group.bench_function("snapshot_month", |b| {
        b.iter(|| block_on(dashboard.snapshot(Some(&march))).unwrap())
    });
    group.bench_function("category_totals", |b| {
        let sql = dashboard.queries().category_totals(None);
        b.iter(|| block_on(session.query(&sql)).unwrap())
    });
    group.finish();
    block_on(session.terminate());
}

fn bench_normalize(c: &mut Criterion) {
    let nested = Value::List(
        (0..1_000)
            .map(|i| {
                Value::Object(vec![
                    ("n".to_string(), Value::BigInt(i)),
                    ("d".to_string(), Value::Date(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap())),
                ])
            })
            .collect(),
    );
    c.bench_function("normalize_nested_1k", |b| {
        b.iter(|| normalize(nested.clone()))
    });
}

criterion_group!(benches, bench_load, bench_dashboard, bench_normalize);
criterion_main!(benches);
