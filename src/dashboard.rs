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

//! The dashboard's query set: time series, per-category totals and daily
//! totals over the loaded dataset, optionally limited to a date range.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::DatasetConfig;
use crate::dataset::{quote_ident, quote_literal};
use crate::error::{Error, Result};
use crate::session::Session;
use crate::value::{Row, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive date range. Only constructed from validated calendar dates, so
/// rendering it into SQL cannot inject anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidInput(format!(
                "date range start {start} is after end {end}"
            )));
        }
        Ok(DateRange { start, end })
    }

    /// Parse two `YYYY-MM-DD` dates.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    // chrono accepts unpadded fields; the dashboard only takes the strict form.
    let strict = s.len() == 10 && s.as_bytes()[4] == b'-' && s.as_bytes()[7] == b'-';
    match NaiveDate::parse_from_str(s, DATE_FORMAT) {
        Ok(d) if strict => Ok(d),
        _ => Err(Error::InvalidInput(format!(
            "invalid date {s:?}, expected YYYY-MM-DD"
        ))),
    }
}

/// SQL text for the dashboard queries against one dataset table.
#[derive(Debug, Clone)]
pub struct DashboardQueries {
    table: String,
    date: String,
    category: String,
    measure: String,
}

impl DashboardQueries {
    pub fn new(config: &DatasetConfig) -> Self {
        DashboardQueries {
            table: quote_ident(&config.table),
            date: quote_ident(&config.date_column),
            category: quote_ident(&config.category_column),
            measure: quote_ident(&config.measure_column),
        }
    }

    fn filter(&self, range: Option<&DateRange>) -> String {
        match range {
            None => String::new(),
            Some(r) => format!(
                " WHERE {date} >= DATE {start} AND {date} <= DATE {end}",
                date = self.date,
                start = quote_literal(&r.start.format(DATE_FORMAT).to_string()),
                end = quote_literal(&r.end.format(DATE_FORMAT).to_string()),
            ),
        }
    }

    /// Long-format rows: date, category, measure.
    pub fn time_series(&self, range: Option<&DateRange>) -> String {
        format!(
            "SELECT {date}, {category}, {measure} FROM {table}{filter} ORDER BY {date}, {category}",
            date = self.date,
            category = self.category,
            measure = self.measure,
            table = self.table,
            filter = self.filter(range),
        )
    }

    pub fn category_totals(&self, range: Option<&DateRange>) -> String {
        format!(
            "SELECT {category}, SUM({measure}) AS total_value FROM {table}{filter} \
             GROUP BY {category} ORDER BY {category}",
            category = self.category,
            measure = self.measure,
            table = self.table,
            filter = self.filter(range),
        )
    }

    pub fn daily_totals(&self, range: Option<&DateRange>) -> String {
        format!(
            "SELECT {date}, SUM({measure}) AS total FROM {table}{filter} \
             GROUP BY {date} ORDER BY {date}",
            date = self.date,
            measure = self.measure,
            table = self.table,
            filter = self.filter(range),
        )
    }
}

/// Reshape long `(date, category, measure)` rows into one row per date with
/// a column per category. Columns are positional: the first three of each
/// input row. Categories appear in first-seen order; missing cells are null.
pub fn pivot_time_series(rows: &[Row]) -> Vec<Row> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let date_column = first
        .columns()
        .first()
        .cloned()
        .unwrap_or_else(|| "date".to_string());

    let mut categories: Vec<String> = Vec::new();
    let mut category_index: HashMap<String, usize> = HashMap::new();
    let mut dates: Vec<(Value, HashMap<usize, Value>)> = Vec::new();
    let mut date_index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let values = row.values();
        let (Some(date), Some(category)) = (values.first(), values.get(1)) else {
            continue;
        };
        let measure = values.get(2).cloned().unwrap_or(Value::Null);

        let category = category.to_string();
        let c = *category_index.entry(category.clone()).or_insert_with(|| {
            categories.push(category);
            categories.len() - 1
        });
        let d = *date_index.entry(date.to_string()).or_insert_with(|| {
            dates.push((date.clone(), HashMap::new()));
            dates.len() - 1
        });
        dates[d].1.insert(c, measure);
    }

    let columns: Arc<[String]> = std::iter::once(date_column)
        .chain(categories.iter().cloned())
        .collect::<Vec<_>>()
        .into();
    dates
        .into_iter()
        .map(|(date, mut cells)| {
            let values = std::iter::once(date)
                .chain((0..categories.len()).map(|c| cells.remove(&c).unwrap_or(Value::Null)))
                .collect();
            Row::new(columns.clone(), values)
        })
        .collect()
}

/// Everything one dashboard render needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Wide rows, see [`pivot_time_series`].
    pub time_series: Vec<Row>,
    pub category_totals: Vec<Row>,
    pub daily_totals: Vec<Row>,
}

/// Runs the dashboard queries over a session.
#[derive(Debug, Clone)]
pub struct Dashboard {
    session: Session,
    queries: DashboardQueries,
}

impl Dashboard {
    pub fn new(session: Session) -> Self {
        let queries = DashboardQueries::new(&session.config().dataset);
        Dashboard { session, queries }
    }

    pub fn queries(&self) -> &DashboardQueries {
        &self.queries
    }

    /// Run the three queries in order.
    pub async fn snapshot(&self, range: Option<&DateRange>) -> Result<Snapshot> {
        let long = self.session.query(&self.queries.time_series(range)).await?;
        let category_totals = self
            .session
            .query(&self.queries.category_totals(range))
            .await?;
        let daily_totals = self.session.query(&self.queries.daily_totals(range)).await?;
        Ok(Snapshot {
            time_series: pivot_time_series(&long),
            category_totals,
            daily_totals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_strict_iso_dates() {
        let r = DateRange::parse("2023-01-01", "2023-01-31").unwrap();
        assert_eq!(r.start(), day(2023, 1, 1));
        assert!(r.contains(day(2023, 1, 15)));
        assert!(!r.contains(day(2023, 2, 1)));
        assert!(DateRange::parse("2023-01-01", "2023-01-01").is_ok());
    }

    #[test]
    fn rejects_bad_ranges() {
        for (s, e) in [
            ("2023-1-1", "2023-01-31"),
            ("2023-01-01", "2023-02-30"),
            ("2023-01-01' OR 1=1 --", "2023-01-31"),
            ("", "2023-01-31"),
        ] {
            assert!(
                matches!(DateRange::parse(s, e), Err(Error::InvalidInput(_))),
                "{s} .. {e}"
            );
        }
        assert!(matches!(
            DateRange::parse("2023-02-01", "2023-01-01"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn query_text() {
        let q = DashboardQueries::new(&DatasetConfig::default());
        assert_eq!(
            q.time_series(None),
            "SELECT \"date\", \"category\", \"value\" FROM \"sales_data\" ORDER BY \"date\", \"category\""
        );
        assert_eq!(
            q.category_totals(None),
            "SELECT \"category\", SUM(\"value\") AS total_value FROM \"sales_data\" \
             GROUP BY \"category\" ORDER BY \"category\""
        );
        let r = DateRange::parse("2023-01-01", "2023-01-02").unwrap();
        assert_eq!(
            q.daily_totals(Some(&r)),
            "SELECT \"date\", SUM(\"value\") AS total FROM \"sales_data\" \
             WHERE \"date\" >= DATE '2023-01-01' AND \"date\" <= DATE '2023-01-02' \
             GROUP BY \"date\" ORDER BY \"date\""
        );
    }

    #[test]
    fn pivots_long_rows_by_date() {
        let long = |d: NaiveDate, c: &str, v: f64| {
            Row::from_pairs([
                ("date", Value::Date(d)),
                ("category", Value::Text(c.into())),
                ("value", Value::Number(v)),
            ])
        };
        let rows = [
            long(day(2023, 1, 1), "Books", 10.0),
            long(day(2023, 1, 1), "Toys", 5.0),
            long(day(2023, 1, 2), "Toys", 7.0),
        ];
        let wide = pivot_time_series(&rows);
        assert_eq!(wide.len(), 2);
        assert_eq!(wide[0].columns(), ["date", "Books", "Toys"]);
        assert_eq!(wide[0].get("Books"), Some(&Value::Number(10.0)));
        assert_eq!(wide[1].get("date"), Some(&Value::Date(day(2023, 1, 2))));
        assert_eq!(wide[1].get("Books"), Some(&Value::Null));
        assert_eq!(wide[1].get("Toys"), Some(&Value::Number(7.0)));
        assert!(pivot_time_series(&[]).is_empty());
    }
}
