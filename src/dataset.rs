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

//! The dashboard dataset: one CSV blob loaded into one fixed table.

use serde::Serialize;

use crate::config::DatasetConfig;
use crate::value::{Row, Value};

/// Description of the table produced by the last load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub table: String,
    pub row_count: u64,
    pub columns: Vec<Column>,
}

/// Column name and declared type as detected by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
}

/// Double-quote an identifier.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Single-quote a string literal.
pub(crate) fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

pub(crate) fn drop_table_sql(config: &DatasetConfig) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(&config.table))
}

/// `CREATE TABLE` from a registered CSV, auto-detecting the schema and
/// coercing the measure column to INTEGER.
pub(crate) fn create_table_sql(config: &DatasetConfig, location: &str) -> String {
    let measure = quote_ident(&config.measure_column);
    format!(
        "CREATE TABLE {table} AS SELECT * REPLACE (CAST({measure} AS INTEGER) AS {measure}) \
         FROM read_csv_auto({location}, header = true)",
        table = quote_ident(&config.table),
        location = quote_literal(location),
    )
}

pub(crate) fn count_sql(config: &DatasetConfig) -> String {
    format!("SELECT COUNT(*) AS count FROM {}", quote_ident(&config.table))
}

pub(crate) fn describe_sql(config: &DatasetConfig) -> String {
    format!("DESCRIBE {}", quote_ident(&config.table))
}

/// Extract the row count from the single-row result of [`count_sql`].
pub(crate) fn row_count(rows: &[Row]) -> Option<u64> {
    let n = rows.first()?.get("count")?.as_f64()?;
    (n >= 0.0 && n.fract() == 0.0).then_some(n as u64)
}

/// Extract column descriptions from the result of [`describe_sql`].
pub(crate) fn columns(rows: &[Row]) -> Vec<Column> {
    rows.iter()
        .filter_map(|row| {
            let name = row.get("column_name").and_then(Value::as_str)?;
            let data_type = row.get("column_type").and_then(Value::as_str)?;
            Some(Column {
                name: name.to_owned(),
                data_type: data_type.to_owned(),
            })
        })
        .collect()
}
