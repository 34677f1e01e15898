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

//! Mapping from result values to PostgreSQL wire types, plus text-protocol
//! cell formatting.

use pgwire::api::Type;

use crate::value::{Row, Value};

/// PostgreSQL type for column `col`, inferred from its values. Numbers map
/// to INT8 when every value in the column is integral, FLOAT8 otherwise.
/// Columns with no non-null value are VARCHAR.
pub fn column_pg_type(rows: &[Row], col: usize) -> Type {
    let mut cells = rows
        .iter()
        .filter_map(|r| r.values().get(col))
        .filter(|v| !v.is_null());
    let Some(first) = cells.next() else {
        return Type::VARCHAR;
    };
    match first {
        Value::Bool(_) => Type::BOOL,
        Value::Number(_) | Value::BigInt(_) => {
            let integral = std::iter::once(first).chain(cells).all(|v| match v {
                Value::Number(n) => n.is_finite() && n.fract() == 0.0,
                Value::BigInt(_) => true,
                _ => false,
            });
            if integral {
                Type::INT8
            } else {
                Type::FLOAT8
            }
        }
        Value::Date(_) => Type::DATE,
        Value::Time(_) => Type::TIME,
        Value::Timestamp(_) => Type::TIMESTAMP,
        Value::Blob(_) => Type::BYTEA,
        _ => Type::VARCHAR,
    }
}

/// Format a single cell as a text-protocol string. Returns `None` for NULL.
pub fn format_cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(if *b { "t" } else { "f" }.to_string()),
        Value::Number(n) if n.is_finite() && n.fract() != 0.0 => {
            // Enough precision to round-trip, trailing zeros trimmed.
            let s = format!("{n:.15}");
            let s = s.trim_end_matches('0');
            if s.ends_with('.') {
                Some(format!("{s}0"))
            } else {
                Some(s.to_string())
            }
        }
        other => Some(other.to_string()),
    }
}
