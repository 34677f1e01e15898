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

//! Encode result rows into pgwire `QueryResponse` messages.

use std::sync::Arc;

use futures::stream;
use pgwire::api::results::{DataRowEncoder, FieldFormat, FieldInfo, QueryResponse};
use pgwire::error::PgWireResult;

use super::types::{column_pg_type, format_cell};
use crate::value::RowSet;

/// Encode a result set for the text protocol. Column types are inferred
/// from the values, since rows carry no declared schema.
pub fn encode_row_set(rows: &RowSet) -> PgWireResult<QueryResponse> {
    let schema = Arc::new(
        rows.columns()
            .iter()
            .enumerate()
            .map(|(i, name)| {
                FieldInfo::new(
                    name.clone(),
                    None,
                    None,
                    column_pg_type(rows.rows(), i),
                    FieldFormat::Text,
                )
            })
            .collect::<Vec<_>>(),
    );

    let ncols = schema.len();
    let mut encoded = Vec::with_capacity(rows.len());
    let mut encoder = DataRowEncoder::new(schema.clone());
    for row in rows.rows() {
        for c in 0..ncols {
            let cell = row.values().get(c).and_then(format_cell);
            encoder.encode_field(&cell)?;
        }
        encoded.push(Ok(encoder.take_row()));
    }

    Ok(QueryResponse::new(schema, stream::iter(encoded)))
}
