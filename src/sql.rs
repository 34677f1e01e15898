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

//! Light SQL inspection used by front-ends and script execution.
//!
//! SQL text is never rewritten or validated here; the engine remains the
//! only authority on what a statement means.

use sqlparser::ast::Statement;
use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::Parser;

use crate::error::{Error, Result};

/// Whether a statement produces a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// SELECT-like statements, including `DESCRIBE`, `SHOW` and `EXPLAIN`.
    Query,
    /// DDL, DML and settings; answered with a command tag.
    Command,
}

/// Classify one SQL statement. Text the parser cannot handle is treated as a
/// query and left to the engine to judge.
pub fn classify(sql: &str) -> StatementKind {
    let parsed = Parser::parse_sql(&DuckDbDialect {}, sql);
    match parsed.as_deref() {
        Ok([stmt]) => classify_statement(stmt),
        _ => StatementKind::Query,
    }
}

fn classify_statement(stmt: &Statement) -> StatementKind {
    match stmt {
        Statement::Query(_)
        | Statement::Explain { .. }
        | Statement::ExplainTable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowVariable { .. } => StatementKind::Query,
        _ => StatementKind::Command,
    }
}

/// Upper-cased leading keyword, used as a command tag (`CREATE`, `DROP`, ...).
pub fn command_tag(sql: &str) -> String {
    sql.split_whitespace()
        .next()
        .map(|w| w.trim_end_matches(';').to_ascii_uppercase())
        .filter(|w| !w.is_empty())
        .unwrap_or_else(|| "OK".to_string())
}

/// Split a script into single statements, respecting quoted text.
///
/// Statements of a multi-statement script are re-rendered by the parser. A
/// single statement is returned as written, minus the trailing `;`.
pub fn split_statements(script: &str) -> Result<Vec<String>> {
    let stmts = Parser::parse_sql(&DuckDbDialect {}, script)
        .map_err(|e| Error::InvalidInput(format!("SQL parse error: {e}")))?;
    if stmts.len() == 1 {
        let text = script.trim().trim_end_matches(';').trim_end();
        return Ok(vec![text.to_string()]);
    }
    Ok(stmts.iter().map(ToString::to_string).collect())
}
