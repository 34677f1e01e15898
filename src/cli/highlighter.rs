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

use nu_ansi_term::{Color, Style};
use reedline::{Highlighter, StyledText};
use sqlparser::keywords::ALL_KEYWORDS;

const FUNCTIONS: &[&str] = &[
    "AVG",
    "CAST",
    "COUNT",
    "DATE_TRUNC",
    "MAX",
    "MIN",
    "READ_CSV_AUTO",
    "STRFTIME",
    "SUM",
];

fn keyword_style() -> Style {
    Style::new().bold().fg(Color::Blue)
}
fn function_style() -> Style {
    Style::new().bold().fg(Color::Cyan)
}
fn string_style() -> Style {
    Style::new().fg(Color::Yellow)
}
fn ident_style() -> Style {
    Style::new().fg(Color::Green)
}
fn number_style() -> Style {
    Style::new().fg(Color::Magenta)
}
fn dot_cmd_style() -> Style {
    Style::new().fg(Color::Cyan)
}

/// End of a quoted run starting at `start`, past the closing quote when
/// there is one.
fn quoted_end(bytes: &[u8], start: usize) -> usize {
    let q = bytes[start];
    bytes[start + 1..]
        .iter()
        .position(|&b| b == q)
        .map_or(bytes.len(), |p| start + p + 2)
}

fn run_end(bytes: &[u8], start: usize, keep: impl Fn(u8) -> bool) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| !keep(b))
        .map_or(bytes.len(), |p| start + p)
}

fn word_style(word: &str) -> Style {
    let upper = word.to_ascii_uppercase();
    if FUNCTIONS.contains(&upper.as_str()) {
        function_style()
    } else if ALL_KEYWORDS.binary_search(&upper.as_str()).is_ok() {
        keyword_style()
    } else {
        Style::default()
    }
}

/// SQL syntax coloring. Keywords come from the SQL parser's keyword table.
pub struct SqlHighlighter;

impl Highlighter for SqlHighlighter {
    fn highlight(&self, line: &str, _cursor: usize) -> StyledText {
        let mut styled = StyledText::new();
        if line.starts_with('.') {
            styled.push((dot_cmd_style(), line.to_string()));
            return styled;
        }

        let bytes = line.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            let (end, style) = if b == b'\'' {
                (quoted_end(bytes, i), string_style())
            } else if b == b'"' {
                (quoted_end(bytes, i), ident_style())
            } else if b == b'-' && bytes.get(i + 1) == Some(&b'-') {
                (bytes.len(), Style::new().fg(Color::DarkGray))
            } else if b.is_ascii_digit() {
                let end = run_end(bytes, i, |c| c.is_ascii_digit() || c == b'.');
                let glued = bytes
                    .get(end)
                    .is_some_and(|c| c.is_ascii_alphabetic() || *c == b'_');
                (end, if glued { Style::default() } else { number_style() })
            } else if b.is_ascii_alphabetic() || b == b'_' {
                let end = run_end(bytes, i, |c| c.is_ascii_alphanumeric() || c == b'_');
                (end, word_style(&line[i..end]))
            } else {
                // Multi-byte characters pass through whole.
                let width = line[i..].chars().next().map_or(1, char::len_utf8);
                (i + width, Style::default())
            };
            styled.push((style, line[i..end].to_string()));
            i = end;
        }
        styled
    }
}
