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

mod highlighter;
mod prompt;
mod theme;
mod validator;

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;
use reedline::{
    default_emacs_keybindings, DefaultCompleter, DescriptionMode, Emacs, FileBackedHistory,
    IdeMenu, KeyCode, KeyModifiers, MenuBuilder, Reedline, ReedlineEvent, ReedlineMenu, Signal,
};
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

use duckdash::sql::{self, StatementKind};
use duckdash::{Dashboard, DateRange, RowSet, Session, SessionConfig, Value};

use highlighter::SqlHighlighter;
use prompt::SqlPrompt;
use validator::SqlValidator;

#[derive(Parser)]
#[command(name = "duckdash", version, about = "Dashboard SQL shell over an embedded DuckDB")]
struct Args {
    /// CSV file to load as the dashboard dataset
    input: Option<PathBuf>,
    /// Execute SQL from file and exit
    #[arg(short, long)]
    file: Option<PathBuf>,
    /// Execute SQL init script before entering the REPL
    #[arg(short, long)]
    init: Option<PathBuf>,
    /// Session configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Show query execution time
    #[arg(short, long)]
    timer: bool,
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy)]
enum OutputFormat {
    Table,
    Csv,
    Json,
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap_or_else(|e| fail(format!("failed to start runtime: {e}")));
    let config = match &args.config {
        Some(path) => SessionConfig::from_file(path).unwrap_or_else(|e| fail(e)),
        None => SessionConfig::default(),
    };
    let session = Session::new(config).unwrap_or_else(|e| fail(e));

    let mut shell = Shell {
        rt,
        session,
        format: OutputFormat::Table,
        timer: args.timer,
    };
    shell.start_engine();

    // The init script may reference the dataset table.
    if let Some(csv) = &args.input {
        if !shell.load(csv) {
            shell.shutdown();
            std::process::exit(1);
        }
    }
    if let Some(init) = &args.init {
        if !shell.run_file(init) {
            fail(format!("in init script {}", init.display()));
        }
    }

    if let Some(file) = &args.file {
        let ok = shell.run_file(file);
        shell.shutdown();
        std::process::exit(if ok { 0 } else { 1 });
    }

    shell.repl();
    shell.shutdown();
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "duckdash=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("{}Error: {msg}{}", theme::ERROR, theme::R);
    std::process::exit(1);
}

// ---------------------------------------------------------------------------
// Shell
// ---------------------------------------------------------------------------

struct Shell {
    rt: Runtime,
    session: Session,
    format: OutputFormat,
    timer: bool,
}

impl Shell {
    fn start_engine(&self) {
        let started = self.rt.block_on(self.session.initialize_with_progress(|p| {
            eprint!("\r{}Starting engine... {p:>3}%{}", theme::PROGRESS, theme::R);
            let _ = std::io::stderr().flush();
        }));
        eprintln!();
        if let Err(e) = started {
            fail(e);
        }
    }

    fn shutdown(&self) {
        self.rt.block_on(self.session.terminate());
    }

    fn load(&self, path: &Path) -> bool {
        match self.rt.block_on(self.session.load_dataset_file(path)) {
            Ok(ds) => {
                println!(
                    "{}Loaded {} rows into {} ({} columns){}",
                    theme::SUCCESS,
                    ds.row_count,
                    ds.table,
                    ds.columns.len(),
                    theme::R
                );
                true
            }
            Err(e) => {
                eprintln!("{}Error: {e}{}", theme::ERROR, theme::R);
                false
            }
        }
    }

    /// Run every statement of a script file, stopping at the first error.
    fn run_file(&self, path: &Path) -> bool {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{}Error reading {}: {e}{}", theme::ERROR, path.display(), theme::R);
                return false;
            }
        };
        let stmts = match sql::split_statements(&contents) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("{}Error in {}: {e}{}", theme::ERROR, path.display(), theme::R);
                return false;
            }
        };
        stmts.iter().all(|stmt| self.run_statement(stmt))
    }

    fn run_statement(&self, stmt: &str) -> bool {
        let start = Instant::now();
        let result = match sql::classify(stmt) {
            StatementKind::Query => self
                .rt
                .block_on(self.session.query_set(stmt))
                .map(|rows| print_result(&rows, self.format)),
            StatementKind::Command => self
                .rt
                .block_on(self.session.execute(stmt))
                .map(|()| println!("{}{}{}", theme::SUCCESS, sql::command_tag(stmt), theme::R)),
        };
        match result {
            Ok(()) => {
                if self.timer {
                    eprintln!(
                        "{}Run Time: {:.3}s{}",
                        theme::TIMER,
                        start.elapsed().as_secs_f64(),
                        theme::R
                    );
                }
                true
            }
            Err(e) => {
                eprintln!("{}Error: {e}{}", theme::ERROR, theme::R);
                false
            }
        }
    }

    fn completions(&self) -> Vec<String> {
        let mut words: Vec<String> = [
            "SELECT", "FROM", "WHERE", "GROUP BY", "ORDER BY", "SUM", "COUNT", "DESCRIBE",
            ".load", ".dashboard", ".schema", ".status", ".mode", ".timer", ".help", ".quit",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        if let Some(ds) = self.session.dataset() {
            words.push(ds.table);
            words.extend(ds.columns.into_iter().map(|c| c.name));
        }
        words
    }

    fn repl(&mut self) {
        print_banner();

        let mut completer = DefaultCompleter::with_inclusions(&['_', '.']).set_min_word_len(2);
        completer.insert(self.completions());

        let hinter = reedline::DefaultHinter::default()
            .with_style(nu_ansi_term::Style::new().fg(nu_ansi_term::Color::DarkGray));

        let ide_menu = IdeMenu::default()
            .with_name("completion_menu")
            .with_min_completion_width(20)
            .with_max_completion_width(60)
            .with_max_completion_height(10)
            .with_padding(1)
            .with_description_mode(DescriptionMode::PreferRight)
            .with_default_border();

        let mut keybindings = default_emacs_keybindings();
        keybindings.add_binding(
            KeyModifiers::NONE,
            KeyCode::Tab,
            ReedlineEvent::UntilFound(vec![
                ReedlineEvent::Menu("completion_menu".to_string()),
                ReedlineEvent::MenuNext,
            ]),
        );
        keybindings.add_binding(
            KeyModifiers::SHIFT,
            KeyCode::BackTab,
            ReedlineEvent::MenuPrevious,
        );

        let history_path = home_dir().join(".duckdash_history");
        let editor = Reedline::create()
            .with_completer(Box::new(completer))
            .with_highlighter(Box::new(SqlHighlighter))
            .with_validator(Box::new(SqlValidator))
            .with_hinter(Box::new(hinter))
            .with_menu(ReedlineMenu::EngineCompleter(Box::new(ide_menu)))
            .with_edit_mode(Box::new(Emacs::new(keybindings)));
        let mut editor = match FileBackedHistory::with_file(1000, history_path.clone()) {
            Ok(history) => editor.with_history(Box::new(history)),
            Err(e) => {
                eprintln!(
                    "{}Warning: history disabled ({}): {e}{}",
                    theme::ERROR,
                    history_path.display(),
                    theme::R
                );
                editor
            }
        };

        loop {
            let prompt = SqlPrompt {
                table: self.session.dataset().map(|ds| ds.table),
            };
            match editor.read_line(&prompt) {
                Ok(Signal::Success(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if trimmed.starts_with('.') {
                        if self.dot_command(trimmed) == Flow::Quit {
                            break;
                        }
                        continue;
                    }
                    // The validator guarantees a trailing ';'.
                    match sql::split_statements(trimmed) {
                        Ok(stmts) => {
                            for stmt in &stmts {
                                if !self.run_statement(stmt) {
                                    break;
                                }
                            }
                        }
                        // Let the engine report what the parser could not handle.
                        Err(_) => {
                            self.run_statement(trimmed.trim_end_matches(';'));
                        }
                    }
                }
                Ok(Signal::CtrlD) => break,
                Ok(Signal::CtrlC) => continue,
                Err(e) => {
                    eprintln!("Error: {e}");
                    break;
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Dot commands
    // -----------------------------------------------------------------------

    fn dot_command(&mut self, cmd: &str) -> Flow {
        use theme::*;

        let parts: Vec<&str> = cmd.split_whitespace().collect();
        match parts.as_slice() {
            [".load", path] => {
                self.load(Path::new(path));
            }
            [".load", ..] => println!("{FOOTER}Usage: .load PATH{R}"),
            [".dashboard"] => self.dashboard(None),
            [".dashboard", start, end] => match DateRange::parse(start, end) {
                Ok(range) => self.dashboard(Some(range)),
                Err(e) => eprintln!("{ERROR}Error: {e}{R}"),
            },
            [".dashboard", ..] => println!("{FOOTER}Usage: .dashboard [START END]{R}"),
            [".schema"] => match self.session.dataset() {
                Some(ds) => {
                    println!("{HEADER}{}{R} {FOOTER}({} rows){R}", ds.table, ds.row_count);
                    for col in ds.columns {
                        println!("  {TEXT}{:20}{R} {TYPE_DIM}{}{R}", col.name, col.data_type);
                    }
                }
                None => println!("{FOOTER}No dataset loaded.{R}"),
            },
            [".status"] => {
                println!("  {CMD}engine{R}   {TEXT}{}{R}", self.session.state());
                match self.session.dataset() {
                    Some(ds) => println!("  {CMD}dataset{R}  {TEXT}{} ({} rows){R}", ds.table, ds.row_count),
                    None => println!("  {CMD}dataset{R}  {FOOTER}none{R}"),
                }
                if let Some(e) = self.session.last_error() {
                    println!("  {CMD}error{R}    {ERROR}{e}{R}");
                }
            }
            [".mode", "table"] => self.set_format(OutputFormat::Table, "table"),
            [".mode", "csv"] => self.set_format(OutputFormat::Csv, "csv"),
            [".mode", "json"] => self.set_format(OutputFormat::Json, "json"),
            [".mode", ..] => println!("{FOOTER}Usage: .mode table|csv|json{R}"),
            [".timer", "on"] => {
                self.timer = true;
                println!("{SUCCESS}Timer: on{R}");
            }
            [".timer", "off"] => {
                self.timer = false;
                println!("{SUCCESS}Timer: off{R}");
            }
            [".timer", ..] => println!("{FOOTER}Usage: .timer on|off{R}"),
            [".help"] => print_help(),
            [".quit"] | [".exit"] => return Flow::Quit,
            _ => println!("{ERROR}Unknown command: {}. Type .help for commands.{R}", parts[0]),
        }
        Flow::Continue
    }

    fn set_format(&mut self, format: OutputFormat, name: &str) {
        self.format = format;
        println!("{}Output mode: {name}{}", theme::SUCCESS, theme::R);
    }

    fn dashboard(&self, range: Option<DateRange>) {
        let dashboard = Dashboard::new(self.session.clone());
        let snapshot = match self.rt.block_on(dashboard.snapshot(range.as_ref())) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("{}Error: {e}{}", theme::ERROR, theme::R);
                return;
            }
        };
        if let OutputFormat::Json = self.format {
            match serde_json::to_string_pretty(&snapshot) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("{}Error: {e}{}", theme::ERROR, theme::R),
            }
            return;
        }
        for (title, rows) in [
            ("Time series", snapshot.time_series),
            ("Category totals", snapshot.category_totals),
            ("Daily totals", snapshot.daily_totals),
        ] {
            println!("{}{}{title}{}", theme::BOLD, theme::HEADER, theme::R);
            print_result(&RowSet::from_rows(rows), self.format);
        }
    }
}

#[derive(PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

// ---------------------------------------------------------------------------
// Output formatting
// ---------------------------------------------------------------------------

fn print_result(rows: &RowSet, format: OutputFormat) {
    match format {
        OutputFormat::Table => print_table(rows),
        OutputFormat::Csv => print_csv(rows),
        OutputFormat::Json => print_json(rows),
    }
}

const HEAD_ROWS: usize = 20;
const TAIL_ROWS: usize = 20;

/// Type label for a column, taken from its first non-null value.
fn column_type(rows: &RowSet, col: usize) -> &'static str {
    let first = rows
        .rows()
        .iter()
        .filter_map(|r| r.values().get(col))
        .find(|v| !v.is_null());
    match first {
        None => "null",
        Some(Value::Bool(_)) => "bool",
        Some(Value::Number(_)) | Some(Value::BigInt(_)) => "number",
        Some(Value::Text(_)) => "text",
        Some(Value::Date(_)) => "date",
        Some(Value::Time(_)) => "time",
        Some(Value::Timestamp(_)) => "timestamp",
        Some(Value::Interval { .. }) => "interval",
        Some(Value::Blob(_)) => "blob",
        Some(Value::List(_)) => "list",
        Some(Value::Object(_)) => "struct",
        Some(Value::Null) => "null",
    }
}

fn print_table(rows: &RowSet) {
    use std::fmt::Write;
    use theme::*;

    let ncols = rows.columns().len();
    if ncols == 0 {
        println!("{FOOTER}(empty result){R}");
        return;
    }
    let nrows = rows.len();
    let names = rows.columns();
    let types: Vec<&str> = (0..ncols).map(|c| column_type(rows, c)).collect();
    let is_right: Vec<bool> = types.iter().map(|t| *t == "number").collect();

    let show_dots = nrows > HEAD_ROWS + TAIL_ROWS;
    let shown: Vec<usize> = if show_dots {
        (0..HEAD_ROWS).chain(nrows - TAIL_ROWS..nrows).collect()
    } else {
        (0..nrows).collect()
    };

    // (text, is_null) per shown cell; `None` marks the elision row.
    let mut cells: Vec<Option<Vec<(String, bool)>>> = Vec::with_capacity(shown.len() + 1);
    for (i, &r) in shown.iter().enumerate() {
        if show_dots && i == HEAD_ROWS {
            cells.push(None);
        }
        let values = rows.rows()[r].values();
        cells.push(Some(
            values
                .iter()
                .map(|v| (v.to_string(), v.is_null()))
                .collect(),
        ));
    }

    let footer_left = if show_dots {
        format!("{nrows} rows ({} shown)", shown.len())
    } else {
        format!("{nrows} rows")
    };
    let footer_right = format!("{ncols} columns");
    let footer_min = footer_left.len() + footer_right.len() + 3;

    let mut w: Vec<usize> = (0..ncols)
        .map(|c| {
            cells
                .iter()
                .flatten()
                .map(|row| row[c].0.chars().count())
                .fold(names[c].chars().count().max(types[c].len()), usize::max)
        })
        .collect();
    let mut inner_width: usize = w.iter().map(|x| x + 2).sum::<usize>() + ncols - 1;
    if inner_width < footer_min {
        let extra = footer_min - inner_width;
        w[ncols - 1] += extra;
        inner_width += extra;
    }

    let mut out = String::with_capacity(4096);
    let hline = |out: &mut String, left: char, mid: char, right: char| {
        out.push_str(BORDER);
        out.push(left);
        for (c, width) in w.iter().enumerate() {
            if c > 0 {
                out.push(mid);
            }
            out.push_str(&"\u{2500}".repeat(width + 2));
        }
        out.push(right);
        out.push_str(R);
        out.push('\n');
    };
    let bar = format!("{BORDER}\u{2502}{R}");

    hline(&mut out, '\u{250c}', '\u{252c}', '\u{2510}');
    for c in 0..ncols {
        let _ = write!(out, "{bar} {BOLD}{HEADER}{:^width$}{R} ", names[c], width = w[c]);
    }
    let _ = writeln!(out, "{bar}");
    for c in 0..ncols {
        let _ = write!(out, "{bar} {TYPE_DIM}{:^width$}{R} ", types[c], width = w[c]);
    }
    let _ = writeln!(out, "{bar}");
    hline(&mut out, '\u{251c}', '\u{253c}', '\u{2524}');

    for row in &cells {
        for c in 0..ncols {
            let width = w[c];
            let _ = match row {
                None => write!(out, "{bar} {FOOTER}{:^width$}{R} ", "\u{00b7}\u{00b7}\u{00b7}"),
                Some(row) => {
                    let (text, null) = &row[c];
                    if *null {
                        write!(out, "{bar} {ITALIC}{NULL_CLR}{text:>width$}{R} ")
                    } else if is_right[c] {
                        write!(out, "{bar} {TEXT}{text:>width$}{R} ")
                    } else {
                        write!(out, "{bar} {TEXT}{text:<width$}{R} ")
                    }
                }
            };
        }
        let _ = writeln!(out, "{bar}");
    }

    hline(&mut out, '\u{251c}', '\u{2534}', '\u{2524}');
    let pad = inner_width - footer_left.len() - footer_right.len() - 2;
    let _ = writeln!(
        out,
        "{bar} {FOOTER}{footer_left}{:pad$}{footer_right}{R} {bar}",
        ""
    );
    let _ = writeln!(
        out,
        "{BORDER}\u{2514}{}\u{2518}{R}",
        "\u{2500}".repeat(inner_width)
    );

    // Single write to stdout: no per-line flush.
    let _ = std::io::stdout().lock().write_all(out.as_bytes());
}

fn csv_field(value: &Value) -> String {
    if value.is_null() {
        return String::new();
    }
    let s = value.to_string();
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s
    }
}

fn print_csv(rows: &RowSet) {
    println!("{}", rows.columns().join(","));
    for row in rows.rows() {
        let cells: Vec<String> = row.values().iter().map(csv_field).collect();
        println!("{}", cells.join(","));
    }
}

fn print_json(rows: &RowSet) {
    match serde_json::to_string_pretty(rows.rows()) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("{}Error: {e}{}", theme::ERROR, theme::R),
    }
}

// ---------------------------------------------------------------------------
// Banner & help
// ---------------------------------------------------------------------------

fn print_banner() {
    use theme::*;

    let ver = env!("CARGO_PKG_VERSION");
    let hash = env!("GIT_HASH");
    let tag = format!("v{ver}  \u{b7}  {hash}  \u{b7}  duckdb");
    let help = "type .help for commands";
    let title = "duckdash";
    let tag_w = tag.chars().count();
    let help_w = help.chars().count();
    let w = tag_w.max(help_w);
    let fill = w.saturating_sub(title.len() + 2);
    println!(
        "{BAN_BORDER}\u{256d}\u{2500} {BOLD}{BAN_TITLE}{title}{R}{BAN_BORDER} \u{2500}{}\u{256e}{R}",
        "\u{2500}".repeat(fill)
    );
    println!(
        "{BAN_BORDER}\u{2502}{R} {BAN_INFO}{tag}{}{R} {BAN_BORDER}\u{2502}{R}",
        " ".repeat(w - tag_w)
    );
    println!(
        "{BAN_BORDER}\u{2502}{R} {BAN_HELP}{help}{}{R} {BAN_BORDER}\u{2502}{R}",
        " ".repeat(w - help_w)
    );
    println!("{BAN_BORDER}\u{2570}{}\u{256f}{R}", "\u{2500}".repeat(w + 2));
    println!();
}

fn print_help() {
    use theme::*;

    println!("{BOLD}{HEADER}Commands:{R}");
    println!("  {CMD}.load PATH{R}             {DESC}Load a CSV file as the dataset{R}");
    println!("  {CMD}.dashboard [START END]{R} {DESC}Run the dashboard queries (dates YYYY-MM-DD){R}");
    println!("  {CMD}.schema{R}                {DESC}Show the dataset columns{R}");
    println!("  {CMD}.status{R}                {DESC}Show engine and dataset state{R}");
    println!("  {CMD}.mode table|csv|json{R}   {DESC}Set output format{R}");
    println!("  {CMD}.timer on|off{R}          {DESC}Show query execution time{R}");
    println!("  {CMD}.help{R}                  {DESC}Show this help{R}");
    println!("  {CMD}.quit{R}                  {DESC}Exit{R}");
    println!();
    println!("{BOLD}{HEADER}SQL:{R}");
    println!("  {TEXT}SELECT category, SUM(value) AS total FROM sales_data GROUP BY category;{R}");
    println!("  {TEXT}SELECT * FROM sales_data WHERE date >= '2023-01-01' ORDER BY date;{R}");
    println!("  {TEXT}DESCRIBE sales_data;{R}");
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
