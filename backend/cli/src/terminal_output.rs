//! Operator-facing output: colored notes, the prompt, and simple tables.
//!
//! A `Console` is created once in `main` and handed to whatever talks to the
//! operator. Whether color is used is decided there, not read from globals
//! at every call.

use std::io::Write;

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";

pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const BLUE: &str = "\x1b[34m";
pub const CYAN: &str = "\x1b[36m";

/// Check if the terminal supports color output.
pub fn supports_color() -> bool {
    std::env::var("NO_COLOR").is_err()
        && (std::env::var("COLORTERM").is_ok()
            || std::env::var("TERM")
                .map(|t| t != "dumb")
                .unwrap_or(false))
}

/// Strip ANSI escape codes from a string.
pub fn strip_ansi(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[derive(Debug, Clone, Copy)]
pub struct Console {
    color: bool,
}

impl Console {
    pub fn detect() -> Self {
        Self { color: supports_color() }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    pub fn info(&self, msg: &str) {
        println!("{}", self.info_line(msg));
    }

    pub fn warn(&self, msg: &str) {
        println!("{}", self.warn_line(msg));
    }

    pub fn error(&self, msg: &str) {
        eprintln!("{}", self.error_line(msg));
    }

    pub fn success(&self, msg: &str) {
        println!("{}", self.success_line(msg));
    }

    pub fn line(&self, msg: &str) {
        println!("{msg}");
    }

    /// Print without a newline and flush, for prompts.
    pub fn prompt(&self, prompt: &str) {
        let mut out = std::io::stdout();
        let text = if self.color {
            format!("{BLUE}{prompt}{RESET}")
        } else {
            prompt.to_string()
        };
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    pub fn info_line(&self, msg: &str) -> String {
        self.styled(CYAN, "ℹ", "INFO:", msg)
    }

    pub fn warn_line(&self, msg: &str) -> String {
        self.styled(YELLOW, "⚠", "WARN:", msg)
    }

    pub fn error_line(&self, msg: &str) -> String {
        self.styled(RED, "✗", "ERROR:", msg)
    }

    pub fn success_line(&self, msg: &str) -> String {
        self.styled(GREEN, "✓", "OK:", msg)
    }

    fn styled(&self, color: &str, icon: &str, label: &str, msg: &str) -> String {
        if self.color {
            format!("{color}{BOLD}{icon}{RESET} {msg}")
        } else {
            format!("{label} {msg}")
        }
    }
}

/// Column alignment.
pub enum Align {
    Left,
    Right,
}

/// A table column definition.
pub struct Column {
    pub header: String,
    pub align: Align,
    pub max_width: Option<usize>,
}

impl Column {
    pub fn left(header: impl Into<String>) -> Self {
        Self { header: header.into(), align: Align::Left, max_width: None }
    }

    pub fn right(header: impl Into<String>) -> Self {
        Self { header: header.into(), align: Align::Right, max_width: None }
    }

    pub fn max_width(mut self, width: usize) -> Self {
        self.max_width = Some(width);
        self
    }
}

/// Render a table with given columns and rows. Cells wider than a column's
/// `max_width` are cut with an ellipsis.
pub fn render_table(columns: &[Column], rows: &[Vec<String>]) -> String {
    let num_cols = columns.len();
    let mut widths: Vec<usize> = columns.iter().map(|c| visible_len(&c.header)).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(num_cols) {
            let w = visible_len(cell);
            let w = columns[i].max_width.map_or(w, |max| w.min(max));
            widths[i] = widths[i].max(w);
        }
    }

    let mut out = String::new();

    let header_cells: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, col)| pad_cell(&col.header, widths[i], &col.align))
        .collect();
    out.push_str(&format!("  {}\n", header_cells.join("  ").trim_end()));

    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&format!("  {}\n", sep.join("  ")));

    for row in rows {
        let cells: Vec<String> = (0..num_cols)
            .map(|i| {
                let cell = row.get(i).map(String::as_str).unwrap_or("");
                pad_cell(&truncate(cell, widths[i]), widths[i], &columns[i].align)
            })
            .collect();
        out.push_str(&format!("  {}\n", cells.join("  ").trim_end()));
    }

    out
}

fn visible_len(s: &str) -> usize {
    strip_ansi(s).chars().count()
}

fn truncate(s: &str, width: usize) -> String {
    let plain = strip_ansi(s);
    if plain.chars().count() <= width {
        return s.to_string();
    }
    let mut cut: String = plain.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

fn pad_cell(s: &str, width: usize, align: &Align) -> String {
    let pad = width.saturating_sub(visible_len(s));
    match align {
        Align::Left => format!("{s}{}", " ".repeat(pad)),
        Align::Right => format!("{}{s}", " ".repeat(pad)),
    }
}
