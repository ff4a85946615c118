//! Colored output helpers for CLI
//!
//! Human-facing lines go to stdout, errors to stderr. JSON output bypasses
//! colors entirely so it stays machine-readable.

use owo_colors::OwoColorize;
use serde::Serialize;

const COLUMN_WIDTH: usize = 15;

/// Severity of a one-line status message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Ok,
    Warn,
    Error,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Ok => "[OK]",
            Level::Warn => "[WARN]",
            Level::Error => "[ERROR]",
        }
    }

    fn paint(self, message: &str) -> String {
        match self {
            Level::Ok => format!("{} {}", "✓".green().bold(), message.green()),
            Level::Warn => format!("{} {}", "⚠".yellow().bold(), message.yellow()),
            Level::Error => format!("{} {}", "✗".red().bold(), message.red()),
        }
    }
}

/// Output style configuration
#[derive(Debug, Clone, Copy)]
pub struct Output {
    /// Whether to use colored output
    pub colored: bool,
}

impl Output {
    pub fn new() -> Self {
        Self { colored: true }
    }

    pub fn no_color() -> Self {
        Self { colored: false }
    }

    /// Colors unless `--no-color` was passed or `NO_COLOR` is set
    pub fn from_flags(no_color: bool) -> Self {
        if no_color || std::env::var_os("NO_COLOR").is_some() {
            Self::no_color()
        } else {
            Self::new()
        }
    }

    fn render(&self, level: Level, message: &str) -> String {
        if self.colored {
            format!("  {}", level.paint(message))
        } else {
            format!("  {} {}", level.tag(), message)
        }
    }

    pub fn success(&self, message: &str) {
        println!("{}", self.render(Level::Ok, message));
    }

    pub fn warning(&self, message: &str) {
        println!("{}", self.render(Level::Warn, message));
    }

    /// Goes to stderr
    pub fn error(&self, message: &str) {
        eprintln!("{}", self.render(Level::Error, message));
    }

    /// Section title, preceded by a blank line
    pub fn header(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.bright_white().bold().underline());
        } else {
            println!("\n  === {} ===", title);
        }
    }

    pub fn subheader(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.cyan().bold());
        } else {
            println!("\n  --- {} ---", title);
        }
    }

    pub fn kv(&self, key: &str, value: &str) {
        if self.colored {
            println!("    {}: {}", key.dimmed(), value.bright_white());
        } else {
            println!("    {}: {}", key, value);
        }
    }

    pub fn list_item(&self, item: &str) {
        if self.colored {
            println!("    {} {}", "•".blue(), item);
        } else {
            println!("    - {}", item);
        }
    }

    /// One stage line of `status`: done, skipped, ready or waiting
    pub fn stage(&self, number: usize, id: &str, state: StageState, detail: &str) {
        let label = format!("{}. {:<16}", number, id);
        if self.colored {
            println!("    {} {} {}", state.glyph(), label, detail.dimmed());
        } else {
            println!("    [{}] {} {}", state.as_str(), label, detail);
        }
    }

    pub fn hint(&self, message: &str) {
        if self.colored {
            println!("\n  {} {}", "hint:".dimmed(), message.dimmed().italic());
        } else {
            println!("\n  [TIP] {}", message);
        }
    }

    /// Column titles plus a rule sized to them
    pub fn table_header(&self, columns: &[&str]) {
        let header = pad_columns(columns);
        let width = columns.len() * (COLUMN_WIDTH + 1);
        if self.colored {
            println!("    {}", header.bright_white().bold());
            println!("    {}", "─".repeat(width).dimmed());
        } else {
            println!("    {}", header);
            println!("    {}", "-".repeat(width));
        }
    }

    pub fn table_row(&self, values: &[&str]) {
        println!("    {}", pad_columns(values));
    }

    /// Pretty-printed JSON on stdout
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> serde_json::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

/// Display state of one pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Done,
    Skipped,
    Ready,
    Waiting,
}

impl StageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageState::Done => "done",
            StageState::Skipped => "skipped",
            StageState::Ready => "ready",
            StageState::Waiting => "waiting",
        }
    }

    fn glyph(&self) -> String {
        match self {
            StageState::Done => "✓".green().bold().to_string(),
            StageState::Skipped => "↷".yellow().bold().to_string(),
            StageState::Ready => "→".cyan().bold().to_string(),
            StageState::Waiting => "○".dimmed().to_string(),
        }
    }
}

fn pad_columns(values: &[&str]) -> String {
    values
        .iter()
        .map(|v| format!("{:<width$}", v, width = COLUMN_WIDTH))
        .collect::<Vec<_>>()
        .join(" ")
}
