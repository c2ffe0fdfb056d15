//! Formatting pass for finished answers
//!
//! Handles the small subset the mentor prompt asks for: `### ` headers,
//! `* ` bullets, `**bold**` and `*italic*`. On a terminal the markers become
//! ANSI styling; elsewhere they are stripped.

use std::io::IsTerminal;
use std::sync::OnceLock;

use crossterm::style::Stylize;
use regex::{Captures, Regex};

static BOLD: OnceLock<Regex> = OnceLock::new();
static ITALIC: OnceLock<Regex> = OnceLock::new();

fn bold_re() -> &'static Regex {
    BOLD.get_or_init(|| Regex::new(r"\*\*(.+?)\*\*").expect("bold pattern"))
}

fn italic_re() -> &'static Regex {
    ITALIC.get_or_init(|| Regex::new(r"\*([^*\s](?:[^*]*?[^*\s])?)\*").expect("italic pattern"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Ansi,
    Plain,
}

/// Format for stdout: styled on a terminal, plain when piped
pub fn render(text: &str) -> String {
    if std::io::stdout().is_terminal() {
        render_terminal(text)
    } else {
        render_plain(text)
    }
}

pub fn render_terminal(text: &str) -> String {
    format_with(text, Style::Ansi)
}

pub fn render_plain(text: &str) -> String {
    format_with(text, Style::Plain)
}

fn format_with(text: &str, style: Style) -> String {
    text.lines()
        .map(|line| format_line(line, style))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_line(line: &str, style: Style) -> String {
    if let Some(header) = line.strip_prefix("### ") {
        let header = strip_inline(header);
        return match style {
            Style::Ansi => header.bold().underlined().to_string(),
            Style::Plain => header,
        };
    }

    if let Some(item) = line.strip_prefix("* ") {
        return format!("  • {}", format_inline(item, style));
    }

    format_inline(line, style)
}

fn format_inline(text: &str, style: Style) -> String {
    let bolded = bold_re().replace_all(text, |caps: &Captures| match style {
        Style::Ansi => caps[1].bold().to_string(),
        Style::Plain => caps[1].to_string(),
    });
    italic_re()
        .replace_all(&bolded, |caps: &Captures| match style {
            Style::Ansi => caps[1].italic().to_string(),
            Style::Plain => caps[1].to_string(),
        })
        .into_owned()
}

fn strip_inline(text: &str) -> String {
    format_inline(text, Style::Plain)
}
