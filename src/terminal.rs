//! Terminal surface for the answer slot
//!
//! Raw chunks are printed as they arrive. On finalize the rows they took are
//! erased and the formatted answer is printed in their place. When stdout is
//! not a terminal nothing is animated; only the final text is written.

use std::io::{self, IsTerminal, Stdout, Write};

use crossterm::{
    cursor::{MoveToColumn, MoveUp},
    queue,
    terminal::{self, Clear, ClearType},
};
use unicode_width::UnicodeWidthStr;

use crate::render::Display;

const FALLBACK_COLUMNS: u16 = 80;

pub struct TerminalDisplay<W: Write = Stdout> {
    out: W,
    interactive: bool,
    columns: Option<u16>,
    raw: String,
}

impl TerminalDisplay<Stdout> {
    pub fn stdout() -> Self {
        let interactive = io::stdout().is_terminal();
        Self::new(io::stdout(), interactive)
    }
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W, interactive: bool) -> Self {
        Self {
            out,
            interactive,
            columns: None,
            raw: String::new(),
        }
    }

    /// Fixed width instead of querying the terminal
    pub fn with_columns(mut self, columns: u16) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn width(&self) -> usize {
        let cols = self
            .columns
            .or_else(|| terminal::size().ok().map(|(c, _)| c))
            .unwrap_or(FALLBACK_COLUMNS);
        usize::from(cols.max(1))
    }

    /// Screen rows the raw buffer occupies, counting soft wraps
    fn raw_rows(&self) -> u16 {
        let width = self.width();
        let rows: usize = self
            .raw
            .split('\n')
            .map(|line| UnicodeWidthStr::width(line).div_ceil(width).max(1))
            .sum();
        u16::try_from(rows).unwrap_or(u16::MAX)
    }

    fn erase_raw(&mut self) -> io::Result<()> {
        if self.raw.is_empty() {
            return Ok(());
        }
        let rows = self.raw_rows();
        queue!(self.out, MoveToColumn(0))?;
        if rows > 1 {
            queue!(self.out, MoveUp(rows - 1))?;
        }
        queue!(self.out, Clear(ClearType::FromCursorDown))?;
        self.raw.clear();
        Ok(())
    }

    fn write_line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{}", text)?;
        self.out.flush()
    }
}

impl<W: Write + Send + 'static> Display for TerminalDisplay<W> {
    /// Erase whatever a superseded reveal left on screen
    fn reset(&mut self) {
        if let Err(e) = self.erase_raw().and_then(|_| self.out.flush()) {
            tracing::debug!(error = %e, "terminal erase failed");
            self.raw.clear();
        }
    }

    fn append_raw(&mut self, chunk: &str) {
        if !self.interactive {
            return;
        }
        self.raw.push_str(chunk);
        if let Err(e) = write!(self.out, "{}", chunk) {
            tracing::debug!(error = %e, "terminal write failed");
        }
    }

    fn scroll_to_latest(&mut self) {
        if let Err(e) = self.out.flush() {
            tracing::debug!(error = %e, "terminal flush failed");
        }
    }

    fn show_formatted(&mut self, formatted: &str) {
        let result = self
            .erase_raw()
            .and_then(|_| self.write_line(formatted))
            .and_then(|_| self.write_line(""));
        if let Err(e) = result {
            tracing::debug!(error = %e, "terminal write failed");
        }
    }

    fn notice(&mut self, text: &str) {
        if let Err(e) = self.write_line(text) {
            tracing::debug!(error = %e, "terminal write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(display: TerminalDisplay<Vec<u8>>) -> String {
        String::from_utf8(display.into_inner()).unwrap()
    }

    #[test]
    fn test_piped_output_skips_raw_chunks() {
        let mut display = TerminalDisplay::new(Vec::new(), false);
        display.reset();
        display.append_raw("Federalism");
        display.append_raw(" ");
        display.show_formatted("Federalism is shared rule.");
        assert_eq!(output(display), "Federalism is shared rule.\n\n");
    }

    #[test]
    fn test_interactive_erases_raw_before_final() {
        let mut display = TerminalDisplay::new(Vec::new(), true).with_columns(80);
        display.append_raw("**raw**");
        display.show_formatted("raw");
        let out = output(display);
        assert!(out.starts_with("**raw**"));
        // Clear from cursor down
        assert!(out.contains("\u{1b}[J"));
        assert!(out.ends_with("raw\n\n"));
    }

    #[test]
    fn test_reset_erases_partial_reveal() {
        let mut display = TerminalDisplay::new(Vec::new(), true).with_columns(10);
        display.append_raw("0123456789abc");
        display.reset();
        assert!(display.raw.is_empty());

        display.append_raw("Second");
        display.show_formatted("Second answer");
        let out = output(display);
        // Two rows of the first reveal: back to column 0, up one, clear down
        let erase_first = out.find("\u{1b}[J").unwrap();
        assert!(out[..erase_first].contains("\u{1b}[1A"));
        assert!(out[erase_first..].starts_with("\u{1b}[JSecond"));
        assert!(out.ends_with("Second answer\n\n"));
    }

    #[test]
    fn test_reset_without_reveal_writes_nothing() {
        let mut display = TerminalDisplay::new(Vec::new(), true).with_columns(80);
        display.reset();
        assert_eq!(output(display), "");
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn test_flush_failures_are_absorbed() {
        let mut display = TerminalDisplay::new(BrokenPipe, true).with_columns(80);
        display.append_raw("partial");
        display.scroll_to_latest();
        display.reset();
        assert!(display.raw.is_empty());
        display.show_formatted("done");
    }

    #[test]
    fn test_row_count_includes_wraps() {
        let mut display = TerminalDisplay::new(Vec::new(), true).with_columns(10);
        display.append_raw("0123456789abc");
        assert_eq!(display.raw_rows(), 2);
        display.append_raw("\nnext");
        assert_eq!(display.raw_rows(), 3);
        display.append_raw("\n");
        assert_eq!(display.raw_rows(), 4);
    }

    #[test]
    fn test_notice_is_a_line() {
        let mut display = TerminalDisplay::new(Vec::new(), false);
        display.notice("Ready to conquer UPSC? Let's begin.");
        assert_eq!(output(display), "Ready to conquer UPSC? Let's begin.\n");
    }
}
