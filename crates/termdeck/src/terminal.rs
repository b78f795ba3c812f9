//! Raw-mode terminal handling.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

/// Keeps the terminal in raw mode until dropped.
pub struct TerminalGuard(());

impl TerminalGuard {
    pub fn enter() -> Result<Self> {
        enable_raw_mode().context("enable raw mode")?;
        Ok(Self(()))
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        disable_raw_mode().ok();
    }
}

/// Wait up to `timeout` for a key press.
pub fn poll_key(timeout: Duration) -> Result<Option<KeyEvent>> {
    if !event::poll(timeout).context("poll terminal events")? {
        return Ok(None);
    }
    match event::read().context("read terminal event")? {
        Event::Key(key) if key.kind == KeyEventKind::Press => Ok(Some(key)),
        _ => Ok(None),
    }
}

/// Line printer that works in raw mode, where `\n` no longer returns the
/// cursor to column zero.
pub struct Console<W: Write> {
    out: W,
}

impl Console<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> Console<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn line(&mut self, text: &str) -> Result<()> {
        for l in text.split('\n') {
            write!(self.out, "{l}\r\n").context("write to terminal")?;
        }
        self.out.flush().context("flush terminal")
    }

    pub fn lines<I, S>(&mut self, lines: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for l in lines {
            self.line(l.as_ref())?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
