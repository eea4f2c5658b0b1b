//! Terminal [`Surface`]: each redraw repaints the whole message list.
//!
//! A terminal cannot be scrolled by the program, so the surface always
//! reports itself as pinned to the bottom and new messages are followed.

use std::io::{self, Write};

use colored::*;
use tracing::warn;

use crate::render::{MessageView, ScrollMetrics, Surface, ViewModel};

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

pub struct TerminalSurface<W: Write> {
    out: W,
    /// Rows available to the view.
    rows: u32,
    /// Rows written by the last draw.
    content: u32,
    clear: bool,
}

impl TerminalSurface<io::Stdout> {
    pub fn stdout(rows: u32) -> Self {
        Self::new(io::stdout(), rows, true)
    }
}

impl<W: Write> TerminalSurface<W> {
    pub fn new(out: W, rows: u32, clear: bool) -> Self {
        Self {
            out,
            rows,
            content: 0,
            clear,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn format_message(m: &MessageView) -> String {
    let (r, g, b) = m.color.to_rgb();
    let mut header = m.header().truecolor(r, g, b).bold().to_string();
    if m.actions.edit {
        header.push_str(&format!(" {}", "[edit]".dimmed()));
    }
    if m.actions.delete {
        header.push_str(&format!(" {}", "[delete]".dimmed()));
    }
    format!("{header}\n  {}\n", m.text)
}

/// Plain text of a full frame.
pub fn format_view(view: &ViewModel) -> String {
    let mut frame = String::new();
    for m in &view.messages {
        frame.push_str(&format_message(m));
    }
    if let Some(notice) = &view.notice {
        frame.push_str(&format!("{}\n", notice.bright_yellow().bold()));
    }
    frame
}

impl<W: Write> Surface for TerminalSurface<W> {
    fn metrics(&self) -> ScrollMetrics {
        ScrollMetrics {
            offset: self.content.saturating_sub(self.rows),
            viewport: self.rows,
            content: self.content,
        }
    }

    fn draw(&mut self, view: &ViewModel) {
        let frame = format_view(view);
        self.content = frame.lines().count() as u32;
        let prefix = if self.clear { CLEAR_SCREEN } else { "" };
        if let Err(e) = write!(self.out, "{prefix}{frame}") {
            warn!(error = %e, "failed to write chat frame");
        }
    }

    fn scroll_to_bottom(&mut self) {
        if let Err(e) = self.out.flush() {
            warn!(error = %e, "failed to flush terminal");
        }
    }
}
