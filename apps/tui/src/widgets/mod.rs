//! Reusable TUI widgets.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

/// Bottom status bar.
pub(crate) fn status_bar(msg: &str) -> Paragraph<'_> {
    Paragraph::new(format!(" {msg}"))
        .style(
            Style::default()
                .bg(Color::DarkGray)
                .fg(Color::White),
        )
}

/// Single-line text input box. Focused inputs get a cyan border, busy ones yellow.
pub(crate) fn input_box<'a>(title: &'a str, text: &'a str, focused: bool, busy: bool) -> Paragraph<'a> {
    let border = if busy {
        Style::default().fg(Color::Yellow)
    } else if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };

    Paragraph::new(text).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(border),
    )
}
