//! "Chat" screen: scrollable transcript above a single input line.

use crossterm::event::{KeyCode, KeyModifiers};
use medinfo_core::ConversationSession;
use medinfo_shared::{ConversationTurn, Role};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::widgets::input_box;

const PAGE: u16 = 10;

/// What the app should do after a key press on this screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChatAction {
    None,
    Submit,
}

pub(crate) struct ChatScreen {
    session: ConversationSession,
    /// Lines scrolled up from the bottom of the transcript.
    scroll_back: u16,
    busy: bool,
}

impl ChatScreen {
    pub(crate) fn new() -> Self {
        Self {
            session: ConversationSession::new(),
            scroll_back: 0,
            busy: false,
        }
    }

    pub(crate) fn session(&self) -> &ConversationSession {
        &self.session
    }

    pub(crate) fn session_mut(&mut self) -> &mut ConversationSession {
        &mut self.session
    }

    pub(crate) fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    pub(crate) fn scroll_to_bottom(&mut self) {
        self.scroll_back = 0;
    }

    pub(crate) fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> ChatAction {
        match code {
            KeyCode::Enter => {
                if self.session.pending_input().trim().is_empty() {
                    self.session.pending_input_mut().clear();
                    ChatAction::None
                } else {
                    ChatAction::Submit
                }
            }
            KeyCode::Char(c) if !modifiers.contains(KeyModifiers::CONTROL) => {
                self.session.pending_input_mut().push(c);
                ChatAction::None
            }
            KeyCode::Backspace => {
                self.session.pending_input_mut().pop();
                ChatAction::None
            }
            KeyCode::Esc => {
                self.session.pending_input_mut().clear();
                ChatAction::None
            }
            KeyCode::Up => {
                self.scroll_back = self.scroll_back.saturating_add(1);
                ChatAction::None
            }
            KeyCode::Down => {
                self.scroll_back = self.scroll_back.saturating_sub(1);
                ChatAction::None
            }
            KeyCode::PageUp => {
                self.scroll_back = self.scroll_back.saturating_add(PAGE);
                ChatAction::None
            }
            KeyCode::PageDown => {
                self.scroll_back = self.scroll_back.saturating_sub(PAGE);
                ChatAction::None
            }
            KeyCode::End => {
                self.scroll_to_bottom();
                ChatAction::None
            }
            _ => ChatAction::None,
        }
    }

    pub(crate) fn draw(&self, f: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(1),    // Transcript
                Constraint::Length(3), // Input
            ])
            .split(area);

        // Transcript
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!(" Conversation ({} turns) ", self.session.transcript().len()));
        let inner = block.inner(chunks[0]);

        let lines = if self.session.transcript().is_empty() {
            vec![
                Line::from("Welcome to the Medicine Information Chatbot.")
                    .style(Style::default().add_modifier(Modifier::BOLD)),
                Line::from(""),
                Line::from("Type a medicine name and press Enter. Type `exit` to leave."),
            ]
        } else {
            transcript_lines(self.session.transcript())
        };

        let transcript = Paragraph::new(lines).wrap(Wrap { trim: false });
        let total = wrapped_height(&transcript, inner.width);
        let max_offset = total.saturating_sub(inner.height);
        let offset = max_offset.saturating_sub(self.scroll_back);

        f.render_widget(transcript.block(block).scroll((offset, 0)), chunks[0]);

        // Input
        let title = if self.busy {
            " Thinking... (Esc to cancel) "
        } else {
            " Ask about a medicine (Enter to send) "
        };
        let pending = self.session.pending_input();
        f.render_widget(input_box(title, pending, true, self.busy), chunks[1]);

        if !self.busy {
            f.set_cursor_position(cursor_position(chunks[1], pending));
        }
    }
}

/// One styled line per transcript text line, a blank line between turns.
fn transcript_lines(turns: &[ConversationTurn]) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    for (i, turn) in turns.iter().enumerate() {
        if i > 0 {
            lines.push(Line::from(""));
        }

        let role_style = match turn.role {
            Role::User => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            Role::Assistant => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        };

        let mut text_lines = turn.text.lines();
        let first = text_lines.next().unwrap_or_default().to_string();
        lines.push(Line::from(vec![
            Span::styled(format!("{}: ", turn.role), role_style),
            Span::raw(first),
        ]));
        lines.extend(text_lines.map(|l| Line::from(l.to_string())));
    }

    lines
}

/// Rows the wrapped paragraph occupies at `width` columns, counted the way
/// ratatui lays out word-wrapped text.
fn wrapped_height(paragraph: &Paragraph<'_>, width: u16) -> u16 {
    if width == 0 {
        return 0;
    }
    u16::try_from(paragraph.line_count(width)).unwrap_or(u16::MAX)
}

/// Cursor cell after the typed text, clamped inside the input box border.
fn cursor_position(input: Rect, pending: &str) -> (u16, u16) {
    let typed = u16::try_from(pending.chars().count()).unwrap_or(u16::MAX);
    let max_x = input.right().saturating_sub(2);
    let x = input.x.saturating_add(1).saturating_add(typed).min(max_x);
    (x, input.y.saturating_add(1))
}
