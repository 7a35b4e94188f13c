//! "Browse Dataset" screen: filter medicines by name and show a record's details.

use crossterm::event::{KeyCode, KeyModifiers};
use medinfo_dataset::{MedicineDataset, format_record};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};

use crate::widgets::input_box;

pub(crate) struct BrowseScreen {
    filter: String,
    selected: usize,
}

impl BrowseScreen {
    pub(crate) fn new() -> Self {
        Self {
            filter: String::new(),
            selected: 0,
        }
    }

    pub(crate) fn handle_key(
        &mut self,
        code: KeyCode,
        modifiers: KeyModifiers,
        dataset: &MedicineDataset,
    ) {
        match code {
            KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Down => {
                if self.selected + 1 < dataset.filter(&self.filter).len() {
                    self.selected += 1;
                }
            }
            KeyCode::Char(c) if !modifiers.contains(KeyModifiers::CONTROL) => {
                self.filter.push(c);
                self.selected = 0;
            }
            KeyCode::Backspace => {
                self.filter.pop();
                self.selected = 0;
            }
            KeyCode::Esc => {
                self.filter.clear();
                self.selected = 0;
            }
            _ => {}
        }
    }

    pub(crate) fn draw(&self, f: &mut Frame, area: Rect, dataset: &MedicineDataset) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Filter
                Constraint::Min(1),    // List + details
            ])
            .split(area);

        f.render_widget(
            input_box(" Filter by name (Esc to clear) ", &self.filter, true, false),
            chunks[0],
        );

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(chunks[1]);

        let matches = dataset.filter(&self.filter);

        if matches.is_empty() {
            let empty = Paragraph::new(format!("No medicine matches '{}'.", self.filter))
                .alignment(Alignment::Center)
                .block(Block::default().borders(Borders::ALL).title(" Medicines "));
            f.render_widget(empty, chunks[1]);
            return;
        }

        let items: Vec<ListItem> = matches
            .iter()
            .map(|record| ListItem::new(record.name.as_str()))
            .collect();

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!(" Medicines ({}/{}) ", matches.len(), dataset.len())),
            )
            .highlight_style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▸ ");

        let selected = self.selected.min(matches.len() - 1);
        let mut state = ListState::default().with_selected(Some(selected));
        f.render_stateful_widget(list, body[0], &mut state);

        let details = Paragraph::new(format_record(matches[selected]))
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title(" Details "));
        f.render_widget(details, body[1]);
    }
}
