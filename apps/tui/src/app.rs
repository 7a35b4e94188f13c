//! Core TUI application state and event loop.

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use medinfo_core::{
    AnswerSource, DefaultResolver, Resolution, ResolveProgress, Tier, TurnOutcome, build_resolver,
};
use medinfo_dataset::MedicineDataset;
use medinfo_shared::{ServiceError, config_dir, load_config, load_config_from};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Tabs};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::screens::{BrowseScreen, ChatAction, ChatScreen, ScreenId};
use crate::widgets::status_bar;

const LOG_FILE_NAME: &str = "medinfo-tui.log";
const READY: &str = "Ready | F1 for help";

/// Application state.
pub(crate) struct App {
    /// Currently active screen tab.
    pub active_tab: usize,
    /// Whether the app should quit.
    pub should_quit: bool,
    /// Status message shown in bottom bar.
    pub status: String,
    /// Whether help overlay is visible.
    pub show_help: bool,
    /// Farewell printed after the terminal is restored.
    pub farewell: Option<String>,
    pub chat: ChatScreen,
    pub browse: BrowseScreen,
}

impl App {
    pub(crate) fn new() -> Self {
        Self {
            active_tab: 0,
            should_quit: false,
            status: READY.to_string(),
            show_help: false,
            farewell: None,
            chat: ChatScreen::new(),
            browse: BrowseScreen::new(),
        }
    }

    fn current_screen(&self) -> ScreenId {
        ScreenId::ALL[self.active_tab]
    }
}

/// Entry point: loads config, builds the resolver, then runs the UI.
pub(crate) fn run() -> Result<()> {
    init_logging()?;

    let config = match std::env::var_os("MEDINFO_CONFIG") {
        Some(path) => load_config_from(&PathBuf::from(path))?,
        None => load_config()?,
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("failed to start async runtime")?;
    let resolver = runtime
        .block_on(build_resolver(&config))
        .wrap_err("failed to start the medicine assistant")?;

    // Setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run app
    let mut app = App::new();
    let result = run_app(&mut terminal, &mut app, &runtime, &resolver);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Some(farewell) = &app.farewell {
        println!("Assistant: {farewell}");
    }
    info!(session = %app.chat.session().id(), "tui closed");

    result
}

/// Log to `~/.medinfo/medinfo-tui.log`; stderr would corrupt the alternate screen.
fn init_logging() -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    let dir = config_dir()?;
    std::fs::create_dir_all(&dir)
        .wrap_err_with(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .wrap_err_with(|| format!("failed to open log file {}", path.display()))?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("medinfo=info"));

    fmt()
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();

    Ok(())
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    runtime: &Runtime,
    resolver: &DefaultResolver,
) -> Result<()> {
    loop {
        terminal.draw(|f| draw(f, app, resolver.dataset()))?;

        // Poll for events with 100ms timeout for responsive UI
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && handle_key(app, key.code, key.modifiers, resolver.dataset())
                        == ChatAction::Submit
                {
                    run_turn(terminal, app, runtime, resolver)?;
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// Resolve the pending chat input. Esc or Ctrl-C cancels the in-flight turn.
fn run_turn(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    runtime: &Runtime,
    resolver: &DefaultResolver,
) -> Result<()> {
    app.chat.set_busy(true);
    app.status = "Thinking...".to_string();
    terminal.draw(|f| draw(f, app, resolver.dataset()))?;

    let cancel = CancellationToken::new();
    let done = CancellationToken::new();
    let watcher = runtime.spawn_blocking({
        let cancel = cancel.clone();
        let done = done.clone();
        move || watch_for_cancel(&cancel, &done)
    });

    let progress = TuiProgress::default();
    let outcome = runtime.block_on(
        app.chat
            .session_mut()
            .submit_pending(resolver, &cancel, &progress),
    );

    done.cancel();
    let typed_ahead = runtime.block_on(watcher).unwrap_or_default();

    app.chat.set_busy(false);
    app.chat.scroll_to_bottom();

    match outcome {
        TurnOutcome::Ignored => app.status = READY.to_string(),
        TurnOutcome::Farewell(text) => {
            app.farewell = Some(text);
            app.should_quit = true;
        }
        TurnOutcome::Answered(resolution) => {
            app.status = answered_status(&resolution, &progress.failures());
            replay_typed_ahead(app, &typed_ahead);
        }
    }

    Ok(())
}

/// Wait for Esc or Ctrl-C while a turn runs. Other key presses are returned
/// so they can be replayed into the input once the turn finishes. Once `done`
/// fires, pending events are left for the main loop.
fn watch_for_cancel(cancel: &CancellationToken, done: &CancellationToken) -> Vec<KeyEvent> {
    let mut typed = Vec::new();

    while !done.is_cancelled() {
        if !matches!(event::poll(Duration::from_millis(50)), Ok(true)) || done.is_cancelled() {
            continue;
        }
        let Ok(Event::Key(key)) = event::read() else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        let ctrl_c =
            key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL);
        if key.code == KeyCode::Esc || ctrl_c {
            cancel.cancel();
            break;
        }
        typed.push(key);
    }

    typed
}

/// Feed keys typed during a turn into the chat input. Enter is dropped so a
/// key pressed while busy never submits a second query unseen.
fn replay_typed_ahead(app: &mut App, keys: &[KeyEvent]) {
    for key in keys.iter().filter(|k| k.code != KeyCode::Enter) {
        app.chat.handle_key(key.code, key.modifiers);
    }
}

/// Collects tier failures for the status bar.
#[derive(Default)]
struct TuiProgress {
    failed: Mutex<Vec<String>>,
}

impl TuiProgress {
    fn failures(&self) -> Vec<String> {
        self.failed.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl ResolveProgress for TuiProgress {
    fn tier_started(&self, tier: Tier) {
        tracing::debug!(%tier, "tier started");
    }

    fn tier_failed(&self, tier: Tier, error: &ServiceError) {
        if let Ok(mut failed) = self.failed.lock() {
            failed.push(format!("{tier} unavailable: {error}"));
        }
    }
}

fn answered_status(resolution: &Resolution, failures: &[String]) -> String {
    let source = match resolution.source {
        AnswerSource::Dataset => "Answered from the dataset",
        AnswerSource::MedicalModel => "Answered by the medical model",
        AnswerSource::GenericModel => "Answered by the generic model",
        AnswerSource::NotFound => "No answer found",
        AnswerSource::Cancelled => "Cancelled",
        AnswerSource::Farewell => "Goodbye",
        AnswerSource::Ignored => READY,
    };

    if failures.is_empty() {
        source.to_string()
    } else {
        format!("{source} ({})", failures.join("; "))
    }
}

fn handle_key(
    app: &mut App,
    code: KeyCode,
    modifiers: KeyModifiers,
    dataset: &MedicineDataset,
) -> ChatAction {
    // Global keybindings (always active)
    match code {
        KeyCode::Char('q') | KeyCode::Char('c')
            if modifiers.contains(KeyModifiers::CONTROL) =>
        {
            app.should_quit = true;
            return ChatAction::None;
        }
        KeyCode::F(1) => {
            app.show_help = !app.show_help;
            return ChatAction::None;
        }
        KeyCode::Tab => {
            app.active_tab = (app.active_tab + 1) % ScreenId::ALL.len();
            app.status = app.current_screen().to_string();
            return ChatAction::None;
        }
        KeyCode::BackTab => {
            app.active_tab = if app.active_tab == 0 {
                ScreenId::ALL.len() - 1
            } else {
                app.active_tab - 1
            };
            app.status = app.current_screen().to_string();
            return ChatAction::None;
        }
        _ => {}
    }

    // If help is showing, consume any key to dismiss
    if app.show_help {
        app.show_help = false;
        return ChatAction::None;
    }

    // Delegate to current screen
    match app.current_screen() {
        ScreenId::Chat => app.chat.handle_key(code, modifiers),
        ScreenId::Browse => {
            app.browse.handle_key(code, modifiers, dataset);
            ChatAction::None
        }
    }
}

fn draw(f: &mut Frame, app: &App, dataset: &MedicineDataset) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Tab bar
            Constraint::Min(1),    // Content
            Constraint::Length(1), // Status bar
        ])
        .split(f.area());

    // Tab bar
    let tab_titles: Vec<Line> = ScreenId::ALL
        .iter()
        .map(|s| Line::from(s.to_string()))
        .collect();

    let tabs = Tabs::new(tab_titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Medicine Information Chatbot "),
        )
        .select(app.active_tab)
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .divider(" │ ");

    f.render_widget(tabs, chunks[0]);

    // Content area
    match app.current_screen() {
        ScreenId::Chat => app.chat.draw(f, chunks[1]),
        ScreenId::Browse => app.browse.draw(f, chunks[1], dataset),
    }

    // Status bar
    let bar = status_bar(&app.status);
    f.render_widget(bar, chunks[2]);

    // Help overlay
    if app.show_help {
        draw_help_overlay(f);
    }
}

fn draw_help_overlay(f: &mut Frame) {
    let area = centered_rect(60, 60, f.area());

    let help_text = vec![
        Line::from("Keybindings").style(Style::default().add_modifier(Modifier::BOLD)),
        Line::from(""),
        Line::from("  Tab/S-Tab    Next/previous screen"),
        Line::from("  F1           Toggle this help"),
        Line::from("  Ctrl-Q       Quit"),
        Line::from(""),
        Line::from("Chat:").style(Style::default().add_modifier(Modifier::BOLD)),
        Line::from("  Enter        Send question"),
        Line::from("  Esc          Clear input / cancel a running question"),
        Line::from("  ↑/↓ PgUp/PgDn Scroll transcript"),
        Line::from("  exit         End the conversation"),
        Line::from(""),
        Line::from("Browse Dataset:").style(Style::default().add_modifier(Modifier::BOLD)),
        Line::from("  Type         Filter by name"),
        Line::from("  ↑/↓          Select medicine"),
    ];

    let help = Paragraph::new(help_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Help | press any key to close ")
                .style(Style::default().bg(Color::DarkGray)),
        )
        .style(Style::default().fg(Color::White).bg(Color::DarkGray));

    // Clear background
    f.render_widget(ratatui::widgets::Clear, area);
    f.render_widget(help, area);
}

/// Create a centered rectangle with percentage width and height.
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> MedicineDataset {
        MedicineDataset::new(Vec::new())
    }

    #[test]
    fn tab_cycles_screens_in_both_directions() {
        let mut app = App::new();
        handle_key(&mut app, KeyCode::Tab, KeyModifiers::NONE, &empty());
        assert_eq!(app.current_screen(), ScreenId::Browse);
        handle_key(&mut app, KeyCode::Tab, KeyModifiers::NONE, &empty());
        assert_eq!(app.current_screen(), ScreenId::Chat);
        handle_key(&mut app, KeyCode::BackTab, KeyModifiers::SHIFT, &empty());
        assert_eq!(app.current_screen(), ScreenId::Browse);
    }

    #[test]
    fn ctrl_c_quits_and_plain_q_types() {
        let mut app = App::new();
        handle_key(&mut app, KeyCode::Char('q'), KeyModifiers::NONE, &empty());
        assert!(!app.should_quit);
        assert_eq!(app.chat.session().pending_input(), "q");

        handle_key(&mut app, KeyCode::Char('c'), KeyModifiers::CONTROL, &empty());
        assert!(app.should_quit);
    }

    #[test]
    fn help_overlay_swallows_next_key() {
        let mut app = App::new();
        handle_key(&mut app, KeyCode::F(1), KeyModifiers::NONE, &empty());
        assert!(app.show_help);

        let action = handle_key(&mut app, KeyCode::Enter, KeyModifiers::NONE, &empty());
        assert_eq!(action, ChatAction::None);
        assert!(!app.show_help);
    }

    #[test]
    fn status_lists_failed_tiers() {
        let resolution = Resolution {
            source: AnswerSource::GenericModel,
            text: "General info.".into(),
            notice: None,
        };
        assert_eq!(
            answered_status(&resolution, &[]),
            "Answered by the generic model"
        );
        assert_eq!(
            answered_status(&resolution, &["medical model unavailable: timed out".into()]),
            "Answered by the generic model (medical model unavailable: timed out)"
        );
    }

    #[test]
    fn typed_ahead_keys_land_in_input_without_submitting() {
        let mut app = App::new();
        let keys = [
            KeyEvent::new(KeyCode::Char('i'), KeyModifiers::NONE),
            KeyEvent::new(KeyCode::Char('b'), KeyModifiers::NONE),
            KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE),
            KeyEvent::new(KeyCode::Char('u'), KeyModifiers::NONE),
        ];

        replay_typed_ahead(&mut app, &keys);

        assert_eq!(app.chat.session().pending_input(), "ibu");
        assert!(app.chat.session().transcript().is_empty());
    }

    #[test]
    fn centered_rect_fits_inside() {
        let outer = Rect::new(0, 0, 100, 40);
        let inner = centered_rect(60, 60, outer);
        assert!(inner.width <= 60 && inner.height <= 24);
        assert!(inner.x >= 20 && inner.y >= 8);
    }
}
