//! Live review queue dashboard.
//!
//! Full-screen terminal UI over the synchronization engine:
//! - Work queue table with wrap-around selection
//! - Connection and staleness indicators in the header
//! - Undo bar with a live countdown while an action is staged
//! - Key bindings: j/k navigate, a approve, d dismiss, w withdraw,
//!   u undo, r refresh, p/v/c filter, x dismiss notice, q quit
//!
//! All synchronization state lives in the engine; this module only reads
//! views, dispatches operations, and performs the returned effects against
//! the HTTP host.

use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState};

use docket_core::config::EngineConfig;
use docket_core::engine::{Effect, Engine, Severity};
use docket_core::model::{ActionKind, ItemKind, Millis, WorkItem};

use crate::http::{Client, HostEvent};

/// How long the render loop waits for input before ticking timers.
const INPUT_POLL: Duration = Duration::from_millis(100);

/// The dashboard: engine, HTTP host, and render state.
pub struct MonitorView {
    engine: Engine,
    client: Client,
    tx: Sender<HostEvent>,
    rx: Receiver<HostEvent>,
    epoch: Instant,
    published_case: Option<u64>,
    quit: bool,
}

impl MonitorView {
    /// Build the view. `deep_link` selects a case on first population.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine config fails validation.
    pub fn new(client: Client, cfg: EngineConfig, deep_link: Option<u64>) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        Ok(Self {
            engine: Engine::new(cfg, deep_link)?,
            client,
            tx,
            rx,
            epoch: Instant::now(),
            published_case: None,
            quit: false,
        })
    }

    fn now(&self) -> Millis {
        i64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(i64::MAX)
    }

    /// Perform effects against the HTTP host. Requests run on worker
    /// threads and report back through the channel.
    fn perform(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::FetchSnapshot { generation } => {
                    self.client.spawn_poll(generation, self.tx.clone());
                }
                Effect::Connect => self.client.spawn_subscribe(self.tx.clone()),
                Effect::Commit { token, action } => {
                    self.client.spawn_commit(token, action, self.tx.clone());
                }
                Effect::Mutate { seq, action } => {
                    self.client.spawn_mutate(seq, action, self.tx.clone());
                }
                Effect::PublishSelection { case_id } => self.published_case = case_id,
            }
        }
    }

    /// Feed one completed request or push event into the engine.
    fn apply_host_event(&mut self, host_event: HostEvent) {
        let now = self.now();
        let effects = match host_event {
            HostEvent::Poll { generation, result } => {
                self.engine.handle_poll(now, generation, result)
            }
            HostEvent::Commit { token, result } => self.engine.handle_commit(now, token, result),
            HostEvent::Mutate { seq, result } => self.engine.handle_mutation(now, seq, result),
            HostEvent::Push(push_event) => self.engine.handle_push(now, push_event),
        };
        self.perform(effects);
    }

    /// Dispatch a key press to an engine operation.
    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        let now = self.now();
        let selected = self.engine.selected().map(WorkItem::key);

        let effects = match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.quit = true;
                return;
            }
            KeyCode::Char('j') | KeyCode::Down => self.engine.step(1),
            KeyCode::Char('k') | KeyCode::Up => self.engine.step(-1),
            KeyCode::Char('g') => self.engine.select(0),
            KeyCode::Char('r') => self.engine.refresh(now),
            KeyCode::Char('a') => selected.map_or_else(Vec::new, |key| {
                self.engine
                    .apply_now(now, key, ActionKind::Approve, serde_json::Value::Null)
            }),
            KeyCode::Char('d') => selected.map_or_else(Vec::new, |key| {
                self.engine
                    .stage(now, key, ActionKind::Dismiss, serde_json::Value::Null)
            }),
            KeyCode::Char('w') => selected.map_or_else(Vec::new, |key| {
                self.engine
                    .stage(now, key, ActionKind::Withdraw, serde_json::Value::Null)
            }),
            KeyCode::Char('u') => self.engine.cancel_undo(now),
            KeyCode::Char('p') => self.engine.set_kind_filter(Some(ItemKind::Proposal)),
            KeyCode::Char('v') => self.engine.set_kind_filter(Some(ItemKind::Review)),
            KeyCode::Char('c') => self.engine.set_kind_filter(None),
            KeyCode::Char('x') => {
                if let Some(notice) = self.engine.notices().last() {
                    let seq = notice.seq;
                    self.engine.dismiss_notice(seq);
                }
                Vec::new()
            }
            _ => Vec::new(),
        };
        self.perform(effects);
    }

    /// True once the user asked to leave.
    #[must_use]
    pub const fn should_quit(&self) -> bool {
        self.quit
    }

    /// Run the full-screen loop until quit.
    ///
    /// # Errors
    ///
    /// Returns an error if terminal setup or drawing fails.
    pub fn run(mut self) -> Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        self.engine.dispose();
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
        let effects = self.engine.start(self.now());
        self.perform(effects);

        while !self.should_quit() {
            while let Ok(host_event) = self.rx.try_recv() {
                self.apply_host_event(host_event);
            }
            let effects = self.engine.tick(self.now());
            self.perform(effects);

            terminal.draw(|frame| {
                let area = frame.area();
                render(frame, &self.engine, self.published_case, self.now(), area);
            })?;

            if event::poll(INPUT_POLL)?
                && let Event::Key(key) = event::read()?
            {
                self.handle_key(key);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(
    frame: &mut ratatui::Frame<'_>,
    engine: &Engine,
    published_case: Option<u64>,
    now: Millis,
    area: Rect,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(2),
        ])
        .split(area);

    render_header(frame, engine, chunks[0]);
    render_queue(frame, engine, chunks[1]);
    render_footer(frame, engine, published_case, now, chunks[2]);
}

fn render_header(frame: &mut ratatui::Frame<'_>, engine: &Engine, area: Rect) {
    let connection = if engine.connection().connected {
        Span::styled("live", Style::default().fg(Color::Green))
    } else {
        Span::styled("reconnecting", Style::default().fg(Color::Yellow))
    };
    let mut spans = vec![
        Span::styled("docket", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("  {} items  ", engine.queue().len())),
        connection,
    ];
    if engine.is_stale() {
        spans.push(Span::styled(
            "  stale",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_queue(frame: &mut ratatui::Frame<'_>, engine: &Engine, area: Rect) {
    let rows: Vec<Row<'_>> = engine
        .queue()
        .iter()
        .map(|item| {
            Row::new(vec![
                Cell::from(item.kind().to_string()),
                Cell::from(format!("case {}", item.case_id())),
                Cell::from(item.case_name().to_string()),
                Cell::from(relative_age(item)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(12),
            Constraint::Min(20),
            Constraint::Length(8),
        ],
    )
    .header(
        Row::new(vec!["kind", "case", "name", "age"])
            .style(Style::default().add_modifier(Modifier::DIM)),
    )
    .row_highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .block(Block::default().borders(Borders::TOP));

    let mut state = TableState::default();
    state.select(engine.selected_index());
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_footer(
    frame: &mut ratatui::Frame<'_>,
    engine: &Engine,
    published_case: Option<u64>,
    now: Millis,
    area: Rect,
) {
    let mut lines = Vec::new();

    if let Some(armed) = engine.armed_undo(now) {
        let seconds = (armed.remaining_millis + 999) / 1_000;
        lines.push(Line::from(Span::styled(
            format!("{} in {seconds}s  [u]ndo", armed.label),
            Style::default().fg(Color::Yellow),
        )));
    } else if let Some(notice) = engine.notices().last() {
        let color = match notice.severity {
            Severity::Error => Color::Red,
            Severity::Info => Color::Cyan,
        };
        lines.push(Line::from(Span::styled(
            format!("[{}] {}  [x] dismiss", notice.code.code(), notice.text),
            Style::default().fg(color),
        )));
    }

    let link = published_case.map_or_else(String::new, |case_id| format!("  link: case {case_id}"));
    lines.push(Line::from(Span::styled(
        format!("j/k move  a approve  d dismiss  w withdraw  r refresh  q quit{link}"),
        Style::default().add_modifier(Modifier::DIM),
    )));

    frame.render_widget(Paragraph::new(lines), area);
}

fn relative_age(item: &WorkItem) -> String {
    let Some(updated_at) = item.updated_at() else {
        return "-".to_string();
    };
    let minutes = Utc::now().signed_duration_since(updated_at).num_minutes();
    if minutes < 1 {
        "now".to_string()
    } else if minutes < 60 {
        format!("{minutes}m")
    } else if minutes < 1_440 {
        format!("{}h", minutes / 60)
    } else {
        format!("{}d", minutes / 1_440)
    }
}

/// Entry point used by `dk monitor`.
///
/// # Errors
///
/// Returns an error on invalid config or terminal failure.
pub fn run_monitor_tui(client: Client, cfg: EngineConfig, deep_link: Option<u64>) -> Result<()> {
    MonitorView::new(client, cfg, deep_link)?.run()
}
