use crate::conversation::Role;
use crate::loader::UPLOADED_CSV;
use crate::portfolio::{format_amount, format_dollars, Portfolio};
use crate::profile::Choice;
use crate::session::{Preference, Session, SessionEvent};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Table, TableState, Tabs, Wrap,
    },
    Frame, Terminal,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use tui_big_text::{BigText, PixelSize};

const ASSISTANT_TAB: &str = "Assistant";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppMode {
    Normal,
    /// Typing a chat message
    Compose,
    /// Typing the path of a CSV file to upload
    Upload,
}

/// What the event loop should do after a key press.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    None,
    Quit,
    Dispatch(SessionEvent),
}

pub struct App {
    pub session: Session,
    pub current_tab: usize,
    pub mode: AppMode,
    pub input: String,
    /// Selected table row per portfolio name
    pub selected_rows: HashMap<String, usize>,
    /// Lines scrolled up from the newest chat message
    pub scroll_back: u16,
    // set while drawing; bounds `scroll_back`
    history_overflow: std::cell::Cell<u16>,
    pub waiting: bool,
    pub error_message: Option<String>,
    pub should_quit: bool,
}

impl App {
    pub fn new(session: Session) -> App {
        App {
            session,
            current_tab: 0,
            mode: AppMode::Normal,
            input: String::new(),
            selected_rows: HashMap::new(),
            scroll_back: 0,
            history_overflow: std::cell::Cell::new(0),
            waiting: false,
            error_message: None,
            should_quit: false,
        }
    }

    /// One tab per portfolio, then the assistant.
    pub fn tab_titles(&self) -> Vec<String> {
        self.session
            .portfolios()
            .iter()
            .map(|p| p.name.clone())
            .chain(std::iter::once(ASSISTANT_TAB.to_string()))
            .collect()
    }

    fn tab_count(&self) -> usize {
        self.session.portfolios().len() + 1
    }

    pub fn on_assistant_tab(&self) -> bool {
        self.current_tab == self.tab_count() - 1
    }

    pub fn current_portfolio(&self) -> Option<&Portfolio> {
        self.session.portfolios().get(self.current_tab)
    }

    /// Selected row of the current portfolio, clamped to its positions.
    pub fn selected_row(&self) -> usize {
        self.current_portfolio()
            .and_then(|p| {
                self.selected_rows
                    .get(&p.name)
                    .map(|&i| i.min(p.positions.len().saturating_sub(1)))
            })
            .unwrap_or(0)
    }

    fn select_row(&mut self, row: usize) {
        if let Some(portfolio) = self.current_portfolio() {
            let row = row.min(portfolio.positions.len().saturating_sub(1));
            let name = portfolio.name.clone();
            self.selected_rows.insert(name, row);
        }
    }

    pub fn select_next(&mut self) {
        self.select_row(self.selected_row() + 1);
    }

    pub fn select_previous(&mut self) {
        self.select_row(self.selected_row().saturating_sub(1));
    }

    pub fn next_tab(&mut self) {
        self.current_tab = (self.current_tab + 1) % self.tab_count();
    }

    pub fn previous_tab(&mut self) {
        let count = self.tab_count();
        self.current_tab = (self.current_tab + count - 1) % count;
    }

    pub fn handle_key(&mut self, code: KeyCode) -> Action {
        // any key dismisses the error popup
        if self.error_message.take().is_some() {
            return Action::None;
        }

        match self.mode {
            AppMode::Normal => self.handle_normal_key(code),
            AppMode::Compose | AppMode::Upload => self.handle_input_key(code),
        }
    }

    fn handle_normal_key(&mut self, code: KeyCode) -> Action {
        let cycle = |preference, forward| {
            Action::Dispatch(SessionEvent::CyclePreference {
                preference,
                forward,
            })
        };

        match code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
                Action::Quit
            }
            KeyCode::Char('h') | KeyCode::Left | KeyCode::BackTab => {
                self.previous_tab();
                Action::None
            }
            KeyCode::Char('l') | KeyCode::Right | KeyCode::Tab => {
                self.next_tab();
                Action::None
            }
            KeyCode::Char(c @ '1'..='9') => {
                let index = c as usize - '1' as usize;
                if index < self.tab_count() {
                    self.current_tab = index;
                }
                Action::None
            }
            KeyCode::Char('r') => cycle(Preference::Risk, true),
            KeyCode::Char('R') => cycle(Preference::Risk, false),
            KeyCode::Char('t') => cycle(Preference::Tax, true),
            KeyCode::Char('T') => cycle(Preference::Tax, false),
            KeyCode::Char('y') => cycle(Preference::Horizon, true),
            KeyCode::Char('Y') => cycle(Preference::Horizon, false),
            KeyCode::Char('u') => {
                self.mode = AppMode::Upload;
                self.input.clear();
                Action::None
            }
            KeyCode::Char('i') | KeyCode::Enter if self.on_assistant_tab() => {
                self.mode = AppMode::Compose;
                self.input.clear();
                Action::None
            }
            KeyCode::Char('c') if self.on_assistant_tab() => {
                self.scroll_back = 0;
                Action::Dispatch(SessionEvent::CycleContext)
            }
            KeyCode::Char('k') | KeyCode::Up if self.on_assistant_tab() => {
                self.scroll_back = self
                    .scroll_back
                    .saturating_add(1)
                    .min(self.history_overflow.get());
                Action::None
            }
            KeyCode::Char('j') | KeyCode::Down if self.on_assistant_tab() => {
                self.scroll_back = self.scroll_back.saturating_sub(1);
                Action::None
            }
            KeyCode::Char('j') | KeyCode::Down => {
                self.select_next();
                Action::None
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.select_previous();
                Action::None
            }
            KeyCode::Char('g') | KeyCode::Home => {
                self.select_row(0);
                Action::None
            }
            KeyCode::Char('G') | KeyCode::End => {
                self.select_row(usize::MAX);
                Action::None
            }
            _ => Action::None,
        }
    }

    fn handle_input_key(&mut self, code: KeyCode) -> Action {
        match code {
            KeyCode::Esc => {
                self.mode = AppMode::Normal;
                self.input.clear();
                Action::None
            }
            KeyCode::Enter => {
                let text = std::mem::take(&mut self.input);
                let mode = std::mem::replace(&mut self.mode, AppMode::Normal);
                let text = text.trim();
                if text.is_empty() {
                    return Action::None;
                }
                match mode {
                    AppMode::Compose => {
                        self.scroll_back = 0;
                        Action::Dispatch(SessionEvent::Submit(text.to_string()))
                    }
                    _ => Action::Dispatch(SessionEvent::Upload(PathBuf::from(text))),
                }
            }
            KeyCode::Backspace => {
                self.input.pop();
                Action::None
            }
            KeyCode::Char(c) => {
                self.input.push(c);
                Action::None
            }
            _ => Action::None,
        }
    }

    /// Apply a session event and reflect its outcome in the UI state.
    pub async fn apply(&mut self, event: SessionEvent) {
        let uploading = matches!(event, SessionEvent::Upload(_));
        self.waiting = matches!(event, SessionEvent::Submit(_));

        match self.session.dispatch(event).await {
            Ok(()) if uploading => {
                self.selected_rows.remove(UPLOADED_CSV);
                self.current_tab = 0;
            }
            Ok(()) => {}
            Err(e) => {
                tracing::warn!(error = %e, "upload failed");
                self.error_message = Some(e.to_string());
            }
        }
        self.waiting = false;
    }
}

pub async fn run_tui(session: Session) -> eyre::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(session);
    let res = run_app(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> eyre::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match app.handle_key(key.code) {
                Action::Quit => break,
                Action::None => {}
                Action::Dispatch(event) => {
                    if matches!(event, SessionEvent::Submit(_)) {
                        // show the pending state before blocking on the reply
                        app.waiting = true;
                        terminal.draw(|f| ui(f, app))?;
                    }
                    app.apply(event).await;
                }
            }
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

pub fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    let titles: Vec<Line> = app
        .tab_titles()
        .into_iter()
        .enumerate()
        .map(|(i, t)| {
            let style = if i == app.current_tab {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            Line::from(Span::styled(t, style))
        })
        .collect();

    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("AI Portfolio Chat"),
        )
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(Color::Yellow))
        .select(app.current_tab);
    f.render_widget(tabs, chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(34), Constraint::Min(0)])
        .split(chunks[1]);

    render_profile(f, body[0], app);

    match app.current_portfolio() {
        Some(portfolio) => render_portfolio(f, body[1], portfolio, app.selected_row()),
        None => render_assistant(f, body[1], app),
    }

    render_help(f, chunks[2], app);

    if let Some(error) = &app.error_message {
        render_error_popup(f, error);
    }
}

fn render_profile(f: &mut Frame, area: Rect, app: &App) {
    let profile = app.session.profile();
    let label = Style::default().fg(Color::Gray);
    let value = Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD);

    let upload = match (app.mode, app.session.upload_path()) {
        (AppMode::Upload, _) => format!("{}▌", app.input),
        (_, Some(path)) => path.display().to_string(),
        (_, None) => "none".to_string(),
    };

    let items = vec![
        ListItem::new(Line::from(vec![
            Span::styled("Risk Tolerance [r]  ", label),
            Span::styled(profile.risk.as_str(), value),
        ])),
        ListItem::new(Line::from(vec![
            Span::styled("Tax Sensitivity [t] ", label),
            Span::styled(profile.tax.as_str(), value),
        ])),
        ListItem::new(Line::from(vec![
            Span::styled("Horizon [y]         ", label),
            Span::styled(profile.horizon.as_str(), value),
        ])),
        ListItem::new(""),
        ListItem::new(Span::styled("Upload CSV [u]", label)),
        ListItem::new(Span::styled(upload, Style::default().fg(Color::White))),
    ];

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Investor Profile"),
    );
    f.render_widget(list, area);
}

fn render_portfolio(f: &mut Frame, area: Rect, portfolio: &Portfolio, selected: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(7), Constraint::Min(0)])
        .split(area);

    let valuation = portfolio.valuation();
    let total = format_dollars(valuation.total_value);

    let total_block = Block::default()
        .borders(Borders::ALL)
        .title("Total Value")
        .title_alignment(Alignment::Center);
    let inner = total_block.inner(chunks[0]);
    f.render_widget(total_block, chunks[0]);

    // roughly four columns per character at quadrant size
    let text_width = total.len() as u16 * 4;
    let centered = if text_width < inner.width {
        let margin = (inner.width - text_width) / 2;
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(margin),
                Constraint::Min(0),
                Constraint::Length(margin),
            ])
            .split(inner)[1]
    } else {
        inner
    };

    let big_text = BigText::builder()
        .pixel_size(PixelSize::Quadrant)
        .style(
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )
        .lines(vec![total.into()])
        .build();
    f.render_widget(big_text, centered);

    let header_cells = ["Symbol", "Quantity", "Cost", "Current", "Value", "Gain/Loss"]
        .iter()
        .map(|h| {
            Cell::from(*h).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        });
    let header = Row::new(header_cells).height(1).bottom_margin(1);

    let rows = valuation.rows.iter().map(|row| {
        let gain_color = if row.gain_loss >= 0.0 {
            Color::Green
        } else {
            Color::Red
        };
        Row::new(vec![
            Cell::from(row.position.get_symbol().to_string()),
            Cell::from(format_amount(row.position.get_quantity())),
            Cell::from(format!("{:.2}", row.position.get_cost())),
            Cell::from(format!("{:.2}", row.position.get_current())),
            Cell::from(format!("{:.2}", row.value)),
            Cell::from(format!("{:.2}", row.gain_loss)).style(Style::default().fg(gain_color)),
        ])
    });

    let widths = [
        Constraint::Length(7),
        Constraint::Percentage(16),
        Constraint::Percentage(14),
        Constraint::Percentage(14),
        Constraint::Percentage(20),
        Constraint::Percentage(22),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Portfolio: {}", portfolio.name)),
        )
        .style(Style::default().fg(Color::White))
        .row_highlight_style(Style::default().bg(Color::DarkGray));

    // the table scrolls itself so the selected row stays visible
    let mut state = TableState::default().with_selected(Some(selected));
    f.render_stateful_widget(table, chunks[1], &mut state);
}

fn history_lines(app: &App) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    for message in app.session.history() {
        let (label, color) = match message.role {
            Role::User => ("you", Color::Cyan),
            Role::Assistant => ("assistant", Color::Green),
            Role::System => ("system", Color::Gray),
        };
        lines.push(Line::from(vec![
            Span::styled(
                format!("{} ", message.sent_at.format("%H:%M")),
                Style::default().fg(Color::DarkGray),
            ),
            Span::styled(
                label,
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ),
        ]));
        for text in message.content.lines() {
            lines.push(Line::from(text.to_string()));
        }
        lines.push(Line::from(""));
    }

    if app.waiting {
        lines.push(Line::from(Span::styled(
            "Waiting for the assistant...",
            Style::default().fg(Color::Yellow),
        )));
    }
    lines
}

fn render_assistant(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(area);

    let context = app.session.context();
    let history_block = Block::default().borders(Borders::ALL).title(format!(
        "Ask Me Anything - {} ({} messages, {}) [c: switch]",
        context,
        app.session.conversations().get(context).len(),
        app.session.model()
    ));
    let inner = history_block.inner(chunks[0]);
    f.render_widget(history_block, chunks[0]);

    let history = Paragraph::new(history_lines(app)).wrap(Wrap { trim: false });

    // keep the newest messages in view unless scrolled back
    let overflow = history
        .line_count(inner.width)
        .saturating_sub(inner.height as usize);
    let overflow = u16::try_from(overflow).unwrap_or(u16::MAX);
    app.history_overflow.set(overflow);
    let top = overflow - app.scroll_back.min(overflow);

    f.render_widget(history.scroll((top, 0)), inner);

    let (input_text, input_style) = match app.mode {
        AppMode::Compose => (format!("{}▌", app.input), Style::default().fg(Color::White)),
        _ => (
            "Ask anything: market, taxes, advice... (i to type)".to_string(),
            Style::default().fg(Color::DarkGray),
        ),
    };
    let input = Paragraph::new(input_text)
        .style(input_style)
        .block(Block::default().borders(Borders::ALL).title("Message"));
    f.render_widget(input, chunks[1]);
}

fn render_help(f: &mut Frame, area: Rect, app: &App) {
    let text = match app.mode {
        AppMode::Normal if app.on_assistant_tab() => {
            "i (type) | c (conversation) | j/k (scroll) | h/l (tabs) | r/t/y (profile) | u (upload) | q (quit)"
        }
        AppMode::Normal => "h/l (tabs) | 1-9 (direct) | j/k (rows) | r/t/y (profile, shift: back) | u (upload CSV) | q (quit)",
        AppMode::Compose => "Enter (send) | Esc (cancel)",
        AppMode::Upload => "Type a CSV path | Enter (load) | Esc (cancel)",
    };
    let help = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Help"))
        .style(Style::default().fg(Color::Gray))
        .alignment(Alignment::Center);
    f.render_widget(help, area);
}

fn render_error_popup(f: &mut Frame, error: &str) {
    let popup_area = centered_rect(60, 20, f.area());
    f.render_widget(Clear, popup_area);

    let error_paragraph = Paragraph::new(error)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Error")
                .style(Style::default().fg(Color::Red)),
        )
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    f.render_widget(error_paragraph, popup_area);
}

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
