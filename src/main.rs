//! Terminal front end for the Pico BLE observer.
//!
//! Run with: cargo run --bin pico-observer
//!
//! ## Keyboard Controls
//!
//! | Key | Action |
//! |-----|--------|
//! | `I` | Detect and initialize the Pico over USB serial |
//! | `T` / `S` / `N` | Send test connection / status / start scan |
//! | `X` | Close the serial connection |
//! | `A` | Initialize the BLE adapter and scan |
//! | `Tab` | Cycle focus between lists |
//! | `Up/Down` | Navigate the focused list |
//! | `P` | Connect to the selected peripheral |
//! | `C` | Use the selected service/characteristic pair |
//! | `O` | Start observing notifications |
//! | `D` | Disconnect |
//! | `G` | Plot the selected device's RSSI |
//! | `?` | Show help |
//! | `Q/Esc` | Quit |

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use pico_ble_observer::{
    format_elapsed, Dialog, Error, Keyed, KeyedSelection, LogLevel, ObserverConfig,
    ObserverContext, PicoCommand, Result,
};
use ratatui::{
    prelude::*,
    widgets::{block::Title, *},
};
use std::io::{self, stdout, Stdout};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Which list receives navigation keys.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Focus {
    Peripherals,
    Characteristics,
    Devices,
}

impl Focus {
    fn next(self) -> Self {
        match self {
            Focus::Peripherals => Focus::Characteristics,
            Focus::Characteristics => Focus::Devices,
            Focus::Devices => Focus::Peripherals,
        }
    }
}

/// Front-end state around the observer context.
struct App {
    context: ObserverContext,
    focus: Focus,
    show_help: bool,
    start_time: Instant,
}

impl App {
    fn new(config: ObserverConfig) -> Self {
        let mut context = ObserverContext::new(config);
        context.log(LogLevel::Info, "Press [A] to scan for BLE devices, [I] for the Pico");

        Self {
            context,
            focus: Focus::Peripherals,
            show_help: false,
            start_time: Instant::now(),
        }
    }

    fn select_next(&mut self) {
        match self.focus {
            Focus::Peripherals => self.context.peripherals_mut().select_next(),
            Focus::Characteristics => self.context.pairs_mut().select_next(),
            Focus::Devices => self.context.devices_mut().devices_mut().select_next(),
        }
    }

    fn select_prev(&mut self) {
        match self.focus {
            Focus::Peripherals => self.context.peripherals_mut().select_prev(),
            Focus::Characteristics => self.context.pairs_mut().select_prev(),
            Focus::Devices => self.context.devices_mut().devices_mut().select_prev(),
        }
    }
}

/// Main terminal type alias
type Terminal = ratatui::Terminal<CrosstermBackend<Stdout>>;

fn setup_terminal() -> io::Result<Terminal> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

fn restore_terminal(terminal: &mut Terminal) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()
}

/// Log to a file so output doesn't interfere with the TUI.
fn init_logging() {
    let Ok(file) = std::fs::File::create("pico_observer.log") else {
        return;
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .try_init();
}

fn level_style(level: LogLevel) -> Style {
    match level {
        LogLevel::Debug => Style::default().fg(Color::DarkGray),
        LogLevel::Info => Style::default().fg(Color::Cyan),
        LogLevel::Warn => Style::default().fg(Color::Yellow),
        LogLevel::Error => Style::default().fg(Color::Red),
    }
}

fn render_ui(frame: &mut Frame, app: &App) {
    let size = frame.area();

    // Main layout: header, content, footer
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // Header
            Constraint::Min(16),    // Content
            Constraint::Length(10), // Event log
            Constraint::Length(1),  // Status bar
        ])
        .split(size);

    render_header(frame, main_chunks[0], app);
    render_content(frame, main_chunks[1], app);
    render_event_log(frame, main_chunks[2], app);
    render_status_bar(frame, main_chunks[3], app);

    if let Some(dialog) = app.context.dialog() {
        render_dialog(frame, dialog, size);
    }

    if app.show_help {
        render_help_overlay(frame, size);
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let title = format!(
        " PICO BLE OBSERVER | Devices: {} | Uptime: {} ",
        app.context.registry().len(),
        format_elapsed(app.start_time.elapsed())
    );

    let header = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Title::from(title).alignment(Alignment::Center))
        .title(
            Title::from(" [?] Help  [Q] Quit ")
                .alignment(Alignment::Right)
                .position(block::Position::Top),
        );

    frame.render_widget(header, area);
}

fn render_content(frame: &mut Frame, area: Rect, app: &App) {
    let content_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(35),
            Constraint::Percentage(30),
            Constraint::Percentage(35),
        ])
        .split(content_chunks[0]);

    render_selection(
        frame,
        left_chunks[0],
        " Peripherals ",
        app.context.peripherals(),
        app.focus == Focus::Peripherals,
    );
    render_selection(
        frame,
        left_chunks[1],
        " Service / Characteristic ",
        app.context.pairs(),
        app.focus == Focus::Characteristics,
    );
    render_selection(
        frame,
        left_chunks[2],
        " Observed Devices ",
        app.context.devices().devices(),
        app.focus == Focus::Devices,
    );

    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(10), Constraint::Length(8)])
        .split(content_chunks[1]);

    render_plot(frame, right_chunks[0], app);
    render_device_table(frame, right_chunks[1], app);
}

fn render_selection<T: Keyed>(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    selection: &KeyedSelection<T>,
    focused: bool,
) {
    let selected = selection.selected_index();
    let items: Vec<ListItem> = selection
        .items()
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let is_selected = Some(i) == selected;
            let style = if is_selected && focused {
                Style::default().bg(Color::DarkGray).fg(Color::White)
            } else if is_selected {
                Style::default().fg(Color::Green)
            } else {
                Style::default()
            };
            let icon = if is_selected { "● " } else { "○ " };
            ListItem::new(Line::from(vec![
                Span::styled(icon, style),
                Span::styled(item.label(), style),
            ]))
        })
        .collect();

    let border_style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(title.to_string()),
    );

    frame.render_widget(list, area);
}

fn render_plot(frame: &mut Frame, area: Rect, app: &App) {
    let Some(series) = app.context.devices().plot() else {
        let paragraph = Paragraph::new(vec![
            Line::from(""),
            Line::from(Span::styled(
                "Select an observed device and press [G] to plot its RSSI",
                Style::default().fg(Color::DarkGray),
            )),
        ])
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title(" RSSI "));
        frame.render_widget(paragraph, area);
        return;
    };

    let datasets = vec![Dataset::default()
        .name(series.name.clone())
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Green))
        .data(&series.points)];

    let [x_min, x_max] = series.x_bounds;
    let [y_min, y_max] = series.y_bounds;

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" RSSI over time: {} ", series.address)),
        )
        .x_axis(
            Axis::default()
                .title("Sample")
                .style(Style::default().fg(Color::Gray))
                .bounds([x_min, x_max])
                .labels(vec![format!("{:.0}", x_min), format!("{:.0}", x_max)]),
        )
        .y_axis(
            Axis::default()
                .title("RSSI (dBm)")
                .style(Style::default().fg(Color::Gray))
                .bounds([y_min, y_max])
                .labels(vec![
                    format!("{:.0}", y_min),
                    format!("{:.0}", (y_min + y_max) / 2.0),
                    format!("{:.0}", y_max),
                ]),
        );

    frame.render_widget(chart, area);
}

fn render_device_table(frame: &mut Frame, area: Rect, app: &App) {
    let rows: Vec<Row> = app
        .context
        .registry()
        .summary()
        .into_iter()
        .map(|summary| {
            let rssi_style = if summary.rssi > -50 {
                Style::default().fg(Color::Green)
            } else if summary.rssi > -80 {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::Red)
            };
            Row::new(vec![
                Cell::from(summary.label),
                Cell::from(summary.address),
                Cell::from(format!("{} dBm", summary.rssi)).style(rssi_style),
                Cell::from(format!("{}x", summary.seen)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(19),
            Constraint::Length(9),
            Constraint::Min(6),
        ],
    )
    .header(
        Row::new(vec!["Device", "MAC", "RSSI", "Seen"])
            .style(Style::default().fg(Color::Yellow)),
    )
    .block(Block::default().borders(Borders::ALL).title(" Device Table "));

    frame.render_widget(table, area);
}

fn render_event_log(frame: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .context
        .event_log()
        .entries()
        .rev()
        .take(area.height.saturating_sub(2) as usize)
        .map(|entry| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{} ", entry.timestamp.format("%H:%M:%S")),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(format!("[{}] ", entry.level.label()), level_style(entry.level)),
                Span::raw(entry.message.as_str()),
            ]))
        })
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(" Event Log "));

    frame.render_widget(list, area);
}

fn render_status_bar(frame: &mut Frame, area: Rect, app: &App) {
    let ctx = &app.context;
    let status = format!(
        " Adapter: {} | Serial: {} | Connected: {} | Observing: {} | Press ? for help ",
        ctx.adapter().map(|a| a.description.as_str()).unwrap_or("-"),
        ctx.serial_port().unwrap_or("-"),
        ctx.connected_peripheral().unwrap_or("-"),
        if ctx.is_observing() { "Yes" } else { "No" },
    );

    let paragraph =
        Paragraph::new(status).style(Style::default().bg(Color::DarkGray).fg(Color::White));

    frame.render_widget(paragraph, area);
}

fn render_dialog(frame: &mut Frame, dialog: &Dialog, area: Rect) {
    let dialog_area = centered_rect(50, 25, area);
    frame.render_widget(Clear, dialog_area);

    let content = vec![
        Line::from(""),
        Line::from(dialog.message.as_str()),
        Line::from(""),
        Line::from(Span::styled(
            "Press any key to close",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(level_style(dialog.level))
        .title(format!(" {} ", dialog.title))
        .style(Style::default().bg(Color::Black));

    let paragraph = Paragraph::new(content)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(block);

    frame.render_widget(paragraph, dialog_area);
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let help_area = centered_rect(60, 70, area);

    frame.render_widget(Clear, help_area);

    let content = vec![
        Line::from(""),
        Line::from(Span::styled(
            "Pico BLE Observer",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled("Pico (USB serial):", Style::default().fg(Color::Cyan))),
        Line::from("  I          Detect and initialize the Pico"),
        Line::from("  T          Send test connection"),
        Line::from("  S          Send status request"),
        Line::from("  N          Send start scan"),
        Line::from("  X          Close the serial connection"),
        Line::from(""),
        Line::from(Span::styled("Bluetooth:", Style::default().fg(Color::Cyan))),
        Line::from("  A          Initialize adapter and scan"),
        Line::from("  P          Connect to selected peripheral"),
        Line::from("  C          Set selected service/characteristic"),
        Line::from("  O          Observe notifications"),
        Line::from("  D          Disconnect"),
        Line::from(""),
        Line::from("Navigation:"),
        Line::from("  Tab        Cycle focused list"),
        Line::from("  ↑/↓        Move selection"),
        Line::from("  G          Plot selected device RSSI"),
        Line::from(""),
        Line::from("Application:"),
        Line::from("  ?          Toggle this help screen"),
        Line::from("  Q/Esc      Quit application"),
        Line::from(""),
        Line::from(Span::styled(
            "Press any key to close",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Help ")
        .style(Style::default().bg(Color::Black));

    let paragraph = Paragraph::new(content).block(block);

    frame.render_widget(paragraph, help_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

async fn run_app(terminal: &mut Terminal, mut app: App) -> Result<()> {
    loop {
        app.context.tick().await;

        terminal
            .draw(|frame| render_ui(frame, &app))
            .map_err(|e| Error::Internal(format!("Draw error: {}", e)))?;

        // Handle input with timeout for updates
        let has_event = event::poll(Duration::from_millis(100))
            .map_err(|e| Error::Internal(format!("Poll error: {}", e)))?;

        if !has_event {
            continue;
        }

        let event = event::read().map_err(|e| Error::Internal(format!("Read error: {}", e)))?;
        let Event::Key(key) = event else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if app.context.dialog().is_some() {
            app.context.dismiss_dialog();
            continue;
        }

        if app.show_help {
            app.show_help = false;
            continue;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => break,
            KeyCode::Char('?') => app.show_help = true,
            KeyCode::Tab => app.focus = app.focus.next(),
            KeyCode::Up => app.select_prev(),
            KeyCode::Down => app.select_next(),
            KeyCode::Char('i') | KeyCode::Char('I') => app.context.initialize_serial(),
            KeyCode::Char('t') | KeyCode::Char('T') => {
                app.context.send_command(PicoCommand::TestConnection)
            }
            KeyCode::Char('s') | KeyCode::Char('S') => {
                app.context.send_command(PicoCommand::Status)
            }
            KeyCode::Char('n') | KeyCode::Char('N') => {
                app.context.send_command(PicoCommand::StartScan)
            }
            KeyCode::Char('x') | KeyCode::Char('X') => app.context.close_serial(),
            KeyCode::Char('a') | KeyCode::Char('A') => app.context.initialize_adapter(),
            KeyCode::Char('p') | KeyCode::Char('P') => app.context.set_peripheral(),
            KeyCode::Char('c') | KeyCode::Char('C') => app.context.set_characteristic(),
            KeyCode::Char('o') | KeyCode::Char('O') => app.context.start_observing(),
            KeyCode::Char('d') | KeyCode::Char('D') => app.context.disconnect(),
            KeyCode::Char('g') | KeyCode::Char('G') => app.context.graph_selected(),
            _ => {}
        }
    }

    app.context.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    info!("Starting pico-observer");

    let mut terminal = setup_terminal()
        .map_err(|e| Error::Internal(format!("Failed to setup terminal: {}", e)))?;

    let app = App::new(ObserverConfig::default());
    let result = run_app(&mut terminal, app).await;

    let _ = restore_terminal(&mut terminal);

    result
}
