//! Retreever TUI - terminal explorer for self-documented HTTP APIs
//!
//! Architecture:
//! - UI Layer (Ratatui) - synchronous terminal rendering
//! - App Layer - session state machine processing events
//! - Network Layer (Tokio) - async HTTP execution
//! - Sync Layer (Tokio) - document/environment reconciliation and heartbeat

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{prelude::*, widgets::*};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use retreever_tui::app::{AppActor, AppState};
use retreever_tui::config::{Config, LOG_FILE};
use retreever_tui::content_type::BodyKind;
use retreever_tui::messages::ui_events::key_to_ui_event;
use retreever_tui::messages::{
    EditTarget, EndpointRow, InputMode, NetworkCommand, NetworkResponse, Panel, RenderState,
    SyncCommand, SyncEvent, UiEvent,
};
use retreever_tui::network::{HttpApi, HttpTransport, NetworkActor};
use retreever_tui::session::{Editing, FormValue, KeyValueEntry, TabDoc};
use retreever_tui::storage::Storage;
use retreever_tui::sync::SyncActor;
use retreever_tui::ui::{self, ListRow};

/// Terminal cleanup guard
struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = Config::load(&args)?;

    // Initialize logging to file
    let log_dir = match std::fs::create_dir_all(&config.data_dir) {
        Ok(()) => config.data_dir.clone(),
        Err(_) => ".".into(),
    };
    let file_appender = tracing_appender::rolling::never(&log_dir, LOG_FILE);
    let (non_blocking, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    tracing::info!(base_url = %config.base_url, data_dir = %config.data_dir.display(), "Starting");

    let storage = Storage::open(config.storage_dir());
    let mut state = AppState::new(storage.clone(), config.debounce());
    state.restore().await;

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let _guard = TerminalGuard;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Create channels
    let (ui_tx, ui_rx) = mpsc::unbounded_channel::<UiEvent>();
    let (net_cmd_tx, net_cmd_rx) = mpsc::unbounded_channel::<NetworkCommand>();
    let (net_resp_tx, net_resp_rx) = mpsc::unbounded_channel::<NetworkResponse>();
    let (sync_cmd_tx, sync_cmd_rx) = mpsc::unbounded_channel::<SyncCommand>();
    let (sync_event_tx, sync_event_rx) = mpsc::unbounded_channel::<SyncEvent>();
    let (render_tx, mut render_rx) = mpsc::unbounded_channel::<RenderState>();
    let token = CancellationToken::new();

    // Spawn network actor
    let transport = Arc::new(HttpTransport::new(config.request_timeout()));
    tokio::spawn(NetworkActor::new(transport, net_resp_tx).run(net_cmd_rx));

    // Spawn sync actor
    let api = Arc::new(HttpApi::new(&config.base_url, config.request_timeout()));
    let sync_actor = SyncActor::new(api, &storage, sync_event_tx, config.heartbeat(), token.clone());
    tokio::spawn(sync_actor.run(sync_cmd_rx));

    // Spawn app actor
    let app_actor = AppActor::new(state, net_cmd_tx, sync_cmd_tx, render_tx, token);
    let app_handle = tokio::spawn(app_actor.run(ui_rx, net_resp_rx, sync_event_rx));

    // Run UI loop (synchronous with async polling)
    run_ui_loop(&mut terminal, ui_tx, &mut render_rx).await?;

    // pending session writes are flushed by the app actor on quit
    let _ = app_handle.await;
    Ok(())
}

/// Run the synchronous UI rendering loop
async fn run_ui_loop(
    terminal: &mut Terminal<impl Backend>,
    ui_tx: mpsc::UnboundedSender<UiEvent>,
    render_rx: &mut mpsc::UnboundedReceiver<RenderState>,
) -> anyhow::Result<()> {
    let mut current_state = RenderState::default();

    loop {
        terminal.draw(|f| draw_ui(f, &current_state))?;

        // Poll for events with timeout
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if let Some(event) = key_to_ui_event(
                    key,
                    current_state.active_panel,
                    current_state.input_mode,
                    current_state.show_help,
                    current_state.show_attach_input,
                ) {
                    let quit = matches!(event, UiEvent::Quit);
                    let _ = ui_tx.send(event);
                    if quit {
                        break;
                    }
                }
            }
        }

        // Check for state updates (non-blocking)
        while let Ok(state) = render_rx.try_recv() {
            current_state = state;
        }
    }

    Ok(())
}

// ============================================================================
// UI Drawing Functions
// ============================================================================

fn draw_ui(f: &mut Frame, state: &RenderState) {
    let area = f.area();

    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Session strip
            Constraint::Min(0),    // Content
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    draw_session_strip(f, state, main_chunks[0]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(main_chunks[1]);

    let var_height = (state.vars.len() as u16 + 2).clamp(3, 10);
    let sidebar = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(var_height)])
        .split(columns[0]);
    draw_endpoints(f, state, sidebar[0]);
    draw_variables(f, state, sidebar[1]);

    match &state.session {
        Some(tab) => {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3),  // URL
                    Constraint::Length(10), // Params / Headers / Body
                    Constraint::Min(5),     // Response
                ])
                .split(columns[1]);
            draw_url_bar(f, state, tab, chunks[0]);
            draw_request_section(f, state, tab, chunks[1]);
            draw_response(f, state, tab, chunks[2]);
        }
        None => {
            let hint = Paragraph::new("No open session.\n\nSelect an endpoint and press Enter.")
                .block(Block::default().borders(Borders::ALL).title(" Request "))
                .style(Style::default().fg(Color::DarkGray));
            f.render_widget(hint, columns[1]);
        }
    }

    draw_status_bar(f, state, main_chunks[2]);

    // Popups
    if state.show_help {
        draw_help_popup(f, area);
    }
    if state.show_attach_input {
        draw_attach_popup(f, state, area);
    }
}

fn draw_session_strip(f: &mut Frame, state: &RenderState, area: Rect) {
    if state.tabs.is_empty() {
        let title = state.doc_title.as_deref().unwrap_or("retreever");
        f.render_widget(
            Paragraph::new(format!(" {} ", title)).style(Style::default().fg(Color::DarkGray)),
            area,
        );
        return;
    }
    f.render_widget(ui::render_tabs(&state.tabs), area);
}

fn draw_endpoints(f: &mut Frame, state: &RenderState, area: Rect) {
    let is_focused = state.active_panel == Panel::Endpoints;

    let mut selected = None;
    let mut endpoint_index = 0;
    let items: Vec<ListItem> = state
        .endpoints
        .iter()
        .enumerate()
        .map(|(i, row)| match row {
            EndpointRow::Group(name) => {
                ListItem::new(Line::styled(name.clone(), Style::default().bold()))
            }
            EndpointRow::Endpoint {
                method,
                name,
                secured,
                open,
                ..
            } => {
                if endpoint_index == state.selected_endpoint {
                    selected = Some(i);
                }
                endpoint_index += 1;
                ListItem::new(Line::from(vec![
                    Span::raw(if *open { " ● " } else { "   " }),
                    Span::styled(
                        format!("{:6}", method.as_str()),
                        Style::default().fg(ui::method_color(*method)).bold(),
                    ),
                    Span::raw(format!(" {}{}", name, if *secured { " 🔒" } else { "" })),
                ]))
            }
        })
        .collect();

    let title = match &state.doc_title {
        Some(t) => format!(" {} ", t),
        None => " Endpoints (loading...) ".to_string(),
    };
    let highlight_style = if is_focused {
        Style::default().fg(Color::Yellow).bold()
    } else {
        Style::default()
    };
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(ui::focus_style(is_focused))
                .title(title),
        )
        .highlight_style(highlight_style);

    let mut list_state = ListState::default();
    list_state.select(selected);
    f.render_stateful_widget(list, area, &mut list_state);
}

fn draw_variables(f: &mut Frame, state: &RenderState, area: Rect) {
    let is_focused = state.active_panel == Panel::Variables;
    let rows: Vec<ListRow> = state
        .vars
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let editing = is_focused && i == state.selected_var;
            let (key, value) = match state.edit_target {
                Some(EditTarget::VarName) if editing => (state.input.as_str(), v.value.clone()),
                Some(EditTarget::VarValue) if editing => (v.name.as_str(), state.input.clone()),
                _ => (v.name.as_str(), v.value.clone()),
            };
            ListRow {
                key,
                value,
                ignored: false,
                local: v.local,
            }
        })
        .collect();
    let list = ui::render_key_value_list(
        &rows,
        " Variables (e:value k:name d:del) ".to_string(),
        Some(state.selected_var),
        is_focused,
    );
    f.render_widget(list, area);
}

fn editing(state: &RenderState, target: EditTarget) -> bool {
    state.input_mode == InputMode::Editing && state.edit_target == Some(target)
}

fn draw_url_bar(f: &mut Frame, state: &RenderState, tab: &TabDoc, area: Rect) {
    let is_editing = editing(state, EditTarget::Url);
    let border_style = if is_editing {
        Style::default().fg(Color::Yellow)
    } else {
        ui::focus_style(state.active_panel == Panel::Request)
    };

    let loading = if state.is_loading { " [...]" } else { "" };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(format!(" {} {}{} ", tab.method, tab.name, loading))
        .title_style(Style::default().fg(ui::method_color(tab.method)).bold());

    let url = if is_editing {
        state.input.as_str()
    } else {
        tab.request.url.as_str()
    };
    f.render_widget(Paragraph::new(url).block(block), area);

    if is_editing {
        let max_x = area.x + area.width.saturating_sub(2);
        let cursor_x = (area.x + state.cursor_position as u16 + 1).min(max_x);
        f.set_cursor_position(Position::new(cursor_x, area.y + 1));
    }
}

fn draw_request_section(f: &mut Frame, state: &RenderState, tab: &TabDoc, area: Rect) {
    let req = &tab.request;
    let is_focused = state.active_panel == Panel::Request;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(area);

    let body_title = format!("Body ({})", req.body_kind.label());
    let titles = vec![
        Line::from("Params"),
        Line::from("Headers"),
        Line::from(body_title),
    ];
    let selected = match req.editing {
        Editing::Params => 0,
        Editing::Headers => 1,
        Editing::Body => 2,
    };
    let sections = Tabs::new(titles)
        .select(selected)
        .style(Style::default().fg(Color::DarkGray))
        .highlight_style(Style::default().fg(Color::Yellow).bold())
        .divider("|");
    f.render_widget(sections, chunks[0]);

    let kv_rows = |rows: &[KeyValueEntry]| -> Vec<(String, String, bool, bool)> {
        rows.iter()
            .map(|r| (r.key.clone(), r.value.clone(), r.ignore, r.local))
            .collect()
    };

    let rows = match (req.editing, req.body_kind) {
        (Editing::Params, _) => kv_rows(&req.query_params),
        (Editing::Headers, _) => kv_rows(&req.headers),
        (Editing::Body, BodyKind::FormData) => req
            .body
            .form_data
            .iter()
            .map(|r| {
                let value = match &r.value {
                    FormValue::Text(t) => t.clone(),
                    FormValue::Files(ids) => format!("📎 {} file(s)", ids.len()),
                };
                (r.key.clone(), value, r.ignore, r.local)
            })
            .collect(),
        (Editing::Body, BodyKind::UrlEncoded) => kv_rows(&req.body.url_encoded),
        (Editing::Body, kind) => {
            draw_body_text(f, state, tab, kind, chunks[1]);
            return;
        }
    };

    let list_rows: Vec<ListRow> = rows
        .iter()
        .enumerate()
        .map(|(i, (key, value, ignored, local))| {
            let selected = is_focused && i == state.selected_row;
            let (key, value) = match state.edit_target {
                Some(EditTarget::RowKey) if selected => (state.input.as_str(), value.clone()),
                Some(EditTarget::RowValue) if selected => (key.as_str(), state.input.clone()),
                _ => (key.as_str(), value.clone()),
            };
            ListRow {
                key,
                value,
                ignored: *ignored,
                local: *local,
            }
        })
        .collect();
    let list = ui::render_key_value_list(
        &list_rows,
        " e:value k:key space:ignore d:del p:section b:body f:file ".to_string(),
        Some(state.selected_row),
        is_focused,
    );
    f.render_widget(list, chunks[1]);
}

fn draw_body_text(f: &mut Frame, state: &RenderState, tab: &TabDoc, kind: BodyKind, area: Rect) {
    let is_editing = editing(state, EditTarget::Body);
    let border_style = if is_editing {
        Style::default().fg(Color::Yellow)
    } else {
        ui::focus_style(state.active_panel == Panel::Request)
    };

    let (title, content) = match kind {
        BodyKind::Raw(raw) => {
            let text = if is_editing {
                state.input.clone()
            } else {
                tab.request.body.raw.clone().unwrap_or_default()
            };
            (format!(" {} (w:edit) ", raw.label()), text)
        }
        BodyKind::Binary => {
            let text = match &tab.request.body.binary_file_id {
                Some(id) => format!("Attachment {}\n\nf: replace  d: remove", id),
                None => "No file selected.\n\nPress f to choose one.".to_string(),
            };
            (" Binary ".to_string(), text)
        }
        _ => (" Body ".to_string(), "No body. Press b to pick a body type.".to_string()),
    };

    let body = Paragraph::new(content)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title(title),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(body, area);

    if is_editing {
        let max_x = area.x + area.width.saturating_sub(2);
        let cursor_x = (area.x + state.cursor_position as u16 + 1).min(max_x);
        f.set_cursor_position(Position::new(cursor_x, area.y + 1));
    }
}

fn draw_response(f: &mut Frame, state: &RenderState, tab: &TabDoc, area: Rect) {
    let is_focused = state.active_panel == Panel::Response;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(ui::focus_style(is_focused));

    let Some(response) = &tab.last_response else {
        let hint = if state.is_loading {
            "Sending..."
        } else {
            "No response yet. Press s to send."
        };
        f.render_widget(
            Paragraph::new(hint)
                .block(block.title(" Response "))
                .style(Style::default().fg(Color::DarkGray)),
            area,
        );
        return;
    };

    let status = Span::styled(
        format!(" {} ", ui::response_summary(response)),
        Style::default().fg(ui::status_color(response.status)).bold(),
    );
    let mut footer = format!(
        " {} headers · {} cookies ",
        response.headers.len(),
        response.cookies.len()
    );
    if let Some(id) = &response.request_id {
        footer.push_str(&format!("· {} ", id));
    }

    let content = Paragraph::new(ui::body_lines(response))
        .block(
            block
                .title(status)
                .title_bottom(Line::from(footer).right_aligned()),
        )
        .wrap(Wrap { trim: false })
        .scroll((state.response_scroll, 0));
    f.render_widget(content, area);
}

fn draw_status_bar(f: &mut Frame, state: &RenderState, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(28)])
        .split(area);

    let line = if let Some(notice) = state.notices.last() {
        Span::styled(format!(" {} ", notice), Style::default().fg(Color::Red))
    } else if let Some(status) = &state.status {
        Span::styled(format!(" {} ", status), Style::default().fg(Color::Yellow))
    } else if state.input_mode == InputMode::Editing {
        Span::styled(
            " Enter/Esc:done | ←/→:move ",
            Style::default().fg(Color::DarkGray),
        )
    } else {
        Span::styled(
            " Tab:panel | Enter:open | s:send | [/]:session | x:close | r:refresh | ?:help | q:quit ",
            Style::default().fg(Color::DarkGray),
        )
    };
    f.render_widget(Paragraph::new(line), chunks[0]);
    f.render_widget(
        Paragraph::new(ui::health_span(&state.health)).alignment(Alignment::Right),
        chunks[1],
    );
}

fn draw_help_popup(f: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 80, area);

    let help_text = r#"
 RETREEVER - Keyboard Shortcuts

 NAVIGATION
   Tab / Shift+Tab    Switch panels
   ↑ / ↓              Select row / scroll response

 SESSIONS
   Enter              Open selected endpoint
   [ / ]              Previous / next session
   { / }              Move session left / right
   x / o / X          Close / close others / close all

 REQUEST
   u                  Edit URL
   p                  Cycle Params / Headers / Body
   e / k              Edit row value / key
   space              Ignore row
   d                  Delete local row
   b                  Cycle body type
   w                  Edit raw body
   f                  Attach file
   s                  Send    Ctrl+X  Cancel

 VARIABLES
   e / k / d          Edit value / name, delete

 GENERAL
   r                  Refetch document
   ?                  Toggle this help
   q / Ctrl+C         Quit

 Press any key to close...
"#;

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Help ")
        .style(Style::default().bg(Color::Black));

    let help = Paragraph::new(help_text)
        .block(block)
        .wrap(Wrap { trim: false });

    f.render_widget(Clear, popup_area);
    f.render_widget(help, popup_area);
}

fn draw_attach_popup(f: &mut Frame, state: &RenderState, area: Rect) {
    let popup_area = centered_rect(60, 20, area);

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Attach File (Enter to attach, Esc to cancel) ")
        .style(Style::default().bg(Color::Black));

    let content = if state.attach_path_input.is_empty() {
        "Enter a file path..."
    } else {
        state.attach_path_input.as_str()
    };

    let input = Paragraph::new(content)
        .block(block)
        .wrap(Wrap { trim: false });

    f.render_widget(Clear, popup_area);
    f.render_widget(input, popup_area);
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
