//! Widget helpers shared by the drawing code

use ratatui::{prelude::*, widgets::*};

use crate::messages::render::{Health, TabView};
use crate::models::HttpMethod;
use crate::network::normalize::{format_duration, format_size, format_transfer_speed};
use crate::network::{NormalizedResponse, ViewMode};

/// One row of a key/value list
pub struct ListRow<'a> {
    pub key: &'a str,
    pub value: String,
    pub ignored: bool,
    /// Local rows are shown in a different colour from schema rows
    pub local: bool,
}

/// Renders a key-value list (query params, headers, form fields, variables)
pub fn render_key_value_list<'a>(
    rows: &[ListRow<'a>],
    title: String,
    selected: Option<usize>,
    is_focused: bool,
) -> List<'a> {
    let items: Vec<ListItem> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut style = if row.ignored {
                Style::default().fg(Color::DarkGray)
            } else if row.local {
                Style::default()
            } else {
                Style::default().fg(Color::Cyan)
            };
            if is_focused && Some(i) == selected {
                style = style.fg(Color::Yellow).bold();
            }

            let prefix = if row.ignored { "[ ]" } else { "[x]" };
            let key = if row.key.is_empty() { "<new>" } else { row.key };
            ListItem::new(format!("{} {}: {}", prefix, key, row.value)).style(style)
        })
        .collect();

    List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(focus_style(is_focused))
            .title(title),
    )
}

pub fn focus_style(is_focused: bool) -> Style {
    if is_focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    }
}

/// Renders the session strip
pub fn render_tabs(tabs: &[TabView]) -> Tabs<'static> {
    let titles: Vec<Line> = tabs
        .iter()
        .map(|t| {
            let busy = if t.loading { " …" } else { "" };
            Line::from(vec![
                Span::styled(
                    format!("{} ", t.method),
                    Style::default().fg(method_color(t.method)),
                ),
                Span::raw(format!("{}{}", t.name, busy)),
            ])
        })
        .collect();
    let selected = tabs.iter().position(|t| t.active).unwrap_or(0);

    Tabs::new(titles)
        .select(selected)
        .style(Style::default().fg(Color::DarkGray))
        .highlight_style(Style::default().fg(Color::Yellow).bold())
        .divider("|")
}

/// Simple JSON syntax highlighting
pub fn highlight_json(text: &str) -> Vec<Line<'static>> {
    text.lines().map(highlight_json_line).collect()
}

fn highlight_json_line(line: &str) -> Line<'static> {
    let mut spans = Vec::new();
    let mut plain = String::new();
    let mut chars = line.char_indices();

    while let Some((start, c)) = chars.next() {
        match c {
            '"' => {
                flush(&mut spans, &mut plain);
                let mut end = line.len();
                let mut escaped = false;
                for (i, ch) in chars.by_ref() {
                    if escaped {
                        escaped = false;
                    } else if ch == '\\' {
                        escaped = true;
                    } else if ch == '"' {
                        end = i + 1;
                        break;
                    }
                }
                let is_key = line[end..].trim_start().starts_with(':');
                let color = if is_key { Color::Cyan } else { Color::Green };
                spans.push(Span::styled(
                    line[start..end].to_string(),
                    Style::default().fg(color),
                ));
            }
            '{' | '}' | '[' | ']' => {
                flush(&mut spans, &mut plain);
                spans.push(Span::styled(c.to_string(), Style::default().fg(Color::Yellow)));
            }
            _ => plain.push(c),
        }
    }
    flush(&mut spans, &mut plain);
    Line::from(spans)
}

/// Push pending unquoted text, colouring literals.
fn flush(spans: &mut Vec<Span<'static>>, plain: &mut String) {
    if plain.is_empty() {
        return;
    }
    let text = std::mem::take(plain);
    let token = text.trim().trim_end_matches(',').trim_start_matches(':').trim();
    let style = match token {
        "true" | "false" | "null" => Style::default().fg(Color::Magenta),
        t if !t.is_empty() && t.parse::<f64>().is_ok() => Style::default().fg(Color::Yellow),
        _ => Style::default(),
    };
    spans.push(Span::styled(text, style));
}

/// Body lines for the response viewer, pretty-printed when JSON.
pub fn body_lines(response: &NormalizedResponse) -> Vec<Line<'static>> {
    match response.view_mode {
        ViewMode::Json => {
            let pretty = serde_json::from_str::<serde_json::Value>(&response.body)
                .and_then(|v| serde_json::to_string_pretty(&v))
                .unwrap_or_else(|_| response.body.clone());
            highlight_json(&pretty)
        }
        ViewMode::Auto if response.body.is_empty() && response.size_bytes > 0 => {
            vec![Line::styled(
                format!("<{} of binary data>", format_size(response.size_bytes)),
                Style::default().fg(Color::DarkGray),
            )]
        }
        _ => response
            .body
            .lines()
            .map(|l| Line::raw(l.to_string()))
            .collect(),
    }
}

/// `"200 OK · 12.3 ms · 1.2 KB · 98.00 KB/s"`
pub fn response_summary(response: &NormalizedResponse) -> String {
    if response.is_network_error() {
        return format!("{} · {}", response.status_text, format_duration(response.duration_ms));
    }
    format!(
        "{} {} · {} · {} · {}",
        response.status,
        response.status_text,
        format_duration(response.duration_ms),
        format_size(response.size_bytes),
        format_transfer_speed(response.size_bytes, response.duration_ms),
    )
}

pub fn health_span(health: &Health) -> Span<'static> {
    match health.online {
        Some(true) => Span::styled(
            format!(" ● online (up {}) ", health.uptime.as_deref().unwrap_or("?")),
            Style::default().fg(Color::Green),
        ),
        Some(false) => Span::styled(" ● offline ", Style::default().fg(Color::Red)),
        None => Span::styled(" ○ connecting ", Style::default().fg(Color::DarkGray)),
    }
}

/// Status code color
pub fn status_color(code: u16) -> Color {
    match code {
        0 => Color::Red,
        200..=299 => Color::Green,
        300..=399 => Color::Cyan,
        400..=499 => Color::Yellow,
        _ => Color::Magenta,
    }
}

/// Method color
pub fn method_color(method: HttpMethod) -> Color {
    match method {
        HttpMethod::GET => Color::Green,
        HttpMethod::POST => Color::Yellow,
        HttpMethod::PUT => Color::Blue,
        HttpMethod::PATCH => Color::Cyan,
        HttpMethod::DELETE => Color::Red,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::normalize::{normalize, Payload, RawHttpResponse, Timing};

    fn styled(line: &Line, text: &str) -> Option<Color> {
        line.spans
            .iter()
            .find(|s| s.content.contains(text))
            .and_then(|s| s.style.fg)
    }

    #[test]
    fn test_highlight_json_keys_and_values() {
        let lines = highlight_json(r#"  "name": "a \"b\"", "n": 4, "ok": true"#);
        let line = &lines[0];
        assert_eq!(styled(line, "\"name\""), Some(Color::Cyan));
        assert_eq!(styled(line, "a \\\"b"), Some(Color::Green));
        assert_eq!(styled(line, "true"), Some(Color::Magenta));
        assert_eq!(styled(line, "4"), Some(Color::Yellow));
    }

    #[test]
    fn test_json_body_is_pretty_printed() {
        let response = normalize(
            RawHttpResponse {
                status: 200,
                status_text: "OK".into(),
                headers: vec![("Content-Type".into(), "application/json".into())],
                payload: Payload::Text(r#"{"a":1,"b":[2]}"#.into()),
            },
            Timing {
                duration_ms: 10.0,
                timestamp: chrono::Utc::now(),
            },
        );
        assert!(body_lines(&response).len() > 1);
        assert!(response_summary(&response).starts_with("200 OK · 10.0 ms"));
    }
}
