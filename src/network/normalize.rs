//! Canonical response model
//!
//! Any raw HTTP answer, including the synthetic one produced for a
//! network failure, is normalised into [`NormalizedResponse`].

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Payload as received, before it is captured as text
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Empty,
    Text(String),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RawHttpResponse {
    pub status: u16,
    pub status_text: String,
    /// As received; names in any case, repeated names allowed
    pub headers: Vec<(String, String)>,
    pub payload: Payload,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timing {
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn parse(s: &str) -> Option<SameSite> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(SameSite::Strict),
            "lax" => Some(SameSite::Lax),
            "none" => Some(SameSite::None),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieEntry {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: String,
    pub max_age: Option<i64>,
    pub expires: Option<DateTime<Utc>>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
    /// Added on the client rather than parsed from a response
    pub local: bool,
}

/// How the response body should be displayed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewMode {
    Json,
    Xml,
    Html,
    Text,
    /// Binary or unknown; preview only
    Auto,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    pub status: u16,
    pub status_text: String,
    /// Lowercased names; repeated headers joined with `", "`
    pub headers: BTreeMap<String, String>,
    pub cookies: Vec<CookieEntry>,
    pub body: String,
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub size_bytes: usize,
    /// Bytes per millisecond
    pub transfer_speed: Option<f64>,
    pub content_type: String,
    pub view_mode: ViewMode,
    pub request_id: Option<String>,
}

impl NormalizedResponse {
    pub fn is_network_error(&self) -> bool {
        self.status == 0
    }
}

pub fn normalize(raw: RawHttpResponse, timing: Timing) -> NormalizedResponse {
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in &raw.headers {
        headers
            .entry(name.to_ascii_lowercase())
            .and_modify(|v| {
                v.push_str(", ");
                v.push_str(value);
            })
            .or_insert_with(|| value.clone());
    }

    let cookies = raw
        .headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("set-cookie"))
        .filter_map(|(_, value)| parse_set_cookie(value))
        .collect();

    let content_type = headers
        .get("content-type")
        .cloned()
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    // text is kept exactly as received; size counts received bytes
    let (body, size_bytes) = match raw.payload {
        Payload::Empty => (String::new(), 0),
        Payload::Text(text) => {
            let size = text.len();
            (text, size)
        }
        Payload::Json(value) => {
            let text = serde_json::to_string(&value).unwrap_or_else(|_| value.to_string());
            let size = text.len();
            (text, size)
        }
        Payload::Bytes(bytes) => (String::from_utf8_lossy(&bytes).into_owned(), bytes.len()),
    };

    let transfer_speed =
        (timing.duration_ms > 0.0).then(|| size_bytes as f64 / timing.duration_ms);

    NormalizedResponse {
        status: raw.status,
        status_text: raw.status_text,
        request_id: headers.get("x-request-id").cloned(),
        view_mode: view_mode(&content_type),
        headers,
        cookies,
        body,
        duration_ms: timing.duration_ms,
        timestamp: timing.timestamp,
        size_bytes,
        transfer_speed,
        content_type,
    }
}

pub fn view_mode(content_type: &str) -> ViewMode {
    let t = content_type.to_ascii_lowercase();
    if t.contains("application/json") {
        ViewMode::Json
    } else if t.contains("application/xml") || t.contains("text/xml") {
        ViewMode::Xml
    } else if t.contains("text/html") {
        ViewMode::Html
    } else if t.starts_with("text/") {
        ViewMode::Text
    } else {
        ViewMode::Auto
    }
}

/// Parse one `Set-Cookie` value. Unknown attributes are skipped; a value
/// without a cookie name yields `None`.
pub fn parse_set_cookie(header: &str) -> Option<CookieEntry> {
    let mut parts = header.split(';').map(str::trim);
    let first = parts.next()?;
    let (name, value) = first.split_once('=').unwrap_or((first, ""));
    if name.trim().is_empty() {
        return None;
    }

    let mut cookie = CookieEntry {
        name: name.trim().to_string(),
        value: value.trim().to_string(),
        domain: None,
        path: "/".to_string(),
        max_age: None,
        expires: None,
        secure: false,
        http_only: false,
        same_site: None,
        local: false,
    };

    for attr in parts {
        let (key, val) = match attr.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (attr, None),
        };
        match key.to_ascii_lowercase().as_str() {
            "path" => {
                if let Some(v) = val.filter(|v| !v.is_empty()) {
                    cookie.path = v.to_string();
                }
            }
            "domain" => cookie.domain = val.map(String::from),
            "secure" => cookie.secure = true,
            "httponly" => cookie.http_only = true,
            "samesite" => cookie.same_site = val.and_then(SameSite::parse),
            "max-age" => cookie.max_age = val.and_then(|v| v.parse().ok()),
            "expires" => cookie.expires = val.and_then(parse_cookie_date),
            _ => {}
        }
    }
    Some(cookie)
}

fn parse_cookie_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Netscape style: Wed, 21-Oct-2015 07:28:00 GMT
    NaiveDateTime::parse_from_str(s, "%a, %d-%b-%Y %H:%M:%S GMT")
        .ok()
        .map(|n| n.and_utc())
}

/// Duration rounded to a tenth of a millisecond.
pub fn round_duration(ms: f64) -> f64 {
    (ms * 10.0).round() / 10.0
}

pub fn format_duration(ms: f64) -> String {
    if ms < 1000.0 {
        format!("{:.1} ms", ms)
    } else {
        format!("{:.2} s", ms / 1000.0)
    }
}

pub fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// `"-"` when either value is zero.
pub fn format_transfer_speed(bytes: usize, ms: f64) -> String {
    if bytes == 0 || ms <= 0.0 {
        return "-".to_string();
    }
    let per_sec = bytes as f64 / ms * 1000.0;
    if per_sec < 1024.0 {
        format!("{:.1} B/s", per_sec)
    } else if per_sec < 1024.0 * 1024.0 {
        format!("{:.2} KB/s", per_sec / 1024.0)
    } else {
        format!("{:.2} MB/s", per_sec / (1024.0 * 1024.0))
    }
}
