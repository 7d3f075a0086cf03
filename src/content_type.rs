//! Maps a MIME string to the body editing mode it implies.

use serde::{Deserialize, Serialize};

/// Flavour of a raw text body
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawKind {
    Text,
    Json,
    Xml,
    Html,
    JavaScript,
}

impl RawKind {
    pub const ALL: [RawKind; 5] = [
        RawKind::Text,
        RawKind::Json,
        RawKind::Xml,
        RawKind::Html,
        RawKind::JavaScript,
    ];

    /// Content type sent for this flavour when the user set none.
    pub fn mime(&self) -> &'static str {
        match self {
            RawKind::Text => "text/plain",
            RawKind::Json => "application/json",
            RawKind::Xml => "application/xml",
            RawKind::Html => "text/html",
            RawKind::JavaScript => "application/javascript",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RawKind::Text => "Text",
            RawKind::Json => "JSON",
            RawKind::Xml => "XML",
            RawKind::Html => "HTML",
            RawKind::JavaScript => "JavaScript",
        }
    }
}

/// How a session's body is encoded on the wire
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "raw")]
pub enum BodyKind {
    #[default]
    None,
    Raw(RawKind),
    FormData,
    UrlEncoded,
    Binary,
}

impl BodyKind {
    pub fn label(&self) -> &'static str {
        match self {
            BodyKind::None => "none",
            BodyKind::Raw(_) => "raw",
            BodyKind::FormData => "form-data",
            BodyKind::UrlEncoded => "x-www-form-urlencoded",
            BodyKind::Binary => "binary",
        }
    }

    /// Next mode in the editor's cycle order.
    pub fn next(&self) -> BodyKind {
        match self {
            BodyKind::None => BodyKind::Raw(RawKind::Json),
            BodyKind::Raw(RawKind::Json) => BodyKind::Raw(RawKind::Text),
            BodyKind::Raw(RawKind::Text) => BodyKind::Raw(RawKind::Xml),
            BodyKind::Raw(RawKind::Xml) => BodyKind::Raw(RawKind::Html),
            BodyKind::Raw(RawKind::Html) => BodyKind::Raw(RawKind::JavaScript),
            BodyKind::Raw(RawKind::JavaScript) => BodyKind::FormData,
            BodyKind::FormData => BodyKind::UrlEncoded,
            BodyKind::UrlEncoded => BodyKind::Binary,
            BodyKind::Binary => BodyKind::None,
        }
    }
}

/// Resolve a MIME string into a body kind.
///
/// Parameters (`; charset=...`) and case are ignored. Unknown or empty input
/// yields [`BodyKind::None`].
pub fn resolve(mime: &str) -> BodyKind {
    let essence = mime
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "" => BodyKind::None,
        "application/json" => BodyKind::Raw(RawKind::Json),
        "application/xml" | "text/xml" => BodyKind::Raw(RawKind::Xml),
        "text/html" => BodyKind::Raw(RawKind::Html),
        "application/javascript" | "text/javascript" => BodyKind::Raw(RawKind::JavaScript),
        "multipart/form-data" => BodyKind::FormData,
        "application/x-www-form-urlencoded" => BodyKind::UrlEncoded,
        "application/octet-stream" => BodyKind::Binary,
        other if other.ends_with("+json") => BodyKind::Raw(RawKind::Json),
        other if other.ends_with("+xml") => BodyKind::Raw(RawKind::Xml),
        other if other.starts_with("text/") => BodyKind::Raw(RawKind::Text),
        _ => BodyKind::None,
    }
}
