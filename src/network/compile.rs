//! Turns a session into a transport-ready request
//!
//! Compilation never fails: unknown variables interpolate to nothing and
//! missing attachments are left out, so the request can still be sent and
//! the server's answer observed.

use crate::content_type::BodyKind;
use crate::models::HttpMethod;
use crate::session::{FormValue, KeyValueEntry, TabDoc};
use crate::storage::{Attachment, AttachmentStorage};
use crate::variables::{interpolate, ResolvedVariable};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MultipartValue {
    Text(String),
    File(Attachment),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultipartField {
    pub name: String,
    pub value: MultipartValue,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum WireBody {
    #[default]
    None,
    Text(String),
    /// Already encoded `k=v&k2=v2`
    UrlEncoded(String),
    Multipart(Vec<MultipartField>),
    Binary(Attachment),
}

impl WireBody {
    /// Text form of the body, if it has one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WireBody::Text(s) | WireBody::UrlEncoded(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireRequest {
    pub method: HttpMethod,
    pub url: String,
    /// In send order; user rows first
    pub headers: Vec<(String, String)>,
    pub body: WireBody,
}

impl WireRequest {
    /// First header named `name`, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn query(&self) -> Option<&str> {
        self.url.split_once('?').map(|(_, q)| q)
    }
}

fn encode_pairs(rows: &[KeyValueEntry], vars: &[ResolvedVariable]) -> String {
    rows.iter()
        .filter(|r| r.is_active())
        .map(|r| {
            format!(
                "{}={}",
                urlencoding::encode(&r.key),
                urlencoding::encode(&interpolate(&r.value, vars))
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Compile `tab` against the resolved variables. Attachments are read from
/// `files`.
pub async fn compile(
    tab: &TabDoc,
    vars: &[ResolvedVariable],
    files: &AttachmentStorage,
) -> WireRequest {
    let request = &tab.request;

    let mut url = interpolate(&request.url, vars);
    let query = encode_pairs(&request.query_params, vars);
    if !query.is_empty() {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&query);
    }

    let mut headers: Vec<(String, String)> = request
        .headers
        .iter()
        .filter(|h| h.is_active())
        .map(|h| (h.key.clone(), interpolate(&h.value, vars)))
        .collect();

    let body = match request.body_kind {
        BodyKind::None => WireBody::None,
        BodyKind::Raw(_) => match request.body.raw.as_deref() {
            Some(raw) if !raw.is_empty() => WireBody::Text(interpolate(raw, vars)),
            _ => WireBody::None,
        },
        BodyKind::UrlEncoded => WireBody::UrlEncoded(encode_pairs(&request.body.url_encoded, vars)),
        BodyKind::FormData => {
            let mut fields = Vec::new();
            for entry in request.body.form_data.iter().filter(|e| e.is_active()) {
                match &entry.value {
                    FormValue::Text(text) => fields.push(MultipartField {
                        name: entry.key.clone(),
                        value: MultipartValue::Text(interpolate(text, vars)),
                    }),
                    FormValue::Files(ids) => {
                        for id in ids {
                            match files.get(id).await {
                                Some(file) => fields.push(MultipartField {
                                    name: entry.key.clone(),
                                    value: MultipartValue::File(file),
                                }),
                                None => {
                                    tracing::warn!(id = %id, field = %entry.key, "Attachment missing, field omitted")
                                }
                            }
                        }
                    }
                }
            }
            WireBody::Multipart(fields)
        }
        BodyKind::Binary => match &request.body.binary_file_id {
            Some(id) => files.get(id).await.map_or(WireBody::None, WireBody::Binary),
            None => WireBody::None,
        },
    };

    // implied by the body; a user header of the same name wins
    let implied = match (&request.body_kind, &body) {
        (_, WireBody::None) => None,
        (BodyKind::Raw(kind), _) => Some(kind.mime().to_string()),
        (BodyKind::UrlEncoded, _) => Some(FORM_URLENCODED.to_string()),
        (BodyKind::Binary, WireBody::Binary(file)) => Some(file.mime.clone()),
        _ => None,
    };
    if let Some(content_type) = implied {
        let user_set = headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("content-type"));
        if !user_set {
            headers.push(("Content-Type".to_string(), content_type));
        }
    }

    WireRequest {
        method: tab.method,
        url,
        headers,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_type::RawKind;
    use crate::models::fixtures::endpoint;
    use crate::session::{build_tab_doc, FormEntry};
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn var(name: &str, value: &str) -> ResolvedVariable {
        ResolvedVariable {
            name: name.into(),
            value: value.into(),
            editable: true,
            local: true,
        }
    }

    fn files() -> AttachmentStorage {
        AttachmentStorage::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_query_from_variable() {
        let mut tab = build_tab_doc(&endpoint(HttpMethod::GET, "/users/{id}", "Get user"), None);
        tab.request.url = "{{base}}/users/{id}".into();
        tab.request.query_params.insert(0, KeyValueEntry::local("id", "{{userId}}"));

        let vars = [var("userId", "42"), var("base", "http://api")];
        let wire = compile(&tab, &vars, &files()).await;
        assert_eq!(wire.query(), Some("id=42"));
        assert_eq!(wire.url, "http://api/users/{id}?id=42");
        assert_eq!(wire.body, WireBody::None);
        assert!(wire.headers.is_empty());
    }

    #[tokio::test]
    async fn test_ignored_rows_and_encoding() {
        let mut tab = build_tab_doc(&endpoint(HttpMethod::GET, "/search", "Search"), None);
        tab.request.url = "/search?fixed=1".into();
        let mut skipped = KeyValueEntry::local("skip", "x");
        skipped.ignore = true;
        tab.request.query_params = vec![
            KeyValueEntry::local("q", "a b&c"),
            skipped,
            KeyValueEntry::local("", "orphan"),
        ];
        tab.request.headers = vec![KeyValueEntry::local("X-Missing", "{{nope}}")];

        let wire = compile(&tab, &[], &files()).await;
        assert_eq!(wire.url, "/search?fixed=1&q=a%20b%26c");
        assert_eq!(wire.header("x-missing"), Some(""));
    }

    #[tokio::test]
    async fn test_raw_body_content_type_precedence() {
        let mut tab = build_tab_doc(&endpoint(HttpMethod::POST, "/pets", "Create"), None);
        tab.request.body_kind = BodyKind::Raw(RawKind::Json);
        tab.request.body.raw = Some(r#"{"owner":"{{ user }}"}"#.into());

        let wire = compile(&tab, &[var("user", "ann")], &files()).await;
        assert_eq!(wire.body.as_text(), Some(r#"{"owner":"ann"}"#));
        assert_eq!(wire.header("Content-Type"), Some("application/json"));

        tab.request.headers.insert(0, KeyValueEntry::local("content-type", "text/plain"));
        let wire = compile(&tab, &[], &files()).await;
        assert_eq!(wire.header("Content-Type"), Some("text/plain"));
        assert_eq!(wire.headers.len(), 1);
    }

    #[tokio::test]
    async fn test_url_encoded_body() {
        let mut tab = build_tab_doc(&endpoint(HttpMethod::POST, "/login", "Login"), None);
        tab.request.body_kind = BodyKind::UrlEncoded;
        tab.request.body.url_encoded = vec![
            KeyValueEntry::local("user", "{{u}}"),
            KeyValueEntry::local("pass", "p@ss word"),
        ];

        let wire = compile(&tab, &[var("u", "bob")], &files()).await;
        assert_eq!(wire.body, WireBody::UrlEncoded("user=bob&pass=p%40ss%20word".into()));
        assert_eq!(wire.header("content-type"), Some(FORM_URLENCODED));
    }

    #[tokio::test]
    async fn test_multipart_omits_missing_blobs() {
        let files = files();
        let present = files.upload("a.txt", Some("text/plain"), b"hello").await.unwrap();

        let mut tab = build_tab_doc(&endpoint(HttpMethod::POST, "/upload", "Upload"), None);
        tab.request.body_kind = BodyKind::FormData;
        tab.request.body.form_data = vec![
            FormEntry {
                key: "docs".into(),
                value: FormValue::Files(vec![present.clone(), "gone".into()]),
                editable: true,
                local: true,
                ignore: false,
            },
            FormEntry {
                value: FormValue::Text("{{n}}".into()),
                ..FormEntry::schema("note")
            },
        ];

        let wire = compile(&tab, &[var("n", "hi")], &files).await;
        let WireBody::Multipart(fields) = &wire.body else {
            panic!("expected multipart body");
        };
        assert_eq!(fields.len(), 2);
        assert!(matches!(&fields[0].value, MultipartValue::File(f) if f.id == present));
        assert_eq!(fields[1].value, MultipartValue::Text("hi".into()));
        assert_eq!(wire.header("content-type"), None);
    }

    #[tokio::test]
    async fn test_binary_body() {
        let files = files();
        let id = files.upload("img.png", Some("image/png"), &[1, 2, 3]).await.unwrap();

        let mut tab = build_tab_doc(&endpoint(HttpMethod::PUT, "/avatar", "Avatar"), None);
        tab.request.body_kind = BodyKind::Binary;
        let wire = compile(&tab, &[], &files).await;
        assert_eq!(wire.body, WireBody::None);

        tab.request.body.binary_file_id = Some(id);
        let wire = compile(&tab, &[], &files).await;
        assert!(matches!(&wire.body, WireBody::Binary(f) if f.bytes == vec![1, 2, 3]));
        assert_eq!(wire.header("content-type"), Some("image/png"));
    }
}
