//! Builds a fresh session from an endpoint description

use chrono::Utc;

use crate::content_type::{self, BodyKind};
use crate::models::{Endpoint, HttpMethod, RequestPayload};
use crate::session::{
    Editing, FormEntry, KeyValueEntry, RequestBody, TabDoc, UiRequest,
};

/// Session key of an endpoint: `"{METHOD}:{path}"`
pub fn tab_key(method: HttpMethod, path: &str) -> String {
    format!("{}:{}", method.as_str(), path)
}

/// Inverse of [`tab_key`].
pub fn parse_tab_key(key: &str) -> Option<(HttpMethod, &str)> {
    let (method, path) = key.split_once(':')?;
    if path.is_empty() {
        return None;
    }
    Some((HttpMethod::parse(method)?, path))
}

/// Create the initial session for `endpoint`.
///
/// `uri_prefix` is the document's base URI; a trailing slash is dropped
/// before the endpoint path is appended.
pub fn build_tab_doc(endpoint: &Endpoint, uri_prefix: Option<&str>) -> TabDoc {
    let url = format!(
        "{}{}",
        uri_prefix.map(|p| p.trim_end_matches('/')).unwrap_or(""),
        endpoint.path
    );

    let kinds: Vec<BodyKind> = endpoint
        .consumes
        .iter()
        .map(|c| content_type::resolve(c))
        .collect();
    let body_kind = kinds.first().copied().unwrap_or_default();

    let headers = endpoint
        .headers
        .iter()
        .map(|h| KeyValueEntry::schema(&h.name, ""))
        .collect();

    let query_params = endpoint
        .query_params
        .iter()
        .map(|q| KeyValueEntry::schema(&q.name, q.default_text()))
        .collect();

    let fields = endpoint
        .request
        .as_ref()
        .map(field_names)
        .unwrap_or_default();

    let mut body = RequestBody::default();
    if kinds.iter().any(|k| matches!(k, BodyKind::Raw(_))) {
        body.raw = endpoint.request.as_ref().and_then(|r| {
            [&r.example_model, &r.model]
                .into_iter()
                .find(|s| !s.trim().is_empty())
                .cloned()
        });
    }
    if kinds.contains(&BodyKind::FormData) {
        body.form_data = fields.iter().map(FormEntry::schema).collect();
    }
    if kinds.contains(&BodyKind::UrlEncoded) {
        body.url_encoded = fields
            .iter()
            .map(|f| KeyValueEntry::schema(f, ""))
            .collect();
    }

    let mut request = UiRequest {
        url,
        headers,
        query_params,
        consumes: endpoint.consumes.clone(),
        editing: Editing::Params,
        body_kind,
        body,
    };
    request.normalize();

    let now = Utc::now();
    TabDoc {
        key: tab_key(endpoint.method, &endpoint.path),
        name: endpoint.name.clone(),
        method: endpoint.method,
        path: endpoint.path.clone(),
        request,
        last_response: None,
        created_at: now,
        updated_at: now,
    }
}

/// Top-level request fields, from metadata or else from the JSON model.
fn field_names(payload: &RequestPayload) -> Vec<String> {
    if !payload.metadata.is_empty() {
        return payload.metadata.keys().cloned().collect();
    }
    match serde_json::from_str::<serde_json::Value>(&payload.model) {
        Ok(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}
