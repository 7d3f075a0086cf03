//! Server-sourced data: the API document, the heartbeat and the environment schema.

use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP Method enum
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::DELETE => "DELETE",
        }
    }

    /// Case-insensitive parse, `None` for methods the server never emits.
    pub fn parse(s: &str) -> Option<HttpMethod> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "PATCH" => Some(HttpMethod::PATCH),
            "DELETE" => Some(HttpMethod::DELETE),
            _ => None,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response of the lightweight heartbeat endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PingResponse {
    pub status: String,
    /// Staleness fingerprint, changes whenever the server restarts
    pub uptime: String,
}

/// The full API description served by the backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiDoc {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub uri_prefix: Option<String>,
    /// Uptime at generation time, compared against [`PingResponse::uptime`]
    pub up_time: String,
    #[serde(default)]
    pub groups: Vec<ApiGroup>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiGroup {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// A single endpoint. Identity is `(method, path)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub secured: bool,
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default)]
    pub consumes: Vec<String>,
    #[serde(default)]
    pub produces: Vec<String>,
    #[serde(default)]
    pub path_variables: Vec<PathVariable>,
    #[serde(default)]
    pub query_params: Vec<QueryParam>,
    #[serde(default)]
    pub headers: Vec<EndpointHeader>,
    #[serde(default)]
    pub request: Option<RequestPayload>,
    #[serde(default)]
    pub response: Option<ResponsePayload>,
    #[serde(default)]
    pub errors: Vec<EndpointError>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathVariable {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryParam {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    /// String or number on the wire
    #[serde(default)]
    pub default_value: Option<serde_json::Value>,
    #[serde(default)]
    pub constraints: Vec<String>,
}

impl QueryParam {
    /// Default value rendered the way it would be typed into the editor.
    pub fn default_text(&self) -> String {
        match &self.default_value {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EndpointHeader {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// JSON model, display only
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub example_model: String,
    #[serde(default)]
    pub metadata: std::collections::BTreeMap<String, FieldMetadata>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub example_model: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldMetadata {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub constraints: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EndpointError {
    pub status: String,
    pub status_code: u16,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub response: Option<ResponsePayload>,
}

/// Environment variables declared by the server
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSchema {
    #[serde(default)]
    pub variables: Vec<ServerVariable>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerVariable {
    pub name: String,
    pub source: VariableSource,
}

/// Where a server variable gets its value from.
///
/// A source with a fixed `value` is static and always wins over local edits;
/// a source without one (read from a request, a header, ...) is dynamic.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableSource {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl VariableSource {
    pub fn is_static(&self) -> bool {
        self.value.is_some()
    }
}

/// Sidebar view of a group
#[derive(Clone, Debug, PartialEq)]
pub struct Collection {
    pub name: String,
    pub deprecated: bool,
    pub endpoints: Vec<EndpointSummary>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EndpointSummary {
    pub name: String,
    pub deprecated: bool,
    pub secured: bool,
    pub method: HttpMethod,
    pub path: String,
}

/// Non-deprecated groups and endpoints, both sorted by name.
pub fn collections(doc: &ApiDoc) -> Vec<Collection> {
    let mut groups: Vec<&ApiGroup> = doc.groups.iter().filter(|g| !g.deprecated).collect();
    groups.sort_by(|a, b| a.name.cmp(&b.name));

    groups
        .into_iter()
        .map(|group| {
            let mut endpoints: Vec<EndpointSummary> = group
                .endpoints
                .iter()
                .filter(|e| !e.deprecated)
                .map(|e| EndpointSummary {
                    name: e.name.clone(),
                    deprecated: e.deprecated,
                    secured: e.secured,
                    method: e.method,
                    path: e.path.clone(),
                })
                .collect();
            endpoints.sort_by(|a, b| a.name.cmp(&b.name));

            Collection {
                name: group.name.clone(),
                deprecated: group.deprecated,
                endpoints,
            }
        })
        .collect()
}

/// Finds an endpoint by its identity.
pub fn find_endpoint<'a>(doc: &'a ApiDoc, method: HttpMethod, path: &str) -> Option<&'a Endpoint> {
    doc.groups
        .iter()
        .flat_map(|g| g.endpoints.iter())
        .find(|ep| ep.method == method && ep.path == path)
}
