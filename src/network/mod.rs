//! Network layer - request compilation, execution and response
//! normalisation
//!
//! The Network actor receives compiled requests and sends back normalised
//! responses.

pub mod actor;
pub mod api;
pub mod compile;
pub mod normalize;
pub mod transport;

pub use actor::NetworkActor;
pub use api::{HttpApi, RemoteApi};
pub use compile::{compile, WireBody, WireRequest};
pub use normalize::{normalize, CookieEntry, NormalizedResponse, ViewMode};
pub use transport::{HttpTransport, Transport};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_type::BodyKind;
    use crate::content_type::RawKind;
    use crate::models::fixtures::endpoint;
    use crate::models::HttpMethod;
    use crate::network::normalize::{Payload, RawHttpResponse, Timing};
    use crate::session::build_tab_doc;
    use crate::storage::{AttachmentStorage, MemoryStore};
    use crate::variables::ResolvedVariable;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Arc;

    /// Answers with the request body and content type
    struct EchoTransport;

    #[async_trait]
    impl Transport for EchoTransport {
        async fn execute(&self, request: WireRequest) -> (RawHttpResponse, Timing) {
            let content_type = request.header("content-type").unwrap_or("text/plain").to_string();
            let payload = match request.body.as_text() {
                Some(text) => Payload::Text(text.to_string()),
                None => Payload::Empty,
            };
            (
                RawHttpResponse {
                    status: 200,
                    status_text: "OK".into(),
                    headers: vec![("Content-Type".into(), content_type)],
                    payload,
                },
                Timing {
                    duration_ms: 2.0,
                    timestamp: Utc::now(),
                },
            )
        }
    }

    #[tokio::test]
    async fn test_raw_body_round_trip() {
        let mut tab = build_tab_doc(&endpoint(HttpMethod::POST, "/echo", "Echo"), Some("http://h"));
        tab.request.body_kind = BodyKind::Raw(RawKind::Json);
        tab.request.body.raw = Some(r#"{"id": "{{id}}", "tags": ["a"]}"#.into());
        let vars = vec![ResolvedVariable {
            name: "id".into(),
            value: "7".into(),
            editable: true,
            local: true,
        }];

        let files = AttachmentStorage::new(Arc::new(MemoryStore::new()));
        let wire = compile(&tab, &vars, &files).await;
        let sent = wire.body.as_text().map(String::from);

        let (raw, timing) = EchoTransport.execute(wire).await;
        let response = normalize(raw, timing);

        assert_eq!(Some(response.body.clone()), sent);
        assert_eq!(response.body, r#"{"id": "7", "tags": ["a"]}"#);
        assert_eq!(response.view_mode, ViewMode::Json);
        assert_eq!(response.size_bytes, response.body.len());
    }
}
