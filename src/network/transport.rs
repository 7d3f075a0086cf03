//! HTTP transport - executes compiled requests with reqwest

use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use std::time::{Duration, Instant};

use crate::models::HttpMethod;
use crate::network::compile::{MultipartValue, WireBody, WireRequest};
use crate::network::normalize::{round_duration, Payload, RawHttpResponse, Timing};

/// Status text of the synthetic response for an unreachable server
pub const NETWORK_ERROR: &str = "NETWORK_ERROR";

/// Executes a compiled request. Never fails: transport errors come back as a
/// status 0 response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: WireRequest) -> (RawHttpResponse, Timing);
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        HttpTransport {
            client: create_client(timeout),
        }
    }

    fn build(&self, request: WireRequest) -> reqwest::RequestBuilder {
        let method = match request.method {
            HttpMethod::GET => reqwest::Method::GET,
            HttpMethod::POST => reqwest::Method::POST,
            HttpMethod::PUT => reqwest::Method::PUT,
            HttpMethod::PATCH => reqwest::Method::PATCH,
            HttpMethod::DELETE => reqwest::Method::DELETE,
        };

        // multipart bodies carry their own boundary in Content-Type
        let multipart = matches!(request.body, WireBody::Multipart(_));
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            if multipart && name.eq_ignore_ascii_case("content-type") {
                tracing::debug!(value = %value, "Dropping Content-Type for multipart body");
                continue;
            }
            builder = builder.header(name, value);
        }

        match request.body {
            WireBody::None => builder,
            WireBody::Text(text) | WireBody::UrlEncoded(text) => builder.body(text),
            WireBody::Binary(file) => builder.body(file.bytes),
            WireBody::Multipart(fields) => {
                let mut form = reqwest::multipart::Form::new();
                for field in fields {
                    form = match field.value {
                        MultipartValue::Text(text) => form.text(field.name, text),
                        MultipartValue::File(file) => {
                            let part = reqwest::multipart::Part::bytes(file.bytes.clone())
                                .file_name(file.file_name.clone());
                            let part = match part.mime_str(&file.mime) {
                                Ok(part) => part,
                                Err(e) => {
                                    tracing::warn!(mime = %file.mime, error = %e, "Invalid attachment MIME type");
                                    reqwest::multipart::Part::bytes(file.bytes)
                                        .file_name(file.file_name)
                                }
                            };
                            form.part(field.name, part)
                        }
                    };
                }
                builder.multipart(form)
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: WireRequest) -> (RawHttpResponse, Timing) {
        tracing::info!(method = %request.method, url = %request.url, "Executing request");
        let start = Instant::now();
        let result = self.build(request).send().await;

        let raw = match result {
            Ok(resp) => {
                let status = resp.status();
                let headers: Vec<(String, String)> = resp
                    .headers()
                    .iter()
                    .map(|(k, v)| {
                        (
                            k.as_str().to_string(),
                            String::from_utf8_lossy(v.as_bytes()).into_owned(),
                        )
                    })
                    .collect();
                let mut bytes = Vec::new();
                let mut stream = resp.bytes_stream();
                let mut read_error = None;
                while let Some(chunk) = stream.next().await {
                    match chunk {
                        Ok(chunk) => bytes.extend_from_slice(&chunk),
                        Err(e) => {
                            read_error = Some(e);
                            break;
                        }
                    }
                }

                match read_error {
                    Some(e) => network_error(&e),
                    None => RawHttpResponse {
                        status: status.as_u16(),
                        status_text: status.canonical_reason().unwrap_or("").to_string(),
                        headers,
                        payload: payload(bytes),
                    },
                }
            }
            Err(e) => network_error(&e),
        };

        let timing = Timing {
            duration_ms: round_duration(start.elapsed().as_secs_f64() * 1000.0),
            timestamp: Utc::now(),
        };
        tracing::info!(status = raw.status, duration_ms = timing.duration_ms, "Request completed");
        (raw, timing)
    }
}

/// UTF-8 text when valid, else raw bytes. Bodies are never reparsed here.
fn payload(bytes: Vec<u8>) -> Payload {
    if bytes.is_empty() {
        return Payload::Empty;
    }
    match String::from_utf8(bytes) {
        Ok(text) => Payload::Text(text),
        Err(e) => Payload::Bytes(e.into_bytes()),
    }
}

fn network_error(error: &reqwest::Error) -> RawHttpResponse {
    let message = if error.is_timeout() {
        "Request timed out".to_string()
    } else if error.is_connect() {
        format!("Connection failed: {}", error)
    } else {
        format!("Request failed: {}", error)
    };
    tracing::warn!(error = %error, "Transport failure");
    RawHttpResponse {
        status: 0,
        status_text: NETWORK_ERROR.to_string(),
        headers: Vec::new(),
        payload: Payload::Text(message),
    }
}

/// HTTP client with the configured timeout
pub fn create_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::network::compile::MultipartField;
    use crate::network::normalize::normalize;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned HTTP response on a local port.
    async fn serve_once(content_type: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut read = 0;
            while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf[read..]).await.unwrap();
                if n == 0 {
                    break;
                }
                read += n;
            }
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                content_type,
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{}/echo", addr)
    }

    fn get(url: String) -> WireRequest {
        WireRequest {
            method: HttpMethod::GET,
            url,
            headers: Vec::new(),
            body: WireBody::None,
        }
    }

    #[test]
    fn test_payload_classification() {
        assert_eq!(payload(Vec::new()), Payload::Empty);
        assert_eq!(payload(br#"{"a":1}"#.to_vec()), Payload::Text(r#"{"a":1}"#.into()));
        assert_eq!(payload(b"{broken".to_vec()), Payload::Text("{broken".into()));
        assert_eq!(payload(vec![0xff]), Payload::Bytes(vec![0xff]));
    }

    #[tokio::test]
    async fn test_json_body_is_kept_verbatim() {
        let sent = br#"{"zeta":1,"alpha":2.50}"#;
        let url = serve_once("application/json", sent).await;
        let transport = HttpTransport::new(Duration::from_secs(5));

        let (raw, timing) = transport.execute(get(url)).await;
        let res = normalize(raw, timing);
        assert_eq!(res.status, 200);
        assert_eq!(res.body.as_bytes(), sent);
        assert_eq!(res.size_bytes, sent.len());
    }

    #[tokio::test]
    async fn test_binary_body_size_is_byte_count() {
        let url = serve_once("application/octet-stream", &[0xff; 10]).await;
        let transport = HttpTransport::new(Duration::from_secs(5));

        let (raw, timing) = transport.execute(get(url)).await;
        assert_eq!(raw.payload, Payload::Bytes(vec![0xff; 10]));
        assert_eq!(normalize(raw, timing).size_bytes, 10);
    }

    #[test]
    fn test_multipart_sends_single_content_type() {
        let transport = HttpTransport::new(Duration::from_secs(5));
        let request = WireRequest {
            method: HttpMethod::POST,
            url: "http://127.0.0.1:9/upload".into(),
            headers: vec![
                ("Content-Type".into(), "application/json".into()),
                ("X-Trace".into(), "1".into()),
            ],
            body: WireBody::Multipart(vec![MultipartField {
                name: "note".into(),
                value: MultipartValue::Text("hi".into()),
            }]),
        };
        let built = transport.build(request).build().unwrap();
        let content_types: Vec<_> = built
            .headers()
            .get_all(reqwest::header::CONTENT_TYPE)
            .iter()
            .collect();
        assert_eq!(content_types.len(), 1);
        assert!(content_types[0]
            .to_str()
            .unwrap()
            .starts_with("multipart/form-data; boundary="));
        assert_eq!(built.headers().get("x-trace").unwrap(), "1");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_status_zero() {
        let transport = HttpTransport::new(Duration::from_secs(2));
        let request = WireRequest {
            method: HttpMethod::GET,
            url: "http://127.0.0.1:9/unreachable".into(),
            headers: Vec::new(),
            body: WireBody::None,
        };
        let (raw, timing) = transport.execute(request).await;
        assert_eq!(raw.status, 0);
        assert_eq!(raw.status_text, NETWORK_ERROR);
        assert!(timing.duration_ms >= 0.0);
    }
}
