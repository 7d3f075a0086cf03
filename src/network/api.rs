//! Client for the documented server's own endpoints

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::ApiError;
use crate::models::{ApiDoc, EnvironmentSchema, PingResponse};
use crate::network::transport::create_client;

pub const DOC_PATH: &str = "/retreever/doc";
pub const PING_PATH: &str = "/retreever/ping";
pub const ENVIRONMENT_PATH: &str = "/retreever/environment";

#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn fetch_doc(&self) -> Result<ApiDoc, ApiError>;

    /// Cheap heartbeat carrying the staleness fingerprint.
    async fn ping(&self) -> Result<PingResponse, ApiError>;

    async fn fetch_environment(&self) -> Result<EnvironmentSchema, ApiError>;
}

pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        HttpApi {
            client: create_client(timeout),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &'static str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| ApiError::Transport { endpoint, source })?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(ApiError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|source| ApiError::Transport { endpoint, source })?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode {
            endpoint,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl RemoteApi for HttpApi {
    async fn fetch_doc(&self) -> Result<ApiDoc, ApiError> {
        self.get_json(DOC_PATH).await
    }

    async fn ping(&self) -> Result<PingResponse, ApiError> {
        self.get_json(PING_PATH).await
    }

    async fn fetch_environment(&self) -> Result<EnvironmentSchema, ApiError> {
        self.get_json(ENVIRONMENT_PATH).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let api = HttpApi::new("http://localhost:8080/", Duration::from_secs(1));
        assert_eq!(api.base_url(), "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_unreachable_is_transport_error() {
        let api = HttpApi::new("http://127.0.0.1:9", Duration::from_secs(2));
        let err = api.ping().await.unwrap_err();
        assert!(matches!(err, ApiError::Transport { endpoint: PING_PATH, .. }));
    }
}
