use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde_json::Value;
use tracing::instrument;

use concierge_core::errors::UpstreamError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// An HTTP response from the data service, whatever its status code.
///
/// Business errors (404, 409, ...) come back here with the upstream's own
/// `error` body; only transport failures become [`UpstreamError`].
#[derive(Clone, Debug)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Value,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Request/response seam to the hotel data service.
///
/// The gateway handlers depend on this trait rather than on a concrete
/// client so tests can substitute [`crate::MockUpstream`].
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// Forward one request. Exactly one attempt — the gateway never retries.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<UpstreamResponse, UpstreamError>;

    async fn get(&self, path: &str) -> Result<UpstreamResponse, UpstreamError> {
        self.send(Method::GET, path, None).await
    }

    async fn post(
        &self,
        path: &str,
        body: Option<&Value>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.send(Method::POST, path, body).await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<UpstreamResponse, UpstreamError> {
        self.send(Method::PUT, path, Some(body)).await
    }
}

/// reqwest-backed client for the data service.
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, UpstreamError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| UpstreamError::InvalidUrl(e.to_string()))?;

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn classify(&self, error: reqwest::Error) -> UpstreamError {
        if error.is_timeout() {
            UpstreamError::Timeout(self.request_timeout)
        } else {
            UpstreamError::Network(error.to_string())
        }
    }
}

#[async_trait]
impl UpstreamApi for UpstreamClient {
    #[instrument(skip(self, body), fields(method = %method, path))]
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = format!("{}{}", self.base_url, path);

        let mut req = self.client.request(method, &url);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|e| self.classify(e))?;
        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(|e| self.classify(e))?;

        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)
                .map_err(|e| UpstreamError::Body(format!("invalid JSON from upstream: {e}")))?
        };

        Ok(UpstreamResponse { status, body })
    }
}
