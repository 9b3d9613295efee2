use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use concierge_core::errors::UpstreamError;

use crate::client::{UpstreamApi, UpstreamResponse};

/// One request the mock has seen, for assertions.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

/// Pre-programmed upstream for deterministic testing without a live data
/// service. Responses are consumed in order; once exhausted, every request
/// gets `200 {}`.
#[derive(Default)]
pub struct MockUpstream {
    responses: Mutex<VecDeque<Result<UpstreamResponse, UpstreamError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience: a mock whose next response is `status` with `body`.
    pub fn with_response(status: u16, body: Value) -> Self {
        let mock = Self::new();
        mock.push_response(status, body);
        mock
    }

    /// Convenience: a mock whose next request fails with `error`.
    pub fn with_error(error: UpstreamError) -> Self {
        let mock = Self::new();
        mock.push_error(error);
        mock
    }

    pub fn push_response(&self, status: u16, body: Value) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(UpstreamResponse { status, body }));
    }

    pub fn push_error(&self, error: UpstreamError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl UpstreamApi for MockUpstream {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            path: path.to_string(),
            body: body.cloned(),
        });

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(UpstreamResponse {
                    status: 200,
                    body: Value::Object(serde_json::Map::new()),
                })
            })
    }
}
