use std::time::Duration;

/// Transport-level failures talking to the upstream data service.
///
/// An HTTP response with any status code is not an error here — the gateway
/// passes upstream statuses through to its own caller. Only failures that
/// produce no usable response (unreachable host, timeout, undecodable body)
/// surface as `UpstreamError`.
#[derive(Clone, Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("network error: {0}")]
    Network(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid upstream url: {0}")]
    InvalidUrl(String),
    #[error("unreadable upstream body: {0}")]
    Body(String),
}

impl UpstreamError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network_error",
            Self::Timeout(_) => "timeout",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Body(_) => "unreadable_body",
        }
    }
}
