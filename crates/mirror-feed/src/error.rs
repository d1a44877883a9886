//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("{provider} returned HTTP {status}")]
    Status { provider: String, status: u16 },

    #[error("{provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("Malformed response from {provider}: {reason}")]
    Body { provider: String, reason: String },

    #[error("Invalid feed configuration: {0}")]
    Config(String),
}

impl FeedError {
    /// Short label used for the provider-failure metric.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::HttpClient(_) => "http",
            Self::Status { .. } => "status",
            Self::Timeout { .. } => "timeout",
            Self::Body { .. } => "body",
            Self::Config(_) => "config",
        }
    }
}

pub type FeedResult<T> = Result<T, FeedError>;
