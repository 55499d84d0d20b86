use std::time::Duration;
use thiserror::Error;

/// Options for a completion request.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative).
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: None,
            timeout: Duration::from_secs(120),
        }
    }
}

impl CompletionOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }
}

/// Errors that can occur when interacting with an LLM provider.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Request timeout")]
    Timeout,

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            LlmError::Connection(_) => "connection",
            LlmError::Api { .. } => "api",
            LlmError::InvalidResponse(_) => "invalid_response",
            LlmError::RateLimited => "rate_limited",
            LlmError::Timeout => "timeout",
            LlmError::NotConfigured(_) => "not_configured",
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            // request URLs are left out of messages that end up in logs
            LlmError::Connection(e.without_url().to_string())
        }
    }
}
