use crate::ai::LlmError;
use thiserror::Error;

/// Failures of user-facing library operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Busy")]
    Busy,

    #[error("API Key not set")]
    NoApiKey,

    #[error("Path is outside the music library: {0}")]
    OutsideLibrary(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<LlmError> for ServiceError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::NotConfigured(_) => ServiceError::NoApiKey,
            other => ServiceError::Internal(other.into()),
        }
    }
}
