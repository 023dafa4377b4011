//! Error types for the embeddings boundary.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors that can occur when talking to an embedding provider.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Provider not configured.
    #[error("embedding provider not configured")]
    ProviderNotConfigured,

    /// API request failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// Invalid response from provider.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The call did not complete within the request timeout.
    #[error("embedding request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// More inputs than the provider accepts in one call.
    #[error("batch of {size} exceeds provider maximum of {max}")]
    BatchTooLarge { size: usize, max: usize },

    /// The provider returned a different number of vectors than inputs.
    #[error("provider returned {actual} embeddings for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    /// A returned vector contains NaN or infinite values.
    #[error("embedding {position} contains non-finite values")]
    NonFinite { position: usize },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EmbeddingError {
    /// A [`EmbeddingError::Timeout`] for a call bounded by `timeout`.
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Whether this error came from a request that ran out of time.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Http(err) => err.is_timeout(),
            _ => false,
        }
    }
}
