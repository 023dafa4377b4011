//! Error types for the retrieval subsystem.

use thiserror::Error;

use docqa_embeddings::EmbeddingError;

use crate::store::Readiness;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval subsystem.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// The index has not been built, or was built from an empty document.
    #[error("index not ready: {0}")]
    NotReady(Readiness),

    /// The provider could not embed the query text.
    #[error("query embedding failed: {0}")]
    QueryEmbedding(#[source] EmbeddingError),

    /// Embedding error outside the query path.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A query asked for zero results.
    #[error("top_k must be at least 1")]
    InvalidTopK,

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file parse error.
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
