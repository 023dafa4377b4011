//! Configuration for the retrieval subsystem.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use docqa_embeddings::{DEFAULT_DIMENSION, DEFAULT_MODEL};

use crate::error::{Result, RetrievalError};

/// Configuration for the retrieval subsystem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,

    /// Index build configuration.
    pub build: BuildConfig,

    /// Query configuration.
    pub query: QueryConfig,
}

impl RetrievalConfig {
    /// Parse a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Set the embedding configuration.
    pub fn with_embedding(mut self, config: EmbeddingConfig) -> Self {
        self.embedding = config;
        self
    }

    /// Set the build configuration.
    pub fn with_build(mut self, config: BuildConfig) -> Self {
        self.build = config;
        self
    }

    /// Set the query configuration.
    pub fn with_query(mut self, config: QueryConfig) -> Self {
        self.query = config;
        self
    }

    /// Check the configuration against the provider's batch limit.
    pub fn validate(&self, max_batch_size: usize) -> Result<()> {
        if self.embedding.dimension == 0 {
            return Err(RetrievalError::Config(
                "embedding.dimension must be greater than 0".to_string(),
            ));
        }
        if self.embedding.request_timeout_secs == 0 {
            return Err(RetrievalError::Config(
                "embedding.request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.build.batch_size == 0 || self.build.batch_size > max_batch_size {
            return Err(RetrievalError::Config(format!(
                "build.batch_size must be between 1 and {max_batch_size}, got {}",
                self.build.batch_size
            )));
        }
        if self.build.max_attempts == 0 {
            return Err(RetrievalError::Config(
                "build.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.query.top_k == 0 {
            return Err(RetrievalError::InvalidTopK);
        }
        Ok(())
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model to use for embeddings.
    pub model: String,

    /// Expected vector dimension.
    pub dimension: usize,

    /// Override for the provider base URL.
    pub base_url: Option<String>,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Timeout for a single provider call, in seconds.
    pub request_timeout_secs: u64,

    /// Scale vectors to unit length so the dot product equals cosine similarity.
    pub normalize: bool,
}

impl EmbeddingConfig {
    /// Timeout for a single provider call.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            dimension: DEFAULT_DIMENSION,
            base_url: None,
            api_key_env: "GEMINI_API_KEY".to_string(),
            request_timeout_secs: 30,
            normalize: true,
        }
    }
}

/// Configuration for building the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Chunks sent per provider call.
    pub batch_size: usize,

    /// Total attempts per batch, including the first.
    pub max_attempts: u32,

    /// Fixed delay between attempts, in milliseconds.
    pub retry_delay_ms: u64,
}

impl BuildConfig {
    /// Fixed delay between attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            max_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Configuration for query processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Number of chunks returned when the caller does not ask for a count.
    pub top_k: usize,

    /// Delimiter placed between chunks in the assembled context.
    pub separator: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            separator: "\n---\n".to_string(),
        }
    }
}
