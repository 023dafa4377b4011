//! Embedding providers.
//!
//! The retrieval core talks to providers only through [`EmbeddingProvider`].
//! A provider may fail transiently, caps how many texts it accepts per call,
//! and promises to return vectors in input order. Callers check that last
//! promise with [`validate_batch`] instead of trusting it.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EmbeddingError, Result};
use crate::{DEFAULT_DIMENSION, DEFAULT_MODEL, Embedding};

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Model identifier sent with every request.
    fn model(&self) -> &str;

    /// Dimension of the vectors this provider returns.
    fn dimension(&self) -> usize;

    /// Maximum number of texts accepted by a single `embed_batch` call.
    fn max_batch_size(&self) -> usize;

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Generate an embedding for a single text.
    async fn embed_one(&self, text: &str) -> Result<Embedding> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(EmbeddingError::CountMismatch {
                expected: 1,
                actual: vectors.len(),
            });
        }
        Ok(vectors.remove(0))
    }

    /// Check if the provider is available (API key set, etc.).
    fn is_available(&self) -> bool;
}

/// Check a provider response against the inputs that produced it.
///
/// The index pairs vector `i` with chunk `i`, so a response with the wrong
/// count, a wrong dimension or non-finite values is rejected as a whole.
pub fn validate_batch(expected: usize, vectors: &[Embedding], dimension: usize) -> Result<()> {
    if vectors.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            actual: vectors.len(),
        });
    }

    for (position, vector) in vectors.iter().enumerate() {
        if vector.len() != dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(EmbeddingError::NonFinite { position });
        }
    }

    Ok(())
}

/// Largest batch accepted by `batchEmbedContents`.
pub const GEMINI_MAX_BATCH: usize = 100;

/// Gemini (Generative Language API) embedding provider.
pub struct GeminiProvider {
    /// API key.
    api_key: Option<String>,

    /// API base URL.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,

    /// Model identifier, without the `models/` prefix.
    model: String,

    /// Expected output dimension.
    dimension: usize,

    /// Per-request timeout.
    timeout: Duration,
}

impl GeminiProvider {
    /// Create a new Gemini provider, reading the key from `GEMINI_API_KEY`.
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("GEMINI_API_KEY").ok(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            client: reqwest::Client::new(),
            model: DEFAULT_MODEL.to_string(),
            dimension: DEFAULT_DIMENSION,
            timeout: Duration::from_secs(30),
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the expected output dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{method}", self.base_url, self.model)
    }

    fn content_for<'a>(&'a self, text: &'a str) -> GeminiEmbedRequest<'a> {
        GeminiEmbedRequest {
            model: format!("models/{}", self.model),
            content: GeminiContent {
                parts: vec![GeminiPart { text }],
            },
        }
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        url: String,
        body: &B,
    ) -> Result<reqwest::Response> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(EmbeddingError::ProviderNotConfigured)?;

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|err| self.map_send_error(err))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(EmbeddingError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest(format!(
                "API error ({status}): {error_text}"
            )));
        }

        Ok(response)
    }

    fn map_send_error(&self, err: reqwest::Error) -> EmbeddingError {
        if err.is_timeout() {
            EmbeddingError::timeout(self.timeout)
        } else {
            EmbeddingError::Http(err)
        }
    }
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_batch_size(&self) -> usize {
        GEMINI_MAX_BATCH
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.len() > GEMINI_MAX_BATCH {
            return Err(EmbeddingError::BatchTooLarge {
                size: texts.len(),
                max: GEMINI_MAX_BATCH,
            });
        }

        debug!(
            "Generating batch embeddings for {} texts with model: {}",
            texts.len(),
            self.model
        );

        let body = GeminiBatchRequest {
            requests: texts.iter().map(|t| self.content_for(t)).collect(),
        };

        let response = self.post(self.endpoint("batchEmbedContents"), &body).await?;
        let bytes = response.bytes().await?;
        let result: GeminiBatchResponse = serde_json::from_slice(&bytes)?;

        let vectors: Vec<Embedding> = result.embeddings.into_iter().map(|e| e.values).collect();

        info!("Generated {} batch embeddings", vectors.len());
        Ok(vectors)
    }

    async fn embed_one(&self, text: &str) -> Result<Embedding> {
        debug!("Generating embedding with model: {}", self.model);

        let body = self.content_for(text);
        let response = self.post(self.endpoint("embedContent"), &body).await?;
        let bytes = response.bytes().await?;
        let result: GeminiSingleResponse = serde_json::from_slice(&bytes)?;

        let embedding = result
            .embedding
            .ok_or_else(|| EmbeddingError::InvalidResponse("No embedding in response".to_string()))?
            .values;

        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Serialize)]
struct GeminiBatchRequest<'a> {
    requests: Vec<GeminiEmbedRequest<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiEmbedRequest<'a> {
    model: String,
    content: GeminiContent<'a>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

/// Gemini API response formats.
#[derive(Debug, Deserialize)]
struct GeminiBatchResponse {
    #[serde(default)]
    embeddings: Vec<GeminiValues>,
}

#[derive(Debug, Deserialize)]
struct GeminiSingleResponse {
    embedding: Option<GeminiValues>,
}

#[derive(Debug, Deserialize)]
struct GeminiValues {
    values: Vec<f32>,
}
