//! # Embeddings
//!
//! The boundary between document retrieval and an external embedding
//! provider.
//!
//! ## Features
//!
//! - **Provider Trait**: `EmbeddingProvider` with single-item and batch calls
//! - **Gemini Provider**: HTTP client for the Generative Language API
//! - **Response Validation**: order, count and dimension checks on batch output
//! - **Similarity Math**: dot product, cosine similarity, normalization
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings Boundary                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  texts ──► EmbeddingProvider ──► validate_batch ──► Embedding   │
//! │                  │                                    │         │
//! │                  ▼                                    ▼         │
//! │           GeminiProvider                        similarity      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod provider;
pub mod similarity;

pub use error::{EmbeddingError, Result};
pub use provider::{EmbeddingProvider, GeminiProvider, validate_batch};
pub use similarity::{cosine_similarity, dot_product, is_zero, normalize};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Dimension of embeddings (varies by model).
pub const DEFAULT_DIMENSION: usize = 768; // Gemini text-embedding-004

/// Default embedding model identifier.
pub const DEFAULT_MODEL: &str = "text-embedding-004";
