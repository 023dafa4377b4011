//! # Retrieval
//!
//! Turns the text of a single document into a queryable vector index and
//! ranks its chunks against natural-language questions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Retrieval Subsystem                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  raw text ──► chunk_text ──► IndexBuilder ──► VectorIndex       │
//! │                                   │                │            │
//! │                                   ▼                ▼            │
//! │                          EmbeddingProvider    IndexSnapshot     │
//! │                                   ▲                │            │
//! │                                   │                ▼            │
//! │  question ──────────────────► Retriever ◄──── IndexStore        │
//! │                                   │                             │
//! │                                   ▼                             │
//! │                          ranked chunk texts                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docqa_embeddings::GeminiProvider;
//! use docqa_retrieval::{IndexStore, RetrievalConfig};
//!
//! let store = Arc::new(IndexStore::new(
//!     Arc::new(GeminiProvider::new()),
//!     RetrievalConfig::default(),
//! )?);
//! store.build_from_text(&document_text).await;
//!
//! let context = store.retriever().context_for("When does the semester start?").await?;
//! ```

pub mod builder;
pub mod chunker;
pub mod config;
pub mod error;
pub mod index;
pub mod retriever;
pub mod store;

pub use builder::{BuildOutcome, BuildReport, IndexBuilder};
pub use chunker::{Chunk, chunk_text, join_pages};
pub use config::{BuildConfig, EmbeddingConfig, QueryConfig, RetrievalConfig};
pub use error::{Result, RetrievalError};
pub use index::{ScoredIndex, VectorIndex};
pub use retriever::{RetrievalHit, RetrievalResult, Retriever};
pub use store::{IndexSnapshot, IndexStore, Readiness};

// Re-export from dependencies for convenience
pub use docqa_embeddings::{EmbeddingError, EmbeddingProvider};
