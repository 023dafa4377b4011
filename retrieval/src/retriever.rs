//! Top-k retrieval over the installed snapshot.

use std::slice;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use docqa_embeddings::{EmbeddingError, is_zero, normalize, validate_batch};

use crate::error::{Result, RetrievalError};
use crate::store::IndexStore;

/// One ranked chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalHit {
    /// Chunk position in the document.
    pub index: usize,

    /// Similarity with the query.
    pub score: f32,

    /// Chunk text.
    pub text: String,
}

/// Ranked chunks for one query, best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub hits: Vec<RetrievalHit>,
}

impl RetrievalResult {
    /// Chunk texts in ranked order.
    pub fn texts(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.text.as_str()).collect()
    }

    /// The texts joined by `separator`, as handed to answer generation.
    pub fn context(&self, separator: &str) -> String {
        self.texts().join(separator)
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Read-only query handle over an [`IndexStore`].
#[derive(Clone)]
pub struct Retriever {
    store: Arc<IndexStore>,
}

impl Retriever {
    pub fn new(store: Arc<IndexStore>) -> Self {
        Self { store }
    }

    /// Rank every chunk against `text` and return the best `top_k`.
    ///
    /// Fails with [`RetrievalError::NotReady`] before any provider call when
    /// no index is installed, and with [`RetrievalError::QueryEmbedding`] when
    /// the query itself cannot be embedded.
    pub async fn query(&self, text: &str, top_k: usize) -> Result<RetrievalResult> {
        if top_k == 0 {
            return Err(RetrievalError::InvalidTopK);
        }

        let snapshot = self
            .store
            .current()
            .await
            .map_err(RetrievalError::NotReady)?;

        let config = self.store.config();
        let provider = self.store.provider();
        let timeout = config.embedding.request_timeout();

        let mut query = tokio::time::timeout(timeout, provider.embed_one(text))
            .await
            .map_err(|_| RetrievalError::QueryEmbedding(EmbeddingError::timeout(timeout)))?
            .map_err(RetrievalError::QueryEmbedding)?;

        validate_batch(1, slice::from_ref(&query), snapshot.index().dimension())
            .map_err(RetrievalError::QueryEmbedding)?;

        // A zero query scores every chunk 0 and would rank by position alone.
        if is_zero(&query) {
            return Err(RetrievalError::QueryEmbedding(
                EmbeddingError::InvalidResponse("query embedding is all zeros".to_string()),
            ));
        }

        if config.embedding.normalize {
            normalize(&mut query);
        }

        let ranked = snapshot.index().rank(&query, top_k)?;
        let hits: Vec<RetrievalHit> = ranked
            .into_iter()
            .filter_map(|scored| {
                snapshot.chunks().get(scored.index).map(|chunk| RetrievalHit {
                    index: scored.index,
                    score: scored.score,
                    text: chunk.text.clone(),
                })
            })
            .collect();

        debug!("Query matched {} of {} chunks", hits.len(), snapshot.len());
        Ok(RetrievalResult { hits })
    }

    /// Query with the configured default `top_k`.
    pub async fn query_default(&self, text: &str) -> Result<RetrievalResult> {
        self.query(text, self.store.config().query.top_k).await
    }

    /// Retrieve with the default `top_k` and join with the configured separator.
    pub async fn context_for(&self, text: &str) -> Result<String> {
        let result = self.query_default(text).await?;
        Ok(result.context(&self.store.config().query.separator))
    }
}
