//! Owner of the document's chunks and vector index.
//!
//! The store holds at most one [`IndexSnapshot`]. A build runs entirely
//! outside the lock and installs its snapshot in a single write, so readers
//! see either the previous pair or the new one, never a chunk sequence next
//! to an index of a different length.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use docqa_embeddings::EmbeddingProvider;

use crate::builder::{BuildReport, IndexBuilder};
use crate::chunker::{Chunk, chunk_text, join_pages};
use crate::config::RetrievalConfig;
use crate::error::{Result, RetrievalError};
use crate::index::VectorIndex;
use crate::retriever::Retriever;

/// Whether the store can answer queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum Readiness {
    /// No build has run yet.
    NotStarted,
    /// An index over `chunks` chunks is installed.
    Built { chunks: usize },
    /// A build ran but the document had no text, or no document was found.
    BuiltEmpty,
}

impl Readiness {
    /// Whether queries will be served.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Built { .. })
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "no document has been loaded"),
            Self::Built { chunks } => write!(f, "index built over {chunks} chunks"),
            Self::BuiltEmpty => write!(f, "no document context is available"),
        }
    }
}

/// Chunks and their vectors, installed and replaced together.
#[derive(Debug)]
pub struct IndexSnapshot {
    chunks: Vec<Chunk>,
    index: VectorIndex,
    report: BuildReport,
}

impl IndexSnapshot {
    /// The chunk sequence.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// The vector index aligned with [`Self::chunks`].
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Report of the build that produced this snapshot.
    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Check if the snapshot has no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

enum StoreState {
    NotStarted,
    Empty(BuildReport),
    Ready(Arc<IndexSnapshot>),
}

/// Process-wide owner of the retrieval state.
pub struct IndexStore {
    provider: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
    state: RwLock<StoreState>,
}

impl IndexStore {
    /// Create an empty store. The configuration is checked against the provider.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: RetrievalConfig) -> Result<Self> {
        config.validate(provider.max_batch_size())?;
        if config.embedding.dimension != provider.dimension() {
            return Err(RetrievalError::Config(format!(
                "embedding.dimension is {} but provider {} returns {}",
                config.embedding.dimension,
                provider.name(),
                provider.dimension()
            )));
        }

        Ok(Self {
            provider,
            config,
            state: RwLock::new(StoreState::NotStarted),
        })
    }

    /// The embedding provider.
    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// The active configuration.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Current readiness.
    pub async fn readiness(&self) -> Readiness {
        match &*self.state.read().await {
            StoreState::NotStarted => Readiness::NotStarted,
            StoreState::Empty(_) => Readiness::BuiltEmpty,
            StoreState::Ready(snapshot) => Readiness::Built {
                chunks: snapshot.len(),
            },
        }
    }

    /// The installed snapshot, or the readiness explaining why there is none.
    pub async fn current(&self) -> std::result::Result<Arc<IndexSnapshot>, Readiness> {
        match &*self.state.read().await {
            StoreState::NotStarted => Err(Readiness::NotStarted),
            StoreState::Empty(_) => Err(Readiness::BuiltEmpty),
            StoreState::Ready(snapshot) => Ok(Arc::clone(snapshot)),
        }
    }

    /// Report of the last build, if any ran.
    pub async fn last_report(&self) -> Option<BuildReport> {
        match &*self.state.read().await {
            StoreState::NotStarted => None,
            StoreState::Empty(report) => Some(report.clone()),
            StoreState::Ready(snapshot) => Some(snapshot.report.clone()),
        }
    }

    /// Chunk `text`, embed every chunk and install the result.
    pub async fn build_from_text(&self, text: &str) -> BuildReport {
        let chunks = chunk_text(text);
        info!("Document split into {} chunks", chunks.len());

        let builder = IndexBuilder::new(
            Arc::clone(&self.provider),
            self.config.embedding.clone(),
            self.config.build.clone(),
        );
        let outcome = builder.build(&chunks).await;
        let report = outcome.report.clone();

        let next = match outcome.index {
            Some(index) => StoreState::Ready(Arc::new(IndexSnapshot {
                chunks,
                index,
                report: outcome.report,
            })),
            None => StoreState::Empty(outcome.report),
        };
        *self.state.write().await = next;

        report
    }

    /// Build from extracted page texts.
    pub async fn build_from_pages<I, S>(&self, pages: I) -> BuildReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.build_from_text(&join_pages(pages)).await
    }

    /// Record that no source document could be read.
    pub async fn mark_source_unavailable(&self) {
        warn!("Source document unavailable, serving without context");
        *self.state.write().await = StoreState::Empty(BuildReport::default());
    }

    /// A query handle sharing this store.
    pub fn retriever(self: &Arc<Self>) -> Retriever {
        Retriever::new(Arc::clone(self))
    }
}
