//! Batched embedding of a chunk sequence into a [`VectorIndex`].
//!
//! Chunks go to the provider in fixed-size batches, in order. A failing batch
//! is retried with a fixed delay. When every attempt fails, the batch's slots
//! are filled with zero vectors, so vector `i` still belongs to chunk `i` and
//! the build always finishes.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use docqa_embeddings::{Embedding, EmbeddingError, EmbeddingProvider, normalize, validate_batch};

use crate::chunker::Chunk;
use crate::config::{BuildConfig, EmbeddingConfig};
use crate::index::VectorIndex;

/// Counters describing one index build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Chunks submitted to the build.
    pub chunks: usize,

    /// Batches sent to the provider at least once.
    pub batches_attempted: usize,

    /// Batches that eventually produced valid vectors.
    pub batches_succeeded: usize,

    /// Batches that exhausted every attempt.
    pub batches_failed: usize,

    /// Attempts beyond the first, across all batches.
    pub retries: usize,

    /// Attempts that ran out of time.
    pub timeouts: usize,

    /// Chunks whose vector was replaced by zeros.
    pub zero_filled_chunks: usize,

    /// Wall-clock time of the build.
    pub elapsed: Duration,
}

impl BuildReport {
    /// Whether every batch embedded successfully.
    pub fn is_complete(&self) -> bool {
        self.batches_failed == 0
    }
}

/// Result of a build: the index (absent for an empty document) and its report.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub index: Option<VectorIndex>,
    pub report: BuildReport,
}

/// Drives an [`EmbeddingProvider`] over a chunk sequence.
pub struct IndexBuilder {
    provider: Arc<dyn EmbeddingProvider>,
    embedding: EmbeddingConfig,
    build: BuildConfig,
}

impl IndexBuilder {
    /// Create a new builder.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        embedding: EmbeddingConfig,
        build: BuildConfig,
    ) -> Self {
        Self {
            provider,
            embedding,
            build,
        }
    }

    /// Embed every chunk and assemble the index.
    pub async fn build(&self, chunks: &[Chunk]) -> BuildOutcome {
        let start = Instant::now();
        let mut report = BuildReport {
            chunks: chunks.len(),
            ..BuildReport::default()
        };

        if chunks.is_empty() {
            warn!("No chunks to embed, leaving index unset");
            return BuildOutcome {
                index: None,
                report,
            };
        }

        let dimension = self.provider.dimension();
        let batch_size = self.build.batch_size.max(1);
        let total_batches = chunks.len().div_ceil(batch_size);
        let mut vectors: Vec<Embedding> = Vec::with_capacity(chunks.len());

        info!(
            "Embedding {} chunks in {total_batches} batches of up to {batch_size} with {}",
            chunks.len(),
            self.provider.name()
        );

        for (batch_number, batch) in chunks.chunks(batch_size).enumerate() {
            let batch_number = batch_number + 1;
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

            debug!("Processing batch {batch_number}/{total_batches}: {} chunks", texts.len());
            report.batches_attempted += 1;

            match self.embed_with_retry(batch_number, &texts, &mut report).await {
                Some(batch_vectors) => {
                    report.batches_succeeded += 1;
                    vectors.extend(batch_vectors);
                }
                None => {
                    warn!(
                        "Batch {batch_number} failed after {} attempts, substituting {} zero vectors",
                        self.build.max_attempts,
                        texts.len()
                    );
                    report.batches_failed += 1;
                    report.zero_filled_chunks += texts.len();
                    vectors.extend(std::iter::repeat_n(vec![0.0f32; dimension], texts.len()));
                }
            }
        }

        report.elapsed = start.elapsed();
        info!(
            "Built index of {} vectors ({} batches ok, {} failed, {} retries) in {}ms",
            vectors.len(),
            report.batches_succeeded,
            report.batches_failed,
            report.retries,
            report.elapsed.as_millis()
        );

        BuildOutcome {
            index: Some(VectorIndex::from_aligned(dimension, vectors)),
            report,
        }
    }

    async fn embed_with_retry(
        &self,
        batch_number: usize,
        texts: &[String],
        report: &mut BuildReport,
    ) -> Option<Vec<Embedding>> {
        let max_attempts = self.build.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.embed_once(texts).await {
                Ok(mut vectors) => {
                    if self.embedding.normalize {
                        for vector in &mut vectors {
                            normalize(vector);
                        }
                    }
                    return Some(vectors);
                }
                Err(err) => {
                    if err.is_timeout() {
                        report.timeouts += 1;
                    }
                    warn!("Batch {batch_number} attempt {attempt}/{max_attempts} failed: {err}");
                    if attempt < max_attempts {
                        report.retries += 1;
                        tokio::time::sleep(self.build.retry_delay()).await;
                    }
                }
            }
        }

        None
    }

    async fn embed_once(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        let timeout = self.embedding.request_timeout();
        let vectors = tokio::time::timeout(timeout, self.provider.embed_batch(texts))
            .await
            .map_err(|_| EmbeddingError::timeout(timeout))??;

        validate_batch(texts.len(), &vectors, self.provider.dimension())?;
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::chunker::chunk_text;

    /// Embeds `"<n>"` as `[n, 1]`. The first `failures` calls fail, and the
    /// first `stalls` calls sleep for `stall` before answering.
    struct CountingProvider {
        calls: AtomicUsize,
        failures: usize,
        stalls: usize,
        stall: Duration,
        batch_sizes: Mutex<Vec<usize>>,
    }

    impl CountingProvider {
        fn failing(failures: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures,
                stalls: 0,
                stall: Duration::ZERO,
                batch_sizes: Mutex::new(Vec::new()),
            }
        }

        fn stalling(stalls: usize, stall: Duration) -> Self {
            Self {
                stalls,
                stall,
                ..Self::failing(0)
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn model(&self) -> &str {
            "counting-model"
        }

        fn dimension(&self) -> usize {
            2
        }

        fn max_batch_size(&self) -> usize {
            100
        }

        async fn embed_batch(&self, texts: &[String]) -> docqa_embeddings::Result<Vec<Embedding>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.batch_sizes.lock().unwrap().push(texts.len());
            if call < self.stalls {
                tokio::time::sleep(self.stall).await;
            }
            if call < self.failures {
                return Err(EmbeddingError::ApiRequest("unavailable".to_string()));
            }
            Ok(texts
                .iter()
                .map(|t| vec![t.parse::<f32>().unwrap(), 1.0])
                .collect())
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    fn builder(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> IndexBuilder {
        IndexBuilder::new(
            provider,
            EmbeddingConfig {
                normalize: false,
                ..EmbeddingConfig::default()
            },
            BuildConfig {
                batch_size,
                max_attempts: 3,
                retry_delay_ms: 0,
            },
        )
    }

    fn numbered(n: usize) -> Vec<Chunk> {
        let text: String = (0..n).map(|i| format!("{i}\n")).collect();
        chunk_text(&text)
    }

    #[tokio::test]
    async fn test_empty_chunks_leave_index_unset() {
        let provider = Arc::new(CountingProvider::failing(0));
        let outcome = builder(provider.clone(), 20).build(&[]).await;

        assert!(outcome.index.is_none());
        assert_eq!(outcome.report.batches_attempted, 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_batches_stay_aligned() {
        let provider = Arc::new(CountingProvider::failing(0));
        let chunks = numbered(45);
        let outcome = builder(provider.clone(), 20).build(&chunks).await;

        let index = outcome.index.unwrap();
        assert_eq!(index.len(), chunks.len());
        for chunk in &chunks {
            assert_eq!(index.get(chunk.index).unwrap()[0], chunk.index as f32);
        }
        assert_eq!(*provider.batch_sizes.lock().unwrap(), vec![20, 20, 5]);
        assert_eq!(outcome.report.batches_succeeded, 3);
        assert!(outcome.report.is_complete());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let provider = Arc::new(CountingProvider::failing(2));
        let outcome = builder(provider.clone(), 20).build(&numbered(5)).await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.report.retries, 2);
        assert_eq!(outcome.report.zero_filled_chunks, 0);
        assert_eq!(outcome.index.unwrap().get(4).unwrap(), &vec![4.0, 1.0]);
    }

    #[tokio::test]
    async fn test_exhausted_batch_is_zero_filled() {
        // The first batch burns all three attempts, the second succeeds.
        let provider = Arc::new(CountingProvider::failing(3));
        let outcome = builder(provider.clone(), 2).build(&numbered(3)).await;

        let report = &outcome.report;
        assert_eq!(report.batches_attempted, 2);
        assert_eq!(report.batches_failed, 1);
        assert_eq!(report.zero_filled_chunks, 2);
        assert_eq!(report.retries, 2);

        let index = outcome.index.unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.get(0).unwrap(), &vec![0.0, 0.0]);
        assert_eq!(index.get(1).unwrap(), &vec![0.0, 0.0]);
        assert_eq!(index.get(2).unwrap(), &vec![2.0, 1.0]);
    }

    #[tokio::test]
    async fn test_vectors_normalized_when_configured() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(CountingProvider::failing(0));
        let builder = IndexBuilder::new(
            provider,
            EmbeddingConfig::default(),
            BuildConfig {
                retry_delay_ms: 0,
                ..BuildConfig::default()
            },
        );
        let chunks = chunk_text("3\n");
        let index = builder.build(&chunks).await.index.unwrap();

        let v = index.get(0).unwrap();
        assert!((v[0] - 0.9486833).abs() < 1e-5);
        assert!((v[1] - 0.31622776).abs() < 1e-5);
    }

    fn slow_builder(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> IndexBuilder {
        IndexBuilder::new(
            provider,
            EmbeddingConfig {
                normalize: false,
                request_timeout_secs: 1,
                ..EmbeddingConfig::default()
            },
            BuildConfig {
                batch_size,
                max_attempts: 3,
                retry_delay_ms: 200,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_batch_is_retried_then_zero_filled() {
        // Every attempt on the first batch hangs past the 1s timeout.
        let provider = Arc::new(CountingProvider::stalling(3, Duration::from_secs(5)));
        let outcome = slow_builder(provider.clone(), 2).build(&numbered(3)).await;

        let report = &outcome.report;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
        assert_eq!(report.timeouts, 3);
        assert_eq!(report.retries, 2);
        assert_eq!(report.batches_failed, 1);
        assert_eq!(report.zero_filled_chunks, 2);
        assert!(report.elapsed >= Duration::from_millis(3 * 1000 + 2 * 200));

        let index = outcome.index.unwrap();
        assert_eq!(index.get(0).unwrap(), &vec![0.0, 0.0]);
        assert_eq!(index.get(1).unwrap(), &vec![0.0, 0.0]);
        assert_eq!(index.get(2).unwrap(), &vec![2.0, 1.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_recovers_on_retry() {
        let provider = Arc::new(CountingProvider::stalling(1, Duration::from_secs(5)));
        let outcome = slow_builder(provider.clone(), 20).build(&numbered(3)).await;

        let report = &outcome.report;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.timeouts, 1);
        assert_eq!(report.retries, 1);
        assert!(report.is_complete());
        assert!(report.elapsed >= Duration::from_millis(1000 + 200));
        assert_eq!(outcome.index.unwrap().get(1).unwrap(), &vec![1.0, 1.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_fixed_delay() {
        let provider = Arc::new(CountingProvider::failing(2));
        let outcome = slow_builder(provider.clone(), 20).build(&numbered(2)).await;

        assert_eq!(outcome.report.retries, 2);
        assert_eq!(outcome.report.timeouts, 0);
        assert!(outcome.report.elapsed >= Duration::from_millis(2 * 200));
    }
}
