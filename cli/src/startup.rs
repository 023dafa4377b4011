//! Provider construction and document loading at process start.

use std::path::Path;

use tracing::{info, warn};

use docqa_embeddings::GeminiProvider;
use docqa_retrieval::{BuildReport, EmbeddingConfig, IndexStore};

/// Build the embedding provider described by `config`.
pub fn provider_from_config(config: &EmbeddingConfig, api_key: &str) -> GeminiProvider {
    let provider = GeminiProvider::new()
        .with_api_key(api_key)
        .with_model(&config.model)
        .with_dimension(config.dimension)
        .with_timeout(config.request_timeout());

    match &config.base_url {
        Some(url) => provider.with_base_url(url),
        None => provider,
    }
}

/// Read the document and build the index before any question is served.
///
/// A missing or unreadable document is not fatal: the store is marked as
/// having no context and every question reports that.
pub async fn load_document(store: &IndexStore, path: &Path) -> Option<BuildReport> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(err) => {
            warn!(
                "Document {} could not be read ({err}), answering without context",
                path.display()
            );
            store.mark_source_unavailable().await;
            return None;
        }
    };

    info!("Loaded document {} ({} bytes)", path.display(), text.len());
    let report = store.build_from_text(&text).await;

    if !report.is_complete() {
        warn!(
            "{} of {} batches failed; {} chunks will not match any question",
            report.batches_failed, report.batches_attempted, report.zero_filled_chunks
        );
    }
    Some(report)
}
