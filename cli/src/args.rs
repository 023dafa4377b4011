//! Command-line arguments.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use docqa_retrieval::RetrievalConfig;

use crate::answer::DEFAULT_GENERATION_MODEL;

#[derive(Parser, Debug)]
#[command(
    name = "docqa",
    about = "Answer questions about a document using retrieved context"
)]
pub struct Cli {
    /// Text file holding the extracted document, one page after another.
    #[arg(long, env = "DOCQA_DOCUMENT", default_value = "document.txt")]
    pub document: PathBuf,

    /// TOML file with retrieval settings.
    #[arg(long, env = "DOCQA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Chunks retrieved per question.
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Chunks sent per embedding call while indexing.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Embedding model identifier.
    #[arg(long, env = "DOCQA_EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    /// Generation model identifier.
    #[arg(long, env = "DOCQA_GENERATION_MODEL", default_value = DEFAULT_GENERATION_MODEL)]
    pub generation_model: String,

    /// Seconds to wait for a generated answer.
    #[arg(long, env = "DOCQA_GENERATION_TIMEOUT_SECS", default_value_t = 60)]
    pub generation_timeout_secs: u64,

    /// Print the retrieved context instead of generating an answer.
    #[arg(long)]
    pub context_only: bool,

    /// Question to answer. Questions are read from stdin, one per line, when omitted.
    pub question: Option<String>,
}

impl Cli {
    /// The configuration file (or defaults) with flag overrides applied.
    pub fn retrieval_config(&self) -> docqa_retrieval::Result<RetrievalConfig> {
        let mut config = match &self.config {
            Some(path) => RetrievalConfig::load(path)?,
            None => RetrievalConfig::default(),
        };

        if let Some(top_k) = self.top_k {
            config.query.top_k = top_k;
        }
        if let Some(batch_size) = self.batch_size {
            config.build.batch_size = batch_size;
        }
        if let Some(model) = &self.embedding_model {
            config.embedding.model = model.clone();
        }

        Ok(config)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}
