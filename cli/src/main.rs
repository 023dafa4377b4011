use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use docqa_cli::{
    AnswerGenerator, Cli, GeminiGenerator, describe_retrieval_error, load_document,
    provider_from_config, respond,
};
use docqa_retrieval::{IndexStore, Retriever};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the key may come from the environment.
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.retrieval_config().context("failed to load configuration")?;

    let api_key = std::env::var(&config.embedding.api_key_env)
        .with_context(|| format!("{} is not set", config.embedding.api_key_env))?;

    let provider = provider_from_config(&config.embedding, &api_key);
    let store = Arc::new(IndexStore::new(Arc::new(provider), config)?);

    // Questions are only accepted once the build has finished.
    load_document(&store, &cli.document).await;
    info!("Ready: {}", store.readiness().await);

    let retriever = store.retriever();
    let generator = GeminiGenerator::new(api_key)
        .with_model(&cli.generation_model)
        .with_timeout(cli.generation_timeout());

    if let Some(question) = &cli.question {
        println!("{}", answer(&cli, &retriever, &generator, question).await);
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        println!("{}", answer(&cli, &retriever, &generator, question).await);
    }

    Ok(())
}

async fn answer(
    cli: &Cli,
    retriever: &Retriever,
    generator: &dyn AnswerGenerator,
    question: &str,
) -> String {
    if cli.context_only {
        return match retriever.context_for(question).await {
            Ok(context) => context,
            Err(err) => describe_retrieval_error(&err),
        };
    }
    respond(retriever, generator, question).await
}
