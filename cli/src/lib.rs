//! Command-line front end for document question answering.
//!
//! Loads one document, builds its vector index, then answers questions
//! with context retrieved from it.

pub mod answer;
pub mod args;
pub mod startup;

pub use answer::{
    AnswerGenerator, GeminiGenerator, build_prompt, describe_retrieval_error, respond,
};
pub use args::Cli;
pub use startup::{load_document, provider_from_config};
