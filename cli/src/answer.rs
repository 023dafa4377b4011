//! Answer generation from retrieved context.
//!
//! The retrieval crate only produces the context string. This module wraps
//! it in the prompt and calls the generative model.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error};

use docqa_retrieval::{Readiness, RetrievalError, Retriever};

/// Instruction sent with every question.
pub const SYSTEM_INSTRUCTION: &str = "You are an assistant that answers questions about a \
single document. Answer the user's question using ONLY the provided CONTEXT. Do not invent \
information. If the answer is not in the CONTEXT, say: 'Sorry, I could not find that \
information in the document.'";

/// Default generation model.
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-2.5-flash";

/// Assemble the user prompt from retrieved context and the raw question.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!("CONTEXT:\n---\n{context}\n---\nUSER QUESTION: {question}")
}

/// Prompt in, text out.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, system_instruction: &str, prompt: &str) -> Result<String>;
}

/// Gemini `generateContent` client.
pub struct GeminiGenerator {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl GeminiGenerator {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: DEFAULT_GENERATION_MODEL.to_string(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    async fn generate(&self, system_instruction: &str, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "systemInstruction": { "parts": [{ "text": system_instruction }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });

        debug!("Generating answer with model: {}", self.model);

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("generation request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("generation API error ({status}): {error_text}"));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .context("failed to parse generation response")?;

        let text: String = result
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(anyhow!("generation response contained no text"));
        }
        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// User-facing text for a retrieval failure.
pub fn describe_retrieval_error(err: &RetrievalError) -> String {
    match err {
        RetrievalError::NotReady(Readiness::NotStarted) => {
            "No document has been loaded yet.".to_string()
        }
        RetrievalError::NotReady(_) => {
            "No document context is available to answer from.".to_string()
        }
        RetrievalError::QueryEmbedding(source) => {
            format!("Could not reach the embedding provider: {source}")
        }
        other => format!("Retrieval failed: {other}"),
    }
}

/// Retrieve context for `question` and ask the generator.
///
/// Every failure becomes a message for the user; nothing is guessed when
/// retrieval fails.
pub async fn respond(
    retriever: &Retriever,
    generator: &dyn AnswerGenerator,
    question: &str,
) -> String {
    let context = match retriever.context_for(question).await {
        Ok(context) => context,
        Err(err) => {
            error!("Retrieval failed: {err}");
            return describe_retrieval_error(&err);
        }
    };

    let prompt = build_prompt(&context, question);
    match generator.generate(SYSTEM_INSTRUCTION, &prompt).await {
        Ok(answer) => answer,
        Err(err) => {
            error!("Answer generation failed: {err:#}");
            format!("An error occurred while generating the answer: {err}")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use docqa_embeddings::{Embedding, EmbeddingError, EmbeddingProvider};
    use docqa_retrieval::{BuildConfig, IndexStore, RetrievalConfig};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    /// One-hot vectors keyed by the first letter.
    struct LetterProvider;

    #[async_trait]
    impl EmbeddingProvider for LetterProvider {
        fn name(&self) -> &str {
            "letters"
        }

        fn model(&self) -> &str {
            "letters"
        }

        fn dimension(&self) -> usize {
            3
        }

        fn max_batch_size(&self) -> usize {
            10
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> std::result::Result<Vec<Embedding>, EmbeddingError> {
            texts.iter().map(|t| letter(t.as_str())).collect()
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    fn letter(text: &str) -> std::result::Result<Embedding, EmbeddingError> {
        match text.chars().next() {
            Some('a') => Ok(vec![1.0, 0.0, 0.0]),
            Some('b') => Ok(vec![0.0, 1.0, 0.0]),
            Some('c') => Ok(vec![0.0, 0.0, 1.0]),
            _ => Err(EmbeddingError::ApiRequest("offline".to_string())),
        }
    }

    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AnswerGenerator for RecordingGenerator {
        async fn generate(&self, _system_instruction: &str, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("answer".to_string())
        }
    }

    fn store() -> Arc<IndexStore> {
        let mut config = RetrievalConfig::default().with_build(BuildConfig {
            batch_size: 10,
            max_attempts: 1,
            retry_delay_ms: 0,
        });
        config.embedding.dimension = 3;
        config.query.top_k = 2;
        Arc::new(IndexStore::new(Arc::new(LetterProvider), config).unwrap())
    }

    #[test]
    fn test_build_prompt() {
        assert_eq!(
            build_prompt("A\n---\nB", "what?"),
            "CONTEXT:\n---\nA\n---\nB\n---\nUSER QUESTION: what?"
        );
    }

    #[tokio::test]
    async fn test_respond_sends_ranked_context() {
        let store = store();
        store.build_from_text("alpha\nbeta\ncharlie\n").await;
        let generator = RecordingGenerator::default();

        let answer = respond(&store.retriever(), &generator, "b?").await;

        assert_eq!(answer, "answer");
        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(
            prompts[0],
            "CONTEXT:\n---\nbeta\n---\nalpha\n---\nUSER QUESTION: b?"
        );
    }

    #[tokio::test]
    async fn test_respond_distinguishes_failures() {
        let generator = RecordingGenerator::default();

        let store = store();
        let not_loaded = respond(&store.retriever(), &generator, "about a").await;
        assert_eq!(not_loaded, "No document has been loaded yet.");

        store.build_from_text("").await;
        let no_context = respond(&store.retriever(), &generator, "about a").await;
        assert_eq!(no_context, "No document context is available to answer from.");

        store.build_from_text("alpha\n").await;
        let unreachable = respond(&store.retriever(), &generator, "zzz").await;
        assert!(unreachable.starts_with("Could not reach the embedding provider"));

        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gemini_generator() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .and(body_partial_json(json!({
                "systemInstruction": { "parts": [{ "text": "sys" }] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [
                    { "content": { "parts": [{ "text": "Classes start " }, { "text": "in March." }] } }
                ]
            })))
            .mount(&server)
            .await;

        let generator = GeminiGenerator::new("key").with_base_url(server.uri());
        let answer = generator.generate("sys", "prompt").await.unwrap();
        assert_eq!(answer, "Classes start in March.");
    }

    #[test]
    fn test_query_timeout_reads_as_unreachable_provider() {
        let err = RetrievalError::QueryEmbedding(EmbeddingError::timeout(Duration::from_secs(1)));
        let message = describe_retrieval_error(&err);
        assert!(message.starts_with("Could not reach the embedding provider"));
        assert!(message.contains("timed out after 1000ms"));
    }

    #[tokio::test]
    async fn test_gemini_generator_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let generator = GeminiGenerator::new("key")
            .with_base_url(server.uri())
            .with_timeout(Duration::from_millis(50));
        let err = generator.generate("sys", "prompt").await.unwrap_err();
        assert!(err.to_string().contains("generation request failed"));
    }

    #[tokio::test]
    async fn test_gemini_generator_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let generator = GeminiGenerator::new("key").with_base_url(server.uri());
        let err = generator.generate("sys", "prompt").await.unwrap_err();
        assert!(err.to_string().contains("denied"));
    }
}
