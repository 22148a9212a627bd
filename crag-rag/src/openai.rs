//! OpenAI-compatible embedding and chat clients.
//!
//! This module is only available when the `openai` feature is enabled. Any
//! server exposing `/v1/embeddings` and `/v1/chat/completions` works by
//! setting a base URL.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{ANSWER_SYSTEM_PROMPT, FragmentStream, GenerationRequest, Generator};
use crate::llm::{CompletionRequest, LanguageModel};

/// The default OpenAI API root.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// The default model for OpenAI embeddings.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

const PROVIDER: &str = "OpenAI";

fn api_key_from_env() -> Option<String> {
    std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty())
}

fn base_url_from_env() -> String {
    std::env::var("OPENAI_BASE_URL").ok().filter(|u| !u.is_empty()).unwrap_or_else(|| OPENAI_BASE_URL.to_string())
}

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-3-small`.
/// - `dimensions` – optional Matryoshka dimension override.
/// - `api_key` – from the constructor or the `OPENAI_API_KEY` environment variable.
/// - `base_url` – defaults to `OPENAI_BASE_URL` or the public API.
///
/// # Example
///
/// ```rust,ignore
/// use crag_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("sk-...")?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider with the given API key.
    ///
    /// Uses the default model (`text-embedding-3-small`) and dimensions (1536).
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: "API key must not be empty".into(),
            });
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url_from_env(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Create a new provider using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = api_key_from_env().ok_or_else(|| RagError::EmbeddingError {
            provider: PROVIDER.into(),
            message: "OPENAI_API_KEY environment variable not set".into(),
        })?;
        Self::new(api_key)
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the API root, e.g. `http://localhost:1234/v1`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// When set, the API returns embeddings truncated to this size.
    /// This also updates the value returned by [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChunk {
    choices: Vec<ChatChunkChoice>,
}

#[derive(Deserialize)]
struct ChatChunkChoice {
    delta: ChatDelta,
}

#[derive(Deserialize)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Describe a non-success response, preferring the API's own error message.
async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
    format!("API returned {status}: {detail}")
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| RagError::EmbeddingError {
            provider: PROVIDER.into(),
            message: "API returned empty response".into(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let request_body =
            EmbeddingRequest { model: &self.model, input: texts.to_vec(), dimensions: self.request_dimensions };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                RagError::EmbeddingError { provider: PROVIDER.into(), message: format!("request failed: {e}") }
            })?;

        if !response.status().is_success() {
            let message = error_detail(response).await;
            error!(provider = PROVIDER, %message, "API error");
            return Err(RagError::EmbeddingError { provider: PROVIDER.into(), message });
        }

        let embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: format!("failed to parse response: {e}"),
            }
        })?;

        Ok(embedding_response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ── Chat completions ───────────────────────────────────────────────

/// A chat model behind `/chat/completions`.
///
/// Implements [`LanguageModel`] with single-shot completions (used for
/// contextualization) and [`Generator`] with server-sent-event streaming
/// (used for answers).
#[derive(Clone)]
pub struct OpenAIChatModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: Option<f32>,
}

impl OpenAIChatModel {
    /// Create a client for `model` with the given API key.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::LlmError {
                provider: PROVIDER.into(),
                message: "API key must not be empty".into(),
            });
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url_from_env(),
            model: model.into(),
            temperature: None,
        })
    }

    /// Create a client for `model` using the `OPENAI_API_KEY` environment variable.
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = api_key_from_env().ok_or_else(|| RagError::LlmError {
            provider: PROVIDER.into(),
            message: "OPENAI_API_KEY environment variable not set".into(),
        })?;
        Self::new(api_key, model)
    }

    /// Set the API root, e.g. `http://localhost:1234/v1`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sampling temperature for streamed answers. Completions use the request's own.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn answer_request<'a>(&'a self, request: &'a GenerationRequest, question: &'a str) -> ChatRequest<'a> {
        let mut messages = vec![ChatMessage { role: "system", content: ANSWER_SYSTEM_PROMPT }];
        for turn in &request.history {
            messages.push(ChatMessage { role: "user", content: &turn.question });
            messages.push(ChatMessage { role: "assistant", content: &turn.response });
        }
        messages.push(ChatMessage { role: "user", content: question });
        ChatRequest { model: &self.model, messages, temperature: self.temperature, stream: true }
    }

    async fn post(&self, body: &ChatRequest<'_>) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, model = %self.model, error = %e, "request failed");
                RagError::LlmError { provider: PROVIDER.into(), message: format!("request failed: {e}") }
            })?;

        if !response.status().is_success() {
            let message = error_detail(response).await;
            error!(provider = PROVIDER, model = %self.model, %message, "API error");
            return Err(RagError::LlmError { provider: PROVIDER.into(), message });
        }
        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage { role: "system", content: system });
        }
        messages.push(ChatMessage { role: "user", content: &request.user });

        let body =
            ChatRequest { model: &self.model, messages, temperature: Some(request.temperature), stream: false };
        debug!(provider = PROVIDER, model = %self.model, prompt_len = request.user.len(), "chat completion");

        let response: ChatResponse = self.post(&body).await?.json().await.map_err(|e| RagError::LlmError {
            provider: PROVIDER.into(),
            message: format!("failed to parse response: {e}"),
        })?;

        Ok(response.choices.into_iter().next().and_then(|c| c.message.content).unwrap_or_default())
    }
}

#[async_trait]
impl Generator for OpenAIChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: GenerationRequest) -> Result<FragmentStream> {
        let question = request.question_prompt();
        let body = self.answer_request(&request, &question);
        let response = self.post(&body).await?;
        debug!(provider = PROVIDER, model = %self.model, history = request.history.len(), "answer stream opened");

        Ok(sse_fragments(response.bytes_stream()))
    }
}

// ── Server-sent events ─────────────────────────────────────────────

#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(String),
    Done,
    Skip,
}

/// Decode a chat completion event stream into answer fragments.
///
/// A final event without a trailing newline is still delivered.
fn sse_fragments<S, B, E>(bytes: S) -> FragmentStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let mut bytes = Box::pin(bytes);
    let stream = try_stream! {
        let mut buffer: Vec<u8> = Vec::new();
        let mut done = false;
        while !done {
            let Some(chunk) = bytes.next().await else { break };
            let chunk = chunk.map_err(|e| RagError::LlmError {
                provider: PROVIDER.into(),
                message: format!("stream error: {e}"),
            })?;
            buffer.extend_from_slice(chunk.as_ref());

            for line in drain_lines(&mut buffer) {
                match parse_event(&line)? {
                    SseEvent::Done => {
                        done = true;
                        break;
                    }
                    SseEvent::Delta(text) => yield text,
                    SseEvent::Skip => {}
                }
            }
        }

        if !done {
            let rest = String::from_utf8_lossy(&buffer).trim().to_string();
            if let SseEvent::Delta(text) = parse_event(&rest)? {
                yield text;
            }
        }
    };
    Box::pin(stream)
}

/// Remove every complete line from `buffer`, leaving a trailing partial line.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let Some(last_newline) = buffer.iter().rposition(|&b| b == b'\n') else {
        return Vec::new();
    };
    let complete: Vec<u8> = buffer.drain(..=last_newline).collect();
    String::from_utf8_lossy(&complete).lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect()
}

fn parse_event(line: &str) -> Result<SseEvent> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseEvent::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    let chunk: ChatChunk = serde_json::from_str(data).map_err(|e| RagError::LlmError {
        provider: PROVIDER.into(),
        message: format!("malformed stream event: {e}"),
    })?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|t| !t.is_empty())
        .map_or(SseEvent::Skip, SseEvent::Delta))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_lines_stay_buffered() {
        let mut buffer = b"data: {\"choices\":[]}\ndata: {\"cho".to_vec();
        let lines = drain_lines(&mut buffer);
        assert_eq!(lines, vec!["data: {\"choices\":[]}".to_string()]);
        assert_eq!(buffer, b"data: {\"cho".to_vec());
    }

    #[test]
    fn events_are_classified() {
        assert_eq!(parse_event("data: [DONE]").unwrap(), SseEvent::Done);
        assert_eq!(parse_event(": keep-alive").unwrap(), SseEvent::Skip);
        assert_eq!(
            parse_event(r#"data: {"choices":[{"delta":{"content":"Hola"}}]}"#).unwrap(),
            SseEvent::Delta("Hola".to_string())
        );
        assert_eq!(parse_event(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(), SseEvent::Skip);
        assert!(parse_event("data: {not json").is_err());
    }

    #[test]
    fn answer_requests_carry_history_and_temperature() {
        let request = GenerationRequest {
            context: vec!["Un sistema complejo.".to_string()],
            prompt: "¿y un bucle?".to_string(),
            history: vec![crate::memory::Turn::new("¿qué es un sistema?", "Un conjunto.")],
        };
        let question = request.question_prompt();

        let model = OpenAIChatModel::new("clave", "gpt-4.1").unwrap();
        let body = serde_json::to_value(model.answer_request(&request, &question)).unwrap();
        assert!(body.get("temperature").is_none());
        let roles: Vec<_> = body["messages"].as_array().unwrap().iter().map(|m| m["role"].clone()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(body["messages"][3]["content"], question.as_str());
        assert_eq!(body["stream"], true);

        let model = model.with_temperature(0.25);
        let body = serde_json::to_value(model.answer_request(&request, &question)).unwrap();
        assert_eq!(body["temperature"], 0.25);
    }

    fn delta(text: &str) -> String {
        format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{text}\"}}}}]}}")
    }

    async fn collect(chunks: Vec<String>) -> Result<Vec<String>> {
        let bytes = futures::stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>));
        let mut stream = sse_fragments(bytes);
        let mut fragments = Vec::new();
        while let Some(fragment) = stream.next().await {
            fragments.push(fragment?);
        }
        Ok(fragments)
    }

    #[tokio::test]
    async fn unterminated_final_event_is_delivered() {
        let last = delta("complejo");
        let chunks = vec![format!("{}\n\n{}", delta("Un sistema "), &last[..20]), last[20..].to_string()];
        assert_eq!(collect(chunks).await.unwrap(), vec!["Un sistema ", "complejo"]);
    }

    #[tokio::test]
    async fn done_marker_ends_the_stream() {
        let chunks = vec![format!("{}\n\ndata: [DONE]\n\n{}", delta("Hola"), delta("ignorado"))];
        assert_eq!(collect(chunks).await.unwrap(), vec!["Hola"]);
    }
}
