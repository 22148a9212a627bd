//! Deterministic stand-ins for the network services used by the pipeline.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use crag_rag::bm25::tokenize;
use crag_rag::{
    Chunk, CompletionRequest, EmbeddingProvider, FragmentStream, GenerationRequest, Generator, LanguageModel,
    Metadata, RagError, Reranker, Result, SearchResult,
};

/// Bag-of-words embeddings: every token is hashed into one of `dims` buckets.
///
/// Texts sharing vocabulary get similar vectors, identical texts identical ones.
pub struct HashEmbedder {
    dims: usize,
    batch_calls: AtomicUsize,
    single_calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims, batch_calls: AtomicUsize::new(0), single_calls: AtomicUsize::new(0) }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in tokenize(text) {
            v[fnv1a(&token) as usize % self.dims] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn single_calls(&self) -> usize {
        self.single_calls.load(Ordering::SeqCst)
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(0xcbf2_9ce4_8422_2325u64, |hash, b| (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3))
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// Text between the first `<tag>` and `</tag>` of a prompt.
pub fn between<'a>(prompt: &'a str, tag: &str) -> &'a str {
    let open = format!("<{tag}>\n");
    let close = format!("\n</{tag}>");
    let start = prompt.find(&open).map(|i| i + open.len()).unwrap_or(0);
    let end = prompt[start..].find(&close).map(|i| start + i).unwrap_or(prompt.len());
    &prompt[start..end]
}

/// A language model that answers the contextualization templates.
///
/// Context prompts get a fixed Spanish sentence; translation prompts echo
/// the text to translate. The first `failures` calls fail, and calls for
/// chunks containing `slow_marker` sleep for `slow_delay` first.
pub struct ScriptedLlm {
    failures: AtomicUsize,
    calls: AtomicUsize,
    empty_responses: AtomicUsize,
    windows: Mutex<Vec<String>>,
    delay: Option<(String, Duration)>,
}

pub const CONTEXT_SENTENCE: &str = "Este fragmento explica la teoría de sistemas.";

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            failures: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            empty_responses: AtomicUsize::new(0),
            windows: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Fail the first `n` calls with a retryable error.
    pub fn failing(n: usize) -> Self {
        let llm = Self::new();
        llm.failures.store(n, Ordering::SeqCst);
        llm
    }

    /// Return a blank completion for the first `n` calls.
    pub fn blank(n: usize) -> Self {
        let llm = Self::new();
        llm.empty_responses.store(n, Ordering::SeqCst);
        llm
    }

    /// Sleep `delay` before answering any prompt containing `marker`.
    pub fn with_delay(mut self, marker: &str, delay: Duration) -> Self {
        self.delay = Some((marker.to_string(), delay));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Document windows seen by context prompts, in call order.
    pub fn windows(&self) -> Vec<String> {
        self.windows.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(request.temperature, 0.0, "contextualization must be deterministic");

        if let Some((marker, delay)) = &self.delay {
            if request.user.contains(marker.as_str()) {
                tokio::time::sleep(*delay).await;
            }
        }
        if take_one(&self.failures) {
            return Err(RagError::LlmError { provider: "scripted".into(), message: "service unavailable".into() });
        }
        if take_one(&self.empty_responses) {
            return Ok("   ".to_string());
        }

        if request.user.contains("<document>") {
            if let Ok(mut windows) = self.windows.lock() {
                windows.push(between(&request.user, "document").to_string());
            }
            Ok(CONTEXT_SENTENCE.to_string())
        } else {
            Ok(between(&request.user, "chunk").to_string())
        }
    }
}

/// A language model that never answers within any reasonable timeout.
pub struct HangingLlm;

#[async_trait]
impl LanguageModel for HangingLlm {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("too late".to_string())
    }
}

/// Scores each candidate by how many query tokens its text contains.
#[derive(Default)]
pub struct KeywordReranker {
    calls: AtomicUsize,
}

impl KeywordReranker {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reranker for KeywordReranker {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn rerank(&self, query: &str, mut results: Vec<SearchResult>) -> Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let query_tokens = tokenize(query);
        for result in &mut results {
            let tokens = tokenize(&result.chunk.text);
            result.score = query_tokens.iter().filter(|q| tokens.contains(q)).count() as f32;
        }
        Ok(results)
    }
}

/// Assigns scores from a fixed table keyed by chunk text and returns candidates reversed.
pub struct TableReranker {
    pub scores: Vec<(String, f32)>,
}

#[async_trait]
impl Reranker for TableReranker {
    fn name(&self) -> &str {
        "table"
    }

    async fn rerank(&self, _query: &str, results: Vec<SearchResult>) -> Result<Vec<SearchResult>> {
        Ok(results
            .into_iter()
            .rev()
            .map(|mut r| {
                r.score = self.scores.iter().find(|(t, _)| *t == r.chunk.text).map_or(0.0, |(_, s)| *s);
                r
            })
            .collect())
    }
}

/// Streams fixed fragments, optionally failing after `fail_after` of them.
pub struct ScriptedGenerator {
    fragments: Vec<String>,
    fail_after: Option<usize>,
    requests: Mutex<VecDeque<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            fail_after: None,
            requests: Mutex::new(VecDeque::new()),
        }
    }

    pub fn failing_after(fragments: &[&str], fail_after: usize) -> Self {
        Self { fail_after: Some(fail_after), ..Self::new(fragments) }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().map(|r| r.iter().cloned().collect()).unwrap_or_default()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<FragmentStream> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push_back(request);
        }
        let mut items: Vec<Result<String>> = self.fragments.iter().cloned().map(Ok).collect();
        if let Some(n) = self.fail_after {
            items.truncate(n);
            items.push(Err(RagError::LlmError { provider: "scripted".into(), message: "stream reset".into() }));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

pub fn chunk(id: &str, text: &str) -> Chunk {
    let mut metadata = Metadata::new();
    metadata.insert("source".to_string(), "data/test.txt".to_string());
    Chunk { id: id.to_string(), text: text.to_string(), embedding: Vec::new(), metadata, document_id: "doc".to_string() }
}

pub fn result(text: &str, score: f32) -> SearchResult {
    SearchResult { chunk: chunk(text, text), score }
}
