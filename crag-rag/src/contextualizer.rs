//! Per-chunk contextual enrichment.
//!
//! Every chunk is rewritten before indexing in three steps, each its own
//! model call with a fixed template:
//!
//! 1. a short context situating the chunk inside its document window,
//! 2. translation of context + chunk into the target language,
//! 3. wrapping with a source tag derived from the file name.
//!
//! The enrichment is baked into [`Chunk::text`]; re-indexing means
//! re-contextualizing from source.

use std::ops::RangeInclusive;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, info};

use crate::config::{ContextualizeConfig, RetryConfig};
use crate::document::{Chunk, SOURCE_KEY, SOURCE_TAG_KEY};
use crate::error::{RagError, Result};
use crate::llm::{CompletionRequest, LanguageModel};
use crate::retry::with_retry;

/// Opening delimiter of a contextualized chunk.
pub const DOCUMENT_OPEN: &str = "<documento>";
/// Closing delimiter of a contextualized chunk.
pub const DOCUMENT_CLOSE: &str = "</documento>";
/// Label placed before the source tag.
pub const SOURCE_LABEL: &str = "FUENTE";

fn context_prompt(window: &str, chunk: &str) -> String {
    format!(
        "You are an AI assistant specializing in design systems. \
Your task is to provide brief, relevant context for a chunk of text from the document provided.
Here is the document:
<document>
{window}
</document>

Here is the chunk we want to situate within the whole document:
<chunk>
{chunk}
</chunk>

Provide a concise context (2-3 sentences) for this chunk, following these guidelines:

1. Do not use phrases like \"This chunk discusses\", \"The chunk focuses\" or \"This section provides\", \
or any other reference to summarizing. Directly state the context.
2. Identify the main topic or metric discussed (e.g. archetypes, dynamics, hierarchy, system).
3. Mention any relevant time periods or comparisons.
4. If applicable, note how this information relates to design, strategy, or market position.
5. Include any key figures or percentages that provide important context.

Give a short succinct context to situate this chunk within the overall document for the \
purposes of improving search retrieval of the chunk. Answer only with the succinct context and nothing else.

Context:"
    )
}

fn translate_prompt(language: &str, text: &str) -> String {
    format!(
        "You are a good translator to {language}.
Given the next chunk, translate it to {language}:

<chunk>
{text}
</chunk>

Just give the translation, do not comment anything.
If the chunk is already in {language}, repeat the chunk."
    )
}

/// Derive the human-readable source tag of a file path.
///
/// Takes the file name up to its first `.`, replaces underscores with spaces
/// and title-cases every word: `data/thinking_systems.pdf` → `Thinking Systems`.
pub fn source_tag(path: &str) -> String {
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let stem = file_name.split('.').next().unwrap_or(file_name);
    title_case(&stem.replace('_', " "))
}

/// Uppercase the first letter of every alphabetic run and lowercase the rest.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_is_letter = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if previous_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            out.push(c);
            previous_is_letter = false;
        }
    }
    out
}

/// Pages (1-based, inclusive) whose text forms the context window of `page`.
///
/// The window is the page with its neighbours, clamped to `1..=page_count`.
/// `page` itself is clamped into range first, so the result never refers to a
/// page that does not exist.
pub fn page_window(page_count: usize, page: usize) -> RangeInclusive<usize> {
    if page_count == 0 {
        return 1..=0;
    }
    let page = page.clamp(1, page_count);
    page.saturating_sub(1).max(1)..=(page + 1).min(page_count)
}

/// One chunk together with the document window it is situated in.
#[derive(Debug, Clone)]
pub struct ContextRequest {
    /// Shared by every chunk cut from the same page or document.
    pub window: Arc<str>,
    pub chunk: Chunk,
}

/// Rewrites chunks with model-generated context.
pub struct Contextualizer {
    llm: Arc<dyn LanguageModel>,
    config: ContextualizeConfig,
    retry: RetryConfig,
}

impl Contextualizer {
    pub fn new(llm: Arc<dyn LanguageModel>, config: ContextualizeConfig, retry: RetryConfig) -> Self {
        Self { llm, config, retry }
    }

    /// Contextualize a single chunk against its document `window`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ChunkingError`] if the chunk was already
    /// contextualized and [`RagError::GenerationCallError`] once a model call
    /// exhausts its retries.
    pub async fn contextualize(&self, window: &str, mut chunk: Chunk) -> Result<Chunk> {
        if chunk.metadata.contains_key(SOURCE_TAG_KEY) {
            return Err(RagError::ChunkingError(format!(
                "chunk '{}' is already contextualized",
                chunk.id
            )));
        }

        let context = self
            .call("contextualize.context", CompletionRequest::user(context_prompt(window, &chunk.text)))
            .await?;

        let combined = format!("{}\n\n{}", context.trim(), chunk.text);
        let translated = self
            .call(
                "contextualize.translate",
                CompletionRequest::user(translate_prompt(&self.config.target_language, &combined)),
            )
            .await?;

        let source = chunk.metadata.get(SOURCE_KEY).cloned().unwrap_or_else(|| chunk.document_id.clone());
        let tag = source_tag(&source);
        chunk.text = format!("{DOCUMENT_OPEN} {SOURCE_LABEL}: {tag}. {}{DOCUMENT_CLOSE}", translated.trim());
        chunk.metadata.insert(SOURCE_TAG_KEY.to_string(), tag);

        debug!(chunk.id = %chunk.id, "chunk contextualized");
        Ok(chunk)
    }

    /// Contextualize many chunks on a bounded worker pool.
    ///
    /// Calls complete in any order; the output is in request order. The first
    /// failure cancels the remaining work and is returned.
    pub async fn contextualize_all(&self, requests: Vec<ContextRequest>) -> Result<Vec<Chunk>> {
        let total = requests.len();
        let mut done: Vec<(usize, Chunk)> = stream::iter(requests.into_iter().enumerate())
            .map(|(position, request)| async move {
                let chunk = self.contextualize(&request.window, request.chunk).await?;
                Ok::<_, RagError>((position, chunk))
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .try_collect()
            .await?;

        done.sort_by_key(|(position, _)| *position);
        info!(chunk_count = total, model = self.llm.name(), "contextualized chunks");
        Ok(done.into_iter().map(|(_, chunk)| chunk).collect())
    }

    /// One retried model call; blank completions count as failures.
    async fn call(&self, operation: &str, request: CompletionRequest) -> Result<String> {
        let llm = self.llm.as_ref();
        let request = &request;
        with_retry(operation, &self.retry, move || async move {
            let text = llm.complete(request).await?;
            if text.trim().is_empty() {
                return Err(RagError::LlmError {
                    provider: llm.name().to_string(),
                    message: "empty completion".to_string(),
                });
            }
            Ok(text)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_case_matches_word_boundaries() {
        assert_eq!(title_case("thinking systems from donella meadows"), "Thinking Systems From Donella Meadows");
        assert_eq!(title_case("DESIGN 101 notes"), "Design 101 Notes");
        assert_eq!(title_case("o'neil"), "O'Neil");
    }

    #[test]
    fn source_tag_strips_directories_and_extensions() {
        assert_eq!(source_tag("data/thinking_systems_from_donella_meadows.pdf"), "Thinking Systems From Donella Meadows");
        assert_eq!(source_tag("notes.v2.txt"), "Notes");
        assert_eq!(source_tag("C:\\docs\\sistemas_complejos.txt"), "Sistemas Complejos");
    }
}
