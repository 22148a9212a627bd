//! Conversational question answering over one collection.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{info, instrument};

use crate::error::Result;
use crate::generation::{GenerationRequest, Generator};
use crate::memory::{ConversationMemory, Turn};
use crate::pipeline::RagPipeline;

/// A chat session: retrieval, streamed generation and bounded memory.
///
/// A turn is committed to memory only once its response stream completes.
/// A failed stream, or a `respond` future dropped midway, leaves memory as
/// it was.
pub struct ChatSession {
    pipeline: Arc<RagPipeline>,
    generator: Arc<dyn Generator>,
    collection: String,
    memory: ConversationMemory,
}

impl ChatSession {
    /// A session with memory sized by the pipeline's `memory_window`.
    pub fn new(pipeline: Arc<RagPipeline>, generator: Arc<dyn Generator>, collection: impl Into<String>) -> Self {
        let memory = ConversationMemory::new(pipeline.config().memory_window);
        Self { pipeline, generator, collection: collection.into(), memory }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Forget every committed turn.
    pub fn reset(&mut self) {
        self.memory.clear();
        info!(collection = %self.collection, "conversation reset");
    }

    /// Answer `prompt`, passing each fragment to `on_fragment` as it arrives.
    ///
    /// Returns the full response text.
    #[instrument(skip_all, fields(collection = %self.collection))]
    pub async fn respond<F>(&mut self, prompt: &str, mut on_fragment: F) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        let context = self.pipeline.retrieve(&self.collection, prompt).await?;
        let request = GenerationRequest {
            context: context.into_iter().map(|r| r.chunk.text).collect(),
            prompt: prompt.to_string(),
            history: self.memory.snapshot(),
        };

        let mut stream = self.generator.generate(request).await?;
        let mut response = String::new();
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            on_fragment(&fragment);
            response.push_str(&fragment);
        }

        self.memory.push(Turn::new(prompt, response.clone()));
        info!(generator = self.generator.name(), response_chars = response.chars().count(), "turn committed");
        Ok(response)
    }
}
