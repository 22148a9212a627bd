//! Language model trait used for chunk contextualization.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single-shot completion request: an optional system instruction and a user turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub user: String,
    /// Sampling temperature. Contextualization always uses 0.
    pub temperature: f32,
}

impl CompletionRequest {
    /// A deterministic (temperature 0) request with only a user turn.
    pub fn user(prompt: impl Into<String>) -> Self {
        Self { system: None, user: prompt.into(), temperature: 0.0 }
    }
}

/// A model that turns a [`CompletionRequest`] into text.
///
/// Implementations perform exactly one network call per invocation and do
/// not retry; retries and timeouts are applied by the caller. Failures should
/// be reported as [`RagError::LlmError`](crate::RagError::LlmError) so they
/// are classified as retryable.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider or model name, used in logs.
    fn name(&self) -> &str;

    /// Produce the full completion text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}
