//! Answer generation seam.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;
use crate::memory::Turn;

/// Incremental text fragments of a generated answer.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Everything the answer model sees for one turn.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// Retrieved chunk texts, best first.
    pub context: Vec<String>,
    /// The user's question.
    pub prompt: String,
    /// Previous turns, oldest first.
    pub history: Vec<Turn>,
}

/// Standing instruction of the answer model.
pub const ANSWER_SYSTEM_PROMPT: &str = "Tu funcion es responder preguntas al respecto de archivos pdfs que se van proporcionar.
Devuelve siempre una respuesta amplia y bien explicada.
No uses nunca frases como \"Basándonos en el contexto proporcionado...\", utiliza un estilo conversacional.";

impl GenerationRequest {
    /// Retrieved context joined into one block.
    pub fn context_block(&self) -> String {
        self.context.join("\n\n")
    }

    /// The user turn sent to the answer model.
    pub fn question_prompt(&self) -> String {
        format!(
            "Dada el siguiente contexto, responde la pregunta:\n\ncontexto: {},\n\npregunta: {}.",
            self.context_block(),
            self.prompt
        )
    }
}

/// A model that streams an answer for a [`GenerationRequest`].
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    /// Start generating. Errors before the first fragment are returned directly;
    /// later failures arrive as stream items.
    async fn generate(&self, request: GenerationRequest) -> Result<FragmentStream>;
}
