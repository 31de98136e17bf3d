// LLM client module
// Completion over a hosted chat model; the chat session only sees the `ChatModel` trait

pub mod groq;

use thiserror::Error;

pub use groq::GroqClient;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("No API key configured; set GROQ_API_KEY or run `legal-rag config`")]
    MissingApiKey,

    #[error("The LLM service rejected the API key (HTTP {0})")]
    Unauthorized(u16),

    #[error("The LLM service returned HTTP {0}")]
    Status(u16),

    #[error("Could not reach the LLM service: {0}")]
    Transport(String),

    #[error("Unexpected response from the LLM service: {0}")]
    InvalidResponse(String),

    #[error("The LLM service returned an empty completion")]
    EmptyCompletion,
}

impl LlmError {
    /// Errors that will not go away by asking again
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingApiKey | Self::Unauthorized(_))
    }
}

/// Turns one fully assembled prompt into one completion
pub trait ChatModel: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    fn model_name(&self) -> &str;
}
