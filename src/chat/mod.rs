// Chat module
// Retrieval, prompt assembly, conversation memory and the per-session turn loop

pub mod memory;
pub mod prompt;
pub mod retriever;
pub mod session;

pub use memory::{ConversationMemory, MEMORY_KEY, MemoryTurn};
pub use prompt::{ContextExcerpt, LEGAL_ASSISTANT_TEMPLATE, NO_CASES_FOUND, PromptAssembler};
pub use retriever::{RetrievedCase, Retriever};
pub use session::{ChatSession, SessionState, TranscriptEntry, TurnError};

/// What the assistant produced for one turn. `sources` is a side channel for display only.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantReply {
    pub answer: String,
    pub sources: Vec<RetrievedCase>,
    /// Set when the case database could not be searched; the answer was given without cases
    pub retrieval_error: Option<String>,
}
