
use super::AssistantReply;

/// Name of the slot the history is exposed under
pub const MEMORY_KEY: &str = "chat_history";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryTurn {
    pub question: String,
    pub answer: String,
}

/// Ordered log of completed turns fed back into later prompts.
///
/// Only the answer text of a reply is kept; its sources never enter memory. There is no
/// eviction: the log grows until [`ConversationMemory::clear`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationMemory {
    turns: Vec<MemoryTurn>,
}

impl ConversationMemory {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn key(&self) -> &'static str {
        MEMORY_KEY
    }

    #[inline]
    pub fn record(&mut self, question: &str, reply: &AssistantReply) {
        self.turns.push(MemoryTurn {
            question: question.to_string(),
            answer: reply.answer.clone(),
        });
    }

    #[inline]
    pub fn turns(&self) -> &[MemoryTurn] {
        &self.turns
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// `Human:` / `Assistant:` lines, oldest first
    #[inline]
    pub fn render(&self) -> String {
        let mut rendered = String::new();
        for turn in &self.turns {
            rendered.push_str("Human: ");
            rendered.push_str(&turn.question);
            rendered.push_str("\nAssistant: ");
            rendered.push_str(&turn.answer);
            rendered.push('\n');
        }
        rendered
    }
}
