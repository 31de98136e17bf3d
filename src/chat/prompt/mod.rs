
use std::fmt::Write as _;
use tracing::debug;

use super::memory::ConversationMemory;
use super::retriever::RetrievedCase;

/// Fixed instructions sent with every question. `{question}` is the only placeholder.
pub const LEGAL_ASSISTANT_TEMPLATE: &str = "\
You are a legal assistant specialized in the US legal domain. Your goal is to help the user by \
providing detailed and relevant legal information for their query.
The user will ask questions related to legal cases, and you should respond by:

1. Retrieving and listing 2 similar cases from the database.
2. Recommending the most applicable precedent case and explaining why it is relevant.
3. Predicting the likely judgment of the case based on historical case outcomes and precedents.

Your response should be clear, concise, and based on historical legal data to ensure accuracy. \
Please ensure that you provide:
- Two relevant similar cases with their basic details (e.g., case title, year, parties involved).
- One relevant precedent case with an explanation of why it applies.
- A reasoned prediction of the likely judgment outcome.

User's Question: {question}";

const CONDENSE_INSTRUCTIONS: &str = "\
Given the following conversation and a follow up question, rephrase the follow up question to be \
a standalone question, in its original language. Reply with the question only.";

const CONTEXT_INTRO: &str = "\
Use the following excerpts from the case database and the conversation so far when answering.";

pub const NO_CASES_FOUND: &str = "No relevant cases found in the case database.";

/// A retrieved chunk as it will appear in the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextExcerpt {
    pub source: String,
    pub text: String,
    /// The chunk was cut to fit the budget
    pub truncated: bool,
}

/// Builds the single prompt string for one turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptAssembler {
    max_context_chars: usize,
}

impl PromptAssembler {
    #[inline]
    pub fn new(max_context_chars: usize) -> Self {
        Self { max_context_chars }
    }

    #[inline]
    pub fn max_context_chars(&self) -> usize {
        self.max_context_chars
    }

    /// Take cases best-first while their combined length fits the budget.
    ///
    /// When even the best case is over budget it is cut to the budget instead of dropped.
    #[inline]
    pub fn fit_context(&self, cases: &[RetrievedCase]) -> Vec<ContextExcerpt> {
        let mut excerpts = Vec::new();
        let mut used = 0;

        for (rank, case) in cases.iter().enumerate() {
            let len = case.content.chars().count();

            if used + len <= self.max_context_chars {
                used += len;
                excerpts.push(ContextExcerpt {
                    source: case.source.clone(),
                    text: case.content.clone(),
                    truncated: false,
                });
                continue;
            }

            if excerpts.is_empty() {
                excerpts.push(ContextExcerpt {
                    source: case.source.clone(),
                    text: case.content.chars().take(self.max_context_chars).collect(),
                    truncated: true,
                });
                debug!(
                    "Best case {} truncated from {} to {} chars",
                    case.source, len, self.max_context_chars
                );
            }

            debug!(
                "Context budget of {} chars reached at case {} of {}",
                self.max_context_chars,
                rank + 1,
                cases.len()
            );
            break;
        }

        excerpts
    }

    /// Instructions, retrieved context, history and question in one string.
    ///
    /// The template is rendered with the question only; context and history are placed
    /// ahead of it and are the only parts that vary between turns.
    #[inline]
    pub fn assemble(
        &self,
        question: &str,
        cases: &[RetrievedCase],
        memory: &ConversationMemory,
    ) -> String {
        let mut prompt = String::with_capacity(self.max_context_chars + 2048);
        prompt.push_str(CONTEXT_INTRO);
        prompt.push_str("\n\nRetrieved cases:\n");

        let excerpts = self.fit_context(cases);
        if excerpts.is_empty() {
            prompt.push_str(NO_CASES_FOUND);
            prompt.push('\n');
        }
        for (i, excerpt) in excerpts.iter().enumerate() {
            let _ = write!(prompt, "[{}] Source: {}\n{}\n\n", i + 1, excerpt.source, excerpt.text);
        }

        if !memory.is_empty() {
            prompt.push_str("\nConversation so far:\n");
            prompt.push_str(&memory.render());
        }

        prompt.push('\n');
        prompt.push_str(&render_template(question));
        prompt
    }

    /// Prompt asking the model to turn a follow-up into a standalone retrieval query
    #[inline]
    pub fn condense_question(&self, question: &str, memory: &ConversationMemory) -> String {
        format!(
            "{}\n\nChat History:\n{}\nFollow Up Input: {}\nStandalone question:",
            CONDENSE_INSTRUCTIONS,
            memory.render().trim_end(),
            question
        )
    }
}

/// The instruction template with the question filled in
#[inline]
pub fn render_template(question: &str) -> String {
    LEGAL_ASSISTANT_TEMPLATE.replace("{question}", question)
}
