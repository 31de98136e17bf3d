#[cfg(test)]
mod tests;

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AssistantReply;
use super::memory::ConversationMemory;
use super::prompt::PromptAssembler;
use super::retriever::{RetrievedCase, Retriever};
use crate::config::RetrievalConfig;
use crate::llm::{ChatModel, LlmError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    UserTurnReceived,
    AssistantGenerating,
    AssistantTurnRecorded,
}

/// One line of the rendered conversation
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEntry {
    User(String),
    Assistant(AssistantReply),
    /// A turn whose remote call failed; nothing was added to memory for it
    Error(String),
}

#[derive(Error, Debug)]
pub enum TurnError {
    /// The turn failed but the session can continue
    #[error("{0}")]
    Remote(#[source] LlmError),

    /// The session cannot continue (bad or missing credentials)
    #[error("{0}")]
    Fatal(#[source] LlmError),
}

impl From<LlmError> for TurnError {
    #[inline]
    fn from(error: LlmError) -> Self {
        if error.is_fatal() {
            Self::Fatal(error)
        } else {
            Self::Remote(error)
        }
    }
}

/// One user's conversation: strictly sequential turns over shared retrieval and model services
pub struct ChatSession {
    retriever: Arc<Retriever>,
    model: Arc<dyn ChatModel>,
    assembler: PromptAssembler,
    condense_follow_ups: bool,
    memory: ConversationMemory,
    transcript: Vec<TranscriptEntry>,
    state: SessionState,
}

impl ChatSession {
    #[inline]
    pub fn new(
        retriever: Arc<Retriever>,
        model: Arc<dyn ChatModel>,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            retriever,
            model,
            assembler: PromptAssembler::new(retrieval.max_context_chars),
            condense_follow_ups: retrieval.condense_follow_ups,
            memory: ConversationMemory::new(),
            transcript: Vec::new(),
            state: SessionState::Idle,
        }
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    #[inline]
    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run one turn: retrieve, assemble, complete, record.
    ///
    /// On failure the error is appended to the transcript and memory is left untouched.
    #[inline]
    pub async fn submit(&mut self, question: &str) -> Result<AssistantReply, TurnError> {
        self.transition(SessionState::UserTurnReceived);
        self.transcript
            .push(TranscriptEntry::User(question.to_string()));

        self.transition(SessionState::AssistantGenerating);
        let outcome = self.generate(question).await;

        match outcome {
            Ok(reply) => {
                self.memory.record(question, &reply);
                self.transcript
                    .push(TranscriptEntry::Assistant(reply.clone()));
                self.transition(SessionState::AssistantTurnRecorded);
                info!(
                    "Turn {} answered with {} sources",
                    self.memory.len(),
                    reply.sources.len()
                );
                self.transition(SessionState::Idle);
                Ok(reply)
            }
            Err(error) => {
                warn!("Turn failed: {}", error);
                self.transcript
                    .push(TranscriptEntry::Error(error.to_string()));
                self.transition(SessionState::Idle);
                Err(TurnError::from(error))
            }
        }
    }

    async fn generate(&self, question: &str) -> Result<AssistantReply, LlmError> {
        let retrieval_query = if self.condense_follow_ups && !self.memory.is_empty() {
            let condensed = self
                .model
                .complete(&self.assembler.condense_question(question, &self.memory))?;
            debug!("Condensed follow-up into: {}", condensed);
            condensed
        } else {
            question.to_string()
        };

        let (sources, retrieval_error) = self.retrieve(&retrieval_query).await;
        let prompt = self.assembler.assemble(question, &sources, &self.memory);
        debug!(
            "Assembled prompt of {} chars for {}",
            prompt.len(),
            self.model.model_name()
        );

        let answer = self.model.complete(&prompt)?;
        Ok(AssistantReply {
            answer,
            sources,
            retrieval_error,
        })
    }

    /// Retrieval failures degrade to an empty context rather than failing the turn.
    /// The failure is handed back so the reply can say no cases were found.
    async fn retrieve(&self, query: &str) -> (Vec<RetrievedCase>, Option<String>) {
        match self.retriever.retrieve(query).await {
            Ok(cases) => (cases, None),
            Err(error) => {
                warn!("Retrieval failed, answering without cases: {}", error);
                (Vec::new(), Some(error.to_string()))
            }
        }
    }

    /// Forget everything: transcript and memory are cleared and the session is idle again
    #[inline]
    pub fn new_chat(&mut self) {
        info!("Starting a new chat");
        self.memory.clear();
        self.transcript.clear();
        self.transition(SessionState::Idle);
    }
}
