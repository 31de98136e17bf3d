use super::*;
use crate::database::{CaseChunkMetadata, SearchResult, SimilaritySearch};
use crate::embeddings::{Embedder, NgramEmbedder};
use crate::{RagError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays queued completions and remembers every prompt it was given
#[derive(Default)]
struct ScriptedModel {
    replies: Mutex<VecDeque<std::result::Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn with_replies(replies: Vec<std::result::Result<String, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("lock").clone()
    }
}

impl ChatModel for ScriptedModel {
    fn complete(&self, prompt: &str) -> std::result::Result<String, LlmError> {
        self.prompts.lock().expect("lock").push(prompt.to_string());
        self.replies
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyCompletion))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Always returns the same case and remembers the query vectors it saw
#[derive(Default)]
struct FixedStore {
    queries: Mutex<Vec<Vec<f32>>>,
}

#[async_trait]
impl SimilaritySearch for FixedStore {
    async fn search(&self, query_vector: &[f32], _limit: usize) -> Result<Vec<SearchResult>> {
        self.queries.lock().expect("lock").push(query_vector.to_vec());
        Ok(vec![SearchResult {
            metadata: CaseChunkMetadata {
                source: "data/smith_v_jones.pdf".to_string(),
                chunk_index: 0,
                char_offset: 0,
                content: "Smith v. Jones (2015), breach of contract".to_string(),
                created_at: "2024-01-01T00:00:00Z".to_string(),
            },
            similarity_score: 0.9,
            distance: 0.1,
        }])
    }
}

struct UnreachableStore;

#[async_trait]
impl SimilaritySearch for UnreachableStore {
    async fn search(&self, _query_vector: &[f32], _limit: usize) -> Result<Vec<SearchResult>> {
        Err(RagError::Database("connection refused".to_string()))
    }
}

fn session_with(
    model: Arc<ScriptedModel>,
    store: Arc<dyn SimilaritySearch>,
    condense_follow_ups: bool,
) -> ChatSession {
    let retriever = Retriever::new(Arc::new(NgramEmbedder::new(64)), store, 4);
    ChatSession::new(
        Arc::new(retriever),
        model,
        &RetrievalConfig {
            condense_follow_ups,
            ..RetrievalConfig::default()
        },
    )
}

#[tokio::test]
async fn successful_turn_is_recorded_everywhere() {
    let model = ScriptedModel::with_replies(vec![Ok("Smith prevailed.".to_string())]);
    let mut session = session_with(model, Arc::new(FixedStore::default()), false);

    let reply = session
        .submit("Who won Smith v. Jones?")
        .await
        .expect("turn succeeds");

    assert_eq!(reply.answer, "Smith prevailed.");
    assert_eq!(reply.sources.len(), 1);
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.memory().len(), 1);
    assert_eq!(
        session.transcript(),
        &[
            TranscriptEntry::User("Who won Smith v. Jones?".to_string()),
            TranscriptEntry::Assistant(reply),
        ]
    );
}

#[tokio::test]
async fn second_prompt_carries_first_answer_but_not_its_sources() {
    let model = ScriptedModel::with_replies(vec![
        Ok("It concerned a breach of contract.".to_string()),
        Ok("The plaintiff would likely win.".to_string()),
    ]);
    let mut session = session_with(Arc::clone(&model), Arc::new(FixedStore::default()), false);

    session
        .submit("What was Smith v. Jones about?")
        .await
        .expect("first turn succeeds");
    session
        .submit("How would a similar case end?")
        .await
        .expect("second turn succeeds");

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[0].contains("Conversation so far"));

    let history = prompts[1]
        .split("Conversation so far:\n")
        .nth(1)
        .and_then(|rest| rest.split("You are a legal assistant").next())
        .expect("history section present");
    assert_eq!(
        history.trim(),
        "Human: What was Smith v. Jones about?\nAssistant: It concerned a breach of contract."
    );
    assert!(!history.contains("smith_v_jones.pdf"));
}

#[tokio::test]
async fn failed_call_leaves_memory_unchanged_and_shows_error() {
    let model = ScriptedModel::with_replies(vec![
        Ok("First answer.".to_string()),
        Err(LlmError::Status(503)),
    ]);
    let mut session = session_with(model, Arc::new(FixedStore::default()), false);

    session.submit("first").await.expect("first turn succeeds");
    let memory_before = session.memory().clone();

    let error = session.submit("second").await.expect_err("second turn fails");

    assert!(matches!(error, TurnError::Remote(LlmError::Status(503))));
    assert_eq!(session.memory(), &memory_before);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(matches!(
        session.transcript().last(),
        Some(TranscriptEntry::Error(message)) if message.contains("503")
    ));
    assert_eq!(session.transcript().len(), 4);
}

#[tokio::test]
async fn rejected_credentials_are_fatal() {
    let model = ScriptedModel::with_replies(vec![Err(LlmError::Unauthorized(401))]);
    let mut session = session_with(model, Arc::new(FixedStore::default()), false);

    let error = session.submit("question").await.expect_err("turn fails");

    assert!(matches!(error, TurnError::Fatal(LlmError::Unauthorized(401))));
    assert!(session.memory().is_empty());
}

#[tokio::test]
async fn new_chat_erases_all_trace_of_prior_turns() {
    let model = ScriptedModel::with_replies(vec![
        Ok("Old answer about tort law.".to_string()),
        Ok("Fresh answer.".to_string()),
    ]);
    let mut session = session_with(Arc::clone(&model), Arc::new(FixedStore::default()), false);

    session
        .submit("Old question about negligence")
        .await
        .expect("turn succeeds");
    session.new_chat();

    assert!(session.transcript().is_empty());
    assert!(session.memory().is_empty());
    assert_eq!(session.state(), SessionState::Idle);

    session.submit("New question").await.expect("turn succeeds");
    let last_prompt = model.prompts().pop().expect("prompt recorded");
    assert!(!last_prompt.contains("Old question about negligence"));
    assert!(!last_prompt.contains("Old answer about tort law."));
}

#[tokio::test]
async fn retrieval_failure_degrades_to_no_cases() {
    let model = ScriptedModel::with_replies(vec![Ok("General guidance.".to_string())]);
    let mut session = session_with(Arc::clone(&model), Arc::new(UnreachableStore), false);

    let reply = session.submit("question").await.expect("turn still succeeds");

    assert!(reply.sources.is_empty());
    assert!(model.prompts()[0].contains("No relevant cases found"));
    assert_eq!(
        reply.retrieval_error.as_deref(),
        Some("Database error: connection refused")
    );
    assert!(matches!(
        session.transcript().last(),
        Some(TranscriptEntry::Assistant(recorded)) if recorded.retrieval_error.is_some()
    ));
}

#[tokio::test]
async fn successful_retrieval_reports_no_error() {
    let model = ScriptedModel::with_replies(vec![Ok("Answer.".to_string())]);
    let mut session = session_with(model, Arc::new(FixedStore::default()), false);

    let reply = session.submit("question").await.expect("turn succeeds");

    assert_eq!(reply.retrieval_error, None);
}

#[tokio::test]
async fn follow_ups_are_condensed_for_retrieval_when_enabled() {
    let model = ScriptedModel::with_replies(vec![
        Ok("It was a contract case.".to_string()),
        Ok("breach of contract damages".to_string()),
        Ok("Damages were awarded.".to_string()),
    ]);
    let store = Arc::new(FixedStore::default());
    let mut session = session_with(
        Arc::clone(&model),
        Arc::clone(&store) as Arc<dyn SimilaritySearch>,
        true,
    );

    session
        .submit("Tell me about Smith v. Jones")
        .await
        .expect("first turn succeeds");
    session.submit("What was awarded?").await.expect("second turn succeeds");

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[1].contains("Follow Up Input: What was awarded?"));
    assert!(prompts[2].ends_with("User's Question: What was awarded?"));

    let embedder = NgramEmbedder::new(64);
    let queries = store.queries.lock().expect("lock").clone();
    assert_eq!(
        queries[1],
        embedder
            .embed("breach of contract damages")
            .expect("embedding succeeds")
    );
}

#[tokio::test]
async fn first_turn_is_never_condensed() {
    let model = ScriptedModel::with_replies(vec![Ok("Answer.".to_string())]);
    let mut session = session_with(Arc::clone(&model), Arc::new(FixedStore::default()), true);

    session.submit("question").await.expect("turn succeeds");

    assert_eq!(model.prompts().len(), 1);
}
