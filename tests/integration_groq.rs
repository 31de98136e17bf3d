#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! Chat turns against a mock OpenAI-compatible completion endpoint
use legal_rag::chat::{ChatSession, Retriever, TurnError};
use legal_rag::config::{API_KEY_ENV_VAR, LlmConfig, RetrievalConfig};
use legal_rag::database::{CaseRecord, SimilaritySearch, VectorStore};
use legal_rag::embeddings::{Chunk, Embedder, NgramEmbedder};
use legal_rag::llm::{GroqClient, LlmError};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SMITH_V_JONES: &str = "Smith v. Jones (2015): failure to deliver goods was a breach of contract.";

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-42",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

async fn session_against(server: &MockServer, temp_dir: &TempDir) -> ChatSession {
    // SAFETY: every test touching the process environment runs under #[serial]
    unsafe { std::env::remove_var(API_KEY_ENV_VAR) };

    let embedder = Arc::new(NgramEmbedder::default());
    let mut store = VectorStore::open(&temp_dir.path().join("vectors"))
        .await
        .expect("should open vector store");
    let chunk = Chunk {
        content: SMITH_V_JONES.to_string(),
        source: "data/smith_v_jones.pdf".to_string(),
        chunk_index: 0,
        char_offset: 0,
    };
    let vector = embedder.embed(SMITH_V_JONES).expect("should embed");
    store
        .store_records(&[CaseRecord::from_chunk(&chunk, vector)])
        .await
        .expect("should store record");

    let llm = LlmConfig {
        base_url: format!("{}/openai/v1", server.uri()),
        api_key: Some("gsk-integration".to_string()),
        timeout_seconds: 5,
        retry_attempts: 2,
        ..LlmConfig::default()
    };
    let model = GroqClient::new(&llm)
        .expect("should build client")
        .with_backoff_base(Duration::from_millis(1));

    let store: Arc<dyn SimilaritySearch> = Arc::new(store);
    let retriever = Retriever::new(embedder, store, 4);
    ChatSession::new(
        Arc::new(retriever),
        Arc::new(model),
        &RetrievalConfig::default(),
    )
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn answer_is_generated_from_retrieved_cases() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");

    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .and(header("Authorization", "Bearer gsk-integration"))
        .and(body_string_contains("Smith v. Jones (2015)"))
        .and(body_string_contains("User's Question: Who breached the contract?"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion("  Jones breached it.  ")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut session = session_against(&server, &temp_dir).await;
    let reply = session
        .submit("Who breached the contract?")
        .await
        .expect("turn should succeed");

    assert_eq!(reply.answer, "Jones breached it.");
    assert_eq!(reply.sources.len(), 1);
    assert_eq!(reply.sources[0].source, "data/smith_v_jones.pdf");
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn rejected_key_ends_the_session() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");

    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Invalid API Key", "type": "invalid_request_error" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = session_against(&server, &temp_dir).await;
    let error = session
        .submit("Who breached the contract?")
        .await
        .expect_err("turn should fail");

    assert!(matches!(error, TurnError::Fatal(LlmError::Unauthorized(401))));
    assert!(session.memory().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn service_outage_fails_one_turn_only() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");

    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Back online.")))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = session_against(&server, &temp_dir).await;

    let error = session
        .submit("first question")
        .await
        .expect_err("both attempts hit the outage");
    assert!(matches!(error, TurnError::Remote(LlmError::Status(503))));
    assert!(session.memory().is_empty());

    let reply = session
        .submit("second question")
        .await
        .expect("service recovered");
    assert_eq!(reply.answer, "Back online.");
    assert_eq!(session.memory().len(), 1);
    assert_eq!(session.memory().turns()[0].question, "second question");
}
