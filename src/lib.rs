use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

/// Failures of the case store and retrieval path. Configuration, LLM and ingestion
/// failures have their own error types or travel as `anyhow` context chains.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),
}

pub mod chat;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod ingest;
pub mod llm;
