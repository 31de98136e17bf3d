// Embeddings module
// Text chunking plus the embedding backends shared by ingestion and chat

pub mod chunking;
pub mod ngram;
pub mod ollama;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{Config, EmbeddingBackend};

pub use chunking::{Chunk, ChunkingConfig, chunk_document};
pub use ngram::NgramEmbedder;
pub use ollama::OllamaClient;

/// Turns text into fixed-length vectors.
///
/// Implementations must be deterministic for identical input and safe to call from
/// several chat sessions at once.
pub trait Embedder: Send + Sync {
    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving input order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Length of every vector this embedder produces
    fn dimension(&self) -> usize;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Build the configured embedder. Called once per process; the result is shared.
#[inline]
pub fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    match config.embedding.backend {
        EmbeddingBackend::Ollama => {
            let client =
                OllamaClient::new(config).context("Failed to initialize Ollama client")?;
            Ok(Arc::new(client))
        }
        EmbeddingBackend::Ngram => Ok(Arc::new(NgramEmbedder::new(
            config.embedding.ngram_dimension as usize,
        ))),
    }
}
