
use std::sync::Arc;
use tracing::debug;

use crate::database::{SearchResult, SimilaritySearch};
use crate::embeddings::Embedder;
use crate::{RagError, Result};

/// A stored chunk returned for a query, with its similarity score
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedCase {
    pub source: String,
    pub chunk_index: u32,
    pub char_offset: u32,
    pub content: String,
    pub score: f32,
}

impl From<SearchResult> for RetrievedCase {
    #[inline]
    fn from(result: SearchResult) -> Self {
        Self {
            source: result.metadata.source,
            chunk_index: result.metadata.chunk_index,
            char_offset: result.metadata.char_offset,
            content: result.metadata.content,
            score: result.similarity_score,
        }
    }
}

/// Embeds a query and asks the store for its nearest chunks
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn SimilaritySearch>,
    top_k: usize,
}

impl Retriever {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn SimilaritySearch>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            top_k,
        }
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// At most `top_k` cases, best first
    #[inline]
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedCase>> {
        let query_vector = self
            .embedder
            .embed(query)
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        let results = self.store.search(&query_vector, self.top_k).await?;
        debug!(
            "Retrieved {} cases with the {} embedder",
            results.len(),
            self.embedder.name()
        );

        Ok(results.into_iter().map(RetrievedCase::from).collect())
    }
}
