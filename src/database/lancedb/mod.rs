// LanceDB vector database module
// Stores case chunks with their embeddings and answers nearest-neighbour queries


pub mod vector_store;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embeddings::Chunk;

/// One persisted chunk: its embedding plus the text it was computed from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    /// Unique identifier for this record
    pub id: String,
    /// The chunk's embedding
    pub vector: Vec<f32>,
    pub metadata: CaseChunkMetadata,
}

/// Everything stored next to a vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseChunkMetadata {
    /// Source file of the chunk
    pub source: String,
    /// Position of the chunk within its document
    pub chunk_index: u32,
    /// Character offset of the chunk within its document
    pub char_offset: u32,
    /// The chunk's text
    pub content: String,
    /// RFC 3339 timestamp of ingestion
    pub created_at: String,
}

impl CaseRecord {
    #[inline]
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vector,
            metadata: CaseChunkMetadata {
                source: chunk.source.clone(),
                chunk_index: u32::try_from(chunk.chunk_index).unwrap_or(u32::MAX),
                char_offset: u32::try_from(chunk.char_offset).unwrap_or(u32::MAX),
                content: chunk.content.clone(),
                created_at: Utc::now().to_rfc3339(),
            },
        }
    }
}
