
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ingest::loader::Document;

/// A contiguous window of a document's text, ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The window's text
    pub content: String,
    /// Source file the text came from
    pub source: String,
    /// Position of this chunk within its document
    pub chunk_index: usize,
    /// Offset of the first character, in characters from the start of the document
    pub char_offset: usize,
}

impl Chunk {
    /// Number of characters in this chunk
    #[inline]
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Configuration for text chunking, measured in characters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks; always below `chunk_size`
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            chunk_overlap: 500,
        }
    }
}

impl ChunkingConfig {
    /// Distance between the starts of consecutive chunks
    #[inline]
    pub fn stride(&self) -> usize {
        self.chunk_size.saturating_sub(self.chunk_overlap).max(1)
    }
}

/// Split a document into overlapping fixed-size windows.
///
/// Chunk `i` starts at `i * (chunk_size - chunk_overlap)` and the last chunk ends exactly at
/// the end of the text, so dropping the first `chunk_overlap` characters of every chunk after
/// the first and concatenating yields the original text. A document no longer than
/// `chunk_size` produces one chunk; an empty document produces none.
#[inline]
pub fn chunk_document(document: &Document, config: &ChunkingConfig) -> Vec<Chunk> {
    let chars: Vec<char> = document.text.chars().collect();
    let source = document.source_id();

    if chars.is_empty() {
        debug!("Document {} is empty, nothing to chunk", source);
        return Vec::new();
    }

    let chunk_size = config.chunk_size.max(1);
    let stride = config.stride();
    let mut chunks = Vec::with_capacity(chars.len() / stride + 1);
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(Chunk {
            content: chars[start..end].iter().collect(),
            source: source.clone(),
            chunk_index: chunks.len(),
            char_offset: start,
        });

        if end == chars.len() {
            break;
        }
        start += stride;
    }

    debug!(
        "Chunked {} ({} chars) into {} chunks",
        source,
        chars.len(),
        chunks.len()
    );

    chunks
}
