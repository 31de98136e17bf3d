
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A source file whose chunks are currently in the vector store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct IngestedDocument {
    pub id: i64,
    pub source: String,
    pub fingerprint: String,
    pub chunk_count: i64,
    pub char_count: i64,
    pub ingested_at: NaiveDateTime,
}

impl IngestedDocument {
    /// Whether the file on disk is the one that was ingested
    #[inline]
    pub fn is_unchanged(&self, fingerprint: &str) -> bool {
        self.fingerprint == fingerprint
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIngestedDocument {
    pub source: String,
    pub fingerprint: String,
    pub chunk_count: i64,
    pub char_count: i64,
}
