// Database module
// SQLite for the ingestion manifest, LanceDB for case chunk vectors

pub mod lancedb;
pub mod sqlite;

pub use self::lancedb::vector_store::{SearchResult, SimilaritySearch, VectorStore};
pub use self::lancedb::{CaseChunkMetadata, CaseRecord};
pub use self::sqlite::Database;
