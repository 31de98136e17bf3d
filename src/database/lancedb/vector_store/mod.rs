#[cfg(test)]
mod tests;

use super::{CaseChunkMetadata, CaseRecord};
use crate::{RagError, Result, config::Config};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const TABLE_NAME: &str = "case_chunks";

/// Nearest-neighbour lookup over stored case chunks
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// Up to `limit` records closest to `query_vector`, best first
    async fn search(&self, query_vector: &[f32], limit: usize) -> Result<Vec<SearchResult>>;
}

/// Vector database store using LanceDB for similarity search
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    vector_dimension: Option<usize>,
}

impl std::fmt::Debug for VectorStore {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("table_name", &self.table_name)
            .field("vector_dimension", &self.vector_dimension)
            .finish_non_exhaustive()
    }
}

/// Search result from vector similarity search
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub metadata: CaseChunkMetadata,
    /// `1 - cosine distance`; higher is more similar
    pub similarity_score: f32,
    pub distance: f32,
}

fn database_error(context: &str, error: impl std::fmt::Display) -> RagError {
    RagError::Database(format!("{}: {}", context, error))
}

/// Quote a value for use inside a LanceDB filter expression
fn sql_string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl VectorStore {
    /// Open the store under the configured base directory
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        Self::open(&config.vector_database_path()).await
    }

    /// Open (creating the directory if needed) the store at `db_path`.
    ///
    /// The table itself is only created by the first write, once the vector dimension is known.
    #[inline]
    pub async fn open(db_path: &Path) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            database_error("Failed to create vector database directory", e)
        })?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| database_error("Failed to connect to LanceDB", e))?;

        let mut store = Self {
            connection,
            table_name: TABLE_NAME.to_string(),
            vector_dimension: None,
        };

        if store.table_exists().await? {
            let dimension = store.detect_existing_vector_dimension().await?;
            info!("Opened vector store with {} dimensions", dimension);
            store.vector_dimension = Some(dimension);
        } else {
            debug!("Vector table does not exist yet");
        }

        Ok(store)
    }

    /// Dimension of the stored vectors, if anything has been written
    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.vector_dimension
    }

    #[inline]
    pub async fn table_exists(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| database_error("Failed to list tables", e))?;

        Ok(table_names.contains(&self.table_name))
    }

    async fn open_table(&self) -> Result<lancedb::Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| database_error("Failed to open table", e))
    }

    async fn detect_existing_vector_dimension(&self) -> Result<usize> {
        let table = self.open_table().await?;

        let schema = table
            .schema()
            .await
            .map_err(|e| database_error("Failed to get table schema", e))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(RagError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn create_schema(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim as i32,
                ),
                false,
            ),
            Field::new("source", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("char_offset", DataType::UInt32, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    async fn create_table(&mut self, vector_dim: usize) -> Result<()> {
        self.connection
            .create_empty_table(&self.table_name, Self::create_schema(vector_dim))
            .execute()
            .await
            .map_err(|e| database_error("Failed to create table", e))?;

        self.vector_dimension = Some(vector_dim);
        info!("Created vector table with {} dimensions", vector_dim);
        Ok(())
    }

    /// Make sure the table exists and accepts vectors of `vector_dim`
    async fn prepare_table(&mut self, vector_dim: usize) -> Result<()> {
        match self.vector_dimension {
            None => self.create_table(vector_dim).await,
            Some(existing) if existing == vector_dim => Ok(()),
            Some(existing) => {
                if self.count_records().await? > 0 {
                    return Err(RagError::Database(format!(
                        "Vector store holds {}-dimensional vectors but the embedder produces {}; \
                         re-run ingestion with --reset",
                        existing, vector_dim
                    )));
                }

                info!(
                    "Empty vector table has {} dimensions, recreating with {}",
                    existing, vector_dim
                );
                self.drop_table_if_exists().await?;
                self.create_table(vector_dim).await
            }
        }
    }

    /// Append records. All vectors must share one dimension.
    ///
    /// # Returns
    /// * `Result<usize>` - Number of records written
    #[inline]
    pub async fn store_records(&mut self, records: &[CaseRecord]) -> Result<usize> {
        let Some(first) = records.first() else {
            debug!("No records to store");
            return Ok(0);
        };

        let vector_dim = first.vector.len();
        if vector_dim == 0 {
            return Err(RagError::Database("Cannot store empty vectors".to_string()));
        }
        if let Some(bad) = records.iter().find(|r| r.vector.len() != vector_dim) {
            return Err(RagError::Database(format!(
                "Record {} has {} dimensions, expected {}",
                bad.id,
                bad.vector.len(),
                vector_dim
            )));
        }

        debug!("Storing batch of {} records", records.len());
        self.prepare_table(vector_dim).await?;

        let record_batch = Self::create_record_batch(records, vector_dim)?;
        let table = self.open_table().await?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| database_error("Failed to insert records", e))?;

        info!("Stored {} records", records.len());
        Ok(records.len())
    }

    fn create_record_batch(records: &[CaseRecord], vector_dim: usize) -> Result<RecordBatch> {
        let len = records.len();

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut sources = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut char_offsets = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        for record in records {
            ids.push(record.id.as_str());
            flat_values.extend_from_slice(&record.vector);
            sources.push(record.metadata.source.as_str());
            chunk_indices.push(record.metadata.chunk_index);
            char_offsets.push(record.metadata.char_offset);
            contents.push(record.metadata.content.as_str());
            created_ats.push(record.metadata.created_at.as_str());
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
                .map_err(|e| database_error("Failed to create vector array", e))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(sources)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(UInt32Array::from(char_offsets)),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(Self::create_schema(vector_dim), arrays)
            .map_err(|e| database_error("Failed to create record batch", e))
    }

    /// Search for similar records by cosine distance
    ///
    /// # Returns
    /// * `Result<Vec<SearchResult>>` - At most `limit` results ordered by non-increasing
    ///   similarity. An empty store yields no results.
    #[inline]
    pub async fn search_similar(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        debug!("Searching for similar vectors with limit: {}", limit);

        let Some(dimension) = self.vector_dimension else {
            debug!("Vector table missing, nothing to search");
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }
        if query_vector.len() != dimension {
            return Err(RagError::Retrieval(format!(
                "Query has {} dimensions but the store holds {}-dimensional vectors",
                query_vector.len(),
                dimension
            )));
        }

        let table = self.open_table().await?;
        let results = table
            .vector_search(query_vector)
            .map_err(|e| database_error("Failed to create vector search", e))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| database_error("Failed to execute search", e))?;

        let mut search_results = Self::parse_search_results_stream(results).await?;
        search_results.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
        search_results.truncate(limit);
        Ok(search_results)
    }

    async fn parse_search_results_stream(
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<SearchResult>> {
        let mut search_results = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| database_error("Failed to read result stream", e))?
        {
            search_results.extend(Self::parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results from stream", search_results.len());
        Ok(search_results)
    }

    fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
        batch
            .column_by_name(name)
            .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
    }

    fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array> {
        batch
            .column_by_name(name)
            .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
            .as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
        let sources = Self::string_column(batch, "source")?;
        let chunk_indices = Self::u32_column(batch, "chunk_index")?;
        let char_offsets = Self::u32_column(batch, "char_offset")?;
        let contents = Self::string_column(batch, "content")?;
        let created_ats = Self::string_column(batch, "created_at")?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let results = (0..batch.num_rows())
            .map(|row| {
                let distance =
                    distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

                SearchResult {
                    metadata: CaseChunkMetadata {
                        source: sources.value(row).to_string(),
                        chunk_index: chunk_indices.value(row),
                        char_offset: char_offsets.value(row),
                        content: contents.value(row).to_string(),
                        created_at: created_ats.value(row).to_string(),
                    },
                    similarity_score: 1.0 - distance,
                    distance,
                }
            })
            .collect();

        Ok(results)
    }

    /// Delete every record that came from `source`
    #[inline]
    pub async fn delete_source(&self, source: &str) -> Result<()> {
        if self.vector_dimension.is_none() {
            return Ok(());
        }

        debug!("Deleting records for source: {}", source);
        let table = self.open_table().await?;

        let predicate = format!("source = {}", sql_string_literal(source));
        table
            .delete(&predicate)
            .await
            .map_err(|e| database_error("Failed to delete source records", e))?;

        info!("Deleted records for source: {}", source);
        Ok(())
    }

    /// Total number of stored records; zero when nothing was ever written
    #[inline]
    pub async fn count_records(&self) -> Result<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        self.open_table()
            .await?
            .count_rows(None)
            .await
            .map_err(|e| database_error("Failed to count rows", e))
    }

    /// Drop all records. The next write recreates the table.
    #[inline]
    pub async fn reset(&mut self) -> Result<()> {
        warn!("Clearing vector store");
        self.drop_table_if_exists().await?;
        self.vector_dimension = None;
        Ok(())
    }

    async fn drop_table_if_exists(&self) -> Result<()> {
        if self.table_exists().await? {
            info!("Dropping table {}", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| database_error("Failed to drop table", e))?;
        }

        Ok(())
    }
}

#[async_trait]
impl SimilaritySearch for VectorStore {
    #[inline]
    async fn search(&self, query_vector: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        self.search_similar(query_vector, limit).await
    }
}
