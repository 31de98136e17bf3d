// Ingestion pipeline
// Loads case files, chunks and embeds them, and replaces their records in the vector store


pub mod loader;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::database::sqlite::models::NewIngestedDocument;
use crate::database::{CaseRecord, Database, VectorStore};
use crate::embeddings::{ChunkingConfig, Embedder, chunk_document};

pub use loader::{Document, DocumentLoader, FileTextExtractor, SkippedDocument, TextExtractor};

/// Cheap identity of a file version: byte length plus modification time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentFingerprint {
    pub byte_len: u64,
    pub modified_nanos: u128,
}

impl DocumentFingerprint {
    #[inline]
    pub fn of(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("Failed to read metadata for {}", path.display()))?;

        let modified_nanos = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |elapsed| elapsed.as_nanos());

        Ok(Self {
            byte_len: metadata.len(),
            modified_nanos,
        })
    }
}

impl std::fmt::Display for DocumentFingerprint {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.byte_len, self.modified_nanos)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOptions {
    /// Re-ingest files even when their fingerprint is unchanged
    pub force: bool,
    /// Empty the vector store and manifest before ingesting
    pub reset: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionReport {
    pub documents_ingested: usize,
    pub documents_unchanged: usize,
    pub chunks_written: usize,
    pub skipped: Vec<SkippedDocument>,
}

impl IngestionReport {
    #[inline]
    pub fn documents_seen(&self) -> usize {
        self.documents_ingested + self.documents_unchanged + self.skipped.len()
    }
}

enum Outcome {
    Ingested { chunks: usize },
    Unchanged,
    Skipped(SkippedDocument),
}

/// Runs the loader → chunker → embedder → vector store pipeline
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    store: VectorStore,
    manifest: Database,
    chunking: ChunkingConfig,
    show_progress: bool,
}

impl Ingestor {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: VectorStore,
        manifest: Database,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            manifest,
            chunking,
            show_progress: console::user_attended_stderr(),
        }
    }

    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    #[inline]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    #[inline]
    pub fn manifest(&self) -> &Database {
        &self.manifest
    }

    /// Ingest every file the loader matches.
    ///
    /// Files that cannot be read or yield no text are reported in
    /// [`IngestionReport::skipped`]; embedding and storage failures abort the run.
    #[inline]
    pub async fn run(
        &mut self,
        loader: &DocumentLoader,
        options: IngestOptions,
    ) -> Result<IngestionReport> {
        let paths = loader.matching_paths()?;
        info!(
            "Ingesting {} files from {} with the {} embedder",
            paths.len(),
            loader.directory().display(),
            self.embedder.name()
        );

        if options.reset {
            self.reset().await?;
        }

        let bar = if self.show_progress {
            ProgressBar::new(paths.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Ingesting {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };
        bar.enable_steady_tick(Duration::from_millis(120));

        let mut report = IngestionReport::default();

        for path in &paths {
            bar.set_message(
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );

            match self.ingest_path(loader, path, options.force).await? {
                Outcome::Ingested { chunks } => {
                    report.documents_ingested += 1;
                    report.chunks_written += chunks;
                }
                Outcome::Unchanged => report.documents_unchanged += 1,
                Outcome::Skipped(skipped) => report.skipped.push(skipped),
            }

            bar.inc(1);
        }

        bar.finish_and_clear();

        info!(
            "Ingestion finished: {} ingested, {} unchanged, {} skipped, {} chunks written",
            report.documents_ingested,
            report.documents_unchanged,
            report.skipped.len(),
            report.chunks_written
        );
        Ok(report)
    }

    /// Empty the vector store and the manifest
    #[inline]
    pub async fn reset(&mut self) -> Result<()> {
        self.store
            .reset()
            .await
            .context("Failed to clear vector store")?;
        let removed = self.manifest.clear_documents().await?;
        info!("Reset ingestion state ({} manifest entries removed)", removed);
        Ok(())
    }

    async fn ingest_path(
        &mut self,
        loader: &DocumentLoader,
        path: &Path,
        force: bool,
    ) -> Result<Outcome> {
        let source = loader::source_id(path);

        let fingerprint = match DocumentFingerprint::of(path) {
            Ok(fingerprint) => fingerprint.to_string(),
            Err(e) => {
                warn!("Skipping {}: {:#}", source, e);
                return Ok(Outcome::Skipped(SkippedDocument {
                    source: path.to_path_buf(),
                    reason: format!("{:#}", e),
                }));
            }
        };

        if !force {
            if let Some(existing) = self.manifest.get_document(&source).await? {
                if existing.is_unchanged(&fingerprint) {
                    debug!("{} is unchanged since last ingestion", source);
                    return Ok(Outcome::Unchanged);
                }
            }
        }

        let document = match loader.load_document(path) {
            Ok(document) => document,
            Err(skipped) => return Ok(Outcome::Skipped(skipped)),
        };

        let chunks = chunk_document(&document, &self.chunking);
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();

        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .with_context(|| format!("Failed to embed chunks of {}", source))?;

        if embeddings.len() != chunks.len() {
            return Err(anyhow::anyhow!(
                "Embedder returned {} vectors for {} chunks of {}",
                embeddings.len(),
                chunks.len(),
                source
            ));
        }

        let records: Vec<CaseRecord> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, vector)| CaseRecord::from_chunk(chunk, vector))
            .collect();

        // Replace by source: old records of this file go before the new ones land
        self.store
            .delete_source(&source)
            .await
            .with_context(|| format!("Failed to remove previous records of {}", source))?;
        let written = self
            .store
            .store_records(&records)
            .await
            .with_context(|| format!("Failed to store records of {}", source))?;

        self.manifest
            .record_document(NewIngestedDocument {
                source: source.clone(),
                fingerprint,
                chunk_count: written as i64,
                char_count: document.text.chars().count() as i64,
            })
            .await?;

        info!("Ingested {} ({} chunks)", source, written);
        Ok(Outcome::Ingested { chunks: written })
    }
}
