
use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobMatcher};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Raw text of one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source: PathBuf,
    pub text: String,
}

impl Document {
    /// Identifier stored alongside every chunk of this document
    #[inline]
    pub fn source_id(&self) -> String {
        source_id(&self.source)
    }
}

/// Manifest and vector store key of a file. Stable across spellings of its directory because
/// [`DocumentLoader::matching_paths`] only yields canonical paths.
#[inline]
pub fn source_id(path: &Path) -> String {
    path.display().to_string()
}

/// A file that matched the pattern but could not be turned into a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDocument {
    pub source: PathBuf,
    pub reason: String,
}

impl std::fmt::Display for SkippedDocument {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.source.display(), self.reason)
    }
}

/// Pulls plain text out of a file
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String>;
}

/// Dispatches on file extension: PDFs go through `pdf-extract`, `.txt` and `.md` are read as
/// UTF-8. Anything else is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTextExtractor;

impl FileTextExtractor {
    fn extract_pdf(path: &Path) -> Result<String> {
        // pdf-extract panics on some malformed inputs
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text(path)));

        match outcome {
            Ok(result) => result.with_context(|| format!("Failed to parse PDF {}", path.display())),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(anyhow::anyhow!("PDF extractor crashed: {}", message))
            }
        }
    }
}

impl TextExtractor for FileTextExtractor {
    #[inline]
    fn extract(&self, path: &Path) -> Result<String> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => Self::extract_pdf(path),
            "txt" | "md" => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display())),
            other => Err(anyhow::anyhow!("Unsupported file type '.{}'", other)),
        }
    }
}

/// Lists the files of one directory that match a glob and loads them lazily
#[derive(Clone)]
pub struct DocumentLoader {
    directory: PathBuf,
    matcher: GlobMatcher,
    extractor: Arc<dyn TextExtractor>,
}

impl std::fmt::Debug for DocumentLoader {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentLoader")
            .field("directory", &self.directory)
            .field("pattern", &self.matcher.glob().glob())
            .finish_non_exhaustive()
    }
}

impl DocumentLoader {
    #[inline]
    pub fn new<P: AsRef<Path>>(directory: P, pattern: &str) -> Result<Self> {
        let matcher = GlobBuilder::new(pattern.trim_start_matches("./"))
            .case_insensitive(true)
            .literal_separator(true)
            .build()
            .with_context(|| format!("Invalid file pattern '{}'", pattern))?
            .compile_matcher();

        Ok(Self {
            directory: directory.as_ref().to_path_buf(),
            matcher,
            extractor: Arc::new(FileTextExtractor),
        })
    }

    #[inline]
    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    #[inline]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Regular files directly inside the directory whose names match, in sorted order.
    ///
    /// Paths are rooted at the canonical directory, so `data`, `./data` and its absolute form
    /// list the same paths.
    #[inline]
    pub fn matching_paths(&self) -> Result<Vec<PathBuf>> {
        let directory = std::fs::canonicalize(&self.directory).with_context(|| {
            format!(
                "Failed to resolve document directory {}",
                self.directory.display()
            )
        })?;
        let entries = std::fs::read_dir(&directory).with_context(|| {
            format!("Failed to read document directory {}", directory.display())
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if !path.is_file() {
                continue;
            }

            if path
                .file_name()
                .is_some_and(|name| self.matcher.is_match(Path::new(name)))
            {
                paths.push(path);
            }
        }

        paths.sort();
        debug!(
            "Found {} matching files in {}",
            paths.len(),
            self.directory.display()
        );
        Ok(paths)
    }

    /// Extract one file. Failures and files without text become skips.
    #[inline]
    pub fn load_document(&self, path: &Path) -> Result<Document, SkippedDocument> {
        let skipped = |reason: String| {
            warn!("Skipping {}: {}", path.display(), reason);
            SkippedDocument {
                source: path.to_path_buf(),
                reason,
            }
        };

        let text = self
            .extractor
            .extract(path)
            .map_err(|e| skipped(format!("{:#}", e)))?;

        if text.trim().is_empty() {
            return Err(skipped("no extractable text".to_string()));
        }

        Ok(Document {
            source: path.to_path_buf(),
            text,
        })
    }

    /// One result per matching file; extraction happens as the iterator is advanced
    #[inline]
    pub fn load(&self) -> Result<impl Iterator<Item = Result<Document, SkippedDocument>> + '_> {
        let paths = self.matching_paths()?;
        Ok(paths.into_iter().map(|path| self.load_document(&path)))
    }
}
