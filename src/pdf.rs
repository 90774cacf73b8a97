//! PDF loading: directory scan, per-page text extraction, layout fusion,
//! and document assembly.
//!
//! A document is built by extracting each page's text, appending that
//! page's cached layout descriptions (when a cache entry exists), joining
//! pages with a blank line, and cleaning the fused text as a whole so
//! page-boundary whitespace is normalized globally. Metadata heuristics
//! run on the cleaned text.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::fusion;
use crate::layout::LayoutCache;
use crate::models::{DocMetadata, SourceDocument};
use crate::text::{clean_text, extract_metadata};

/// Per-document extraction failure. A failing document is skipped; it
/// never aborts the load of its siblings.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed for {path}: {message}")]
    Extraction { path: PathBuf, message: String },
}

/// Loads PDFs from a flat directory and assembles [`SourceDocument`]s.
pub struct PdfLoader {
    pdf_dir: PathBuf,
    cache: LayoutCache,
}

impl PdfLoader {
    pub fn new(pdf_dir: impl Into<PathBuf>, layout_dir: impl Into<PathBuf>) -> Self {
        Self {
            pdf_dir: pdf_dir.into(),
            cache: LayoutCache::new(layout_dir),
        }
    }

    /// All `.pdf` files in the directory, sorted for deterministic order.
    /// No recursion, no other extensions.
    pub fn pdf_files(&self) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.pdf_dir)
            .with_context(|| format!("failed to read PDF directory {}", self.pdf_dir.display()))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_pdf = path
                .extension()
                .map(|e| e.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false);
            if is_pdf {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    /// Load one PDF into a document: per-page extraction, layout fusion,
    /// global cleaning, metadata heuristics.
    pub fn load_single(&self, path: &Path) -> Result<SourceDocument, ExtractError> {
        let file_size = std::fs::metadata(path)
            .map_err(|source| ExtractError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        // pdf-extract can panic on malformed input; contain it so one bad
        // PDF cannot take down the load of its siblings.
        let pages_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pdf_extract::extract_text_by_pages(path)
        }));
        let pages = match pages_result {
            Ok(Ok(pages)) => pages,
            Ok(Err(e)) => {
                return Err(ExtractError::Extraction {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic during PDF parsing".to_string());
                return Err(ExtractError::Extraction {
                    path: path.to_path_buf(),
                    message,
                });
            }
        };

        let has_layout = self.cache.has_entry(path);

        let mut fused_pages = Vec::with_capacity(pages.len());
        for (page_no, page_text) in pages.iter().enumerate() {
            let fused = if has_layout {
                match self.cache.load_page(path, page_no) {
                    Ok(Some(elements)) => fusion::fuse_page(page_text, &elements),
                    Ok(None) => page_text.clone(),
                    Err(e) => {
                        tracing::warn!(
                            pdf = %path.display(),
                            page = page_no,
                            error = %e,
                            "unreadable layout manifest, using raw page text"
                        );
                        page_text.clone()
                    }
                }
            } else {
                page_text.clone()
            };
            fused_pages.push(fused);
        }

        let cleaned = clean_text(&fused_pages.join("\n\n"));
        let extra = extract_metadata(&cleaned);

        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Ok(SourceDocument {
            text: cleaned,
            metadata: DocMetadata {
                source,
                file_path: path.to_path_buf(),
                file_size,
                file_type: "pdf".to_string(),
                has_layout_analysis: has_layout,
                extra,
            },
        })
    }

    /// Load every PDF in the directory. A document that fails to load is
    /// logged and excluded; the rest still load.
    pub fn load_all(&self) -> Result<Vec<SourceDocument>> {
        let files = self.pdf_files()?;
        tracing::info!(count = files.len(), dir = %self.pdf_dir.display(), "loading PDF files");

        let mut documents = Vec::with_capacity(files.len());
        for file in &files {
            match self.load_single(file) {
                Ok(document) => {
                    tracing::debug!(pdf = %document.metadata.source, "loaded document");
                    documents.push(document);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping document");
                }
            }
        }
        Ok(documents)
    }
}
