//! Core data models used throughout askpdf.
//!
//! These types represent the documents, chunks, and query results that flow
//! through the ingestion and retrieval pipeline.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Metadata attached to a source document and inherited by every chunk
/// cut from it.
///
/// The required fields are a fixed record; best-effort heuristic fields
/// (`title`, `authors`) live in the `extra` map since they may be absent
/// or wrong for any given document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMetadata {
    /// File name of the source PDF (e.g. `paper.pdf`).
    pub source: String,
    /// Full path the document was loaded from.
    pub file_path: PathBuf,
    /// Size of the PDF on disk, in bytes.
    pub file_size: u64,
    /// Always `"pdf"` for this pipeline.
    pub file_type: String,
    /// Whether a layout cache entry existed for this document at load time.
    pub has_layout_analysis: bool,
    /// Heuristic fields such as `title` and `authors`.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl DocMetadata {
    /// Best-effort document title, if the heuristics found one.
    pub fn title(&self) -> Option<&str> {
        self.extra.get("title").map(String::as_str)
    }

    /// Best-effort author line, if the heuristics found one.
    pub fn authors(&self) -> Option<&str> {
        self.extra.get("authors").map(String::as_str)
    }
}

/// A fully assembled source document: fused page text plus metadata.
///
/// Immutable once built; identity is the file path. Discarded after the
/// index build that consumed it.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub text: String,
    pub metadata: DocMetadata,
}

/// A chunk of a document's text — the unit that is embedded and retrieved.
///
/// `position` is the chunk index within its document. Chunks never span
/// documents, and every chunk carries its document's full metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub text: String,
    pub position: usize,
    pub metadata: DocMetadata,
}

/// One retrieved chunk attributed to its source document.
#[derive(Debug, Clone)]
pub struct SourceChunk {
    pub text: String,
    pub metadata: DocMetadata,
}

/// The answer to a query plus the chunks it was grounded on, in the
/// order the index returned them (relevance-descending).
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub response: String,
    pub sources: Vec<SourceChunk>,
}
