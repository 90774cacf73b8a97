//! Layout analysis and its on-disk cache.
//!
//! [`LayoutAnalyzer`] renders each page of a PDF, runs object detection
//! over it, and saves one cropped image per detected region plus a
//! per-page JSON manifest of [`LayoutElement`]s. Results are keyed by
//! document under the cache root:
//!
//! ```text
//! layout_outputs/<doc-stem>/page_<n>/
//!     manifest.json          ordered element records for the page
//!     table_0.png            cropped regions, numbered per label
//!     figure_0.png
//! ```
//!
//! A non-empty document directory is a cache hit: analysis is skipped
//! entirely, with no partial-invalidation check. The cache is keyed by
//! name only — editing a PDF in place serves stale layout data.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::detect::LayoutDetector;
use crate::render::PageRenderer;

/// The closed set of region labels the detection model produces
/// (DocLayout-YOLO DocStructBench classes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementLabel {
    Title,
    PlainText,
    Abandon,
    Figure,
    FigureCaption,
    Table,
    TableCaption,
    TableFootnote,
    IsolateFormula,
    FormulaCaption,
}

impl ElementLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            ElementLabel::Title => "title",
            ElementLabel::PlainText => "plain_text",
            ElementLabel::Abandon => "abandon",
            ElementLabel::Figure => "figure",
            ElementLabel::FigureCaption => "figure_caption",
            ElementLabel::Table => "table",
            ElementLabel::TableCaption => "table_caption",
            ElementLabel::TableFootnote => "table_footnote",
            ElementLabel::IsolateFormula => "isolate_formula",
            ElementLabel::FormulaCaption => "formula_caption",
        }
    }

    /// Parse a label string from the detection service. Accepts spaces or
    /// hyphens in place of underscores (`"plain text"`, `"plain_text"`).
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "title" => Some(ElementLabel::Title),
            "plain_text" | "text" => Some(ElementLabel::PlainText),
            "abandon" => Some(ElementLabel::Abandon),
            "figure" => Some(ElementLabel::Figure),
            "figure_caption" => Some(ElementLabel::FigureCaption),
            "table" => Some(ElementLabel::Table),
            "table_caption" => Some(ElementLabel::TableCaption),
            "table_footnote" => Some(ElementLabel::TableFootnote),
            "isolate_formula" => Some(ElementLabel::IsolateFormula),
            "formula_caption" => Some(ElementLabel::FormulaCaption),
            _ => None,
        }
    }
}

impl std::fmt::Display for ElementLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pixel-space bounding box of a detected region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// One detected region persisted in a page manifest.
///
/// `id` numbers elements per label starting at 0 within each page
/// (`table_0`, `figure_1`); `image_ref` is the crop file name relative to
/// the page directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutElement {
    pub id: String,
    pub label: ElementLabel,
    pub page: usize,
    pub bbox: BBox,
    pub image_ref: String,
}

const MANIFEST_FILE: &str = "manifest.json";

/// Per-document layout cache rooted at a fixed directory.
#[derive(Debug, Clone)]
pub struct LayoutCache {
    root: PathBuf,
}

impl LayoutCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding a document's cached analysis.
    pub fn doc_dir(&self, pdf_path: &Path) -> PathBuf {
        let stem = pdf_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());
        self.root.join(stem)
    }

    fn page_dir(&self, pdf_path: &Path, page: usize) -> PathBuf {
        self.doc_dir(pdf_path).join(format!("page_{}", page))
    }

    /// True if the document already has a non-empty cache entry.
    pub fn has_entry(&self, pdf_path: &Path) -> bool {
        let dir = self.doc_dir(pdf_path);
        match std::fs::read_dir(&dir) {
            Ok(mut entries) => entries.next().is_some(),
            Err(_) => false,
        }
    }

    /// Load a page's manifest, or `None` if no manifest exists for it.
    pub fn load_page(&self, pdf_path: &Path, page: usize) -> Result<Option<Vec<LayoutElement>>> {
        let manifest = self.page_dir(pdf_path, page).join(MANIFEST_FILE);
        if !manifest.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&manifest)
            .with_context(|| format!("failed to read {}", manifest.display()))?;
        let elements: Vec<LayoutElement> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", manifest.display()))?;
        Ok(Some(elements))
    }

    /// Write a page's manifest, creating the page directory as needed.
    pub fn write_page(
        &self,
        pdf_path: &Path,
        page: usize,
        elements: &[LayoutElement],
    ) -> Result<()> {
        let dir = self.page_dir(pdf_path, page);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let manifest = dir.join(MANIFEST_FILE);
        let content = serde_json::to_string_pretty(elements)?;
        std::fs::write(&manifest, content)
            .with_context(|| format!("failed to write {}", manifest.display()))?;
        Ok(())
    }
}

/// Outcome counts from a layout sweep over a set of PDFs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LayoutSummary {
    pub analyzed: usize,
    pub cached: usize,
    pub failed: usize,
}

/// Runs detection over rendered pages and persists the results.
pub struct LayoutAnalyzer {
    renderer: Box<dyn PageRenderer>,
    detector: Box<dyn LayoutDetector>,
    cache: LayoutCache,
    image_size: u32,
}

impl LayoutAnalyzer {
    pub fn new(
        renderer: Box<dyn PageRenderer>,
        detector: Box<dyn LayoutDetector>,
        cache: LayoutCache,
        image_size: u32,
    ) -> Self {
        Self {
            renderer,
            detector,
            cache,
            image_size,
        }
    }

    /// Analyze one PDF, writing crops and manifests into the cache.
    ///
    /// Returns `Ok(false)` on a cache hit (no rendering, no detection).
    /// Each page's manifest is persisted as soon as that page is done.
    pub async fn analyze(&self, pdf_path: &Path) -> Result<bool> {
        if self.cache.has_entry(pdf_path) {
            tracing::debug!(pdf = %pdf_path.display(), "layout cache hit, skipping analysis");
            return Ok(false);
        }

        tracing::info!(pdf = %pdf_path.display(), "analyzing layout");
        let pages = self.renderer.render_pages(pdf_path, self.image_size)?;

        for (page_no, image) in pages.iter().enumerate() {
            let detections = self.detector.detect(image).await?;

            let page_dir = self.cache.page_dir(pdf_path, page_no);
            std::fs::create_dir_all(&page_dir)
                .with_context(|| format!("failed to create {}", page_dir.display()))?;

            let mut counters: HashMap<ElementLabel, usize> = HashMap::new();
            let mut elements = Vec::with_capacity(detections.len());

            for detection in detections {
                let n = counters.entry(detection.label).or_insert(0);
                let id = format!("{}_{}", detection.label, n);
                *n += 1;

                let image_ref = format!("{}.png", id);
                let crop = crop_region(image, &detection.bbox);
                crop.save(page_dir.join(&image_ref))
                    .with_context(|| format!("failed to save crop {}", image_ref))?;

                elements.push(LayoutElement {
                    id,
                    label: detection.label,
                    page: page_no,
                    bbox: detection.bbox,
                    image_ref,
                });
            }

            self.cache.write_page(pdf_path, page_no, &elements)?;
        }

        Ok(true)
    }

    /// Analyze a set of PDFs, skipping cached documents and tolerating
    /// per-document failures: a PDF that fails to render or detect is
    /// logged and skipped, never fatal to the sweep.
    pub async fn analyze_all(&self, pdfs: &[PathBuf]) -> LayoutSummary {
        let mut summary = LayoutSummary::default();
        for pdf in pdfs {
            match self.analyze(pdf).await {
                Ok(true) => summary.analyzed += 1,
                Ok(false) => summary.cached += 1,
                Err(e) => {
                    tracing::warn!(pdf = %pdf.display(), error = %e, "layout analysis failed, skipping document");
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}

/// Crop a detected region out of a page image, clamped to image bounds.
fn crop_region(image: &DynamicImage, bbox: &BBox) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    let x1 = (bbox.x1.max(0.0) as u32).min(width.saturating_sub(1));
    let y1 = (bbox.y1.max(0.0) as u32).min(height.saturating_sub(1));
    let x2 = (bbox.x2.ceil().max(0.0) as u32).clamp(x1 + 1, width.max(x1 + 1));
    let y2 = (bbox.y2.ceil().max(0.0) as u32).clamp(y1 + 1, height.max(y1 + 1));
    image.crop_imm(x1, y1, x2 - x1, y2 - y1)
}
