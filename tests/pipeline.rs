//! Integration tests for the ingestion and retrieval pipeline.
//!
//! External collaborators (embedding model, language model, page
//! renderer, layout detector) are replaced with deterministic mocks so
//! the pipeline runs end to end without Ollama, pdfium, or a detection
//! service. PDFs are built as minimal byte fixtures the same way the
//! text extractor will read them back.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use image::DynamicImage;
use tempfile::TempDir;

use askpdf::chunker::SentenceSplitter;
use askpdf::config::Config;
use askpdf::detect::{Detection, LayoutDetector};
use askpdf::embedding::Embedder;
use askpdf::index::IndexManager;
use askpdf::layout::{BBox, ElementLabel, LayoutAnalyzer, LayoutCache, LayoutElement};
use askpdf::pdf::PdfLoader;
use askpdf::query::{Generator, QueryProcessor};
use askpdf::render::PageRenderer;
use askpdf::service::RagService;

// ============ Fixtures ============

/// Minimal single-page PDF showing each line of `lines`, with xref byte
/// offsets computed so pdf-extract can parse it.
fn minimal_pdf(lines: &[&str]) -> Vec<u8> {
    let mut stream = String::from("BT /F1 12 Tf 72 720 Td ");
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            stream.push_str("0 -16 Td ");
        }
        stream.push_str(&format!("({}) Tj ", line));
    }
    stream.push_str("ET");

    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            stream.len(),
            stream
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn write_pdf(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, minimal_pdf(lines)).unwrap();
    path
}

// ============ Mock collaborators ============

fn fnv1a(s: &str) -> u64 {
    let mut hash = 0xcbf29ce484222325u64;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Deterministic bag-of-words embedder: texts sharing words get similar
/// vectors, so retrieval ranks overlapping chunks first.
struct MockEmbedder;

const MOCK_DIMS: usize = 32;

impl MockEmbedder {
    fn vectorize(text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; MOCK_DIMS];
        for word in text.to_lowercase().split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            if word.is_empty() {
                continue;
            }
            vec[(fnv1a(word) % MOCK_DIMS as u64) as usize] += 1.0;
        }
        vec
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn model_name(&self) -> &str {
        "mock-embed"
    }

    fn dims(&self) -> usize {
        MOCK_DIMS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::vectorize(text))
    }
}

/// Embedder that fails on every call, for build-abort behavior.
struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing-embed"
    }

    fn dims(&self) -> usize {
        MOCK_DIMS
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        anyhow::bail!("embedding service unavailable")
    }
}

/// Generator that records the last prompt and returns a canned answer.
struct MockGenerator {
    last_prompt: Mutex<String>,
}

impl MockGenerator {
    fn new() -> Self {
        Self {
            last_prompt: Mutex::new(String::new()),
        }
    }

    fn last_prompt(&self) -> String {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        *self.last_prompt.lock().unwrap() = prompt.to_string();
        Ok("The answer, grounded in the provided excerpts.".to_string())
    }
}

/// Renderer producing blank pages without touching the file.
struct MockRenderer {
    pages: usize,
}

impl PageRenderer for MockRenderer {
    fn render_pages(&self, _pdf_path: &Path, _target_width: u32) -> Result<Vec<DynamicImage>> {
        Ok((0..self.pages)
            .map(|_| DynamicImage::new_rgb8(200, 300))
            .collect())
    }
}

/// Detector returning a fixed detection set and counting invocations.
struct MockDetector {
    detections: Vec<Detection>,
    calls: Arc<AtomicUsize>,
}

impl MockDetector {
    fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl LayoutDetector for MockDetector {
    async fn detect(&self, _image: &DynamicImage) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.detections.clone())
    }
}

fn detection(label: ElementLabel) -> Detection {
    Detection {
        bbox: BBox {
            x1: 10.0,
            y1: 10.0,
            x2: 60.0,
            y2: 60.0,
        },
        label,
        confidence: 0.9,
    }
}

// ============ Extraction ============

#[test]
fn loads_text_and_metadata_from_pdf() {
    let tmp = TempDir::new().unwrap();
    let pdf_dir = tmp.path().join("pdfs");
    std::fs::create_dir_all(&pdf_dir).unwrap();
    write_pdf(
        &pdf_dir,
        "alpha.pdf",
        &["Alpha Document Title", "Body content sentence."],
    );

    let loader = PdfLoader::new(&pdf_dir, tmp.path().join("layout"));
    let documents = loader.load_all().unwrap();

    assert_eq!(documents.len(), 1);
    let doc = &documents[0];
    assert!(doc.text.contains("Alpha Document Title"));
    assert!(doc.text.contains("Body content sentence."));
    assert_eq!(doc.metadata.source, "alpha.pdf");
    assert_eq!(doc.metadata.file_type, "pdf");
    assert!(doc.metadata.file_size > 0);
    assert!(!doc.metadata.has_layout_analysis);
    assert!(doc.metadata.title().is_some());
}

#[test]
fn corrupt_pdf_is_skipped_others_load() {
    let tmp = TempDir::new().unwrap();
    let pdf_dir = tmp.path().join("pdfs");
    std::fs::create_dir_all(&pdf_dir).unwrap();
    write_pdf(&pdf_dir, "good.pdf", &["First good document."]);
    std::fs::write(pdf_dir.join("corrupt.pdf"), b"not a pdf at all").unwrap();
    write_pdf(&pdf_dir, "good2.pdf", &["Second good document."]);

    let loader = PdfLoader::new(&pdf_dir, tmp.path().join("layout"));
    let documents = loader.load_all().unwrap();

    assert_eq!(documents.len(), 2);
    let sources: Vec<&str> = documents.iter().map(|d| d.metadata.source.as_str()).collect();
    assert_eq!(sources, vec!["good.pdf", "good2.pdf"]);
}

#[test]
fn non_pdf_files_are_ignored() {
    let tmp = TempDir::new().unwrap();
    let pdf_dir = tmp.path().join("pdfs");
    std::fs::create_dir_all(&pdf_dir).unwrap();
    write_pdf(&pdf_dir, "doc.pdf", &["A document."]);
    std::fs::write(pdf_dir.join("notes.txt"), "plain text").unwrap();
    std::fs::create_dir_all(pdf_dir.join("nested")).unwrap();
    write_pdf(&pdf_dir.join("nested"), "inner.pdf", &["Nested."]);

    let loader = PdfLoader::new(&pdf_dir, tmp.path().join("layout"));
    let files = loader.pdf_files().unwrap();
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("doc.pdf"));
}

// ============ Layout analysis & cache ============

#[tokio::test]
async fn layout_analysis_writes_crops_and_manifests() {
    let tmp = TempDir::new().unwrap();
    let cache = LayoutCache::new(tmp.path().join("layout"));
    let detector = MockDetector::new(vec![
        detection(ElementLabel::Table),
        detection(ElementLabel::TableCaption),
        detection(ElementLabel::Figure),
        detection(ElementLabel::Figure),
    ]);
    let analyzer = LayoutAnalyzer::new(
        Box::new(MockRenderer { pages: 2 }),
        Box::new(detector),
        cache.clone(),
        1024,
    );

    let pdf = tmp.path().join("pdfs").join("report.pdf");
    let ran = analyzer.analyze(&pdf).await.unwrap();
    assert!(ran);

    let elements = cache.load_page(&pdf, 0).unwrap().unwrap();
    assert_eq!(elements.len(), 4);
    // Elements are numbered per label starting at 0, in detection order.
    let ids: Vec<&str> = elements.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["table_0", "table_caption_0", "figure_0", "figure_1"]);
    // Crops exist next to the manifest.
    let page_dir = cache.doc_dir(&pdf).join("page_0");
    for element in &elements {
        assert!(page_dir.join(&element.image_ref).exists());
    }
    // Second page got its own manifest too.
    assert!(cache.load_page(&pdf, 1).unwrap().is_some());
}

#[tokio::test]
async fn second_analysis_is_a_cache_hit() {
    let tmp = TempDir::new().unwrap();
    let cache = LayoutCache::new(tmp.path().join("layout"));
    let detector = MockDetector::new(vec![detection(ElementLabel::Title)]);
    let calls = detector.call_counter();
    let analyzer = LayoutAnalyzer::new(
        Box::new(MockRenderer { pages: 3 }),
        Box::new(detector),
        cache,
        1024,
    );
    let pdf = tmp.path().join("pdfs").join("cached.pdf");

    assert!(analyzer.analyze(&pdf).await.unwrap());
    // One detection call per rendered page.
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // Second run: cache hit, zero additional detection work.
    assert!(!analyzer.analyze(&pdf).await.unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn fused_document_carries_layout_descriptions() {
    let tmp = TempDir::new().unwrap();
    let pdf_dir = tmp.path().join("pdfs");
    std::fs::create_dir_all(&pdf_dir).unwrap();
    let pdf = write_pdf(&pdf_dir, "fused.pdf", &["Fused document body."]);

    let layout_dir = tmp.path().join("layout");
    let cache = LayoutCache::new(&layout_dir);
    cache
        .write_page(
            &pdf,
            0,
            &[
                LayoutElement {
                    id: "table_0".to_string(),
                    label: ElementLabel::Table,
                    page: 0,
                    bbox: BBox {
                        x1: 0.0,
                        y1: 0.0,
                        x2: 50.0,
                        y2: 50.0,
                    },
                    image_ref: "table_0.png".to_string(),
                },
                LayoutElement {
                    id: "table_caption_0".to_string(),
                    label: ElementLabel::TableCaption,
                    page: 0,
                    bbox: BBox {
                        x1: 0.0,
                        y1: 60.0,
                        x2: 50.0,
                        y2: 70.0,
                    },
                    image_ref: "table_caption_0.png".to_string(),
                },
            ],
        )
        .unwrap();

    let loader = PdfLoader::new(&pdf_dir, &layout_dir);
    let doc = loader.load_single(&pdf).unwrap();

    assert!(doc.metadata.has_layout_analysis);
    assert!(doc.text.contains("Fused document body."));
    assert!(doc
        .text
        .contains("This page contains a table. The table is accompanied by a caption."));
    assert!(doc
        .text
        .contains("This page contains a caption describing a table."));
}

// ============ Index lifecycle ============

fn sample_nodes() -> Vec<askpdf::models::Node> {
    let splitter = SentenceSplitter::new(16, 4).unwrap();
    let docs = vec![
        askpdf::models::SourceDocument {
            text: "Rust ownership rules prevent data races. The borrow checker enforces them. \
                   Lifetimes describe how long references live."
                .to_string(),
            metadata: sample_metadata("rust.pdf"),
        },
        askpdf::models::SourceDocument {
            text: "Gardening requires patience and regular watering. Tomatoes need full sun. \
                   Compost improves the soil."
                .to_string(),
            metadata: sample_metadata("garden.pdf"),
        },
    ];
    splitter.chunk_documents(&docs)
}

fn sample_metadata(name: &str) -> askpdf::models::DocMetadata {
    askpdf::models::DocMetadata {
        source: name.to_string(),
        file_path: name.into(),
        file_size: 1,
        file_type: "pdf".to_string(),
        has_layout_analysis: false,
        extra: Default::default(),
    }
}

#[tokio::test]
async fn persist_then_load_preserves_topk() {
    let tmp = TempDir::new().unwrap();
    let manager = IndexManager::new(tmp.path().join("storage"));
    let embedder = MockEmbedder;

    let built = manager.create(&embedder, sample_nodes()).await.unwrap();
    manager.persist(&built).await.unwrap();
    let loaded = manager.load().await.unwrap().unwrap();

    assert_eq!(loaded.len(), built.len());
    assert_eq!(loaded.model_name(), "mock-embed");
    assert_eq!(loaded.dims(), MOCK_DIMS);

    let query = MockEmbedder::vectorize("does the borrow checker prevent data races");
    let before: Vec<(String, String)> = built
        .top_k(&query, 3)
        .into_iter()
        .map(|(e, _)| (e.node.metadata.source.clone(), e.node.text.clone()))
        .collect();
    let after: Vec<(String, String)> = loaded
        .top_k(&query, 3)
        .into_iter()
        .map(|(e, _)| (e.node.metadata.source.clone(), e.node.text.clone()))
        .collect();

    assert_eq!(before, after);
    assert_eq!(before[0].0, "rust.pdf");
}

#[tokio::test]
async fn missing_storage_loads_none() {
    let tmp = TempDir::new().unwrap();
    let manager = IndexManager::new(tmp.path().join("never-created"));
    assert!(manager.load().await.unwrap().is_none());
}

#[tokio::test]
async fn embedding_failure_aborts_build() {
    let tmp = TempDir::new().unwrap();
    let manager = IndexManager::new(tmp.path().join("storage"));
    let result = manager.create(&FailingEmbedder, sample_nodes()).await;
    assert!(result.is_err());
    // Nothing was persisted by the failed build.
    assert!(manager.load().await.unwrap().is_none());
}

#[tokio::test]
async fn persist_replaces_previous_index() {
    let tmp = TempDir::new().unwrap();
    let manager = IndexManager::new(tmp.path().join("storage"));
    let embedder = MockEmbedder;

    let first = manager.create(&embedder, sample_nodes()).await.unwrap();
    manager.persist(&first).await.unwrap();

    let splitter = SentenceSplitter::new(64, 8).unwrap();
    let docs = vec![askpdf::models::SourceDocument {
        text: "A single replacement document.".to_string(),
        metadata: sample_metadata("replacement.pdf"),
    }];
    let second = manager
        .create(&embedder, splitter.chunk_documents(&docs))
        .await
        .unwrap();
    manager.persist(&second).await.unwrap();

    let loaded = manager.load().await.unwrap().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded.entries()[0].node.metadata.source, "replacement.pdf");
}

// ============ Query orchestration ============

#[tokio::test]
async fn end_to_end_single_pdf_single_source() {
    let tmp = TempDir::new().unwrap();
    let pdf_dir = tmp.path().join("pdfs");
    std::fs::create_dir_all(&pdf_dir).unwrap();
    write_pdf(&pdf_dir, "notes.pdf", &["Section One", "Content A."]);

    let loader = PdfLoader::new(&pdf_dir, tmp.path().join("layout"));
    let documents = loader.load_all().unwrap();
    assert_eq!(documents.len(), 1);

    // Chunk size large enough to hold the whole document in one node.
    let splitter = SentenceSplitter::new(512, 50).unwrap();
    let nodes = splitter.chunk_documents(&documents);
    assert_eq!(nodes.len(), 1);

    let manager = IndexManager::new(tmp.path().join("storage"));
    let embedder = MockEmbedder;
    let index = manager.create(&embedder, nodes).await.unwrap();
    manager.persist(&index).await.unwrap();
    let index = manager.load().await.unwrap().unwrap();

    let generator = MockGenerator::new();
    let processor = QueryProcessor::new(2);
    let result = processor
        .query(&index, &embedder, &generator, "What does Content A say?")
        .await
        .unwrap();

    assert!(!result.response.is_empty());
    assert_eq!(result.sources.len(), 1);
    assert_eq!(result.sources[0].metadata.source, "notes.pdf");

    // The generator saw the retrieved excerpt and the question.
    let prompt = generator.last_prompt();
    assert!(prompt.contains("Content A."));
    assert!(prompt.contains("notes.pdf"));
    assert!(prompt.contains("What does Content A say?"));
}

#[tokio::test]
async fn query_without_index_returns_none() {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.paths.pdf_dir = tmp.path().join("pdfs");
    config.paths.storage_dir = tmp.path().join("storage");
    config.paths.layout_dir = tmp.path().join("layout");
    // Keep the environment probe short; there is no Ollama in tests.
    config.ollama.timeout_secs = 2;
    config.ollama.max_retries = 0;

    let mut service = RagService::new(config).await.unwrap();
    assert!(!service.has_index());

    let result = service.query("anything at all").await.unwrap();
    assert!(result.is_none());
}
