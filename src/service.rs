//! Service orchestration for the full pipeline.
//!
//! [`RagService`] is an explicitly constructed, explicitly scoped object
//! — no ambient global. It owns the on-disk index location, loads any
//! persisted index at construction, and wires the loader, chunker, index
//! manager, and query processor together. Entry points that need the
//! service receive it as a value.

use anyhow::{bail, Context, Result};

use crate::chunker::SentenceSplitter;
use crate::config::Config;
use crate::detect::HttpLayoutDetector;
use crate::index::{IndexManager, VectorIndex};
use crate::layout::{LayoutAnalyzer, LayoutCache, LayoutSummary};
use crate::models::QueryResult;
use crate::ollama::OllamaClient;
use crate::pdf::PdfLoader;
use crate::query::QueryProcessor;
use crate::render::PdfiumRenderer;

/// Counts from a completed index build.
#[derive(Debug, Clone, Copy)]
pub struct BuildSummary {
    pub documents: usize,
    pub nodes: usize,
}

/// Snapshot of the model environment, taken before a build or shown by
/// the `status` command.
#[derive(Debug, Clone)]
pub struct EnvReport {
    /// Ollama server version, `None` if unreachable.
    pub version: Option<String>,
    /// Required models paired with their availability.
    pub models: Vec<(String, bool)>,
    /// Every model the server reports.
    pub available: Vec<String>,
}

impl EnvReport {
    pub fn ready(&self) -> bool {
        self.version.is_some() && self.models.iter().all(|(_, present)| *present)
    }
}

pub struct RagService {
    config: Config,
    ollama: OllamaClient,
    loader: PdfLoader,
    splitter: SentenceSplitter,
    index_manager: IndexManager,
    processor: QueryProcessor,
    index: Option<VectorIndex>,
}

impl RagService {
    /// Build the service: create the PDF and storage directories if
    /// missing, and load a persisted index when one exists.
    pub async fn new(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.paths.pdf_dir).with_context(|| {
            format!("failed to create PDF directory {}", config.paths.pdf_dir.display())
        })?;
        std::fs::create_dir_all(&config.paths.storage_dir).with_context(|| {
            format!(
                "failed to create storage directory {}",
                config.paths.storage_dir.display()
            )
        })?;

        let ollama = OllamaClient::new(&config.ollama)?;
        let loader = PdfLoader::new(config.paths.pdf_dir.clone(), config.paths.layout_dir.clone());
        let splitter =
            SentenceSplitter::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
        let index_manager = IndexManager::new(config.paths.storage_dir.clone());
        let processor = QueryProcessor::new(config.retrieval.top_k);

        let index = match index_manager.load().await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "could not load persisted index, starting without one");
                None
            }
        };

        Ok(Self {
            config,
            ollama,
            loader,
            splitter,
            index_manager,
            processor,
            index,
        })
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Probe the model environment without failing: server version,
    /// required-model availability, and the full model list.
    pub async fn check_environment(&self) -> EnvReport {
        match self.ollama.version().await {
            Ok(version) => {
                let available = self.ollama.list_models().await.unwrap_or_default();
                let models = self
                    .ollama
                    .required_models()
                    .into_iter()
                    .map(|model| {
                        let present = available.contains(&model);
                        (model, present)
                    })
                    .collect();
                EnvReport {
                    version: Some(version),
                    models,
                    available,
                }
            }
            Err(_) => EnvReport {
                version: None,
                models: self
                    .ollama
                    .required_models()
                    .into_iter()
                    .map(|model| (model, false))
                    .collect(),
                available: Vec::new(),
            },
        }
    }

    /// Environment errors surface here, before any pipeline work starts.
    async fn preflight(&self) -> Result<()> {
        let report = self.check_environment().await;
        if report.version.is_none() {
            bail!(
                "Ollama is not reachable at {}; start it and try again",
                self.config.ollama.base_url
            );
        }
        let missing: Vec<&str> = report
            .models
            .iter()
            .filter(|(_, present)| !present)
            .map(|(model, _)| model.as_str())
            .collect();
        if !missing.is_empty() {
            bail!(
                "required models are not available in Ollama: {} (pull with `ollama pull <model>`)",
                missing.join(", ")
            );
        }
        Ok(())
    }

    /// Full build: load PDFs, chunk, embed, persist. The in-memory index
    /// is swapped only after persistence succeeds, so the query path
    /// never sees an index inconsistent with what was last built.
    pub async fn build_index(&mut self) -> Result<BuildSummary> {
        self.preflight().await?;

        let documents = self.loader.load_all()?;
        if documents.is_empty() {
            bail!(
                "no PDF documents could be loaded from {}",
                self.config.paths.pdf_dir.display()
            );
        }

        let nodes = self.splitter.chunk_documents(&documents);
        tracing::info!(
            documents = documents.len(),
            nodes = nodes.len(),
            "chunked document set"
        );

        let index = self.index_manager.create(&self.ollama, nodes).await?;
        self.index_manager.persist(&index).await?;

        let summary = BuildSummary {
            documents: documents.len(),
            nodes: index.len(),
        };
        self.index = Some(index);
        Ok(summary)
    }

    /// Run layout analysis over every PDF in the directory, skipping
    /// documents that already have cache entries.
    pub async fn analyze_layouts(&self) -> Result<LayoutSummary> {
        let renderer = PdfiumRenderer::new()?;
        let detector = HttpLayoutDetector::new(&self.config.detection)?;
        let analyzer = LayoutAnalyzer::new(
            Box::new(renderer),
            Box::new(detector),
            LayoutCache::new(self.config.paths.layout_dir.clone()),
            self.config.detection.image_size,
        );

        let pdfs = self.loader.pdf_files()?;
        Ok(analyzer.analyze_all(&pdfs).await)
    }

    /// Answer a question against the current index. With no index in
    /// memory or on disk, a full build is triggered lazily — the only
    /// implicit build in the system. Returns `Ok(None)` when no usable
    /// index could be produced.
    pub async fn query(&mut self, question: &str) -> Result<Option<QueryResult>> {
        if self.index.is_none() {
            match self.index_manager.load().await {
                Ok(Some(index)) => self.index = Some(index),
                Ok(None) => {
                    tracing::info!("no index available, building one first");
                    if let Err(e) = self.build_index().await {
                        tracing::warn!(error = %e, "index build failed");
                        return Ok(None);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "could not load persisted index");
                    return Ok(None);
                }
            }
        }

        let Some(index) = self.index.as_ref() else {
            return Ok(None);
        };

        let result = self
            .processor
            .query(index, &self.ollama, &self.ollama, question)
            .await?;
        Ok(Some(result))
    }
}
