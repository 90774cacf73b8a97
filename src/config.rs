use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Flat directory scanned for `*.pdf` files (no recursion).
    #[serde(default = "default_pdf_dir")]
    pub pdf_dir: PathBuf,
    /// Directory the vector index is persisted into.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    /// Root of the per-document layout cache.
    #[serde(default = "default_layout_dir")]
    pub layout_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            pdf_dir: default_pdf_dir(),
            storage_dir: default_storage_dir(),
            layout_dir: default_layout_dir(),
        }
    }
}

fn default_pdf_dir() -> PathBuf {
    PathBuf::from("pdfs")
}
fn default_storage_dir() -> PathBuf {
    PathBuf::from("storage")
}
fn default_layout_dir() -> PathBuf {
    PathBuf::from("layout_outputs")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in tokens.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Tokens repeated from the end of one chunk at the start of the next.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    512
}
fn default_chunk_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct OllamaConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Vector dimensionality of the embedding model. Must match between
    /// build and query time.
    #[serde(default = "default_embedding_dims")]
    pub embedding_dims: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            llm_model: default_llm_model(),
            embedding_model: default_embedding_model(),
            embedding_dims: default_embedding_dims(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            temperature: default_temperature(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_llm_model() -> String {
    "gemma3:12b".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text:latest".to_string()
}
fn default_embedding_dims() -> usize {
    768
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    3
}
fn default_temperature() -> f32 {
    0.1
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    /// Endpoint of the layout-detection service (receives page images).
    #[serde(default = "default_detection_endpoint")]
    pub endpoint: String,
    /// Detections below this confidence are dropped by the service itself.
    #[serde(default = "default_conf_threshold")]
    pub conf_threshold: f32,
    /// Width in pixels pages are rendered at before detection.
    #[serde(default = "default_image_size")]
    pub image_size: u32,
    #[serde(default = "default_detection_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_detection_endpoint(),
            conf_threshold: default_conf_threshold(),
            image_size: default_image_size(),
            timeout_secs: default_detection_timeout_secs(),
        }
    }
}

fn default_detection_endpoint() -> String {
    "http://localhost:8003/detect".to_string()
}
fn default_conf_threshold() -> f32 {
    0.25
}
fn default_image_size() -> u32 {
    1024
}
fn default_detection_timeout_secs() -> u64 {
    60
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists; otherwise fall back to defaults so the tool
/// runs with zero configuration.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be smaller than chunk_size");
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.ollama.embedding_dims == 0 {
        anyhow::bail!("ollama.embedding_dims must be > 0");
    }
    if !(0.0..=1.0).contains(&config.detection.conf_threshold) {
        anyhow::bail!("detection.conf_threshold must be in [0.0, 1.0]");
    }
    if config.detection.image_size == 0 {
        anyhow::bail!("detection.image_size must be > 0");
    }
    Ok(())
}
