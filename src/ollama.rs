//! Ollama HTTP client.
//!
//! Both model collaborators — the embedding model and the language model —
//! are served by a local Ollama instance and invoked as blocking
//! request/response calls. The client also exposes the environment
//! checks (`/api/version`, `/api/tags`) used to verify the deployment
//! before a build starts.
//!
//! # Retry strategy
//!
//! Model calls use exponential backoff for transient errors:
//! - HTTP 429 and 5xx → retry (1s, 2s, 4s, ... capped at 32s)
//! - other 4xx → fail immediately
//! - network errors → retry

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::OllamaConfig;
use crate::embedding::Embedder;
use crate::query::Generator;

pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    llm_model: String,
    embedding_model: String,
    embedding_dims: usize,
    temperature: f32,
    max_retries: u32,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct VersionResponse {
    version: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build Ollama HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            llm_model: config.llm_model.clone(),
            embedding_model: config.embedding_model.clone(),
            embedding_dims: config.embedding_dims,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    /// The models this deployment needs pulled: LLM and embedding model.
    pub fn required_models(&self) -> Vec<String> {
        vec![self.llm_model.clone(), self.embedding_model.clone()]
    }

    /// Ollama server version, or an error if it is unreachable.
    pub async fn version(&self) -> Result<String> {
        let url = format!("{}/api/version", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Ollama is not reachable at {}", self.base_url))?;
        if !response.status().is_success() {
            bail!("Ollama version check failed: HTTP {}", response.status());
        }
        let version: VersionResponse = response
            .json()
            .await
            .context("failed to parse Ollama version response")?;
        Ok(version.version)
    }

    /// True if the Ollama server responds to a version probe.
    pub async fn is_running(&self) -> bool {
        self.version().await.is_ok()
    }

    /// Names of all models available on the server.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Ollama is not reachable at {}", self.base_url))?;
        if !response.status().is_success() {
            bail!("Ollama model listing failed: HTTP {}", response.status());
        }
        let tags: TagsResponse = response
            .json()
            .await
            .context("failed to parse Ollama tags response")?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Availability of each required model on the server.
    pub async fn check_required_models(&self) -> Result<Vec<(String, bool)>> {
        let available = self.list_models().await?;
        Ok(self
            .required_models()
            .into_iter()
            .map(|model| {
                let present = available.contains(&model);
                (model, present)
            })
            .collect())
    }

    /// Embed a single text with the configured embedding model.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbedRequest {
            model: &self.embedding_model,
            prompt: text,
        };
        let response: EmbedResponse = self.post_with_retry(&url, &request).await?;
        Ok(response.embedding)
    }

    /// Complete a prompt with the configured LLM, streaming disabled.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.llm_model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };
        let response: GenerateResponse = self.post_with_retry(&url, &request).await?;
        Ok(response.response)
    }

    async fn post_with_retry<Req, Resp>(&self, url: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::warn!(
                    url,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "retrying Ollama request"
                );
                tokio::time::sleep(delay).await;
            }

            match self.client.post(url).json(body).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<Resp>()
                            .await
                            .context("failed to parse Ollama response");
                    }

                    let text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow!("Ollama error {}: {}", status, text));
                        continue;
                    }
                    bail!("Ollama error {}: {}", status, text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Ollama request failed after retries")))
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    fn dims(&self) -> usize {
        self.embedding_dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_text(text).await
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.generate(prompt).await
    }
}
