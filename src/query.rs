//! Query orchestration: retrieve relevant chunks and synthesize a
//! grounded answer.

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::embedding::Embedder;
use crate::index::{IndexedNode, VectorIndex};
use crate::models::{QueryResult, SourceChunk};

/// A language model reachable as a request/response collaborator,
/// invoked once per query.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Retrieves the top-matching chunks for a question and asks the
/// language model to compose an answer from them.
///
/// Sources are returned in the order the index ranked them
/// (relevance-descending); no re-ranking happens here.
pub struct QueryProcessor {
    top_k: usize,
}

impl QueryProcessor {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    pub async fn query(
        &self,
        index: &VectorIndex,
        embedder: &dyn Embedder,
        generator: &dyn Generator,
        question: &str,
    ) -> Result<QueryResult> {
        let query_vec = embedder
            .embed(question)
            .await
            .context("failed to embed query")?;

        if query_vec.len() != index.dims() {
            tracing::warn!(
                query_dims = query_vec.len(),
                index_dims = index.dims(),
                index_model = index.model_name(),
                "query embedding dimensionality does not match the index; \
                 was the index built with a different embedding model?"
            );
        }

        let hits = index.top_k(&query_vec, self.top_k);
        if hits.is_empty() {
            // Executed but nothing matched — distinguishable from "no
            // index" (the service returns None for that) by the empty
            // sources list.
            return Ok(QueryResult {
                response: "No relevant passages were found in the indexed documents.".to_string(),
                sources: Vec::new(),
            });
        }

        let prompt = build_prompt(question, &hits);
        let response = generator
            .complete(&prompt)
            .await
            .context("failed to generate answer")?;

        let sources = hits
            .into_iter()
            .map(|(entry, _score)| SourceChunk {
                text: entry.node.text.clone(),
                metadata: entry.node.metadata.clone(),
            })
            .collect();

        Ok(QueryResult { response, sources })
    }
}

/// Assemble the grounded prompt: numbered excerpts with their source
/// document names, then the question.
fn build_prompt(question: &str, hits: &[(&IndexedNode, f32)]) -> String {
    let mut excerpts = String::new();
    for (i, (entry, _score)) in hits.iter().enumerate() {
        excerpts.push_str(&format!(
            "[{}] {}\n{}\n\n",
            i + 1,
            entry.node.metadata.source,
            entry.node.text
        ));
    }

    format!(
        "You are an assistant that answers questions using only the provided \
         document excerpts.\n\n\
         Rules:\n\
         - Use only information stated in the excerpts below.\n\
         - If the answer is not in the excerpts, say the information is not \
         available in the indexed documents.\n\
         - Mention the source document when it supports a claim.\n\n\
         Excerpts:\n{}\
         Question: {}\n\n\
         Answer:",
        excerpts, question
    )
}
