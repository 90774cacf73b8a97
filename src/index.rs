//! Vector index lifecycle: batch build, persistence, and loading.
//!
//! The index maps every chunk to its embedding vector and answers top-k
//! cosine retrieval. Builds are batch-only: `create` embeds the complete
//! chunk set and any failure aborts the build — a partial index is never
//! produced. `persist` writes a SQLite database into the storage
//! directory, fully replacing whatever was there; `load` reconstructs a
//! functionally equivalent index without re-embedding. A missing storage
//! location is the expected first-run state, not an error.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::Row;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, Embedder};
use crate::models::{DocMetadata, Node};

const INDEX_DB_FILE: &str = "index.sqlite";

/// A chunk paired with its embedding vector.
#[derive(Debug, Clone)]
pub struct IndexedNode {
    pub node: Node,
    pub embedding: Vec<f32>,
}

/// In-memory vector index over a complete chunk set.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    entries: Vec<IndexedNode>,
    embed_model: String,
    dims: usize,
}

impl VectorIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding model the index was built with.
    pub fn model_name(&self) -> &str {
        &self.embed_model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn entries(&self) -> &[IndexedNode] {
        &self.entries
    }

    /// The `k` entries most similar to the query vector, scored by
    /// cosine similarity, highest first. Ties keep insertion order.
    pub fn top_k(&self, query: &[f32], k: usize) -> Vec<(&IndexedNode, f32)> {
        let mut scored: Vec<(&IndexedNode, f32)> = self
            .entries
            .iter()
            .map(|entry| (entry, cosine_similarity(query, &entry.embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

/// Owns the on-disk index location and the create/persist/load lifecycle.
pub struct IndexManager {
    storage_dir: PathBuf,
}

impl IndexManager {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
        }
    }

    pub fn storage_dir(&self) -> &PathBuf {
        &self.storage_dir
    }

    fn db_path(&self) -> PathBuf {
        self.storage_dir.join(INDEX_DB_FILE)
    }

    /// Build an index from the complete chunk set: one embedding pass,
    /// each chunk embedded exactly once, in order. Any embedding failure
    /// or dimensionality mismatch aborts the whole build.
    pub async fn create(&self, embedder: &dyn Embedder, nodes: Vec<Node>) -> Result<VectorIndex> {
        let dims = embedder.dims();
        let mut entries = Vec::with_capacity(nodes.len());

        for node in nodes {
            let embedding = embedder.embed(&node.text).await.with_context(|| {
                format!(
                    "failed to embed chunk {} of {}",
                    node.position, node.metadata.source
                )
            })?;
            if embedding.len() != dims {
                bail!(
                    "embedding for chunk {} of {} has {} dims, expected {}",
                    node.position,
                    node.metadata.source,
                    embedding.len(),
                    dims
                );
            }
            entries.push(IndexedNode { node, embedding });
        }

        Ok(VectorIndex {
            entries,
            embed_model: embedder.model_name().to_string(),
            dims,
        })
    }

    /// Write the index into the storage directory, replacing any
    /// previous index. All rows go into a scratch database that is
    /// swapped over the live file only after the last row is written.
    pub async fn persist(&self, index: &VectorIndex) -> Result<()> {
        std::fs::create_dir_all(&self.storage_dir).with_context(|| {
            format!(
                "failed to create storage directory {}",
                self.storage_dir.display()
            )
        })?;

        let scratch = self.storage_dir.join(format!("{}.tmp", INDEX_DB_FILE));
        if scratch.exists() {
            std::fs::remove_file(&scratch)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", scratch.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE nodes (
                id TEXT PRIMARY KEY,
                ord INTEGER NOT NULL UNIQUE,
                position INTEGER NOT NULL,
                text TEXT NOT NULL,
                hash TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        let mut tx = pool.begin().await?;

        let meta = [
            ("embed_model", index.model_name().to_string()),
            ("dims", index.dims().to_string()),
            ("node_count", index.len().to_string()),
            ("created_at", chrono::Utc::now().timestamp().to_string()),
        ];
        for (key, value) in meta {
            sqlx::query("INSERT INTO index_meta (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        for (ord, entry) in index.entries().iter().enumerate() {
            let metadata_json = serde_json::to_string(&entry.node.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO nodes (id, ord, position, text, hash, metadata_json, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&entry.node.id)
            .bind(ord as i64)
            .bind(entry.node.position as i64)
            .bind(&entry.node.text)
            .bind(hash_text(&entry.node.text))
            .bind(&metadata_json)
            .bind(vec_to_blob(&entry.embedding))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        pool.close().await;

        std::fs::rename(&scratch, self.db_path()).with_context(|| {
            format!("failed to move index into place at {}", self.db_path().display())
        })?;

        tracing::info!(
            nodes = index.len(),
            dir = %self.storage_dir.display(),
            "index persisted"
        );
        Ok(())
    }

    /// Load the persisted index if one exists. A missing storage
    /// directory or database file yields `Ok(None)`.
    pub async fn load(&self) -> Result<Option<VectorIndex>> {
        let db_path = self.db_path();
        if !db_path.exists() {
            return Ok(None);
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .journal_mode(SqliteJournalMode::Delete);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let embed_model: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'embed_model'")
                .fetch_optional(&pool)
                .await?;
        let dims: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'dims'")
                .fetch_optional(&pool)
                .await?;

        let (Some(embed_model), Some(dims)) = (embed_model, dims) else {
            pool.close().await;
            bail!("index at {} is missing its metadata", db_path.display());
        };
        let dims: usize = dims
            .parse()
            .with_context(|| format!("invalid dims in index metadata at {}", db_path.display()))?;

        let rows = sqlx::query(
            "SELECT id, position, text, metadata_json, embedding FROM nodes ORDER BY ord",
        )
        .fetch_all(&pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let metadata_json: String = row.get("metadata_json");
            let metadata: DocMetadata = serde_json::from_str(&metadata_json)
                .context("failed to parse node metadata from index")?;
            let position: i64 = row.get("position");
            let blob: Vec<u8> = row.get("embedding");

            entries.push(IndexedNode {
                node: Node {
                    id: row.get("id"),
                    text: row.get("text"),
                    position: position as usize,
                    metadata,
                },
                embedding: blob_to_vec(&blob),
            });
        }

        pool.close().await;

        tracing::info!(nodes = entries.len(), dir = %self.storage_dir.display(), "index loaded");
        Ok(Some(VectorIndex {
            entries,
            embed_model,
            dims,
        }))
    }
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
