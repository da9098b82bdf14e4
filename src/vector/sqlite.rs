//! SQLite-backed vector store.
//!
//! Chunk text + metadata rows with serialized embeddings, brute-force cosine
//! similarity at query time. No external vector server required.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{ChunkSearchResult, StoredChunk, VectorStore};
use crate::core::errors::ApiError;

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                namespace TEXT NOT NULL DEFAULT '',
                metadata TEXT DEFAULT '{}',
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_namespace ON chunks(namespace)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(())
    }

    /// Serialize embedding to bytes (little-endian f32).
    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, items: Vec<(StoredChunk, Vec<f32>)>) -> Result<(), ApiError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        for (chunk, embedding) in &items {
            let blob = Self::serialize_embedding(embedding);
            let metadata_str = chunk
                .metadata
                .as_ref()
                .map(|m| serde_json::to_string(m).unwrap_or_default())
                .unwrap_or_else(|| "{}".to_string());

            sqlx::query(
                "INSERT OR REPLACE INTO chunks (chunk_id, content, source, namespace, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.content)
            .bind(&chunk.source)
            .bind(&chunk.namespace)
            .bind(&metadata_str)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        tracing::debug!("Inserted {} chunks into vector store", items.len());
        Ok(())
    }

    async fn search(
        &self,
        namespace: &str,
        query_embedding: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ChunkSearchResult>, ApiError> {
        let rows = sqlx::query(
            "SELECT chunk_id, content, source, namespace, metadata, embedding
             FROM chunks WHERE namespace = ?1",
        )
        .bind(namespace)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut scored: Vec<ChunkSearchResult> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                if embedding_bytes.is_empty() {
                    return None;
                }
                let stored_emb = Self::deserialize_embedding(&embedding_bytes);
                let score = Self::cosine_similarity(query_embedding, &stored_emb);
                if score < score_threshold {
                    return None;
                }

                let metadata_str: String = row.get("metadata");
                let metadata = serde_json::from_str(&metadata_str).ok();

                Some(ChunkSearchResult {
                    chunk: StoredChunk {
                        chunk_id: row.get("chunk_id"),
                        content: row.get("content"),
                        source: row.get("source"),
                        namespace: row.get("namespace"),
                        metadata,
                    },
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);

        Ok(scored)
    }

    async fn count(&self, namespace: Option<&str>) -> Result<usize, ApiError> {
        let count: i64 = if let Some(ns) = namespace {
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE namespace = ?1")
                .bind(ns)
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::internal)?
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::internal)?
        };

        Ok(count as usize)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<usize, ApiError> {
        let result = sqlx::query("DELETE FROM chunks WHERE namespace = ?1")
            .bind(namespace)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (SqliteVectorStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::new(dir.path().join("vectors.db"))
            .await
            .unwrap();
        (store, dir)
    }

    fn chunk(id: &str, namespace: &str) -> StoredChunk {
        StoredChunk {
            chunk_id: id.to_string(),
            content: format!("content of {}", id),
            source: "test".to_string(),
            namespace: namespace.to_string(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn upsert_and_search() {
        let (store, _dir) = test_store().await;

        store
            .upsert(vec![(chunk("c1", "s1"), vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(store.count(None).await.unwrap(), 1);

        let results = store.search("s1", &[1.0, 0.0, 0.0], 10, 0.0).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.chunk_id, "c1");
        assert!(results[0].score > 0.99);
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let (store, _dir) = test_store().await;

        store
            .upsert(vec![
                (chunk("c1", "s1"), vec![1.0, 0.0]),
                (chunk("c2", "s2"), vec![1.0, 0.0]),
                (chunk("c3", "s1"), vec![0.9, 0.1]),
            ])
            .await
            .unwrap();

        let results = store.search("s1", &[1.0, 0.0], 10, 0.0).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.chunk.namespace == "s1"));

        assert_eq!(store.count(Some("s2")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn threshold_filters_low_scores() {
        let (store, _dir) = test_store().await;

        store
            .upsert(vec![
                (chunk("close", "s1"), vec![1.0, 0.0]),
                (chunk("far", "s1"), vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = store.search("s1", &[1.0, 0.0], 10, 0.7).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.chunk_id, "close");
    }

    #[tokio::test]
    async fn empty_namespace_returns_empty() {
        let (store, _dir) = test_store().await;
        let results = store.search("nothing-here", &[1.0], 5, 0.7).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn delete_namespace_removes_only_that_namespace() {
        let (store, _dir) = test_store().await;

        store
            .upsert(vec![
                (chunk("c1", "s1"), vec![1.0]),
                (chunk("c2", "s2"), vec![1.0]),
            ])
            .await
            .unwrap();

        let deleted = store.delete_namespace("s1").await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count(None).await.unwrap(), 1);
        assert_eq!(store.count(Some("s2")).await.unwrap(), 1);
    }
}
