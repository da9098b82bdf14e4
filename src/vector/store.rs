use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// A stored chunk with its provenance metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Unique chunk identifier.
    pub chunk_id: String,
    /// The text content of the chunk.
    pub content: String,
    /// Source identifier (file name, URL).
    pub source: String,
    /// Namespace that isolates this chunk (one per session).
    pub namespace: String,
    /// Optional metadata (JSON: source_type, url, ...).
    pub metadata: Option<serde_json::Value>,
}

/// Result of a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSearchResult {
    pub chunk: StoredChunk,
    /// Cosine similarity (higher = better).
    pub score: f32,
}

/// Abstract interface over the shared embedding index.
///
/// Implementations must scope every operation to the given namespace and
/// return an empty result (not an error) for namespaces with no vectors.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert chunks with their embedding vectors.
    async fn upsert(&self, items: Vec<(StoredChunk, Vec<f32>)>) -> Result<(), ApiError>;

    /// Search a namespace for chunks similar to the query embedding,
    /// keeping only scores at or above `score_threshold`, most similar first.
    async fn search(
        &self,
        namespace: &str,
        query_embedding: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ChunkSearchResult>, ApiError>;

    /// Count chunks, optionally within one namespace.
    async fn count(&self, namespace: Option<&str>) -> Result<usize, ApiError>;

    /// Delete all chunks in a namespace. Returns the number removed.
    async fn delete_namespace(&self, namespace: &str) -> Result<usize, ApiError>;
}
