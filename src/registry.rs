//! Namespaced store registry.
//!
//! Owns the mapping from session id to its isolated view of the shared
//! vector index. Handles are created lazily, cached, and evicted
//! oldest-first once the cache exceeds capacity. Eviction only drops the
//! in-process handle; persisted vectors survive and a later
//! `get_or_create` rebuilds an equivalent handle.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::json;
use uuid::Uuid;

use crate::core::errors::ApiError;
use crate::ingest::DocumentChunk;
use crate::llm::LlmProvider;
use crate::vector::{ChunkSearchResult, StoredChunk, VectorStore};

/// A session-scoped view of the shared vector index.
///
/// Two different session ids never resolve to the same namespace; the same
/// id resolves to the same cached handle until evicted.
pub struct StoreHandle {
    namespace: String,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn LlmProvider>,
    embed_model: String,
}

impl StoreHandle {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Embed and index chunks into this handle's namespace.
    pub async fn index_chunks(&self, chunks: &[DocumentChunk]) -> Result<(), ApiError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.llm.embed(&texts, &self.embed_model).await?;

        let items = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                let stored = StoredChunk {
                    chunk_id: Uuid::new_v4().to_string(),
                    content: chunk.text.clone(),
                    source: chunk.source_name.clone(),
                    namespace: self.namespace.clone(),
                    metadata: Some(json!({
                        "source_type": chunk.source_kind.as_str(),
                        "source_name": chunk.source_name,
                        "url": chunk.url,
                    })),
                };
                (stored, embedding)
            })
            .collect();

        self.store.upsert(items).await
    }

    /// Embed the query and search this handle's namespace.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        score_threshold: f32,
    ) -> Result<Vec<ChunkSearchResult>, ApiError> {
        let embeddings = self.llm.embed(&[query.to_string()], &self.embed_model).await?;
        let query_embedding = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Internal("embedder returned no vector".to_string()))?;

        self.store
            .search(&self.namespace, &query_embedding, k, score_threshold)
            .await
    }
}

#[derive(Default)]
struct RegistryInner {
    handles: HashMap<String, Arc<StoreHandle>>,
    /// Insertion order, oldest first; eviction pops from the front.
    order: VecDeque<String>,
}

/// Process-wide cache of per-session store handles.
pub struct StoreRegistry {
    backend: Option<Arc<dyn VectorStore>>,
    llm: Arc<dyn LlmProvider>,
    embed_model: String,
    capacity: usize,
    inner: Mutex<RegistryInner>,
}

impl StoreRegistry {
    pub fn new(
        backend: Option<Arc<dyn VectorStore>>,
        llm: Arc<dyn LlmProvider>,
        embed_model: String,
        capacity: usize,
    ) -> Self {
        Self {
            backend,
            llm,
            embed_model,
            capacity,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Returns the cached handle for a session, creating one scoped to the
    /// session id as namespace when absent. `None` means the vector backend
    /// is unavailable; the relevance gate treats that as "no documents",
    /// not as an error.
    pub fn get_or_create(&self, session_id: &str) -> Option<Arc<StoreHandle>> {
        let backend = match &self.backend {
            Some(backend) => backend.clone(),
            None => return None,
        };

        let mut inner = self.inner.lock().expect("registry mutex poisoned");

        if let Some(handle) = inner.handles.get(session_id) {
            return Some(handle.clone());
        }

        let handle = Arc::new(StoreHandle {
            namespace: session_id.to_string(),
            store: backend,
            llm: self.llm.clone(),
            embed_model: self.embed_model.clone(),
        });

        inner.handles.insert(session_id.to_string(), handle.clone());
        inner.order.push_back(session_id.to_string());
        Self::evict_over_capacity(&mut inner, self.capacity);

        Some(handle)
    }

    /// Drop oldest-inserted handles until the cache is at or under
    /// `max_entries`. Bounds in-process namespace bookkeeping; the backend's
    /// persisted vectors are untouched.
    pub fn evict_if_over_capacity(&self, max_entries: usize) {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        Self::evict_over_capacity(&mut inner, max_entries);
    }

    fn evict_over_capacity(inner: &mut RegistryInner, max_entries: usize) {
        while inner.handles.len() > max_entries {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.handles.remove(&oldest);
                    tracing::debug!("Evicted cached store handle for session {}", oldest);
                }
                None => break,
            }
        }
    }

    /// Remove the cached handle for a deleted session.
    pub fn release(&self, session_id: &str) {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        inner.handles.remove(session_id);
        inner.order.retain(|id| id != session_id);
    }

    pub fn cached_handles(&self) -> usize {
        self.inner.lock().expect("registry mutex poisoned").handles.len()
    }

    pub fn backend_available(&self) -> bool {
        self.backend.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::llm::ChatRequest;

    struct NullLlm;

    #[async_trait]
    impl LlmProvider for NullLlm {
        fn name(&self) -> &str {
            "null"
        }

        async fn health_check(&self) -> Result<bool, ApiError> {
            Ok(true)
        }

        async fn chat(&self, _request: ChatRequest, _model_id: &str) -> Result<String, ApiError> {
            Ok(String::new())
        }

        async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
            Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct NullStore;

    #[async_trait]
    impl VectorStore for NullStore {
        async fn upsert(&self, _items: Vec<(StoredChunk, Vec<f32>)>) -> Result<(), ApiError> {
            Ok(())
        }

        async fn search(
            &self,
            _namespace: &str,
            _query_embedding: &[f32],
            _limit: usize,
            _score_threshold: f32,
        ) -> Result<Vec<ChunkSearchResult>, ApiError> {
            Ok(Vec::new())
        }

        async fn count(&self, _namespace: Option<&str>) -> Result<usize, ApiError> {
            Ok(0)
        }

        async fn delete_namespace(&self, _namespace: &str) -> Result<usize, ApiError> {
            Ok(0)
        }
    }

    fn registry(capacity: usize) -> StoreRegistry {
        StoreRegistry::new(
            Some(Arc::new(NullStore)),
            Arc::new(NullLlm),
            "embed".to_string(),
            capacity,
        )
    }

    #[test]
    fn same_session_returns_same_handle() {
        let registry = registry(10);
        let a = registry.get_or_create("s1").unwrap();
        let b = registry.get_or_create("s1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.cached_handles(), 1);
    }

    #[test]
    fn different_sessions_get_distinct_namespaces() {
        let registry = registry(10);
        let a = registry.get_or_create("s1").unwrap();
        let b = registry.get_or_create("s2").unwrap();
        assert_ne!(a.namespace(), b.namespace());
    }

    #[test]
    fn no_backend_degrades_to_none() {
        let registry = StoreRegistry::new(None, Arc::new(NullLlm), "embed".to_string(), 10);
        assert!(registry.get_or_create("s1").is_none());
        assert!(!registry.backend_available());
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let registry = registry(2);
        let a1 = registry.get_or_create("a").unwrap();
        registry.get_or_create("b").unwrap();
        registry.get_or_create("c").unwrap();

        assert_eq!(registry.cached_handles(), 2);

        // "a" was evicted; a fresh get reconstructs an equivalent but
        // distinct in-process handle with the same namespace.
        let a2 = registry.get_or_create("a").unwrap();
        assert_eq!(a2.namespace(), "a");
        assert!(!Arc::ptr_eq(&a1, &a2));
    }

    #[test]
    fn release_drops_only_that_session() {
        let registry = registry(10);
        let before = registry.get_or_create("s1").unwrap();
        registry.get_or_create("s2").unwrap();

        registry.release("s1");
        assert_eq!(registry.cached_handles(), 1);

        // Release clears the cache only; the namespace can be reused.
        let after = registry.get_or_create("s1").unwrap();
        assert_eq!(after.namespace(), "s1");
        assert!(!Arc::ptr_eq(&before, &after));
    }
}
