//! Session-facing application service.
//!
//! Serializes turns per session, keeps ingestion idempotent by source
//! name, and degrades persistence failures after generation into a
//! `saved: false` flag instead of losing the generated answer.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::core::errors::ApiError;
use crate::ingest::{self, ChunkingConfig, SourceKind};
use crate::orchestrator::{Orchestrator, SourceDescriptor};
use crate::registry::StoreRegistry;

use super::store::{MessageRecord, SessionRecord, SessionStore, SessionSummary};

/// Title given to sessions until the first turn derives a real one.
pub const PLACEHOLDER_TITLE: &str = "Untitled Session";

/// Result of one chat turn, shaped for the HTTP response.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub session_id: String,
    pub answer: String,
    pub sources: Vec<SourceDescriptor>,
    /// False when the answer was generated but could not be persisted.
    pub saved: bool,
    pub info: Option<String>,
}

pub struct SessionService {
    store: SessionStore,
    registry: Arc<StoreRegistry>,
    orchestrator: Orchestrator,
    chunking: ChunkingConfig,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionService {
    pub fn new(
        store: SessionStore,
        registry: Arc<StoreRegistry>,
        orchestrator: Orchestrator,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            store,
            registry,
            orchestrator,
            chunking,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Lock for serializing a session's read-mutate-persist sequence.
    /// Callers must have verified the session exists first; unknown ids
    /// must not grow the lock map (entries are only pruned on deletion).
    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn create_session(&self, title: Option<String>) -> Result<SessionRecord, ApiError> {
        self.store.create_session(title).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ApiError> {
        self.store.list_sessions().await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<SessionRecord, ApiError> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("session {}", session_id)))
    }

    pub async fn get_history(&self, session_id: &str) -> Result<Vec<MessageRecord>, ApiError> {
        self.get_session(session_id).await?;
        self.store.get_history(session_id).await
    }

    pub async fn rename_session(&self, session_id: &str, title: &str) -> Result<(), ApiError> {
        self.store.update_session_title(session_id, title).await
    }

    pub async fn set_web_search(&self, session_id: &str, enabled: bool) -> Result<(), ApiError> {
        self.store.set_web_search_enabled(session_id, enabled).await
    }

    /// Delete a session: drop the cached store handle, then the row.
    /// Deleting an unknown session is a NotFound, and a deleted id stays
    /// invalid until explicitly recreated.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), ApiError> {
        self.registry.release(session_id);
        self.locks.lock().await.remove(session_id);

        if !self.store.delete_session(session_id).await? {
            return Err(ApiError::NotFound(format!("session {}", session_id)));
        }
        Ok(())
    }

    /// Ingest pre-extracted text into a session's document store.
    ///
    /// Idempotent by source name: re-submitting an already processed source
    /// is a no-op that leaves the source list unchanged. Returns the full
    /// processed source list.
    pub async fn ingest_document(
        &self,
        session_id: &str,
        source_name: &str,
        text: &str,
        kind: SourceKind,
    ) -> Result<Vec<String>, ApiError> {
        self.get_session(session_id).await?;
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        // Re-read under the lock; the check above ran unguarded.
        let session = self.get_session(session_id).await?;
        if session.processed_sources.iter().any(|s| s == source_name) {
            tracing::info!("Source '{}' already processed, skipping", source_name);
            return Ok(session.processed_sources);
        }

        let chunks = ingest::chunk_text(text, source_name, kind, None, &self.chunking)?;
        self.index_and_record(session_id, source_name, &chunks, session.processed_sources)
            .await
    }

    /// Fetch a URL and ingest its text, idempotent by URL.
    pub async fn ingest_url(&self, session_id: &str, url: &str) -> Result<Vec<String>, ApiError> {
        self.get_session(session_id).await?;
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let session = self.get_session(session_id).await?;
        if session.processed_sources.iter().any(|s| s == url) {
            tracing::info!("URL '{}' already processed, skipping", url);
            return Ok(session.processed_sources);
        }

        let chunks = ingest::fetch_url_chunks(url, &self.chunking).await?;
        self.index_and_record(session_id, url, &chunks, session.processed_sources)
            .await
    }

    async fn index_and_record(
        &self,
        session_id: &str,
        source_name: &str,
        chunks: &[ingest::DocumentChunk],
        mut processed: Vec<String>,
    ) -> Result<Vec<String>, ApiError> {
        let handle = self
            .registry
            .get_or_create(session_id)
            .ok_or(ApiError::ServiceUnavailable)?;

        handle.index_chunks(chunks).await?;

        processed.push(source_name.to_string());
        self.store.record_ingest(session_id, &processed).await?;

        tracing::info!(
            "Ingested {} chunks from '{}' into session {}",
            chunks.len(),
            source_name,
            session_id
        );
        Ok(processed)
    }

    /// Run one chat turn against an existing session.
    ///
    /// The user message is persisted before generation. Failures after a
    /// successful generation are reported via `saved: false` rather than
    /// discarding the answer.
    pub async fn ask(
        &self,
        session_id: &str,
        user_text: &str,
        force_web_search: bool,
    ) -> Result<ChatOutcome, ApiError> {
        self.get_session(session_id).await?;
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let session = self.get_session(session_id).await?;
        self.store.add_message(session_id, "user", user_text).await?;

        let mut info_messages = Vec::new();

        // URLs pasted into the message are ingested before retrieval so the
        // turn can draw on them. A failed fetch degrades with a notice.
        for url in ingest::detect_urls(user_text) {
            match self.ingest_inline_url(session_id, &url).await {
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!("Inline URL ingestion failed for {}: {}", url, err);
                    info_messages.push(format!("Could not process URL: {}", url));
                }
            }
        }

        let outcome = self
            .orchestrator
            .run_turn(session_id, user_text, force_web_search, session.use_web_search)
            .await?;

        if let Some(notice) = &outcome.info {
            info_messages.push(notice.clone());
        }

        let mut saved = true;
        if let Err(err) = self
            .store
            .add_message(session_id, "assistant", &outcome.answer)
            .await
        {
            tracing::warn!("Failed to persist assistant message: {}", err);
            saved = false;
        }

        if saved && session.title == PLACEHOLDER_TITLE {
            if let Some(title) = crate::orchestrator::rewrite::derive_title(
                self.orchestrator.llm().as_ref(),
                self.orchestrator.chat_model(),
                user_text,
            )
            .await
            {
                if let Err(err) = self.store.update_session_title(session_id, &title).await {
                    tracing::warn!("Failed to update session title: {}", err);
                }
            }
        }

        let web_sources: Vec<SourceDescriptor> = outcome
            .sources
            .iter()
            .filter(|s| s.kind == "web" && s.excerpt.is_empty())
            .cloned()
            .collect();

        if let Err(err) = self
            .store
            .record_turn_snapshots(
                session_id,
                user_text,
                &outcome.rewritten_query,
                &web_sources,
                &outcome.doc_sources,
                &info_messages,
            )
            .await
        {
            tracing::warn!("Failed to persist turn snapshots: {}", err);
            saved = false;
        }

        let info = if info_messages.is_empty() {
            None
        } else {
            Some(info_messages.join(" "))
        };

        Ok(ChatOutcome {
            session_id: session_id.to_string(),
            answer: outcome.answer,
            sources: outcome.sources,
            saved,
            info,
        })
    }

    /// URL ingestion used mid-turn; skips the session lock the caller
    /// already holds.
    async fn ingest_inline_url(&self, session_id: &str, url: &str) -> Result<(), ApiError> {
        let session = self.get_session(session_id).await?;
        if session.processed_sources.iter().any(|s| s == url) {
            return Ok(());
        }

        let chunks = ingest::fetch_url_chunks(url, &self.chunking).await?;
        self.index_and_record(session_id, url, &chunks, session.processed_sources)
            .await?;
        Ok(())
    }
}
