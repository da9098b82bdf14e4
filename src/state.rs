//! Shared application state and startup wiring.

use std::sync::Arc;

use crate::config::{AppPaths, Settings};
use crate::core::errors::ApiError;
use crate::llm::{LlmProvider, OpenAiCompatProvider};
use crate::orchestrator::Orchestrator;
use crate::registry::StoreRegistry;
use crate::security::{init_session_token, SessionToken};
use crate::session::{SessionService, SessionStore};
use crate::vector::{SqliteVectorStore, VectorStore};
use crate::websearch::HttpSearcher;

pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub settings: Settings,
    pub session_token: SessionToken,
    pub service: SessionService,
    pub registry: Arc<StoreRegistry>,
    pub llm: Arc<dyn LlmProvider>,
}

impl AppState {
    /// Wire every collaborator. Takes pre-built paths so the caller can
    /// bring up logging first; startup warnings here must reach a
    /// subscriber. The vector backend is optional at startup; when it fails
    /// to open the service runs with retrieval degraded to "no documents"
    /// instead of refusing to start.
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, ApiError> {
        let settings = Settings::load(&paths);
        let session_token = init_session_token();

        let vector_backend: Option<Arc<dyn VectorStore>> =
            match SqliteVectorStore::new(paths.vectors_db_path.clone()).await {
                Ok(store) => Some(Arc::new(store)),
                Err(err) => {
                    tracing::warn!(
                        "Vector store unavailable, document retrieval disabled: {}",
                        err
                    );
                    None
                }
            };

        let llm: Arc<dyn LlmProvider> =
            Arc::new(OpenAiCompatProvider::new(settings.llm.base_url.clone()));

        let registry = Arc::new(StoreRegistry::new(
            vector_backend,
            llm.clone(),
            settings.llm.embed_model.clone(),
            settings.retrieval.registry_capacity,
        ));

        let searcher = Arc::new(HttpSearcher::new(settings.search.clone()));

        let orchestrator = Orchestrator::new(
            registry.clone(),
            llm.clone(),
            searcher,
            settings.llm.chat_model.clone(),
            settings.retrieval.top_k,
            settings.retrieval.similarity_threshold,
        );

        let store = SessionStore::new(paths.db_path.clone()).await?;
        let service = SessionService::new(
            store,
            registry.clone(),
            orchestrator,
            settings.chunking.clone(),
        );

        Ok(Arc::new(AppState {
            paths,
            settings,
            session_token,
            service,
            registry,
            llm,
        }))
    }
}
