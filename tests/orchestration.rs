//! End-to-end tests of the session service with deterministic fakes for
//! the model and web search collaborators. Only the vector store and the
//! session store are real (temp-file SQLite).

use std::sync::Arc;

use async_trait::async_trait;

use studyhall_backend::core::errors::ApiError;
use studyhall_backend::ingest::{ChunkingConfig, SourceKind};
use studyhall_backend::llm::{ChatRequest, LlmProvider};
use studyhall_backend::orchestrator::Orchestrator;
use studyhall_backend::registry::StoreRegistry;
use studyhall_backend::session::{SessionService, SessionStore, PLACEHOLDER_TITLE};
use studyhall_backend::vector::{SqliteVectorStore, VectorStore};
use studyhall_backend::websearch::{SearchHit, WebSearcher};

const KEYWORDS: [&str; 4] = ["rust", "crab", "paris", "cooking"];
const CANNED_ANSWER: &str = "Here is the generated answer.";

/// Deterministic model: embeddings count keyword occurrences, chat calls
/// are dispatched on the system prompt.
struct FakeLlm {
    requires_search: bool,
}

#[async_trait]
impl LlmProvider for FakeLlm {
    fn name(&self) -> &str {
        "fake"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        Ok(true)
    }

    async fn chat(&self, request: ChatRequest, _model_id: &str) -> Result<String, ApiError> {
        let system = request
            .messages
            .iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .unwrap_or("");
        let user = request
            .messages
            .iter()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
            .unwrap_or_default();

        if system.contains("Rewrite the user's question") {
            return Ok(user);
        }
        if system.contains("query analyzer") {
            return Ok(format!(
                "{{\"requires_search\": {}}}",
                self.requires_search
            ));
        }
        if system.contains("short title") {
            return Ok("Fake Derived Title".to_string());
        }

        Ok(CANNED_ANSWER.to_string())
    }

    async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        Ok(inputs
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                KEYWORDS
                    .iter()
                    .map(|kw| lower.matches(kw).count() as f32)
                    .collect()
            })
            .collect())
    }
}

struct FixedSearcher(Vec<SearchHit>);

#[async_trait]
impl WebSearcher for FixedSearcher {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, ApiError> {
        Ok(self.0.clone())
    }
}

fn web_hit(url: &str) -> SearchHit {
    SearchHit {
        title: "Result".to_string(),
        url: url.to_string(),
        snippet: "Fresh information from the web.".to_string(),
    }
}

/// Model whose chat endpoint is down; embeddings still work.
struct FailingChatLlm;

#[async_trait]
impl LlmProvider for FailingChatLlm {
    fn name(&self) -> &str {
        "failing-chat"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        Ok(false)
    }

    async fn chat(&self, _request: ChatRequest, _model_id: &str) -> Result<String, ApiError> {
        Err(ApiError::Generation("model offline".to_string()))
    }

    async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        Ok(inputs.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect())
    }
}

/// Model that deletes the target session row out from under the service
/// while generating the answer, via a second store handle on the same
/// database file. Rewrite, intent, and title calls behave like `FakeLlm`.
struct VanishingStoreLlm {
    store: SessionStore,
    target: std::sync::Mutex<Option<String>>,
}

impl VanishingStoreLlm {
    fn arm(&self, session_id: &str) {
        *self.target.lock().unwrap() = Some(session_id.to_string());
    }
}

#[async_trait]
impl LlmProvider for VanishingStoreLlm {
    fn name(&self) -> &str {
        "vanishing-store"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        Ok(true)
    }

    async fn chat(&self, request: ChatRequest, _model_id: &str) -> Result<String, ApiError> {
        let system = request
            .messages
            .iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .unwrap_or("");
        let user = request
            .messages
            .iter()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
            .unwrap_or_default();

        if system.contains("Rewrite the user's question") {
            return Ok(user);
        }
        if system.contains("query analyzer") {
            return Ok("{\"requires_search\": false}".to_string());
        }
        if system.contains("short title") {
            return Ok("Fake Derived Title".to_string());
        }

        let target = self.target.lock().unwrap().take();
        if let Some(session_id) = target {
            self.store.delete_session(&session_id).await?;
        }
        Ok(CANNED_ANSWER.to_string())
    }

    async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        Ok(inputs.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect())
    }
}

async fn build_service_with_llm(
    dir: &tempfile::TempDir,
    llm: Arc<dyn LlmProvider>,
    hits: Vec<SearchHit>,
) -> SessionService {
    let backend: Arc<dyn VectorStore> = Arc::new(
        SqliteVectorStore::new(dir.path().join("vectors.db"))
            .await
            .unwrap(),
    );

    let registry = Arc::new(StoreRegistry::new(
        Some(backend),
        llm.clone(),
        "embed".to_string(),
        100,
    ));

    let orchestrator = Orchestrator::new(
        registry.clone(),
        llm,
        Arc::new(FixedSearcher(hits)),
        "chat".to_string(),
        5,
        0.5,
    );

    let store = SessionStore::new(dir.path().join("sessions.db")).await.unwrap();
    SessionService::new(store, registry, orchestrator, ChunkingConfig::default())
}

async fn build_service(
    requires_search: bool,
    hits: Vec<SearchHit>,
) -> (SessionService, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let llm: Arc<dyn LlmProvider> = Arc::new(FakeLlm { requires_search });
    let service = build_service_with_llm(&dir, llm, hits).await;
    (service, dir)
}

#[tokio::test]
async fn ingestion_is_idempotent_by_source_name() {
    let (service, _dir) = build_service(false, Vec::new()).await;
    let session = service.create_session(None).await.unwrap();

    let text = "Rust is a systems programming language. The rust mascot is a crab.";
    let first = service
        .ingest_document(&session.id, "notes.txt", text, SourceKind::Document)
        .await
        .unwrap();
    assert_eq!(first, vec!["notes.txt"]);

    let second = service
        .ingest_document(&session.id, "notes.txt", text, SourceKind::Document)
        .await
        .unwrap();
    assert_eq!(second, vec!["notes.txt"]);
}

#[tokio::test]
async fn empty_document_fails_without_touching_session() {
    let (service, _dir) = build_service(false, Vec::new()).await;
    let session = service.create_session(None).await.unwrap();

    let err = service
        .ingest_document(&session.id, "blank.pdf", "   ", SourceKind::Document)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Extraction(_)));

    let fetched = service.get_session(&session.id).await.unwrap();
    assert!(fetched.processed_sources.is_empty());
}

#[tokio::test]
async fn relevant_documents_answer_without_web_search() {
    let (service, _dir) = build_service(false, vec![web_hit("https://example.com")]).await;
    let session = service.create_session(None).await.unwrap();

    service
        .ingest_document(
            &session.id,
            "rust.md",
            "Rust ownership rules. The rust borrow checker enforces them.",
            SourceKind::Document,
        )
        .await
        .unwrap();

    let outcome = service
        .ask(&session.id, "Explain rust ownership", false)
        .await
        .unwrap();

    assert_eq!(outcome.answer, CANNED_ANSWER);
    assert!(outcome.saved);
    assert!(outcome.info.is_none());
    assert!(!outcome.sources.is_empty());
    assert!(outcome.sources.iter().all(|s| s.kind == "document"));
}

#[tokio::test]
async fn web_intent_supplies_sources_when_documents_are_empty() {
    let (service, _dir) = build_service(true, vec![web_hit("https://news.example")]).await;
    let session = service.create_session(None).await.unwrap();

    let outcome = service
        .ask(&session.id, "What happened in paris today", false)
        .await
        .unwrap();

    assert_eq!(outcome.answer, CANNED_ANSWER);
    assert!(outcome.info.is_none());
    assert_eq!(outcome.sources.len(), 1);
    assert_eq!(outcome.sources[0].kind, "web");
    assert_eq!(outcome.sources[0].url.as_deref(), Some("https://news.example"));
}

#[tokio::test]
async fn both_channels_combine_additively() {
    let (service, _dir) = build_service(true, vec![web_hit("https://crab.example")]).await;
    let session = service.create_session(None).await.unwrap();

    service
        .ingest_document(
            &session.id,
            "crabs.txt",
            "Crab biology notes. A crab has ten legs.",
            SourceKind::Document,
        )
        .await
        .unwrap();

    let outcome = service
        .ask(&session.id, "Tell me about crab anatomy", false)
        .await
        .unwrap();

    let kinds: Vec<&str> = outcome.sources.iter().map(|s| s.kind.as_str()).collect();
    assert!(kinds.contains(&"document"));
    assert!(kinds.contains(&"web"));
    // Documents always precede web sources.
    let last_doc = kinds.iter().rposition(|k| *k == "document").unwrap();
    let first_web = kinds.iter().position(|k| *k == "web").unwrap();
    assert!(last_doc < first_web);
}

#[tokio::test]
async fn disabled_web_search_is_respected_unless_forced() {
    let (service, _dir) = build_service(true, vec![web_hit("https://blocked.example")]).await;
    let session = service.create_session(None).await.unwrap();
    service.set_web_search(&session.id, false).await.unwrap();

    let quiet = service
        .ask(&session.id, "What happened in paris today", false)
        .await
        .unwrap();
    assert!(quiet.sources.iter().all(|s| s.kind != "web"));

    let forced = service
        .ask(&session.id, "What happened in paris today", true)
        .await
        .unwrap();
    assert!(forced.sources.iter().any(|s| s.kind == "web"));
}

#[tokio::test]
async fn no_evidence_turn_carries_a_notice() {
    let (service, _dir) = build_service(false, Vec::new()).await;
    let session = service.create_session(None).await.unwrap();

    let outcome = service
        .ask(&session.id, "Something entirely unrelated", false)
        .await
        .unwrap();

    assert_eq!(outcome.answer, CANNED_ANSWER);
    let info = outcome.info.unwrap();
    assert!(info.contains("No relevant information"));
}

#[tokio::test]
async fn first_turn_replaces_placeholder_title() {
    let (service, _dir) = build_service(false, Vec::new()).await;
    let session = service.create_session(None).await.unwrap();
    assert_eq!(session.title, PLACEHOLDER_TITLE);

    service.ask(&session.id, "Hello there", false).await.unwrap();

    let fetched = service.get_session(&session.id).await.unwrap();
    assert_eq!(fetched.title, "Fake Derived Title");
}

#[tokio::test]
async fn turn_records_history_and_snapshots() {
    let (service, _dir) = build_service(false, Vec::new()).await;
    let session = service.create_session(None).await.unwrap();

    service
        .ingest_document(
            &session.id,
            "rust.md",
            "Rust notes about rust lifetimes.",
            SourceKind::Document,
        )
        .await
        .unwrap();
    service
        .ask(&session.id, "Summarize my rust notes", false)
        .await
        .unwrap();

    let history = service.get_history(&session.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, "user");
    assert_eq!(history[1].role, "assistant");
    assert_eq!(history[1].content, CANNED_ANSWER);

    let fetched = service.get_session(&session.id).await.unwrap();
    let rewritten = fetched.rewritten_query.unwrap();
    assert_eq!(rewritten.original, "Summarize my rust notes");
    assert!(!fetched.doc_sources.is_empty());
    assert!(fetched.search_sources.is_empty());
}

#[tokio::test]
async fn deleted_sessions_reject_further_turns() {
    let (service, _dir) = build_service(false, Vec::new()).await;
    let session = service.create_session(None).await.unwrap();

    service.delete_session(&session.id).await.unwrap();

    let err = service.ask(&session.id, "still there?", false).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let again = service.delete_session(&session.id).await.unwrap_err();
    assert!(matches!(again, ApiError::NotFound(_)));
}

#[tokio::test]
async fn sessions_do_not_see_each_others_documents() {
    let (service, _dir) = build_service(false, Vec::new()).await;
    let with_docs = service.create_session(None).await.unwrap();
    let without_docs = service.create_session(None).await.unwrap();

    service
        .ingest_document(
            &with_docs.id,
            "cooking.txt",
            "Cooking techniques. Cooking pasta requires salted water.",
            SourceKind::Document,
        )
        .await
        .unwrap();

    let outcome = service
        .ask(&without_docs.id, "How do I start cooking pasta", false)
        .await
        .unwrap();

    // The other session's documents must not leak into this one.
    assert!(outcome.sources.is_empty());
    assert!(outcome.info.is_some());
}

#[tokio::test]
async fn generation_failure_fails_turn_but_keeps_user_message() {
    let dir = tempfile::tempdir().unwrap();
    let llm: Arc<dyn LlmProvider> = Arc::new(FailingChatLlm);
    let service = build_service_with_llm(&dir, llm, Vec::new()).await;

    let session = service.create_session(None).await.unwrap();
    let err = service
        .ask(&session.id, "Explain rust ownership", false)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Generation(_)));

    // The user message appended before generation survives the failure.
    let history = service.get_history(&session.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, "user");
    assert_eq!(history[0].content, "Explain rust ownership");

    let fetched = service.get_session(&session.id).await.unwrap();
    assert_eq!(fetched.title, PLACEHOLDER_TITLE);
}

#[tokio::test]
async fn persistence_failure_after_generation_returns_unsaved_answer() {
    let dir = tempfile::tempdir().unwrap();
    let side_store = SessionStore::new(dir.path().join("sessions.db"))
        .await
        .unwrap();
    let llm = Arc::new(VanishingStoreLlm {
        store: side_store,
        target: std::sync::Mutex::new(None),
    });
    let service = build_service_with_llm(&dir, llm.clone(), Vec::new()).await;

    let session = service.create_session(None).await.unwrap();
    llm.arm(&session.id);

    let outcome = service.ask(&session.id, "Hello there", false).await.unwrap();
    assert_eq!(outcome.answer, CANNED_ANSWER);
    assert!(!outcome.saved);

    let err = service.get_session(&session.id).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}
