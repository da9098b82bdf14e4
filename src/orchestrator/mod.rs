//! Per-turn orchestration.
//!
//! One turn flows through rewrite, the document relevance gate, the search
//! policy, optional web search, and context assembly before the final
//! generation call. Collaborator failures degrade the evidence for the
//! turn; only a failed generation call fails the turn itself.

pub mod assemble;
pub mod intent;
pub mod policy;
pub mod retrieval;
pub mod rewrite;

use std::sync::Arc;

use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};
use crate::registry::StoreRegistry;
use crate::websearch::{search_web, WebSearcher};

pub use assemble::SourceDescriptor;
pub use retrieval::EvidenceItem;

/// Everything one turn produced, for the response and session snapshots.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub answer: String,
    /// All sources that contributed, documents first.
    pub sources: Vec<SourceDescriptor>,
    pub rewritten_query: String,
    /// Links returned by web search this turn.
    pub web_links: Vec<String>,
    /// Document-derived sources only.
    pub doc_sources: Vec<SourceDescriptor>,
    /// User-facing notice when the turn ran without any evidence.
    pub info: Option<String>,
}

pub struct Orchestrator {
    registry: Arc<StoreRegistry>,
    llm: Arc<dyn LlmProvider>,
    searcher: Arc<dyn WebSearcher>,
    chat_model: String,
    top_k: usize,
    similarity_threshold: f32,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<StoreRegistry>,
        llm: Arc<dyn LlmProvider>,
        searcher: Arc<dyn WebSearcher>,
        chat_model: String,
        top_k: usize,
        similarity_threshold: f32,
    ) -> Self {
        Self {
            registry,
            llm,
            searcher,
            chat_model,
            top_k,
            similarity_threshold,
        }
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    /// Run one question-answering turn for a session.
    pub async fn run_turn(
        &self,
        session_id: &str,
        user_text: &str,
        force_web_search: bool,
        web_search_enabled: bool,
    ) -> Result<TurnOutcome, ApiError> {
        let rewritten = rewrite::rewrite_query(self.llm.as_ref(), &self.chat_model, user_text).await;

        let handle = self.registry.get_or_create(session_id);
        let (doc_sufficient, doc_items) = retrieval::assess(
            &rewritten,
            handle.as_deref(),
            self.top_k,
            self.similarity_threshold,
        )
        .await;

        let intent_detected = if !force_web_search && web_search_enabled {
            intent::needs_external_search(self.llm.as_ref(), &self.chat_model, &rewritten).await
        } else {
            false
        };

        let (web_text, web_links) = if policy::should_search(
            force_web_search,
            doc_sufficient,
            web_search_enabled,
            intent_detected,
        ) {
            search_web(self.searcher.as_ref(), &rewritten).await
        } else {
            (String::new(), Vec::new())
        };

        let doc_sources: Vec<SourceDescriptor> = assemble::assemble(&doc_items, "", &[]).1;
        let (context, sources) = assemble::assemble(&doc_items, &web_text, &web_links);

        let info = if context.is_empty() {
            Some("No relevant information found in documents or web search.".to_string())
        } else {
            None
        };

        let prompt = build_prompt(user_text, &rewritten, &context, &web_links);
        let request = ChatRequest::new(vec![ChatMessage::user(prompt)]);
        let answer = self.llm.chat(request, &self.chat_model).await?;

        Ok(TurnOutcome {
            answer,
            sources,
            rewritten_query: rewritten,
            web_links,
            doc_sources,
            info,
        })
    }
}

fn build_prompt(original: &str, rewritten: &str, context: &str, links: &[String]) -> String {
    let mut prompt = String::new();

    if !context.is_empty() {
        prompt.push_str("Context: ");
        prompt.push_str(context);
        prompt.push_str("\n\n");
    }

    prompt.push_str("Original Question: ");
    prompt.push_str(original);
    if rewritten != original {
        prompt.push_str("\nRewritten Question: ");
        prompt.push_str(rewritten);
    }

    if !links.is_empty() {
        prompt.push_str("\n\nSource Links:\n");
        for link in links {
            prompt.push_str("- ");
            prompt.push_str(link);
            prompt.push('\n');
        }
    }

    prompt.push_str("\n\nPlease provide a comprehensive answer based on the available information.");
    prompt
}
