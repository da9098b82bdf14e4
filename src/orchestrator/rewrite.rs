//! Query rewriting and session title derivation.
//!
//! Both are best-effort model calls; failures fall back to unrewritten
//! input or no title rather than aborting the turn.

use crate::llm::{ChatMessage, ChatRequest, LlmProvider};

const REWRITE_PROMPT: &str = "Rewrite the user's question into a standalone, specific search \
query. Keep the original language and meaning. Respond with the rewritten query only, \
no explanation.";

const TITLE_PROMPT: &str = "Create a short title (at most 6 words) summarizing this \
conversation opener. Respond with the title only, no quotes or punctuation around it.";

/// Rewrite a query for retrieval and search. Falls back to the original
/// query when the model fails or returns nothing usable.
pub async fn rewrite_query(llm: &dyn LlmProvider, model: &str, query: &str) -> String {
    let request = ChatRequest::new(vec![
        ChatMessage::system(REWRITE_PROMPT),
        ChatMessage::user(query),
    ])
    .with_temperature(0.0);

    match llm.chat(request, model).await {
        Ok(rewritten) => {
            let rewritten = rewritten.trim();
            if rewritten.is_empty() {
                query.to_string()
            } else {
                rewritten.to_string()
            }
        }
        Err(err) => {
            tracing::warn!("Query rewriting failed, using original: {}", err);
            query.to_string()
        }
    }
}

/// Derive a session title from the first user message. Best-effort.
pub async fn derive_title(llm: &dyn LlmProvider, model: &str, first_message: &str) -> Option<String> {
    let request = ChatRequest::new(vec![
        ChatMessage::system(TITLE_PROMPT),
        ChatMessage::user(first_message),
    ])
    .with_temperature(0.3);

    let raw = match llm.chat(request, model).await {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!("Title generation failed: {}", err);
            return None;
        }
    };

    let title = raw
        .trim()
        .trim_matches(['"', '\''])
        .split_whitespace()
        .take(6)
        .collect::<Vec<_>>()
        .join(" ");

    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}
