//! Search-intent detection.
//!
//! Asks the model whether a query needs current external information.
//! Fails closed: any model or parse failure means "no search intent".

use serde_json::Value;

use crate::llm::{ChatMessage, ChatRequest, LlmProvider};

const INTENT_PROMPT: &str = "You are a query analyzer. Decide whether answering the user's \
question requires searching the web for current or external information \
(news, prices, weather, recent events, facts likely to have changed). \
Respond with JSON only: {\"requires_search\": true} or {\"requires_search\": false}.";

pub async fn needs_external_search(llm: &dyn LlmProvider, model: &str, query: &str) -> bool {
    let request = ChatRequest::new(vec![
        ChatMessage::system(INTENT_PROMPT),
        ChatMessage::user(query),
    ])
    .with_temperature(0.0);

    let raw = match llm.chat(request, model).await {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!("Search intent detection failed: {}", err);
            return false;
        }
    };

    parse_intent(&raw).unwrap_or(false)
}

fn parse_intent(raw: &str) -> Option<bool> {
    let cleaned = strip_code_fences(raw);
    let value: Value = serde_json::from_str(cleaned.trim()).ok()?;
    value.get("requires_search").and_then(|v| v.as_bool())
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    body.strip_suffix("```").unwrap_or(body)
}
