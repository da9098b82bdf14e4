use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::security::require_api_key;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub content: String,
    /// Omitted on the first message; the service creates a session then.
    pub session_id: Option<String>,
    #[serde(default)]
    pub force_web_search: bool,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ChatRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    if payload.content.trim().is_empty() {
        return Err(ApiError::BadRequest("message content is required".to_string()));
    }

    // A missing session id starts a new conversation. An explicit but
    // unknown id (stale or deleted) is the caller's error, not an implicit
    // create.
    let session_id = match payload.session_id {
        Some(id) => id,
        None => state.service.create_session(None).await?.id,
    };

    let outcome = state
        .service
        .ask(&session_id, &payload.content, payload.force_web_search)
        .await?;

    Ok(Json(json!({
        "content": outcome.answer,
        "sources": outcome.sources,
        "session_id": outcome.session_id,
        "saved": outcome.saved,
        "info": outcome.info
    })))
}
