use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::ingest::SourceKind;
use crate::security::require_api_key;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IngestDocumentRequest {
    /// Display name of the source (file name).
    pub name: String,
    /// Pre-extracted text content.
    pub content: String,
    #[serde(default)]
    pub kind: Option<SourceKind>,
}

#[derive(Debug, Deserialize)]
pub struct IngestUrlRequest {
    pub url: String,
}

pub async fn ingest_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
    Json(payload): Json<IngestDocumentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    if payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("source name is required".to_string()));
    }

    let kind = payload.kind.unwrap_or(SourceKind::Document);
    let sources = state
        .service
        .ingest_document(&session_id, &payload.name, &payload.content, kind)
        .await?;

    Ok(Json(json!({"processed_sources": sources})))
}

pub async fn ingest_url(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
    Json(payload): Json<IngestUrlRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;

    if !payload.url.starts_with("http://") && !payload.url.starts_with("https://") {
        return Err(ApiError::BadRequest("url must be http(s)".to_string()));
    }

    let sources = state.service.ingest_url(&session_id, &payload.url).await?;
    Ok(Json(json!({"processed_sources": sources})))
}

pub async fn get_sources(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.session_token)?;
    let session = state.service.get_session(&session_id).await?;
    Ok(Json(json!({
        "processed_sources": session.processed_sources,
        "doc_sources": session.doc_sources,
        "search_sources": session.search_sources
    })))
}
