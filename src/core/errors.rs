use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Error taxonomy for the orchestration core.
///
/// Collaborator failures that degrade (vector backend down, classifier or web
/// search errors) are handled at their call sites and never surface as
/// variants here; what remains is what a caller genuinely has to see.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Ingestion derived no text from the input. Fatal to that single
    /// ingestion call only; session state is untouched.
    #[error("no text could be extracted: {0}")]
    Extraction(String),
    /// The answer model failed; the turn fails but the user message already
    /// appended to history remains.
    #[error("generation failed: {0}")]
    Generation(String),
    /// The durable session store rejected a write.
    #[error("persistence failed: {0}")]
    Persistence(String),
    #[error("service unavailable")]
    ServiceUnavailable,
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn persistence<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Persistence(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Extraction(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            ApiError::Generation(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ApiError::Persistence(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            ApiError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service unavailable".to_string(),
            ),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
