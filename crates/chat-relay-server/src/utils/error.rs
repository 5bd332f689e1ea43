use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    /// No upstream client, or no reference document could be uploaded.
    #[error("Chat unavailable: {0}")]
    Unavailable(String),

    /// The priming turn of a fresh session failed.
    #[error("Session init error: {0}")]
    SessionInit(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::NotFound(msg) => {
                tracing::warn!("Not found: {}", msg);
                (StatusCode::NOT_FOUND, "NotFound", msg)
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, "BadRequest", msg)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
            }
            ApiError::Unavailable(msg) => {
                tracing::warn!("Chat unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Unavailable", msg)
            }
            ApiError::SessionInit(msg) => {
                tracing::error!("Session init error: {}", msg);
                (StatusCode::BAD_GATEWAY, "SessionInitError", msg)
            }
            ApiError::Upload(msg) => {
                tracing::error!("Upload error: {}", msg);
                (StatusCode::BAD_GATEWAY, "UploadError", msg)
            }
            ApiError::LlmError(msg) => {
                tracing::error!("LLM error: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "LlmError", msg)
            }
            ApiError::Transport(msg) => {
                tracing::error!("Transport error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "TransportError", msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}
