use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::services::SessionManager;
use crate::utils::error::ApiError;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// `DELETE /api/sessions/{client_id}`: forget the client's chat history.
pub async fn delete_session_handler(
    Path(client_id): Path<String>,
    State(sessions): State<Arc<SessionManager>>,
) -> Result<Json<MessageResponse>, ApiError> {
    info!("Session delete requested for {}", client_id);

    if sessions.delete(&client_id) {
        Ok(Json(MessageResponse {
            message: format!("Chat history for client {} has been cleared", client_id),
        }))
    } else {
        Err(ApiError::NotFound(format!("No chat session found for client {}", client_id)))
    }
}
