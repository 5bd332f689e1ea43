use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct StatusResponse {
    status: String,
    message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    ready: bool,
    upstream: String,
    reference_documents: usize,
    active_sessions: usize,
    started_at: DateTime<Utc>,
}

pub async fn root() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
        message: "Maya translation chat relay is running".to_string(),
    })
}

pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// 503 while chat cannot serve a first message.
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let upstream = state.sessions.upstream();
    let ready = upstream.is_ready();
    let upstream_state = if upstream.is_connected() { "connected" } else { "disconnected" };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            upstream: upstream_state.to_string(),
            reference_documents: upstream.handles().len(),
            active_sessions: state.sessions.store().len(),
            started_at: state.started_at,
        }),
    )
}
