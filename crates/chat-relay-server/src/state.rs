use axum::extract::FromRef;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::services::SessionManager;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self {
            sessions,
            started_at: Utc::now(),
        }
    }
}

impl FromRef<AppState> for Arc<SessionManager> {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}
