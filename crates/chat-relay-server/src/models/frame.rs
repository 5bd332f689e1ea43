use serde::{Deserialize, Serialize};

/// Outbound WebSocket frame. One turn is `start`, zero or more `chunk`, `end`;
/// `error` replaces the tail of a turn and is always followed by a close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    Start,
    Chunk { content: String },
    End,
    Error { error: String },
}

impl StreamFrame {
    pub fn chunk(content: impl Into<String>) -> Self {
        Self::Chunk { content: content.into() }
    }

    pub fn error(error: impl ToString) -> Self {
        Self::Error { error: error.to_string() }
    }

    pub fn to_json(&self) -> String {
        // Only string fields, serialization cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"error","error":"frame encoding failed"}"#.to_string())
    }
}
