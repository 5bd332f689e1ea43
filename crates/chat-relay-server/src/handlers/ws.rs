use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::models::StreamFrame;
use crate::services::relay::{ClientChannel, Inbound};
use crate::services::{supervise, SessionManager};
use crate::utils::error::ApiError;

/// `GET /ws/chat/{client_id}`
pub async fn chat_ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(sessions): State<Arc<SessionManager>>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        supervise(WsChannel::new(socket), sessions, client_id).await;
    })
}

/// Upgraded axum socket behind the relay's channel seam.
pub struct WsChannel {
    socket: WebSocket,
}

impl WsChannel {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl ClientChannel for WsChannel {
    async fn recv(&mut self) -> Result<Inbound, ApiError> {
        loop {
            let message = match self.socket.recv().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(ApiError::Transport(e.to_string())),
                None => return Ok(Inbound::Closed),
            };

            match message {
                Message::Text(text) => return Ok(Inbound::Text(text.as_str().to_owned())),
                Message::Binary(_) => return Ok(Inbound::Binary),
                Message::Close(frame) => {
                    debug!("Close frame received: {:?}", frame);
                    return Ok(Inbound::Closed);
                }
                // axum answers pings itself
                Message::Ping(_) | Message::Pong(_) => continue,
            }
        }
    }

    async fn send(&mut self, frame: StreamFrame) -> Result<(), ApiError> {
        self.socket
            .send(Message::Text(frame.to_json().into()))
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.socket.send(Message::Close(None)).await {
            debug!("Close frame not delivered: {}", e);
        }
    }
}
