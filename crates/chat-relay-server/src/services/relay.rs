use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::models::StreamFrame;
use crate::services::gemini::ChatSession;
use crate::utils::error::ApiError;

/// What the client sent next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    /// A data message that is not text.
    Binary,
    /// Close frame or end of stream.
    Closed,
}

/// Bidirectional client connection as seen by the relay.
#[async_trait]
pub trait ClientChannel: Send {
    async fn recv(&mut self) -> Result<Inbound, ApiError>;

    async fn send(&mut self, frame: StreamFrame) -> Result<(), ApiError>;

    /// Release the connection. Errors are swallowed, the peer may be gone.
    async fn close(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayState {
    AwaitingMessage,
    Streaming(String),
    ClosedByClient,
    ClosedByError,
}

impl RelayState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayState::ClosedByClient | RelayState::ClosedByError)
    }
}

/// Drive one connection until it reaches a terminal state.
///
/// Every inbound text message is one turn: `start`, a `chunk` per non-empty
/// fragment, `end`. An upstream failure sends `error` and ends the
/// connection, the turn is not retried. The channel is left open for the
/// caller to close.
pub async fn run_relay<C: ClientChannel + ?Sized>(
    channel: &mut C,
    session: &dyn ChatSession,
    client_id: &str,
) -> RelayState {
    let mut state = RelayState::AwaitingMessage;

    loop {
        state = match state {
            RelayState::AwaitingMessage => await_message(channel, client_id).await,
            RelayState::Streaming(text) => stream_turn(channel, session, client_id, &text).await,
            terminal => return terminal,
        };
    }
}

async fn await_message<C: ClientChannel + ?Sized>(channel: &mut C, client_id: &str) -> RelayState {
    match channel.recv().await {
        Ok(Inbound::Text(text)) => {
            info!("Message from {}: {}", client_id, text);
            RelayState::Streaming(text)
        }
        Ok(Inbound::Closed) => {
            info!("Client disconnected: {}", client_id);
            RelayState::ClosedByClient
        }
        Ok(Inbound::Binary) => {
            warn!("Binary message from {} rejected", client_id);
            let err = ApiError::BadRequest("only text messages are supported".to_string());
            fail_turn(channel, client_id, err).await
        }
        Err(e) => {
            error!("Unexpected WebSocket error with {}: {}", client_id, e);
            RelayState::ClosedByError
        }
    }
}

async fn stream_turn<C: ClientChannel + ?Sized>(
    channel: &mut C,
    session: &dyn ChatSession,
    client_id: &str,
    text: &str,
) -> RelayState {
    if let Err(e) = channel.send(StreamFrame::Start).await {
        return transport_lost(client_id, e);
    }

    let mut fragments = match session.send_message_stream(text).await {
        Ok(stream) => stream,
        Err(e) => return fail_turn(channel, client_id, e).await,
    };

    // Diagnostics only, dropped once the turn is logged
    let mut full_response = String::new();

    while let Some(item) = fragments.next().await {
        match item {
            Ok(fragment) if fragment.is_empty() => {}
            Ok(fragment) => {
                full_response.push_str(&fragment);
                if let Err(e) = channel.send(StreamFrame::chunk(fragment)).await {
                    return transport_lost(client_id, e);
                }
            }
            Err(e) => return fail_turn(channel, client_id, e).await,
        }
    }

    if let Err(e) = channel.send(StreamFrame::End).await {
        return transport_lost(client_id, e);
    }

    info!("Full response sent to {} ({} chars)", client_id, full_response.len());
    debug!(
        "Full Gemini response for {}:\n--- BEGIN RESPONSE ---\n{}\n--- END RESPONSE ---",
        client_id, full_response
    );

    RelayState::AwaitingMessage
}

async fn fail_turn<C: ClientChannel + ?Sized>(channel: &mut C, client_id: &str, err: ApiError) -> RelayState {
    error!("Turn failed for {}: {}", client_id, err);

    if let Err(e) = channel.send(StreamFrame::error(&err)).await {
        debug!("Could not deliver error frame to {}: {}", client_id, e);
    }
    RelayState::ClosedByError
}

fn transport_lost(client_id: &str, err: ApiError) -> RelayState {
    warn!("Lost connection to {} while sending: {}", client_id, err);
    RelayState::ClosedByError
}
