use std::sync::Arc;
use tracing::{error, info, Instrument};
use uuid::Uuid;

use crate::models::StreamFrame;
use crate::services::relay::{run_relay, ClientChannel, RelayState};
use crate::services::session_manager::SessionManager;

/// Own one client connection from accept to close.
///
/// Resolves the client's session before reading anything; if that fails
/// the client gets a single `error` frame. The channel is always closed on
/// the way out, whatever the terminal state.
pub async fn supervise<C: ClientChannel>(
    mut channel: C,
    sessions: Arc<SessionManager>,
    client_id: String,
) -> RelayState {
    let connection_id = Uuid::new_v4();
    let span = tracing::info_span!("ws", client_id = %client_id, connection_id = %connection_id);

    async move {
        info!("🔌 Client connected: {}", client_id);

        let state = match sessions.get_or_create(&client_id).await {
            Ok(session) => run_relay(&mut channel, session.as_ref(), &client_id).await,
            Err(e) => {
                error!("Could not open chat session for {}: {}", client_id, e);
                if let Err(send_err) = channel.send(StreamFrame::error(&e)).await {
                    info!("Client {} left before the error was delivered: {}", client_id, send_err);
                }
                RelayState::ClosedByError
            }
        };

        channel.close().await;
        info!("Connection with {} ended ({:?})", client_id, state);
        state
    }
    .instrument(span)
    .await
}
