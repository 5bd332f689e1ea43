use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use chat_relay_server::config::Settings;
use chat_relay_server::models::SessionConfig;
use chat_relay_server::router::build_router;
use chat_relay_server::services::{load_reference_context, GeminiClient, GenerativeService, SessionManager};
use chat_relay_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()?;
    let _log_guard = chat_relay_server::logging::init(&settings.logging)?;

    info!("🚀 Starting chat relay server...");
    info!("✅ Configuration loaded (model {})", settings.gemini.model);

    // Upload reference documents once, before accepting connections
    let service = GeminiClient::new(settings.gemini.clone())
        .map(|client| Arc::new(client) as Arc<dyn GenerativeService>);
    let upstream = load_reference_context(service, &settings.documents.paths()).await;

    let sessions = Arc::new(SessionManager::new(
        upstream,
        SessionConfig::from_settings(&settings),
        settings.prompts.priming_instruction.clone(),
    ));

    let app = build_router(AppState::new(sessions));

    // Server address
    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🎯 Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
