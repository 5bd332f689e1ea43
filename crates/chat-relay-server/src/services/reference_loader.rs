use crate::models::ReferenceHandle;
use crate::services::gemini::GenerativeService;
use crate::utils::error::ApiError;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of the one-time startup step: the upstream client plus every
/// reference document it accepted, or the reason there is no client.
#[derive(Clone)]
pub enum Upstream {
    Connected {
        service: Arc<dyn GenerativeService>,
        handles: Arc<[ReferenceHandle]>,
    },
    Disconnected {
        reason: String,
    },
}

impl Upstream {
    pub fn handles(&self) -> &[ReferenceHandle] {
        match self {
            Upstream::Connected { handles, .. } => handles,
            Upstream::Disconnected { .. } => &[],
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Upstream::Connected { .. })
    }

    /// Chat needs a client and at least one reference document.
    pub fn is_ready(&self) -> bool {
        self.is_connected() && !self.handles().is_empty()
    }
}

/// Upload every configured reference document once.
///
/// Never fails: a missing file is skipped with a warning, a failed upload is
/// logged and skipped, and a client that could not be built yields
/// `Upstream::Disconnected`. Chat stays disabled for the whole run when no
/// document made it.
pub async fn load_reference_context(
    service: Result<Arc<dyn GenerativeService>, ApiError>,
    documents: &[PathBuf],
) -> Upstream {
    let service = match service {
        Ok(service) => {
            info!("✅ Gemini client initialized");
            service
        }
        Err(e) => {
            error!("❌ Failed to initialize Gemini client, chat disabled: {}", e);
            return Upstream::Disconnected {
                reason: e.to_string(),
            };
        }
    };

    let mut handles = Vec::with_capacity(documents.len());

    for path in documents {
        info!("Looking for reference document: {}", path.display());

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            warn!("Reference document '{}' not found, it will not be attached", path.display());
            continue;
        }

        info!("Uploading reference document: {}", path.display());
        match service.upload(path).await {
            Ok(handle) => {
                info!("✅ Uploaded {} as {} ({})", path.display(), handle.name, handle.mime_type);
                handles.push(handle);
            }
            Err(e) => {
                error!("❌ Failed to upload {}: {}", path.display(), e);
            }
        }
    }

    if handles.is_empty() {
        error!("No reference document was uploaded, chat is unavailable for this run");
    } else {
        info!("{} of {} reference documents ready", handles.len(), documents.len());
    }

    Upstream::Connected {
        service,
        handles: handles.into(),
    }
}
