use tracing::{debug, info, warn};

use crate::models::{Part, ReferenceHandle, SessionConfig};
use crate::services::gemini::GenerativeService;
use crate::services::reference_loader::Upstream;
use crate::services::session_store::{SessionHandle, SessionStore};
use crate::utils::error::ApiError;
use std::sync::Arc;

/// Creates, primes and hands out per-client chat sessions.
pub struct SessionManager {
    store: SessionStore,
    upstream: Upstream,
    config: SessionConfig,
    priming_instruction: String,
}

impl SessionManager {
    pub fn new(upstream: Upstream, config: SessionConfig, priming_instruction: String) -> Self {
        Self {
            store: SessionStore::new(),
            upstream,
            config,
            priming_instruction,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    /// Existing session for the client, or a new primed one.
    ///
    /// A new session gets exactly one priming turn carrying every reference
    /// document; its reply is dropped. When priming fails nothing is stored,
    /// so the client can retry by reconnecting.
    pub async fn get_or_create(&self, client_id: &str) -> Result<SessionHandle, ApiError> {
        if let Some(session) = self.store.get(client_id) {
            debug!("Reusing chat session for {}", client_id);
            return Ok(session);
        }

        let (service, handles) = self.require_upstream()?;

        let slot = self.store.slot(client_id);
        let result = slot
            .get_or_try_init(|| self.initialize(client_id, service, handles))
            .await
            .cloned();

        if result.is_err() {
            self.store.discard_if_empty(client_id, &slot);
        }
        result
    }

    /// Forget the client's session. No remote call is made.
    pub fn delete(&self, client_id: &str) -> bool {
        let existed = self.store.remove(client_id);
        if existed {
            info!("Chat history cleared for {}", client_id);
        }
        existed
    }

    fn require_upstream(&self) -> Result<(&Arc<dyn GenerativeService>, &[ReferenceHandle]), ApiError> {
        match &self.upstream {
            Upstream::Connected { service, handles } if !handles.is_empty() => Ok((service, &handles[..])),
            Upstream::Connected { .. } => Err(ApiError::Unavailable(
                "the reference dictionaries could not be loaded".to_string(),
            )),
            Upstream::Disconnected { reason } => Err(ApiError::Unavailable(format!(
                "the server could not connect to Gemini ({})",
                reason
            ))),
        }
    }

    async fn initialize(
        &self,
        client_id: &str,
        service: &Arc<dyn GenerativeService>,
        handles: &[ReferenceHandle],
    ) -> Result<SessionHandle, ApiError> {
        let session = service.create_session(&self.config);
        info!("New Gemini chat session started for {} (model {})", client_id, self.config.model);

        let mut parts: Vec<Part> = handles.iter().map(ReferenceHandle::to_part).collect();
        parts.push(Part::text(self.priming_instruction.as_str()));

        match session.send_message(parts).await {
            Ok(reply) => {
                debug!("Priming reply for {} discarded ({} chars)", client_id, reply.len());
                info!("{} reference documents attached to the chat context of {}", handles.len(), client_id);
                Ok(session)
            }
            Err(e) => {
                warn!("Priming failed for {}: {}", client_id, e);
                Err(ApiError::SessionInit(format!("Error creating Gemini session: {}", e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fakes::{handle, FakeService};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn config() -> SessionConfig {
        SessionConfig {
            model: "gemini-2.5-flash".to_string(),
            system_instruction: "Eres un traductor".to_string(),
            temperature: 0.2,
            stop_sequences: Vec::new(),
        }
    }

    fn manager_with(fake: &FakeService, handles: Vec<ReferenceHandle>) -> SessionManager {
        let upstream = Upstream::Connected {
            service: Arc::new(fake.clone()),
            handles: handles.into(),
        };
        SessionManager::new(upstream, config(), "usa los diccionarios".to_string())
    }

    #[tokio::test]
    async fn test_first_use_primes_once() {
        let fake = FakeService::new();
        let manager = manager_with(&fake, vec![handle("a.pdf"), handle("b.pdf")]);

        let first = manager.get_or_create("alice").await.unwrap();
        let second = manager.get_or_create("alice").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fake.sessions_created(), 1);
        assert_eq!(fake.primes(), 1);
        assert!(manager.store().contains("alice"));
    }

    #[tokio::test]
    async fn test_priming_message_layout() {
        let fake = FakeService::new();
        let manager = manager_with(&fake, vec![handle("a.pdf"), handle("b.pdf")]);

        manager.get_or_create("alice").await.unwrap();

        let primed = fake.state.primed_parts.lock();
        let parts = &primed[0];
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], handle("a.pdf").to_part());
        assert_eq!(parts[1], handle("b.pdf").to_part());
        assert_eq!(parts[2].text.as_deref(), Some("usa los diccionarios"));
    }

    #[tokio::test]
    async fn test_delete_then_recreate_primes_again() {
        let fake = FakeService::new();
        let manager = manager_with(&fake, vec![handle("a.pdf")]);

        manager.get_or_create("alice").await.unwrap();
        assert!(manager.delete("alice"));
        assert!(!manager.store().contains("alice"));

        manager.get_or_create("alice").await.unwrap();
        assert_eq!(fake.sessions_created(), 2);
        assert_eq!(fake.primes(), 2);
    }

    #[tokio::test]
    async fn test_delete_missing_has_no_effect() {
        let fake = FakeService::new();
        let manager = manager_with(&fake, vec![handle("a.pdf")]);
        manager.get_or_create("alice").await.unwrap();

        assert!(!manager.delete("bob"));
        assert!(!manager.delete("bob"));
        assert!(manager.store().contains("alice"));
        assert_eq!(manager.store().len(), 1);
    }

    #[tokio::test]
    async fn test_no_handles_is_unavailable() {
        let fake = FakeService::new();
        let manager = manager_with(&fake, Vec::new());

        let result = manager.get_or_create("alice").await;
        assert!(matches!(result, Err(ApiError::Unavailable(_))));
        assert_eq!(fake.sessions_created(), 0);
        assert!(manager.store().is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_is_unavailable() {
        let upstream = Upstream::Disconnected {
            reason: "GEMINI_API_KEY is not set".to_string(),
        };
        let manager = SessionManager::new(upstream, config(), "x".to_string());

        match manager.get_or_create("alice").await {
            Err(ApiError::Unavailable(msg)) => assert!(msg.contains("GEMINI_API_KEY")),
            _ => panic!("expected Unavailable"),
        }
    }

    #[tokio::test]
    async fn test_priming_failure_is_not_stored_and_retryable() {
        let fake = FakeService::new();
        fake.state.fail_priming.store(true, Ordering::SeqCst);
        let manager = manager_with(&fake, vec![handle("a.pdf")]);

        match manager.get_or_create("alice").await {
            Err(ApiError::SessionInit(msg)) => assert!(msg.contains("quota exceeded")),
            _ => panic!("expected SessionInit"),
        }
        assert!(manager.store().is_empty());

        fake.state.fail_priming.store(false, Ordering::SeqCst);
        manager.get_or_create("alice").await.unwrap();
        assert_eq!(fake.primes(), 2);
        assert_eq!(manager.store().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_during_creation_has_no_effect() {
        let fake = FakeService::new();
        *fake.state.prime_delay.lock() = Some(Duration::from_millis(100));
        let manager = manager_with(&fake, vec![handle("a.pdf")]);

        let deleting = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            manager.delete("alice")
        };
        let (created, deleted) = tokio::join!(manager.get_or_create("alice"), deleting);

        assert!(created.is_ok());
        assert!(!deleted, "a session still being created is not found");
        assert!(manager.store().contains("alice"));

        manager.get_or_create("alice").await.unwrap();
        assert_eq!(fake.primes(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_messages_prime_once() {
        let fake = FakeService::new();
        *fake.state.prime_delay.lock() = Some(Duration::from_millis(50));
        let manager = manager_with(&fake, vec![handle("a.pdf")]);

        let (a, b) = tokio::join!(manager.get_or_create("alice"), manager.get_or_create("alice"));

        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(fake.sessions_created(), 1);
        assert_eq!(fake.primes(), 1);
    }
}
