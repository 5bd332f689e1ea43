use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::services::gemini::ChatSession;

pub type SessionHandle = Arc<dyn ChatSession>;

/// A store entry. Empty while the session is being created; the cell makes
/// concurrent creators for one client share a single creation.
pub(crate) type SessionSlot = Arc<OnceCell<SessionHandle>>;

/// Thread-safe in-memory session store: client_id -> chat session.
/// No eviction, entries live until deleted or the process exits.
#[derive(Clone, Default)]
pub struct SessionStore {
    storage: Arc<DashMap<String, SessionSlot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ready session for this client, if any
    pub fn get(&self, client_id: &str) -> Option<SessionHandle> {
        self.storage
            .get(client_id)
            .and_then(|slot| slot.value().get().cloned())
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.get(client_id).is_some()
    }

    /// Slot for this client, created empty when absent.
    pub(crate) fn slot(&self, client_id: &str) -> SessionSlot {
        self.storage
            .entry(client_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Drop a slot whose creation failed, unless it was replaced meanwhile.
    pub(crate) fn discard_if_empty(&self, client_id: &str, slot: &SessionSlot) {
        let removed = self
            .storage
            .remove_if(client_id, |_, current| {
                Arc::ptr_eq(current, slot) && !current.initialized()
            })
            .is_some();

        if removed {
            debug!("Discarded empty session slot for {}", client_id);
        }
    }

    /// Remove the client's ready session. A slot still being created is
    /// left alone and reported as absent.
    pub fn remove(&self, client_id: &str) -> bool {
        self.storage
            .remove_if(client_id, |_, slot| slot.initialized())
            .is_some()
    }

    /// Number of ready sessions
    pub fn len(&self) -> usize {
        self.storage
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fakes::FakeService;
    use crate::services::gemini::GenerativeService;
    use crate::models::SessionConfig;

    fn session() -> SessionHandle {
        FakeService::new().create_session(&SessionConfig {
            model: "m".to_string(),
            system_instruction: "s".to_string(),
            temperature: 0.2,
            stop_sequences: Vec::new(),
        })
    }

    #[test]
    fn test_store_basic_operations() {
        let store = SessionStore::new();
        assert!(store.is_empty());

        let slot = store.slot("alice");
        assert!(!store.contains("alice"), "empty slot is not a session");
        assert!(slot.set(session()).is_ok());

        assert!(store.contains("alice"));
        assert_eq!(store.len(), 1);

        assert!(store.remove("alice"));
        assert!(!store.remove("alice"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_same_client_shares_slot() {
        let store = SessionStore::new();
        let first = store.slot("alice");
        let second = store.slot("alice");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_discard_only_empty_matching_slot() {
        let store = SessionStore::new();

        let stale = store.slot("alice");
        store.discard_if_empty("alice", &stale);
        let fresh = store.slot("alice");
        assert!(!Arc::ptr_eq(&stale, &fresh));
        assert!(fresh.set(session()).is_ok());

        // a stale creator must not remove the replacement
        store.discard_if_empty("alice", &stale);
        assert!(store.contains("alice"));

        let empty = store.slot("bob");
        store.discard_if_empty("bob", &empty);
        assert_eq!(store.storage.len(), 1);
    }

    #[test]
    fn test_remove_keeps_pending_slot() {
        let store = SessionStore::new();
        let pending = store.slot("alice");

        assert!(!store.remove("alice"));
        assert!(Arc::ptr_eq(&pending, &store.slot("alice")));

        assert!(pending.set(session()).is_ok());
        assert!(store.contains("alice"));
    }
}
